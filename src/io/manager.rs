use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use jack::{AsyncClient, Client, ClientOptions};
use log::{info, warn};

use crate::engine::Engine;
use crate::io::capture::JackCaptureProvider;
use crate::io::processor::Processor;

/// Frames rendered per graph pass. JACK cycles are chopped into blocks
/// of this size.
const RENDER_BLOCK: usize = 128;

/// Capacity of the capture ring, in samples. Roughly two thirds of a
/// second at 48 kHz; overruns drop samples rather than block.
const CAPTURE_RING: usize = 1 << 15;

const CLIENT_NAME: &str = "fxrack";

/// Owns the JACK client and the engine wired to it.
pub struct AudioManager {
    active_client: AsyncClient<Notifications, Processor>,
    engine: Engine,
    sample_rate: f32,
}

/// JACK notifications handler
struct Notifications;
impl jack::NotificationHandler for Notifications {}

impl AudioManager {
    pub fn new(auto_connect: bool) -> Result<Self> {
        let (client, _) = Client::new(CLIENT_NAME, ClientOptions::NO_START_SERVER)
            .context("failed to create JACK client")?;

        let sample_rate = client.sample_rate() as f32;
        info!(
            "JACK client up: {sample_rate} Hz, buffer {} frames",
            client.buffer_size()
        );

        let (tx_capture, rx_capture) = rtrb::RingBuffer::new(CAPTURE_RING);
        let capture_slot = Arc::new(Mutex::new(Some(rx_capture)));

        let engine = Engine::new(
            sample_rate,
            RENDER_BLOCK,
            Box::new(JackCaptureProvider::new(capture_slot)),
        );

        let processor = Processor::new(
            &client,
            engine.graph_handle(),
            engine.master_node(),
            tx_capture,
        )
        .context("error creating processor")?;

        let active_client = client
            .activate_async(Notifications, processor)
            .context("failed to activate async client")?;

        let manager = Self {
            active_client,
            engine,
            sample_rate,
        };
        if auto_connect {
            manager.connect_ports();
        }
        Ok(manager)
    }

    /// Wire the client to the default system ports. Failures are
    /// logged, not fatal; users can patch manually.
    fn connect_ports(&self) {
        let client = self.active_client.as_client();
        let pairs = [
            ("system:capture_1", "fxrack:in_port"),
            ("fxrack:out_left", "system:playback_1"),
            ("fxrack:out_right", "system:playback_2"),
        ];
        for (from, to) in pairs {
            if let Err(e) = client.connect_ports_by_name(from, to) {
                warn!("failed to connect {from} -> {to}: {e}");
            } else {
                info!("connected {from} -> {to}");
            }
        }
    }

    pub fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

impl std::fmt::Debug for AudioManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioManager")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
