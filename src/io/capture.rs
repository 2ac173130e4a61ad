//! Bridges the JACK input port to the engine's capture seam.
//!
//! The realtime processor always pushes hardware input into a lock-free
//! ring. The consumer end sits in a shared slot: opening the provider
//! takes it out, dropping the stream puts it back, so the microphone can
//! be enabled and disabled any number of times against one ring.

use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::engine::capture::{CaptureError, CaptureProvider};
use crate::graph::capture::CaptureStream;

pub type ConsumerSlot = Arc<Mutex<Option<rtrb::Consumer<f32>>>>;

pub struct JackCaptureProvider {
    slot: ConsumerSlot,
}

impl JackCaptureProvider {
    pub fn new(slot: ConsumerSlot) -> Self {
        Self { slot }
    }
}

impl CaptureProvider for JackCaptureProvider {
    fn open(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut consumer) = slot.take() else {
            return Err(CaptureError::DeviceUnavailable(
                "capture stream already in use".to_string(),
            ));
        };
        // Drop whatever piled up in the ring while nothing was reading,
        // so the stream starts on fresh audio instead of a stale backlog.
        let mut stale = 0usize;
        while consumer.pop().is_ok() {
            stale += 1;
        }
        debug!("capture stream opened, discarded {stale} stale samples");
        Ok(Box::new(JackCaptureStream {
            consumer: Some(consumer),
            slot: Arc::clone(&self.slot),
        }))
    }
}

struct JackCaptureStream {
    consumer: Option<rtrb::Consumer<f32>>,
    slot: ConsumerSlot,
}

impl CaptureStream for JackCaptureStream {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let Some(consumer) = self.consumer.as_mut() else {
            return 0;
        };
        let mut n = 0;
        while n < out.len() {
            match consumer.pop() {
                Ok(sample) => {
                    out[n] = sample;
                    n += 1;
                }
                Err(_) => break,
            }
        }
        n
    }
}

impl Drop for JackCaptureStream {
    fn drop(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            debug!("capture stream closed, returning consumer to slot");
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = Some(consumer);
        }
    }
}
