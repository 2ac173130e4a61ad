use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use jack::{AudioIn, AudioOut, Client, Control, Port, ProcessHandler, ProcessScope};
use log::warn;

use crate::graph::{NodeId, SignalGraph};

pub struct Processor {
    graph: Arc<Mutex<SignalGraph>>,
    /// Node whose output feeds the playback ports.
    master: NodeId,
    /// Hardware input fans into this ring for the capture source.
    tx_capture: rtrb::Producer<f32>,
    in_port: Port<AudioIn>,
    out_port_left: Port<AudioOut>,
    out_port_right: Port<AudioOut>,
    /// Reusable per-block render buffers, `block_size` frames each.
    render_left: Vec<f32>,
    render_right: Vec<f32>,
    block_size: usize,
}

impl Processor {
    pub fn new(
        client: &Client,
        graph: Arc<Mutex<SignalGraph>>,
        master: NodeId,
        tx_capture: rtrb::Producer<f32>,
    ) -> Result<Self> {
        let in_port = client
            .register_port("in_port", AudioIn::default())
            .context("failed to register in port")?;
        let out_port_left = client
            .register_port("out_left", AudioOut::default())
            .context("failed to register left out port")?;
        let out_port_right = client
            .register_port("out_right", AudioOut::default())
            .context("failed to register right out port")?;

        let block_size = {
            let g = graph
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            g.block_size()
        };

        Ok(Self {
            graph,
            master,
            tx_capture,
            in_port,
            out_port_left,
            out_port_right,
            render_left: vec![0.0; block_size],
            render_right: vec![0.0; block_size],
            block_size,
        })
    }
}

impl ProcessHandler for Processor {
    fn process(&mut self, _c: &Client, ps: &ProcessScope) -> Control {
        let n_frames = ps.n_frames() as usize;
        let input = self.in_port.as_slice(ps);

        // Feed the capture ring unconditionally; when nothing is reading
        // the push fails once the ring is full and the sample is dropped.
        for &sample in input {
            let _ = self.tx_capture.push(sample);
        }

        let out_left = self.out_port_left.as_mut_slice(ps);
        let out_right = self.out_port_right.as_mut_slice(ps);

        // A command holding the graph lock means we skip rendering rather
        // than block the realtime thread; the cycle plays silence.
        let Ok(mut graph) = self.graph.try_lock() else {
            out_left[..n_frames].fill(0.0);
            out_right[..n_frames].fill(0.0);
            return Control::Continue;
        };

        let mut offset = 0;
        while offset < n_frames {
            graph.render_into(self.master, &mut self.render_left, &mut self.render_right);
            let frames = self.block_size.min(n_frames - offset);
            out_left[offset..offset + frames].copy_from_slice(&self.render_left[..frames]);
            out_right[offset..offset + frames].copy_from_slice(&self.render_right[..frames]);
            offset += frames;
        }

        Control::Continue
    }

    fn buffer_size(&mut self, _c: &Client, frames: jack::Frames) -> Control {
        if frames as usize % self.block_size != 0 {
            warn!(
                "JACK buffer size {frames} is not a multiple of the render block ({}); \
                 the last partial block of each cycle is truncated",
                self.block_size
            );
        }
        Control::Continue
    }
}
