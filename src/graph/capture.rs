use crate::graph::node::{AudioNode, Block};
use std::any::Any;

/// A live mono sample feed from some capture backend (a JACK port, a test
/// fixture). The node pulls from it once per block on the render side.
///
/// Dropping the stream releases the underlying capture resource; backends
/// that can be re-acquired return it to their provider on drop.
pub trait CaptureStream: Send {
    /// Fill `out` with up to `out.len()` mono samples, returning how many
    /// were written. A starved stream may return less than requested.
    fn read(&mut self, out: &mut [f32]) -> usize;
}

/// Source node fed by a [`CaptureStream`], duplicated to both channels.
/// Shortfalls are zero-filled and non-finite samples are flushed to
/// silence, so a misbehaving backend degrades to dropouts rather than
/// propagating garbage into the chain.
pub struct CaptureNode {
    stream: Box<dyn CaptureStream>,
    scratch: Vec<f32>,
}

impl CaptureNode {
    pub fn new(stream: Box<dyn CaptureStream>) -> Self {
        Self {
            stream,
            scratch: Vec::new(),
        }
    }
}

impl AudioNode for CaptureNode {
    fn process(&mut self, _input: &Block, output: &mut Block) {
        let frames = output.frames();
        self.scratch.resize(frames, 0.0);
        let got = self.stream.read(&mut self.scratch);
        self.scratch[got..].fill(0.0);
        for i in 0..frames {
            let s = self.scratch[i];
            let s = if s.is_finite() { s } else { 0.0 };
            output.left[i] = s;
            output.right[i] = s;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
