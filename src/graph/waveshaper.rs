use crate::graph::node::{AudioNode, Block, Smoothed};
use std::any::Any;

const SMOOTH_TIME_MS: f32 = 20.0;

/// Tanh waveshaper with input drive and output level. This is the DSP
/// kernel behind the `drive` stage kind.
pub struct WaveshaperNode {
    drive: Smoothed,
    level: Smoothed,
}

impl WaveshaperNode {
    pub fn new(drive: f32, level: f32, sample_rate: f32) -> Self {
        Self {
            drive: Smoothed::new(drive, SMOOTH_TIME_MS, sample_rate),
            level: Smoothed::new(level, SMOOTH_TIME_MS, sample_rate),
        }
    }

    pub fn set_drive(&mut self, drive: f32) {
        self.drive.set_target(drive);
    }

    pub fn set_level(&mut self, level: f32) {
        self.level.set_target(level);
    }

    pub fn drive(&self) -> f32 {
        self.drive.target()
    }

    pub fn level(&self) -> f32 {
        self.level.target()
    }
}

impl AudioNode for WaveshaperNode {
    fn process(&mut self, input: &Block, output: &mut Block) {
        for i in 0..output.frames() {
            let drive = self.drive.next();
            let level = self.level.next();
            output.left[i] = (input.left[i] * drive).tanh() * level;
            output.right[i] = (input.right[i] * drive).tanh() * level;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_bounded_by_level() {
        let mut node = WaveshaperNode::new(10.0, 1.0, 48_000.0);
        let mut input = Block::new(64);
        input.left.fill(100.0);
        input.right.fill(-100.0);
        let mut output = Block::new(64);
        for _ in 0..50 {
            node.process(&input, &mut output);
        }
        assert!(output.left[63] <= 1.0);
        assert!(output.right[63] >= -1.0);
    }

    #[test]
    fn low_drive_is_nearly_linear() {
        let mut node = WaveshaperNode::new(1.0, 1.0, 48_000.0);
        let mut input = Block::new(64);
        input.left.fill(0.01);
        input.right.fill(0.01);
        let mut output = Block::new(64);
        node.process(&input, &mut output);
        assert!((output.left[32] - 0.01).abs() < 1e-4);
    }
}
