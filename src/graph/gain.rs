use crate::graph::node::{AudioNode, Block, Smoothed};
use std::any::Any;

const SMOOTH_TIME_MS: f32 = 20.0;

/// Multiplies the input by a smoothed gain. Doubles as a plain summing
/// junction at gain 1, which is how composite stages build their entry
/// and exit points.
pub struct GainNode {
    gain: Smoothed,
}

impl GainNode {
    pub fn new(gain: f32, sample_rate: f32) -> Self {
        Self {
            gain: Smoothed::new(gain, SMOOTH_TIME_MS, sample_rate),
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain.set_target(gain);
    }

    pub fn gain(&self) -> f32 {
        self.gain.target()
    }
}

impl AudioNode for GainNode {
    fn process(&mut self, input: &Block, output: &mut Block) {
        for i in 0..output.frames() {
            let g = self.gain.next();
            output.left[i] = input.left[i] * g;
            output.right[i] = input.right[i] * g;
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
    fn unity_gain_passes_through() {
        let mut node = GainNode::new(1.0, 48_000.0);
        let mut input = Block::new(32);
        input.left.fill(0.5);
        input.right.fill(-0.5);
        let mut output = Block::new(32);
        node.process(&input, &mut output);
        assert!((output.left[16] - 0.5).abs() < 1e-6);
        assert!((output.right[16] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn gain_change_is_smoothed() {
        let mut node = GainNode::new(1.0, 48_000.0);
        node.set_gain(0.0);
        let mut input = Block::new(32);
        input.left.fill(1.0);
        input.right.fill(1.0);
        let mut output = Block::new(32);
        node.process(&input, &mut output);
        // First block after the change is neither unity nor silent.
        assert!(output.left[0] < 1.0);
        assert!(output.left[0] > 0.0);
        // After plenty of blocks the target is reached. The 20 ms
        // one-pole needs well over 6 time constants to get below 1e-3.
        for _ in 0..400 {
            node.process(&input, &mut output);
        }
        assert!(output.left[31].abs() < 1e-3);
    }
}
