use crate::graph::node::{AudioNode, Block, one_pole_coeff};
use std::any::Any;

pub const MAX_DELAY_MS: f32 = 2000.0;
const SMOOTH_TIME_MS: f32 = 50.0;

/// Pure stereo delay line: output is the input of `delay_ms` ago.
///
/// Feedback and dry/wet mixing live outside, in the delay stage's wiring.
/// Uses a pre-allocated ring buffer (max 2 s) with linear interpolation
/// for fractional delay lengths and one-pole smoothing on the delay time
/// to prevent clicks when the time control is moved.
pub struct DelayLineNode {
    delay_ms: f32,
    left: Vec<f32>,
    right: Vec<f32>,
    write_pos: usize,
    sample_rate: f32,
    delay_samples_smoothed: f32,
    delay_samples_target: f32,
    smooth_coeff: f32,
}

impl DelayLineNode {
    pub fn new(delay_ms: f32, sample_rate: f32) -> Self {
        let delay_ms = delay_ms.clamp(0.0, MAX_DELAY_MS);
        let max_samples = (MAX_DELAY_MS * 0.001 * sample_rate) as usize + 1;
        let delay_samples = delay_ms * 0.001 * sample_rate;

        Self {
            delay_ms,
            left: vec![0.0; max_samples],
            right: vec![0.0; max_samples],
            write_pos: 0,
            sample_rate,
            delay_samples_smoothed: delay_samples,
            delay_samples_target: delay_samples,
            smooth_coeff: one_pole_coeff(SMOOTH_TIME_MS, sample_rate),
        }
    }

    pub fn set_delay_ms(&mut self, delay_ms: f32) {
        self.delay_ms = delay_ms.clamp(0.0, MAX_DELAY_MS);
        self.delay_samples_target = self.delay_ms * 0.001 * self.sample_rate;
    }

    pub fn delay_ms(&self) -> f32 {
        self.delay_ms
    }

    #[inline]
    fn read_interpolated(buffer: &[f32], read_pos: f32) -> f32 {
        let len = buffer.len();
        let idx = read_pos as usize % len;
        let frac = read_pos.fract();
        let next = (idx + 1) % len;
        (1.0 - frac).mul_add(buffer[idx], frac * buffer[next])
    }
}

impl AudioNode for DelayLineNode {
    fn process(&mut self, input: &Block, output: &mut Block) {
        let len = self.left.len();
        for i in 0..output.frames() {
            self.delay_samples_smoothed = self.smooth_coeff.mul_add(
                self.delay_samples_smoothed,
                (1.0 - self.smooth_coeff) * self.delay_samples_target,
            );

            let read_pos = self.write_pos as f32 - self.delay_samples_smoothed + len as f32;
            output.left[i] = Self::read_interpolated(&self.left, read_pos);
            output.right[i] = Self::read_interpolated(&self.right, read_pos);

            self.left[self.write_pos] = input.left[i];
            self.right[self.write_pos] = input.right[i];
            self.write_pos = (self.write_pos + 1) % len;
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

    const SAMPLE_RATE: f32 = 44_100.0;
    const BLOCK: usize = 64;

    fn settle(node: &mut DelayLineNode) {
        let input = Block::new(BLOCK);
        let mut output = Block::new(BLOCK);
        for _ in 0..(SAMPLE_RATE as usize / BLOCK) {
            node.process(&input, &mut output);
        }
    }

    #[test]
    fn impulse_arrives_after_delay() {
        let delay_ms = 100.0;
        let delay_samples = (delay_ms * 0.001 * SAMPLE_RATE) as usize;
        let mut node = DelayLineNode::new(delay_ms, SAMPLE_RATE);
        settle(&mut node);

        let mut impulse = Block::new(BLOCK);
        impulse.left[0] = 1.0;
        impulse.right[0] = 1.0;
        let mut output = Block::new(BLOCK);
        node.process(&impulse, &mut output);

        let silence = Block::new(BLOCK);
        let mut seen_at = None;
        for block_idx in 1..=(delay_samples / BLOCK + 2) {
            node.process(&silence, &mut output);
            if let Some(i) = output.left.iter().position(|s| s.abs() > 0.5) {
                seen_at = Some(block_idx * BLOCK + i);
                break;
            }
        }
        let seen_at = seen_at.expect("delayed impulse never appeared");
        assert!(
            (seen_at as i64 - delay_samples as i64).abs() <= 2,
            "impulse at {seen_at}, expected ~{delay_samples}"
        );
    }

    #[test]
    fn zero_delay_does_not_panic() {
        let mut node = DelayLineNode::new(0.0, SAMPLE_RATE);
        let mut input = Block::new(BLOCK);
        input.left.fill(1.0);
        let mut output = Block::new(BLOCK);
        for _ in 0..100 {
            node.process(&input, &mut output);
        }
    }

    #[test]
    fn delay_time_is_clamped() {
        let mut node = DelayLineNode::new(10_000.0, SAMPLE_RATE);
        assert_eq!(node.delay_ms(), MAX_DELAY_MS);
        node.set_delay_ms(-5.0);
        assert_eq!(node.delay_ms(), 0.0);
    }
}
