use crate::graph::node::{AudioNode, Block, Smoothed};
use std::any::Any;
use std::f32::consts::FRAC_PI_2;

const SMOOTH_TIME_MS: f32 = 20.0;

/// Equal-power stereo panner, pan in [-1, 1].
///
/// Uses the stereo-input panning law: at center both channels pass
/// unchanged; panning right folds the left channel into the right with
/// a cos/sin crossfade, and mirrored for panning left.
pub struct PannerNode {
    pan: Smoothed,
}

impl PannerNode {
    pub fn new(pan: f32, sample_rate: f32) -> Self {
        Self {
            pan: Smoothed::new(pan, SMOOTH_TIME_MS, sample_rate),
        }
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan.set_target(pan);
    }

    pub fn pan(&self) -> f32 {
        self.pan.target()
    }
}

impl AudioNode for PannerNode {
    fn process(&mut self, input: &Block, output: &mut Block) {
        for i in 0..output.frames() {
            let pan = self.pan.next();
            let (l, r) = (input.left[i], input.right[i]);
            if pan >= 0.0 {
                let theta = pan * FRAC_PI_2;
                output.left[i] = l * theta.cos();
                output.right[i] = theta.sin().mul_add(l, r);
            } else {
                let theta = -pan * FRAC_PI_2;
                output.left[i] = theta.sin().mul_add(r, l);
                output.right[i] = r * theta.cos();
            }
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

    fn run(node: &mut PannerNode, l: f32, r: f32) -> (f32, f32) {
        let mut input = Block::new(16);
        input.left.fill(l);
        input.right.fill(r);
        let mut output = Block::new(16);
        // Let the smoother settle.
        for _ in 0..400 {
            node.process(&input, &mut output);
        }
        (output.left[15], output.right[15])
    }

    #[test]
    fn center_is_identity() {
        let mut node = PannerNode::new(0.0, 48_000.0);
        let (l, r) = run(&mut node, 0.5, -0.25);
        assert!((l - 0.5).abs() < 1e-4);
        assert!((r + 0.25).abs() < 1e-4);
    }

    #[test]
    fn hard_right_silences_left() {
        let mut node = PannerNode::new(1.0, 48_000.0);
        let (l, r) = run(&mut node, 0.5, 0.5);
        assert!(l.abs() < 1e-3, "left should be silent, got {l}");
        assert!((r - 1.0).abs() < 1e-3, "left folds into right, got {r}");
    }

    #[test]
    fn hard_left_silences_right() {
        let mut node = PannerNode::new(-1.0, 48_000.0);
        let (l, r) = run(&mut node, 0.5, 0.5);
        assert!(r.abs() < 1e-3);
        assert!((l - 1.0).abs() < 1e-3);
    }
}
