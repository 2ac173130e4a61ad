use std::any::Any;

/// Handle to a node owned by a [`SignalGraph`](crate::graph::SignalGraph).
///
/// Ids are assigned from a monotonic counter and never reused, so a stale
/// handle can never alias a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct NodeId(pub(crate) u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A stereo block of samples. Every node keeps one as its retained output.
#[derive(Debug, Clone)]
pub struct Block {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl Block {
    pub fn new(frames: usize) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn silence(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    /// Mix another block into this one, sample by sample.
    pub fn mix_in(&mut self, other: &Self) {
        for (dst, src) in self.left.iter_mut().zip(&other.left) {
            *dst += src;
        }
        for (dst, src) in self.right.iter_mut().zip(&other.right) {
            *dst += src;
        }
    }

    pub fn copy_from(&mut self, other: &Self) {
        self.left.copy_from_slice(&other.left);
        self.right.copy_from_slice(&other.right);
    }
}

// The core trait every graph node implements. `input` is the pre-mixed sum
// of all connected upstream outputs; `output` is the node's retained block.
pub trait AudioNode: Send {
    fn process(&mut self, input: &Block, output: &mut Block);

    // Typed access for the owners of a node (engine, stage instances).
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn as_any(&self) -> &dyn Any;
}

/// One-pole smoothing coefficient from a time constant in milliseconds.
///
/// Returns `exp(-1 / (sample_rate * time_ms * 0.001))`.
#[inline]
pub fn one_pole_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    (-1.0 / (sample_rate * 0.001 * time_ms)).exp()
}

/// A parameter value with one-pole smoothing toward its target, used to
/// avoid zipper noise when controls move between blocks.
#[derive(Debug, Clone)]
pub struct Smoothed {
    current: f32,
    target: f32,
    coeff: f32,
}

impl Smoothed {
    pub fn new(initial: f32, time_ms: f32, sample_rate: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: one_pole_coeff(time_ms, sample_rate),
        }
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        self.current = self
            .coeff
            .mul_add(self.current, (1.0 - self.coeff) * self.target);
        self.current
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::{AudioNode, Block};
    use std::any::Any;

    /// Emits a constant value on both channels. Test source.
    pub struct ConstNode {
        pub value: f32,
    }

    impl AudioNode for ConstNode {
        fn process(&mut self, _input: &Block, output: &mut Block) {
            output.left.fill(self.value);
            output.right.fill(self.value);
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }
}
