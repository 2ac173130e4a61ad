use crate::analysis::{self, Levels};
use arc_swap::ArcSwap;
use std::any::Any;
use std::sync::Arc;

use crate::graph::node::{AudioNode, Block};

const CLIP_THRESHOLD: f32 = 0.95;
/// How often the lock-free meter info is republished, in samples.
const PUBLISH_INTERVAL: usize = 1024;

/// Coarse level info published by the tap for lock-free UI reads.
#[derive(Debug, Clone, Default)]
pub struct LevelInfo {
    pub peak_db: f32,
    pub rms_db: f32,
    pub is_clipping: bool,
}

/// Cheap cloneable reader for [`LevelInfo`]; safe to poll from any thread.
#[derive(Clone)]
pub struct MeterHandle {
    info: Arc<ArcSwap<LevelInfo>>,
}

impl MeterHandle {
    pub fn levels(&self) -> LevelInfo {
        self.info.load().as_ref().clone()
    }
}

/// The analysis tap: a pass-through node that records the last window of
/// samples into ring buffers (mono mix plus per-channel) for on-demand
/// metering and spectrum reads, and periodically publishes coarse levels
/// through a [`MeterHandle`].
pub struct AnalyserNode {
    mono: Vec<f32>,
    left: Vec<f32>,
    right: Vec<f32>,
    write_pos: usize,
    since_publish: usize,
    info: Arc<ArcSwap<LevelInfo>>,
}

impl AnalyserNode {
    pub fn new(window_size: usize) -> (Self, MeterHandle) {
        let info = Arc::new(ArcSwap::from_pointee(LevelInfo::default()));
        (
            Self {
                mono: vec![0.0; window_size],
                left: vec![0.0; window_size],
                right: vec![0.0; window_size],
                write_pos: 0,
                since_publish: 0,
                info: Arc::clone(&info),
            },
            MeterHandle { info },
        )
    }

    pub fn window_size(&self) -> usize {
        self.mono.len()
    }

    /// The mono window, ordered oldest to newest.
    pub fn window(&self) -> Vec<f32> {
        Self::unroll(&self.mono, self.write_pos)
    }

    /// Per-channel windows, ordered oldest to newest.
    pub fn channel_windows(&self) -> (Vec<f32>, Vec<f32>) {
        (
            Self::unroll(&self.left, self.write_pos),
            Self::unroll(&self.right, self.write_pos),
        )
    }

    fn unroll(ring: &[f32], write_pos: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(ring.len());
        out.extend_from_slice(&ring[write_pos..]);
        out.extend_from_slice(&ring[..write_pos]);
        out
    }

    fn publish(&mut self) {
        let Levels { peak_db, rms_db } = analysis::levels(&self.mono);
        let peak_linear = self.mono.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        self.info.store(Arc::new(LevelInfo {
            peak_db,
            rms_db,
            is_clipping: peak_linear >= CLIP_THRESHOLD,
        }));
    }
}

impl AudioNode for AnalyserNode {
    fn process(&mut self, input: &Block, output: &mut Block) {
        output.copy_from(input);
        let len = self.mono.len();
        for i in 0..input.frames() {
            let (l, r) = (input.left[i], input.right[i]);
            self.left[self.write_pos] = l;
            self.right[self.write_pos] = r;
            self.mono[self.write_pos] = (l + r) * 0.5;
            self.write_pos = (self.write_pos + 1) % len;
            self.since_publish += 1;
        }
        if self.since_publish >= PUBLISH_INTERVAL {
            self.since_publish = 0;
            self.publish();
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
    fn window_orders_oldest_first() {
        let (mut node, _) = AnalyserNode::new(8);
        let mut input = Block::new(4);
        let mut output = Block::new(4);
        input.left.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        input.right.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        node.process(&input, &mut output);
        input.left.copy_from_slice(&[5.0, 6.0, 7.0, 8.0]);
        input.right.copy_from_slice(&[5.0, 6.0, 7.0, 8.0]);
        node.process(&input, &mut output);
        input.left.copy_from_slice(&[9.0, 10.0, 11.0, 12.0]);
        input.right.copy_from_slice(&[9.0, 10.0, 11.0, 12.0]);
        node.process(&input, &mut output);
        assert_eq!(
            node.window(),
            vec![5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]
        );
    }

    #[test]
    fn passes_signal_through_unchanged() {
        let (mut node, _) = AnalyserNode::new(16);
        let mut input = Block::new(8);
        input.left.fill(0.3);
        input.right.fill(-0.3);
        let mut output = Block::new(8);
        node.process(&input, &mut output);
        assert_eq!(output.left, input.left);
        assert_eq!(output.right, input.right);
    }

    #[test]
    fn meter_handle_sees_published_levels() {
        let (mut node, handle) = AnalyserNode::new(512);
        let mut input = Block::new(512);
        input.left.fill(1.0);
        input.right.fill(1.0);
        let mut output = Block::new(512);
        for _ in 0..4 {
            node.process(&input, &mut output);
        }
        let info = handle.levels();
        assert!(info.is_clipping);
        assert!(info.peak_db.abs() < 0.1, "full scale is ~0 dB");
    }
}
