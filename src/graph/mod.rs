//! The live processing graph: a node arena plus directed connections.
//!
//! The engine mutates topology (connect / disconnect / remove) on the
//! control thread; the io layer renders blocks from the same structure.
//! Nodes process in creation order, each reading the most recent output of
//! its inputs, so feedback edges see the previous block (one block of
//! loop latency, the same rule Web Audio applies to cycles).

pub mod analyser;
pub mod capture;
pub mod delay_line;
pub mod gain;
pub mod node;
pub mod oscillator;
pub mod panner;
pub mod waveshaper;

pub use node::{AudioNode, Block, NodeId, Smoothed};

use log::warn;
use std::collections::HashMap;

struct Slot {
    node: Box<dyn AudioNode>,
    /// Upstream nodes whose outputs feed this node. Edges are stored on
    /// the receiving side so "disconnect the output side of X" is a
    /// retain() over every slot, never a write to X itself.
    inputs: Vec<NodeId>,
    output: Block,
}

pub struct SignalGraph {
    sample_rate: f32,
    block_size: usize,
    next_id: u64,
    /// Creation order; also the processing order.
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, Slot>,
    /// Scratch block the per-node input mix is accumulated into.
    mix: Block,
}

impl SignalGraph {
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            next_id: 0,
            order: Vec::new(),
            nodes: HashMap::new(),
            mix: Block::new(block_size),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn add_node(&mut self, node: Box<dyn AudioNode>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Slot {
                node,
                inputs: Vec::new(),
                output: Block::new(self.block_size),
            },
        );
        self.order.push(id);
        id
    }

    /// Remove a node and every edge touching it, both directions.
    pub fn remove_node(&mut self, id: NodeId) {
        if self.nodes.remove(&id).is_none() {
            warn!("remove_node: {id} not in graph");
            return;
        }
        self.order.retain(|n| *n != id);
        for slot in self.nodes.values_mut() {
            slot.inputs.retain(|n| *n != id);
        }
    }

    /// Connect `from`'s output into `to`'s input mix. Idempotent.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        if !self.nodes.contains_key(&from) {
            warn!("connect: source {from} not in graph");
            return;
        }
        let Some(slot) = self.nodes.get_mut(&to) else {
            warn!("connect: target {to} not in graph");
            return;
        };
        if !slot.inputs.contains(&from) {
            slot.inputs.push(from);
        }
    }

    /// Drop every edge leaving `from`. Edges *into* `from` are untouched:
    /// composite stages wire their entry node to internal children once,
    /// at construction, and that wiring must survive every rebuild.
    pub fn disconnect_outputs(&mut self, from: NodeId) {
        for slot in self.nodes.values_mut() {
            slot.inputs.retain(|n| *n != from);
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.nodes.values().map(|s| s.inputs.len()).sum()
    }

    /// The upstream nodes currently feeding `id`.
    pub fn inputs_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&id)
            .map(|s| s.inputs.clone())
            .unwrap_or_default()
    }

    /// Typed access to a node. The caller names the concrete type it
    /// created the node with; a mismatch returns `None`.
    pub fn node_mut<T: AudioNode + 'static>(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes
            .get_mut(&id)
            .and_then(|s| s.node.as_any_mut().downcast_mut::<T>())
    }

    pub fn node_ref<T: AudioNode + 'static>(&self, id: NodeId) -> Option<&T> {
        self.nodes
            .get(&id)
            .and_then(|s| s.node.as_any().downcast_ref::<T>())
    }

    /// Process one block through every node in creation order.
    pub fn process_block(&mut self) {
        for i in 0..self.order.len() {
            let id = self.order[i];
            let Some(slot) = self.nodes.get(&id) else {
                continue;
            };
            self.mix.silence();
            for src in &slot.inputs {
                if let Some(upstream) = self.nodes.get(src) {
                    self.mix.mix_in(&upstream.output);
                }
            }
            if let Some(slot) = self.nodes.get_mut(&id) {
                slot.node.process(&self.mix, &mut slot.output);
            }
        }
    }

    /// Render one block and copy `tap`'s output into the provided slices.
    /// Slices shorter or longer than the block size are filled as far as
    /// both sides allow; the remainder is zeroed.
    pub fn render_into(&mut self, tap: NodeId, out_left: &mut [f32], out_right: &mut [f32]) {
        self.process_block();
        out_left.fill(0.0);
        out_right.fill(0.0);
        if let Some(slot) = self.nodes.get(&tap) {
            let n = out_left.len().min(slot.output.frames());
            out_left[..n].copy_from_slice(&slot.output.left[..n]);
            let n = out_right.len().min(slot.output.frames());
            out_right[..n].copy_from_slice(&slot.output.right[..n]);
        }
    }

    /// The retained output block of a node, if it exists.
    pub fn output_of(&self, id: NodeId) -> Option<&Block> {
        self.nodes.get(&id).map(|s| &s.output)
    }
}

#[cfg(test)]
mod tests {
    use super::node::test_util::ConstNode;
    use super::*;
    use crate::graph::gain::GainNode;

    fn graph() -> SignalGraph {
        SignalGraph::new(48_000.0, 64)
    }

    #[test]
    fn connect_is_idempotent() {
        let mut g = graph();
        let a = g.add_node(Box::new(ConstNode { value: 1.0 }));
        let b = g.add_node(Box::new(GainNode::new(1.0, g.sample_rate())));
        g.connect(a, b);
        g.connect(a, b);
        assert_eq!(g.inputs_of(b), vec![a]);
        assert_eq!(g.connection_count(), 1);
    }

    #[test]
    fn disconnect_outputs_leaves_inputs_alone() {
        let mut g = graph();
        let a = g.add_node(Box::new(ConstNode { value: 1.0 }));
        let b = g.add_node(Box::new(GainNode::new(1.0, g.sample_rate())));
        let c = g.add_node(Box::new(GainNode::new(1.0, g.sample_rate())));
        g.connect(a, b);
        g.connect(b, c);
        g.disconnect_outputs(b);
        assert_eq!(g.inputs_of(c), Vec::<NodeId>::new());
        // a -> b survives: that edge leaves a, not b.
        assert_eq!(g.inputs_of(b), vec![a]);
    }

    #[test]
    fn remove_node_strips_both_directions() {
        let mut g = graph();
        let a = g.add_node(Box::new(ConstNode { value: 1.0 }));
        let b = g.add_node(Box::new(GainNode::new(1.0, g.sample_rate())));
        let c = g.add_node(Box::new(GainNode::new(1.0, g.sample_rate())));
        g.connect(a, b);
        g.connect(b, c);
        g.remove_node(b);
        assert!(!g.contains(b));
        assert_eq!(g.connection_count(), 0);
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn node_ids_are_never_reused() {
        let mut g = graph();
        let a = g.add_node(Box::new(ConstNode { value: 1.0 }));
        g.remove_node(a);
        let b = g.add_node(Box::new(ConstNode { value: 1.0 }));
        assert_ne!(a, b);
    }

    #[test]
    fn inputs_are_summed() {
        let mut g = graph();
        let a = g.add_node(Box::new(ConstNode { value: 0.25 }));
        let b = g.add_node(Box::new(ConstNode { value: 0.5 }));
        let sum = g.add_node(Box::new(GainNode::new(1.0, g.sample_rate())));
        g.connect(a, sum);
        g.connect(b, sum);
        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        // A couple of blocks so the gain smoother settles (it starts at
        // its initial value, so unity from the start here).
        g.render_into(sum, &mut l, &mut r);
        assert!((l[32] - 0.75).abs() < 1e-5, "got {}", l[32]);
        assert!((r[32] - 0.75).abs() < 1e-5);
    }

    #[test]
    fn render_into_zeroes_when_tap_missing() {
        let mut g = graph();
        let a = g.add_node(Box::new(ConstNode { value: 1.0 }));
        g.remove_node(a);
        let mut l = vec![1.0; 64];
        let mut r = vec![1.0; 64];
        g.render_into(a, &mut l, &mut r);
        assert!(l.iter().all(|s| *s == 0.0));
        assert!(r.iter().all(|s| *s == 0.0));
    }
}
