use crate::graph::gain::GainNode;
use crate::graph::{NodeId, SignalGraph};
use crate::stage::registry::{ParamSpec, StageDefinition};
use crate::stage::{StageInstance, StageParams, clamped_param};

// Range matches the gain worklet this kind stands in for: [0, 2].
pub const PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "gain",
    label: "Gain",
    min: 0.0,
    max: 2.0,
    step: 0.01,
    default: 1.0,
    unit: "x",
}];

pub fn definition() -> StageDefinition {
    StageDefinition::new("gain", "Gain", PARAMS, create)
}

/// Single-node stage: entry and exit are the same gain node.
struct GainStage {
    node: NodeId,
}

fn create(graph: &mut SignalGraph, params: &StageParams) -> Box<dyn StageInstance> {
    let gain = clamped_param(PARAMS, params, "gain").unwrap_or(PARAMS[0].default);
    let node = graph.add_node(Box::new(GainNode::new(gain, graph.sample_rate())));
    Box::new(GainStage { node })
}

impl StageInstance for GainStage {
    fn entry(&self) -> NodeId {
        self.node
    }

    fn exit(&self) -> NodeId {
        self.node
    }

    fn update(&mut self, graph: &mut SignalGraph, params: &StageParams) {
        if let Some(gain) = clamped_param(PARAMS, params, "gain")
            && let Some(node) = graph.node_mut::<GainNode>(self.node)
        {
            node.set_gain(gain);
        }
    }

    fn dispose(self: Box<Self>, graph: &mut SignalGraph) {
        graph.remove_node(self.node);
    }
}
