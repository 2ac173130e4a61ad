use crate::graph::panner::PannerNode;
use crate::graph::{NodeId, SignalGraph};
use crate::stage::registry::{ParamSpec, StageDefinition};
use crate::stage::{StageInstance, StageParams, clamped_param};

pub const PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "pan",
    label: "Pan",
    min: -1.0,
    max: 1.0,
    step: 0.01,
    default: 0.0,
    unit: "",
}];

pub fn definition() -> StageDefinition {
    StageDefinition::new("pan", "Pan", PARAMS, create)
}

struct PanStage {
    node: NodeId,
}

fn create(graph: &mut SignalGraph, params: &StageParams) -> Box<dyn StageInstance> {
    let pan = clamped_param(PARAMS, params, "pan").unwrap_or(PARAMS[0].default);
    let node = graph.add_node(Box::new(PannerNode::new(pan, graph.sample_rate())));
    Box::new(PanStage { node })
}

impl StageInstance for PanStage {
    fn entry(&self) -> NodeId {
        self.node
    }

    fn exit(&self) -> NodeId {
        self.node
    }

    fn update(&mut self, graph: &mut SignalGraph, params: &StageParams) {
        if let Some(pan) = clamped_param(PARAMS, params, "pan")
            && let Some(node) = graph.node_mut::<PannerNode>(self.node)
        {
            node.set_pan(pan);
        }
    }

    fn dispose(self: Box<Self>, graph: &mut SignalGraph) {
        graph.remove_node(self.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_clamps_pan() {
        let mut g = SignalGraph::new(48_000.0, 64);
        let mut stage = create(&mut g, &StageParams::new());
        let mut params = StageParams::new();
        params.insert("pan".to_string(), -3.0);
        stage.update(&mut g, &params);
        let node = g.node_ref::<PannerNode>(stage.entry()).unwrap();
        assert_eq!(node.pan(), -1.0);
    }
}
