use crate::graph::waveshaper::WaveshaperNode;
use crate::graph::{NodeId, SignalGraph};
use crate::stage::registry::{ParamSpec, StageDefinition};
use crate::stage::{StageInstance, StageParams, clamped_param};

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "drive",
        label: "Drive",
        min: 1.0,
        max: 10.0,
        step: 0.1,
        default: 2.0,
        unit: "x",
    },
    ParamSpec {
        name: "level",
        label: "Level",
        min: 0.0,
        max: 2.0,
        step: 0.01,
        default: 1.0,
        unit: "x",
    },
];

pub fn definition() -> StageDefinition {
    StageDefinition::new("drive", "Drive", PARAMS, create)
}

/// Waveshaping drive, the built-in DSP-backed kind. Single node, so
/// entry == exit; the shaping math is opaque to the engine.
struct DriveStage {
    node: NodeId,
}

fn create(graph: &mut SignalGraph, params: &StageParams) -> Box<dyn StageInstance> {
    let drive = clamped_param(PARAMS, params, "drive").unwrap_or(PARAMS[0].default);
    let level = clamped_param(PARAMS, params, "level").unwrap_or(PARAMS[1].default);
    let node = graph.add_node(Box::new(WaveshaperNode::new(
        drive,
        level,
        graph.sample_rate(),
    )));
    Box::new(DriveStage { node })
}

impl StageInstance for DriveStage {
    fn entry(&self) -> NodeId {
        self.node
    }

    fn exit(&self) -> NodeId {
        self.node
    }

    fn update(&mut self, graph: &mut SignalGraph, params: &StageParams) {
        let drive = clamped_param(PARAMS, params, "drive");
        let level = clamped_param(PARAMS, params, "level");
        if let Some(node) = graph.node_mut::<WaveshaperNode>(self.node) {
            if let Some(drive) = drive {
                node.set_drive(drive);
            }
            if let Some(level) = level {
                node.set_level(level);
            }
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
    fn update_is_idempotent() {
        let mut g = SignalGraph::new(48_000.0, 64);
        let mut stage = create(&mut g, &StageParams::new());
        let mut params = StageParams::new();
        params.insert("drive".to_string(), 50.0);
        stage.update(&mut g, &params);
        stage.update(&mut g, &params);
        let node = g.node_ref::<WaveshaperNode>(stage.entry()).unwrap();
        assert_eq!(node.drive(), 10.0);
        assert_eq!(node.level(), 1.0);
    }
}
