use crate::graph::delay_line::{DelayLineNode, MAX_DELAY_MS};
use crate::graph::gain::GainNode;
use crate::graph::{NodeId, SignalGraph};
use crate::stage::registry::{ParamSpec, StageDefinition};
use crate::stage::{StageInstance, StageParams, clamped_param};

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "time_ms",
        label: "Time",
        min: 0.0,
        max: MAX_DELAY_MS,
        step: 1.0,
        default: 300.0,
        unit: "ms",
    },
    ParamSpec {
        name: "feedback",
        label: "Feedback",
        min: 0.0,
        max: 0.95,
        step: 0.01,
        default: 0.35,
        unit: "",
    },
    ParamSpec {
        name: "mix",
        label: "Mix",
        min: 0.0,
        max: 1.0,
        step: 0.01,
        default: 0.3,
        unit: "",
    },
];

pub fn definition() -> StageDefinition {
    StageDefinition::new("delay", "Delay", PARAMS, create)
}

/// Composite stage with a private feedback loop:
///
/// ```text
/// entry ──► line ──► wet ──► exit
///   │        ▲ │
///   │        └─◄── feedback
///   └──────► dry ─────────► exit
/// ```
///
/// The internal edges are created once, here, and must survive every
/// engine rebuild: the engine disconnects only the *output* side of exit,
/// so entry's fan-out and the feedback loop stay intact for the life of
/// the instance.
struct DelayStage {
    entry: NodeId,
    line: NodeId,
    feedback: NodeId,
    wet: NodeId,
    dry: NodeId,
    exit: NodeId,
}

fn param_or_default(params: &StageParams, name: &str) -> f32 {
    clamped_param(PARAMS, params, name).unwrap_or_else(|| {
        PARAMS
            .iter()
            .find(|p| p.name == name)
            .map_or(0.0, |p| p.default)
    })
}

fn create(graph: &mut SignalGraph, params: &StageParams) -> Box<dyn StageInstance> {
    Box::new(build(graph, params))
}

fn build(graph: &mut SignalGraph, params: &StageParams) -> DelayStage {
    let sr = graph.sample_rate();
    let time_ms = param_or_default(params, "time_ms");
    let fb = param_or_default(params, "feedback");
    let mix = param_or_default(params, "mix");

    let entry = graph.add_node(Box::new(GainNode::new(1.0, sr)));
    let line = graph.add_node(Box::new(DelayLineNode::new(time_ms, sr)));
    let feedback = graph.add_node(Box::new(GainNode::new(fb, sr)));
    let wet = graph.add_node(Box::new(GainNode::new(mix, sr)));
    let dry = graph.add_node(Box::new(GainNode::new(1.0 - mix, sr)));
    let exit = graph.add_node(Box::new(GainNode::new(1.0, sr)));

    graph.connect(entry, line);
    graph.connect(entry, dry);
    graph.connect(line, feedback);
    graph.connect(feedback, line);
    graph.connect(line, wet);
    graph.connect(wet, exit);
    graph.connect(dry, exit);

    DelayStage {
        entry,
        line,
        feedback,
        wet,
        dry,
        exit,
    }
}

impl StageInstance for DelayStage {
    fn entry(&self) -> NodeId {
        self.entry
    }

    fn exit(&self) -> NodeId {
        self.exit
    }

    fn update(&mut self, graph: &mut SignalGraph, params: &StageParams) {
        if let Some(time_ms) = clamped_param(PARAMS, params, "time_ms")
            && let Some(line) = graph.node_mut::<DelayLineNode>(self.line)
        {
            line.set_delay_ms(time_ms);
        }
        if let Some(fb) = clamped_param(PARAMS, params, "feedback")
            && let Some(node) = graph.node_mut::<GainNode>(self.feedback)
        {
            node.set_gain(fb);
        }
        // Dry gain is derived from the wet mix, recomputed every call so
        // the pair can never drift apart.
        if let Some(mix) = clamped_param(PARAMS, params, "mix") {
            if let Some(node) = graph.node_mut::<GainNode>(self.wet) {
                node.set_gain(mix);
            }
            if let Some(node) = graph.node_mut::<GainNode>(self.dry) {
                node.set_gain(1.0 - mix);
            }
        }
    }

    fn dispose(self: Box<Self>, graph: &mut SignalGraph) {
        for node in [
            self.entry,
            self.line,
            self.feedback,
            self.wet,
            self.dry,
            self.exit,
        ] {
            graph.remove_node(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::test_util::ConstNode;

    const SAMPLE_RATE: f32 = 48_000.0;
    const BLOCK: usize = 64;

    fn graph() -> SignalGraph {
        SignalGraph::new(SAMPLE_RATE, BLOCK)
    }

    fn params(pairs: &[(&str, f32)]) -> StageParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn entry_and_exit_are_distinct() {
        let mut g = graph();
        let stage = create(&mut g, &StageParams::new());
        assert_ne!(stage.entry(), stage.exit());
        assert_eq!(g.node_count(), 6);
    }

    #[test]
    fn internal_wiring_survives_output_disconnect() {
        let mut g = graph();
        let stage = create(&mut g, &StageParams::new());
        let before = g.connection_count();
        // What the engine does on every rebuild.
        g.disconnect_outputs(stage.exit());
        assert_eq!(g.connection_count(), before);
    }

    #[test]
    fn update_recomputes_dry_from_mix() {
        let mut g = graph();
        let mut stage = build(&mut g, &params(&[("mix", 0.3)]));
        stage.update(&mut g, &params(&[("mix", 1.0)]));
        assert_eq!(g.node_ref::<GainNode>(stage.wet).unwrap().gain(), 1.0);
        assert_eq!(g.node_ref::<GainNode>(stage.dry).unwrap().gain(), 0.0);

        stage.update(&mut g, &params(&[("mix", 0.25)]));
        assert_eq!(g.node_ref::<GainNode>(stage.wet).unwrap().gain(), 0.25);
        assert_eq!(g.node_ref::<GainNode>(stage.dry).unwrap().gain(), 0.75);
    }

    #[test]
    fn dispose_removes_every_internal_node() {
        let mut g = graph();
        let stage = create(&mut g, &StageParams::new());
        assert_eq!(g.node_count(), 6);
        stage.dispose(&mut g);
        assert_eq!(g.node_count(), 0);
        assert_eq!(g.connection_count(), 0);
    }

    #[test]
    fn dry_passthrough_with_zero_mix() {
        let mut g = graph();
        let src = g.add_node(Box::new(ConstNode { value: 0.5 }));
        let mut stage = create(&mut g, &params(&[("mix", 0.0), ("feedback", 0.0)]));
        stage.update(&mut g, &params(&[("mix", 0.0)]));
        g.connect(src, stage.entry());

        let exit = stage.exit();
        let mut l = vec![0.0; BLOCK];
        let mut r = vec![0.0; BLOCK];
        // Let smoothers settle, then check passthrough.
        for _ in 0..400 {
            g.render_into(exit, &mut l, &mut r);
        }
        assert!((l[BLOCK - 1] - 0.5).abs() < 1e-3, "got {}", l[BLOCK - 1]);
    }

    #[test]
    fn wet_path_echoes_after_delay_time() {
        let mut g = graph();
        // 100 ms of delay at 48 kHz is 4800 samples = 75 blocks.
        let mut stage = create(
            &mut g,
            &params(&[("mix", 1.0), ("feedback", 0.0), ("time_ms", 100.0)]),
        );
        stage.update(&mut g, &StageParams::new());
        let src = g.add_node(Box::new(ConstNode { value: 0.8 }));
        g.connect(src, stage.entry());

        let exit = stage.exit();
        let mut l = vec![0.0; BLOCK];
        let mut r = vec![0.0; BLOCK];
        // Right after wiring, the wet-only output is still silent.
        g.render_into(exit, &mut l, &mut r);
        assert!(l[0].abs() < 1e-3);
        // After well over 100 ms, the delayed signal has arrived.
        for _ in 0..200 {
            g.render_into(exit, &mut l, &mut r);
        }
        assert!(l[BLOCK - 1] > 0.5, "expected delayed signal, got {}", l[BLOCK - 1]);
    }
}
