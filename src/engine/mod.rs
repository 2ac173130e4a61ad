//! The signal-chain engine.
//!
//! Owns canonical [`EngineState`], the stage instance table, and the live
//! [`SignalGraph`]. Every command mutates state, pushes a snapshot to
//! subscribers, and then rebuilds the graph so topology always matches
//! the declared chain. The graph sits behind a mutex shared with the io
//! layer; commands hold it only for the duration of a rebuild.

pub mod capture;
pub mod state;

pub use capture::{CaptureError, CaptureProvider, NullCapture};
pub use state::{
    EngineState, MicrophoneState, MoveDirection, OscillatorState, SourceKind, StageId,
    StageParams, StageState, Waveform,
};

use crossbeam::channel::{Receiver, Sender, unbounded};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::analysis::{Levels, SpectrumAnalyzer, lin_to_db};
use crate::graph::analyser::{AnalyserNode, MeterHandle};
use crate::graph::capture::{CaptureNode, CaptureStream};
use crate::graph::gain::GainNode;
use crate::graph::oscillator::OscillatorNode;
use crate::graph::{NodeId, SignalGraph};
use crate::stage::registry::UnknownStageKind;
use crate::stage::{StageInstance, StageRegistry};
use thiserror::Error;

/// Samples retained by the analysis tap; also the FFT size.
pub const ANALYSIS_WINDOW: usize = 2048;

const MIN_MASTER_GAIN: f32 = 0.0;
const MAX_MASTER_GAIN: f32 = 2.0;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    UnknownStageKind(#[from] UnknownStageKind),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Read-only snapshot of engine internals for debug tooling.
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub sample_rate: f32,
    pub block_size: usize,
    pub declared_source: SourceKind,
    pub effective_source: Option<SourceKind>,
    pub oscillator_live: bool,
    pub capture_live: bool,
    pub master_gain: f32,
    pub node_count: usize,
    pub connection_count: usize,
    pub analysis: AnalysisDebug,
    pub stages: Vec<StageDebug>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisDebug {
    pub window_size: usize,
    pub spectrum_bins: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageDebug {
    pub id: StageId,
    pub kind: String,
    pub bypassed: bool,
    pub instantiated: bool,
    pub entry: Option<NodeId>,
    pub exit: Option<NodeId>,
}

fn lock_graph(graph: &Mutex<SignalGraph>) -> MutexGuard<'_, SignalGraph> {
    graph.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Engine {
    state: EngineState,
    graph: Arc<Mutex<SignalGraph>>,
    registry: StageRegistry,
    instances: HashMap<StageId, Box<dyn StageInstance>>,
    subscribers: Vec<Sender<EngineState>>,
    capture_provider: Box<dyn CaptureProvider>,
    /// Stream acquired but not yet wired into a capture node.
    pending_stream: Option<Box<dyn CaptureStream>>,
    osc_node: Option<NodeId>,
    capture_node: Option<NodeId>,
    master: NodeId,
    analyser: NodeId,
    meter: MeterHandle,
    spectrum: SpectrumAnalyzer,
    master_gain: f32,
    next_stage_id: u64,
}

impl Engine {
    pub fn new(sample_rate: f32, block_size: usize, capture: Box<dyn CaptureProvider>) -> Self {
        Self::with_registry(sample_rate, block_size, capture, StageRegistry::with_builtins())
    }

    /// Build an engine around a caller-assembled registry. The registry
    /// is read-only from here on.
    pub fn with_registry(
        sample_rate: f32,
        block_size: usize,
        capture: Box<dyn CaptureProvider>,
        registry: StageRegistry,
    ) -> Self {
        let mut graph = SignalGraph::new(sample_rate, block_size);
        let master = graph.add_node(Box::new(GainNode::new(1.0, sample_rate)));
        let (analyser_node, meter) = AnalyserNode::new(ANALYSIS_WINDOW);
        let analyser = graph.add_node(Box::new(analyser_node));
        info!("engine up: {sample_rate} Hz, block {block_size}");

        Self {
            state: EngineState::default(),
            graph: Arc::new(Mutex::new(graph)),
            registry,
            instances: HashMap::new(),
            subscribers: Vec::new(),
            capture_provider: capture,
            pending_stream: None,
            osc_node: None,
            capture_node: None,
            master,
            analyser,
            meter,
            spectrum: SpectrumAnalyzer::new(ANALYSIS_WINDOW),
            master_gain: 1.0,
            next_stage_id: 0,
        }
    }

    // ---- observation ----------------------------------------------------

    /// A fully independent clone of the current canonical state.
    pub fn snapshot(&self) -> EngineState {
        self.state.clone()
    }

    /// Subscribe to state changes. The current snapshot is delivered
    /// immediately; a fresh one follows every mutation. Dropping the
    /// receiver unsubscribes (the sender is pruned on the next emit).
    pub fn subscribe(&mut self) -> Receiver<EngineState> {
        let (tx, rx) = unbounded();
        let _ = tx.send(self.state.clone());
        self.subscribers.push(tx);
        rx
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Shared handle to the live graph, for the io layer's render path.
    pub fn graph_handle(&self) -> Arc<Mutex<SignalGraph>> {
        Arc::clone(&self.graph)
    }

    /// The master output node the io layer taps for playback.
    pub fn master_node(&self) -> NodeId {
        self.master
    }

    /// Lock-free level reader, safe to poll from any thread.
    pub fn meter(&self) -> MeterHandle {
        self.meter.clone()
    }

    fn emit(&mut self) {
        let state = &self.state;
        self.subscribers.retain(|tx| tx.send(state.clone()).is_ok());
    }

    // ---- source commands ------------------------------------------------

    pub fn start_oscillator(&mut self) {
        self.state.oscillator.running = true;
        self.state.source = SourceKind::Oscillator;
        self.emit();
        self.rebuild();
    }

    pub fn stop_oscillator(&mut self) {
        self.state.oscillator.running = false;
        self.emit();
        self.rebuild();
    }

    pub fn set_frequency(&mut self, hz: f32) {
        self.state.oscillator.frequency_hz =
            hz.clamp(state::MIN_FREQUENCY_HZ, state::MAX_FREQUENCY_HZ);
        self.emit();
        self.rebuild();
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.state.oscillator.waveform = waveform;
        self.emit();
        self.rebuild();
    }

    /// Acquire the capture stream and route it into the chain. On failure
    /// canonical state is left exactly as it was. A second call while
    /// capture is already live is a no-op.
    pub fn enable_microphone(&mut self) -> Result<(), CaptureError> {
        if self.capture_node.is_some() || self.pending_stream.is_some() {
            debug!("enable_microphone: capture already live");
            return Ok(());
        }
        let stream = self.capture_provider.open()?;
        self.pending_stream = Some(stream);
        self.state.microphone.enabled = true;
        self.state.source = SourceKind::Microphone;
        self.emit();
        self.rebuild();
        Ok(())
    }

    /// Release the capture stream. Falls back to the oscillator when the
    /// microphone was the routed source.
    pub fn disable_microphone(&mut self) {
        self.pending_stream = None;
        self.state.microphone.enabled = false;
        if self.state.source == SourceKind::Microphone {
            self.state.source = SourceKind::Oscillator;
        }
        self.emit();
        self.rebuild();
    }

    /// Route a source into the chain. Returns `false` without mutating
    /// anything when the requested source is not currently available.
    pub fn set_source(&mut self, kind: SourceKind) -> bool {
        let available = match kind {
            SourceKind::Oscillator => self.state.oscillator.running,
            SourceKind::Microphone => {
                self.capture_node.is_some() || self.pending_stream.is_some()
            }
        };
        if !available {
            debug!("set_source: {kind} unavailable");
            return false;
        }
        self.state.source = kind;
        self.emit();
        self.rebuild();
        true
    }

    // ---- stage commands -------------------------------------------------

    /// Create a stage with default params, inserted after `after` when
    /// given and found, appended otherwise. Returns the new stage's id.
    pub fn add_stage(
        &mut self,
        kind: &str,
        after: Option<StageId>,
    ) -> Result<StageId, EngineError> {
        let params = self.registry.default_params(kind)?;
        let id = StageId(self.next_stage_id);
        self.next_stage_id += 1;
        let index = after
            .and_then(|a| self.state.stage_index(a))
            .map_or(self.state.stages.len(), |i| i + 1);
        self.state.stages.insert(
            index,
            StageState {
                id,
                kind: kind.to_string(),
                bypassed: false,
                params,
            },
        );
        info!("added stage {id} ({kind}) at index {index}");
        self.emit();
        self.rebuild();
        Ok(id)
    }

    /// Remove a stage from the chain. The instance is disposed during the
    /// rebuild's garbage collection. Stale ids are silently ignored.
    pub fn remove_stage(&mut self, id: StageId) {
        let Some(index) = self.state.stage_index(id) else {
            debug!("remove_stage: stale id {id}");
            return;
        };
        self.state.stages.remove(index);
        info!("removed stage {id}");
        self.emit();
        self.rebuild();
    }

    /// Toggle a stage's bypass flag. The instance is kept alive and
    /// updated but excluded from connections while bypassed.
    pub fn set_stage_bypass(&mut self, id: StageId, bypassed: bool) {
        let Some(stage) = self.state.stage_mut(id) else {
            debug!("set_stage_bypass: stale id {id}");
            return;
        };
        stage.bypassed = bypassed;
        self.emit();
        self.rebuild();
    }

    /// Merge a partial params mapping into a stage's params. Values are
    /// clamped to the schema range; unknown keys are dropped; keys not
    /// mentioned keep their prior values.
    pub fn set_stage_params(&mut self, id: StageId, partial: &StageParams) {
        let Some(index) = self.state.stage_index(id) else {
            debug!("set_stage_params: stale id {id}");
            return;
        };
        let Ok(definition) = self.registry.get(&self.state.stages[index].kind) else {
            return;
        };
        let mut merged = self.state.stages[index].params.clone();
        for (name, value) in partial {
            if let Some(spec) = definition.param(name) {
                merged.insert(name.clone(), spec.clamp(*value));
            }
        }
        self.state.stages[index].params = merged;
        self.emit();
        self.rebuild();
    }

    /// Swap a stage with its neighbour. A no-op at either boundary or for
    /// stale ids.
    pub fn move_stage(&mut self, id: StageId, direction: MoveDirection) {
        let Some(index) = self.state.stage_index(id) else {
            debug!("move_stage: stale id {id}");
            return;
        };
        let target = match direction {
            MoveDirection::TowardSource if index > 0 => index - 1,
            MoveDirection::TowardSink if index + 1 < self.state.stages.len() => index + 1,
            _ => return,
        };
        self.state.stages.swap(index, target);
        self.emit();
        self.rebuild();
    }

    // ---- master / metering ----------------------------------------------

    /// Master output gain, linear, clamped to [0, 2]. Applied after the
    /// metering tap, so meters read the chain tail unscaled.
    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain.clamp(MIN_MASTER_GAIN, MAX_MASTER_GAIN);
        let graph = Arc::clone(&self.graph);
        let mut g = lock_graph(&graph);
        if let Some(node) = g.node_mut::<GainNode>(self.master) {
            node.set_gain(self.master_gain);
        }
    }

    /// The tap's current time-domain window, oldest sample first.
    pub fn time_domain_samples(&self) -> Vec<f32> {
        let g = lock_graph(&self.graph);
        g.node_ref::<AnalyserNode>(self.analyser)
            .map_or_else(|| vec![0.0; ANALYSIS_WINDOW], AnalyserNode::window)
    }

    /// Magnitude spectrum of the current window, in dB.
    pub fn frequency_spectrum(&mut self) -> Vec<f32> {
        let window = self.time_domain_samples();
        self.spectrum.magnitude_db(&window)
    }

    /// Instantaneous peak/RMS of the mono mix at the tap.
    pub fn levels(&self) -> Levels {
        crate::analysis::levels(&self.time_domain_samples())
    }

    /// Per-channel peak/RMS pairs: (left, right).
    pub fn stereo_levels(&self) -> (Levels, Levels) {
        let g = lock_graph(&self.graph);
        g.node_ref::<AnalyserNode>(self.analyser).map_or_else(
            || {
                let floor = Levels {
                    peak_db: lin_to_db(0.0),
                    rms_db: lin_to_db(0.0),
                };
                (floor, floor)
            },
            |tap| {
                let (left, right) = tap.channel_windows();
                (crate::analysis::levels(&left), crate::analysis::levels(&right))
            },
        )
    }

    pub fn debug_info(&self) -> DebugInfo {
        let g = lock_graph(&self.graph);
        let stages = self
            .state
            .stages
            .iter()
            .map(|st| {
                let instance = self.instances.get(&st.id);
                StageDebug {
                    id: st.id,
                    kind: st.kind.clone(),
                    bypassed: st.bypassed,
                    instantiated: instance.is_some(),
                    entry: instance.map(|i| i.entry()),
                    exit: instance.map(|i| i.exit()),
                }
            })
            .collect();
        DebugInfo {
            sample_rate: g.sample_rate(),
            block_size: g.block_size(),
            declared_source: self.state.source,
            effective_source: self.resolve_effective().map(|(kind, _)| kind),
            oscillator_live: self.osc_node.is_some(),
            capture_live: self.capture_node.is_some(),
            master_gain: self.master_gain,
            node_count: g.node_count(),
            connection_count: g.connection_count(),
            analysis: AnalysisDebug {
                window_size: ANALYSIS_WINDOW,
                spectrum_bins: self.spectrum.bins(),
            },
            stages,
        }
    }

    /// The source actually routed into the chain right now, which can
    /// differ from the declared source while one is unavailable.
    pub fn effective_source(&self) -> Option<SourceKind> {
        self.resolve_effective().map(|(kind, _)| kind)
    }

    // ---- rebuild --------------------------------------------------------

    fn resolve_effective(&self) -> Option<(SourceKind, NodeId)> {
        let osc = self.osc_node.map(|id| (SourceKind::Oscillator, id));
        let mic = self.capture_node.map(|id| (SourceKind::Microphone, id));
        match self.state.source {
            SourceKind::Oscillator => osc.or(mic),
            SourceKind::Microphone => mic.or(osc),
        }
    }

    /// Re-derive the live graph from canonical state. Idempotent; runs
    /// after every mutation.
    fn rebuild(&mut self) {
        let graph = Arc::clone(&self.graph);
        let mut g = lock_graph(&graph);

        // Undo only the boundary wiring this engine made: the output side
        // of every chain participant. Stage inputs are never touched, so
        // composite stages keep their private internal wiring.
        if let Some(id) = self.osc_node {
            g.disconnect_outputs(id);
        }
        if let Some(id) = self.capture_node {
            g.disconnect_outputs(id);
        }
        for instance in self.instances.values() {
            g.disconnect_outputs(instance.exit());
        }

        // Reconcile source nodes with declared state.
        if self.state.oscillator.running {
            let id = match self.osc_node {
                Some(id) => id,
                None => {
                    let sr = g.sample_rate();
                    let id = g.add_node(Box::new(OscillatorNode::new(
                        self.state.oscillator.waveform,
                        self.state.oscillator.frequency_hz,
                        sr,
                    )));
                    debug!("created oscillator node {id}");
                    self.osc_node = Some(id);
                    id
                }
            };
            if let Some(osc) = g.node_mut::<OscillatorNode>(id) {
                osc.set_waveform(self.state.oscillator.waveform);
                osc.set_frequency(self.state.oscillator.frequency_hz);
            }
        } else if let Some(id) = self.osc_node.take() {
            debug!("destroying oscillator node {id}");
            g.remove_node(id);
        }

        if self.state.microphone.enabled {
            if self.capture_node.is_none()
                && let Some(stream) = self.pending_stream.take()
            {
                let id = g.add_node(Box::new(CaptureNode::new(stream)));
                debug!("created capture node {id}");
                self.capture_node = Some(id);
            }
        } else if let Some(id) = self.capture_node.take() {
            debug!("destroying capture node {id}, stream released");
            g.remove_node(id);
        }

        // Garbage-collect instances whose id left the chain. Runs before
        // the source check so removals dispose even while nothing plays.
        let live: HashSet<StageId> = self.state.stages.iter().map(|s| s.id).collect();
        let dead: Vec<StageId> = self
            .instances
            .keys()
            .filter(|id| !live.contains(id))
            .copied()
            .collect();
        for id in dead {
            if let Some(instance) = self.instances.remove(&id) {
                debug!("disposing stage instance {id}");
                instance.dispose(&mut g);
            }
        }

        // Resolve the effective source, self-healing declared state when
        // it points at a source that no longer exists. Neither existing
        // is not an error; there is just nothing to play yet.
        let Some((effective, source_id)) = self.resolve_effective() else {
            debug!("rebuild: no source available, graph left unwired");
            return;
        };
        if effective != self.state.source {
            warn!(
                "declared source {} unavailable, falling back to {effective}",
                self.state.source
            );
            self.state.source = effective;
            self.emit();
        }

        // Walk the chain: lazily instantiate, always update, connect the
        // non-bypassed stages in declared order.
        let stage_list = self.state.stages.clone();
        let mut tail = source_id;
        for st in &stage_list {
            if !self.instances.contains_key(&st.id) {
                match self.registry.get(&st.kind) {
                    Ok(definition) => {
                        let instance = definition.create(&mut g, &st.params);
                        self.instances.insert(st.id, instance);
                    }
                    Err(e) => {
                        warn!("stage {}: {e}, skipping", st.id);
                        continue;
                    }
                }
            }
            let Some(instance) = self.instances.get_mut(&st.id) else {
                continue;
            };
            instance.update(&mut g, &st.params);
            if !st.bypassed {
                g.connect(tail, instance.entry());
                tail = instance.exit();
            }
        }

        // Fan the chain tail out to the master output and the analysis
        // tap in parallel; both see the identical signal.
        g.connect(tail, self.master);
        g.connect(tail, self.analyser);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Release the capture resource so the OS capture indicator turns
        // off even if the io layer still holds a graph handle.
        self.pending_stream = None;
        if let Some(id) = self.capture_node.take() {
            let graph = Arc::clone(&self.graph);
            let mut g = lock_graph(&graph);
            g.remove_node(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(48_000.0, 128, Box::new(NullCapture))
    }

    #[test]
    fn subscribe_delivers_current_snapshot_immediately() {
        let mut e = engine();
        let rx = e.subscribe();
        let snap = rx.try_recv().expect("initial snapshot");
        assert_eq!(snap.source, SourceKind::Oscillator);
        assert!(!snap.oscillator.running);
    }

    #[test]
    fn every_mutation_emits_exactly_one_snapshot() {
        let mut e = engine();
        let rx = e.subscribe();
        let _ = rx.try_recv();
        e.start_oscillator();
        e.set_frequency(880.0);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn stage_ids_are_unique_for_process_lifetime() {
        let mut e = engine();
        let a = e.add_stage("gain", None).unwrap();
        e.remove_stage(a);
        let b = e.add_stage("gain", None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn add_stage_with_unknown_kind_leaves_state_unchanged() {
        let mut e = engine();
        let err = e.add_stage("chorus", None).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStageKind(_)));
        assert!(e.snapshot().stages.is_empty());
    }

    #[test]
    fn frequency_command_clamps() {
        let mut e = engine();
        e.set_frequency(1.0);
        assert_eq!(e.snapshot().oscillator.frequency_hz, 20.0);
        e.set_frequency(1e6);
        assert_eq!(e.snapshot().oscillator.frequency_hz, 2000.0);
    }

    #[test]
    fn snapshots_do_not_alias_engine_state() {
        let mut e = engine();
        let id = e.add_stage("gain", None).unwrap();
        let mut snap = e.snapshot();
        snap.stages[0].params.insert("gain".to_string(), 0.0);
        let mut partial = StageParams::new();
        partial.insert("gain".to_string(), 1.5);
        e.set_stage_params(id, &partial);
        assert_eq!(e.snapshot().stages[0].params["gain"], 1.5);
    }

    #[test]
    fn master_gain_is_clamped_and_reported() {
        let mut e = engine();
        e.set_master_gain(10.0);
        assert_eq!(e.debug_info().master_gain, 2.0);
    }
}
