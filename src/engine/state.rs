//! Canonical engine state: the single source of truth the live graph is
//! derived from. Snapshots of these types are what subscribers receive;
//! they are fully owned clones and never alias engine internals.

use serde::{Deserialize, Serialize};

pub use crate::graph::oscillator::{MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ, Waveform};
pub use crate::stage::StageParams;

/// Stable identifier for a stage, assigned at creation from a
/// process-lifetime counter and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StageId(pub(crate) u64);

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Oscillator,
    Microphone,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Oscillator => write!(f, "oscillator"),
            SourceKind::Microphone => write!(f, "microphone"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscillatorState {
    pub running: bool,
    pub waveform: Waveform,
    pub frequency_hz: f32,
}

impl Default for OscillatorState {
    fn default() -> Self {
        Self {
            running: false,
            waveform: Waveform::Sine,
            frequency_hz: 440.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MicrophoneState {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    pub id: StageId,
    pub kind: String,
    pub bypassed: bool,
    pub params: StageParams,
}

/// The full canonical state. `stages` order is processing order:
/// source → stages[0] → … → stages[n-1] → sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineState {
    pub source: SourceKind,
    pub oscillator: OscillatorState,
    pub microphone: MicrophoneState,
    pub stages: Vec<StageState>,
}

impl EngineState {
    pub fn stage(&self, id: StageId) -> Option<&StageState> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn stage_mut(&mut self, id: StageId) -> Option<&mut StageState> {
        self.stages.iter_mut().find(|s| s.id == id)
    }

    pub fn stage_index(&self, id: StageId) -> Option<usize> {
        self.stages.iter().position(|s| s.id == id)
    }
}

/// Which neighbour [`move_stage`](crate::engine::Engine::move_stage)
/// swaps a stage with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MoveDirection {
    TowardSource,
    TowardSink,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut state = EngineState::default();
        state.stages.push(StageState {
            id: StageId(3),
            kind: "delay".to_string(),
            bypassed: true,
            params: [("mix".to_string(), 0.5)].into_iter().collect(),
        });
        let json = serde_json::to_string(&state).unwrap();
        let back: EngineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stages.len(), 1);
        assert_eq!(back.stages[0].id, StageId(3));
        assert!(back.stages[0].bypassed);
        assert_eq!(back.stages[0].params["mix"], 0.5);
    }

    #[test]
    fn default_state_is_idle_oscillator() {
        let state = EngineState::default();
        assert_eq!(state.source, SourceKind::Oscillator);
        assert!(!state.oscillator.running);
        assert!(!state.microphone.enabled);
        assert!(state.stages.is_empty());
    }
}
