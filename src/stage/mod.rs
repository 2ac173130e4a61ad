//! Effect stages: the unit the engine chains between source and sink.
//!
//! A stage instance owns one or more graph nodes. Simple stages (gain,
//! pan) are a single node, so entry == exit. Composite stages (delay)
//! wire private internal nodes together once, at creation, and expose
//! distinct entry and exit boundaries; the engine connects only to those
//! boundaries and never inspects or disconnects the internal wiring.

pub mod delay;
pub mod drive;
pub mod gain;
pub mod pan;
pub mod registry;

pub use registry::{ParamSpec, StageDefinition, StageRegistry, UnknownStageKind};

use crate::graph::{NodeId, SignalGraph};
use std::collections::BTreeMap;

/// Named parameter values for one stage. Ordered map so snapshots and
/// debug dumps serialize deterministically.
pub type StageParams = BTreeMap<String, f32>;

pub trait StageInstance: Send {
    /// The node upstream output connects into.
    fn entry(&self) -> NodeId;

    /// The node this stage's output leaves from.
    fn exit(&self) -> NodeId;

    /// Apply a parameter mapping to the live nodes. Called on every
    /// rebuild, including with unchanged values, so it must be cheap and
    /// idempotent. Provided values are clamped to the schema range;
    /// unknown keys are ignored; missing keys leave prior values alone.
    fn update(&mut self, graph: &mut SignalGraph, params: &StageParams);

    /// Remove every node this instance created, including any internal
    /// feedback wiring. Consumes the instance, so it runs at most once.
    fn dispose(self: Box<Self>, graph: &mut SignalGraph);
}

/// Look up `name` in both the schema and the provided params, returning
/// the clamped value if the caller supplied one.
pub(crate) fn clamped_param(
    specs: &[ParamSpec],
    params: &StageParams,
    name: &str,
) -> Option<f32> {
    let spec = specs.iter().find(|s| s.name == name)?;
    params.get(name).map(|v| spec.clamp(*v))
}
