//! Static catalog of stage kinds: parameter schemas plus factories.
//!
//! Built once at engine startup and read-only afterwards. The schema side
//! drives generic parameter controls; the factory side instantiates a
//! runtime stage into a graph.

use crate::graph::SignalGraph;
use crate::stage::{StageInstance, StageParams};
use log::debug;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown stage kind `{0}`")]
pub struct UnknownStageKind(pub String);

/// Schema for one numeric parameter.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    pub default: f32,
    /// Display unit ("x", "ms", "%"). Presentation only.
    pub unit: &'static str,
}

impl ParamSpec {
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }
}

pub type StageFactory = fn(&mut SignalGraph, &StageParams) -> Box<dyn StageInstance>;

pub struct StageDefinition {
    pub kind: &'static str,
    pub label: &'static str,
    pub params: &'static [ParamSpec],
    factory: StageFactory,
}

impl StageDefinition {
    pub const fn new(
        kind: &'static str,
        label: &'static str,
        params: &'static [ParamSpec],
        factory: StageFactory,
    ) -> Self {
        Self {
            kind,
            label,
            params,
            factory,
        }
    }

    /// A full params mapping from the schema defaults.
    pub fn default_params(&self) -> StageParams {
        self.params
            .iter()
            .map(|p| (p.name.to_string(), p.default))
            .collect()
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Instantiate a runtime stage. Never fails: out-of-range initial
    /// params are clamped by the stage itself.
    pub fn create(
        &self,
        graph: &mut SignalGraph,
        params: &StageParams,
    ) -> Box<dyn StageInstance> {
        debug!("instantiating stage kind `{}`", self.kind);
        (self.factory)(graph, params)
    }
}

pub struct StageRegistry {
    entries: Vec<StageDefinition>,
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl StageRegistry {
    /// An empty registry. Useful for embedders that want full control
    /// over the available kinds.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry with the built-in kinds: gain, pan, delay, drive.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::stage::gain::definition());
        registry.register(crate::stage::pan::definition());
        registry.register(crate::stage::delay::definition());
        registry.register(crate::stage::drive::definition());
        registry
    }

    /// Register a definition. A later registration with the same kind
    /// replaces the earlier one.
    pub fn register(&mut self, definition: StageDefinition) {
        self.entries.retain(|d| d.kind != definition.kind);
        self.entries.push(definition);
    }

    pub fn get(&self, kind: &str) -> Result<&StageDefinition, UnknownStageKind> {
        self.entries
            .iter()
            .find(|d| d.kind == kind)
            .ok_or_else(|| UnknownStageKind(kind.to_string()))
    }

    pub fn default_params(&self, kind: &str) -> Result<StageParams, UnknownStageKind> {
        self.get(kind).map(StageDefinition::default_params)
    }

    /// All registered definitions, in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &StageDefinition> {
        self.entries.iter()
    }
}
