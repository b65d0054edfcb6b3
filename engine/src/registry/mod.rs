//! Stage Registry: static mapping from stage names to executable units
//!
//! Each registration declares the keys the stage reads and the keys it may
//! write. The registry is built once per run configuration and validated
//! against the state schema, so wiring mistakes fail at construction rather
//! than mid-run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::stage::SharedStageUnit;
use crate::state::StateSchema;

/// Declared access of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name, unique within a registry
    pub name: String,
    /// Keys the stage reads
    pub requires: BTreeSet<String>,
    /// Keys the stage may write
    pub writes: BTreeSet<String>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: BTreeSet::new(),
            writes: BTreeSet::new(),
        }
    }

    pub fn reads(mut self, keys: &[&str]) -> Self {
        self.requires.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub fn writes(mut self, keys: &[&str]) -> Self {
        self.writes.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub fn may_write(&self, key: &str) -> bool {
        self.writes.contains(key)
    }

    pub fn required_keys(&self) -> Vec<&str> {
        self.requires.iter().map(String::as_str).collect()
    }
}

/// A resolved registry entry
#[derive(Clone)]
pub struct RegisteredStage {
    pub spec: StageSpec,
    pub unit: SharedStageUnit,
}

impl std::fmt::Debug for RegisteredStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredStage")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Shared reference to StageRegistry
pub type SharedStageRegistry = Arc<StageRegistry>;

/// Immutable stage table for one run configuration
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: BTreeMap<String, RegisteredStage>,
}

impl StageRegistry {
    pub fn builder() -> StageRegistryBuilder {
        StageRegistryBuilder::default()
    }

    /// Look up a stage, failing with `UnknownStage` if it is not registered.
    pub fn resolve(&self, name: &str) -> EngineResult<&RegisteredStage> {
        self.stages
            .get(name)
            .ok_or_else(|| EngineError::UnknownStage(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn specs(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.values().map(|s| &s.spec)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn shared(self) -> SharedStageRegistry {
        Arc::new(self)
    }
}

/// Collects registrations, then validates them against a schema
#[derive(Default)]
pub struct StageRegistryBuilder {
    stages: Vec<RegisteredStage>,
}

impl StageRegistryBuilder {
    pub fn stage(mut self, spec: StageSpec, unit: SharedStageUnit) -> Self {
        self.stages.push(RegisteredStage { spec, unit });
        self
    }

    /// Finish registration.
    ///
    /// Fails on duplicate names and on keys the schema does not declare.
    pub fn build(self, schema: &StateSchema) -> EngineResult<StageRegistry> {
        let mut stages = BTreeMap::new();
        for entry in self.stages {
            let name = entry.spec.name.clone();
            for key in entry.spec.requires.iter().chain(entry.spec.writes.iter()) {
                if !schema.contains(key) {
                    return Err(EngineError::Configuration(format!(
                        "stage {} declares undeclared key {}",
                        name, key
                    )));
                }
            }
            if stages.insert(name.clone(), entry).is_some() {
                return Err(EngineError::Configuration(format!(
                    "stage {} registered twice",
                    name
                )));
            }
        }
        Ok(StageRegistry { stages })
    }
}
