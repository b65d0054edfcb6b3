//! Execution log / inspector
//!
//! Read-only window onto a run's store for debugging and tracing
//! collaborators. Nothing here can mutate the store it inspects; replays
//! run against a scratch store built from the same schema.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::state::{
    DeltaRecord, FieldUpdate, SharedStateStore, StateSnapshot, StateStore,
};

/// Read-only access to one store and its delta log
#[derive(Debug, Clone)]
pub struct Inspector {
    store: SharedStateStore,
}

impl Inspector {
    pub fn new(store: SharedStateStore) -> Self {
        Self { store }
    }

    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.store.snapshot()
    }

    pub fn history(&self) -> Vec<DeltaRecord> {
        self.store.history()
    }

    pub fn history_since(&self, version: u64) -> Vec<DeltaRecord> {
        self.store.history_since(version)
    }

    /// Rebuild the snapshot as it was at `version`.
    pub fn replay_to(&self, version: u64) -> EngineResult<StateSnapshot> {
        let current = self.store.version();
        if version > current {
            return Err(EngineError::Configuration(format!(
                "cannot replay to version {} (store is at {})",
                version, current
            )));
        }

        let scratch = StateStore::new(self.store.schema().clone());
        for record in self
            .store
            .history()
            .into_iter()
            .take_while(|r| r.version <= version)
        {
            scratch.apply_from(&record.origin, record.delta).map_err(|e| {
                EngineError::Configuration(format!(
                    "delta {} does not replay: {}",
                    record.version, e
                ))
            })?;
        }
        Ok(scratch.snapshot())
    }

    pub fn stats(&self) -> InspectorStats {
        InspectorStats::from_history(&self.store.history())
    }
}

/// Aggregate counts over a delta log
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct InspectorStats {
    pub total_deltas: usize,
    pub deltas_by_origin: BTreeMap<String, usize>,
    pub records_appended: usize,
    pub records_removed: usize,
}

impl InspectorStats {
    pub fn from_history(history: &[DeltaRecord]) -> Self {
        let mut stats = Self::default();
        for record in history {
            stats.total_deltas += 1;
            *stats
                .deltas_by_origin
                .entry(record.origin.clone())
                .or_insert(0) += 1;

            for entry in record.delta.updates() {
                match &entry.update {
                    FieldUpdate::Append(records) => stats.records_appended += records.len(),
                    FieldUpdate::Remove(ids) => stats.records_removed += ids.len(),
                    FieldUpdate::Set(_) => {}
                }
            }
        }
        stats
    }
}
