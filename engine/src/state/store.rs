//! Versioned in-memory state store for one workflow run
//!
//! Every declared key is initialised to its zero value at construction, so
//! reads never fail. Updates arrive as [`StateDelta`]s that are validated in
//! full before any key is touched; a rejected delta leaves the store exactly
//! as it was. Message keys are kept as an append-only log plus tombstones
//! and reduced to the visible sequence on read.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schema::{MergePolicy, StateSchema};
use super::types::{DebateState, Message, MessageId, StateValue, ValueKind};

/// Origin tag for deltas applied without a stage.
pub const EXTERNAL_ORIGIN: &str = "external";

/// Error type for state store operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Key not declared in schema: {0}")]
    UnknownKey(String),

    #[error("Update {update} not allowed on key {key} with policy {policy}")]
    PolicyMismatch {
        key: String,
        policy: MergePolicy,
        update: &'static str,
    },

    #[error("Key {key} holds {expected} values, got {actual}")]
    KindMismatch {
        key: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("Record {id} already present under {key}")]
    DuplicateRecord { key: String, id: MessageId },
}

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to StateStore
pub type SharedStateStore = Arc<StateStore>;

/// One key's update inside a delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum FieldUpdate {
    /// Overwrite (replace keys only)
    Set(StateValue),
    /// Append records (append-with-identity keys only)
    Append(Vec<Message>),
    /// Drop records by id (append-with-identity keys only)
    Remove(Vec<MessageId>),
}

impl FieldUpdate {
    fn name(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Append(_) => "append",
            Self::Remove(_) => "remove",
        }
    }
}

/// A keyed update entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyUpdate {
    pub key: String,
    pub update: FieldUpdate,
}

/// A partial update applied atomically; entries apply in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    updates: Vec<KeyUpdate>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, update: FieldUpdate) {
        self.updates.push(KeyUpdate {
            key: key.to_string(),
            update,
        });
    }

    pub fn set(mut self, key: &str, value: impl Into<StateValue>) -> Self {
        self.push(key, FieldUpdate::Set(value.into()));
        self
    }

    pub fn append(mut self, key: &str, records: Vec<Message>) -> Self {
        self.push(key, FieldUpdate::Append(records));
        self
    }

    pub fn remove(mut self, key: &str, ids: Vec<MessageId>) -> Self {
        self.push(key, FieldUpdate::Remove(ids));
        self
    }

    /// Append `other`'s entries after this delta's.
    pub fn merge(mut self, other: StateDelta) -> Self {
        self.updates.extend(other.updates);
        self
    }

    pub fn updates(&self) -> &[KeyUpdate] {
        &self.updates
    }

    /// Distinct keys touched, in first-touch order.
    pub fn keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.updates
            .iter()
            .map(|u| u.key.as_str())
            .filter(|k| seen.insert(*k))
            .collect()
    }

    pub fn touches(&self, key: &str) -> bool {
        self.updates.iter().any(|u| u.key == key)
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }
}

/// A read-only view over some or all keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateView {
    values: BTreeMap<String, StateValue>,
}

impl StateView {
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.values.get(key)
    }

    /// Text under `key`, empty when absent or not text.
    pub fn text(&self, key: &str) -> &str {
        self.values
            .get(key)
            .and_then(StateValue::as_text)
            .unwrap_or_default()
    }

    /// Visible records under `key`, empty when absent.
    pub fn messages(&self, key: &str) -> &[Message] {
        self.values
            .get(key)
            .and_then(StateValue::as_messages)
            .unwrap_or_default()
    }

    pub fn debate(&self, key: &str) -> Option<&DebateState> {
        self.values.get(key).and_then(StateValue::as_debate)
    }

    pub fn insert(&mut self, key: &str, value: StateValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, StateValue> {
        self.values
    }
}

/// Full view of the store at one version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u64,
    pub state: StateView,
}

impl StateSnapshot {
    pub fn text(&self, key: &str) -> &str {
        self.state.text(key)
    }

    pub fn messages(&self, key: &str) -> &[Message] {
        self.state.messages(key)
    }

    pub fn debate(&self, key: &str) -> Option<&DebateState> {
        self.state.debate(key)
    }
}

/// A committed delta, kept for inspection and replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    /// Store version after this delta
    pub version: u64,
    /// Stage (or other writer) that produced it
    pub origin: String,
    pub delta: StateDelta,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug)]
enum Slot {
    Value(StateValue),
    Log {
        records: Vec<Message>,
        tombstones: HashSet<MessageId>,
    },
}

impl Slot {
    fn visible(&self) -> StateValue {
        match self {
            Self::Value(value) => value.clone(),
            Self::Log {
                records,
                tombstones,
            } => StateValue::Messages(
                records
                    .iter()
                    .filter(|m| !tombstones.contains(&m.id))
                    .cloned()
                    .collect(),
            ),
        }
    }

    fn contains_record(&self, id: &MessageId) -> bool {
        match self {
            Self::Log { records, .. } => records.iter().any(|m| &m.id == id),
            Self::Value(_) => false,
        }
    }
}

#[derive(Debug)]
struct Inner {
    version: u64,
    slots: BTreeMap<String, Slot>,
    history: Vec<DeltaRecord>,
}

/// Versioned key-value container holding one run's shared state
#[derive(Debug)]
pub struct StateStore {
    schema: StateSchema,
    inner: RwLock<Inner>,
}

impl StateStore {
    /// Create a store with every declared key set to its zero value.
    pub fn new(schema: StateSchema) -> Self {
        let slots = schema
            .fields()
            .map(|spec| {
                let slot = match spec.policy {
                    MergePolicy::Replace => Slot::Value(spec.zero()),
                    MergePolicy::AppendWithIdentity => Slot::Log {
                        records: Vec::new(),
                        tombstones: HashSet::new(),
                    },
                };
                (spec.key.clone(), slot)
            })
            .collect();

        Self {
            schema,
            inner: RwLock::new(Inner {
                version: 0,
                slots,
                history: Vec::new(),
            }),
        }
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedStateStore {
        Arc::new(self)
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    // Writers never panic between validation and mutation, so a poisoned
    // lock still guards consistent data.
    fn read_inner(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current version; 0 until the first apply.
    pub fn version(&self) -> u64 {
        self.read_inner().version
    }

    /// Current values for `keys`. Undeclared keys are left out.
    pub fn read<S: AsRef<str>>(&self, keys: &[S]) -> StateView {
        let inner = self.read_inner();
        let mut view = StateView::default();
        for key in keys {
            if let Some(slot) = inner.slots.get(key.as_ref()) {
                view.insert(key.as_ref(), slot.visible());
            }
        }
        view
    }

    /// Every declared key at the current version.
    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.read_inner();
        let mut state = StateView::default();
        for (key, slot) in &inner.slots {
            state.insert(key, slot.visible());
        }
        StateSnapshot {
            version: inner.version,
            state,
        }
    }

    /// Apply a delta with no stage attribution.
    pub fn apply(&self, delta: StateDelta) -> StoreResult<u64> {
        self.apply_from(EXTERNAL_ORIGIN, delta)
    }

    /// Apply a delta atomically and return the new version.
    pub fn apply_from(&self, origin: &str, delta: StateDelta) -> StoreResult<u64> {
        let mut inner = self.write_inner();
        self.validate(&inner, &delta)?;

        for entry in delta.updates() {
            if let Some(slot) = inner.slots.get_mut(&entry.key) {
                apply_update(slot, &entry.update);
            }
        }

        inner.version += 1;
        let version = inner.version;
        inner.history.push(DeltaRecord {
            version,
            origin: origin.to_string(),
            delta,
            applied_at: Utc::now(),
        });
        Ok(version)
    }

    /// Remove matching records from every append-with-identity key.
    ///
    /// Unknown ids are ignored.
    pub fn remove_records(&self, ids: &[MessageId]) -> StoreResult<u64> {
        let mut delta = StateDelta::new();
        for spec in self.schema.fields() {
            if spec.policy == MergePolicy::AppendWithIdentity {
                delta.push(&spec.key, FieldUpdate::Remove(ids.to_vec()));
            }
        }
        self.apply(delta)
    }

    /// All committed deltas, oldest first.
    pub fn history(&self) -> Vec<DeltaRecord> {
        self.read_inner().history.clone()
    }

    /// Committed deltas with a version greater than `version`.
    pub fn history_since(&self, version: u64) -> Vec<DeltaRecord> {
        self.read_inner()
            .history
            .iter()
            .filter(|r| r.version > version)
            .cloned()
            .collect()
    }

    fn validate(&self, inner: &Inner, delta: &StateDelta) -> StoreResult<()> {
        let mut appended: HashSet<(&str, &MessageId)> = HashSet::new();

        for entry in delta.updates() {
            let spec = self
                .schema
                .field(&entry.key)
                .ok_or_else(|| StoreError::UnknownKey(entry.key.clone()))?;

            let mismatch = || StoreError::PolicyMismatch {
                key: entry.key.clone(),
                policy: spec.policy,
                update: entry.update.name(),
            };

            match (&entry.update, spec.policy) {
                (FieldUpdate::Set(value), MergePolicy::Replace) => {
                    if value.kind() != spec.kind {
                        return Err(StoreError::KindMismatch {
                            key: entry.key.clone(),
                            expected: spec.kind,
                            actual: value.kind(),
                        });
                    }
                }
                (FieldUpdate::Append(records), MergePolicy::AppendWithIdentity) => {
                    let slot = inner.slots.get(&entry.key);
                    for record in records {
                        let exists = slot.map(|s| s.contains_record(&record.id)).unwrap_or(false);
                        if exists || !appended.insert((entry.key.as_str(), &record.id)) {
                            return Err(StoreError::DuplicateRecord {
                                key: entry.key.clone(),
                                id: record.id.clone(),
                            });
                        }
                    }
                }
                (FieldUpdate::Remove(_), MergePolicy::AppendWithIdentity) => {}
                _ => return Err(mismatch()),
            }
        }
        Ok(())
    }
}

fn apply_update(slot: &mut Slot, update: &FieldUpdate) {
    match (slot, update) {
        (Slot::Value(current), FieldUpdate::Set(value)) => *current = value.clone(),
        (Slot::Log { records, .. }, FieldUpdate::Append(new_records)) => {
            records.extend(new_records.iter().cloned());
        }
        (
            Slot::Log {
                records,
                tombstones,
            },
            FieldUpdate::Remove(ids),
        ) => {
            for id in ids {
                if records.iter().any(|m| &m.id == id) {
                    tombstones.insert(id.clone());
                }
            }
        }
        // validate() rejects every other pairing
        _ => {}
    }
}
