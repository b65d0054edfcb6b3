//! Shared, versioned workflow state
//!
//! One [`StateStore`] per run holds every value the stages exchange. Keys
//! are declared up front by a [`StateSchema`], each with a merge policy:
//!
//! - `Replace`: reports, decisions, sender tags and debate records
//! - `AppendWithIdentity`: the message sequence, where updates append
//!   records or remove them by id
//!
//! # Usage
//!
//! ```ignore
//! use stage_engine::state::{keys, trading_schema, StateDelta, StateStore};
//!
//! let store = StateStore::new(trading_schema());
//! let version = store.apply(StateDelta::new().set(keys::MARKET_REPORT, "Uptrend"))?;
//! let view = store.read(&[keys::MARKET_REPORT]);
//! assert_eq!(view.text(keys::MARKET_REPORT), "Uptrend");
//! ```

pub mod schema;
pub mod store;
pub mod types;

// Re-export core types
pub use schema::{keys, trading_schema, FieldSpec, MergePolicy, StateSchema};
pub use store::{
    DeltaRecord, FieldUpdate, KeyUpdate, SharedStateStore, StateDelta, StateSnapshot, StateStore,
    StateView, StoreError, StoreResult, EXTERNAL_ORIGIN,
};
pub use types::{
    Contribution, DebateState, Message, MessageId, Role, StateValue, ToolRequest, ToolResult,
    ValueKind, PLACEHOLDER_CONTENT,
};
