//! Observability events for workflow runs
//!
//! The engine publishes an [`EngineEvent`] at every transition (stage start,
//! tool round, commit, debate turn, run end). Consumers either subscribe to
//! the broadcast channel or attach a [`TraceSink`]; the engine does not
//! depend on either being present.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│  Event Bus   │────▶│  Subscribers │
//! │  / Driver    │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │ Trace sinks  │
//!                      │ (best effort)│
//!                      └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, RecordingSink, SharedEventBus, SinkError, TraceSink};
pub use types::EngineEvent;
