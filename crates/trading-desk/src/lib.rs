//! Trading Desk
//!
//! Offline desk for the staged decision engine: deterministic analyst,
//! debater and judge units plus a canned market-data tool feed, so a full
//! pipeline run needs no model provider or network access.
//!
//! ```text
//!  RunConfig ──► build_registry ──► PipelineOrchestrator ──► RunOutcome
//!                    │                      ▲                    │
//!                    └── agents::*          └── CannedTools      └──► RunSummary
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod error;
pub mod summary;
pub mod tools;

pub use agents::{build_orchestrator, build_registry};
pub use error::{DeskError, DeskResult};
pub use summary::RunSummary;
pub use tools::{CannedTools, Trend};
