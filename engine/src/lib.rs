//! Staged Workflow Engine
//!
//! This library drives a multi-participant decision pipeline over a single
//! shared, versioned state object:
//! - a state store with per-key merge policies and atomic deltas
//! - a static stage registry declaring each stage's reads and writes
//! - a tool-loop driver that resolves tool-call rounds and cleans up the
//!   message history afterwards
//! - a round-robin debate controller with a hard turn cap
//! - a pipeline orchestrator sequencing analysts, debates and synthesis
//!   stages, returning a structured failure with the last good snapshot
//!
//! # Usage
//!
//! ```ignore
//! use stage_engine::{PipelineOrchestrator, PipelinePlan, RunConfig};
//!
//! let config = RunConfig::load("desk.toml")?;
//! let orchestrator = PipelineOrchestrator::builder(PipelinePlan::trading(&config), registry)
//!     .tools(tools)
//!     .build()?;
//! let outcome = orchestrator.run("NVDA", "2024-05-10").await?;
//! println!("{}", outcome.final_decision);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod debate;
pub mod error;
pub mod events;
pub mod inspector;
pub mod otel;
pub mod pipeline;
pub mod registry;
pub mod scope;
pub mod signal;
pub mod stage;
pub mod state;
pub mod tool_loop;

// Re-export key state types
pub use state::{
    keys, trading_schema, DebateState, Message, MessageId, Role, SharedStateStore, StateDelta,
    StateSchema, StateSnapshot, StateStore, StateValue, StateView, ToolRequest, ToolResult,
};

// Re-export errors
pub use error::{EngineError, EngineResult, RetryCategory, RunFailure, StageError};

// Re-export stage wiring
pub use registry::{SharedStageRegistry, StageRegistry, StageSpec};
pub use stage::{FnUnit, SharedStageUnit, StageInput, StageOutput, StageUnit};
pub use tool_loop::{NoTools, SharedToolExecutor, StageReport, ToolExecutor, ToolLoopDriver};

// Re-export debate and pipeline types
pub use debate::{
    Conclusion, DebateController, DebateSpec, RotationDecider, RoundLimitDecider, TurnDecider,
    TurnDecision,
};
pub use pipeline::{PipelineOrchestrator, PipelinePlan, RunOutcome};

// Re-export ambient types
pub use config::RunConfig;
pub use events::{EngineEvent, EventBus, RecordingSink, SharedEventBus, TraceSink};
pub use inspector::{Inspector, InspectorStats};
pub use otel::{RunTracer, TracingConfig};
pub use scope::RunScope;
pub use signal::{extract_rating, Rating};
