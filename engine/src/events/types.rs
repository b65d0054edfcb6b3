//! Event types emitted while a run executes
//!
//! Events are informational: they describe transitions that already
//! happened and are never consulted by the engine itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debate::Conclusion;

/// All run lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A run was created with a fresh store
    RunStarted {
        run_id: String,
        subject: String,
        context: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage's unit is about to be invoked
    StageStarted {
        run_id: String,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage requested tools and the results were gathered
    ToolRound {
        run_id: String,
        stage: String,
        round: u32,
        call_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A stage's delta was applied to the store
    StageCommitted {
        run_id: String,
        stage: String,
        version: u64,
        timestamp: DateTime<Utc>,
    },

    /// One debate turn was committed
    DebateTurn {
        run_id: String,
        debate: String,
        speaker: String,
        turn: u32,
        timestamp: DateTime<Utc>,
    },

    /// A debate reached its terminal phase
    DebateConcluded {
        run_id: String,
        debate: String,
        turns: u32,
        conclusion: Conclusion,
        timestamp: DateTime<Utc>,
    },

    /// The synthesis stage completed
    RunFinished {
        run_id: String,
        final_decision: String,
        version: u64,
        timestamp: DateTime<Utc>,
    },

    /// The run stopped early (failure or cancellation)
    RunFailed {
        run_id: String,
        error: String,
        version: u64,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Event type as a string (for filtering/logging)
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StageStarted { .. } => "stage_started",
            Self::ToolRound { .. } => "tool_round",
            Self::StageCommitted { .. } => "stage_committed",
            Self::DebateTurn { .. } => "debate_turn",
            Self::DebateConcluded { .. } => "debate_concluded",
            Self::RunFinished { .. } => "run_finished",
            Self::RunFailed { .. } => "run_failed",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::ToolRound { run_id, .. }
            | Self::StageCommitted { run_id, .. }
            | Self::DebateTurn { run_id, .. }
            | Self::DebateConcluded { run_id, .. }
            | Self::RunFinished { run_id, .. }
            | Self::RunFailed { run_id, .. } => run_id,
        }
    }

    /// Stage the event belongs to, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageStarted { stage, .. }
            | Self::ToolRound { stage, .. }
            | Self::StageCommitted { stage, .. } => Some(stage),
            Self::DebateTurn { speaker, .. } => Some(speaker),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::RunStarted { timestamp, .. }
            | Self::StageStarted { timestamp, .. }
            | Self::ToolRound { timestamp, .. }
            | Self::StageCommitted { timestamp, .. }
            | Self::DebateTurn { timestamp, .. }
            | Self::DebateConcluded { timestamp, .. }
            | Self::RunFinished { timestamp, .. }
            | Self::RunFailed { timestamp, .. } => *timestamp,
        }
    }
}
