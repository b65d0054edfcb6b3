//! OpenTelemetry-Compatible Span Helpers
//!
//! Provides structured `tracing` span builders for the workflow engine. All
//! spans use dot-notation field names compatible with OpenTelemetry
//! semantic conventions.
//!
//! # Span Hierarchy
//!
//! ```text
//! workflow.run                 (root, one per subject+context run)
//!   ├─ workflow.stage          (one per stage invocation)
//!   │   └─ workflow.tool_round (one per tool-call/tool-result cycle)
//!   └─ workflow.debate         (one per debate controller run)
//!       └─ workflow.debate_turn
//! ```
//!
//! [`RunTracer`] optionally installs a JSON subscriber for runs that want
//! exportable traces; when disabled the host's own subscriber is used.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// ── Span Name Constants ──────────────────────────────────────────────

pub const SPAN_RUN: &str = "workflow.run";
pub const SPAN_STAGE: &str = "workflow.stage";
pub const SPAN_TOOL_ROUND: &str = "workflow.tool_round";
pub const SPAN_DEBATE: &str = "workflow.debate";
pub const SPAN_DEBATE_TURN: &str = "workflow.debate_turn";

// ── Field Name Constants ─────────────────────────────────────────────

pub const FIELD_RUN_ID: &str = "run.id";
pub const FIELD_SUBJECT: &str = "workflow.subject";
pub const FIELD_CONTEXT: &str = "workflow.context";
pub const FIELD_STAGE: &str = "workflow.stage.name";
pub const FIELD_TOOL_ROUNDS: &str = "workflow.tool_rounds";
pub const FIELD_VERSION: &str = "workflow.version";
pub const FIELD_SUCCESS: &str = "workflow.success";
pub const FIELD_DURATION_MS: &str = "workflow.duration_ms";
pub const FIELD_DEBATE: &str = "workflow.debate.name";
pub const FIELD_SPEAKER: &str = "workflow.debate.speaker";
pub const FIELD_TURN: &str = "workflow.debate.turn";

// ── Span Builders ────────────────────────────────────────────────────

/// Root span for one run.
///
/// Fields filled later via [`record_run_result`].
pub fn run_span(run_id: &str, subject: &str, context: &str) -> Span {
    tracing::info_span!(
        "workflow.run",
        "run.id" = %run_id,
        "workflow.subject" = %subject,
        "workflow.context" = %context,
        "workflow.success" = tracing::field::Empty,
        "workflow.version" = tracing::field::Empty,
        "workflow.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_run_result(span: &Span, success: bool, version: u64, duration_ms: u64) {
    span.record("workflow.success", success);
    span.record("workflow.version", version);
    span.record("workflow.duration_ms", duration_ms);
}

/// Span for one stage invocation through the tool-loop driver.
pub fn stage_span(run_id: &str, stage: &str) -> Span {
    tracing::info_span!(
        "workflow.stage",
        "run.id" = %run_id,
        "workflow.stage.name" = %stage,
        "workflow.tool_rounds" = tracing::field::Empty,
        "workflow.version" = tracing::field::Empty,
    )
}

pub fn record_stage_result(span: &Span, tool_rounds: u32, version: u64) {
    span.record("workflow.tool_rounds", tool_rounds);
    span.record("workflow.version", version);
}

/// Span for one tool-call/tool-result cycle.
pub fn tool_round_span(stage: &str, round: u32, requests: usize) -> Span {
    tracing::debug_span!(
        "workflow.tool_round",
        "workflow.stage.name" = %stage,
        round,
        requests,
    )
}

/// Span for a whole debate.
pub fn debate_span(run_id: &str, debate: &str, max_turns: u32) -> Span {
    tracing::info_span!(
        "workflow.debate",
        "run.id" = %run_id,
        "workflow.debate.name" = %debate,
        max_turns,
        "workflow.debate.turn" = tracing::field::Empty,
    )
}

pub fn record_debate_result(span: &Span, turns: u32) {
    span.record("workflow.debate.turn", turns);
}

/// Span for one debate turn.
pub fn debate_turn_span(debate: &str, speaker: &str, turn: u32) -> Span {
    tracing::debug_span!(
        "workflow.debate_turn",
        "workflow.debate.name" = %debate,
        "workflow.debate.speaker" = %speaker,
        "workflow.debate.turn" = turn,
    )
}

// ── Trace export setup ───────────────────────────────────────────────

fn default_collector_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_project() -> String {
    "trading-desk".to_string()
}

/// Settings for exportable run traces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_collector_endpoint")]
    pub collector_endpoint: String,
    #[serde(default = "default_project")]
    pub project: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            collector_endpoint: default_collector_endpoint(),
            project: default_project(),
        }
    }
}

/// Installs the JSON trace subscriber and tags run metadata while active.
#[derive(Debug, Clone)]
pub struct RunTracer {
    config: TracingConfig,
    active: bool,
}

impl RunTracer {
    pub fn new(config: TracingConfig) -> Self {
        Self {
            config,
            active: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Install the subscriber. Returns whether tracing is now active.
    ///
    /// Failure is reported and swallowed; a run never depends on it.
    pub fn setup(&mut self) -> bool {
        if !self.config.enabled {
            return false;
        }

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let result = tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init();

        match result {
            Ok(()) => {
                self.active = true;
                info!(
                    project = %self.config.project,
                    collector = %self.config.collector_endpoint,
                    "Run tracing enabled"
                );
                true
            }
            Err(e) => {
                warn!("Failed to set up run tracing: {}", e);
                false
            }
        }
    }

    /// Stop tagging metadata. The global subscriber stays installed.
    pub fn cleanup(&mut self) {
        self.active = false;
    }

    /// Tag run metadata with tracing details while active.
    pub fn add_metadata(
        &self,
        mut metadata: BTreeMap<String, serde_json::Value>,
    ) -> BTreeMap<String, serde_json::Value> {
        if !self.active {
            return metadata;
        }
        metadata.insert("tracing_enabled".to_string(), serde_json::Value::Bool(true));
        metadata.insert(
            "tracing_project".to_string(),
            serde_json::Value::String(self.config.project.clone()),
        );
        metadata
    }
}
