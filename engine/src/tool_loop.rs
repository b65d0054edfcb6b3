//! Tool-Loop Driver
//!
//! Runs one stage to completion, resolving any tool-call rounds it asks for,
//! and turns the result into a single atomic delta.
//!
//! ```text
//!   read(required keys)
//!          │
//!          ▼
//!   ┌──────────────┐  tool_calls   ┌───────────────┐
//!   │  stage unit  │──────────────▶│ ToolExecutor  │
//!   │   invoke()   │◀──────────────│  execute()    │
//!   └──────┬───────┘ results in    └───────────────┘
//!          │         request order
//!          ▼ no pending calls
//!   hygiene + writes ──▶ one StateDelta
//! ```
//!
//! Hygiene is part of the delta: every record produced during the
//! invocation (plus any initiator trigger visible at stage start) is
//! appended and tombstoned in the same update, and one placeholder
//! attributed to the stage is appended in their place. The visible message
//! sequence therefore never holds a dangling tool request, and the delta
//! log still shows the full exchange.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, Instrument, Span};

use crate::error::{EngineError, EngineResult, StageError};
use crate::events::EngineEvent;
use crate::otel;
use crate::registry::{RegisteredStage, SharedStageRegistry, StageSpec};
use crate::scope::RunScope;
use crate::stage::{StageInput, StageOutput};
use crate::state::{
    keys, Message, MessageId, Role, StateDelta, StateValue, ToolRequest, ToolResult,
};

/// Default bound on tool rounds per stage invocation.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

/// The tool-execution collaborator.
///
/// Returns one result per request. Implementations may gather results
/// concurrently and return them in any order; the driver re-sequences them
/// by call id.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, requests: Vec<ToolRequest>) -> Result<Vec<ToolResult>, StageError>;
}

/// Shared reference to a tool collaborator
pub type SharedToolExecutor = Arc<dyn ToolExecutor>;

/// Tool collaborator for pipelines whose stages never request tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTools;

#[async_trait]
impl ToolExecutor for NoTools {
    async fn execute(&self, requests: Vec<ToolRequest>) -> Result<Vec<ToolResult>, StageError> {
        let names: Vec<_> = requests.iter().map(|r| r.name.as_str()).collect();
        Err(StageError::tool(format!(
            "no tools available (requested: {})",
            names.join(", ")
        )))
    }
}

/// Uncommitted result of one driven stage.
#[derive(Debug, Clone)]
pub struct DriverOutcome {
    pub stage: String,
    /// Writes plus hygiene, to be applied as one update
    pub delta: StateDelta,
    /// Tool rounds resolved before the unit finished
    pub tool_rounds: u32,
    /// Final responder record (no pending tool calls)
    pub reply: Message,
}

/// A stage whose delta has been applied.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StageReport {
    pub stage: String,
    /// Store version after the stage's commit
    pub version: u64,
    pub tool_rounds: u32,
}

/// Drives stages through the tool-call/tool-result cycle.
#[derive(Clone)]
pub struct ToolLoopDriver {
    registry: SharedStageRegistry,
    tools: SharedToolExecutor,
    max_tool_rounds: u32,
    history_key: String,
}

impl ToolLoopDriver {
    pub fn new(registry: SharedStageRegistry, tools: SharedToolExecutor) -> Self {
        Self {
            registry,
            tools,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            history_key: keys::MESSAGES.to_string(),
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Use a different append-with-identity key as the message history.
    pub fn with_history_key(mut self, key: impl Into<String>) -> Self {
        self.history_key = key.into();
        self
    }

    pub fn max_tool_rounds(&self) -> u32 {
        self.max_tool_rounds
    }

    pub fn history_key(&self) -> &str {
        &self.history_key
    }

    /// Run `stage` to completion without committing.
    ///
    /// Nothing is written to the store on any path; a failed unit or tool
    /// round simply drops the working history.
    pub async fn run(&self, scope: &RunScope, stage: &str) -> EngineResult<DriverOutcome> {
        let span = otel::stage_span(&scope.run_id, stage);
        self.run_in(scope, stage, &span).await
    }

    async fn run_in(
        &self,
        scope: &RunScope,
        stage: &str,
        span: &Span,
    ) -> EngineResult<DriverOutcome> {
        let registered = self.registry.resolve(stage)?;
        let outcome = self
            .drive(scope, registered)
            .instrument(span.clone())
            .await?;
        span.record(otel::FIELD_TOOL_ROUNDS, outcome.tool_rounds);
        Ok(outcome)
    }

    /// Run `stage` and apply its delta.
    pub async fn run_and_commit(&self, scope: &RunScope, stage: &str) -> EngineResult<StageReport> {
        let span = otel::stage_span(&scope.run_id, stage);
        let outcome = self.run_in(scope, stage, &span).await?;
        let version = scope.commit(stage, outcome.delta)?;
        otel::record_stage_result(&span, outcome.tool_rounds, version);
        info!(
            run_id = %scope.run_id,
            stage,
            version,
            tool_rounds = outcome.tool_rounds,
            "Stage committed"
        );
        Ok(StageReport {
            stage: outcome.stage,
            version,
            tool_rounds: outcome.tool_rounds,
        })
    }

    async fn drive(
        &self,
        scope: &RunScope,
        registered: &RegisteredStage,
    ) -> EngineResult<DriverOutcome> {
        let spec = &registered.spec;
        let stage = spec.name.as_str();

        scope.emit(EngineEvent::StageStarted {
            run_id: scope.run_id.clone(),
            stage: stage.to_string(),
            timestamp: Utc::now(),
        });

        let mut history: Vec<Message> = scope
            .store
            .read(&[self.history_key.as_str()])
            .messages(&self.history_key)
            .to_vec();
        let triggers: Vec<MessageId> = history
            .iter()
            .filter(|m| m.role == Role::Initiator)
            .map(|m| m.id.clone())
            .collect();

        let mut input = StageInput::new(stage, scope.store.read(&spec.required_keys()))
            .with_history_key(self.history_key.as_str());
        let mut generated: Vec<Message> = Vec::new();

        let output = loop {
            let output = registered
                .unit
                .invoke(&input)
                .await
                .map_err(|e| EngineError::stage(stage, e))?;

            if !output.wants_tools() {
                break output;
            }
            if input.tool_round >= self.max_tool_rounds {
                return Err(EngineError::ToolLoopExceeded {
                    stage: stage.to_string(),
                    rounds: input.tool_round,
                });
            }

            let round = input.tool_round + 1;
            let requests = output.reply.tool_calls.clone();
            let results = self
                .tools
                .execute(requests.clone())
                .instrument(otel::tool_round_span(stage, round, requests.len()))
                .await
                .map_err(|e| EngineError::stage(stage, e))?;
            let results =
                sequence_results(&requests, results).map_err(|e| EngineError::stage(stage, e))?;

            debug!(stage, round, requests = requests.len(), "Tool round resolved");
            scope.emit(EngineEvent::ToolRound {
                run_id: scope.run_id.clone(),
                stage: stage.to_string(),
                round,
                call_ids: requests.iter().map(|r| r.call_id.clone()).collect(),
                timestamp: Utc::now(),
            });

            let mut exchange = Vec::with_capacity(results.len() + 1);
            exchange.push(output.reply);
            exchange.extend(results.into_iter().map(Message::tool_result));
            history.extend(exchange.iter().cloned());
            generated.extend(exchange);

            // A re-invoked stage always sees its own exchange.
            input
                .view
                .insert(&self.history_key, StateValue::Messages(history.clone()));
            input.tool_round = round;
        };

        let tool_rounds = input.tool_round;
        let reply = output.reply.clone();
        generated.push(output.reply.clone());

        let mut delta = self.hygiene_delta(stage, generated, triggers);
        delta = delta.merge(writes_delta(spec, output).map_err(|e| EngineError::stage(stage, e))?);

        Ok(DriverOutcome {
            stage: stage.to_string(),
            delta,
            tool_rounds,
            reply,
        })
    }

    fn hygiene_delta(
        &self,
        stage: &str,
        generated: Vec<Message>,
        triggers: Vec<MessageId>,
    ) -> StateDelta {
        let mut removed: Vec<MessageId> = generated.iter().map(|m| m.id.clone()).collect();
        removed.extend(triggers);

        StateDelta::new()
            .append(&self.history_key, generated)
            .remove(&self.history_key, removed)
            .append(&self.history_key, vec![Message::placeholder(stage)])
    }
}

/// Turn a unit's named writes into `Set` updates, rejecting undeclared keys.
pub(crate) fn writes_delta(spec: &StageSpec, output: StageOutput) -> Result<StateDelta, StageError> {
    if let Some(key) = output.writes.keys().find(|k| !spec.may_write(k)) {
        return Err(StageError::UndeclaredWrite { key: key.clone() });
    }
    Ok(output
        .writes
        .into_iter()
        .fold(StateDelta::new(), |delta, (key, value)| delta.set(&key, value)))
}

/// Order `results` to match `requests` by call id.
///
/// Every request needs exactly one result, and no result may answer a call
/// that was not made.
pub fn sequence_results(
    requests: &[ToolRequest],
    results: Vec<ToolResult>,
) -> Result<Vec<ToolResult>, StageError> {
    let mut by_id: HashMap<String, ToolResult> = HashMap::with_capacity(results.len());
    for result in results {
        if !requests.iter().any(|r| r.call_id == result.call_id) {
            return Err(StageError::ToolResultMismatch(format!(
                "result for unrequested call {}",
                result.call_id
            )));
        }
        if by_id.contains_key(&result.call_id) {
            return Err(StageError::ToolResultMismatch(format!(
                "duplicate result for call {}",
                result.call_id
            )));
        }
        by_id.insert(result.call_id.clone(), result);
    }

    requests
        .iter()
        .map(|request| {
            by_id.remove(&request.call_id).ok_or_else(|| {
                StageError::ToolResultMismatch(format!("no result for call {}", request.call_id))
            })
        })
        .collect()
}
