//! Pipeline Orchestrator: sequences one full run and owns its error policy.
//!
//! ```text
//!  seed(subject, context, trigger)
//!    → analysts (tool loop, in order)
//!    → research debate → research judge
//!    → trader
//!    → risk debate     → risk judge  → RunOutcome
//! ```
//!
//! Every step commits before the next one reads. The first failure ends the
//! run: nothing is retried, and the caller gets a [`RunFailure`] carrying the
//! snapshot as of the last committed step.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use super::outcome::RunOutcome;
use super::plan::{PipelinePlan, SynthesisStep};
use crate::debate::{
    shared_decider, Conclusion, DebateController, RotationDecider, SharedTurnDecider,
};
use crate::error::{EngineError, EngineResult, RunFailure};
use crate::events::{EngineEvent, SharedEventBus};
use crate::otel;
use crate::registry::SharedStageRegistry;
use crate::scope::RunScope;
use crate::state::{
    trading_schema, MergePolicy, Message, StateDelta, StateSchema, StateStore, StateValue,
    ValueKind,
};
use crate::tool_loop::{
    writes_delta, NoTools, SharedToolExecutor, StageReport, ToolLoopDriver,
};

/// Origin recorded for the run's seed delta.
pub const SEED_ORIGIN: &str = "run_seed";

/// Runs pipeline plans against a fixed registry.
///
/// Cheap to share; every run gets its own store, scope and cancellation.
pub struct PipelineOrchestrator {
    plan: Arc<PipelinePlan>,
    schema: StateSchema,
    registry: SharedStageRegistry,
    driver: ToolLoopDriver,
    research: DebateController,
    risk: DebateController,
    events: Option<SharedEventBus>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("plan", &self.plan)
            .field("stages", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PipelineOrchestrator`]
pub struct OrchestratorBuilder {
    plan: PipelinePlan,
    registry: SharedStageRegistry,
    schema: StateSchema,
    tools: SharedToolExecutor,
    research_decider: SharedTurnDecider,
    risk_decider: SharedTurnDecider,
    events: Option<SharedEventBus>,
}

impl OrchestratorBuilder {
    pub fn schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn tools(mut self, tools: SharedToolExecutor) -> Self {
        self.tools = tools;
        self
    }

    pub fn research_decider(mut self, decider: SharedTurnDecider) -> Self {
        self.research_decider = decider;
        self
    }

    pub fn risk_decider(mut self, decider: SharedTurnDecider) -> Self {
        self.risk_decider = decider;
        self
    }

    pub fn events(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Validate the plan against registry and schema.
    ///
    /// Missing stages fail with `UnknownStage`; key wiring problems with
    /// `Configuration`.
    pub fn build(self) -> EngineResult<PipelineOrchestrator> {
        let plan = self.plan;
        for name in plan.stage_names() {
            self.registry.resolve(name)?;
        }
        check_key(&self.schema, &plan.subject_key, ValueKind::Text)?;
        check_key(&self.schema, &plan.context_key, ValueKind::Text)?;
        check_key(&self.schema, &plan.history_key, ValueKind::Messages)?;
        if self
            .schema
            .field(&plan.history_key)
            .map(|f| f.policy != MergePolicy::AppendWithIdentity)
            .unwrap_or(true)
        {
            return Err(EngineError::Configuration(format!(
                "history key {} must be append-with-identity",
                plan.history_key
            )));
        }
        check_key(&self.schema, &plan.research.state_key, ValueKind::Debate)?;
        check_key(&self.schema, &plan.risk.state_key, ValueKind::Debate)?;

        for step in plan.synthesis_steps() {
            check_key(&self.schema, &step.output_key, ValueKind::Text)?;
            let spec = &self.registry.resolve(&step.stage)?.spec;
            let mut owned = vec![step.output_key.as_str()];
            if let Some(key) = &step.verdict_for {
                check_key(&self.schema, key, ValueKind::Debate)?;
                owned.push(key);
            }
            if let Some(key) = owned.into_iter().find(|k| !spec.may_write(k)) {
                return Err(EngineError::Configuration(format!(
                    "stage {} must declare a write to {}",
                    step.stage, key
                )));
            }
        }

        let driver = ToolLoopDriver::new(self.registry.clone(), self.tools)
            .with_max_tool_rounds(plan.max_tool_rounds)
            .with_history_key(plan.history_key.clone());
        let research = DebateController::new(
            plan.research.clone(),
            self.registry.clone(),
            self.research_decider,
        )?;
        let risk =
            DebateController::new(plan.risk.clone(), self.registry.clone(), self.risk_decider)?;

        Ok(PipelineOrchestrator {
            plan: Arc::new(plan),
            schema: self.schema,
            registry: self.registry,
            driver,
            research,
            risk,
            events: self.events,
        })
    }
}

fn check_key(schema: &StateSchema, key: &str, kind: ValueKind) -> EngineResult<()> {
    match schema.field(key) {
        Some(field) if field.kind == kind => Ok(()),
        Some(field) => Err(EngineError::Configuration(format!(
            "key {} is {}, expected {}",
            key, field.kind, kind
        ))),
        None => Err(EngineError::Configuration(format!(
            "key {} is not declared",
            key
        ))),
    }
}

impl PipelineOrchestrator {
    /// Start building an orchestrator for `plan` over `registry`.
    ///
    /// Defaults: trading schema, no tools, rotation deciders, no events.
    pub fn builder(plan: PipelinePlan, registry: SharedStageRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder {
            plan,
            registry,
            schema: trading_schema(),
            tools: Arc::new(NoTools),
            research_decider: shared_decider(RotationDecider),
            risk_decider: shared_decider(RotationDecider),
            events: None,
        }
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    pub fn registry(&self) -> &SharedStageRegistry {
        &self.registry
    }

    /// Run the pipeline for one subject+context pair.
    pub async fn run(&self, subject: &str, context: &str) -> Result<RunOutcome, RunFailure> {
        self.run_with_cancel(subject, context, CancellationToken::new())
            .await
    }

    /// Run with an external cancellation token, honoured at stage
    /// boundaries only.
    pub async fn run_with_cancel(
        &self,
        subject: &str,
        context: &str,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, RunFailure> {
        let run_id = Uuid::new_v4().to_string();
        let store = StateStore::new(self.schema.clone()).shared();
        let mut scope = RunScope::new(run_id.clone(), store).with_cancel(cancel);
        if let Some(bus) = &self.events {
            scope = scope.with_events(bus.clone());
        }

        let span = otel::run_span(&run_id, subject, context);
        let started = Instant::now();
        info!(run_id = %run_id, subject, context, "Run started");
        scope.emit(EngineEvent::RunStarted {
            run_id: run_id.clone(),
            subject: subject.to_string(),
            context: context.to_string(),
            timestamp: Utc::now(),
        });

        let mut reports = Vec::new();
        let result = self
            .execute(&scope, subject, context, &mut reports)
            .instrument(span.clone())
            .await;

        let snapshot = scope.store.snapshot();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        otel::record_run_result(&span, result.is_ok(), snapshot.version, elapsed_ms);

        match result {
            Ok((research_conclusion, risk_conclusion)) => {
                let final_decision = snapshot.text(self.plan.final_key()).to_string();
                info!(
                    run_id = %run_id,
                    version = snapshot.version,
                    elapsed_ms,
                    "Run finished"
                );
                scope.emit(EngineEvent::RunFinished {
                    run_id: run_id.clone(),
                    final_decision: final_decision.clone(),
                    version: snapshot.version,
                    timestamp: Utc::now(),
                });
                Ok(RunOutcome {
                    run_id,
                    final_decision,
                    research_conclusion,
                    risk_conclusion,
                    stages: stage_reports(&scope, &reports),
                    snapshot,
                })
            }
            Err(cause) => {
                if matches!(cause, EngineError::RunCancelled) {
                    info!(run_id = %run_id, version = snapshot.version, "Run cancelled");
                } else {
                    warn!(
                        run_id = %run_id,
                        version = snapshot.version,
                        stage = cause.stage_name().unwrap_or("-"),
                        "Run failed: {}",
                        cause
                    );
                }
                scope.emit(EngineEvent::RunFailed {
                    run_id: run_id.clone(),
                    error: cause.to_string(),
                    version: snapshot.version,
                    timestamp: Utc::now(),
                });
                let completed_stages = stage_reports(&scope, &reports)
                    .into_iter()
                    .map(|r| r.stage)
                    .collect();
                Err(RunFailure {
                    run_id,
                    cause,
                    snapshot,
                    completed_stages,
                })
            }
        }
    }

    async fn execute(
        &self,
        scope: &RunScope,
        subject: &str,
        context: &str,
        reports: &mut Vec<StageReport>,
    ) -> EngineResult<(Conclusion, Conclusion)> {
        self.seed(scope, subject, context)?;

        for analyst in &self.plan.analysts {
            scope.checkpoint()?;
            reports.push(self.driver.run_and_commit(scope, analyst).await?);
        }

        let research = self.research.run(scope).await?;
        self.synthesize(scope, &self.plan.research_judge).await?;
        self.synthesize(scope, &self.plan.trader).await?;
        let risk = self.risk.run(scope).await?;
        self.synthesize(scope, &self.plan.risk_judge).await?;

        Ok((research.conclusion, risk.conclusion))
    }

    fn seed(&self, scope: &RunScope, subject: &str, context: &str) -> EngineResult<()> {
        let delta = StateDelta::new()
            .set(&self.plan.subject_key, subject)
            .set(&self.plan.context_key, context)
            .append(&self.plan.history_key, vec![Message::initiator(subject)]);
        scope
            .store
            .apply_from(SEED_ORIGIN, delta)
            .map_err(|e| EngineError::Configuration(format!("cannot seed run: {}", e)))?;
        Ok(())
    }

    /// Run a single-shot step and commit its result, plus the debate verdict
    /// when the step judges one, as one delta.
    async fn synthesize(&self, scope: &RunScope, step: &SynthesisStep) -> EngineResult<String> {
        scope.checkpoint()?;
        let stage = step.stage.as_str();
        let registered = self.registry.resolve(stage)?;
        let view = scope.store.read(&registered.spec.required_keys());
        let output = scope.invoke_single(registered, view).await?;

        let result = output
            .writes
            .get(&step.output_key)
            .and_then(StateValue::as_text)
            .unwrap_or(output.content())
            .to_string();

        let mut delta =
            writes_delta(&registered.spec, output).map_err(|e| EngineError::stage(stage, e))?;
        if !delta.touches(&step.output_key) {
            delta = delta.set(&step.output_key, result.as_str());
        }

        if let Some(key) = &step.verdict_for {
            let mut debate = scope
                .store
                .read(&[key.as_str()])
                .debate(key)
                .cloned()
                .unwrap_or_default();
            if debate.is_finalized() {
                return Err(EngineError::DebateFinalized { key: key.clone() });
            }
            debate.judge_decision = Some(result.clone());
            delta = delta.set(key, debate);
        }

        let version = scope.commit(stage, delta)?;
        info!(run_id = %scope.run_id, stage, version, "Stage committed");
        Ok(result)
    }
}

/// Committed stages in order, taken from the store's delta log.
fn stage_reports(scope: &RunScope, driven: &[StageReport]) -> Vec<StageReport> {
    let rounds: HashMap<u64, u32> = driven.iter().map(|r| (r.version, r.tool_rounds)).collect();
    scope
        .store
        .history()
        .into_iter()
        .filter(|record| record.origin != SEED_ORIGIN)
        .map(|record| StageReport {
            tool_rounds: rounds.get(&record.version).copied().unwrap_or_default(),
            stage: record.origin,
            version: record.version,
        })
        .collect()
}
