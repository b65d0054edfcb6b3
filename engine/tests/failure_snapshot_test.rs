//! Failure and cancellation behaviour of full runs.
//!
//! Any stage may fail; the run must stop there and hand back the state as
//! of the last committed stage, never a partial delta.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use stage_engine::pipeline::stages;
use stage_engine::{
    keys, EngineError, EngineEvent, EventBus, FnUnit, PipelineOrchestrator, PipelinePlan,
    RecordingSink, RetryCategory, SharedStageUnit, StageError, StageInput, StageOutput,
    ToolExecutor, ToolRequest, ToolResult,
};
use tokio_util::sync::CancellationToken;

fn stage_order() -> Vec<String> {
    PipelinePlan::default()
        .stage_names()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn failing(message: &'static str) -> SharedStageUnit {
    FnUnit::shared(move |_: &StageInput| Err(StageError::unit(message)))
}

fn orchestrator_with(overrides: HashMap<&str, SharedStageUnit>) -> PipelineOrchestrator {
    PipelineOrchestrator::builder(PipelinePlan::default(), common::registry_with(overrides))
        .build()
        .unwrap()
}

struct EchoTools;

#[async_trait]
impl ToolExecutor for EchoTools {
    async fn execute(&self, requests: Vec<ToolRequest>) -> Result<Vec<ToolResult>, StageError> {
        Ok(requests
            .into_iter()
            .map(|r| ToolResult::new(r.call_id, format!("{} data", r.name)))
            .collect())
    }
}

#[tokio::test]
async fn test_failure_at_every_stage_keeps_prior_snapshot() {
    common::init_tracing();
    let order = stage_order();
    assert_eq!(order.len(), 12);

    for (index, stage) in order.iter().enumerate() {
        let mut overrides = HashMap::new();
        overrides.insert(stage.as_str(), failing("provider timeout"));
        let failure = orchestrator_with(overrides)
            .run("NVDA", "2024-05-10")
            .await
            .expect_err("run must fail");

        match &failure.cause {
            EngineError::StageExecutionFailed { stage: failed, cause } => {
                assert_eq!(failed, stage);
                assert!(matches!(cause, StageError::Unit(m) if m == "provider timeout"));
            }
            other => panic!("unexpected cause for {}: {}", stage, other),
        }
        assert_eq!(failure.snapshot.version, index as u64 + 1, "failing {}", stage);
        assert_eq!(failure.completed_stages, order[..index].to_vec());
        assert!(failure.is_fatal());
        assert_eq!(failure.cause.retry_category(), RetryCategory::Fatal);
        assert!(failure.snapshot.text(keys::FINAL_TRADE_DECISION).is_empty());
    }
}

#[tokio::test]
async fn test_failed_trader_leaves_research_intact() {
    let mut overrides = HashMap::new();
    overrides.insert(stages::TRADER, failing("rate limited"));
    let failure = orchestrator_with(overrides)
        .run("NVDA", "2024-05-10")
        .await
        .unwrap_err();

    let snapshot = &failure.snapshot;
    assert!(!snapshot.text(keys::INVESTMENT_PLAN).is_empty());
    assert!(snapshot.text(keys::TRADER_INVESTMENT_PLAN).is_empty());
    let research = snapshot.debate(keys::INVESTMENT_DEBATE_STATE).unwrap();
    assert_eq!(research.total_contributions(), 2);
    assert!(research.is_finalized());
    assert_eq!(
        snapshot
            .debate(keys::RISK_DEBATE_STATE)
            .unwrap()
            .total_contributions(),
        0
    );
}

#[tokio::test]
async fn test_failed_analyst_applies_nothing() {
    let mut overrides = HashMap::new();
    overrides.insert("news_analyst", failing("feed down"));
    let failure = orchestrator_with(overrides)
        .run("NVDA", "2024-05-10")
        .await
        .unwrap_err();

    assert!(!failure.snapshot.text(keys::SENTIMENT_REPORT).is_empty());
    assert!(failure.snapshot.text(keys::NEWS_REPORT).is_empty());
    // Two placeholders from the analysts that finished, nothing from news.
    let history = failure.snapshot.messages(keys::MESSAGES);
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|m| m.is_placeholder()));
}

#[tokio::test]
async fn test_tool_loop_exceeded_aborts_run() {
    let mut overrides = HashMap::new();
    overrides.insert(
        "market_analyst",
        FnUnit::shared(|input: &StageInput| {
            let round = input.tool_round;
            Ok(StageOutput::reply("need more data").with_tool_calls(vec![ToolRequest::new(
                format!("call-{}", round),
                "get_quotes",
            )]))
        }),
    );
    let mut plan = PipelinePlan::default();
    plan.max_tool_rounds = 2;
    let failure = PipelineOrchestrator::builder(plan, common::registry_with(overrides))
        .tools(Arc::new(EchoTools))
        .build()
        .unwrap()
        .run("NVDA", "2024-05-10")
        .await
        .unwrap_err();

    assert!(matches!(
        &failure.cause,
        EngineError::ToolLoopExceeded { stage, rounds: 2 } if stage == "market_analyst"
    ));
    assert_eq!(failure.snapshot.version, 1);
    assert!(failure.completed_stages.is_empty());
    // Only the seed trigger is visible; the uncommitted exchange never landed.
    let history = failure.snapshot.messages(keys::MESSAGES);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "NVDA");
}

#[tokio::test]
async fn test_tool_request_in_debate_turn_fails_stage() {
    let mut overrides = HashMap::new();
    overrides.insert(
        stages::BEAR_RESEARCHER,
        FnUnit::shared(|_: &StageInput| {
            Ok(StageOutput::reply("let me check")
                .with_tool_calls(vec![ToolRequest::new("c1", "get_news")]))
        }),
    );
    let failure = orchestrator_with(overrides)
        .run("NVDA", "2024-05-10")
        .await
        .unwrap_err();

    assert!(matches!(
        &failure.cause,
        EngineError::StageExecutionFailed {
            stage,
            cause: StageError::UnexpectedToolCalls(names),
        } if stage == stages::BEAR_RESEARCHER && names == "get_news"
    ));
    let research = failure
        .snapshot
        .debate(keys::INVESTMENT_DEBATE_STATE)
        .unwrap();
    assert_eq!(research.total_contributions(), 1);
}

#[tokio::test]
async fn test_undeclared_write_fails_stage() {
    let mut overrides = HashMap::new();
    overrides.insert(
        stages::TRADER,
        FnUnit::shared(|_: &StageInput| {
            Ok(StageOutput::reply("sell").with_write(keys::FINAL_TRADE_DECISION, "SELL"))
        }),
    );
    let failure = orchestrator_with(overrides)
        .run("NVDA", "2024-05-10")
        .await
        .unwrap_err();

    assert!(matches!(
        &failure.cause,
        EngineError::StageExecutionFailed {
            cause: StageError::UndeclaredWrite { key },
            ..
        } if key == keys::FINAL_TRADE_DECISION
    ));
    assert!(failure.snapshot.text(keys::FINAL_TRADE_DECISION).is_empty());
}

#[tokio::test]
async fn test_cancel_during_stage_stops_at_next_boundary() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let mut overrides = HashMap::new();
    overrides.insert(
        stages::BULL_RESEARCHER,
        FnUnit::shared(move |_: &StageInput| {
            trigger.cancel();
            Ok(StageOutput::reply("bull case"))
        }),
    );

    let failure = orchestrator_with(overrides)
        .run_with_cancel("NVDA", "2024-05-10", token)
        .await
        .unwrap_err();

    assert!(matches!(failure.cause, EngineError::RunCancelled));
    assert!(!failure.is_fatal());
    // The in-flight turn still commits.
    assert_eq!(failure.completed_stages.last().map(String::as_str), Some(stages::BULL_RESEARCHER));
    assert_eq!(failure.snapshot.version, 6);
    let research = failure
        .snapshot
        .debate(keys::INVESTMENT_DEBATE_STATE)
        .unwrap();
    assert_eq!(research.side_history(stages::BULL_RESEARCHER), ["bull case"]);
    assert!(research.side_history(stages::BEAR_RESEARCHER).is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let failure = orchestrator_with(HashMap::new())
        .run_with_cancel("NVDA", "2024-05-10", token)
        .await
        .unwrap_err();

    assert!(matches!(failure.cause, EngineError::RunCancelled));
    assert_eq!(failure.snapshot.version, 1);
    assert!(failure.completed_stages.is_empty());
    assert_eq!(failure.snapshot.text(keys::COMPANY_OF_INTEREST), "NVDA");
}

#[tokio::test]
async fn test_failed_run_emits_run_failed_last() {
    let bus = EventBus::new().shared();
    let sink = Arc::new(RecordingSink::new());
    bus.attach(sink.clone());

    let mut overrides = HashMap::new();
    overrides.insert(stages::RISK_JUDGE, failing("judge offline"));
    let failure = PipelineOrchestrator::builder(PipelinePlan::default(), common::registry_with(overrides))
        .events(bus)
        .build()
        .unwrap()
        .run("NVDA", "2024-05-10")
        .await
        .unwrap_err();

    let events = sink.events();
    match events.last() {
        Some(EngineEvent::RunFailed { error, version, .. }) => {
            assert!(error.contains("judge offline"));
            assert_eq!(*version, failure.snapshot.version);
        }
        other => panic!("expected RunFailed, got {:?}", other),
    }
    assert!(!events
        .iter()
        .any(|e| matches!(e, EngineEvent::RunFinished { .. })));
    assert_eq!(sink.snapshot_versions().last(), Some(&12));
}
