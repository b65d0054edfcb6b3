//! Full desk runs against the canned tool feed.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use stage_engine::{
    extract_rating, keys, Conclusion, PipelineOrchestrator, PipelinePlan, Rating, RunConfig,
};
use trading_desk::{build_orchestrator, build_registry, CannedTools, RunSummary, Trend};

async fn run(config: &RunConfig, ticker: &str) -> stage_engine::RunOutcome {
    build_orchestrator(config, None)
        .unwrap()
        .run(ticker, "2024-05-10")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_uptrend_ticker_ends_in_buy() {
    assert_eq!(Trend::for_ticker("NVDA"), Trend::Up);
    let outcome = run(&RunConfig::default(), "NVDA").await;

    assert_eq!(outcome.rating(), Some(Rating::Buy));
    assert_eq!(outcome.tool_rounds(), 4);
    for key in keys::REPORTS {
        assert!(
            outcome.snapshot.text(key).contains("NVDA"),
            "{} missing ticker",
            key
        );
    }
    assert_eq!(
        extract_rating(outcome.snapshot.text(keys::TRADER_INVESTMENT_PLAN)),
        Some(Rating::Buy)
    );
    assert_eq!(outcome.research_conclusion, Conclusion::TurnCap);
    assert_eq!(outcome.risk_conclusion, Conclusion::TurnCap);
}

#[tokio::test]
async fn test_downtrend_ticker_ends_in_sell() {
    assert_eq!(Trend::for_ticker("A"), Trend::Down);
    let outcome = run(&RunConfig::default(), "A").await;
    assert_eq!(outcome.rating(), Some(Rating::Sell));
}

#[tokio::test]
async fn test_skipped_risk_panel_downgrades_buy() {
    let config = RunConfig {
        max_risk_discuss_rounds: 0,
        ..RunConfig::default()
    };
    let outcome = run(&config, "NVDA").await;

    assert_eq!(outcome.risk_conclusion, Conclusion::Skipped);
    assert_eq!(outcome.rating(), Some(Rating::Hold));
    assert!(outcome
        .final_decision
        .starts_with("Risk panel heard 0 views"));
}

#[tokio::test]
async fn test_reruns_are_identical() {
    let config = RunConfig::default();
    let first = run(&config, "NVDA").await;
    let second = run(&config, "NVDA").await;
    assert_eq!(first.final_decision, second.final_decision);
    assert_eq!(
        first.snapshot.text(keys::MARKET_REPORT),
        second.snapshot.text(keys::MARKET_REPORT)
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_feed_keeps_request_order() {
    let config = RunConfig {
        analysts: vec!["market".into()],
        ..RunConfig::default()
    };
    let orchestrator =
        PipelineOrchestrator::builder(PipelinePlan::trading(&config), build_registry(&config).unwrap())
            .tools(Arc::new(
                CannedTools::new().with_latency(Duration::from_millis(20)),
            ))
            .build()
            .unwrap();
    let outcome = orchestrator.run("NVDA", "2024-05-10").await.unwrap();

    let report = outcome.snapshot.text(keys::MARKET_REPORT);
    let bars = report.find("daily bars").unwrap();
    let rsi = report.find("RSI").unwrap();
    assert!(bars < rsi, "stock data must precede indicators: {}", report);
}

#[tokio::test]
async fn test_config_file_drives_run() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "analysts = [\"news\", \"fundamentals\"]\nmax_debate_rounds = 2"
    )
    .unwrap();
    let config = RunConfig::load(file.path()).unwrap();

    let outcome = run(&config, "NVDA").await;
    assert!(outcome.snapshot.text(keys::MARKET_REPORT).is_empty());
    assert!(!outcome.snapshot.text(keys::NEWS_REPORT).is_empty());
    let research = outcome
        .snapshot
        .debate(keys::INVESTMENT_DEBATE_STATE)
        .unwrap();
    assert_eq!(research.total_contributions(), 4);
    // Without a market report the research desk has no trend to follow.
    assert_eq!(outcome.rating(), Some(Rating::Hold));
}

#[tokio::test]
async fn test_summary_of_real_run() {
    let outcome = run(&RunConfig::default(), "NVDA").await;
    let summary = RunSummary::from_outcome(&outcome);

    assert_eq!(summary.ticker, "NVDA");
    assert_eq!(summary.stages.len(), 12);
    let text = summary.render_text();
    assert!(text.starts_with("NVDA 2024-05-10 -> BUY"));
    assert!(text.contains("risk_judge"));
}
