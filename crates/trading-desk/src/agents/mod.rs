//! Deterministic desk units and their registrations.
//!
//! Each stage of the trading plan is bound to a unit here, together with the
//! keys it reads and may write. `build_registry` ties them together for a
//! `RunConfig`; `build_orchestrator` adds the canned tool feed.

pub mod analysts;
pub mod debaters;
pub mod judges;

use std::sync::Arc;

use stage_engine::pipeline::{analyst_report_key, analyst_stage, stages};
use stage_engine::{
    keys, trading_schema, PipelineOrchestrator, PipelinePlan, RunConfig, SharedEventBus,
    SharedStageRegistry, StageRegistry, StageSpec,
};

use crate::error::{DeskError, DeskResult};
use crate::tools::CannedTools;
use analysts::AnalystUnit;
use debaters::{DebaterUnit, Stance};
use judges::{ResearchManager, RiskJudge, Trader};

const DEBATE_SEATS: [(&str, Stance); 5] = [
    (stages::BULL_RESEARCHER, Stance::Bull),
    (stages::BEAR_RESEARCHER, Stance::Bear),
    (stages::RISKY_ANALYST, Stance::Risky),
    (stages::SAFE_ANALYST, Stance::Safe),
    (stages::NEUTRAL_ANALYST, Stance::Neutral),
];

/// Registration for one analyst kind.
pub fn analyst_spec(kind: &str) -> DeskResult<(StageSpec, AnalystUnit)> {
    let report = analyst_report_key(kind).ok_or_else(|| DeskError::UnknownAnalyst(kind.into()))?;
    let spec = StageSpec::new(analyst_stage(kind))
        .reads(&[keys::COMPANY_OF_INTEREST, keys::TRADE_DATE, keys::MESSAGES])
        .writes(&[report, keys::SENDER]);
    Ok((spec, AnalystUnit::new(kind, report)))
}

/// Registry holding the configured analysts plus every downstream stage.
pub fn build_registry(config: &RunConfig) -> DeskResult<SharedStageRegistry> {
    let mut builder = StageRegistry::builder();
    for kind in &config.analysts {
        let (spec, unit) = analyst_spec(kind)?;
        builder = builder.stage(spec, Arc::new(unit));
    }

    for (stage, stance) in DEBATE_SEATS {
        let spec = match stance {
            Stance::Bull | Stance::Bear => StageSpec::new(stage)
                .reads(keys::REPORTS)
                .reads(&[keys::INVESTMENT_DEBATE_STATE]),
            Stance::Risky | Stance::Safe | Stance::Neutral => StageSpec::new(stage).reads(&[
                keys::MARKET_REPORT,
                keys::TRADER_INVESTMENT_PLAN,
                keys::RISK_DEBATE_STATE,
            ]),
        };
        builder = builder.stage(spec, Arc::new(DebaterUnit::new(stance)));
    }

    builder = builder
        .stage(
            StageSpec::new(stages::RESEARCH_MANAGER)
                .reads(&[keys::MARKET_REPORT, keys::INVESTMENT_DEBATE_STATE])
                .writes(&[keys::INVESTMENT_PLAN, keys::INVESTMENT_DEBATE_STATE]),
            Arc::new(ResearchManager),
        )
        .stage(
            StageSpec::new(stages::TRADER)
                .reads(&[keys::COMPANY_OF_INTEREST, keys::INVESTMENT_PLAN])
                .writes(&[keys::TRADER_INVESTMENT_PLAN]),
            Arc::new(Trader),
        )
        .stage(
            StageSpec::new(stages::RISK_JUDGE)
                .reads(&[keys::TRADER_INVESTMENT_PLAN, keys::RISK_DEBATE_STATE])
                .writes(&[keys::FINAL_TRADE_DECISION, keys::RISK_DEBATE_STATE]),
            Arc::new(RiskJudge),
        );

    Ok(builder.build(&trading_schema())?.shared())
}

/// Orchestrator for `config` backed by the canned tool feed.
pub fn build_orchestrator(
    config: &RunConfig,
    events: Option<SharedEventBus>,
) -> DeskResult<PipelineOrchestrator> {
    let registry = build_registry(config)?;
    let mut builder = PipelineOrchestrator::builder(PipelinePlan::trading(config), registry)
        .tools(Arc::new(CannedTools::new()));
    if let Some(bus) = events {
        builder = builder.events(bus);
    }
    Ok(builder.build()?)
}
