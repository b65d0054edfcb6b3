//! Deterministic stage units for integration tests.
//!
//! Every unit is a pure function of its input view, so two runs with the
//! same subject and context must produce byte-identical decisions.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use stage_engine::pipeline::{analyst_report_key, analyst_stage, stages};
use stage_engine::{
    keys, trading_schema, FnUnit, Role, SharedStageRegistry, SharedStageUnit, StageInput,
    StageOutput, StageRegistry, StageSpec,
};

pub const ANALYSTS: [&str; 4] = ["market", "social", "news", "fundamentals"];

const DEBATE_KEYS: [&str; 2] = [keys::INVESTMENT_DEBATE_STATE, keys::RISK_DEBATE_STATE];

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("stage_engine=debug")
        .with_test_writer()
        .try_init();
}

fn analyst_unit(kind: &'static str) -> SharedStageUnit {
    let key = analyst_report_key(kind).unwrap_or(keys::MARKET_REPORT);
    FnUnit::shared(move |input: &StageInput| {
        let results = input
            .history()
            .iter()
            .filter(|m| m.role == Role::ToolResult)
            .count();
        let report = format!(
            "{} outlook for {} on {} is constructive ({} data pulls).",
            kind,
            input.text(keys::COMPANY_OF_INTEREST),
            input.text(keys::TRADE_DATE),
            results
        );
        Ok(StageOutput::reply(report.clone())
            .with_write(key, report)
            .with_write(keys::SENDER, analyst_stage(kind)))
    })
}

fn debater(role: &'static str, key: &'static str) -> SharedStageUnit {
    FnUnit::shared(move |input: &StageInput| {
        let turn = input.view.debate(key).map(|d| d.count + 1).unwrap_or(1);
        Ok(StageOutput::reply(format!("{} argument #{}", role, turn)))
    })
}

fn research_manager() -> SharedStageUnit {
    FnUnit::shared(|input: &StageInput| {
        let debate = input
            .view
            .debate(keys::INVESTMENT_DEBATE_STATE)
            .cloned()
            .unwrap_or_default();
        Ok(StageOutput::reply(format!(
            "Plan: BUY after {} contributions ({})",
            debate.total_contributions(),
            debate.rendered_transcript().replace('\n', " / ")
        )))
    })
}

fn trader() -> SharedStageUnit {
    FnUnit::shared(|input: &StageInput| {
        Ok(StageOutput::reply(format!(
            "Executing on [{}]. FINAL TRANSACTION PROPOSAL: **BUY**",
            input.text(keys::INVESTMENT_PLAN)
        )))
    })
}

fn risk_judge() -> SharedStageUnit {
    FnUnit::shared(|input: &StageInput| {
        let reports: Vec<&str> = keys::REPORTS.iter().map(|k| input.text(k)).collect();
        let risk = input
            .view
            .debate(keys::RISK_DEBATE_STATE)
            .map(|d| d.total_contributions())
            .unwrap_or_default();
        Ok(StageOutput::reply(format!(
            "Reports: {} | Trader: {} | Risk views: {} | FINAL TRANSACTION PROPOSAL: **HOLD**",
            reports.join(" "),
            input.text(keys::TRADER_INVESTMENT_PLAN),
            risk
        )))
    })
}

/// Registration for every stage of the trading plan.
pub fn stage_table() -> Vec<(StageSpec, SharedStageUnit)> {
    let mut table = Vec::new();
    for kind in ANALYSTS {
        let report = analyst_report_key(kind).unwrap_or(keys::MARKET_REPORT);
        table.push((
            StageSpec::new(analyst_stage(kind))
                .reads(&[keys::COMPANY_OF_INTEREST, keys::TRADE_DATE, keys::MESSAGES])
                .writes(&[report, keys::SENDER]),
            analyst_unit(kind),
        ));
    }

    let mut research_reads: Vec<&str> = keys::REPORTS.to_vec();
    research_reads.push(keys::INVESTMENT_DEBATE_STATE);
    for role in [stages::BULL_RESEARCHER, stages::BEAR_RESEARCHER] {
        table.push((
            StageSpec::new(role).reads(&research_reads),
            debater(role, keys::INVESTMENT_DEBATE_STATE),
        ));
    }
    table.push((
        StageSpec::new(stages::RESEARCH_MANAGER)
            .reads(&[keys::INVESTMENT_DEBATE_STATE])
            .writes(&[keys::INVESTMENT_PLAN, keys::INVESTMENT_DEBATE_STATE]),
        research_manager(),
    ));
    table.push((
        StageSpec::new(stages::TRADER)
            .reads(&[keys::INVESTMENT_PLAN])
            .writes(&[keys::TRADER_INVESTMENT_PLAN]),
        trader(),
    ));
    for role in [stages::RISKY_ANALYST, stages::SAFE_ANALYST, stages::NEUTRAL_ANALYST] {
        table.push((
            StageSpec::new(role).reads(&[keys::TRADER_INVESTMENT_PLAN, keys::RISK_DEBATE_STATE]),
            debater(role, keys::RISK_DEBATE_STATE),
        ));
    }

    let mut judge_reads: Vec<&str> = keys::REPORTS.to_vec();
    judge_reads.extend(DEBATE_KEYS);
    judge_reads.push(keys::TRADER_INVESTMENT_PLAN);
    table.push((
        StageSpec::new(stages::RISK_JUDGE)
            .reads(&judge_reads)
            .writes(&[keys::FINAL_TRADE_DECISION, keys::RISK_DEBATE_STATE]),
        risk_judge(),
    ));
    table
}

/// Full trading registry, with some units swapped out.
pub fn registry_with(overrides: HashMap<&str, SharedStageUnit>) -> SharedStageRegistry {
    let mut builder = StageRegistry::builder();
    for (spec, unit) in stage_table() {
        let unit = overrides
            .get(spec.name.as_str())
            .cloned()
            .unwrap_or(unit);
        builder = builder.stage(spec, unit);
    }
    builder
        .build(&trading_schema())
        .expect("trading registry is valid")
        .shared()
}

pub fn registry() -> SharedStageRegistry {
    registry_with(HashMap::new())
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
