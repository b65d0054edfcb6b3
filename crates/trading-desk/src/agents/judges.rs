//! Single-shot synthesis units: research manager, trader and risk judge.

use async_trait::async_trait;
use stage_engine::{
    extract_rating, keys, DebateState, Rating, StageError, StageInput, StageOutput, StageUnit,
};

use crate::tools::Trend;

const PROPOSAL_MARKER: &str = "FINAL TRANSACTION PROPOSAL";

fn rating_for(trend: Option<Trend>) -> Rating {
    match trend {
        Some(Trend::Up) => Rating::Buy,
        Some(Trend::Down) => Rating::Sell,
        Some(Trend::Sideways) | None => Rating::Hold,
    }
}

fn debate<'a>(input: &'a StageInput, key: &str) -> Result<&'a DebateState, StageError> {
    input
        .view
        .debate(key)
        .ok_or_else(|| StageError::unit(format!("{} not in view", key)))
}

/// Judges the bull/bear debate and writes the investment plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResearchManager;

#[async_trait]
impl StageUnit for ResearchManager {
    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, StageError> {
        let debate = debate(input, keys::INVESTMENT_DEBATE_STATE)?;
        let rating = rating_for(Trend::find_in(input.text(keys::MARKET_REPORT)));
        let plan = format!(
            "Weighed {} arguments over the research debate. Recommendation: {}",
            debate.total_contributions(),
            rating
        );
        Ok(StageOutput::reply(plan.clone()).with_write(keys::INVESTMENT_PLAN, plan))
    }
}

/// Turns the investment plan into a transaction proposal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trader;

#[async_trait]
impl StageUnit for Trader {
    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, StageError> {
        let plan = input.text(keys::INVESTMENT_PLAN);
        let rating = extract_rating(plan)
            .ok_or_else(|| StageError::unit("investment plan carries no recommendation"))?;
        let proposal = format!(
            "Following the research desk for {}. {}: **{}**",
            input.text(keys::COMPANY_OF_INTEREST),
            PROPOSAL_MARKER,
            rating
        );
        Ok(StageOutput::reply(proposal.clone())
            .with_write(keys::TRADER_INVESTMENT_PLAN, proposal))
    }
}

/// Judges the risk panel and issues the final decision.
///
/// A buy survives only if the safe seat was heard at least once; otherwise
/// the judge steps down to a hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskJudge;

#[async_trait]
impl StageUnit for RiskJudge {
    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, StageError> {
        let panel = debate(input, keys::RISK_DEBATE_STATE)?;
        let proposed =
            extract_rating(input.text(keys::TRADER_INVESTMENT_PLAN)).unwrap_or(Rating::Hold);
        let heard_safe = !panel
            .side_history(stage_engine::pipeline::stages::SAFE_ANALYST)
            .is_empty();
        let rating = match proposed {
            Rating::Buy if !heard_safe => Rating::Hold,
            other => other,
        };

        let decision = format!(
            "Risk panel heard {} views on the trader's plan. {}: **{}**",
            panel.total_contributions(),
            PROPOSAL_MARKER,
            rating
        );
        Ok(StageOutput::reply(decision.clone()).with_write(keys::FINAL_TRADE_DECISION, decision))
    }
}
