//! Pipeline plan: the static shape of one run.
//!
//! A plan names the analyst stages, the two debates, and the three
//! single-shot synthesis steps, in execution order. It is built once from a
//! [`RunConfig`] (or by hand) and validated against the stage registry when
//! the orchestrator is constructed.

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::debate::DebateSpec;
use crate::state::keys;

/// Stage names used by [`PipelinePlan::trading`].
pub mod stages {
    pub const BULL_RESEARCHER: &str = "bull_researcher";
    pub const BEAR_RESEARCHER: &str = "bear_researcher";
    pub const RESEARCH_MANAGER: &str = "research_manager";
    pub const TRADER: &str = "trader";
    pub const RISKY_ANALYST: &str = "risky_analyst";
    pub const SAFE_ANALYST: &str = "safe_analyst";
    pub const NEUTRAL_ANALYST: &str = "neutral_analyst";
    pub const RISK_JUDGE: &str = "risk_judge";
}

/// Stage name for an analyst kind (`market` → `market_analyst`).
pub fn analyst_stage(kind: &str) -> String {
    format!("{}_analyst", kind)
}

/// Report key written by an analyst kind.
pub fn analyst_report_key(kind: &str) -> Option<&'static str> {
    match kind {
        "market" => Some(keys::MARKET_REPORT),
        "social" => Some(keys::SENTIMENT_REPORT),
        "news" => Some(keys::NEWS_REPORT),
        "fundamentals" => Some(keys::FUNDAMENTALS_REPORT),
        _ => None,
    }
}

/// A single-shot stage that produces one text value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisStep {
    pub stage: String,
    /// Text key holding the stage's result. Filled from the reply when the
    /// unit does not write it itself.
    pub output_key: String,
    /// Debate whose verdict this stage delivers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict_for: Option<String>,
}

impl SynthesisStep {
    pub fn new(stage: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            output_key: output_key.into(),
            verdict_for: None,
        }
    }

    /// Also record the result as the verdict of the debate under `key`.
    pub fn judging(mut self, key: impl Into<String>) -> Self {
        self.verdict_for = Some(key.into());
        self
    }
}

/// Ordered description of a full run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePlan {
    /// Analyst stages, run in order through the tool loop
    pub analysts: Vec<String>,
    pub research: DebateSpec,
    pub research_judge: SynthesisStep,
    pub trader: SynthesisStep,
    pub risk: DebateSpec,
    pub risk_judge: SynthesisStep,
    /// Tool rounds allowed per analyst invocation
    pub max_tool_rounds: u32,
    /// Text key seeded with the run subject
    pub subject_key: String,
    /// Text key seeded with the run context
    pub context_key: String,
    /// Message key used for tool exchanges and hygiene
    pub history_key: String,
}

impl PipelinePlan {
    /// The trading workflow with turn caps derived from `config`.
    pub fn trading(config: &RunConfig) -> Self {
        Self {
            analysts: config.analysts.iter().map(|k| analyst_stage(k)).collect(),
            research: DebateSpec::new("research", keys::INVESTMENT_DEBATE_STATE)
                .participants(&[stages::BULL_RESEARCHER, stages::BEAR_RESEARCHER])
                .max_turns(config.research_turns()),
            research_judge: SynthesisStep::new(stages::RESEARCH_MANAGER, keys::INVESTMENT_PLAN)
                .judging(keys::INVESTMENT_DEBATE_STATE),
            trader: SynthesisStep::new(stages::TRADER, keys::TRADER_INVESTMENT_PLAN),
            risk: DebateSpec::new("risk", keys::RISK_DEBATE_STATE)
                .participants(&[
                    stages::RISKY_ANALYST,
                    stages::SAFE_ANALYST,
                    stages::NEUTRAL_ANALYST,
                ])
                .max_turns(config.risk_turns()),
            risk_judge: SynthesisStep::new(stages::RISK_JUDGE, keys::FINAL_TRADE_DECISION)
                .judging(keys::RISK_DEBATE_STATE),
            max_tool_rounds: config.max_tool_rounds,
            subject_key: keys::COMPANY_OF_INTEREST.to_string(),
            context_key: keys::TRADE_DATE.to_string(),
            history_key: keys::MESSAGES.to_string(),
        }
    }

    pub fn with_research_turns(mut self, turns: u32) -> Self {
        self.research.max_turns = turns;
        self
    }

    pub fn with_risk_turns(mut self, turns: u32) -> Self {
        self.risk.max_turns = turns;
        self
    }

    pub fn with_analysts(mut self, stages: &[&str]) -> Self {
        self.analysts = stages.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Key holding the run's final decision.
    pub fn final_key(&self) -> &str {
        &self.risk_judge.output_key
    }

    /// The single-shot steps in execution order.
    pub fn synthesis_steps(&self) -> [&SynthesisStep; 3] {
        [&self.research_judge, &self.trader, &self.risk_judge]
    }

    /// Every stage the plan invokes, in first-use order.
    pub fn stage_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.analysts.iter().map(String::as_str).collect();
        names.extend(self.research.participants.iter().map(String::as_str));
        names.push(&self.research_judge.stage);
        names.push(&self.trader.stage);
        names.extend(self.risk.participants.iter().map(String::as_str));
        names.push(&self.risk_judge.stage);
        names
    }

    /// Human-readable outline, one step per line.
    pub fn outline(&self) -> String {
        let mut lines = Vec::new();
        for (i, analyst) in self.analysts.iter().enumerate() {
            lines.push(format!(
                "{:>2}. {} (tool loop, max {} rounds)",
                i + 1,
                analyst,
                self.max_tool_rounds
            ));
        }
        let debate = |spec: &DebateSpec| {
            format!(
                "debate {} [{}] max {} turns",
                spec.name,
                spec.participants.join(" → "),
                spec.max_turns
            )
        };
        let step = |s: &SynthesisStep| format!("{} → {}", s.stage, s.output_key);
        let rest = [
            debate(&self.research),
            step(&self.research_judge),
            step(&self.trader),
            debate(&self.risk),
            step(&self.risk_judge),
        ];
        let offset = lines.len();
        for (i, line) in rest.into_iter().enumerate() {
            lines.push(format!("{:>2}. {}", offset + i + 1, line));
        }
        lines.join("\n")
    }
}

impl Default for PipelinePlan {
    fn default() -> Self {
        Self::trading(&RunConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_plan_from_defaults() {
        let plan = PipelinePlan::default();
        assert_eq!(
            plan.analysts,
            vec![
                "market_analyst",
                "social_analyst",
                "news_analyst",
                "fundamentals_analyst"
            ]
        );
        assert_eq!(plan.research.max_turns, 2);
        assert_eq!(plan.risk.max_turns, 3);
        assert_eq!(plan.final_key(), keys::FINAL_TRADE_DECISION);
        assert_eq!(
            plan.research_judge.verdict_for.as_deref(),
            Some(keys::INVESTMENT_DEBATE_STATE)
        );
        assert!(plan.trader.verdict_for.is_none());
    }

    #[test]
    fn test_turns_follow_config() {
        let config = RunConfig {
            max_debate_rounds: 3,
            max_risk_discuss_rounds: 0,
            ..Default::default()
        };
        let plan = PipelinePlan::trading(&config);
        assert_eq!(plan.research.max_turns, 6);
        assert_eq!(plan.risk.max_turns, 0);
    }

    #[test]
    fn test_explicit_overrides() {
        let plan = PipelinePlan::default()
            .with_research_turns(5)
            .with_risk_turns(1)
            .with_analysts(&["news_analyst"]);
        assert_eq!(plan.research.max_turns, 5);
        assert_eq!(plan.risk.max_turns, 1);
        assert_eq!(plan.analysts, vec!["news_analyst"]);
    }

    #[test]
    fn test_stage_names_in_order() {
        let plan = PipelinePlan::default().with_analysts(&["market_analyst"]);
        assert_eq!(
            plan.stage_names(),
            vec![
                "market_analyst",
                "bull_researcher",
                "bear_researcher",
                "research_manager",
                "trader",
                "risky_analyst",
                "safe_analyst",
                "neutral_analyst",
                "risk_judge"
            ]
        );
    }

    #[test]
    fn test_analyst_report_keys() {
        assert_eq!(analyst_report_key("social"), Some(keys::SENTIMENT_REPORT));
        assert_eq!(analyst_report_key("crypto"), None);
        assert_eq!(analyst_stage("news"), "news_analyst");
    }

    #[test]
    fn test_outline() {
        let outline = PipelinePlan::default().outline();
        assert!(outline.starts_with(" 1. market_analyst"));
        assert!(outline.contains("debate research [bull_researcher → bear_researcher] max 2 turns"));
        assert!(outline.ends_with(" 9. risk_judge → final_trade_decision"));
    }

    #[test]
    fn test_plan_serializes() {
        let json = serde_json::to_value(PipelinePlan::default()).unwrap();
        assert_eq!(json["risk"]["participants"][2], "neutral_analyst");
        assert!(json["trader"].get("verdict_for").is_none());
    }
}
