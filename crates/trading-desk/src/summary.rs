//! Human and JSON renderings of a finished run.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;
use stage_engine::{keys, Conclusion, Rating, RunOutcome, StageReport, StateSnapshot};

use crate::error::DeskResult;

/// What the CLI prints for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub ticker: String,
    pub trade_date: String,
    pub rating: Option<Rating>,
    pub final_decision: String,
    pub research_conclusion: Conclusion,
    pub risk_conclusion: Conclusion,
    pub tool_rounds: u32,
    pub stages: Vec<StageReport>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<StateSnapshot>,
}

impl RunSummary {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            run_id: outcome.run_id.clone(),
            ticker: outcome.snapshot.text(keys::COMPANY_OF_INTEREST).to_string(),
            trade_date: outcome.snapshot.text(keys::TRADE_DATE).to_string(),
            rating: outcome.rating(),
            final_decision: outcome.final_decision.clone(),
            research_conclusion: outcome.research_conclusion,
            risk_conclusion: outcome.risk_conclusion,
            tool_rounds: outcome.tool_rounds(),
            stages: outcome.stages.clone(),
            metadata: BTreeMap::new(),
            snapshot: None,
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_snapshot(mut self, snapshot: StateSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn to_json(&self) -> DeskResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let rating = self
            .rating
            .map(|r| r.to_string())
            .unwrap_or_else(|| "UNRATED".to_string());
        let _ = writeln!(out, "{} {} -> {}", self.ticker, self.trade_date, rating);
        let _ = writeln!(out, "run {}", self.run_id);
        let _ = writeln!(
            out,
            "research debate: {}, risk panel: {}, tool rounds: {}",
            self.research_conclusion, self.risk_conclusion, self.tool_rounds
        );
        for stage in &self.stages {
            let _ = writeln!(
                out,
                "  v{:<3} {:<22} tools={}",
                stage.version, stage.stage, stage.tool_rounds
            );
        }
        let _ = writeln!(out);
        let _ = write!(out, "{}", self.final_decision);
        out
    }
}
