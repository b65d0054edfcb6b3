//! Result of a successful run.

use serde::{Deserialize, Serialize};

use crate::debate::Conclusion;
use crate::signal::{extract_rating, Rating};
use crate::state::StateSnapshot;
use crate::tool_loop::StageReport;

/// A completed run: final state plus how it got there
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    /// Snapshot after the final synthesis stage
    pub snapshot: StateSnapshot,
    /// Text written by the final judge stage
    pub final_decision: String,
    pub research_conclusion: Conclusion,
    pub risk_conclusion: Conclusion,
    /// Every committed stage in order (debate turns included)
    pub stages: Vec<StageReport>,
}

impl RunOutcome {
    /// Rating carried by the final decision, if one can be read.
    pub fn rating(&self) -> Option<Rating> {
        extract_rating(&self.final_decision)
    }

    /// Total tool rounds across all stages.
    pub fn tool_rounds(&self) -> u32 {
        self.stages.iter().map(|s| s.tool_rounds).sum()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.stage.as_str()).collect()
    }
}
