//! Run configuration.
//!
//! Loaded once before a run starts (TOML file, then `DESK_*` environment
//! overrides) and held immutably by the orchestrator for the run's lifetime.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::otel::TracingConfig;
use crate::tool_loop::DEFAULT_MAX_TOOL_ROUNDS;

/// Participants in the research debate.
pub const RESEARCH_PARTICIPANTS: u32 = 2;
/// Participants in the risk panel.
pub const RISK_PARTICIPANTS: u32 = 3;

fn default_analysts() -> Vec<String> {
    ["market", "social", "news", "fundamentals"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_rounds() -> u32 {
    1
}

fn default_tool_rounds() -> u32 {
    DEFAULT_MAX_TOOL_ROUNDS
}

/// Configuration for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Analyst kinds, in execution order
    #[serde(default = "default_analysts")]
    pub analysts: Vec<String>,
    /// Full bull/bear exchanges in the research debate
    #[serde(default = "default_rounds")]
    pub max_debate_rounds: u32,
    /// Full risky/safe/neutral rotations in the risk panel
    #[serde(default = "default_rounds")]
    pub max_risk_discuss_rounds: u32,
    /// Tool rounds allowed per analyst invocation
    #[serde(default = "default_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            analysts: default_analysts(),
            max_debate_rounds: default_rounds(),
            max_risk_discuss_rounds: default_rounds(),
            max_tool_rounds: default_tool_rounds(),
            tracing: TracingConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        toml::from_str(text)
            .map_err(|e| EngineError::Configuration(format!("invalid run config: {}", e)))
    }

    /// Load from a TOML file, apply `DESK_*` overrides, then validate.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus `DESK_*` overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source. Unparseable values are
    /// ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u32>().ok());

        if let Some(n) = number("DESK_MAX_DEBATE_ROUNDS") {
            self.max_debate_rounds = n;
        }
        if let Some(n) = number("DESK_MAX_RISK_ROUNDS") {
            self.max_risk_discuss_rounds = n;
        }
        if let Some(n) = number("DESK_MAX_TOOL_ROUNDS") {
            self.max_tool_rounds = n;
        }
        if let Some(list) = lookup("DESK_ANALYSTS") {
            let analysts = parse_list(&list);
            if !analysts.is_empty() {
                self.analysts = analysts;
            }
        }
        if let Some(val) = lookup("DESK_TRACING") {
            self.tracing.enabled = val.to_lowercase() == "true" || val == "1";
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.analysts.is_empty() {
            return Err(EngineError::Configuration(
                "at least one analyst is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for analyst in &self.analysts {
            if !seen.insert(analyst.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "analyst {} listed twice",
                    analyst
                )));
            }
        }
        Ok(())
    }

    /// Turn cap for the research debate.
    pub fn research_turns(&self) -> u32 {
        RESEARCH_PARTICIPANTS.saturating_mul(self.max_debate_rounds)
    }

    /// Turn cap for the risk panel.
    pub fn risk_turns(&self) -> u32 {
        RISK_PARTICIPANTS.saturating_mul(self.max_risk_discuss_rounds)
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
