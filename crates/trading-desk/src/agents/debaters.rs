//! Debate participants for the research debate and the risk panel.
//!
//! Each turn argues from the stance's reading of the market trend and
//! answers the previous speaker.

use async_trait::async_trait;
use stage_engine::{keys, StageError, StageInput, StageOutput, StageUnit};

use crate::tools::Trend;

/// Position a participant argues from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stance {
    Bull,
    Bear,
    Risky,
    Safe,
    Neutral,
}

impl Stance {
    pub fn label(self) -> &'static str {
        match self {
            Self::Bull => "Bull Analyst",
            Self::Bear => "Bear Analyst",
            Self::Risky => "Risky Analyst",
            Self::Safe => "Safe Analyst",
            Self::Neutral => "Neutral Analyst",
        }
    }

    /// The debate this stance takes part in.
    pub fn debate_key(self) -> &'static str {
        match self {
            Self::Bull | Self::Bear => keys::INVESTMENT_DEBATE_STATE,
            Self::Risky | Self::Safe | Self::Neutral => keys::RISK_DEBATE_STATE,
        }
    }

    fn argue(self, trend: Option<Trend>) -> &'static str {
        match (self, trend) {
            (Self::Bull, Some(Trend::Up)) => "momentum and positive chatter support upside",
            (Self::Bull, _) => "fundamentals are stable enough to accumulate on weakness",
            (Self::Bear, Some(Trend::Down)) => "the downtrend and weak indicators argue for exits",
            (Self::Bear, _) => "valuation leaves little margin if momentum fades",
            (Self::Risky, _) => "size up; the reward outweighs the drawdown risk",
            (Self::Safe, _) => "keep exposure small and hedge against reversal",
            (Self::Neutral, _) => "a measured position balances both concerns",
        }
    }
}

/// One debate seat
#[derive(Debug, Clone, Copy)]
pub struct DebaterUnit {
    stance: Stance,
}

impl DebaterUnit {
    pub fn new(stance: Stance) -> Self {
        Self { stance }
    }

    pub fn stance(&self) -> Stance {
        self.stance
    }
}

#[async_trait]
impl StageUnit for DebaterUnit {
    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, StageError> {
        let debate = input
            .view
            .debate(self.stance.debate_key())
            .ok_or_else(|| StageError::unit("debate record not in view"))?;
        let trend = Trend::find_in(input.text(keys::MARKET_REPORT))
            .or_else(|| Trend::find_in(input.text(keys::TRADER_INVESTMENT_PLAN)));

        let mut argument = format!("{}: {}", self.stance.label(), self.stance.argue(trend));
        if let Some(previous) = &debate.latest_speaker {
            argument.push_str(&format!(" (responding to {})", previous));
        }
        Ok(StageOutput::reply(argument))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stage_engine::{DebateState, StateValue, StateView};

    fn input(stance: Stance, market: &str, previous: Option<&str>) -> StageInput {
        let mut view = StateView::default();
        view.insert(keys::MARKET_REPORT, StateValue::Text(market.into()));
        let mut debate = DebateState::default();
        if let Some(speaker) = previous {
            debate.record_turn(speaker, "earlier point");
        }
        view.insert(stance.debate_key(), StateValue::Debate(debate));
        StageInput::new("seat", view)
    }

    #[tokio::test]
    async fn test_bull_reads_uptrend() {
        let output = DebaterUnit::new(Stance::Bull)
            .invoke(&input(Stance::Bull, "30-session uptrend", None))
            .await
            .unwrap();
        assert_eq!(
            output.content(),
            "Bull Analyst: momentum and positive chatter support upside"
        );
    }

    #[tokio::test]
    async fn test_answers_previous_speaker() {
        let output = DebaterUnit::new(Stance::Bear)
            .invoke(&input(Stance::Bear, "downtrend", Some("bull_researcher")))
            .await
            .unwrap();
        assert!(output.content().ends_with("(responding to bull_researcher)"));
        assert!(output.content().contains("argue for exits"));
    }

    #[tokio::test]
    async fn test_missing_debate_fails() {
        let input = StageInput::new("seat", StateView::default());
        assert!(DebaterUnit::new(Stance::Safe).invoke(&input).await.is_err());
    }

    #[test]
    fn test_debate_keys() {
        assert_eq!(Stance::Bull.debate_key(), keys::INVESTMENT_DEBATE_STATE);
        assert_eq!(Stance::Neutral.debate_key(), keys::RISK_DEBATE_STATE);
    }
}
