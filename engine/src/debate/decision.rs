//! Turn-decision functions.
//!
//! After every committed turn the controller asks a [`TurnDecider`] who
//! speaks next. The controller's own turn cap is checked first, so a
//! decider can end a debate early but never extend it.

use std::sync::Arc;

use crate::state::DebateState;

/// Result of a turn decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnDecision {
    /// Hand the floor to this role.
    Continue(String),
    /// End the debate.
    Conclude,
}

/// Decides whether a debate continues and who speaks next.
pub trait TurnDecider: Send + Sync {
    fn decide(&self, debate: &DebateState, participants: &[String]) -> TurnDecision;
}

/// Shared reference to a decider
pub type SharedTurnDecider = Arc<dyn TurnDecider>;

/// Fixed rotation through the participant list, never concluding on its
/// own. With two participants this is strict alternation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RotationDecider;

impl TurnDecider for RotationDecider {
    fn decide(&self, debate: &DebateState, participants: &[String]) -> TurnDecision {
        next_in_rotation(debate, participants)
            .map(TurnDecision::Continue)
            .unwrap_or(TurnDecision::Conclude)
    }
}

/// Rotation that concludes once `rounds` full rotations are done.
#[derive(Debug, Clone, Copy)]
pub struct RoundLimitDecider {
    pub rounds: u32,
}

impl RoundLimitDecider {
    pub fn new(rounds: u32) -> Self {
        Self { rounds }
    }
}

impl TurnDecider for RoundLimitDecider {
    fn decide(&self, debate: &DebateState, participants: &[String]) -> TurnDecision {
        let limit = self.rounds.saturating_mul(participants.len() as u32);
        if debate.count >= limit {
            return TurnDecision::Conclude;
        }
        RotationDecider.decide(debate, participants)
    }
}

/// Adapter turning a closure into a decider.
pub struct FnDecider<F>(pub F);

impl<F> TurnDecider for FnDecider<F>
where
    F: Fn(&DebateState, &[String]) -> TurnDecision + Send + Sync,
{
    fn decide(&self, debate: &DebateState, participants: &[String]) -> TurnDecision {
        (self.0)(debate, participants)
    }
}

/// Role after the latest speaker; the first role when nobody has spoken.
fn next_in_rotation(debate: &DebateState, participants: &[String]) -> Option<String> {
    let first = participants.first()?;
    let next = match debate.latest_speaker.as_deref() {
        Some(latest) => participants
            .iter()
            .position(|p| p == latest)
            .map(|i| &participants[(i + 1) % participants.len()])
            .unwrap_or(first),
        None => first,
    };
    Some(next.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn after(speakers: &[&str]) -> DebateState {
        let mut debate = DebateState::default();
        for s in speakers {
            debate.record_turn(s, "argument");
        }
        debate
    }

    #[test]
    fn test_two_party_alternation() {
        let participants = roles(&["bull", "bear"]);
        assert_eq!(
            RotationDecider.decide(&after(&[]), &participants),
            TurnDecision::Continue("bull".into())
        );
        assert_eq!(
            RotationDecider.decide(&after(&["bull"]), &participants),
            TurnDecision::Continue("bear".into())
        );
        assert_eq!(
            RotationDecider.decide(&after(&["bull", "bear"]), &participants),
            TurnDecision::Continue("bull".into())
        );
    }

    #[test]
    fn test_three_party_rotation() {
        let participants = roles(&["risky", "safe", "neutral"]);
        let mut speakers = Vec::new();
        let mut debate = DebateState::default();
        for _ in 0..6 {
            match RotationDecider.decide(&debate, &participants) {
                TurnDecision::Continue(role) => {
                    debate.record_turn(&role, "view");
                    speakers.push(role);
                }
                TurnDecision::Conclude => panic!("rotation never concludes"),
            }
        }
        assert_eq!(
            speakers,
            vec!["risky", "safe", "neutral", "risky", "safe", "neutral"]
        );
    }

    #[test]
    fn test_unknown_latest_speaker_restarts_rotation() {
        let participants = roles(&["bull", "bear"]);
        assert_eq!(
            RotationDecider.decide(&after(&["judge"]), &participants),
            TurnDecision::Continue("bull".into())
        );
    }

    #[test]
    fn test_empty_participants_conclude() {
        assert_eq!(
            RotationDecider.decide(&DebateState::default(), &[]),
            TurnDecision::Conclude
        );
    }

    #[test]
    fn test_round_limit() {
        let participants = roles(&["bull", "bear"]);
        let decider = RoundLimitDecider::new(1);
        assert_eq!(
            decider.decide(&after(&["bull"]), &participants),
            TurnDecision::Continue("bear".into())
        );
        assert_eq!(
            decider.decide(&after(&["bull", "bear"]), &participants),
            TurnDecision::Conclude
        );
    }

    #[test]
    fn test_fn_decider() {
        let decider = FnDecider(|_: &DebateState, _: &[String]| TurnDecision::Conclude);
        assert_eq!(
            decider.decide(&DebateState::default(), &roles(&["a"])),
            TurnDecision::Conclude
        );
    }
}
