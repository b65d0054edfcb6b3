//! Debate state machine: phases, transitions, and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a debate run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Created, no turn taken yet.
    Idle,
    /// The named role is speaking.
    InTurn(String),
    /// A turn was committed; waiting on the cap check and the decider.
    Continuing,
    /// Terminal. No further turns are accepted.
    Concluded,
}

impl DebatePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Concluded)
    }

    /// Whether `to` is a legal next phase.
    pub fn can_transition_to(&self, to: &DebatePhase) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::InTurn(_))
                | (Self::Idle, Self::Concluded)
                | (Self::InTurn(_), Self::Continuing)
                | (Self::Continuing, Self::InTurn(_))
                | (Self::Continuing, Self::Concluded)
        )
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::InTurn(role) => write!(f, "in_turn({})", role),
            Self::Continuing => write!(f, "continuing"),
            Self::Concluded => write!(f, "concluded"),
        }
    }
}

/// How a debate reached `Concluded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    /// Maximum turns was zero; no turn taken.
    Skipped,
    /// The configured turn cap was reached.
    TurnCap,
    /// The turn-decision function signalled conclude.
    Decided,
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::TurnCap => write!(f, "turn_cap"),
            Self::Decided => write!(f, "decided"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid debate transition {} → {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// Phase tracking for one debate controller run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    /// Debate name (e.g. "research", "risk")
    pub name: String,
    pub phase: DebatePhase,
    /// Turns completed in this session
    pub turns: u32,
    pub max_turns: u32,
    pub conclusion: Option<Conclusion>,
    pub transitions: Vec<PhaseTransition>,
    pub started_at: DateTime<Utc>,
}

impl DebateSession {
    pub fn new(name: &str, max_turns: u32) -> Self {
        Self {
            name: name.to_string(),
            phase: DebatePhase::Idle,
            turns: 0,
            max_turns,
            conclusion: None,
            transitions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Move to `to`, recording why.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(&to) {
            return Err(TransitionError {
                from: self.phase.clone(),
                to,
            });
        }
        self.transitions.push(PhaseTransition {
            from: self.phase.clone(),
            to: to.clone(),
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    pub fn begin_turn(&mut self, role: &str) -> Result<(), TransitionError> {
        self.transition(DebatePhase::InTurn(role.to_string()), "turn started")
    }

    pub fn finish_turn(&mut self) -> Result<(), TransitionError> {
        self.transition(DebatePhase::Continuing, "turn committed")?;
        self.turns += 1;
        Ok(())
    }

    pub fn conclude(&mut self, conclusion: Conclusion) -> Result<(), TransitionError> {
        self.transition(DebatePhase::Concluded, &conclusion.to_string())?;
        self.conclusion = Some(conclusion);
        Ok(())
    }

    pub fn is_concluded(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether the hard cap has been reached.
    pub fn at_cap(&self) -> bool {
        self.turns >= self.max_turns
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} turn {}/{}",
            self.phase, self.name, self.turns, self.max_turns
        )
    }
}
