//! Debate Controller
//!
//! Generic round-robin loop shared by the two-party research debate and the
//! three-party risk panel; only the participant list and the turn-decision
//! function differ between instances.
//!
//! ```text
//!            max_turns == 0
//!   Idle ─────────────────────────────────────┐
//!     │                                       ▼
//!     └─▶ InTurn(role) ─▶ Continuing ─▶ Concluded
//!              ▲              │  (cap, or decider concludes)
//!              └──────────────┘
//!              decider: Continue(next role)
//! ```

pub mod controller;
pub mod decision;
pub mod state;

pub use controller::{shared_decider, DebateController, DebateOutcome, DebateSpec};
pub use decision::{
    FnDecider, RotationDecider, RoundLimitDecider, SharedTurnDecider, TurnDecider, TurnDecision,
};
pub use state::{Conclusion, DebatePhase, DebateSession, PhaseTransition, TransitionError};
