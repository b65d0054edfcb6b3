//! Debate controller: N-party round-robin loop over one debate key.
//!
//! Each turn reads the speaker's required keys (plus the debate record),
//! invokes the speaker's unit, records the contribution and commits one
//! delta. Termination order after every turn:
//!
//! 1. turn count reached `max_turns` → `Conclusion::TurnCap`
//! 2. decider says conclude         → `Conclusion::Decided`
//! 3. otherwise the decider's role speaks next
//!
//! `max_turns == 0` concludes from `Idle` without a turn.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Instrument};

use super::decision::{SharedTurnDecider, TurnDecision};
use super::state::{Conclusion, DebateSession, PhaseTransition, TransitionError};
use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::otel;
use crate::registry::SharedStageRegistry;
use crate::scope::RunScope;
use crate::state::{DebateState, StateValue};
use crate::tool_loop::writes_delta;

/// Static description of one debate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateSpec {
    /// Debate name used in events and spans
    pub name: String,
    /// Debate-kind key the controller owns
    pub state_key: String,
    /// Speaking roles, each a registered stage; the first opens
    pub participants: Vec<String>,
    /// Hard turn cap
    pub max_turns: u32,
}

impl DebateSpec {
    pub fn new(name: impl Into<String>, state_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state_key: state_key.into(),
            participants: Vec::new(),
            max_turns: 0,
        }
    }

    pub fn participants(mut self, roles: &[&str]) -> Self {
        self.participants = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn max_turns(mut self, turns: u32) -> Self {
        self.max_turns = turns;
        self
    }
}

/// Result of one controller run
#[derive(Debug, Clone)]
pub struct DebateOutcome {
    pub name: String,
    /// Turns taken in this run
    pub turns: u32,
    pub conclusion: Conclusion,
    /// Debate record as committed after the last turn
    pub state: DebateState,
    pub transitions: Vec<PhaseTransition>,
    /// Speakers in order
    pub speakers: Vec<String>,
}

/// Drives one debate instance
#[derive(Clone)]
pub struct DebateController {
    spec: DebateSpec,
    registry: SharedStageRegistry,
    decider: SharedTurnDecider,
}

impl std::fmt::Debug for DebateController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebateController")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl DebateController {
    /// Bind a debate to its participants' units.
    ///
    /// Every participant must be registered and the state key must be
    /// declared as a debate field.
    pub fn new(
        spec: DebateSpec,
        registry: SharedStageRegistry,
        decider: SharedTurnDecider,
    ) -> EngineResult<Self> {
        if spec.participants.is_empty() {
            return Err(EngineError::Configuration(format!(
                "debate {} has no participants",
                spec.name
            )));
        }
        for role in &spec.participants {
            if !registry.contains(role) {
                return Err(EngineError::UnknownParticipant {
                    debate: spec.name.clone(),
                    role: role.clone(),
                });
            }
        }
        Ok(Self {
            spec,
            registry,
            decider,
        })
    }

    pub fn spec(&self) -> &DebateSpec {
        &self.spec
    }

    pub async fn run(&self, scope: &RunScope) -> EngineResult<DebateOutcome> {
        let span = otel::debate_span(&scope.run_id, &self.spec.name, self.spec.max_turns);
        let outcome = self.drive(scope).instrument(span.clone()).await?;
        otel::record_debate_result(&span, outcome.turns);

        info!(
            run_id = %scope.run_id,
            debate = %self.spec.name,
            turns = outcome.turns,
            conclusion = %outcome.conclusion,
            "Debate concluded"
        );
        scope.emit(EngineEvent::DebateConcluded {
            run_id: scope.run_id.clone(),
            debate: self.spec.name.clone(),
            turns: outcome.turns,
            conclusion: outcome.conclusion,
            timestamp: Utc::now(),
        });
        Ok(outcome)
    }

    async fn drive(&self, scope: &RunScope) -> EngineResult<DebateOutcome> {
        let key = self.spec.state_key.as_str();
        let mut debate = self.current_state(scope)?;
        if debate.is_finalized() {
            return Err(EngineError::DebateFinalized {
                key: key.to_string(),
            });
        }

        let mut session = DebateSession::new(&self.spec.name, self.spec.max_turns);
        let mut speakers = Vec::new();

        if session.at_cap() {
            session.conclude(Conclusion::Skipped).map_err(phase_error)?;
            return Ok(self.outcome(session, debate, speakers));
        }

        let mut next = self.spec.participants[0].clone();
        loop {
            scope.checkpoint()?;
            session.begin_turn(&next).map_err(phase_error)?;

            let registered = self.registry.resolve(&next)?;
            let mut view = scope.store.read(&registered.spec.required_keys());
            view.insert(key, StateValue::Debate(debate.clone()));

            let output = scope
                .invoke_single(registered, view)
                .instrument(otel::debate_turn_span(
                    &self.spec.name,
                    &next,
                    debate.count + 1,
                ))
                .await?;

            debate.record_turn(&next, output.content());
            let delta = writes_delta(&registered.spec, output)
                .map_err(|e| EngineError::stage(next.as_str(), e))?
                .set(key, debate.clone());
            let version = scope.commit(&next, delta)?;

            debug!(
                debate = %self.spec.name,
                speaker = %next,
                turn = debate.count,
                version,
                "Debate turn committed"
            );
            scope.emit(EngineEvent::DebateTurn {
                run_id: scope.run_id.clone(),
                debate: self.spec.name.clone(),
                speaker: next.clone(),
                turn: debate.count,
                timestamp: Utc::now(),
            });
            session.finish_turn().map_err(phase_error)?;
            speakers.push(next.clone());

            if session.at_cap() {
                session.conclude(Conclusion::TurnCap).map_err(phase_error)?;
                break;
            }
            match self.decider.decide(&debate, &self.spec.participants) {
                TurnDecision::Conclude => {
                    session.conclude(Conclusion::Decided).map_err(phase_error)?;
                    break;
                }
                TurnDecision::Continue(role) => {
                    if !self.spec.participants.contains(&role) {
                        return Err(EngineError::UnknownParticipant {
                            debate: self.spec.name.clone(),
                            role,
                        });
                    }
                    next = role;
                }
            }
        }

        Ok(self.outcome(session, debate, speakers))
    }

    fn current_state(&self, scope: &RunScope) -> EngineResult<DebateState> {
        let key = self.spec.state_key.as_str();
        let view = scope.store.read(&[key]);
        match view.get(key) {
            Some(StateValue::Debate(debate)) => Ok(debate.clone()),
            _ => Err(EngineError::Configuration(format!(
                "debate {} needs a debate field {}",
                self.spec.name, key
            ))),
        }
    }

    fn outcome(
        &self,
        session: DebateSession,
        state: DebateState,
        speakers: Vec<String>,
    ) -> DebateOutcome {
        DebateOutcome {
            name: self.spec.name.clone(),
            turns: session.turns,
            conclusion: session.conclusion.unwrap_or(Conclusion::TurnCap),
            state,
            transitions: session.transitions,
            speakers,
        }
    }
}

// The controller only requests legal transitions; reaching this is a bug in
// the loop above, reported instead of panicking.
fn phase_error(e: TransitionError) -> EngineError {
    EngineError::Configuration(e.to_string())
}

/// Convenience for callers holding a concrete decider.
pub fn shared_decider<D: super::decision::TurnDecider + 'static>(decider: D) -> SharedTurnDecider {
    Arc::new(decider)
}
