//! Per-run execution scope.
//!
//! Bundles what every component needs while a single run executes: the
//! run's isolated store, its event channel and its cancellation token.
//! Two runs never share a scope.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult, StageError};
use crate::events::{EngineEvent, SharedEventBus};
use crate::inspector::Inspector;
use crate::registry::RegisteredStage;
use crate::stage::{StageInput, StageOutput};
use crate::state::{SharedStateStore, StateDelta, StateView};

#[derive(Clone)]
pub struct RunScope {
    pub run_id: String,
    pub store: SharedStateStore,
    events: Option<SharedEventBus>,
    cancel: CancellationToken,
}

impl RunScope {
    pub fn new(run_id: impl Into<String>, store: SharedStateStore) -> Self {
        Self {
            run_id: run_id.into(),
            store,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, bus: SharedEventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn events(&self) -> Option<&SharedEventBus> {
        self.events.as_ref()
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Read-only view over this run's store.
    pub fn inspector(&self) -> Inspector {
        Inspector::new(self.store.clone())
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stage-boundary cancellation check.
    pub fn checkpoint(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            return Err(EngineError::RunCancelled);
        }
        Ok(())
    }

    /// Invoke a stage once, outside the tool loop.
    ///
    /// `view` is the stage's input; an output that still requests tools is
    /// a stage failure.
    pub async fn invoke_single(
        &self,
        registered: &RegisteredStage,
        view: StateView,
    ) -> EngineResult<StageOutput> {
        let stage = registered.spec.name.as_str();
        self.emit(EngineEvent::StageStarted {
            run_id: self.run_id.clone(),
            stage: stage.to_string(),
            timestamp: Utc::now(),
        });

        let output = registered
            .unit
            .invoke(&StageInput::new(stage, view))
            .await
            .map_err(|e| EngineError::stage(stage, e))?;

        if output.wants_tools() {
            let names: Vec<_> = output
                .reply
                .tool_calls
                .iter()
                .map(|r| r.name.as_str())
                .collect();
            return Err(EngineError::stage(
                stage,
                StageError::UnexpectedToolCalls(names.join(", ")),
            ));
        }
        Ok(output)
    }

    /// Apply a stage's delta, then notify observers.
    pub fn commit(&self, stage: &str, delta: StateDelta) -> EngineResult<u64> {
        let version = self
            .store
            .apply_from(stage, delta)
            .map_err(|e| EngineError::stage(stage, e))?;

        self.emit(EngineEvent::StageCommitted {
            run_id: self.run_id.clone(),
            stage: stage.to_string(),
            version,
            timestamp: Utc::now(),
        });
        if let Some(bus) = &self.events {
            bus.publish_snapshot(&self.run_id, &self.store.snapshot());
        }
        Ok(version)
    }
}
