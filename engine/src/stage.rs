//! Executable units: the external collaborators that do a stage's work.
//!
//! A unit receives a read-only view restricted to its stage's required keys
//! and returns one output record plus the named values it wants written.
//! Units never touch the store; the engine turns their output into a delta.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StageError;
use crate::state::{keys, Message, StateValue, StateView, ToolRequest};

/// Input handed to a unit on each invocation.
#[derive(Debug, Clone)]
pub struct StageInput {
    /// Registered stage name
    pub stage: String,
    /// Values of the stage's required keys. Once a tool round has run, the
    /// history key holds the working history, including uncommitted tool
    /// exchanges, whether or not the stage declared it.
    pub view: StateView,
    /// Tool rounds already resolved in this invocation
    pub tool_round: u32,
    /// Key the working history lives under
    pub history_key: String,
}

impl StageInput {
    pub fn new(stage: impl Into<String>, view: StateView) -> Self {
        Self {
            stage: stage.into(),
            view,
            tool_round: 0,
            history_key: keys::MESSAGES.to_string(),
        }
    }

    pub fn with_history_key(mut self, key: impl Into<String>) -> Self {
        self.history_key = key.into();
        self
    }

    /// Working message history.
    pub fn history(&self) -> &[Message] {
        self.view.messages(&self.history_key)
    }

    pub fn text(&self, key: &str) -> &str {
        self.view.text(key)
    }
}

/// Output of one unit invocation.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// The responder record; may carry pending tool requests
    pub reply: Message,
    /// Replace-policy values to commit when the stage finishes
    pub writes: BTreeMap<String, StateValue>,
}

impl StageOutput {
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            reply: Message::responder(content),
            writes: BTreeMap::new(),
        }
    }

    pub fn with_write(mut self, key: &str, value: impl Into<StateValue>) -> Self {
        self.writes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolRequest>) -> Self {
        self.reply = self.reply.with_tool_calls(tool_calls);
        self
    }

    pub fn content(&self) -> &str {
        &self.reply.content
    }

    pub fn wants_tools(&self) -> bool {
        self.reply.has_pending_tool_calls()
    }
}

/// The executable unit behind a stage.
///
/// Must be a pure function of its input plus whatever external calls it
/// makes. Timeouts and retries of those calls are the unit's business; it
/// reports their failure through `StageError`.
#[async_trait]
pub trait StageUnit: Send + Sync {
    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, StageError>;
}

/// Shared reference to a unit
pub type SharedStageUnit = Arc<dyn StageUnit>;

/// Adapter turning a synchronous closure into a unit.
pub struct FnUnit<F>(pub F);

impl<F> FnUnit<F>
where
    F: Fn(&StageInput) -> Result<StageOutput, StageError> + Send + Sync + 'static,
{
    pub fn shared(f: F) -> SharedStageUnit {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F> StageUnit for FnUnit<F>
where
    F: Fn(&StageInput) -> Result<StageOutput, StageError> + Send + Sync,
{
    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, StageError> {
        (self.0)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_unit_invokes_closure() {
        let unit = FnUnit::shared(|input: &StageInput| {
            Ok(StageOutput::reply(format!("seen {}", input.stage))
                .with_write(keys::MARKET_REPORT, "report"))
        });
        let out = unit
            .invoke(&StageInput::new("market_analyst", StateView::default()))
            .await
            .unwrap();
        assert_eq!(out.content(), "seen market_analyst");
        assert_eq!(
            out.writes.get(keys::MARKET_REPORT),
            Some(&StateValue::Text("report".into()))
        );
        assert!(!out.wants_tools());
    }

    #[test]
    fn test_output_with_tool_calls() {
        let out = StageOutput::reply("")
            .with_tool_calls(vec![ToolRequest::new("a", "get_news")]);
        assert!(out.wants_tools());
        assert_eq!(out.reply.tool_calls[0].call_id, "a");
    }

    #[test]
    fn test_input_history_defaults_empty() {
        let input = StageInput::new("x", StateView::default());
        assert!(input.history().is_empty());
        assert_eq!(input.text(keys::MARKET_REPORT), "");
    }

    #[test]
    fn test_input_history_follows_key() {
        let mut view = StateView::default();
        view.insert("transcript", StateValue::Messages(vec![Message::initiator("NVDA")]));
        let input = StageInput::new("x", view);
        assert!(input.history().is_empty());

        let input = input.with_history_key("transcript");
        assert_eq!(input.history().len(), 1);
        assert_eq!(input.history()[0].content, "NVDA");
    }
}
