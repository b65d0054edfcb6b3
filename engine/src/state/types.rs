//! Core value types held by the workflow state store
//!
//! Every value in a run's state is one of three shapes: a text field
//! (reports, decisions, tags), an ordered message sequence, or a debate
//! record. Message records carry a unique identity so hygiene can remove
//! them by id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content of the neutral record left behind by history hygiene.
pub const PLACEHOLDER_CONTENT: &str = "Continue";

/// Unique identifier for a message record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Author role of a message record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Query trigger (the run subject, or a re-prompt)
    Initiator,
    /// Output of a stage's executable unit
    Responder,
    /// Output of the tool-execution collaborator
    ToolResult,
    /// Neutral record left by history hygiene
    Placeholder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Responder => write!(f, "responder"),
            Self::ToolResult => write!(f, "tool_result"),
            Self::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// A pending tool invocation requested by a responder record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Call id shared with the matching tool-result record
    pub call_id: String,
    /// Tool name
    pub name: String,
    /// Tool arguments
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments: serde_json::Value::Null,
        }
    }

    pub fn with_arguments(mut self, arguments: serde_json::Value) -> Self {
        self.arguments = arguments;
        self
    }
}

/// A tool collaborator's answer to one [`ToolRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
}

impl ToolResult {
    pub fn new(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
        }
    }
}

/// A single record in a message sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identity, used for removal
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    /// Pending tool invocations (responder records only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolRequest>,
    /// Call id answered by this record (tool-result records only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Stage a placeholder was left by
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            stage: None,
        }
    }

    pub fn initiator(content: impl Into<String>) -> Self {
        Self::with_role(Role::Initiator, content)
    }

    pub fn responder(content: impl Into<String>) -> Self {
        Self::with_role(Role::Responder, content)
    }

    pub fn tool_result(result: ToolResult) -> Self {
        let mut msg = Self::with_role(Role::ToolResult, result.content);
        msg.tool_call_id = Some(result.call_id);
        msg
    }

    /// Neutral record attributed to `stage`.
    pub fn placeholder(stage: &str) -> Self {
        let mut msg = Self::with_role(Role::Placeholder, PLACEHOLDER_CONTENT);
        msg.stage = Some(stage.to_string());
        msg
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolRequest>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Whether this record still waits on tool results.
    pub fn has_pending_tool_calls(&self) -> bool {
        self.role == Role::Responder && !self.tool_calls.is_empty()
    }

    pub fn is_placeholder(&self) -> bool {
        self.role == Role::Placeholder
    }
}

/// One contribution made during a debate turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// 1-indexed turn number
    pub turn: u32,
    pub speaker: String,
    pub content: String,
}

/// Accumulated state of a debate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateState {
    /// Completed turns
    pub count: u32,
    /// Role that spoke last
    pub latest_speaker: Option<String>,
    /// Per-side contributions in speaking order
    pub histories: BTreeMap<String, Vec<String>>,
    /// All contributions in speaking order
    pub transcript: Vec<Contribution>,
    /// Most recent contribution
    pub current_response: String,
    /// Verdict written by the judge stage; the debate is frozen once set
    pub judge_decision: Option<String>,
}

impl DebateState {
    /// Record a completed turn.
    pub fn record_turn(&mut self, speaker: &str, content: &str) {
        self.count += 1;
        self.histories
            .entry(speaker.to_string())
            .or_default()
            .push(content.to_string());
        self.transcript.push(Contribution {
            turn: self.count,
            speaker: speaker.to_string(),
            content: content.to_string(),
        });
        self.current_response = content.to_string();
        self.latest_speaker = Some(speaker.to_string());
    }

    /// Contributions made by `speaker`.
    pub fn side_history(&self, speaker: &str) -> &[String] {
        self.histories
            .get(speaker)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total contributions across all sides.
    pub fn total_contributions(&self) -> usize {
        self.histories.values().map(Vec::len).sum()
    }

    pub fn is_finalized(&self) -> bool {
        self.judge_decision.is_some()
    }

    /// Transcript rendered as `speaker: content` lines.
    pub fn rendered_transcript(&self) -> String {
        self.transcript
            .iter()
            .map(|c| format!("{}: {}", c.speaker, c.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Shape of a state field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Messages,
    Debate,
}

impl ValueKind {
    /// Declared zero value for fields of this kind.
    pub fn zero(self) -> StateValue {
        match self {
            Self::Text => StateValue::Text(String::new()),
            Self::Messages => StateValue::Messages(Vec::new()),
            Self::Debate => StateValue::Debate(DebateState::default()),
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Messages => write!(f, "messages"),
            Self::Debate => write!(f, "debate"),
        }
    }
}

/// A value held under one state key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Text(String),
    Messages(Vec<Message>),
    Debate(DebateState),
}

impl StateValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Messages(_) => ValueKind::Messages,
            Self::Debate(_) => ValueKind::Debate,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_messages(&self) -> Option<&[Message]> {
        match self {
            Self::Messages(messages) => Some(messages),
            _ => None,
        }
    }

    pub fn as_debate(&self) -> Option<&DebateState> {
        match self {
            Self::Debate(debate) => Some(debate),
            _ => None,
        }
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DebateState> for StateValue {
    fn from(value: DebateState) -> Self {
        Self::Debate(value)
    }
}
