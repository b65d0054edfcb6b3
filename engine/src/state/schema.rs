//! Field descriptors for the workflow state store
//!
//! A schema declares every key a run may hold, the shape of its value and
//! how updates combine. The trading workflow's keys live in [`keys`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{StateValue, ValueKind};

/// How updates to a key combine with its current value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// New value overwrites the old one
    Replace,
    /// Ordered message records; updates append or remove by id
    AppendWithIdentity,
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::AppendWithIdentity => write!(f, "append_with_identity"),
        }
    }
}

/// Descriptor for one state key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub kind: ValueKind,
    pub policy: MergePolicy,
}

impl FieldSpec {
    pub fn text(key: &str) -> Self {
        Self {
            key: key.to_string(),
            kind: ValueKind::Text,
            policy: MergePolicy::Replace,
        }
    }

    pub fn debate(key: &str) -> Self {
        Self {
            key: key.to_string(),
            kind: ValueKind::Debate,
            policy: MergePolicy::Replace,
        }
    }

    pub fn messages(key: &str) -> Self {
        Self {
            key: key.to_string(),
            kind: ValueKind::Messages,
            policy: MergePolicy::AppendWithIdentity,
        }
    }

    pub fn zero(&self) -> StateValue {
        self.kind.zero()
    }
}

/// The full set of declared keys for a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any previous declaration of the same key.
    pub fn with_field(mut self, spec: FieldSpec) -> Self {
        self.fields.insert(spec.key.clone(), spec);
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// State keys of the trading decision workflow
pub mod keys {
    pub const COMPANY_OF_INTEREST: &str = "company_of_interest";
    pub const TRADE_DATE: &str = "trade_date";
    pub const SENDER: &str = "sender";
    pub const MESSAGES: &str = "messages";

    pub const MARKET_REPORT: &str = "market_report";
    pub const SENTIMENT_REPORT: &str = "sentiment_report";
    pub const NEWS_REPORT: &str = "news_report";
    pub const FUNDAMENTALS_REPORT: &str = "fundamentals_report";

    pub const INVESTMENT_DEBATE_STATE: &str = "investment_debate_state";
    pub const INVESTMENT_PLAN: &str = "investment_plan";
    pub const TRADER_INVESTMENT_PLAN: &str = "trader_investment_plan";
    pub const RISK_DEBATE_STATE: &str = "risk_debate_state";
    pub const FINAL_TRADE_DECISION: &str = "final_trade_decision";

    /// Every analyst report key, in default pipeline order
    pub const REPORTS: &[&str] = &[
        MARKET_REPORT,
        SENTIMENT_REPORT,
        NEWS_REPORT,
        FUNDAMENTALS_REPORT,
    ];
}

/// Schema for the trading decision workflow.
pub fn trading_schema() -> StateSchema {
    let mut schema = StateSchema::new()
        .with_field(FieldSpec::text(keys::COMPANY_OF_INTEREST))
        .with_field(FieldSpec::text(keys::TRADE_DATE))
        .with_field(FieldSpec::text(keys::SENDER))
        .with_field(FieldSpec::messages(keys::MESSAGES))
        .with_field(FieldSpec::debate(keys::INVESTMENT_DEBATE_STATE))
        .with_field(FieldSpec::text(keys::INVESTMENT_PLAN))
        .with_field(FieldSpec::text(keys::TRADER_INVESTMENT_PLAN))
        .with_field(FieldSpec::debate(keys::RISK_DEBATE_STATE))
        .with_field(FieldSpec::text(keys::FINAL_TRADE_DECISION));
    for report in keys::REPORTS {
        schema = schema.with_field(FieldSpec::text(report));
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trading_schema_policies() {
        let schema = trading_schema();
        assert_eq!(schema.len(), 13);
        assert_eq!(
            schema.field(keys::MESSAGES).unwrap().policy,
            MergePolicy::AppendWithIdentity
        );
        for report in keys::REPORTS {
            let spec = schema.field(report).unwrap();
            assert_eq!(spec.policy, MergePolicy::Replace);
            assert_eq!(spec.kind, ValueKind::Text);
        }
        assert_eq!(
            schema.field(keys::RISK_DEBATE_STATE).unwrap().kind,
            ValueKind::Debate
        );
    }

    #[test]
    fn test_redeclaring_replaces() {
        let schema = StateSchema::new()
            .with_field(FieldSpec::text("k"))
            .with_field(FieldSpec::messages("k"));
        assert_eq!(schema.len(), 1);
        assert_eq!(schema.field("k").unwrap().kind, ValueKind::Messages);
    }

    #[test]
    fn test_field_zero() {
        assert_eq!(FieldSpec::text("a").zero(), StateValue::Text(String::new()));
        assert_eq!(FieldSpec::messages("m").zero(), StateValue::Messages(vec![]));
    }
}
