//! Analyst units: one tool round against the canned feed, then a one-line
//! report.

use async_trait::async_trait;
use serde_json::json;
use stage_engine::pipeline::analyst_stage;
use stage_engine::{
    keys, Role, StageError, StageInput, StageOutput, StageUnit, ToolRequest,
};

use crate::tools;

/// Analyst for one report kind
#[derive(Debug, Clone)]
pub struct AnalystUnit {
    kind: String,
    report_key: &'static str,
    tools: &'static [&'static str],
}

impl AnalystUnit {
    pub fn new(kind: &str, report_key: &'static str) -> Self {
        let tools: &'static [&'static str] = match kind {
            "market" => &[tools::GET_STOCK_DATA, tools::GET_INDICATORS],
            "social" => &[tools::GET_SOCIAL_SENTIMENT],
            "news" => &[tools::GET_NEWS],
            "fundamentals" => &[tools::GET_FUNDAMENTALS],
            _ => &[],
        };
        Self {
            kind: kind.to_string(),
            report_key,
            tools,
        }
    }

    fn requests(&self, ticker: &str, date: &str) -> Vec<ToolRequest> {
        self.tools
            .iter()
            .enumerate()
            .map(|(i, name)| {
                ToolRequest::new(format!("{}-{}", self.kind, i + 1), *name)
                    .with_arguments(json!({ "ticker": ticker, "date": date }))
            })
            .collect()
    }
}

#[async_trait]
impl StageUnit for AnalystUnit {
    async fn invoke(&self, input: &StageInput) -> Result<StageOutput, StageError> {
        let ticker = input.text(keys::COMPANY_OF_INTEREST);
        let date = input.text(keys::TRADE_DATE);

        if input.tool_round == 0 && !self.tools.is_empty() {
            return Ok(StageOutput::reply(format!("Pulling {} data for {}", self.kind, ticker))
                .with_tool_calls(self.requests(ticker, date)));
        }

        let findings: Vec<&str> = input
            .history()
            .iter()
            .filter(|m| m.role == Role::ToolResult)
            .map(|m| m.content.as_str())
            .collect();
        if findings.is_empty() {
            return Err(StageError::unit(format!(
                "{} analyst has no data for {}",
                self.kind, ticker
            )));
        }

        let report = format!(
            "{} view on {} as of {}: {}.",
            capitalize(&self.kind),
            ticker,
            date,
            findings.join("; ")
        );
        Ok(StageOutput::reply(report.clone())
            .with_write(self.report_key, report)
            .with_write(keys::SENDER, analyst_stage(&self.kind)))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
