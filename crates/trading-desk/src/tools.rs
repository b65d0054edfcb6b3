//! Canned market-data tools for offline runs.
//!
//! Every answer is derived from the ticker alone, so a run is reproducible
//! without network access. Requests in one round execute concurrently and
//! come back in completion order; the engine restores request order.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use stage_engine::{StageError, ToolExecutor, ToolRequest, ToolResult};
use tracing::debug;

pub const GET_STOCK_DATA: &str = "get_stock_data";
pub const GET_INDICATORS: &str = "get_indicators";
pub const GET_SOCIAL_SENTIMENT: &str = "get_social_sentiment";
pub const GET_NEWS: &str = "get_news";
pub const GET_FUNDAMENTALS: &str = "get_fundamentals";

/// Price direction the canned feed reports for a ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Sideways,
    Down,
}

impl Trend {
    /// Stable per ticker.
    pub fn for_ticker(ticker: &str) -> Self {
        let sum: u32 = ticker
            .trim()
            .to_ascii_uppercase()
            .bytes()
            .map(u32::from)
            .sum();
        match sum % 3 {
            0 => Self::Up,
            1 => Self::Sideways,
            _ => Self::Down,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "uptrend",
            Self::Sideways => "sideways",
            Self::Down => "downtrend",
        }
    }

    /// Parse the label back out of a report.
    pub fn find_in(text: &str) -> Option<Self> {
        [Self::Up, Self::Sideways, Self::Down]
            .into_iter()
            .find(|t| text.contains(t.as_str()))
    }
}

/// Tool collaborator answering from canned data
#[derive(Debug, Clone, Default)]
pub struct CannedTools {
    /// Simulated latency per request; later requests in a round answer
    /// sooner
    pub latency: Duration,
}

impl CannedTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn answer(
        &self,
        request: ToolRequest,
        delay: Duration,
    ) -> Result<ToolResult, StageError> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let ticker = argument(&request.arguments, "ticker");
        let date = argument(&request.arguments, "date");
        let content = canned_answer(&request.name, ticker, date)?;
        Ok(ToolResult::new(request.call_id, content))
    }
}

#[async_trait]
impl ToolExecutor for CannedTools {
    async fn execute(&self, requests: Vec<ToolRequest>) -> Result<Vec<ToolResult>, StageError> {
        let count = requests.len() as u32;
        let mut pending: FuturesUnordered<_> = requests
            .into_iter()
            .enumerate()
            .map(|(i, request)| {
                let delay = self.latency * (count - i as u32);
                self.answer(request, delay)
            })
            .collect();

        let mut results = Vec::with_capacity(count as usize);
        while let Some(result) = pending.next().await {
            let result = result?;
            debug!(call_id = %result.call_id, "Canned tool answered");
            results.push(result);
        }
        Ok(results)
    }
}

fn argument<'a>(arguments: &'a Value, name: &str) -> &'a str {
    arguments.get(name).and_then(Value::as_str).unwrap_or("")
}

/// The canned answer for one tool call.
pub fn canned_answer(tool: &str, ticker: &str, date: &str) -> Result<String, StageError> {
    if ticker.is_empty() {
        return Err(StageError::tool(format!("{} needs a ticker", tool)));
    }
    let trend = Trend::for_ticker(ticker);
    let answer = match tool {
        GET_STOCK_DATA => format!(
            "{} daily bars to {}: 30-session {}",
            ticker,
            date,
            trend.as_str()
        ),
        GET_INDICATORS => match trend {
            Trend::Up => format!("{} RSI 62, MACD above signal", ticker),
            Trend::Sideways => format!("{} RSI 50, MACD flat", ticker),
            Trend::Down => format!("{} RSI 38, MACD below signal", ticker),
        },
        GET_SOCIAL_SENTIMENT => match trend {
            Trend::Up => format!("{} chatter mostly positive", ticker),
            Trend::Sideways => format!("{} chatter mixed", ticker),
            Trend::Down => format!("{} chatter mostly negative", ticker),
        },
        GET_NEWS => format!("{} headlines through {}: no material events", ticker, date),
        GET_FUNDAMENTALS => format!("{} trailing margins stable, leverage moderate", ticker),
        other => return Err(StageError::tool(format!("unknown tool {}", other))),
    };
    Ok(answer)
}
