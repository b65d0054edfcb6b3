//! Decision signal extraction.
//!
//! Reduces a free-text final decision to a [`Rating`]. An explicit
//! `FINAL TRANSACTION PROPOSAL: **X**` marker wins (the last one, if the
//! text repeats it); otherwise the last standalone rating word counts.

use serde::{Deserialize, Serialize};

const PROPOSAL_MARKER: &str = "FINAL TRANSACTION PROPOSAL:";

/// Trading rating carried by a final decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rating {
    Buy,
    Hold,
    Sell,
}

impl Rating {
    /// Parse a single word, ignoring ASCII case.
    pub fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "HOLD" => Some(Self::Hold),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Hold => write!(f, "HOLD"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Rating expressed by `text`, if any.
pub fn extract_rating(text: &str) -> Option<Rating> {
    proposal_rating(text).or_else(|| last_rating_word(text))
}

fn proposal_rating(text: &str) -> Option<Rating> {
    // ASCII uppercasing keeps byte offsets aligned with `text`.
    let upper = text.to_ascii_uppercase();
    upper
        .match_indices(PROPOSAL_MARKER)
        .filter_map(|(at, _)| {
            let rest = &text[at + PROPOSAL_MARKER.len()..];
            let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '*');
            let word: String = rest.chars().take_while(char::is_ascii_alphabetic).collect();
            Rating::from_word(&word)
        })
        .last()
}

fn last_rating_word(text: &str) -> Option<Rating> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter_map(Rating::from_word)
        .last()
}
