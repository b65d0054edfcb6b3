//! Errors raised while assembling or reporting a desk run.

use stage_engine::EngineError;
use thiserror::Error;

pub type DeskResult<T> = Result<T, DeskError>;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("unknown analyst kind: {0} (expected market, social, news or fundamentals)")]
    UnknownAnalyst(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("cannot render run summary: {0}")]
    Render(#[from] serde_json::Error),
}
