use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the game server on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub detail: String,
}

impl ApiErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotationError {
    #[error("invalid square '{0}'")]
    InvalidSquare(String),
    #[error("invalid coordinate move '{0}'")]
    InvalidMove(String),
    #[error("invalid side '{0}'")]
    InvalidSide(String),
    #[error("invalid difficulty '{0}'")]
    InvalidDifficulty(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("position string is empty")]
    Empty,
    #[error("invalid position '{fen}': {reason}")]
    Invalid { fen: String, reason: String },
}
