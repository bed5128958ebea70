//! Event bus errors.

use common::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Event bus unavailable: {0}")]
    Unavailable(String),

    #[error("Exchange not declared: {0}")]
    UnknownExchange(String),

    #[error("Queue not declared: {0}")]
    UnknownQueue(String),

    #[error("Invalid binding pattern: {0:?}")]
    InvalidPattern(String),

    #[error("Publish timed out")]
    Timeout,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BusResult<T> = Result<T, BusError>;

impl From<BusError> for AppError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Timeout => AppError::Timeout,
            other => AppError::Transport(other.to_string()),
        }
    }
}
