//! Errors raised while building or checking domain values.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A field failed a shape or length rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Password strength rule
    #[error("Password error: {0}")]
    Password(String),

    #[error("Invalid priority '{0}'. Must be one of: low, medium, high")]
    UnknownPriority(String),

    /// argon2 could not produce a hash
    #[error("Password hash failed: {0}")]
    Hashing(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    pub fn password(msg: impl Into<String>) -> Self {
        DomainError::Password(msg.into())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
