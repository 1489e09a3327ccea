//! Error types for decider configuration and lookup.

use thiserror::Error;

/// Errors raised while building or resolving decider configurations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeciderError {
    #[error("unknown decider kind [{0}]")]
    UnknownKind(String),

    #[error("decider kind [{0}] is already registered")]
    DuplicateKind(String),

    #[error("invalid configuration for decider kind [{kind}]: {message}")]
    InvalidConfiguration { kind: String, message: String },
}

impl DeciderError {
    pub fn invalid(kind: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}
