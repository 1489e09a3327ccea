//! Error types for autoscaling metadata and its store.

use thiserror::Error;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while building, decoding, or storing metadata.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid policy name [{0}]: must be non-empty and contain no whitespace, ',' or '*'")]
    InvalidPolicyName(String),

    #[error("policy [{0}] has a decider with an empty name")]
    EmptyDeciderName(String),

    #[error("policy [{policy}] has duplicate decider [{decider}]")]
    DuplicateDecider { policy: String, decider: String },

    #[error("policy [{name}] is stored under key [{key}]")]
    PolicyKeyMismatch { key: String, name: String },

    #[error("cached results of policy [{0}] do not match its deciders")]
    ResultsMismatch(String),

    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
}
