//! Error types for the evaluation engine.

use thiserror::Error;

use tierscale_decider::DeciderError;
use tierscale_state::StateError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Decider(#[from] DeciderError),

    #[error("publish rejected: metadata moved from version {expected} to {actual} during evaluation")]
    PublishConflict { expected: u64, actual: u64 },

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("snapshot version {snapshot} is older than the latest seen version {latest}")]
    StaleSnapshot { snapshot: u64, latest: u64 },
}
