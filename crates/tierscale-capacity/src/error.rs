//! Error types for the capacity model.

use thiserror::Error;

/// Result type alias for capacity construction.
pub type CapacityResult<T> = Result<T, CapacityError>;

/// Errors raised when a capacity value would violate one of its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("byte quantity {0} exceeds the maximum of {max}", max = i64::MAX)]
    QuantityOutOfRange(u64),

    #[error("resources must specify storage or memory")]
    EmptyResources,

    #[error("node {0} is specified without a tier {0}")]
    NodeWithoutTier(&'static str),

    #[error("decider name must not be empty")]
    EmptyDeciderName,

    #[error("required capacity {stored} does not match the combined decider capacity {combined}")]
    RequiredCapacityMismatch { stored: String, combined: String },

    #[error("degraded results must not carry decider results")]
    DegradedWithResults,
}
