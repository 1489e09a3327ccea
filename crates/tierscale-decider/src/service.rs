//! The decider contract.

use serde::Serialize;
use serde::de::DeserializeOwned;

use tierscale_capacity::DeciderResult;

use crate::error::DeciderError;
use crate::snapshot::ClusterSnapshot;

/// Everything a decider may look at during one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct DeciderContext<'a> {
    pub policy_name: &'a str,
    pub decider_name: &'a str,
    pub snapshot: &'a ClusterSnapshot,
}

/// A decider kind: a tag, a typed configuration, and a pure evaluator.
///
/// `evaluate` must not block or perform I/O and must not panic for a
/// structurally valid snapshot. A decider without enough information
/// returns an abstaining result whose reason says why. Deciders that need
/// slow external signals refresh them out of band and read the cached
/// value here.
pub trait DeciderService: Send + Sync + 'static {
    type Configuration: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Stable tag stored as `kind` in persisted configurations.
    fn kind(&self) -> &'static str;

    /// Reject out-of-range or contradictory settings.
    fn validate(&self, _config: &Self::Configuration) -> Result<(), DeciderError> {
        Ok(())
    }

    fn evaluate(&self, config: &Self::Configuration, ctx: &DeciderContext<'_>) -> DeciderResult;
}

/// A decider service bound to one validated configuration.
///
/// This is the type-erased form the engine evaluates; see
/// [`DeciderRegistry::resolve`](crate::DeciderRegistry::resolve).
pub trait Decider: Send + Sync {
    fn kind(&self) -> &'static str;

    fn evaluate(&self, ctx: &DeciderContext<'_>) -> DeciderResult;
}
