//! The fixed decider: states an explicit capacity regardless of cluster
//! state. Used as a manual override and in tests.

use serde::{Deserialize, Serialize};

use tierscale_capacity::{
    AutoscalingCapacity, AutoscalingResources, DeciderReason, DeciderResult, ResourceQuantity,
};

use crate::error::DeciderError;
use crate::service::{DeciderContext, DeciderService};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixedDeciderConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<ResourceQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<ResourceQuantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u32>,
}

impl FixedDeciderConfiguration {
    pub fn new(
        storage: Option<ResourceQuantity>,
        memory: Option<ResourceQuantity>,
        nodes: Option<u32>,
    ) -> Self {
        Self {
            storage,
            memory,
            nodes,
        }
    }
}

/// The reason reported by the fixed decider: the configured values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedReason {
    pub storage: Option<ResourceQuantity>,
    pub memory: Option<ResourceQuantity>,
    pub nodes: Option<u32>,
}

impl From<FixedReason> for DeciderReason {
    fn from(r: FixedReason) -> Self {
        let show = |q: Option<ResourceQuantity>| q.map_or_else(|| "-".to_string(), |q| q.to_string());
        let nodes = r.nodes.map_or_else(|| "-".to_string(), |n| n.to_string());
        DeciderReason::new(format!(
            "fixed storage [{}] memory [{}] nodes [{nodes}]",
            show(r.storage),
            show(r.memory),
        ))
        .with_detail("storage", r.storage.map(ResourceQuantity::bytes))
        .with_detail("memory", r.memory.map(ResourceQuantity::bytes))
        .with_detail("nodes", r.nodes)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDeciderService;

impl FixedDeciderService {
    pub const KIND: &'static str = "fixed";
}

impl DeciderService for FixedDeciderService {
    type Configuration = FixedDeciderConfiguration;

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn validate(&self, config: &FixedDeciderConfiguration) -> Result<(), DeciderError> {
        let has_resources = config.storage.is_some() || config.memory.is_some();
        if config.nodes == Some(0) && has_resources {
            return Err(DeciderError::invalid(
                Self::KIND,
                "[nodes] must be positive when [storage] or [memory] is set",
            ));
        }
        Ok(())
    }

    fn evaluate(&self, config: &FixedDeciderConfiguration, _ctx: &DeciderContext<'_>) -> DeciderResult {
        let reason = DeciderReason::from(FixedReason {
            storage: config.storage,
            memory: config.memory,
            nodes: config.nodes,
        });
        match AutoscalingResources::from_parts(config.storage, config.memory) {
            Some(tier) => DeciderResult::new(AutoscalingCapacity::tier_only(tier), reason),
            None => DeciderResult::abstain(reason),
        }
    }
}
