//! Read-only status reports built from published metadata.

use serde::Serialize;

use tierscale_capacity::AutoscalingDeciderResults;
use tierscale_state::{AutoscalingPolicyMetadata, VersionedMetadata};

/// What the last published evaluation said about one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityReport {
    pub policy: String,
    pub deciders: Vec<String>,
    /// `None` until the policy has been evaluated once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_results: Option<AutoscalingDeciderResults>,
}

impl From<&AutoscalingPolicyMetadata> for CapacityReport {
    fn from(metadata: &AutoscalingPolicyMetadata) -> Self {
        Self {
            policy: metadata.policy().name().to_string(),
            deciders: metadata.policy().deciders().keys().cloned().collect(),
            last_results: metadata.last_results().cloned(),
        }
    }
}

/// All policies at one published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub version: u64,
    pub policies: Vec<CapacityReport>,
}

impl From<&VersionedMetadata> for StatusReport {
    fn from(published: &VersionedMetadata) -> Self {
        Self {
            version: published.version,
            policies: published
                .metadata
                .policies()
                .values()
                .map(CapacityReport::from)
                .collect(),
        }
    }
}
