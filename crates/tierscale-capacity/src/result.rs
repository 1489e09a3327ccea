//! Decider results and their aggregation into a policy-level requirement.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capacity::AutoscalingCapacity;
use crate::error::{CapacityError, CapacityResult};

/// Human readable justification for a decider result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeciderReason {
    summary: String,
    #[serde(default)]
    details: Map<String, Value>,
}

impl DeciderReason {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            details: Map::new(),
        }
    }

    /// Attach a structured detail. `null` values are kept so that a reason
    /// can show that a setting was explicitly absent.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }
}

/// One decider's opinion and the reason behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeciderResult {
    capacity: AutoscalingCapacity,
    reason: DeciderReason,
}

impl DeciderResult {
    pub fn new(capacity: AutoscalingCapacity, reason: DeciderReason) -> Self {
        Self { capacity, reason }
    }

    /// A result with no capacity opinion.
    pub fn abstain(reason: DeciderReason) -> Self {
        Self::new(AutoscalingCapacity::NONE, reason)
    }

    pub fn capacity(&self) -> &AutoscalingCapacity {
        &self.capacity
    }

    pub fn reason(&self) -> &DeciderReason {
        &self.reason
    }

    pub fn is_abstention(&self) -> bool {
        self.capacity.is_empty()
    }
}

/// The outcome of evaluating every decider of one policy.
///
/// `required_capacity` is always the combination of every result's
/// capacity; deserialized values are checked against that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDeciderResults", rename_all = "camelCase")]
pub struct AutoscalingDeciderResults {
    required_capacity: AutoscalingCapacity,
    #[serde(rename = "perDecider")]
    results: BTreeMap<String, DeciderResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawDeciderResults {
    required_capacity: AutoscalingCapacity,
    #[serde(default)]
    per_decider: BTreeMap<String, DeciderResult>,
    #[serde(default)]
    degraded: Option<String>,
}

impl TryFrom<RawDeciderResults> for AutoscalingDeciderResults {
    type Error = CapacityError;

    fn try_from(raw: RawDeciderResults) -> CapacityResult<Self> {
        if raw.degraded.is_some() && !raw.per_decider.is_empty() {
            return Err(CapacityError::DegradedWithResults);
        }
        let mut results = Self::new(raw.per_decider)?;
        if results.required_capacity != raw.required_capacity {
            return Err(CapacityError::RequiredCapacityMismatch {
                stored: raw.required_capacity.to_string(),
                combined: results.required_capacity.to_string(),
            });
        }
        results.degraded = raw.degraded;
        Ok(results)
    }
}

impl AutoscalingDeciderResults {
    /// Aggregate per-decider results into the policy requirement.
    ///
    /// An empty map is valid and yields [`AutoscalingCapacity::NONE`].
    pub fn new(results: BTreeMap<String, DeciderResult>) -> CapacityResult<Self> {
        if results.keys().any(String::is_empty) {
            return Err(CapacityError::EmptyDeciderName);
        }
        let required_capacity =
            AutoscalingCapacity::combine_all(results.values().map(DeciderResult::capacity));
        Ok(Self {
            required_capacity,
            results,
            degraded: None,
        })
    }

    /// Results for a policy that could not be evaluated at all.
    pub fn degraded(note: impl Into<String>) -> Self {
        Self {
            required_capacity: AutoscalingCapacity::NONE,
            results: BTreeMap::new(),
            degraded: Some(note.into()),
        }
    }

    pub fn required_capacity(&self) -> &AutoscalingCapacity {
        &self.required_capacity
    }

    pub fn results(&self) -> &BTreeMap<String, DeciderResult> {
        &self.results
    }

    pub fn degraded_note(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}
