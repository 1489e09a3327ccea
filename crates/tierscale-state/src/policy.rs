//! Autoscaling policies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tierscale_decider::DeciderConfiguration;

use crate::error::{StateError, StateResult};
use crate::unique::unique_keys;

/// A named set of deciders. Policies are replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub struct AutoscalingPolicy {
    name: String,
    deciders: BTreeMap<String, DeciderConfiguration>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPolicy {
    name: String,
    #[serde(default, deserialize_with = "unique_keys")]
    deciders: BTreeMap<String, DeciderConfiguration>,
}

impl TryFrom<RawPolicy> for AutoscalingPolicy {
    type Error = StateError;

    fn try_from(raw: RawPolicy) -> StateResult<Self> {
        Self::new(raw.name, raw.deciders)
    }
}

impl AutoscalingPolicy {
    /// Build a policy, validating its name and decider names.
    pub fn new(
        name: impl Into<String>,
        deciders: BTreeMap<String, DeciderConfiguration>,
    ) -> StateResult<Self> {
        let name = name.into();
        validate_policy_name(&name)?;
        if deciders.keys().any(String::is_empty) {
            return Err(StateError::EmptyDeciderName(name));
        }
        Ok(Self { name, deciders })
    }

    /// Build a policy from a decider list, rejecting repeated decider names.
    pub fn from_deciders(
        name: impl Into<String>,
        deciders: impl IntoIterator<Item = (String, DeciderConfiguration)>,
    ) -> StateResult<Self> {
        let name = name.into();
        let mut map = BTreeMap::new();
        for (decider, config) in deciders {
            if map.contains_key(&decider) {
                return Err(StateError::DuplicateDecider {
                    policy: name,
                    decider,
                });
            }
            map.insert(decider, config);
        }
        Self::new(name, map)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deciders keyed and ordered by name.
    pub fn deciders(&self) -> &BTreeMap<String, DeciderConfiguration> {
        &self.deciders
    }

    /// The same deciders under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> StateResult<Self> {
        Self::new(name, self.deciders.clone())
    }
}

/// Policy names end up in API paths and log lines, so keep them simple.
pub fn validate_policy_name(name: &str) -> StateResult<()> {
    let invalid = name.is_empty()
        || name.chars().any(|c| c.is_whitespace() || c == ',' || c == '*');
    if invalid {
        return Err(StateError::InvalidPolicyName(name.to_string()));
    }
    Ok(())
}
