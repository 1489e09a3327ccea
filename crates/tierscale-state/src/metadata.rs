//! Cluster-wide autoscaling metadata.

use std::collections::{BTreeMap, BTreeSet};

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use tierscale_capacity::AutoscalingDeciderResults;
use tierscale_decider::DeciderConfiguration;

use crate::error::{StateError, StateResult};
use crate::policy::AutoscalingPolicy;
use crate::unique::unique_keys;

// ── Policy metadata ───────────────────────────────────────────────

/// A policy together with the results of its last evaluation.
///
/// The cached results exist for status reporting only; evaluation always
/// starts from the policy and a fresh snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoscalingPolicyMetadata {
    policy: AutoscalingPolicy,
    last_results: Option<AutoscalingDeciderResults>,
}

impl AutoscalingPolicyMetadata {
    pub fn new(policy: AutoscalingPolicy) -> Self {
        Self {
            policy,
            last_results: None,
        }
    }

    /// Attach results, which must cover exactly the policy's deciders
    /// (degraded results cover none).
    pub fn with_results(self, results: AutoscalingDeciderResults) -> StateResult<Self> {
        check_results(&self.policy, &results)?;
        Ok(Self {
            policy: self.policy,
            last_results: Some(results),
        })
    }

    pub fn policy(&self) -> &AutoscalingPolicy {
        &self.policy
    }

    pub fn last_results(&self) -> Option<&AutoscalingDeciderResults> {
        self.last_results.as_ref()
    }
}

fn check_results(policy: &AutoscalingPolicy, results: &AutoscalingDeciderResults) -> StateResult<()> {
    let matches = if results.is_degraded() {
        results.results().is_empty()
    } else {
        results.results().keys().eq(policy.deciders().keys())
    };
    if !matches {
        return Err(StateError::ResultsMismatch(policy.name().to_string()));
    }
    Ok(())
}

// ── Metadata ──────────────────────────────────────────────────────

/// Every autoscaling policy in the cluster, keyed by policy name.
///
/// This is the unit that is versioned and published as a whole. All
/// "mutators" return a new value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "RawMetadata")]
pub struct AutoscalingMetadata {
    policies: BTreeMap<String, AutoscalingPolicyMetadata>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyEntryRef<'a> {
    deciders: &'a BTreeMap<String, DeciderConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_results: Option<&'a AutoscalingDeciderResults>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawPolicyEntry {
    #[serde(default, deserialize_with = "unique_keys")]
    deciders: BTreeMap<String, DeciderConfiguration>,
    #[serde(default)]
    last_results: Option<AutoscalingDeciderResults>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMetadata {
    #[serde(default, deserialize_with = "unique_keys")]
    policies: BTreeMap<String, RawPolicyEntry>,
}

impl TryFrom<RawMetadata> for AutoscalingMetadata {
    type Error = StateError;

    fn try_from(raw: RawMetadata) -> StateResult<Self> {
        let mut policies = BTreeMap::new();
        for (name, entry) in raw.policies {
            let policy = AutoscalingPolicy::new(name.clone(), entry.deciders)?;
            let mut metadata = AutoscalingPolicyMetadata::new(policy);
            if let Some(results) = entry.last_results {
                metadata = metadata.with_results(results)?;
            }
            policies.insert(name, metadata);
        }
        Ok(Self { policies })
    }
}

impl Serialize for AutoscalingMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let policies: BTreeMap<&str, PolicyEntryRef<'_>> = self
            .policies
            .iter()
            .map(|(name, m)| {
                let entry = PolicyEntryRef {
                    deciders: m.policy.deciders(),
                    last_results: m.last_results.as_ref(),
                };
                (name.as_str(), entry)
            })
            .collect();
        let mut state = serializer.serialize_struct("AutoscalingMetadata", 1)?;
        state.serialize_field("policies", &policies)?;
        state.end()
    }
}

impl AutoscalingMetadata {
    /// Build metadata from policy entries, checking each key matches its
    /// policy's name.
    pub fn new(policies: BTreeMap<String, AutoscalingPolicyMetadata>) -> StateResult<Self> {
        for (key, metadata) in &policies {
            if key != metadata.policy.name() {
                return Err(StateError::PolicyKeyMismatch {
                    key: key.clone(),
                    name: metadata.policy.name().to_string(),
                });
            }
        }
        Ok(Self { policies })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn policies(&self) -> &BTreeMap<String, AutoscalingPolicyMetadata> {
        &self.policies
    }

    pub fn policy(&self, name: &str) -> Option<&AutoscalingPolicyMetadata> {
        self.policies.get(name)
    }

    /// Insert or replace a policy.
    ///
    /// Cached results survive only if the stored policy is identical;
    /// otherwise they were not produced by the new decider set.
    pub fn put_policy(&self, policy: AutoscalingPolicy) -> Self {
        let mut policies = self.policies.clone();
        let entry = match policies.remove(policy.name()) {
            Some(existing) if existing.policy == policy => existing,
            _ => AutoscalingPolicyMetadata::new(policy),
        };
        policies.insert(entry.policy.name().to_string(), entry);
        Self { policies }
    }

    /// Remove a policy; `None` if it did not exist.
    pub fn remove_policy(&self, name: &str) -> Option<Self> {
        if !self.policies.contains_key(name) {
            return None;
        }
        let mut policies = self.policies.clone();
        policies.remove(name);
        Some(Self { policies })
    }

    /// Replace cached results for the named policies. Policies not named
    /// keep their current cache; names without a policy are rejected.
    pub fn with_results(
        &self,
        results: BTreeMap<String, AutoscalingDeciderResults>,
    ) -> StateResult<Self> {
        let mut policies = self.policies.clone();
        for (name, result) in results {
            let entry = policies
                .remove(&name)
                .ok_or_else(|| StateError::NotFound(format!("policy [{name}]")))?;
            let entry = AutoscalingPolicyMetadata::new(entry.policy).with_results(result)?;
            policies.insert(name, entry);
        }
        Ok(Self { policies })
    }

    /// Changes needed to turn `previous` into `self`.
    pub fn diff(&self, previous: &AutoscalingMetadata) -> MetadataDiff {
        let upserted = self
            .policies
            .iter()
            .filter(|(name, m)| previous.policies.get(*name) != Some(*m))
            .map(|(name, m)| (name.clone(), m.clone()))
            .collect();
        let removed = previous
            .policies
            .keys()
            .filter(|name| !self.policies.contains_key(*name))
            .cloned()
            .collect();
        MetadataDiff { upserted, removed }
    }
}

/// Per-policy difference between two metadata versions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataDiff {
    upserted: BTreeMap<String, AutoscalingPolicyMetadata>,
    removed: BTreeSet<String>,
}

impl MetadataDiff {
    pub fn is_empty(&self) -> bool {
        self.upserted.is_empty() && self.removed.is_empty()
    }

    /// Policies that were added or whose policy or cached results changed.
    pub fn upserted(&self) -> impl Iterator<Item = &str> {
        self.upserted.keys().map(String::as_str)
    }

    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.removed.iter().map(String::as_str)
    }

    /// Apply this diff on top of the version it was computed against.
    pub fn apply(&self, previous: &AutoscalingMetadata) -> AutoscalingMetadata {
        let mut policies = previous.policies.clone();
        for name in &self.removed {
            policies.remove(name);
        }
        for (name, metadata) in &self.upserted {
            policies.insert(name.clone(), metadata.clone());
        }
        AutoscalingMetadata { policies }
    }
}

#[cfg(test)]
mod tests {
    use rand::distributions::Alphanumeric;
    use rand::rngs::StdRng;
    use rand::seq::IteratorRandom;
    use rand::{Rng, SeedableRng};

    use tierscale_capacity::testing::random_nullable_quantity;
    use tierscale_capacity::{DeciderReason, DeciderResult};
    use tierscale_decider::{FixedDeciderConfiguration, FixedDeciderService};

    use super::*;

    fn random_name(rng: &mut StdRng) -> String {
        (0..8)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect::<String>()
            .to_lowercase()
    }

    fn random_fixed_decider(rng: &mut StdRng) -> DeciderConfiguration {
        let nodes = rng.gen_bool(0.5).then(|| rng.gen_range(1..1000));
        let config = FixedDeciderConfiguration::new(
            random_nullable_quantity(rng),
            random_nullable_quantity(rng),
            nodes,
        );
        DeciderConfiguration::from_config(&FixedDeciderService, &config).unwrap()
    }

    fn random_deciders(rng: &mut StdRng) -> BTreeMap<String, DeciderConfiguration> {
        (0..rng.gen_range(1..4))
            .map(|i| (format!("fixed-{i}"), random_fixed_decider(rng)))
            .collect()
    }

    fn random_policy(rng: &mut StdRng) -> AutoscalingPolicy {
        let name = random_name(rng);
        AutoscalingPolicy::new(name, random_deciders(rng)).unwrap()
    }

    /// A policy that differs from `instance` in name and possibly deciders.
    fn mutate_policy(rng: &mut StdRng, instance: &AutoscalingPolicy) -> AutoscalingPolicy {
        let deciders = if rng.gen_bool(0.5) {
            let keep = rng.gen_range(0..instance.deciders().len());
            instance
                .deciders()
                .iter()
                .choose_multiple(rng, keep)
                .into_iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            instance.deciders().clone()
        };
        let mut name = random_name(rng);
        while name == instance.name() {
            name = random_name(rng);
        }
        AutoscalingPolicy::new(name, deciders).unwrap()
    }

    fn results_for(policy: &AutoscalingPolicy) -> AutoscalingDeciderResults {
        let results = policy
            .deciders()
            .keys()
            .map(|name| {
                let result = DeciderResult::abstain(DeciderReason::new("waiting for data"));
                (name.clone(), result)
            })
            .collect();
        AutoscalingDeciderResults::new(results).unwrap()
    }

    fn random_metadata(rng: &mut StdRng) -> AutoscalingMetadata {
        let mut metadata = AutoscalingMetadata::empty();
        for _ in 0..rng.gen_range(0..8) {
            let policy = random_policy(rng);
            let name = policy.name().to_string();
            metadata = metadata.put_policy(policy);
            if rng.gen_bool(0.5) {
                let results = results_for(metadata.policy(&name).unwrap().policy());
                metadata = metadata.with_results(BTreeMap::from([(name, results)])).unwrap();
            }
        }
        metadata
    }

    #[test]
    fn serialization_round_trip() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..100 {
            let metadata = random_metadata(&mut rng);
            let json = serde_json::to_vec(&metadata).unwrap();
            let back: AutoscalingMetadata = serde_json::from_slice(&json).unwrap();
            assert_eq!(back, metadata);
            assert_eq!(serde_json::to_vec(&back).unwrap(), json);
        }
    }

    #[test]
    fn mutated_policy_is_unequal() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..100 {
            let policy = random_policy(&mut rng);
            let mutated = mutate_policy(&mut rng, &policy);
            assert_ne!(policy, mutated);
        }
    }

    #[test]
    fn persisted_shape_uses_policy_name_as_key() {
        let policy = AutoscalingPolicy::from_deciders(
            "hot",
            [(
                "fixed".to_string(),
                DeciderConfiguration::from_config(
                    &FixedDeciderService,
                    &FixedDeciderConfiguration::new(None, None, Some(2)),
                )
                .unwrap(),
            )],
        )
        .unwrap();
        let metadata = AutoscalingMetadata::empty().put_policy(policy.clone());
        let metadata = metadata
            .with_results(BTreeMap::from([("hot".to_string(), results_for(&policy))]))
            .unwrap();

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["policies"]["hot"]["deciders"]["fixed"]["kind"], "fixed");
        assert_eq!(json["policies"]["hot"]["deciders"]["fixed"]["nodes"], 2);
        assert!(json["policies"]["hot"].get("name").is_none());
        assert_eq!(
            json["policies"]["hot"]["lastResults"]["perDecider"]["fixed"]["reason"]["summary"],
            "waiting for data"
        );
    }

    #[test]
    fn put_policy_clears_results_only_when_policy_changes() {
        let mut rng = StdRng::seed_from_u64(29);
        let policy = random_policy(&mut rng);
        let name = policy.name().to_string();
        let metadata = AutoscalingMetadata::empty()
            .put_policy(policy.clone())
            .with_results(BTreeMap::from([(name.clone(), results_for(&policy))]))
            .unwrap();

        let same = metadata.put_policy(policy.clone());
        assert!(same.policy(&name).unwrap().last_results().is_some());

        let changed = AutoscalingPolicy::new(name.clone(), BTreeMap::new()).unwrap();
        let replaced = metadata.put_policy(changed);
        assert!(replaced.policy(&name).unwrap().last_results().is_none());
        // The original value is untouched.
        assert!(metadata.policy(&name).unwrap().last_results().is_some());
    }

    #[test]
    fn results_must_cover_policy_deciders() {
        let mut rng = StdRng::seed_from_u64(31);
        let policy = random_policy(&mut rng);
        let empty = AutoscalingDeciderResults::new(BTreeMap::new()).unwrap();
        let err = AutoscalingPolicyMetadata::new(policy.clone()).with_results(empty);
        assert!(matches!(err, Err(StateError::ResultsMismatch(_))));

        let degraded = AutoscalingDeciderResults::degraded("unknown decider kind [x]");
        assert!(AutoscalingPolicyMetadata::new(policy).with_results(degraded).is_ok());
    }

    #[test]
    fn deserialize_rejects_stale_cache_and_bad_names() {
        let stale = r#"{"policies":{"hot":{
            "deciders":{},
            "lastResults":{"requiredCapacity":{},"perDecider":{
                "gone":{"capacity":{},"reason":{"summary":"s"}}
            }}
        }}}"#;
        assert!(serde_json::from_str::<AutoscalingMetadata>(stale).is_err());

        let bad_name = r#"{"policies":{"hot tier":{"deciders":{}}}}"#;
        assert!(serde_json::from_str::<AutoscalingMetadata>(bad_name).is_err());
    }

    #[test]
    fn unknown_kind_still_loads() {
        let json = r#"{"policies":{"hot":{"deciders":{"r":{"kind":"reactive","window":"5m"}}}}}"#;
        let metadata: AutoscalingMetadata = serde_json::from_str(json).unwrap();
        let deciders = metadata.policy("hot").unwrap().policy().deciders();
        assert_eq!(deciders["r"].kind(), "reactive");
    }

    #[test]
    fn new_rejects_key_mismatch() {
        let mut rng = StdRng::seed_from_u64(37);
        let policy = random_policy(&mut rng);
        let entries = BTreeMap::from([(
            "other".to_string(),
            AutoscalingPolicyMetadata::new(policy),
        )]);
        assert!(matches!(
            AutoscalingMetadata::new(entries),
            Err(StateError::PolicyKeyMismatch { .. })
        ));
    }

    #[test]
    fn diff_apply_reproduces_newer_value() {
        let mut rng = StdRng::seed_from_u64(41);
        for _ in 0..50 {
            let previous = random_metadata(&mut rng);
            let mut current = previous.clone();
            if let Some(name) = previous.policies().keys().next().cloned() {
                current = current.remove_policy(&name).unwrap();
            }
            if let Some(existing) = previous.policies().values().last() {
                current = current.put_policy(mutate_policy(&mut rng, existing.policy()));
            }
            current = current.put_policy(random_policy(&mut rng));

            let diff = current.diff(&previous);
            assert_eq!(diff.apply(&previous), current);
            assert!(current.diff(&current).is_empty());
        }
    }

    #[test]
    fn remove_missing_policy() {
        assert!(AutoscalingMetadata::empty().remove_policy("nope").is_none());
    }
}
