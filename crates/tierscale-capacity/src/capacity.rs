//! Capacity opinions: resource shapes at tier and node granularity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CapacityError, CapacityResult};
use crate::quantity::ResourceQuantity;

// ── Resources ─────────────────────────────────────────────────────

/// One resource shape: a storage and/or memory byte count.
///
/// At least one dimension is always present. "No dimension known" is
/// expressed by the absence of the whole value (`Option<AutoscalingResources>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawResources")]
pub struct AutoscalingResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    storage: Option<ResourceQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<ResourceQuantity>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResources {
    #[serde(default)]
    storage: Option<ResourceQuantity>,
    #[serde(default)]
    memory: Option<ResourceQuantity>,
}

impl TryFrom<RawResources> for AutoscalingResources {
    type Error = CapacityError;

    fn try_from(raw: RawResources) -> CapacityResult<Self> {
        Self::from_parts(raw.storage, raw.memory).ok_or(CapacityError::EmptyResources)
    }
}

impl AutoscalingResources {
    /// Build a resource shape, or `None` when neither dimension is known.
    pub fn from_parts(
        storage: Option<ResourceQuantity>,
        memory: Option<ResourceQuantity>,
    ) -> Option<Self> {
        if storage.is_none() && memory.is_none() {
            return None;
        }
        Some(Self { storage, memory })
    }

    pub fn new(storage: ResourceQuantity, memory: ResourceQuantity) -> Self {
        Self {
            storage: Some(storage),
            memory: Some(memory),
        }
    }

    pub fn storage_only(storage: ResourceQuantity) -> Self {
        Self {
            storage: Some(storage),
            memory: None,
        }
    }

    pub fn memory_only(memory: ResourceQuantity) -> Self {
        Self {
            storage: None,
            memory: Some(memory),
        }
    }

    pub fn storage(&self) -> Option<ResourceQuantity> {
        self.storage
    }

    pub fn memory(&self) -> Option<ResourceQuantity> {
        self.memory
    }

    /// Combine two optional shapes, keeping the larger value per dimension.
    ///
    /// A dimension missing on one side places no constraint, so the other
    /// side's value wins. Both absent yields `None`.
    pub fn combine(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (None, None) => None,
            (Some(x), None) | (None, Some(x)) => Some(x),
            (Some(x), Some(y)) => Some(Self {
                storage: max_dimension(x.storage, y.storage),
                memory: max_dimension(x.memory, y.memory),
            }),
        }
    }

    /// True if every dimension present here is present in `outer` with a
    /// value at least as large.
    fn fits_within(&self, outer: &Self) -> bool {
        dimension_fits(self.storage, outer.storage) && dimension_fits(self.memory, outer.memory)
    }
}

fn max_dimension(
    a: Option<ResourceQuantity>,
    b: Option<ResourceQuantity>,
) -> Option<ResourceQuantity> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn dimension_fits(inner: Option<ResourceQuantity>, outer: Option<ResourceQuantity>) -> bool {
    match (inner, outer) {
        (Some(i), Some(o)) => i <= o,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

impl fmt::Display for AutoscalingResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |q: Option<ResourceQuantity>| q.map_or_else(|| "-".to_string(), |q| q.to_string());
        write!(f, "storage={}, memory={}", show(self.storage), show(self.memory))
    }
}

// ── Capacity ──────────────────────────────────────────────────────

/// A capacity opinion: requirements for the whole tier and for its
/// largest single node.
///
/// A node dimension may only be present when the matching tier dimension
/// is present. This is checked by [`AutoscalingCapacity::new`] and on
/// deserialization, and preserved by [`AutoscalingCapacity::combine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawCapacity")]
pub struct AutoscalingCapacity {
    #[serde(skip_serializing_if = "Option::is_none")]
    tier: Option<AutoscalingResources>,
    #[serde(skip_serializing_if = "Option::is_none")]
    node: Option<AutoscalingResources>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCapacity {
    #[serde(default)]
    tier: Option<AutoscalingResources>,
    #[serde(default)]
    node: Option<AutoscalingResources>,
}

impl TryFrom<RawCapacity> for AutoscalingCapacity {
    type Error = CapacityError;

    fn try_from(raw: RawCapacity) -> CapacityResult<Self> {
        Self::new(raw.tier, raw.node)
    }
}

impl AutoscalingCapacity {
    /// The fully-null opinion: no requirement in any dimension.
    pub const NONE: Self = Self {
        tier: None,
        node: None,
    };

    /// Build a capacity, rejecting node dimensions that lack a tier dimension.
    pub fn new(
        tier: Option<AutoscalingResources>,
        node: Option<AutoscalingResources>,
    ) -> CapacityResult<Self> {
        if let Some(node) = node {
            let tier_storage = tier.and_then(|t| t.storage);
            let tier_memory = tier.and_then(|t| t.memory);
            if node.storage.is_some() && tier_storage.is_none() {
                return Err(CapacityError::NodeWithoutTier("storage"));
            }
            if node.memory.is_some() && tier_memory.is_none() {
                return Err(CapacityError::NodeWithoutTier("memory"));
            }
        }
        Ok(Self { tier, node })
    }

    /// A tier-only requirement.
    pub fn tier_only(tier: AutoscalingResources) -> Self {
        Self {
            tier: Some(tier),
            node: None,
        }
    }

    pub fn tier(&self) -> Option<AutoscalingResources> {
        self.tier
    }

    pub fn node(&self) -> Option<AutoscalingResources> {
        self.node
    }

    pub fn is_empty(&self) -> bool {
        self.tier.is_none() && self.node.is_none()
    }

    /// Combine two opinions into one that satisfies both.
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            tier: AutoscalingResources::combine(self.tier, other.tier),
            node: AutoscalingResources::combine(self.node, other.node),
        }
    }

    /// Fold [`combine`](Self::combine) over any number of opinions, starting
    /// from [`NONE`](Self::NONE).
    pub fn combine_all<'a>(capacities: impl IntoIterator<Item = &'a Self>) -> Self {
        capacities
            .into_iter()
            .fold(Self::NONE, |acc, capacity| acc.combine(capacity))
    }

    /// Whether the node requirement is no larger than the tier requirement
    /// in every dimension it specifies.
    pub fn is_node_within_tier(&self) -> bool {
        match (self.node, self.tier) {
            (None, _) => true,
            (Some(node), Some(tier)) => node.fits_within(&tier),
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for AutoscalingCapacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.tier, self.node) {
            (None, None) => write!(f, "none"),
            (Some(tier), None) => write!(f, "tier[{tier}]"),
            (None, Some(node)) => write!(f, "node[{node}]"),
            (Some(tier), Some(node)) => write!(f, "tier[{tier}] node[{node}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    use super::*;
    use crate::testing::*;

    fn bytes(b: u64) -> ResourceQuantity {
        ResourceQuantity::from_bytes(b).unwrap()
    }

    #[test]
    fn combine_takes_maximum_per_dimension() {
        let a = AutoscalingResources::new(bytes(100), bytes(10));
        let b = AutoscalingResources::new(bytes(50), bytes(20));
        let combined = AutoscalingResources::combine(Some(a), Some(b)).unwrap();
        assert_eq!(combined.storage(), Some(bytes(100)));
        assert_eq!(combined.memory(), Some(bytes(20)));
    }

    #[test]
    fn combine_treats_missing_dimension_as_unconstrained() {
        let a = AutoscalingResources::storage_only(bytes(100));
        let b = AutoscalingResources::memory_only(bytes(20));
        let combined = AutoscalingResources::combine(Some(a), Some(b)).unwrap();
        assert_eq!(combined, AutoscalingResources::new(bytes(100), bytes(20)));

        assert_eq!(AutoscalingResources::combine(None, None), None);
        assert_eq!(AutoscalingResources::combine(Some(a), None), Some(a));
    }

    #[test]
    fn node_dimension_requires_tier_dimension() {
        let tier = AutoscalingResources::storage_only(bytes(100));
        let node = AutoscalingResources::memory_only(bytes(10));
        assert_eq!(
            AutoscalingCapacity::new(Some(tier), Some(node)),
            Err(CapacityError::NodeWithoutTier("memory"))
        );
        assert_eq!(
            AutoscalingCapacity::new(None, Some(node)),
            Err(CapacityError::NodeWithoutTier("memory"))
        );
        let node = AutoscalingResources::storage_only(bytes(10));
        assert!(AutoscalingCapacity::new(Some(tier), Some(node)).is_ok());
    }

    #[test]
    fn deserialize_enforces_node_tier_coupling() {
        let bad = r#"{"tier":{"storage":10},"node":{"memory":5}}"#;
        assert!(serde_json::from_str::<AutoscalingCapacity>(bad).is_err());

        let good = r#"{"tier":{"storage":10,"memory":8},"node":{"memory":5}}"#;
        let capacity: AutoscalingCapacity = serde_json::from_str(good).unwrap();
        assert_eq!(capacity.node().unwrap().memory(), Some(bytes(5)));
        assert_eq!(serde_json::to_string(&capacity).unwrap(), good);
    }

    #[test]
    fn deserialize_rejects_empty_resources_and_unknown_fields() {
        assert!(serde_json::from_str::<AutoscalingCapacity>(r#"{"tier":{}}"#).is_err());
        assert!(serde_json::from_str::<AutoscalingCapacity>(r#"{"tier":{"cpu":1}}"#).is_err());
        let none: AutoscalingCapacity = serde_json::from_str("{}").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn combine_is_commutative_and_associative() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut caps: Vec<AutoscalingCapacity> = (0..rng_len(&mut rng))
                .map(|_| random_nullable_capacity(&mut rng))
                .collect();
            let expected = AutoscalingCapacity::combine_all(&caps);

            caps.shuffle(&mut rng);
            assert_eq!(AutoscalingCapacity::combine_all(&caps), expected);

            // Regroup: combine each half first, then the halves.
            let mid = caps.len() / 2;
            let left = AutoscalingCapacity::combine_all(&caps[..mid]);
            let right = AutoscalingCapacity::combine_all(&caps[mid..]);
            assert_eq!(right.combine(&left), expected);
        }
    }

    #[test]
    fn combined_capacity_keeps_node_tier_invariants() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let caps: Vec<AutoscalingCapacity> = (0..rng_len(&mut rng))
                .map(|_| random_nullable_capacity(&mut rng))
                .collect();
            let combined = AutoscalingCapacity::combine_all(&caps);
            assert!(AutoscalingCapacity::new(combined.tier(), combined.node()).is_ok());
            if caps.iter().all(AutoscalingCapacity::is_node_within_tier) {
                assert!(combined.is_node_within_tier());
            }
        }
    }

    #[test]
    fn none_is_identity() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let c = random_capacity(&mut rng);
            assert_eq!(c.combine(&AutoscalingCapacity::NONE), c);
            assert_eq!(AutoscalingCapacity::NONE.combine(&c), c);
        }
    }

    #[test]
    fn node_within_tier() {
        let tier = AutoscalingResources::new(bytes(100), bytes(100));
        let small = AutoscalingResources::storage_only(bytes(50));
        let large = AutoscalingResources::storage_only(bytes(150));
        assert!(AutoscalingCapacity::new(Some(tier), Some(small)).unwrap().is_node_within_tier());
        assert!(!AutoscalingCapacity::new(Some(tier), Some(large)).unwrap().is_node_within_tier());
    }

    fn rng_len(rng: &mut StdRng) -> usize {
        use rand::Rng;
        rng.gen_range(0..8)
    }
}
