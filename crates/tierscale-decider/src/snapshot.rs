//! The read-only cluster view handed to deciders.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use tierscale_capacity::{
    AutoscalingCapacity, AutoscalingResources, CapacityResult, ResourceQuantity,
};

/// Resource totals for a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResources {
    pub node_id: String,
    /// Names of the autoscaling policies this node serves.
    #[serde(default)]
    pub policies: BTreeSet<String>,
    pub storage: ResourceQuantity,
    pub memory: ResourceQuantity,
}

impl NodeResources {
    pub fn serves(&self, policy: &str) -> bool {
        self.policies.contains(policy)
    }
}

/// An immutable snapshot of cluster state at one version.
///
/// Deciders only ever see `&ClusterSnapshot`; the engine shares one
/// snapshot across all concurrent evaluations of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Monotonic cluster-state version this snapshot was taken at.
    version: u64,
    #[serde(default)]
    nodes: Vec<NodeResources>,
}

impl ClusterSnapshot {
    pub fn new(version: u64, nodes: Vec<NodeResources>) -> Self {
        Self { version, nodes }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn nodes(&self) -> &[NodeResources] {
        &self.nodes
    }

    /// Nodes serving the given policy (its tier).
    pub fn nodes_for_policy<'a>(
        &'a self,
        policy: &'a str,
    ) -> impl Iterator<Item = &'a NodeResources> + 'a {
        self.nodes.iter().filter(move |n| n.serves(policy))
    }

    /// The capacity the tier currently has: summed totals for the tier and
    /// the largest node per dimension. `NONE` when no node serves the policy.
    pub fn current_capacity(&self, policy: &str) -> CapacityResult<AutoscalingCapacity> {
        let mut tier: Option<(ResourceQuantity, ResourceQuantity)> = None;
        let mut node: Option<(ResourceQuantity, ResourceQuantity)> = None;

        for n in self.nodes_for_policy(policy) {
            tier = Some(match tier {
                None => (n.storage, n.memory),
                Some((s, m)) => (s.checked_add(n.storage)?, m.checked_add(n.memory)?),
            });
            node = Some(match node {
                None => (n.storage, n.memory),
                Some((s, m)) => (s.max(n.storage), m.max(n.memory)),
            });
        }

        match (tier, node) {
            (Some((ts, tm)), Some((ns, nm))) => AutoscalingCapacity::new(
                Some(AutoscalingResources::new(ts, tm)),
                Some(AutoscalingResources::new(ns, nm)),
            ),
            _ => Ok(AutoscalingCapacity::NONE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, policy: &str, storage: u64, memory: u64) -> NodeResources {
        NodeResources {
            node_id: id.to_string(),
            policies: BTreeSet::from([policy.to_string()]),
            storage: ResourceQuantity::from_bytes(storage).unwrap(),
            memory: ResourceQuantity::from_bytes(memory).unwrap(),
        }
    }

    #[test]
    fn current_capacity_sums_tier_and_tracks_largest_node() {
        let snapshot = ClusterSnapshot::new(
            7,
            vec![
                node("n1", "hot", 100, 10),
                node("n2", "hot", 300, 5),
                node("n3", "warm", 1000, 1000),
            ],
        );
        let capacity = snapshot.current_capacity("hot").unwrap();
        let tier = capacity.tier().unwrap();
        let largest = capacity.node().unwrap();
        assert_eq!(tier.storage().unwrap().bytes(), 400);
        assert_eq!(tier.memory().unwrap().bytes(), 15);
        assert_eq!(largest.storage().unwrap().bytes(), 300);
        assert_eq!(largest.memory().unwrap().bytes(), 10);
        assert!(capacity.is_node_within_tier());
    }

    #[test]
    fn current_capacity_of_unserved_policy_is_none() {
        let snapshot = ClusterSnapshot::new(1, vec![node("n1", "hot", 1, 1)]);
        assert!(snapshot.current_capacity("cold").unwrap().is_empty());
    }

    #[test]
    fn snapshot_parses_from_json() {
        let json = r#"{
            "version": 3,
            "nodes": [
                {"node_id": "n1", "policies": ["hot"], "storage": 1024, "memory": 512}
            ]
        }"#;
        let snapshot: ClusterSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.version(), 3);
        assert_eq!(snapshot.nodes_for_policy("hot").count(), 1);
    }
}
