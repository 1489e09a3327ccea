//! Random fixture generators for tests.
//!
//! Generated capacities always honour the node/tier coupling: a node
//! dimension is only drawn when the tier carries the same dimension.

use std::collections::BTreeMap;

use rand::Rng;

use crate::capacity::{AutoscalingCapacity, AutoscalingResources};
use crate::quantity::ResourceQuantity;
use crate::result::{AutoscalingDeciderResults, DeciderReason, DeciderResult};

/// A random quantity, kept far below the ceiling so sums never overflow.
pub fn random_quantity<R: Rng>(rng: &mut R) -> ResourceQuantity {
    ResourceQuantity::from_bytes(rng.gen_range(0..=(i64::MAX as u64 >> 16)))
        .unwrap_or(ResourceQuantity::ZERO)
}

pub fn random_nullable_quantity<R: Rng>(rng: &mut R) -> Option<ResourceQuantity> {
    rng.gen_bool(0.5).then(|| random_quantity(rng))
}

/// Random resources restricted to the allowed dimensions; at least one
/// allowed dimension is always drawn.
pub fn random_resources_within<R: Rng>(
    rng: &mut R,
    allow_storage: bool,
    allow_memory: bool,
) -> AutoscalingResources {
    assert!(allow_storage || allow_memory);
    let add_storage = (allow_storage && rng.gen_bool(0.5)) || !allow_memory;
    let add_memory = (allow_memory && rng.gen_bool(0.5)) || !add_storage;
    let storage = add_storage.then(|| random_quantity(rng));
    let memory = add_memory.then(|| random_quantity(rng));
    match AutoscalingResources::from_parts(storage, memory) {
        Some(resources) => resources,
        None => unreachable!("at least one dimension is drawn"),
    }
}

pub fn random_capacity<R: Rng>(rng: &mut R) -> AutoscalingCapacity {
    let tier = random_resources_within(rng, true, true);
    let node = rng.gen_bool(0.5).then(|| {
        random_resources_within(rng, tier.storage().is_some(), tier.memory().is_some())
    });
    match AutoscalingCapacity::new(Some(tier), node) {
        Ok(capacity) => capacity,
        Err(e) => unreachable!("generated capacity violates coupling: {e}"),
    }
}

pub fn random_nullable_capacity<R: Rng>(rng: &mut R) -> AutoscalingCapacity {
    if rng.gen_bool(0.5) {
        random_capacity(rng)
    } else {
        AutoscalingCapacity::NONE
    }
}

pub fn random_reason<R: Rng>(rng: &mut R) -> DeciderReason {
    let storage = random_nullable_quantity(rng).map(ResourceQuantity::bytes);
    let memory = random_nullable_quantity(rng).map(ResourceQuantity::bytes);
    let nodes = rng.gen_range(0..1000u32);
    DeciderReason::new(format!(
        "fixed storage [{storage:?}], memory [{memory:?}], nodes [{nodes}]"
    ))
    .with_detail("storage", storage)
    .with_detail("memory", memory)
    .with_detail("nodes", nodes)
}

pub fn random_decider_result<R: Rng>(rng: &mut R) -> DeciderResult {
    let capacity = random_nullable_capacity(rng);
    DeciderResult::new(capacity, random_reason(rng))
}

/// Between 1 and 10 results keyed `"0"`, `"1"`, ...
pub fn random_decider_results<R: Rng>(rng: &mut R) -> AutoscalingDeciderResults {
    let results: BTreeMap<String, DeciderResult> = (0..rng.gen_range(1..=10))
        .map(|i: u32| (i.to_string(), random_decider_result(rng)))
        .collect();
    match AutoscalingDeciderResults::new(results) {
        Ok(results) => results,
        Err(e) => unreachable!("generated names are never empty: {e}"),
    }
}
