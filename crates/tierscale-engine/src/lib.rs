//! tierscale-engine: capacity evaluation cycles.
//!
//! On every cluster-state change the engine evaluates each policy's
//! deciders against the new snapshot, aggregates their opinions, and
//! publishes the updated metadata as one versioned write.
//!
//! # Evaluation cycle
//!
//! ```text
//! Idle ──trigger──▶ Evaluating ──publish ok──▶ Published
//!                       │
//!                       ├─ publish rejected (stale version) ─▶ Idle
//!                       └─ newer snapshot arrived ───────────▶ Idle
//!
//! Evaluating:
//!     (version, metadata) = store.load()
//!     for policy in metadata:               (all deciders run concurrently)
//!         deciders = registry.resolve(policy.deciders)
//!             unknown kind / bad settings -> policy degraded, others proceed
//!         results  = evaluate each decider with a timeout
//!             panic / timeout -> abstain with a fault reason
//!         required = fold(combine, results)
//!     store.publish(version, metadata.with_results(all))
//! ```
//!
//! Cached results are never read back as evaluation input.

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod report;

pub use config::{DeciderSpec, EngineConfig, PolicyFile};
pub use engine::{AutoscalingEngine, ClusterStateChange, CycleOutcome, CyclePhase};
pub use error::{EngineError, EngineResult};
pub use evaluator::DeciderEvaluator;
pub use report::{CapacityReport, StatusReport};
