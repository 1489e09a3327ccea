//! tierscale-state: persisted autoscaling metadata.
//!
//! Holds the policy model ([`AutoscalingPolicy`]), the per-policy cache of
//! the last evaluation ([`AutoscalingPolicyMetadata`]) and the cluster-wide
//! value replicated as a whole ([`AutoscalingMetadata`]).
//!
//! # Persisted shape
//!
//! ```text
//! { "policies": {
//!     "<policy>": {
//!       "deciders": { "<decider>": { "kind": "fixed", ...settings } },
//!       "lastResults": { "requiredCapacity": {...}, "perDecider": {...} }
//! } } }
//! ```
//!
//! # Store
//!
//! [`MetadataStore`] keeps the latest published metadata in
//! [redb](https://docs.rs/redb) together with a version counter. Publishing
//! is compare-and-swap on that version inside a single write transaction:
//! a proposal is either applied whole or rejected whole.

pub mod error;
pub mod metadata;
pub mod policy;
pub mod store;
pub mod tables;
mod unique;

pub use error::{StateError, StateResult};
pub use metadata::{AutoscalingMetadata, AutoscalingPolicyMetadata, MetadataDiff};
pub use policy::AutoscalingPolicy;
pub use store::{MetadataStore, VersionedMetadata};
