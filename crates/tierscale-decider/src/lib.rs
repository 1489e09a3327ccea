//! tierscale-decider: pluggable capacity deciders.
//!
//! A decider turns a read-only [`ClusterSnapshot`] plus its own static
//! configuration into a [`DeciderResult`](tierscale_capacity::DeciderResult).
//! Decider kinds are registered by tag in a [`DeciderRegistry`] that is built
//! once at startup and never mutated afterwards.
//!
//! # Components
//!
//! - **`snapshot`**: the cluster view deciders read
//! - **`service`**: the decider contract and its type-erased form
//! - **`config`**: the persisted, kind-tagged decider configuration
//! - **`registry`**: kind tag to decider service table
//! - **`fixed`**: reference decider returning configured values

pub mod config;
pub mod error;
pub mod fixed;
pub mod registry;
pub mod service;
pub mod snapshot;

pub use config::DeciderConfiguration;
pub use error::DeciderError;
pub use fixed::{FixedDeciderConfiguration, FixedDeciderService, FixedReason};
pub use registry::{DeciderRegistry, DeciderRegistryBuilder};
pub use service::{Decider, DeciderContext, DeciderService};
pub use snapshot::{ClusterSnapshot, NodeResources};
