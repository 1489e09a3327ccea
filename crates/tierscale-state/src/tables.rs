//! redb table definitions for the metadata store.
//!
//! Both tables hold a single row under [`METADATA_KEY`]; they are always
//! written together in one transaction.

use redb::TableDefinition;

/// JSON-encoded `AutoscalingMetadata`.
pub const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("autoscaling_metadata");

/// Publish counter of the metadata row.
pub const VERSIONS: TableDefinition<&str, u64> = TableDefinition::new("autoscaling_versions");

pub const METADATA_KEY: &str = "autoscaling";
