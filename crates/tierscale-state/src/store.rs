//! MetadataStore: redb-backed persistence of autoscaling metadata.
//!
//! The store holds one JSON-encoded [`AutoscalingMetadata`] value and a
//! version counter. Every write goes through a version check inside a
//! single redb write transaction, so concurrent writers behave like
//! compare-and-swap: one wins, the others see [`StateError::VersionConflict`]
//! and nothing of their proposal is applied.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::metadata::AutoscalingMetadata;
use crate::policy::AutoscalingPolicy;
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Metadata together with the version it was published at.
///
/// Version `0` means nothing has been published yet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionedMetadata {
    pub version: u64,
    pub metadata: AutoscalingMetadata,
}

/// Thread-safe metadata store backed by redb.
#[derive(Clone)]
pub struct MetadataStore {
    db: Arc<Database>,
}

impl MetadataStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "metadata store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory metadata store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(METADATA).map_err(map_err!(Table))?;
        txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read the latest published metadata and its version.
    pub fn load(&self) -> StateResult<VersionedMetadata> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let versions = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        let version = versions
            .get(METADATA_KEY)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0);

        let table = txn.open_table(METADATA).map_err(map_err!(Table))?;
        let metadata = match table.get(METADATA_KEY).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            None => AutoscalingMetadata::empty(),
        };
        Ok(VersionedMetadata { version, metadata })
    }

    /// Replace the stored metadata if its version is still `expected_version`.
    ///
    /// Returns the new version. On a version mismatch nothing is written.
    pub fn publish(&self, expected_version: u64, metadata: &AutoscalingMetadata) -> StateResult<u64> {
        let value = serde_json::to_vec(metadata).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let version = match write_if_current(&txn, expected_version, &value) {
            Ok(version) => version,
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                return Err(e);
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(version, bytes = value.len(), "autoscaling metadata published");
        Ok(version)
    }

    /// Atomically derive and publish new metadata from the current value.
    ///
    /// `f` runs against the stored value inside the write transaction, so no
    /// other writer can interleave between the read and the write.
    pub fn update<F>(&self, f: F) -> StateResult<VersionedMetadata>
    where
        F: FnOnce(&AutoscalingMetadata) -> StateResult<AutoscalingMetadata>,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = read_in_txn(&txn).and_then(|(version, current)| {
            let next = f(&current)?;
            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            let version = write_if_current(&txn, version, &value)?;
            Ok(VersionedMetadata {
                version,
                metadata: next,
            })
        });
        match outcome {
            Ok(published) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(version = published.version, "autoscaling metadata updated");
                Ok(published)
            }
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                Err(e)
            }
        }
    }

    // ── Policies ───────────────────────────────────────────────────

    /// Insert or replace a policy.
    pub fn put_policy(&self, policy: AutoscalingPolicy) -> StateResult<VersionedMetadata> {
        let name = policy.name().to_string();
        let published = self.update(|current| Ok(current.put_policy(policy)))?;
        debug!(policy = %name, version = published.version, "policy stored");
        Ok(published)
    }

    /// Delete a policy by name.
    pub fn delete_policy(&self, name: &str) -> StateResult<VersionedMetadata> {
        let published = self.update(|current| {
            current
                .remove_policy(name)
                .ok_or_else(|| StateError::NotFound(format!("policy [{name}]")))
        })?;
        debug!(policy = %name, version = published.version, "policy deleted");
        Ok(published)
    }
}

fn read_in_txn(txn: &WriteTransaction) -> StateResult<(u64, AutoscalingMetadata)> {
    let versions = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
    let version = versions
        .get(METADATA_KEY)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let table = txn.open_table(METADATA).map_err(map_err!(Table))?;
    let metadata = match table.get(METADATA_KEY).map_err(map_err!(Read))? {
        Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
        None => AutoscalingMetadata::empty(),
    };
    Ok((version, metadata))
}

/// Check the stored version and, if it matches, write `value` and bump it.
fn write_if_current(txn: &WriteTransaction, expected: u64, value: &[u8]) -> StateResult<u64> {
    let mut versions = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
    let actual = versions
        .get(METADATA_KEY)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    if actual != expected {
        return Err(StateError::VersionConflict { expected, actual });
    }
    let next = actual + 1;
    versions.insert(METADATA_KEY, next).map_err(map_err!(Write))?;

    let mut table = txn.open_table(METADATA).map_err(map_err!(Table))?;
    table.insert(METADATA_KEY, value).map_err(map_err!(Write))?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tierscale_capacity::{AutoscalingDeciderResults, DeciderReason, DeciderResult};
    use tierscale_decider::{DeciderConfiguration, FixedDeciderConfiguration, FixedDeciderService};

    use super::*;

    fn test_policy(name: &str) -> AutoscalingPolicy {
        let config = FixedDeciderConfiguration::new(None, None, Some(1));
        let fixed = DeciderConfiguration::from_config(&FixedDeciderService, &config).unwrap();
        AutoscalingPolicy::from_deciders(name, [("fixed".to_string(), fixed)]).unwrap()
    }

    fn abstaining_results() -> AutoscalingDeciderResults {
        let result = DeciderResult::abstain(DeciderReason::new("no opinion"));
        AutoscalingDeciderResults::new(BTreeMap::from([("fixed".to_string(), result)])).unwrap()
    }

    #[test]
    fn empty_store_loads_version_zero() {
        let store = MetadataStore::open_in_memory().unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, 0);
        assert!(loaded.metadata.policies().is_empty());
    }

    #[test]
    fn publish_bumps_version() {
        let store = MetadataStore::open_in_memory().unwrap();
        let metadata = AutoscalingMetadata::empty().put_policy(test_policy("hot"));

        assert_eq!(store.publish(0, &metadata).unwrap(), 1);
        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.metadata, metadata);
    }

    #[test]
    fn stale_publish_leaves_stored_metadata_unchanged() {
        let store = MetadataStore::open_in_memory().unwrap();
        let first = AutoscalingMetadata::empty()
            .put_policy(test_policy("hot"))
            .put_policy(test_policy("warm"));
        store.publish(0, &first).unwrap();

        // A proposal computed against version 0 carries results for both
        // policies; it must not land at all.
        let stale = first
            .with_results(BTreeMap::from([
                ("hot".to_string(), abstaining_results()),
                ("warm".to_string(), abstaining_results()),
            ]))
            .unwrap();
        let err = store.publish(0, &stale).unwrap_err();
        assert!(matches!(err, StateError::VersionConflict { expected: 0, actual: 1 }));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.metadata, first);
        assert!(loaded.metadata.policies().values().all(|m| m.last_results().is_none()));
    }

    #[test]
    fn put_and_delete_policy() {
        let store = MetadataStore::open_in_memory().unwrap();
        let published = store.put_policy(test_policy("hot")).unwrap();
        assert_eq!(published.version, 1);
        assert!(published.metadata.policy("hot").is_some());

        let published = store.delete_policy("hot").unwrap();
        assert_eq!(published.version, 2);
        assert!(store.load().unwrap().metadata.policies().is_empty());
    }

    #[test]
    fn delete_missing_policy_does_not_bump_version() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.put_policy(test_policy("hot")).unwrap();

        assert!(matches!(store.delete_policy("nope"), Err(StateError::NotFound(_))));
        assert_eq!(store.load().unwrap().version, 1);
    }

    #[test]
    fn policy_mutation_invalidates_concurrent_publish() {
        let store = MetadataStore::open_in_memory().unwrap();
        store.put_policy(test_policy("hot")).unwrap();
        let seen = store.load().unwrap();

        store.put_policy(test_policy("warm")).unwrap();

        let proposal = seen
            .metadata
            .with_results(BTreeMap::from([("hot".to_string(), abstaining_results())]))
            .unwrap();
        assert!(store.publish(seen.version, &proposal).is_err());
        assert!(store.load().unwrap().metadata.policy("warm").is_some());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("autoscaling.redb");

        {
            let store = MetadataStore::open(&db_path).unwrap();
            store.put_policy(test_policy("hot")).unwrap();
        }

        // Reopen the same database file.
        let store = MetadataStore::open(&db_path).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.version, 1);
        assert!(loaded.metadata.policy("hot").is_some());
    }
}
