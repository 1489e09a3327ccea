//! AutoscalingEngine: drives evaluation cycles and owns the publish step.
//!
//! Reads the latest published metadata from the store, evaluates every
//! policy against the triggering snapshot, and publishes the result with a
//! version check. The engine also exposes the administrative mutations and
//! the read-only status view.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use tierscale_decider::{ClusterSnapshot, DeciderRegistry};
use tierscale_state::{
    AutoscalingMetadata, AutoscalingPolicy, MetadataStore, StateError, VersionedMetadata,
};

use crate::config::{DeciderSpec, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::evaluator::DeciderEvaluator;
use crate::report::{CapacityReport, StatusReport};

/// Where the engine is within an evaluation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Evaluating,
    Published,
}

/// Notification that cluster state changed.
#[derive(Debug, Clone)]
pub struct ClusterStateChange {
    pub snapshot: Arc<ClusterSnapshot>,
    /// Metadata as the orchestrator last saw it, if it has seen any.
    ///
    /// Diagnostic only: the engine logs how the stored metadata differs from
    /// this view. Evaluation always reads the store.
    pub previous: Option<AutoscalingMetadata>,
}

impl ClusterStateChange {
    pub fn new(snapshot: ClusterSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            previous: None,
        }
    }

    pub fn with_previous(mut self, previous: AutoscalingMetadata) -> Self {
        self.previous = Some(previous);
        self
    }
}

/// A successfully published cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Metadata version written by this cycle.
    pub version: u64,
    /// Cluster-state version the results were computed from.
    pub snapshot_version: u64,
    pub metadata: AutoscalingMetadata,
}

/// The autoscaling capacity engine.
pub struct AutoscalingEngine {
    store: MetadataStore,
    evaluator: DeciderEvaluator,
    phase: watch::Sender<CyclePhase>,
    /// Highest snapshot version any trigger has carried. Held across the
    /// final staleness check and the publish so the two are one step.
    latest_snapshot: Mutex<u64>,
}

impl AutoscalingEngine {
    pub fn new(store: MetadataStore, registry: Arc<DeciderRegistry>, config: &EngineConfig) -> Self {
        let evaluator = DeciderEvaluator::new(
            registry,
            config.max_concurrent_deciders,
            config.decider_timeout(),
        );
        let (phase, _) = watch::channel(CyclePhase::Idle);
        Self {
            store,
            evaluator,
            phase,
            latest_snapshot: Mutex::new(0),
        }
    }

    /// Validate `config`, then open the on-disk store under its data dir.
    pub fn open(config: &EngineConfig, registry: Arc<DeciderRegistry>) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            EngineError::Config(format!("data dir {}: {e}", config.data_dir.display()))
        })?;
        let store = MetadataStore::open(&config.db_path())?;
        info!(path = ?config.db_path(), kinds = ?registry.kinds().collect::<Vec<_>>(), "autoscaling engine opened");
        Ok(Self::new(store, registry, config))
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions.
    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    /// Run one evaluation cycle for a cluster-state change.
    ///
    /// Either every policy's new results are published together, or none
    /// are. A rejected publish leaves the stored metadata untouched and the
    /// engine back in [`CyclePhase::Idle`].
    pub async fn on_cluster_state_change(
        &self,
        change: ClusterStateChange,
    ) -> EngineResult<CycleOutcome> {
        let snapshot_version = change.snapshot.version();
        {
            let mut latest = self.latest_snapshot();
            if snapshot_version < *latest {
                return Err(EngineError::StaleSnapshot {
                    snapshot: snapshot_version,
                    latest: *latest,
                });
            }
            *latest = snapshot_version;
        }

        self.phase.send_replace(CyclePhase::Evaluating);
        let outcome = self.evaluate_and_publish(&change).await;
        let next = if outcome.is_ok() {
            CyclePhase::Published
        } else {
            CyclePhase::Idle
        };
        self.phase.send_replace(next);
        outcome
    }

    async fn evaluate_and_publish(&self, change: &ClusterStateChange) -> EngineResult<CycleOutcome> {
        let snapshot_version = change.snapshot.version();
        let current = self.store.load()?;

        if let Some(previous) = &change.previous {
            let diff = current.metadata.diff(previous);
            if !diff.is_empty() {
                debug!(
                    upserted = ?diff.upserted().collect::<Vec<_>>(),
                    removed = ?diff.removed().collect::<Vec<_>>(),
                    "metadata changed since the trigger's view"
                );
            }
        }

        debug!(
            snapshot_version,
            metadata_version = current.version,
            policies = current.metadata.policies().len(),
            "evaluating autoscaling policies"
        );

        let policies = current.metadata.policies().values().map(|m| m.policy());
        let results = self.evaluator.evaluate_all(policies, &change.snapshot).await;
        let staged = current.metadata.with_results(results)?;

        // A newer trigger must either see this publish when it loads, or
        // make this cycle stale before it publishes.
        let latest = self.latest_snapshot();
        if *latest > snapshot_version {
            info!(snapshot_version, latest = *latest, "discarding results of a superseded snapshot");
            return Err(EngineError::StaleSnapshot {
                snapshot: snapshot_version,
                latest: *latest,
            });
        }

        let published = self.store.publish(current.version, &staged);
        drop(latest);
        let version = match published {
            Ok(version) => version,
            Err(StateError::VersionConflict { expected, actual }) => {
                warn!(expected, actual, "autoscaling metadata changed during evaluation, discarding results");
                return Err(EngineError::PublishConflict { expected, actual });
            }
            Err(e) => return Err(e.into()),
        };

        info!(version, snapshot_version, "autoscaling results published");
        Ok(CycleOutcome {
            version,
            snapshot_version,
            metadata: staged,
        })
    }

    fn latest_snapshot(&self) -> MutexGuard<'_, u64> {
        self.latest_snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Administrative mutations ───────────────────────────────────

    /// Create or replace a policy after validating every decider through
    /// the registry.
    pub fn put_policy(
        &self,
        name: &str,
        deciders: BTreeMap<String, DeciderSpec>,
    ) -> EngineResult<VersionedMetadata> {
        let registry = self.evaluator.registry();
        let mut configs = BTreeMap::new();
        for (decider, spec) in deciders {
            let config = registry.configuration(&spec.kind, spec.settings)?;
            configs.insert(decider, config);
        }
        let policy = AutoscalingPolicy::new(name, configs)?;
        let published = self.store.put_policy(policy)?;
        info!(policy = %name, version = published.version, "autoscaling policy stored");
        Ok(published)
    }

    pub fn delete_policy(&self, name: &str) -> EngineResult<VersionedMetadata> {
        let published = self.store.delete_policy(name)?;
        info!(policy = %name, version = published.version, "autoscaling policy deleted");
        Ok(published)
    }

    // ── Reporting ──────────────────────────────────────────────────

    /// The last published metadata. Never triggers an evaluation.
    pub fn published(&self) -> EngineResult<VersionedMetadata> {
        Ok(self.store.load()?)
    }

    pub fn status(&self) -> EngineResult<StatusReport> {
        Ok(StatusReport::from(&self.store.load()?))
    }

    pub fn policy_status(&self, name: &str) -> EngineResult<CapacityReport> {
        let published = self.store.load()?;
        let metadata = published
            .metadata
            .policy(name)
            .ok_or_else(|| StateError::NotFound(format!("policy [{name}]")))?;
        Ok(CapacityReport::from(metadata))
    }

    // ── Run loop ───────────────────────────────────────────────────

    /// Evaluate on every change published to `changes` until shutdown.
    ///
    /// If a newer change arrives while a cycle is evaluating, the in-flight
    /// cycle is dropped and evaluation restarts with the newer snapshot.
    pub async fn run(
        &self,
        mut changes: watch::Receiver<Option<ClusterStateChange>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("autoscaling engine started");

        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        info!("trigger channel closed");
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaling engine shutting down");
                    break;
                }
            }

            // Keep evaluating the newest change until a cycle completes
            // without being superseded.
            loop {
                let Some(change) = changes.borrow_and_update().clone() else {
                    break;
                };
                tokio::select! {
                    outcome = self.on_cluster_state_change(change) => {
                        match outcome {
                            Ok(outcome) => debug!(version = outcome.version, "cycle complete"),
                            Err(e @ (EngineError::PublishConflict { .. } | EngineError::StaleSnapshot { .. })) => {
                                warn!(error = %e, "cycle discarded, waiting for the next trigger");
                            }
                            Err(e) => error!(error = %e, "autoscaling evaluation failed"),
                        }
                        break;
                    }
                    changed = changes.changed() => {
                        self.phase.send_replace(CyclePhase::Idle);
                        if changed.is_err() {
                            info!("trigger channel closed");
                            return;
                        }
                        debug!("newer cluster state arrived, restarting evaluation");
                    }
                    _ = shutdown.changed() => {
                        self.phase.send_replace(CyclePhase::Idle);
                        info!("autoscaling engine shutting down");
                        return;
                    }
                }
            }
        }
    }
}
