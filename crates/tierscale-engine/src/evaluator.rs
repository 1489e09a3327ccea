//! Concurrent decider evaluation for a set of policies.
//!
//! Every decider runs on tokio's blocking pool against a shared
//! `Arc<ClusterSnapshot>`, bounded by a semaphore and a per-decider
//! timeout. Faults never escape: a panicking or slow decider is recorded as
//! an abstention whose reason names the fault.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tracing::{debug, warn};

use tierscale_capacity::{AutoscalingDeciderResults, DeciderReason, DeciderResult};
use tierscale_decider::{ClusterSnapshot, Decider, DeciderContext, DeciderRegistry};
use tierscale_state::AutoscalingPolicy;

type EvaluationHandle = JoinHandle<Result<Result<DeciderResult, tokio::task::JoinError>, Elapsed>>;

/// Deciders of one policy, either running or already settled.
enum PendingPolicy {
    Degraded(AutoscalingDeciderResults),
    Running(Vec<(String, EvaluationHandle)>),
}

/// Evaluates policies' deciders concurrently.
#[derive(Clone)]
pub struct DeciderEvaluator {
    registry: Arc<DeciderRegistry>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl DeciderEvaluator {
    pub fn new(registry: Arc<DeciderRegistry>, max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<DeciderRegistry> {
        &self.registry
    }

    /// Evaluate a single policy.
    pub async fn evaluate_policy(
        &self,
        policy: &AutoscalingPolicy,
        snapshot: &Arc<ClusterSnapshot>,
    ) -> AutoscalingDeciderResults {
        let pending = self.spawn_policy(policy, snapshot);
        collect(policy.name(), pending).await
    }

    /// Evaluate many policies; deciders of all policies run concurrently.
    pub async fn evaluate_all<'a>(
        &self,
        policies: impl IntoIterator<Item = &'a AutoscalingPolicy>,
        snapshot: &Arc<ClusterSnapshot>,
    ) -> BTreeMap<String, AutoscalingDeciderResults> {
        let pending: Vec<(String, PendingPolicy)> = policies
            .into_iter()
            .map(|policy| (policy.name().to_string(), self.spawn_policy(policy, snapshot)))
            .collect();

        let mut results = BTreeMap::new();
        for (name, pending) in pending {
            let policy_results = collect(&name, pending).await;
            results.insert(name, policy_results);
        }
        results
    }

    fn spawn_policy(&self, policy: &AutoscalingPolicy, snapshot: &Arc<ClusterSnapshot>) -> PendingPolicy {
        // Resolve everything first so a policy is either fully evaluated or
        // skipped as a whole.
        let mut bound = Vec::with_capacity(policy.deciders().len());
        for (name, config) in policy.deciders() {
            match self.registry.resolve(config) {
                Ok(decider) => bound.push((name.clone(), decider)),
                Err(e) => {
                    warn!(
                        policy = %policy.name(),
                        decider = %name,
                        kind = %config.kind(),
                        error = %e,
                        "cannot resolve decider, skipping policy"
                    );
                    let note = format!("decider [{name}]: {e}");
                    return PendingPolicy::Degraded(AutoscalingDeciderResults::degraded(note));
                }
            }
        }

        let handles = bound
            .into_iter()
            .map(|(name, decider)| {
                let handle = self.spawn_decider(policy.name(), &name, decider, snapshot);
                (name, handle)
            })
            .collect();
        PendingPolicy::Running(handles)
    }

    fn spawn_decider(
        &self,
        policy_name: &str,
        decider_name: &str,
        decider: Arc<dyn Decider>,
        snapshot: &Arc<ClusterSnapshot>,
    ) -> EvaluationHandle {
        let permits = Arc::clone(&self.permits);
        let snapshot = Arc::clone(snapshot);
        let policy_name = policy_name.to_string();
        let decider_name = decider_name.to_string();
        let timeout = self.timeout;

        tokio::spawn(async move {
            // The permit is released on timeout even if the blocking call
            // itself keeps running.
            let _permit = permits.acquire_owned().await.ok();
            let blocking = tokio::task::spawn_blocking(move || {
                let ctx = DeciderContext {
                    policy_name: &policy_name,
                    decider_name: &decider_name,
                    snapshot: &snapshot,
                };
                decider.evaluate(&ctx)
            });
            tokio::time::timeout(timeout, blocking).await
        })
    }
}

async fn collect(policy: &str, pending: PendingPolicy) -> AutoscalingDeciderResults {
    let handles = match pending {
        PendingPolicy::Degraded(results) => return results,
        PendingPolicy::Running(handles) => handles,
    };

    let mut results = BTreeMap::new();
    for (name, handle) in handles {
        let result = match handle.await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) if e.is_panic() => fault(policy, &name, "panicked"),
            Ok(Ok(Err(_))) => fault(policy, &name, "was cancelled"),
            Ok(Err(_)) => fault(policy, &name, "timed out"),
            Err(e) => fault(policy, &name, &format!("could not be scheduled: {e}")),
        };
        if !result.capacity().is_node_within_tier() {
            warn!(
                %policy,
                decider = %name,
                capacity = %result.capacity(),
                "decider reported node capacity above tier capacity"
            );
        }
        debug!(%policy, decider = %name, capacity = %result.capacity(), "decider evaluated");
        results.insert(name, result);
    }

    match AutoscalingDeciderResults::new(results) {
        Ok(results) => results,
        // Decider names come from a validated policy and are never empty.
        Err(e) => AutoscalingDeciderResults::degraded(e.to_string()),
    }
}

fn fault(policy: &str, decider: &str, what: &str) -> DeciderResult {
    warn!(%policy, %decider, fault = %what, "decider evaluation failed, treating as abstention");
    DeciderResult::abstain(
        DeciderReason::new(format!("decider evaluation {what}; no capacity opinion"))
            .with_detail("fault", what),
    )
}
