//! Eviction execution
//!
//! Carries a decision out against the cluster: one graceful delete per
//! decision, preceded by a controller-status corroboration for owned pods.
//! Failures here are local to the decision; the cycle carries on and the
//! pod is re-evaluated from scratch next cycle.

use crate::cluster::ClusterClient;
use crate::models::EvictionDecision;
use crate::observability::{GuardianMetrics, StructuredLogger};
use std::sync::Arc;
use tracing::debug;

/// Outcome of handing one decision to the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The graceful delete was issued
    Evicted,
    /// Dry-run mode: decision logged, nothing deleted
    DryRun,
    /// Corroboration or the delete itself declined the eviction
    Skipped,
    /// The delete request failed; not retried until next cycle
    Failed,
}

/// Issues graceful deletes for eviction decisions
pub struct EvictionExecutor {
    client: Arc<dyn ClusterClient>,
    metrics: GuardianMetrics,
    logger: StructuredLogger,
    dry_run: bool,
}

impl EvictionExecutor {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        metrics: GuardianMetrics,
        logger: StructuredLogger,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            metrics,
            logger,
            dry_run,
        }
    }

    /// Execute one decision. Never returns an error: every failure mode is
    /// recorded and absorbed so the rest of the cycle proceeds.
    pub async fn execute(&self, decision: &EvictionDecision) -> ExecutionOutcome {
        if decision.group.is_controller() {
            match self.client.controller_ready(&decision.group).await {
                Ok(Some(false)) => {
                    self.logger
                        .log_eviction_skipped(decision, "controller reports unready replicas");
                    return ExecutionOutcome::Skipped;
                }
                Ok(Some(true)) => {}
                Ok(None) => {
                    debug!(owner = %decision.group, "No controller status to corroborate, proceeding");
                }
                Err(err) => {
                    // Uncertain controller state: do not risk compounding an
                    // outage; the pod is re-evaluated next cycle.
                    self.logger
                        .log_eviction_skipped(decision, &format!("controller status unreadable: {err:#}"));
                    return ExecutionOutcome::Skipped;
                }
            }
        }

        if self.dry_run {
            self.logger.log_dry_run(decision);
            return ExecutionOutcome::DryRun;
        }

        match self
            .client
            .delete_pod(&decision.pod.namespace, &decision.pod.name)
            .await
        {
            Ok(()) => {
                self.metrics
                    .inc_evictions(&decision.pod.namespace, &decision.group.to_string());
                self.logger.log_eviction(decision);
                ExecutionOutcome::Evicted
            }
            Err(err) => {
                self.metrics.inc_eviction_failures(&decision.pod.namespace);
                self.logger.log_eviction_failed(decision, &format!("{err:#}"));
                ExecutionOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::async_trait;
    use crate::models::{GroupKey, PodIdentity, UsageIndex};
    use anyhow::{anyhow, Result};
    use chrono::Utc;
    use k8s_openapi::api::core::v1::Pod;
    use std::sync::Mutex;

    /// Scripted cluster for executor tests
    struct FakeCluster {
        controller_ready: Result<Option<bool>>,
        delete_fails: bool,
        deleted: Mutex<Vec<(String, String)>>,
    }

    impl FakeCluster {
        fn new(controller_ready: Result<Option<bool>>) -> Self {
            Self {
                controller_ready,
                delete_fails: false,
                deleted: Mutex::new(Vec::new()),
            }
        }

        fn deleted(&self) -> Vec<(String, String)> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClusterClient for FakeCluster {
        async fn list_pods(&self) -> Result<Vec<Pod>> {
            Ok(vec![])
        }

        async fn pod_usage(&self) -> Result<UsageIndex> {
            Ok(UsageIndex::new())
        }

        async fn controller_ready(&self, _owner: &GroupKey) -> Result<Option<bool>> {
            match &self.controller_ready {
                Ok(value) => Ok(*value),
                Err(err) => Err(anyhow!("{err}")),
            }
        }

        async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
            if self.delete_fails {
                return Err(anyhow!("forbidden"));
            }
            self.deleted
                .lock()
                .unwrap()
                .push((namespace.to_string(), name.to_string()));
            Ok(())
        }
    }

    fn decision(group: GroupKey) -> EvictionDecision {
        EvictionDecision {
            pod: PodIdentity {
                namespace: "default".to_string(),
                name: "web-1".to_string(),
                uid: "u1".to_string(),
            },
            container: "app".to_string(),
            usage_bytes: 10,
            threshold_bytes: 1,
            group,
            decided_at: Utc::now(),
        }
    }

    fn executor(cluster: Arc<FakeCluster>, dry_run: bool) -> EvictionExecutor {
        EvictionExecutor::new(
            cluster,
            GuardianMetrics::new(),
            StructuredLogger::new("test"),
            dry_run,
        )
    }

    #[tokio::test]
    async fn ready_controller_pod_is_deleted() {
        let cluster = Arc::new(FakeCluster::new(Ok(Some(true))));
        let outcome = executor(cluster.clone(), false)
            .execute(&decision(GroupKey::controller("ReplicaSet", "web", "default")))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Evicted);
        assert_eq!(cluster.deleted(), vec![("default".to_string(), "web-1".to_string())]);
    }

    #[tokio::test]
    async fn unready_controller_skips_the_delete() {
        let cluster = Arc::new(FakeCluster::new(Ok(Some(false))));
        let outcome = executor(cluster.clone(), false)
            .execute(&decision(GroupKey::controller("ReplicaSet", "web", "default")))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Skipped);
        assert!(cluster.deleted().is_empty());
    }

    #[tokio::test]
    async fn unreadable_controller_status_skips_conservatively() {
        let cluster = Arc::new(FakeCluster::new(Err(anyhow!("timeout"))));
        let outcome = executor(cluster.clone(), false)
            .execute(&decision(GroupKey::controller("ReplicaSet", "web", "default")))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Skipped);
        assert!(cluster.deleted().is_empty());
    }

    #[tokio::test]
    async fn vanished_controller_proceeds() {
        let cluster = Arc::new(FakeCluster::new(Ok(None)));
        let outcome = executor(cluster.clone(), false)
            .execute(&decision(GroupKey::controller("ReplicaSet", "web", "default")))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Evicted);
    }

    #[tokio::test]
    async fn singleton_pods_skip_corroboration() {
        // controller_ready would fail; singleton decisions must not consult it
        let cluster = Arc::new(FakeCluster::new(Err(anyhow!("must not be called"))));
        let pod = PodIdentity {
            namespace: "default".to_string(),
            name: "web-1".to_string(),
            uid: "u1".to_string(),
        };
        let outcome = executor(cluster.clone(), false)
            .execute(&decision(GroupKey::singleton(&pod)))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Evicted);
    }

    #[tokio::test]
    async fn dry_run_deletes_nothing() {
        let cluster = Arc::new(FakeCluster::new(Ok(Some(true))));
        let outcome = executor(cluster.clone(), true)
            .execute(&decision(GroupKey::controller("ReplicaSet", "web", "default")))
            .await;

        assert_eq!(outcome, ExecutionOutcome::DryRun);
        assert!(cluster.deleted().is_empty());
    }

    #[tokio::test]
    async fn delete_failure_is_absorbed() {
        let mut cluster = FakeCluster::new(Ok(Some(true)));
        cluster.delete_fails = true;
        let outcome = executor(Arc::new(cluster), false)
            .execute(&decision(GroupKey::controller("ReplicaSet", "web", "default")))
            .await;

        assert_eq!(outcome, ExecutionOutcome::Failed);
    }
}
