//! Evaluation engine
//!
//! One cycle flows one way: raw cluster state → snapshots → controller
//! groups → eviction decisions → executed deletes. Nothing is cached
//! between cycles; every cycle refetches the full pod and metrics listings
//! and recomputes from scratch. That full refetch is the accepted
//! scalability limit of the design.

mod r#loop;


pub use r#loop::{EvaluationLoop, LoopConfig};

use crate::cluster::ClusterClient;
use crate::executor::{EvictionExecutor, ExecutionOutcome};
use crate::grouper;
use crate::observability::{GuardianMetrics, StructuredLogger};
use crate::selector;
use crate::snapshot;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// What one evaluation cycle saw and did
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CycleStats {
    pub pods_evaluated: u64,
    pub groups: u64,
    pub eligible_groups: u64,
    pub violations: u64,
    pub decisions: u64,
    pub evictions: u64,
    pub parse_failures: u64,
}

/// Runs evaluation cycles against a cluster
pub struct GuardianEngine {
    client: Arc<dyn ClusterClient>,
    executor: EvictionExecutor,
    metrics: GuardianMetrics,
}

impl GuardianEngine {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        metrics: GuardianMetrics,
        logger: StructuredLogger,
        dry_run: bool,
    ) -> Self {
        let executor = EvictionExecutor::new(client.clone(), metrics.clone(), logger, dry_run);
        Self {
            client,
            executor,
            metrics,
        }
    }

    /// Run one full evaluation cycle.
    ///
    /// A failed pod or metrics listing aborts the cycle with context and no
    /// decision is acted on; per-decision failures are absorbed downstream.
    pub async fn run_cycle(&self) -> Result<CycleStats> {
        let pods = self.client.list_pods().await.context("fetching pod listing")?;
        let usage = self.client.pod_usage().await.context("fetching usage samples")?;

        let snapshot_set = snapshot::build(&pods, &usage);
        let violations = selector::count_violations(&snapshot_set.pods);

        let mut stats = CycleStats {
            pods_evaluated: snapshot_set.pods.len() as u64,
            violations,
            parse_failures: snapshot_set.parse_failures,
            ..CycleStats::default()
        };

        self.metrics.add_pods_evaluated(stats.pods_evaluated);
        self.metrics.add_violations(violations);
        self.metrics.add_parse_failures(snapshot_set.parse_failures);
        for (namespace, count) in configured_limits(&snapshot_set.pods) {
            self.metrics.set_config_limits(&namespace, count as f64);
        }

        let groups = grouper::group(snapshot_set.pods);
        stats.groups = groups.len() as u64;
        stats.eligible_groups = groups.iter().filter(|group| group.is_eligible()).count() as u64;

        let decisions = selector::select(&groups);
        stats.decisions = decisions.len() as u64;

        for decision in &decisions {
            if self.executor.execute(decision).await == ExecutionOutcome::Evicted {
                stats.evictions += 1;
            }
        }

        Ok(stats)
    }
}

/// Containers carrying a configured threshold, per namespace
fn configured_limits(snapshots: &[crate::models::PodSnapshot]) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for snapshot in snapshots {
        let configured = snapshot
            .containers
            .iter()
            .filter(|sample| sample.threshold.is_some())
            .count() as u64;
        if configured > 0 {
            *counts.entry(snapshot.identity.namespace.clone()).or_default() += configured;
        }
    }
    counts
}
