//! Core data models for the eviction engine
//!
//! Everything here is rebuilt from scratch each evaluation cycle; no value
//! in this module outlives the cycle that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of a pod as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodIdentity {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Tagged identity of the controller that owns a pod.
///
/// Ownerless pods form singleton groups keyed by their own identity with
/// kind `Pod`. Grouping never branches on the kind; only the executor's
/// controller-status corroboration interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl GroupKey {
    pub fn controller(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn singleton(pod: &PodIdentity) -> Self {
        Self {
            kind: "Pod".to_string(),
            name: pod.name.clone(),
            namespace: pod.namespace.clone(),
        }
    }

    /// Whether this key names a managing controller rather than a lone pod
    pub fn is_controller(&self) -> bool {
        self.kind != "Pod"
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Per-pod memory thresholds resolved from annotations.
///
/// An exact container-name entry always wins over the wildcard entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryThreshold {
    pub wildcard: Option<u64>,
    pub per_container: HashMap<String, u64>,
}

impl MemoryThreshold {
    /// Effective threshold for a container, or None when no entry applies
    pub fn resolve(&self, container: &str) -> Option<u64> {
        self.per_container
            .get(container)
            .copied()
            .or(self.wildcard)
    }

    pub fn is_empty(&self) -> bool {
        self.wildcard.is_none() && self.per_container.is_empty()
    }
}

/// One container's sampled usage paired with its effective threshold.
///
/// `usage: None` means the metrics source had no sample for this container;
/// unknown usage is never a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSample {
    pub name: String,
    pub usage: Option<u64>,
    pub threshold: Option<u64>,
}

impl ContainerSample {
    pub fn is_violation(&self) -> bool {
        matches!((self.usage, self.threshold), (Some(usage), Some(threshold)) if usage > threshold)
    }
}

/// Immutable per-cycle view of one pod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub identity: PodIdentity,
    pub group: GroupKey,
    /// True only if every container reports Ready
    pub ready: bool,
    /// Samples in pod-spec order
    pub containers: Vec<ContainerSample>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Pods partitioned under one owning controller (or a lone pod)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerGroup {
    pub key: GroupKey,
    pub members: Vec<PodSnapshot>,
}

impl ControllerGroup {
    /// A group may only lose a pod when every member is ready
    pub fn is_eligible(&self) -> bool {
        self.members.iter().all(|member| member.ready)
    }
}

/// The single eviction chosen for a group this cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionDecision {
    pub pod: PodIdentity,
    pub container: String,
    pub usage_bytes: u64,
    pub threshold_bytes: u64,
    pub group: GroupKey,
    pub decided_at: DateTime<Utc>,
}

/// Memory usage lookup handed to the snapshot builder.
///
/// Absence at any level means "unknown", never zero.
#[derive(Debug, Clone, Default)]
pub struct UsageIndex {
    by_pod: HashMap<(String, String), HashMap<String, u64>>,
}

impl UsageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
        bytes: u64,
    ) {
        self.by_pod
            .entry((namespace.into(), pod.into()))
            .or_default()
            .insert(container.into(), bytes);
    }

    pub fn container_usage(&self, namespace: &str, pod: &str, container: &str) -> Option<u64> {
        self.by_pod
            .get(&(namespace.to_string(), pod.to_string()))
            .and_then(|containers| containers.get(container))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.by_pod.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pod.is_empty()
    }
}
