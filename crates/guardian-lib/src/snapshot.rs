//! Snapshot construction
//!
//! Turns the raw pod listing and the usage lookup into the per-cycle
//! `PodSnapshot` view: resolved thresholds, sampled usage, readiness, and
//! owning-controller identity. A malformed annotation is confined to the
//! entry that carries it; the rest of the pod and every other pod are
//! evaluated normally.

use crate::models::{
    ContainerSample, GroupKey, MemoryThreshold, PodIdentity, PodSnapshot, UsageIndex,
};
use crate::threshold;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, warn};

/// Wildcard annotation key; the per-container form appends `/<container>`
pub const MEMORY_LIMIT_ANNOTATION: &str = "memguardian.limit.memory";

/// Snapshots for one cycle plus build-time observations
#[derive(Debug, Default)]
pub struct SnapshotSet {
    pub pods: Vec<PodSnapshot>,
    pub parse_failures: u64,
}

/// Build the ordered snapshot collection for this cycle.
///
/// Pods with no usable metadata are skipped with a warning; pods absent from
/// the usage index are included with all samples unknown so they are never
/// treated as violations by omission.
pub fn build(pods: &[Pod], usage: &UsageIndex) -> SnapshotSet {
    let mut set = SnapshotSet::default();

    for pod in pods {
        match build_one(pod, usage, &mut set.parse_failures) {
            Some(snapshot) => set.pods.push(snapshot),
            None => warn!("Skipping pod with incomplete metadata"),
        }
    }

    set
}

fn build_one(pod: &Pod, usage: &UsageIndex, parse_failures: &mut u64) -> Option<PodSnapshot> {
    let metadata = &pod.metadata;
    let identity = PodIdentity {
        namespace: metadata.namespace.clone()?,
        name: metadata.name.clone()?,
        uid: metadata.uid.clone().unwrap_or_default(),
    };

    let thresholds = resolve_thresholds(pod, &identity, parse_failures);

    let containers = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .map(|container| ContainerSample {
                    name: container.name.clone(),
                    usage: usage.container_usage(&identity.namespace, &identity.name, &container.name),
                    threshold: thresholds.resolve(&container.name),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(PodSnapshot {
        group: group_key(pod, &identity),
        ready: pod_ready(pod),
        created_at: metadata.creation_timestamp.as_ref().map(|time| time.0),
        identity,
        containers,
    })
}

/// Collect wildcard and per-container threshold annotations for one pod.
///
/// Each value runs through the quantity parser; a malformed value is logged,
/// counted, and treated as absent for that entry only.
fn resolve_thresholds(pod: &Pod, identity: &PodIdentity, parse_failures: &mut u64) -> MemoryThreshold {
    let mut thresholds = MemoryThreshold::default();

    let Some(annotations) = pod.metadata.annotations.as_ref() else {
        return thresholds;
    };

    for (key, value) in annotations {
        let container = if key == MEMORY_LIMIT_ANNOTATION {
            None
        } else if let Some(name) = key
            .strip_prefix(MEMORY_LIMIT_ANNOTATION)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            Some(name)
        } else {
            continue;
        };

        match threshold::parse_quantity(value) {
            Ok(bytes) => {
                debug!(pod = %identity, annotation = %key, bytes, "Found memory limit");
                match container {
                    Some(name) => {
                        thresholds.per_container.insert(name.to_string(), bytes);
                    }
                    None => thresholds.wildcard = Some(bytes),
                }
            }
            Err(err) => {
                *parse_failures += 1;
                warn!(pod = %identity, annotation = %key, error = %err, "Ignoring malformed memory limit annotation");
            }
        }
    }

    thresholds
}

/// Readiness is the AND of all container ready conditions; a pod with no
/// status reported yet is not ready.
fn pod_ready(pod: &Pod) -> bool {
    let spec_containers = pod
        .spec
        .as_ref()
        .map(|spec| spec.containers.len())
        .unwrap_or(0);

    let Some(statuses) = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
    else {
        return false;
    };

    statuses.len() >= spec_containers
        && !statuses.is_empty()
        && statuses.iter().all(|status| status.ready)
}

/// The first owner reference with `controller: true` defines the group key;
/// without one the pod is its own singleton group.
fn group_key(pod: &Pod, identity: &PodIdentity) -> GroupKey {
    pod.metadata
        .owner_references
        .as_ref()
        .and_then(|owners| {
            owners
                .iter()
                .find(|owner| owner.controller.unwrap_or(false))
        })
        .map(|owner| GroupKey::controller(&owner.kind, &owner.name, &identity.namespace))
        .unwrap_or_else(|| GroupKey::singleton(identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod_from(value: serde_json::Value) -> Pod {
        serde_json::from_value(value).expect("valid pod fixture")
    }

    fn ready_status(containers: &[&str]) -> serde_json::Value {
        json!({
            "containerStatuses": containers
                .iter()
                .map(|name| json!({"name": name, "ready": true, "restartCount": 0, "image": "", "imageID": ""}))
                .collect::<Vec<_>>()
        })
    }

    #[test]
    fn wildcard_threshold_applies_to_every_container() {
        let pod = pod_from(json!({
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "uid": "u1",
                "annotations": {"memguardian.limit.memory": "1000k"}
            },
            "spec": {"containers": [{"name": "app"}, {"name": "sidecar"}]},
            "status": ready_status(&["app", "sidecar"]),
        }));

        let set = build(&[pod], &UsageIndex::new());
        assert_eq!(set.parse_failures, 0);

        let snapshot = &set.pods[0];
        assert_eq!(snapshot.containers.len(), 2);
        assert!(snapshot
            .containers
            .iter()
            .all(|sample| sample.threshold == Some(1_000_000)));
    }

    #[test]
    fn container_annotation_overrides_wildcard() {
        let pod = pod_from(json!({
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "uid": "u1",
                "annotations": {
                    "memguardian.limit.memory": "1000k",
                    "memguardian.limit.memory/nginx": "3Mi"
                }
            },
            "spec": {"containers": [{"name": "nginx"}, {"name": "sidecar"}]},
            "status": ready_status(&["nginx", "sidecar"]),
        }));

        let set = build(&[pod], &UsageIndex::new());
        let by_name = |name: &str| {
            set.pods[0]
                .containers
                .iter()
                .find(|sample| sample.name == name)
                .unwrap()
                .threshold
        };

        assert_eq!(by_name("nginx"), Some(3_145_728));
        assert_eq!(by_name("sidecar"), Some(1_000_000));
    }

    #[test]
    fn malformed_annotation_is_isolated() {
        let bad = pod_from(json!({
            "metadata": {
                "name": "broken",
                "namespace": "default",
                "uid": "u1",
                "annotations": {"memguardian.limit.memory": "abc"}
            },
            "spec": {"containers": [{"name": "app"}]},
            "status": ready_status(&["app"]),
        }));
        let good = pod_from(json!({
            "metadata": {
                "name": "healthy",
                "namespace": "default",
                "uid": "u2",
                "annotations": {"memguardian.limit.memory": "1Mi"}
            },
            "spec": {"containers": [{"name": "app"}]},
            "status": ready_status(&["app"]),
        }));

        let set = build(&[bad, good], &UsageIndex::new());

        assert_eq!(set.parse_failures, 1);
        assert_eq!(set.pods.len(), 2);
        assert_eq!(set.pods[0].containers[0].threshold, None);
        assert_eq!(set.pods[1].containers[0].threshold, Some(1_048_576));
    }

    #[test]
    fn pod_without_metrics_has_unknown_usage() {
        let pod = pod_from(json!({
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "uid": "u1",
                "annotations": {"memguardian.limit.memory": "1Mi"}
            },
            "spec": {"containers": [{"name": "app"}]},
            "status": ready_status(&["app"]),
        }));

        let set = build(&[pod], &UsageIndex::new());
        let sample = &set.pods[0].containers[0];

        assert_eq!(sample.usage, None);
        assert!(!sample.is_violation());
    }

    #[test]
    fn usage_is_paired_per_container() {
        let pod = pod_from(json!({
            "metadata": {"name": "web-1", "namespace": "default", "uid": "u1"},
            "spec": {"containers": [{"name": "app"}, {"name": "sidecar"}]},
            "status": ready_status(&["app", "sidecar"]),
        }));

        let mut usage = UsageIndex::new();
        usage.insert("default", "web-1", "app", 42);

        let set = build(&[pod], &usage);
        assert_eq!(set.pods[0].containers[0].usage, Some(42));
        assert_eq!(set.pods[0].containers[1].usage, None);
    }

    #[test]
    fn pod_without_status_is_not_ready() {
        let pod = pod_from(json!({
            "metadata": {"name": "init", "namespace": "default", "uid": "u1"},
            "spec": {"containers": [{"name": "app"}]},
        }));

        let set = build(&[pod], &UsageIndex::new());
        assert!(!set.pods[0].ready);
    }

    #[test]
    fn pod_with_unready_container_is_not_ready() {
        let pod = pod_from(json!({
            "metadata": {"name": "web-1", "namespace": "default", "uid": "u1"},
            "spec": {"containers": [{"name": "app"}, {"name": "sidecar"}]},
            "status": {
                "containerStatuses": [
                    {"name": "app", "ready": true, "restartCount": 0, "image": "", "imageID": ""},
                    {"name": "sidecar", "ready": false, "restartCount": 0, "image": "", "imageID": ""}
                ]
            },
        }));

        let set = build(&[pod], &UsageIndex::new());
        assert!(!set.pods[0].ready);
    }

    #[test]
    fn pod_missing_a_container_status_is_not_ready() {
        let pod = pod_from(json!({
            "metadata": {"name": "web-1", "namespace": "default", "uid": "u1"},
            "spec": {"containers": [{"name": "app"}, {"name": "sidecar"}]},
            "status": ready_status(&["app"]),
        }));

        let set = build(&[pod], &UsageIndex::new());
        assert!(!set.pods[0].ready);
    }

    #[test]
    fn controller_owner_defines_group_key() {
        let pod = pod_from(json!({
            "metadata": {
                "name": "web-1-abc",
                "namespace": "default",
                "uid": "u1",
                "ownerReferences": [
                    {"apiVersion": "v1", "kind": "Service", "name": "web", "uid": "s1"},
                    {"apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "web-1", "uid": "r1", "controller": true}
                ]
            },
            "spec": {"containers": [{"name": "app"}]},
            "status": ready_status(&["app"]),
        }));

        let set = build(&[pod], &UsageIndex::new());
        let key = &set.pods[0].group;

        assert_eq!(key.kind, "ReplicaSet");
        assert_eq!(key.name, "web-1");
        assert_eq!(key.namespace, "default");
        assert!(key.is_controller());
    }

    #[test]
    fn ownerless_pod_is_its_own_singleton_group() {
        let pod = pod_from(json!({
            "metadata": {"name": "lonely", "namespace": "default", "uid": "u1"},
            "spec": {"containers": [{"name": "app"}]},
            "status": ready_status(&["app"]),
        }));

        let set = build(&[pod], &UsageIndex::new());
        let key = &set.pods[0].group;

        assert_eq!(key.kind, "Pod");
        assert_eq!(key.name, "lonely");
    }

    #[test]
    fn creation_timestamp_is_carried() {
        let pod = pod_from(json!({
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "uid": "u1",
                "creationTimestamp": "2024-05-01T12:00:00Z"
            },
            "spec": {"containers": [{"name": "app"}]},
            "status": ready_status(&["app"]),
        }));

        let set = build(&[pod], &UsageIndex::new());
        assert!(set.pods[0].created_at.is_some());
    }
}
