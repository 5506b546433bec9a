//! Cluster collaborator
//!
//! The engine talks to the cluster through the `ClusterClient` trait: list
//! pods, read per-container memory usage, corroborate controller status,
//! and issue graceful deletes. `KubeClusterClient` is the production
//! implementation; tests substitute their own.

use crate::models::{GroupKey, UsageIndex};
use crate::threshold;
use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Pod, ReplicationController};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams};
use kube::core::{ApiResource, GroupVersionKind};
use kube::{Client, Config};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Cluster operations the eviction engine depends on
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List pods in scope, with metadata, spec, and status
    async fn list_pods(&self) -> Result<Vec<Pod>>;

    /// Current memory usage per container per pod; pods or containers with
    /// no reported sample are simply absent from the index
    async fn pod_usage(&self) -> Result<UsageIndex>;

    /// Whether the owning controller reports all replicas ready.
    /// `None` means the controller cannot corroborate (unknown kind, or the
    /// object no longer exists).
    async fn controller_ready(&self, owner: &GroupKey) -> Result<Option<bool>>;

    /// Graceful pod deletion honoring the pod's termination grace period
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Connection settings for the Kubernetes implementation
#[derive(Debug, Clone, Default)]
pub struct ClusterSettings {
    /// Explicit kubeconfig path; inferred config when absent
    pub kubeconfig: Option<String>,
    /// Restrict listings to one namespace; cluster scope when absent
    pub namespace: Option<String>,
}

/// `ClusterClient` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    namespace: Option<String>,
}

impl KubeClusterClient {
    /// Connect using an explicit kubeconfig when given, otherwise inferred
    /// configuration (in-cluster service account or default kubeconfig).
    /// Failure here is fatal to startup.
    pub async fn connect(settings: ClusterSettings) -> Result<Self> {
        let client = match &settings.kubeconfig {
            Some(path) => {
                debug!(path = %path, "Using configuration from kubeconfig");
                let kubeconfig = kube::config::Kubeconfig::read_from(path)
                    .with_context(|| format!("reading kubeconfig {}", path))?;
                let config = Config::from_custom_kubeconfig(
                    kubeconfig,
                    &kube::config::KubeConfigOptions::default(),
                )
                .await
                .context("loading kubeconfig")?;
                Client::try_from(config).context("building Kubernetes client")?
            }
            None => Client::try_default()
                .await
                .context("inferring Kubernetes configuration")?,
        };

        Ok(Self {
            client,
            namespace: settings.namespace,
        })
    }

    fn pods(&self) -> Api<Pod> {
        match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    fn pod_metrics(&self) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "pods");
        match &self.namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_pods(&self) -> Result<Vec<Pod>> {
        let pods = self
            .pods()
            .list(&ListParams::default())
            .await
            .context("listing pods")?;
        Ok(pods.items)
    }

    async fn pod_usage(&self) -> Result<UsageIndex> {
        let metrics = self
            .pod_metrics()
            .list(&ListParams::default())
            .await
            .context("listing pod metrics")?;

        let mut index = UsageIndex::new();
        for item in &metrics.items {
            collect_usage(item, &mut index);
        }
        Ok(index)
    }

    async fn controller_ready(&self, owner: &GroupKey) -> Result<Option<bool>> {
        debug!(owner = %owner, namespace = %owner.namespace, "Reading controller status");
        let client = self.client.clone();
        let namespace = owner.namespace.as_str();
        let name = owner.name.as_str();

        let result = match owner.kind.to_ascii_lowercase().as_str() {
            "deployment" => Api::<Deployment>::namespaced(client, namespace)
                .get(name)
                .await
                .map(|deployment| {
                    deployment
                        .status
                        .map(|status| replicas_ready(status.ready_replicas, status.replicas))
                }),
            "statefulset" => Api::<StatefulSet>::namespaced(client, namespace)
                .get(name)
                .await
                .map(|set| {
                    set.status
                        .map(|status| replicas_ready(status.ready_replicas, Some(status.replicas)))
                }),
            "replicaset" => Api::<ReplicaSet>::namespaced(client, namespace)
                .get(name)
                .await
                .map(|set| {
                    set.status
                        .map(|status| replicas_ready(status.ready_replicas, Some(status.replicas)))
                }),
            "replicationcontroller" => Api::<ReplicationController>::namespaced(client, namespace)
                .get(name)
                .await
                .map(|rc| {
                    rc.status
                        .map(|status| replicas_ready(status.ready_replicas, Some(status.replicas)))
                }),
            "daemonset" => Api::<DaemonSet>::namespaced(client, namespace)
                .get(name)
                .await
                .map(|set| {
                    set.status.map(|status| {
                        replicas_ready(Some(status.number_ready), Some(status.desired_number_scheduled))
                    })
                }),
            _ => return Ok(None),
        };

        match result {
            // Missing status means the controller has not reported yet;
            // treat it as unready siblings.
            Ok(ready) => Ok(Some(ready.unwrap_or(false))),
            // A vanished controller has nothing left to corroborate.
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {} status", owner)),
        }
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let _ = api
            .delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("deleting pod {}/{}", namespace, name))?;
        Ok(())
    }
}

fn replicas_ready(ready: Option<i32>, desired: Option<i32>) -> bool {
    match desired {
        Some(desired) => ready.unwrap_or(0) >= desired,
        // Unpopulated desired count cannot corroborate readiness
        None => false,
    }
}

#[derive(Debug, Deserialize)]
struct MetricsContainer {
    name: String,
    #[serde(default)]
    usage: HashMap<String, String>,
}

/// Fold one PodMetrics object into the usage index. Containers whose usage
/// quantity cannot be parsed are logged and left unknown.
fn collect_usage(item: &DynamicObject, index: &mut UsageIndex) {
    let (Some(namespace), Some(pod)) = (item.metadata.namespace.clone(), item.metadata.name.clone())
    else {
        return;
    };

    let containers: Vec<MetricsContainer> = match item.data.get("containers") {
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(containers) => containers,
            Err(err) => {
                warn!(pod = %pod, namespace = %namespace, error = %err, "Ignoring malformed pod metrics");
                return;
            }
        },
        None => return,
    };

    for container in containers {
        let Some(memory) = container.usage.get("memory") else {
            continue;
        };
        match threshold::parse_quantity(memory) {
            Ok(bytes) => index.insert(&namespace, &pod, &container.name, bytes),
            Err(err) => {
                warn!(
                    pod = %pod,
                    namespace = %namespace,
                    container = %container.name,
                    error = %err,
                    "Ignoring unparseable memory usage sample"
                );
            }
        }
    }
}
