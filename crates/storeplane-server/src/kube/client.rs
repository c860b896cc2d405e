// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster probe backed by the Kubernetes API.
//!
//! Pods, the setup job, and the ingress are located through the standard
//! Helm release label (`app.kubernetes.io/instance`). 404 answers are
//! values ("not there yet"); every other API failure is transient.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::api::networking::v1::Ingress;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams};
use tracing::debug;

use super::{ClusterProbe, JobState, PodReadiness, ProbeError, Result};

/// Restarts before a `CrashLoopBackOff` container counts as failed.
const CRASHLOOP_RESTART_THRESHOLD: i32 = 3;

/// Probe backed by a real cluster connection.
#[derive(Clone)]
pub struct KubeProbe {
    client: Client,
}

impl KubeProbe {
    /// Build a probe from the inferred kube configuration (in-cluster, or
    /// the kubeconfig named by `KUBECONFIG`, or the platform default).
    pub async fn from_env() -> std::result::Result<Self, kube::Error> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Build a probe from an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn release_selector(release: &str) -> String {
        format!("app.kubernetes.io/instance={release}")
    }
}

#[async_trait]
impl ClusterProbe for KubeProbe {
    async fn pods_ready(&self, namespace: &str, release: &str) -> Result<PodReadiness> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&Self::release_selector(release));

        let list = match pods.list(&params).await {
            Ok(list) => list,
            Err(e) if is_not_found(&e) => return Ok(PodReadiness::default()),
            Err(e) => return Err(transient(e)),
        };

        let mut readiness = PodReadiness::default();
        for pod in list.items {
            let status = pod.status.unwrap_or_default();
            let phase = status.phase.as_deref().unwrap_or("Unknown");

            // Completed job pods stay around as Succeeded; they are not
            // workloads and must not block (or count toward) readiness.
            if phase == "Succeeded" {
                continue;
            }

            readiness.total += 1;
            if phase == "Failed" {
                readiness.any_failed = true;
                continue;
            }

            let containers = status.container_statuses.unwrap_or_default();
            if !containers.is_empty() && containers.iter().all(|c| c.ready) {
                readiness.ready += 1;
            }

            for container in &containers {
                let Some(waiting) = container.state.as_ref().and_then(|s| s.waiting.as_ref())
                else {
                    continue;
                };
                match waiting.reason.as_deref() {
                    Some("ImagePullBackOff") | Some("ErrImagePull") => {
                        readiness.any_failed = true;
                    }
                    Some("CrashLoopBackOff")
                        if container.restart_count >= CRASHLOOP_RESTART_THRESHOLD =>
                    {
                        readiness.any_failed = true;
                    }
                    _ => {}
                }
            }
        }

        debug!(
            namespace = %namespace,
            ready = readiness.ready,
            total = readiness.total,
            any_failed = readiness.any_failed,
            "pod readiness"
        );
        Ok(readiness)
    }

    async fn job_status(&self, namespace: &str, job_name: &str) -> Result<JobState> {
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);

        let job = match jobs.get_opt(job_name).await {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(JobState::Pending),
            Err(e) => return Err(transient(e)),
        };

        let status = job.status.unwrap_or_default();
        if status.succeeded.unwrap_or(0) > 0 {
            return Ok(JobState::Succeeded);
        }
        let failed = status
            .conditions
            .unwrap_or_default()
            .iter()
            .any(|c| c.type_ == "Failed" && c.status == "True");
        if failed {
            return Ok(JobState::Failed);
        }
        if status.active.unwrap_or(0) > 0 {
            return Ok(JobState::Running);
        }
        Ok(JobState::Pending)
    }

    async fn ingress_host(&self, namespace: &str, release: &str) -> Result<Option<String>> {
        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&Self::release_selector(release));

        let list = match ingresses.list(&params).await {
            Ok(list) => list,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(transient(e)),
        };

        let host = list
            .items
            .into_iter()
            .filter_map(|ingress| ingress.spec)
            .filter_map(|spec| spec.rules)
            .flatten()
            .find_map(|rule| rule.host);
        Ok(host.filter(|h| !h.is_empty()))
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match namespaces.get_opt(namespace).await {
            Ok(found) => Ok(found.is_some()),
            Err(e) => Err(transient(e)),
        }
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match namespaces.delete(namespace, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(transient(e)),
        }
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

fn transient(err: kube::Error) -> ProbeError {
    ProbeError::Transient(err.to_string())
}
