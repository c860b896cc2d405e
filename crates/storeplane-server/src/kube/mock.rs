// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock cluster probe for testing.
//!
//! Starts with nothing ready (the state of a namespace right after `helm
//! install` returns) and lets tests flip readiness, failures, or transient
//! outages at any point.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ClusterProbe, JobState, PodReadiness, ProbeError, Result};

/// Mock cluster probe.
pub struct MockProbe {
    pods: Mutex<PodReadiness>,
    job: Mutex<JobState>,
    ingress: Mutex<Option<String>>,
    transient: AtomicBool,
    namespace_exists: AtomicBool,
    pods_calls: AtomicUsize,
    deleted_namespaces: Mutex<Vec<String>>,
}

impl Default for MockProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProbe {
    /// A probe where nothing is ready yet.
    pub fn new() -> Self {
        Self {
            pods: Mutex::new(PodReadiness::default()),
            job: Mutex::new(JobState::Pending),
            ingress: Mutex::new(None),
            transient: AtomicBool::new(false),
            namespace_exists: AtomicBool::new(true),
            pods_calls: AtomicUsize::new(0),
            deleted_namespaces: Mutex::new(Vec::new()),
        }
    }

    /// A probe where the store converges immediately: pods ready, setup
    /// job succeeded, ingress assigned.
    pub fn ready(host: &str) -> Self {
        let probe = Self::new();
        *probe.pods.try_lock().expect("unshared") =
            PodReadiness { ready: 2, total: 2, any_failed: false };
        *probe.job.try_lock().expect("unshared") = JobState::Succeeded;
        *probe.ingress.try_lock().expect("unshared") = Some(host.to_string());
        probe
    }

    /// Flip the cluster to fully ready mid-test.
    pub async fn make_ready(&self, host: &str) {
        *self.pods.lock().await = PodReadiness { ready: 2, total: 2, any_failed: false };
        *self.job.lock().await = JobState::Succeeded;
        *self.ingress.lock().await = Some(host.to_string());
    }

    pub async fn set_pods(&self, readiness: PodReadiness) {
        *self.pods.lock().await = readiness;
    }

    pub async fn set_job(&self, state: JobState) {
        *self.job.lock().await = state;
    }

    pub async fn set_ingress(&self, host: Option<&str>) {
        *self.ingress.lock().await = host.map(str::to_string);
    }

    /// Make every probe call fail as transient.
    pub fn set_transient(&self, transient: bool) {
        self.transient.store(transient, Ordering::SeqCst);
    }

    pub fn pods_calls(&self) -> usize {
        self.pods_calls.load(Ordering::SeqCst)
    }

    pub async fn deleted_namespaces(&self) -> Vec<String> {
        self.deleted_namespaces.lock().await.clone()
    }

    fn check_transient(&self) -> Result<()> {
        if self.transient.load(Ordering::SeqCst) {
            Err(ProbeError::Transient("mock cluster outage".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClusterProbe for MockProbe {
    async fn pods_ready(&self, _namespace: &str, _release: &str) -> Result<PodReadiness> {
        self.pods_calls.fetch_add(1, Ordering::SeqCst);
        self.check_transient()?;
        Ok(*self.pods.lock().await)
    }

    async fn job_status(&self, _namespace: &str, _job_name: &str) -> Result<JobState> {
        self.check_transient()?;
        Ok(*self.job.lock().await)
    }

    async fn ingress_host(&self, _namespace: &str, _release: &str) -> Result<Option<String>> {
        self.check_transient()?;
        Ok(self.ingress.lock().await.clone())
    }

    async fn namespace_exists(&self, _namespace: &str) -> Result<bool> {
        self.check_transient()?;
        Ok(self.namespace_exists.load(Ordering::SeqCst))
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.check_transient()?;
        self.deleted_namespaces.lock().await.push(namespace.to_string());
        self.namespace_exists.store(false, Ordering::SeqCst);
        Ok(())
    }
}
