// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read-only cluster probe interface.
//!
//! The probe never creates or mutates workloads - that is Helm's job. The
//! one write it owns is namespace deletion during tear-down, which runs
//! best-effort after `helm uninstall`.
//!
//! Cluster errors are classified as [`ProbeError::Transient`] rather than
//! terminal: a flaky API server must extend the readiness poll, never fail
//! a store.

pub mod client;
pub mod mock;

pub use client::KubeProbe;
pub use mock::MockProbe;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from probe operations. Always retryable within the caller's
/// timeout budget; a definitive negative answer (404) is a value, not an
/// error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProbeError {
    /// The cluster API could not answer right now.
    #[error("transient cluster error: {0}")]
    Transient(String),
}

/// Result type for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Aggregate pod readiness for one release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodReadiness {
    /// Pods whose containers are all ready.
    pub ready: usize,
    /// Pods counted (completed job pods excluded).
    pub total: usize,
    /// A pod is in a terminal-failure state: phase `Failed`, an image pull
    /// error, or `CrashLoopBackOff` past the restart threshold.
    pub any_failed: bool,
}

impl PodReadiness {
    /// Workload readiness predicate: at least one pod, all pods ready,
    /// none failed.
    pub fn all_ready(&self) -> bool {
        self.total >= 1 && self.ready == self.total && !self.any_failed
    }
}

/// Observed state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// The job does not exist yet or has not started. Absence is treated
    /// as pending, not as an error: the chart may not have created it yet.
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Trait for read-only cluster probes.
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    /// Readiness of the pods labelled with the given release.
    async fn pods_ready(&self, namespace: &str, release: &str) -> Result<PodReadiness>;

    /// State of a named job in the namespace.
    async fn job_status(&self, namespace: &str, job_name: &str) -> Result<JobState>;

    /// Hostname of the release's ingress, once assigned.
    async fn ingress_host(&self, namespace: &str, release: &str) -> Result<Option<String>>;

    /// Whether the namespace exists.
    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    /// Delete the namespace. A namespace that is already gone is success.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;
}
