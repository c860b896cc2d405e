// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock Helm executor for testing.
//!
//! Records every call and lets tests script outcomes without a cluster or
//! the `helm` binary. Tracks installed releases by name so preflight
//! checks behave like the real CLI: a release exists after a successful
//! install and stops existing after uninstall.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{HelmError, HelmExecutor, InstallRequest, Result};

/// Scripted result of an install call.
#[derive(Debug, Clone)]
pub enum InstallOutcome {
    Succeed,
    AlreadyExists,
    ChartNotFound(String),
    Timeout,
    Fail(String),
}

/// Mock Helm executor.
pub struct MockHelm {
    releases: Mutex<HashSet<String>>,
    /// Pretend every release exists, installed or not (crash recovery
    /// against a cluster that already has the release).
    force_exists: AtomicBool,
    exists_error: AtomicBool,
    install_outcome: Mutex<InstallOutcome>,
    uninstall_error: Mutex<Option<String>>,
    install_delay: Mutex<Duration>,
    installs: Mutex<Vec<InstallRequest>>,
    uninstalls: Mutex<Vec<(String, String)>>,
    exists_calls: AtomicUsize,
    active_installs: AtomicUsize,
    peak_installs: AtomicUsize,
}

impl Default for MockHelm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHelm {
    /// A mock where installs succeed and no release exists yet.
    pub fn new() -> Self {
        Self {
            releases: Mutex::new(HashSet::new()),
            force_exists: AtomicBool::new(false),
            exists_error: AtomicBool::new(false),
            install_outcome: Mutex::new(InstallOutcome::Succeed),
            uninstall_error: Mutex::new(None),
            install_delay: Mutex::new(Duration::ZERO),
            installs: Mutex::new(Vec::new()),
            uninstalls: Mutex::new(Vec::new()),
            exists_calls: AtomicUsize::new(0),
            active_installs: AtomicUsize::new(0),
            peak_installs: AtomicUsize::new(0),
        }
    }

    /// A mock whose installs fail with the given stderr.
    pub fn failing(stderr: &str) -> Self {
        let mock = Self::new();
        *mock.install_outcome.try_lock().expect("unshared") = InstallOutcome::Fail(stderr.into());
        mock
    }

    pub async fn set_install_outcome(&self, outcome: InstallOutcome) {
        *self.install_outcome.lock().await = outcome;
    }

    /// Pretend releases already exist in the cluster regardless of what
    /// was installed through this mock.
    pub fn set_release_exists(&self, exists: bool) {
        self.force_exists.store(exists, Ordering::SeqCst);
    }

    /// Make `release_exists` fail, as when the CLI or cluster is down.
    pub fn set_exists_error(&self, error: bool) {
        self.exists_error.store(error, Ordering::SeqCst);
    }

    /// Delay each install; lets tests observe concurrent installs.
    pub async fn set_install_delay(&self, delay: Duration) {
        *self.install_delay.lock().await = delay;
    }

    pub async fn fail_uninstalls(&self, stderr: &str) {
        *self.uninstall_error.lock().await = Some(stderr.to_string());
    }

    pub async fn succeed_uninstalls(&self) {
        *self.uninstall_error.lock().await = None;
    }

    pub async fn install_count(&self) -> usize {
        self.installs.lock().await.len()
    }

    pub async fn installs(&self) -> Vec<InstallRequest> {
        self.installs.lock().await.clone()
    }

    pub async fn uninstalls(&self) -> Vec<(String, String)> {
        self.uninstalls.lock().await.clone()
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    /// Highest number of installs that were in flight at the same time.
    pub fn peak_concurrent_installs(&self) -> usize {
        self.peak_installs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HelmExecutor for MockHelm {
    async fn install(&self, request: &InstallRequest) -> Result<()> {
        let active = self.active_installs.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_installs.fetch_max(active, Ordering::SeqCst);

        let delay = *self.install_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.installs.lock().await.push(request.clone());
        let outcome = self.install_outcome.lock().await.clone();
        self.active_installs.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            InstallOutcome::Succeed => {
                self.releases.lock().await.insert(request.release.clone());
                Ok(())
            }
            InstallOutcome::AlreadyExists => Err(HelmError::AlreadyExists),
            InstallOutcome::ChartNotFound(msg) => Err(HelmError::ChartNotFound(msg)),
            InstallOutcome::Timeout => Err(HelmError::Timeout),
            InstallOutcome::Fail(stderr) => Err(HelmError::Failed { stderr }),
        }
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()> {
        self.uninstalls
            .lock()
            .await
            .push((release.to_string(), namespace.to_string()));

        match self.uninstall_error.lock().await.clone() {
            Some(stderr) => Err(HelmError::Failed { stderr }),
            None => {
                self.releases.lock().await.remove(release);
                Ok(())
            }
        }
    }

    async fn release_exists(&self, release: &str, _namespace: &str) -> Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.exists_error.load(Ordering::SeqCst) {
            return Err(HelmError::Failed { stderr: "Kubernetes cluster unreachable".into() });
        }
        if self.force_exists.load(Ordering::SeqCst) {
            return Ok(true);
        }
        Ok(self.releases.lock().await.contains(release))
    }
}
