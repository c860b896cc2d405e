// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Asynchronous provisioning worker.
//!
//! Drives a store from `PROVISIONING` to a terminal state: install the
//! Helm release if absent, then poll the cluster until the workload is
//! ready, the setup job has succeeded, and the ingress has a hostname.
//! Tear-down runs the same way in reverse.
//!
//! Tasks are admitted FIFO through a semaphore with a configurable
//! ceiling; parallelism exists only across stores. Within one store every
//! Helm and probe call is sequential, and the store of record's
//! conditional status update is the serialization point: a task that reads
//! a record outside its expected precondition exits without effect.
//!
//! The worker is crash-safe by construction. It never holds state the
//! database does not: if the process dies mid-task the record stays
//! `PROVISIONING` or `DELETING` and recovery re-enqueues it on the next
//! start.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use storeplane_core::error::StoreError;
use storeplane_core::model::{StoreRecord, StoreStatus};
use storeplane_core::store::StoreStore;

use crate::config::Config;
use crate::helm::{HelmError, HelmExecutor, InstallRequest};
use crate::kube::{ClusterProbe, JobState};

/// How long shutdown waits for in-flight tasks before aborting them.
/// Aborting drops any running Helm child (spawned with `kill_on_drop`);
/// the records involved stay non-terminal and recovery resumes them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// A unit of work for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Full provisioning: preflight the release, install if absent, poll.
    Install {
        /// Target store.
        store_id: String,
    },
    /// Crash-recovery resume: the release is known to exist, so skip the
    /// install step and enter the readiness poll loop directly.
    Resume {
        /// Target store.
        store_id: String,
    },
    /// Tear-down: uninstall the release, delete the namespace, mark
    /// `DELETED`.
    Delete {
        /// Target store.
        store_id: String,
    },
}

impl Task {
    fn store_id(&self) -> &str {
        match self {
            Task::Install { store_id } | Task::Resume { store_id } | Task::Delete { store_id } => {
                store_id
            }
        }
    }
}

/// Worker tuning, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Ceiling on simultaneously running tasks.
    pub max_workers: usize,
    /// Cadence of the readiness poll loop.
    pub poll_interval: Duration,
    /// Overall timeout per task, measured from poll-loop entry (install)
    /// or task start (delete). Helm CLI time has its own budget.
    pub overall_timeout: Duration,
    /// Domain suffix for stores.
    pub base_domain: String,
    /// Serve store URLs as https.
    pub tls_enabled: bool,
}

impl From<&Config> for WorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_workers: config.provisioning_max_workers,
            poll_interval: config.provisioning_poll_interval,
            overall_timeout: config.provisioning_timeout,
            base_domain: config.base_domain.clone(),
            tls_enabled: config.tls_enabled,
        }
    }
}

/// Submission side of the worker queue. Cheap to clone; held by the API
/// layer and the recovery controller.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Task>,
}

impl WorkerHandle {
    /// Enqueue a task. Tasks submitted after shutdown are dropped; the
    /// record they point at stays non-terminal and recovery picks it up.
    pub fn submit(&self, task: Task) {
        let store_id = task.store_id().to_string();
        if self.tx.send(task).is_err() {
            warn!(store_id = %store_id, "worker queue closed, task dropped");
        }
    }
}

/// Bounded-concurrency executor for provisioning and tear-down tasks.
pub struct ProvisioningWorker {
    ctx: TaskContext,
    rx: mpsc::UnboundedReceiver<Task>,
    shutdown: watch::Receiver<bool>,
    max_workers: usize,
}

impl ProvisioningWorker {
    /// Create a worker and its submission handle. `shutdown` flips to
    /// `true` exactly once, on graceful shutdown.
    pub fn new(
        store: StoreStore,
        helm: Arc<dyn HelmExecutor>,
        probe: Arc<dyn ClusterProbe>,
        config: WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, WorkerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let max_workers = config.max_workers;
        let worker = Self {
            ctx: TaskContext { store, helm, probe, config, shutdown: shutdown.clone() },
            rx,
            shutdown,
            max_workers,
        };
        (worker, WorkerHandle { tx })
    }

    /// Run the dispatch loop until shutdown, then drain in-flight tasks.
    /// Running tasks observe the shutdown signal between polls, finish
    /// their current tick, and leave their record where it stands.
    pub async fn run(mut self) {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        info!(max_workers = self.max_workers, "provisioning worker started");

        if !*self.shutdown.borrow() {
            loop {
                tokio::select! {
                    biased;

                    changed = self.shutdown.changed() => {
                        if changed.is_err() || *self.shutdown.borrow() {
                            break;
                        }
                    }

                    maybe_task = self.rx.recv() => {
                        let Some(task) = maybe_task else { break };

                        // FIFO admission: wait for a pool slot, but stay
                        // responsive to shutdown while the pool is full.
                        let permit = tokio::select! {
                            biased;
                            _ = self.shutdown.changed() => None,
                            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                        };
                        let Some(permit) = permit else { break };

                        debug!(store_id = %task.store_id(), "dispatching task");
                        let ctx = self.ctx.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            ctx.run(task).await;
                        });
                    }

                    Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                }
            }
        }

        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("tasks still running after grace period, aborting them");
            tasks.shutdown().await;
        }
        info!("provisioning worker stopped");
    }
}

/// Everything one task needs; cloned into each spawned task.
#[derive(Clone)]
struct TaskContext {
    store: StoreStore,
    helm: Arc<dyn HelmExecutor>,
    probe: Arc<dyn ClusterProbe>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
}

/// Outcome of the readiness poll loop.
enum PollOutcome {
    Ready { url: String },
    Failed { reason: String },
    Interrupted,
}

/// Result of one readiness tick.
enum Tick {
    Ready(String),
    Failed(&'static str),
    Pending,
}

impl TaskContext {
    async fn run(&self, task: Task) {
        match task {
            Task::Install { store_id } => self.provision(&store_id, false).await,
            Task::Resume { store_id } => self.provision(&store_id, true).await,
            Task::Delete { store_id } => self.teardown(&store_id).await,
        }
    }

    /// Install task: read, preflight, install, poll, write back exactly
    /// one terminal transition.
    async fn provision(&self, store_id: &str, skip_install: bool) {
        let Some(record) = self.read_expecting(store_id, StoreStatus::Provisioning).await else {
            return;
        };

        if !skip_install && !self.ensure_installed(&record).await {
            return;
        }

        match self.poll_until_ready(&record).await {
            PollOutcome::Ready { url } => {
                match self
                    .store
                    .update_status(&record.id, StoreStatus::Ready, Some(&url), None)
                    .await
                {
                    Ok(_) => info!(store_id = %record.id, url = %url, "store ready"),
                    Err(e) => {
                        // Another actor won the record (e.g. it was deleted
                        // out from under us); their transition stands.
                        warn!(store_id = %record.id, error = %e, "could not mark store ready")
                    }
                }
            }
            PollOutcome::Failed { reason } => self.fail(&record.id, &reason).await,
            PollOutcome::Interrupted => {
                info!(store_id = %record.id, "shutdown during provisioning, store stays resumable")
            }
        }
    }

    /// Preflight + install. Returns false when the task is over (the
    /// failure has already been recorded).
    async fn ensure_installed(&self, record: &StoreRecord) -> bool {
        let exists = match self
            .helm
            .release_exists(&record.helm_release, &record.namespace)
            .await
        {
            Ok(exists) => exists,
            Err(err) => {
                self.fail(&record.id, &format!("Helm install failed: {err}")).await;
                return false;
            }
        };

        if exists {
            info!(store_id = %record.id, "release already exists, skipping install");
            return true;
        }

        if *self.shutdown.borrow() {
            // Do not start a Helm call we will not see through.
            info!(store_id = %record.id, "shutdown before install, store stays resumable");
            return false;
        }

        let request = self.install_request(record);
        match self.helm.install(&request).await {
            Ok(()) => true,
            // Lost the preflight race; the release is there, which is all
            // the install step wanted.
            Err(HelmError::AlreadyExists) => {
                info!(store_id = %record.id, "release appeared concurrently, continuing");
                true
            }
            Err(err) => {
                self.fail(&record.id, &format!("Helm install failed: {err}")).await;
                false
            }
        }
    }

    fn install_request(&self, record: &StoreRecord) -> InstallRequest {
        InstallRequest {
            release: record.helm_release.clone(),
            namespace: record.namespace.clone(),
            store_id: record.id.clone(),
            store_name: record.name.clone(),
            engine: record.engine,
            domain: format!("{}.{}", record.name, self.config.base_domain),
            admin_username: record.admin_username.clone(),
            admin_email: record.admin_email.clone(),
            admin_password: record.admin_password.clone(),
        }
    }

    /// Readiness poll loop. Transient probe errors are no-op ticks; the
    /// overall timeout starts here, after any Helm CLI time.
    async fn poll_until_ready(&self, record: &StoreRecord) -> PollOutcome {
        let job_name = format!("{}-{}-setup", record.id, record.engine);
        let deadline = Instant::now() + self.config.overall_timeout;
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                return PollOutcome::Interrupted;
            }

            match self
                .readiness_tick(&record.namespace, &record.helm_release, &job_name)
                .await
            {
                Tick::Ready(host) => {
                    let scheme = if self.config.tls_enabled { "https" } else { "http" };
                    return PollOutcome::Ready { url: format!("{scheme}://{host}") };
                }
                Tick::Failed(reason) => {
                    return PollOutcome::Failed { reason: reason.to_string() };
                }
                Tick::Pending => {}
            }

            if Instant::now() >= deadline {
                return PollOutcome::Failed { reason: "Provisioning timed out".to_string() };
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return PollOutcome::Interrupted;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// One tick: workload readiness, setup job, ingress. Failure
    /// conditions short-circuit; anything the cluster cannot answer right
    /// now just extends the poll.
    async fn readiness_tick(&self, namespace: &str, release: &str, job_name: &str) -> Tick {
        let pods = match self.probe.pods_ready(namespace, release).await {
            Ok(pods) => pods,
            Err(err) => {
                debug!(namespace = %namespace, error = %err, "probe unavailable, retrying next tick");
                return Tick::Pending;
            }
        };
        if pods.any_failed {
            return Tick::Failed("Pods not ready");
        }

        let job = match self.probe.job_status(namespace, job_name).await {
            Ok(job) => job,
            Err(_) => return Tick::Pending,
        };
        if job == JobState::Failed {
            return Tick::Failed("Setup job failed");
        }

        if !pods.all_ready() || job != JobState::Succeeded {
            return Tick::Pending;
        }

        match self.probe.ingress_host(namespace, release).await {
            Ok(Some(host)) if !host.is_empty() => Tick::Ready(host),
            Ok(_) => Tick::Pending,
            Err(_) => Tick::Pending,
        }
    }

    /// Delete task: uninstall (missing release is success), best-effort
    /// namespace delete, then `DELETING -> DELETED`. Never fails the
    /// store; a stubborn uninstall leaves the record `DELETING` for the
    /// next start to retry.
    async fn teardown(&self, store_id: &str) {
        let Some(record) = self.read_expecting(store_id, StoreStatus::Deleting).await else {
            return;
        };

        let deadline = Instant::now() + self.config.overall_timeout;
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                info!(store_id = %record.id, "shutdown during deletion, store stays DELETING");
                return;
            }

            match self.helm.uninstall(&record.helm_release, &record.namespace).await {
                Ok(()) => break,
                Err(err) => {
                    if Instant::now() >= deadline {
                        error!(
                            store_id = %record.id,
                            error = %err,
                            "uninstall still failing at deadline, record stays DELETING until next start"
                        );
                        return;
                    }
                    warn!(store_id = %record.id, error = %err, "uninstall failed, retrying");
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
            }
        }

        // Best-effort namespace cleanup; an absent namespace is fine.
        match self.probe.namespace_exists(&record.namespace).await {
            Ok(false) => {}
            Ok(true) => {
                if let Err(err) = self.probe.delete_namespace(&record.namespace).await {
                    warn!(
                        store_id = %record.id,
                        namespace = %record.namespace,
                        error = %err,
                        "namespace deletion failed, leaving it behind"
                    );
                }
            }
            Err(err) => {
                warn!(
                    store_id = %record.id,
                    namespace = %record.namespace,
                    error = %err,
                    "could not check namespace, skipping cleanup"
                );
            }
        }

        match self
            .store
            .update_status(&record.id, StoreStatus::Deleted, None, None)
            .await
        {
            Ok(_) => info!(store_id = %record.id, "store deleted"),
            Err(e) => error!(store_id = %record.id, error = %e, "could not mark store deleted"),
        }
    }

    /// Read the record and verify the task's precondition. Returns `None`
    /// (and logs) when the task should abandon.
    async fn read_expecting(&self, store_id: &str, expected: StoreStatus) -> Option<StoreRecord> {
        let record = match self.store.get(store_id).await {
            Ok(record) => record,
            Err(StoreError::NotFound { .. }) => {
                warn!(store_id = %store_id, "record vanished before the task ran");
                return None;
            }
            Err(e) => {
                error!(store_id = %store_id, error = %e, "could not read record");
                return None;
            }
        };

        if record.status != expected {
            debug!(
                store_id = %store_id,
                status = %record.status,
                expected = %expected,
                "abandoning task, another actor won"
            );
            return None;
        }
        Some(record)
    }

    async fn fail(&self, store_id: &str, reason: &str) {
        match self
            .store
            .update_status(store_id, StoreStatus::Failed, None, Some(reason))
            .await
        {
            Ok(_) => warn!(store_id = %store_id, reason = %reason, "store failed"),
            Err(e) => error!(store_id = %store_id, error = %e, "could not record failure"),
        }
    }
}
