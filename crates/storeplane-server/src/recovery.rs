// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Startup reconciliation of persisted intent against cluster reality.
//!
//! After a crash or restart, every non-terminal record still owes work:
//! a `PROVISIONING` store either resumes readiness checks (its release
//! already exists) or restarts the install from scratch, and a `DELETING`
//! store gets its tear-down re-enqueued. This is the sole mechanism that
//! makes provisioning idempotent across process restarts.
//!
//! A cluster that cannot be reached is not a store-level failure: the scan
//! defers and retries instead of marking anything `FAILED`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use storeplane_core::model::StoreStatus;
use storeplane_core::store::StoreStore;

use crate::helm::HelmExecutor;
use crate::worker::{Task, WorkerHandle};

/// What one recovery pass enqueued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// PROVISIONING stores whose release exists: readiness checks resume.
    pub resumed: usize,
    /// PROVISIONING stores with no release: install restarts from scratch.
    pub reinstalled: usize,
    /// DELETING stores re-enqueued for tear-down.
    pub deletions: usize,
}

/// Re-enqueues non-terminal stores on process start.
pub struct RecoveryController {
    store: StoreStore,
    helm: Arc<dyn HelmExecutor>,
    worker: WorkerHandle,
    retry_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RecoveryController {
    pub fn new(
        store: StoreStore,
        helm: Arc<dyn HelmExecutor>,
        worker: WorkerHandle,
        retry_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { store, helm, worker, retry_interval, shutdown }
    }

    /// One reconciliation pass.
    ///
    /// Every install-vs-resume decision is made before anything is
    /// submitted: a deferred scan must never leave a partial batch behind,
    /// or its retry would enqueue duplicate tasks for the same store.
    pub async fn scan_once(&self) -> crate::error::Result<RecoveryStats> {
        let records = self.store.list_non_terminal().await?;
        if records.is_empty() {
            debug!("no stores to recover");
            return Ok(RecoveryStats::default());
        }

        let mut stats = RecoveryStats::default();
        let mut tasks = Vec::with_capacity(records.len());

        for record in records {
            match record.status {
                StoreStatus::Provisioning => {
                    let exists = self
                        .helm
                        .release_exists(&record.helm_release, &record.namespace)
                        .await?;
                    if exists {
                        info!(store_id = %record.id, "release exists, resuming readiness checks");
                        stats.resumed += 1;
                        tasks.push(Task::Resume { store_id: record.id });
                    } else {
                        info!(store_id = %record.id, "no release found, restarting install");
                        stats.reinstalled += 1;
                        tasks.push(Task::Install { store_id: record.id });
                    }
                }
                StoreStatus::Deleting => {
                    info!(store_id = %record.id, "re-enqueueing tear-down");
                    stats.deletions += 1;
                    tasks.push(Task::Delete { store_id: record.id });
                }
                other => {
                    // list_non_terminal only yields the two states above.
                    warn!(store_id = %record.id, status = %other, "unexpected status in recovery scan");
                }
            }
        }

        for task in tasks {
            self.worker.submit(task);
        }
        Ok(stats)
    }

    /// Retry loop for a deferred first scan. Runs until a pass succeeds or
    /// shutdown is signalled.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("recovery retry loop stopped by shutdown");
                        return;
                    }
                }
                _ = tokio::time::sleep(self.retry_interval) => {}
            }

            match self.scan_once().await {
                Ok(stats) => {
                    info!(
                        resumed = stats.resumed,
                        reinstalled = stats.reinstalled,
                        deletions = stats.deletions,
                        "recovery completed"
                    );
                    return;
                }
                Err(e) => warn!(error = %e, "recovery deferred, executor still unreachable"),
            }
        }
    }
}
