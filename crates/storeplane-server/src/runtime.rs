// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Composition root for the control plane.
//!
//! [`Runtime::builder`] wires the store of record, Helm executor, and
//! cluster probe into the worker, recovery controller, and REST listener.
//! Lifecycle is `build -> start -> shutdown`; nothing in the tree is a
//! module-level singleton, so tests can boot a full control plane against
//! mocks on an ephemeral port.
//!
//! Startup order matters: the worker comes up first, the first recovery
//! pass runs (or defers to a background retry loop) before the listener
//! binds, and only then does the API accept traffic.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use storeplane_core::store::StoreStore;

use crate::api;
use crate::config::Config;
use crate::helm::HelmExecutor;
use crate::kube::ClusterProbe;
use crate::recovery::RecoveryController;
use crate::state::AppState;
use crate::worker::{ProvisioningWorker, WorkerConfig, WorkerHandle};

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    config: Config,
    store: Option<StoreStore>,
    helm: Option<Arc<dyn HelmExecutor>>,
    probe: Option<Arc<dyn ClusterProbe>>,
}

impl RuntimeBuilder {
    pub fn new(config: Config) -> Self {
        Self { config, store: None, helm: None, probe: None }
    }

    /// Set the store of record (required).
    pub fn store(mut self, store: StoreStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the Helm executor (required).
    pub fn helm(mut self, helm: Arc<dyn HelmExecutor>) -> Self {
        self.helm = Some(helm);
        self
    }

    /// Set the cluster probe (required).
    pub fn probe(mut self, probe: Arc<dyn ClusterProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Start the control plane: worker, recovery, then the REST listener.
    pub async fn start(self) -> Result<Runtime> {
        let store = self.store.ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let helm = self.helm.ok_or_else(|| anyhow::anyhow!("helm executor is required"))?;
        let probe = self.probe.ok_or_else(|| anyhow::anyhow!("cluster probe is required"))?;
        let config = self.config;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (worker, worker_handle) = ProvisioningWorker::new(
            store.clone(),
            helm.clone(),
            probe.clone(),
            WorkerConfig::from(&config),
            shutdown_rx.clone(),
        );
        let worker_join = tokio::spawn(worker.run());

        // Reconcile persisted intent before accepting traffic. A cluster
        // we cannot reach defers recovery to a background retry loop; it
        // never blocks startup or fails stores.
        let recovery = RecoveryController::new(
            store.clone(),
            helm.clone(),
            worker_handle.clone(),
            config.provisioning_poll_interval,
            shutdown_rx.clone(),
        );
        let recovery_join = match recovery.scan_once().await {
            Ok(stats) => {
                info!(
                    resumed = stats.resumed,
                    reinstalled = stats.reinstalled,
                    deletions = stats.deletions,
                    "recovery completed"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "recovery deferred, retrying in background");
                Some(tokio::spawn(recovery.run()))
            }
        };

        let state = AppState::new(store, worker_handle.clone());
        let app = api::router(state);

        let listener =
            tokio::net::TcpListener::bind(("0.0.0.0", config.http_port)).await?;
        let local_addr = listener.local_addr()?;

        let mut server_shutdown = shutdown_rx;
        let server_join = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.changed().await;
                })
                .await
        });

        info!(addr = %local_addr, "control plane ready");

        Ok(Runtime { shutdown_tx, worker_join, recovery_join, server_join, local_addr, worker_handle })
    }
}

/// A running control plane.
pub struct Runtime {
    shutdown_tx: watch::Sender<bool>,
    worker_join: JoinHandle<()>,
    recovery_join: Option<JoinHandle<()>>,
    server_join: JoinHandle<std::io::Result<()>>,
    local_addr: SocketAddr,
    worker_handle: WorkerHandle,
}

impl Runtime {
    /// Create a builder for the given configuration.
    pub fn builder(config: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    /// Address the REST listener is bound to. With `http_port = 0` this is
    /// the ephemeral port the OS picked.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Submission handle into the worker queue.
    pub fn worker(&self) -> &WorkerHandle {
        &self.worker_handle
    }

    /// Gracefully shut down: signal every loop, drain in-flight tasks,
    /// join all handles. Running tasks finish their current poll tick and
    /// leave their records where they stand.
    pub async fn shutdown(self) -> Result<()> {
        info!("control plane shutting down");

        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.recovery_join
            && let Err(e) = handle.await
        {
            error!("recovery task panicked: {e}");
        }

        if let Err(e) = self.worker_join.await {
            error!("worker task panicked: {e}");
        }

        match self.server_join.await {
            Ok(Ok(())) => {
                info!("control plane shut down");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("server error during shutdown: {e}");
                Err(e.into())
            }
            Err(e) => {
                error!("server task panicked: {e}");
                Err(anyhow::anyhow!("server task panicked: {e}"))
            }
        }
    }
}
