// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storeplane - Store Provisioning Control Plane
//!
//! Provisions, tracks, and tears down isolated ecommerce store workloads
//! on a Kubernetes cluster, one Helm release per store in a dedicated
//! namespace. The database is the source of truth; Helm and the cluster
//! are external executors reconciled asynchronously.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use storeplane_core::store::StoreStore;
use storeplane_server::config::Config;
use storeplane_server::helm::{HelmCli, HelmExecutor};
use storeplane_server::kube::{ClusterProbe, KubeProbe};
use storeplane_server::runtime::Runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storeplane_server=info,storeplane_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        http_port = config.http_port,
        base_domain = %config.base_domain,
        chart = %config.helm_chart_path.display(),
        max_workers = config.provisioning_max_workers,
        "Starting storeplane control plane"
    );

    // Open the store of record (runs migrations)
    let store = StoreStore::connect(&config.database_url)
        .await
        .context("failed to open the store database")?;
    info!("Connected to database");

    // External executors
    let helm: Arc<dyn HelmExecutor> = Arc::new(HelmCli::new(&config));
    let probe: Arc<dyn ClusterProbe> = Arc::new(
        KubeProbe::from_env()
            .await
            .context("failed to load Kubernetes configuration")?,
    );

    // Start the runtime (worker, recovery, REST listener)
    let runtime = Runtime::builder(config)
        .store(store)
        .helm(helm)
        .probe(probe)
        .start()
        .await?;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown
    runtime.shutdown().await?;

    info!("Storeplane shut down");

    Ok(())
}
