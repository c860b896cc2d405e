// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Helm executor interface.
//!
//! The control plane treats Helm as a black-box executor: all templating
//! and manifest generation is the chart's responsibility. Implementations
//! are PURE executors - they do NOT touch the store of record. Status
//! writeback is the worker's job.

pub mod cli;
pub mod mock;

pub use cli::HelmCli;
pub use mock::{InstallOutcome, MockHelm};

use async_trait::async_trait;
use thiserror::Error;

use storeplane_core::model::Engine;

/// Errors from Helm operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HelmError {
    /// A release with this name already exists. The worker treats this as
    /// success: the install it wanted has already happened.
    #[error("release already exists")]
    AlreadyExists,

    /// The chart could not be located.
    #[error("chart not found: {0}")]
    ChartNotFound(String),

    /// The `helm` binary is not on PATH.
    #[error("helm CLI not found")]
    CliNotFound,

    /// The CLI did not exit within its execution timeout.
    #[error("helm command timed out")]
    Timeout,

    /// The CLI exited non-zero for any other reason.
    #[error("{stderr}")]
    Failed {
        /// Truncated stderr excerpt.
        stderr: String,
    },

    /// Spawning or reaping the CLI process failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Helm operations.
pub type Result<T> = std::result::Result<T, HelmError>;

/// Everything an install needs; assembled by the worker from a store
/// record plus configuration.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Release name (equals the store id).
    pub release: String,
    /// Target namespace (`store-<id>`), created if absent.
    pub namespace: String,
    /// Store id, passed to the chart as `store.id`.
    pub store_id: String,
    /// Store name, passed as `store.name`.
    pub store_name: String,
    /// Engine selecting the chart's workload variant.
    pub engine: Engine,
    /// Public domain for the store (`<name>.<base_domain>`).
    pub domain: String,
    /// Admin credentials forwarded to the chart.
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

impl InstallRequest {
    /// The dynamic identity of the store as `--set` overrides, layered on
    /// top of the chart's values files.
    pub fn set_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("store.id", self.store_id.clone()),
            ("store.name", self.store_name.clone()),
            ("store.namespace", self.namespace.clone()),
            ("store.engine", self.engine.to_string()),
            ("store.domain", self.domain.clone()),
            ("admin.username", self.admin_username.clone()),
            ("admin.email", self.admin_email.clone()),
            ("admin.password", self.admin_password.clone()),
        ]
    }
}

/// Trait for Helm executors.
///
/// A blind `install` retry is not idempotent at the CLI level, so callers
/// pair [`release_exists`](HelmExecutor::release_exists) with
/// [`install`](HelmExecutor::install) instead of retrying installs.
#[async_trait]
pub trait HelmExecutor: Send + Sync {
    /// Install `request.release` into `request.namespace`, creating the
    /// namespace if needed. Success iff the CLI exits 0 within the
    /// configured execution timeout.
    async fn install(&self, request: &InstallRequest) -> Result<()>;

    /// Uninstall a release. Idempotent: a missing release is success.
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<()>;

    /// Whether a release exists in the namespace. Used by the worker's
    /// install preflight and by recovery's install-vs-resume decision.
    async fn release_exists(&self, release: &str, namespace: &str) -> Result<bool>;
}
