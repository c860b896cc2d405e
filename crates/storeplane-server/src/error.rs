// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the storeplane server.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Store-of-record operation failed.
    #[error("Store error: {0}")]
    Store(#[from] storeplane_core::StoreError),

    /// Helm executor failed.
    #[error("Helm error: {0}")]
    Helm(#[from] crate::helm::HelmError),

    /// Cluster probe failed.
    #[error("Cluster error: {0}")]
    Probe(#[from] crate::kube::ProbeError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type using server [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
