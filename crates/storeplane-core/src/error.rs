// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the store of record.

use thiserror::Error;

use crate::model::StoreStatus;

/// Errors from store-of-record operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// No record with the given id.
    #[error("store not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// A non-DELETED record already holds this name.
    #[error("store name already in use: {name}")]
    NameConflict {
        /// The conflicting name.
        name: String,
    },

    /// The requested status change is not an edge of the lifecycle graph.
    /// This is a programmer error, never a user-input error.
    #[error("illegal status transition for {id}: {from} -> {to}")]
    IllegalTransition {
        /// Record id.
        id: String,
        /// Status the record actually holds.
        from: StoreStatus,
        /// Status that was requested.
        to: StoreStatus,
    },

    /// Input violates a record constraint.
    #[error("invalid store data: {0}")]
    Invalid(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration run failed.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Result type using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
