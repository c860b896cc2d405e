// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed store of record.
//!
//! Every public operation is a single short statement; the conditional
//! status UPDATE doubles as the serialization point between the API and
//! worker tasks. Nothing here holds a connection across an await on
//! anything but the database itself.

use std::path::Path;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::model::{
    NAME_PATTERN, NewStore, StoreRecord, StoreStatus, generate_store_id, namespace_for,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// How many times to retry insertion when the generated id collides.
const ID_RETRIES: usize = 3;

const SELECT_COLUMNS: &str = "id, name, engine, namespace, helm_release, status, store_url, \
     failure_reason, admin_username, admin_email, admin_password, created_at, updated_at";

/// Store of record for store lifecycle state.
#[derive(Clone)]
pub struct StoreStore {
    pool: SqlitePool,
}

impl StoreStore {
    /// Create from an existing pool. Migrations must already have run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Create and initialize a store of record from a file path, creating
    /// parent directories and the database file as needed.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Invalid(format!("cannot create {parent:?}: {e}")))?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url).await
    }

    /// Insert a new record in `PROVISIONING`.
    ///
    /// Enforces name shape and the live-name uniqueness constraint. The id
    /// is `<name>-<rand8>`; insertion is retried a few times if the suffix
    /// collides with an existing id.
    pub async fn create(&self, new: NewStore) -> Result<StoreRecord> {
        let name = new.name.trim().to_string();

        if !NAME_PATTERN.is_match(&name) {
            return Err(StoreError::Invalid(format!(
                "name '{name}' must match {}",
                NAME_PATTERN.as_str()
            )));
        }
        if new.admin_username.is_empty() || new.admin_email.is_empty() {
            return Err(StoreError::Invalid("admin credentials are required".into()));
        }

        for attempt in 1..=ID_RETRIES {
            let id = generate_store_id(&name);
            let namespace = namespace_for(&id);
            let now = Utc::now();

            let result = sqlx::query(
                r#"
                INSERT INTO stores (id, name, engine, namespace, helm_release, status,
                                    admin_username, admin_email, admin_password,
                                    created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&name)
            .bind(new.engine)
            .bind(&namespace)
            .bind(&id)
            .bind(StoreStatus::Provisioning)
            .bind(&new.admin_username)
            .bind(&new.admin_email)
            .bind(&new.admin_password)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    info!(store_id = %id, name = %name, engine = %new.engine, "store created");
                    return self.get(&id).await;
                }
                Err(e) if is_unique_violation(&e, "stores.name") => {
                    return Err(StoreError::NameConflict { name });
                }
                Err(e) if is_unique_violation(&e, "stores.id") => {
                    debug!(attempt, "store id collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Invalid(format!(
            "could not generate a unique id for '{name}' after {ID_RETRIES} attempts"
        )))
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: &str) -> Result<StoreRecord> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM stores WHERE id = ?");
        sqlx::query_as::<_, StoreRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    /// Fetch the live (non-DELETED) record holding `name`, if any.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<StoreRecord>> {
        let query =
            format!("SELECT {SELECT_COLUMNS} FROM stores WHERE name = ? AND status != 'DELETED'");
        Ok(sqlx::query_as::<_, StoreRecord>(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// All records, newest first.
    pub async fn list(&self) -> Result<Vec<StoreRecord>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM stores ORDER BY created_at DESC, id");
        Ok(sqlx::query_as::<_, StoreRecord>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Records the worker still owes work to (`PROVISIONING`, `DELETING`),
    /// oldest first. Used only by recovery.
    pub async fn list_non_terminal(&self) -> Result<Vec<StoreRecord>> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM stores \
             WHERE status IN ('PROVISIONING', 'DELETING') ORDER BY created_at, id"
        );
        Ok(sqlx::query_as::<_, StoreRecord>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Move a record to `new_status`, enforcing the lifecycle graph
    /// atomically: the UPDATE only matches rows whose current status is a
    /// legal prior, so a concurrent actor that already moved the record
    /// makes this call fail instead of clobbering it.
    ///
    /// `store_url` is required for `READY` and `failure_reason` for
    /// `FAILED`; both are cleared on every other transition.
    pub async fn update_status(
        &self,
        id: &str,
        new_status: StoreStatus,
        store_url: Option<&str>,
        failure_reason: Option<&str>,
    ) -> Result<StoreRecord> {
        match new_status {
            StoreStatus::Ready if store_url.is_none() => {
                return Err(StoreError::Invalid("READY requires a store_url".into()));
            }
            StoreStatus::Failed if failure_reason.is_none() => {
                return Err(StoreError::Invalid("FAILED requires a failure_reason".into()));
            }
            _ => {}
        }
        let url = if new_status == StoreStatus::Ready { store_url } else { None };
        let reason = if new_status == StoreStatus::Failed { failure_reason } else { None };

        let priors = StoreStatus::legal_priors(new_status);
        if priors.is_empty() {
            let record = self.get(id).await?;
            return Err(StoreError::IllegalTransition {
                id: id.to_string(),
                from: record.status,
                to: new_status,
            });
        }

        let placeholders = vec!["?"; priors.len()].join(", ");
        let query = format!(
            "UPDATE stores SET status = ?, store_url = ?, failure_reason = ?, updated_at = ? \
             WHERE id = ? AND status IN ({placeholders})"
        );

        let mut update = sqlx::query(&query)
            .bind(new_status)
            .bind(url)
            .bind(reason)
            .bind(Utc::now())
            .bind(id);
        for prior in priors {
            update = update.bind(*prior);
        }

        let affected = update.execute(&self.pool).await?.rows_affected();
        if affected == 0 {
            let record = self.get(id).await?;
            return Err(StoreError::IllegalTransition {
                id: id.to_string(),
                from: record.status,
                to: new_status,
            });
        }

        let record = self.get(id).await?;
        info!(store_id = %id, status = %record.status, "store status updated");
        Ok(record)
    }
}

fn is_unique_violation(err: &sqlx::Error, column: &str) -> bool {
    match err.as_database_error() {
        Some(db) => db.is_unique_violation() && db.message().contains(column),
        None => false,
    }
}
