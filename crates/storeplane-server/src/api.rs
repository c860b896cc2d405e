// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! REST surface of the control plane (`/api/v1`).
//!
//! Thin by design: handlers validate input, translate commands into store
//! of record operations plus worker submissions, and map errors to status
//! codes. Every response returns immediately; provisioning and tear-down
//! happen asynchronously.
//!
//! `admin_password` is write-only here: it never appears in a response
//! body.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;

use storeplane_core::error::StoreError;
use storeplane_core::model::{Engine, NAME_PATTERN, NewStore, StoreRecord, StoreStatus};

use crate::state::AppState;
use crate::worker::Task;

const MIN_PASSWORD_LEN: usize = 8;

/// Build the `/api/v1` router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/stores", get(list_stores).post(create_store))
        .route("/api/v1/stores/{id}", get(get_store).delete(delete_store))
        // The dashboard is served from another origin.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API-level errors, mapped onto HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad input at the boundary; nothing was persisted.
    #[error("{0}")]
    Validation(String),

    /// The request conflicts with the store's current lifecycle state.
    #[error("{0}")]
    Conflict(String),

    /// Store-of-record failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Store(err) => match err {
                StoreError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "Store not found".to_string())
                }
                StoreError::NameConflict { name } => (
                    StatusCode::CONFLICT,
                    format!("Store with name '{name}' already exists"),
                ),
                StoreError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                _ => {
                    tracing::error!(error = %err, "request failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                }
            },
        };

        (status, axum::Json(json!({ "message": message }))).into_response()
    }
}

/// POST body for store creation. Fields are optional at the serde level so
/// a missing field yields a 400 with a usable message instead of a
/// deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct CreateStoreRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub admin_username: Option<String>,
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl CreateStoreRequest {
    fn validate(self) -> Result<NewStore, ApiError> {
        let name = require(self.name, "name")?;
        let engine = require(self.engine, "engine")?;
        let admin_username = require(self.admin_username, "admin_username")?;
        let admin_email = require(self.admin_email, "admin_email")?;
        let admin_password = require(self.admin_password, "admin_password")?;

        if !NAME_PATTERN.is_match(&name) {
            return Err(ApiError::Validation(format!(
                "Field \"name\" must be 3-50 lowercase letters, digits or hyphens, \
                 starting and ending with a letter or digit (got '{name}')"
            )));
        }

        let engine: Engine = engine
            .parse()
            .map_err(|_| ApiError::Validation(format!(
                "Invalid engine '{engine}'. Must be one of: woocommerce, medusa"
            )))?;

        if admin_password.len() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(format!(
                "Field \"admin_password\" must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        Ok(NewStore { name, engine, admin_username, admin_email, admin_password })
    }
}

fn require(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::Validation(format!("Field \"{field}\" is required"))),
    }
}

/// A store record as exposed over the API. The admin password is omitted,
/// not merely hidden.
#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub id: String,
    pub name: String,
    pub engine: Engine,
    pub namespace: String,
    pub helm_release: String,
    pub status: StoreStatus,
    pub store_url: Option<String>,
    pub failure_reason: Option<String>,
    pub admin_username: String,
    pub admin_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoreRecord> for StoreResponse {
    fn from(record: StoreRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            engine: record.engine,
            namespace: record.namespace,
            helm_release: record.helm_release,
            status: record.status,
            store_url: record.store_url,
            failure_reason: record.failure_reason,
            admin_username: record.admin_username,
            admin_email: record.admin_email,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListStoresResponse {
    pub stores: Vec<StoreResponse>,
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(json!({ "status": "healthy" }))
}

async fn list_stores(
    State(state): State<AppState>,
) -> Result<axum::Json<ListStoresResponse>, ApiError> {
    let stores = state.store().list().await?;
    Ok(axum::Json(ListStoresResponse {
        stores: stores.into_iter().map(Into::into).collect(),
    }))
}

async fn get_store(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<axum::Json<StoreResponse>, ApiError> {
    let record = state.store().get(&id).await?;
    Ok(axum::Json(record.into()))
}

async fn create_store(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<CreateStoreRequest>,
) -> Result<(StatusCode, axum::Json<StoreResponse>), ApiError> {
    let new = body.validate()?;
    let record = state.store().create(new).await?;

    state.worker().submit(Task::Install { store_id: record.id.clone() });
    tracing::info!(store_id = %record.id, "store creation accepted");

    Ok((StatusCode::ACCEPTED, axum::Json(record.into())))
}

async fn delete_store(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, axum::Json<serde_json::Value>), ApiError> {
    let record = state.store().get(&id).await?;

    let accepted = (
        StatusCode::ACCEPTED,
        axum::Json(json!({ "id": id.clone(), "status": StoreStatus::Deleting })),
    );

    match record.status {
        StoreStatus::Deleted => Err(ApiError::Conflict("Store already deleted".to_string())),
        // A delete is already in flight; accept again without enqueueing a
        // second task for the same store.
        StoreStatus::Deleting => Ok(accepted),
        StoreStatus::Provisioning => Err(ApiError::Conflict(
            "Store is still provisioning and cannot be deleted yet".to_string(),
        )),
        StoreStatus::Ready | StoreStatus::Failed => {
            match state
                .store()
                .update_status(&id, StoreStatus::Deleting, None, None)
                .await
            {
                Ok(_) => {}
                // Raced with another delete (or a worker transition); only
                // accept if the record did land in DELETING.
                Err(StoreError::IllegalTransition { from: StoreStatus::Deleting, .. }) => {
                    return Ok(accepted);
                }
                Err(e) => return Err(e.into()),
            }

            state.worker().submit(Task::Delete { store_id: id.clone() });
            tracing::info!(store_id = %id, "store deletion accepted");
            Ok(accepted)
        }
    }
}
