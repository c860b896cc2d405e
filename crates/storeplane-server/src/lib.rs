// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storeplane Server - Store Provisioning Control Plane
//!
//! This crate is the control plane around `storeplane-core`: it exposes a
//! small REST surface, drives Helm and the Kubernetes API as external
//! executors, and reconciles asynchronously until every requested store
//! converges to `READY` or `FAILED`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Dashboard / API clients                   │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ REST /api/v1
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  api ──▶ StoreStore (insert PROVISIONING / mark DELETING)    │
//! │   │                                                          │
//! │   └──▶ worker queue ──▶ ProvisioningWorker (bounded pool)    │
//! │                           │          │                       │
//! │              helm install │          │ readiness polling     │
//! │                           ▼          ▼                       │
//! │                     Helm CLI     Kubernetes API              │
//! │                           │          │                       │
//! │                           └────┬─────┘                       │
//! │                                ▼                             │
//! │                    StoreStore (terminal update)              │
//! └──────────────────────────────────────────────────────────────┘
//!                               ▲
//!                               │ on startup
//!                    RecoveryController (list_non_terminal,
//!                    install-vs-resume, re-enqueue deletions)
//! ```
//!
//! The database is authoritative. Helm installs are made effectively
//! idempotent by pairing a `release_exists` preflight with the install;
//! readiness is the conjunction of workload readiness, setup-job success,
//! and ingress availability; and every crash leaves records in a state the
//! recovery controller can resume from.

pub mod api;
pub mod config;
pub mod error;
pub mod helm;
pub mod kube;
pub mod recovery;
pub mod runtime;
pub mod state;
pub mod worker;

pub use error::{Error, Result};
