// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storeplane Core - store lifecycle domain model and store of record.
//!
//! This crate owns everything the control plane persists: the
//! [`model::StoreRecord`] entity, its closed status state machine, and the
//! SQLite-backed [`store::StoreStore`] that is the single source of truth
//! for idempotency and crash recovery.
//!
//! Invariants enforced here, after every committed statement:
//!
//! - a store name is unique across non-`DELETED` rows;
//! - `id`, `namespace` and `helm_release` are immutable and mutually
//!   derived (`namespace == "store-" + id`, `helm_release == id`);
//! - status only ever moves along the lifecycle graph;
//! - `store_url` is set iff `READY`, `failure_reason` iff `FAILED`.
//!
//! The worker and API layers in `storeplane-server` mutate records only
//! through [`store::StoreStore`]; no other component caches store state.

pub mod error;
pub mod model;
pub mod store;

pub use error::StoreError;
pub use model::{Engine, NewStore, StoreRecord, StoreStatus};
pub use store::StoreStore;
