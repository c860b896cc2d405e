// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Application state shared across API handlers.

use std::sync::Arc;

use storeplane_core::store::StoreStore;

use crate::worker::WorkerHandle;

/// Shared state for the REST layer: the store of record plus the worker
/// queue. Handlers never reach into the worker beyond submitting tasks.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: StoreStore,
    worker: WorkerHandle,
}

impl AppState {
    pub fn new(store: StoreStore, worker: WorkerHandle) -> Self {
        Self { inner: Arc::new(AppStateInner { store, worker }) }
    }

    pub fn store(&self) -> &StoreStore {
        &self.inner.store
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.inner.worker
    }
}
