// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for storeplane-server integration tests.
//!
//! [`PreparedContext`] owns a temp database plus mock executors and lets
//! tests seed records before the control plane boots (recovery runs at
//! startup, so seeding has to happen first). [`PreparedContext::start`]
//! turns it into a running [`TestContext`] with a real worker and REST
//! listener on an ephemeral port; shutting the context down hands the
//! prepared state back, which is how restart scenarios are written.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use storeplane_core::model::{Engine, NewStore, StoreRecord, StoreStatus};
use storeplane_core::store::StoreStore;
use storeplane_server::config::Config;
use storeplane_server::helm::MockHelm;
use storeplane_server::kube::MockProbe;
use storeplane_server::runtime::Runtime;

/// Config tuned for tests: ephemeral port, fast polls, short timeouts.
pub fn test_config() -> Config {
    Config {
        http_port: 0,
        provisioning_poll_interval: Duration::from_millis(25),
        provisioning_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

/// Database + mocks, before the control plane is started.
pub struct PreparedContext {
    pub store: StoreStore,
    pub helm: Arc<MockHelm>,
    pub probe: Arc<MockProbe>,
    pub config: Config,
    tmp: TempDir,
}

impl PreparedContext {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let store = StoreStore::from_path(tmp.path().join("stores.db"))
            .await
            .expect("open store");
        Self {
            store,
            helm: Arc::new(MockHelm::new()),
            probe: Arc::new(MockProbe::new()),
            config,
            tmp,
        }
    }

    /// Create a record and walk it along legal transitions into `status`.
    /// Seeding here, before [`start`](Self::start), is how recovery
    /// scenarios are set up: the startup scan will see these records.
    pub async fn seed(&self, name: &str, status: StoreStatus) -> StoreRecord {
        seed_record(&self.store, name, status).await
    }

    /// Boot the control plane: worker, recovery pass, REST listener.
    pub async fn start(self) -> TestContext {
        let runtime = Runtime::builder(self.config.clone())
            .store(self.store.clone())
            .helm(self.helm.clone())
            .probe(self.probe.clone())
            .start()
            .await
            .expect("start runtime");

        let base_url = format!("http://127.0.0.1:{}", runtime.local_addr().port());

        TestContext {
            store: self.store,
            helm: self.helm,
            probe: self.probe,
            config: self.config,
            runtime,
            client: reqwest::Client::new(),
            base_url,
            tmp: self.tmp,
        }
    }
}

/// A running control plane under test.
pub struct TestContext {
    pub store: StoreStore,
    pub helm: Arc<MockHelm>,
    pub probe: Arc<MockProbe>,
    pub config: Config,
    pub runtime: Runtime,
    pub client: reqwest::Client,
    pub base_url: String,
    tmp: TempDir,
}

impl TestContext {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Seed a record after startup, invisible to the recovery scan. Tests
    /// that drive the worker queue by hand use this so the only task for
    /// the record is the one they submit.
    pub async fn seed(&self, name: &str, status: StoreStatus) -> StoreRecord {
        seed_record(&self.store, name, status).await
    }

    /// Poll the store of record until the record reaches `status`.
    pub async fn wait_for_status(
        &self,
        id: &str,
        status: StoreStatus,
        timeout: Duration,
    ) -> StoreRecord {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let record = self.store.get(id).await.expect("record exists");
            if record.status == status {
                return record;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "store {id} stuck in {} (wanted {status}): {:?}",
                record.status,
                record.failure_reason
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Assert the record still holds `status` after `hold` has elapsed.
    pub async fn assert_status_holds(&self, id: &str, status: StoreStatus, hold: Duration) {
        tokio::time::sleep(hold).await;
        let record = self.store.get(id).await.expect("record exists");
        assert_eq!(record.status, status, "store {id} moved to {}", record.status);
    }

    /// POST a valid creation body for `name` and return the response.
    pub async fn create_store(&self, name: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/stores"))
            .json(&serde_json::json!({
                "name": name,
                "engine": "woocommerce",
                "admin_username": "admin",
                "admin_email": "admin@example.com",
                "admin_password": "pw12345678",
            }))
            .send()
            .await
            .expect("POST /stores")
    }

    /// Graceful shutdown, returning the prepared state for restarts.
    pub async fn shutdown(self) -> PreparedContext {
        self.runtime.shutdown().await.expect("clean shutdown");
        PreparedContext {
            store: self.store,
            helm: self.helm,
            probe: self.probe,
            config: self.config,
            tmp: self.tmp,
        }
    }
}

async fn seed_record(store: &StoreStore, name: &str, status: StoreStatus) -> StoreRecord {
    let record = store
        .create(NewStore {
            name: name.to_string(),
            engine: Engine::Woocommerce,
            admin_username: "admin".to_string(),
            admin_email: "admin@example.com".to_string(),
            admin_password: "pw12345678".to_string(),
        })
        .await
        .expect("seed create");

    let id = record.id.clone();
    match status {
        StoreStatus::Provisioning => record,
        StoreStatus::Ready => store
            .update_status(&id, StoreStatus::Ready, Some("http://seeded.localhost"), None)
            .await
            .expect("seed ready"),
        StoreStatus::Failed => store
            .update_status(&id, StoreStatus::Failed, None, Some("seeded failure"))
            .await
            .expect("seed failed"),
        StoreStatus::Deleting => {
            store
                .update_status(&id, StoreStatus::Ready, Some("http://seeded.localhost"), None)
                .await
                .expect("seed ready");
            store
                .update_status(&id, StoreStatus::Deleting, None, None)
                .await
                .expect("seed deleting")
        }
        StoreStatus::Deleted => {
            store
                .update_status(&id, StoreStatus::Ready, Some("http://seeded.localhost"), None)
                .await
                .expect("seed ready");
            store
                .update_status(&id, StoreStatus::Deleting, None, None)
                .await
                .expect("seed deleting");
            store
                .update_status(&id, StoreStatus::Deleted, None, None)
                .await
                .expect("seed deleted")
        }
    }
}
