// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provisioning worker lifecycle tests: install, readiness polling,
//! failure classification, timeouts, tear-down, and bounded concurrency.
//!
//! Records are seeded after startup so the recovery scan stays out of the
//! way; the only task per store is the one the test submits.

mod common;

use std::time::Duration;

use common::PreparedContext;
use storeplane_core::model::StoreStatus;
use storeplane_server::helm::InstallOutcome;
use storeplane_server::kube::{JobState, PodReadiness};
use storeplane_server::worker::Task;

#[tokio::test]
async fn happy_path_converges_to_ready() {
    let ctx = PreparedContext::new().await.start().await;
    let record = ctx.seed("shop", StoreStatus::Provisioning).await;

    ctx.runtime.worker().submit(Task::Install { store_id: record.id.clone() });

    // Cluster starts cold; flip it to ready while the worker polls.
    tokio::time::sleep(Duration::from_millis(60)).await;
    ctx.probe.make_ready("shop.localhost").await;

    let ready = ctx.wait_for_status(&record.id, StoreStatus::Ready, Duration::from_secs(5)).await;
    assert_eq!(ready.store_url.as_deref(), Some("http://shop.localhost"));
    assert_eq!(ready.failure_reason, None);

    assert_eq!(ctx.helm.install_count().await, 1);
    let installs = ctx.helm.installs().await;
    assert_eq!(installs[0].release, record.id);
    assert_eq!(installs[0].namespace, record.namespace);
    assert_eq!(installs[0].domain, "shop.localhost");

    ctx.shutdown().await;
}

#[tokio::test]
async fn helm_failure_is_terminal_and_skips_polling() {
    let ctx = PreparedContext::new().await.start().await;
    ctx.helm
        .set_install_outcome(InstallOutcome::Fail("chart not found".to_string()))
        .await;
    let record = ctx.seed("shop", StoreStatus::Provisioning).await;

    ctx.runtime.worker().submit(Task::Install { store_id: record.id.clone() });

    let failed = ctx.wait_for_status(&record.id, StoreStatus::Failed, Duration::from_secs(5)).await;
    let reason = failed.failure_reason.expect("failure reason");
    assert!(reason.starts_with("Helm install failed"), "reason: {reason}");
    assert!(reason.contains("chart not found"), "reason: {reason}");
    assert_eq!(failed.store_url, None);

    // No readiness polling after a terminal install failure.
    assert_eq!(ctx.probe.pods_calls(), 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn already_exists_install_proceeds_to_polling() {
    let ctx = PreparedContext::new().await.start().await;
    ctx.helm.set_install_outcome(InstallOutcome::AlreadyExists).await;
    ctx.probe.make_ready("shop.localhost").await;
    let record = ctx.seed("shop", StoreStatus::Provisioning).await;

    ctx.runtime.worker().submit(Task::Install { store_id: record.id.clone() });

    let ready = ctx.wait_for_status(&record.id, StoreStatus::Ready, Duration::from_secs(5)).await;
    assert_eq!(ready.store_url.as_deref(), Some("http://shop.localhost"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn readiness_never_observed_times_out() {
    let mut config = common::test_config();
    config.provisioning_timeout = Duration::from_millis(300);
    let ctx = PreparedContext::with_config(config).await.start().await;
    let record = ctx.seed("shop", StoreStatus::Provisioning).await;

    ctx.runtime.worker().submit(Task::Install { store_id: record.id.clone() });

    let failed = ctx.wait_for_status(&record.id, StoreStatus::Failed, Duration::from_secs(5)).await;
    assert_eq!(failed.failure_reason.as_deref(), Some("Provisioning timed out"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn pod_failure_fails_fast() {
    let ctx = PreparedContext::new().await.start().await;
    ctx.probe
        .set_pods(PodReadiness { ready: 1, total: 2, any_failed: true })
        .await;
    let record = ctx.seed("shop", StoreStatus::Provisioning).await;

    ctx.runtime.worker().submit(Task::Install { store_id: record.id.clone() });

    let failed = ctx.wait_for_status(&record.id, StoreStatus::Failed, Duration::from_secs(5)).await;
    assert_eq!(failed.failure_reason.as_deref(), Some("Pods not ready"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn setup_job_failure_fails_fast() {
    let ctx = PreparedContext::new().await.start().await;
    ctx.probe
        .set_pods(PodReadiness { ready: 2, total: 2, any_failed: false })
        .await;
    ctx.probe.set_job(JobState::Failed).await;
    let record = ctx.seed("shop", StoreStatus::Provisioning).await;

    ctx.runtime.worker().submit(Task::Install { store_id: record.id.clone() });

    let failed = ctx.wait_for_status(&record.id, StoreStatus::Failed, Duration::from_secs(5)).await;
    assert_eq!(failed.failure_reason.as_deref(), Some("Setup job failed"));

    ctx.shutdown().await;
}

#[tokio::test]
async fn transient_probe_errors_extend_the_poll() {
    let ctx = PreparedContext::new().await.start().await;
    ctx.probe.set_transient(true);
    let record = ctx.seed("shop", StoreStatus::Provisioning).await;

    ctx.runtime.worker().submit(Task::Install { store_id: record.id.clone() });

    // A flaky cluster is not a store failure.
    ctx.assert_status_holds(&record.id, StoreStatus::Provisioning, Duration::from_millis(150))
        .await;

    ctx.probe.set_transient(false);
    ctx.probe.make_ready("shop.localhost").await;

    ctx.wait_for_status(&record.id, StoreStatus::Ready, Duration::from_secs(5)).await;

    ctx.shutdown().await;
}

#[tokio::test]
async fn tasks_abandon_records_in_unexpected_states() {
    let ctx = PreparedContext::new().await.start().await;
    let record = ctx.seed("shop", StoreStatus::Ready).await;

    ctx.runtime.worker().submit(Task::Install { store_id: record.id.clone() });
    ctx.runtime.worker().submit(Task::Delete { store_id: record.id.clone() });

    ctx.assert_status_holds(&record.id, StoreStatus::Ready, Duration::from_millis(150)).await;
    assert_eq!(ctx.helm.install_count().await, 0);
    assert_eq!(ctx.helm.exists_calls(), 0);
    assert!(ctx.helm.uninstalls().await.is_empty());

    ctx.shutdown().await;
}

#[tokio::test]
async fn delete_uninstalls_removes_namespace_and_marks_deleted() {
    let ctx = PreparedContext::new().await.start().await;
    let record = ctx.seed("shop", StoreStatus::Deleting).await;

    ctx.runtime.worker().submit(Task::Delete { store_id: record.id.clone() });

    let deleted = ctx.wait_for_status(&record.id, StoreStatus::Deleted, Duration::from_secs(5)).await;
    assert_eq!(deleted.store_url, None);

    let uninstalls = ctx.helm.uninstalls().await;
    assert_eq!(uninstalls, vec![(record.helm_release.clone(), record.namespace.clone())]);
    assert_eq!(ctx.probe.deleted_namespaces().await, vec![record.namespace.clone()]);

    ctx.shutdown().await;
}

#[tokio::test]
async fn stubborn_uninstall_leaves_record_deleting() {
    let mut config = common::test_config();
    config.provisioning_timeout = Duration::from_millis(200);
    let ctx = PreparedContext::with_config(config).await.start().await;
    ctx.helm.fail_uninstalls("connection refused").await;
    let record = ctx.seed("shop", StoreStatus::Deleting).await;

    ctx.runtime.worker().submit(Task::Delete { store_id: record.id.clone() });

    // Retried within the budget, then left alone; never FAILED.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let record_after = ctx.store.get(&record.id).await.unwrap();
    assert_eq!(record_after.status, StoreStatus::Deleting);
    assert!(ctx.helm.uninstalls().await.len() >= 2, "uninstall should have been retried");
    assert!(ctx.probe.deleted_namespaces().await.is_empty());

    ctx.shutdown().await;
}

#[tokio::test]
async fn concurrent_installs_respect_the_pool_ceiling() {
    let mut config = common::test_config();
    config.provisioning_max_workers = 2;
    let ctx = PreparedContext::with_config(config).await.start().await;
    ctx.helm.set_install_delay(Duration::from_millis(100)).await;
    ctx.probe.make_ready("shop.localhost").await;

    let mut ids = Vec::new();
    for i in 0..5 {
        let record = ctx.seed(&format!("shop-{i}"), StoreStatus::Provisioning).await;
        ids.push(record.id);
    }

    for id in &ids {
        ctx.runtime.worker().submit(Task::Install { store_id: id.clone() });
    }
    for id in &ids {
        ctx.wait_for_status(id, StoreStatus::Ready, Duration::from_secs(10)).await;
    }

    assert_eq!(ctx.helm.install_count().await, 5);
    let peak = ctx.helm.peak_concurrent_installs();
    assert!(peak <= 2, "peak concurrent installs was {peak}");

    ctx.shutdown().await;
}
