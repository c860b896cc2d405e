// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Crash-recovery tests: reconciliation of persisted intent against
//! cluster reality on process start.

mod common;

use std::time::Duration;

use common::PreparedContext;
use storeplane_core::model::StoreStatus;

#[tokio::test]
async fn provisioning_with_existing_release_resumes_without_reinstall() {
    let prep = PreparedContext::new().await;
    let record = prep.seed("shop", StoreStatus::Provisioning).await;

    // The previous process got through `helm install` before dying.
    prep.helm.set_release_exists(true);
    prep.probe.make_ready("shop.localhost").await;

    let ctx = prep.start().await;

    let ready = ctx.wait_for_status(&record.id, StoreStatus::Ready, Duration::from_secs(5)).await;
    assert_eq!(ready.store_url.as_deref(), Some("http://shop.localhost"));

    // The whole point: recovery entered polling without a second install.
    assert_eq!(ctx.helm.install_count().await, 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn provisioning_without_release_restarts_the_install() {
    let prep = PreparedContext::new().await;
    let record = prep.seed("shop", StoreStatus::Provisioning).await;
    prep.probe.make_ready("shop.localhost").await;

    let ctx = prep.start().await;

    ctx.wait_for_status(&record.id, StoreStatus::Ready, Duration::from_secs(5)).await;
    assert_eq!(ctx.helm.install_count().await, 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn deleting_records_are_reenqueued_unconditionally() {
    let prep = PreparedContext::new().await;
    let record = prep.seed("shop", StoreStatus::Deleting).await;

    let ctx = prep.start().await;

    ctx.wait_for_status(&record.id, StoreStatus::Deleted, Duration::from_secs(5)).await;
    assert_eq!(ctx.helm.uninstalls().await.len(), 1);

    ctx.shutdown().await;
}

#[tokio::test]
async fn recovery_defers_when_the_executor_is_unreachable() {
    let prep = PreparedContext::new().await;
    let record = prep.seed("shop", StoreStatus::Provisioning).await;
    prep.helm.set_exists_error(true);

    let ctx = prep.start().await;

    // Cluster connectivity is not a store-level failure: nothing was
    // submitted and nothing was marked FAILED.
    ctx.assert_status_holds(&record.id, StoreStatus::Provisioning, Duration::from_millis(150))
        .await;
    assert_eq!(ctx.helm.install_count().await, 0);

    // Once the executor answers again the background retry finishes the
    // scan and the store converges.
    ctx.helm.set_exists_error(false);
    ctx.helm.set_release_exists(true);
    ctx.probe.make_ready("shop.localhost").await;

    ctx.wait_for_status(&record.id, StoreStatus::Ready, Duration::from_secs(5)).await;
    assert_eq!(ctx.helm.install_count().await, 0);

    ctx.shutdown().await;
}

#[tokio::test]
async fn repeated_restarts_are_idempotent() {
    let prep = PreparedContext::new().await;
    let record = prep.seed("shop", StoreStatus::Provisioning).await;
    prep.helm.set_release_exists(true);

    // First start: release exists, cluster never becomes ready.
    let ctx = prep.start().await;
    ctx.assert_status_holds(&record.id, StoreStatus::Provisioning, Duration::from_millis(100))
        .await;
    assert!(ctx.probe.pods_calls() > 0, "readiness polling should have started");

    // Kill and restart against the same database, twice.
    let prep = ctx.shutdown().await;
    let ctx = prep.start().await;
    ctx.assert_status_holds(&record.id, StoreStatus::Provisioning, Duration::from_millis(100))
        .await;

    let prep = ctx.shutdown().await;
    prep.probe.make_ready("shop.localhost").await;
    let ctx = prep.start().await;

    let ready = ctx.wait_for_status(&record.id, StoreStatus::Ready, Duration::from_secs(5)).await;
    assert_eq!(ready.store_url.as_deref(), Some("http://shop.localhost"));

    // N starts, zero installs: provisioning is idempotent across crashes.
    assert_eq!(ctx.helm.install_count().await, 0);

    ctx.shutdown().await;
}
