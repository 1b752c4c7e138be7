//! Market slug task tests

use std::os::unix::fs::MetadataExt;
use std::sync::atomic::Ordering;

use tokio_test::{assert_err, assert_ok};

use paas_builder::errors::BuilderError;
use paas_builder::event::EventLevel;
use paas_builder::exector::{MarketSlugItem, StepOutcome, TaskItem, TransferMode};

use crate::common::{remote_slug_body, slug_body, to_bytes, Harness, REMOTE_BYTES};

#[tokio::test]
async fn test_local_slug_end_to_end() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    let src = h.write_source("a.tgz", b"slug-bytes");

    let item = MarketSlugItem::new(
        &to_bytes(&slug_body("ev-1", src.to_str().unwrap())),
        &h.deps(),
    )
    .unwrap();
    assert_eq!(item.transfer_mode(), TransferMode::Local);
    assert_ok!(item.run().await);

    let dst = h.slug_path("t1", "s1", "v1");
    assert!(dst.ends_with("build/tenant/t1/slug/s1/v1.tgz"));
    assert_eq!(std::fs::read(&dst).unwrap(), b"slug-bytes");
    assert_eq!(std::fs::metadata(&dst).unwrap().uid(), h.owner.uid);

    let record = h.versions.get("s1", "v1").unwrap();
    assert_eq!(record.delivered_type, "slug");
    assert_eq!(record.delivered_path, dst.display().to_string());
    assert_eq!(record.final_status, "success");
    assert_eq!(record.event_id, "ev-1");
    assert_eq!(record.build_version, "build-1");

    let calls = h.trigger.calls();
    assert_eq!(calls.len(), 1);
    let (tenant_name, service_alias, request) = &calls[0];
    assert_eq!(tenant_name, "team-a");
    assert_eq!(service_alias, "gr5f1d");
    assert_eq!(request.current_deploy_version, "v1");
    assert_eq!(request.new_deploy_version, "v1");
    assert_eq!(request.event_id, "ev-1");

    let entries = h.events.entries("ev-1");
    assert!(entries.iter().all(|e| e.level == EventLevel::Info));
    assert!(entries
        .iter()
        .any(|e| e.tags.step == "build-code" && e.tags.status.as_deref() == Some("success")));
    assert_eq!(entries.last().unwrap().tags.step, "build-exector");
}

#[tokio::test]
async fn test_local_copy_failure_is_suppressed() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    let missing = h.root.join("market/missing.tgz");

    let item = MarketSlugItem::new(
        &to_bytes(&slug_body("ev-2", missing.to_str().unwrap())),
        &h.deps(),
    )
    .unwrap();

    let outcome = item.execute().await;
    assert!(matches!(
        outcome,
        StepOutcome::Suppressed(BuilderError::ArtifactUnavailable(_))
    ));
    assert_ok!(item.run().await);

    let failures = h.failures("ev-2", "callback");
    assert!(!failures.is_empty());
    assert_eq!(failures[0].level, EventLevel::Error);

    assert_eq!(h.versions.updates.load(Ordering::SeqCst), 0);
    assert!(h.versions.get("s1", "v1").unwrap().final_status.is_empty());
    assert!(h.trigger.calls().is_empty());
    assert!(!h.slug_path("t1", "s1", "v1").exists());
}

#[tokio::test]
async fn test_remote_transfer_selected_when_host_and_port_set() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");

    let item = MarketSlugItem::new(
        &to_bytes(&remote_slug_body("ev-3", "/market/app/v1.tgz")),
        &h.deps(),
    )
    .unwrap();
    assert_eq!(item.transfer_mode(), TransferMode::Remote);
    assert_ok!(item.run().await);

    assert_eq!(h.remote.connects.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.remote.last_host.lock().unwrap().as_deref(),
        Some("ftp.market.local")
    );
    assert_eq!(
        h.remote.downloads.lock().unwrap().clone(),
        vec!["/market/app/v1.tgz".to_string()]
    );
    assert_eq!(h.remote.closes(), 1);
    assert_eq!(
        std::fs::read(h.slug_path("t1", "s1", "v1")).unwrap(),
        REMOTE_BYTES
    );
    assert_eq!(h.versions.get("s1", "v1").unwrap().final_status, "success");
    assert_eq!(h.trigger.calls().len(), 1);
}

#[tokio::test]
async fn test_remote_download_failure_releases_session() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    h.remote.fail_download();

    let item = MarketSlugItem::new(
        &to_bytes(&remote_slug_body("ev-4", "/market/app/v1.tgz")),
        &h.deps(),
    )
    .unwrap();
    assert_ok!(item.run().await);

    assert_eq!(h.remote.closes(), 1);
    assert_eq!(h.failures("ev-4", "callback").len(), 1);
    assert_eq!(h.versions.updates.load(Ordering::SeqCst), 0);
    assert!(h.trigger.calls().is_empty());
}

#[tokio::test]
async fn test_remote_connect_failure_is_suppressed() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    h.remote.fail_connect();

    let item = MarketSlugItem::new(
        &to_bytes(&remote_slug_body("ev-5", "/market/app/v1.tgz")),
        &h.deps(),
    )
    .unwrap();
    assert!(matches!(
        item.execute().await,
        StepOutcome::Suppressed(BuilderError::ArtifactUnavailable(_))
    ));

    assert_eq!(h.failures("ev-5", "slug-share").len(), 1);
    assert_eq!(h.remote.closes(), 0);
    assert!(h.trigger.calls().is_empty());
}

#[tokio::test]
async fn test_permission_fixup_failure_is_suppressed() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    // The download "succeeds" but leaves nothing to chown.
    h.remote.skip_write();

    let item = MarketSlugItem::new(
        &to_bytes(&remote_slug_body("ev-6", "/market/app/v1.tgz")),
        &h.deps(),
    )
    .unwrap();
    assert!(matches!(
        item.execute().await,
        StepOutcome::Suppressed(BuilderError::PermissionFixupFailed(_))
    ));

    assert_eq!(h.failures("ev-6", "callback").len(), 1);
    assert_eq!(h.versions.updates.load(Ordering::SeqCst), 0);
    assert!(h.trigger.calls().is_empty());
}

#[tokio::test]
async fn test_permission_fixup_failure_removes_artifact() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    h.ownership.fail_chown();
    let src = h.write_source("a.tgz", b"slug-bytes");

    let item = MarketSlugItem::new(
        &to_bytes(&slug_body("ev-7", src.to_str().unwrap())),
        &h.deps(),
    )
    .unwrap();
    assert!(matches!(
        item.execute().await,
        StepOutcome::Suppressed(BuilderError::PermissionFixupFailed(_))
    ));
    assert_eq!(h.ownership.calls.load(Ordering::SeqCst), 1);

    assert!(!h.slug_path("t1", "s1", "v1").exists());
    assert_eq!(h.failures("ev-7", "callback").len(), 1);
    assert_eq!(h.versions.updates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_version_persistence_failure_propagates() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    h.versions.fail_updates();
    let src = h.write_source("a.tgz", b"slug-bytes");

    let item = MarketSlugItem::new(
        &to_bytes(&slug_body("ev-8", src.to_str().unwrap())),
        &h.deps(),
    )
    .unwrap();
    let err = assert_err!(item.run().await);

    assert!(matches!(err, BuilderError::VersionPersistenceFailed(_)));
    assert!(h.trigger.calls().is_empty());
    assert_eq!(h.failures("ev-8", "callback").len(), 1);
    // the artifact stays in place
    assert!(h.slug_path("t1", "s1", "v1").exists());
}

#[tokio::test]
async fn test_missing_version_record_propagates() {
    let h = Harness::new();
    let src = h.write_source("a.tgz", b"slug-bytes");

    let item = MarketSlugItem::new(
        &to_bytes(&slug_body("ev-9", src.to_str().unwrap())),
        &h.deps(),
    )
    .unwrap();
    let err = assert_err!(item.run().await);

    assert!(matches!(err, BuilderError::VersionPersistenceFailed(_)));
    assert!(h.trigger.calls().is_empty());
}

#[tokio::test]
async fn test_trigger_failure_propagates_without_rollback() {
    let h = Harness::new();
    h.versions.seed("s1", "v1");
    h.trigger.fail_calls();
    let src = h.write_source("a.tgz", b"slug-bytes");

    let item = MarketSlugItem::new(
        &to_bytes(&slug_body("ev-10", src.to_str().unwrap())),
        &h.deps(),
    )
    .unwrap();
    let err = assert_err!(item.run().await);

    assert!(matches!(err, BuilderError::DeploymentTriggerFailed(_)));
    assert_eq!(h.trigger.calls().len(), 1);

    let record = h.versions.get("s1", "v1").unwrap();
    assert_eq!(record.final_status, "success");
    assert_eq!(record.delivered_type, "slug");

    let entries = h.events.entries("ev-10");
    let last = entries.last().unwrap();
    assert_eq!(last.level, EventLevel::Error);
    assert_eq!(last.tags.step, "callback");
}
