//! End-to-end pipeline behavior over real directory trees.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use keeper_core::{
    BackupConfig, BackupError, BackupId, BackupStatus, BackupType, ProgressStage,
};
use keeper_engine::{
    BackupOrchestrator, LogNotifier, Notification, NotificationKind, NotificationPort,
    NotifyError, RestoreEngine,
};
use keeper_events::EventBus;

fn sample_source(root: &Path) -> PathBuf {
    let src = root.join("source");
    for i in 0..10 {
        let path = src.join(format!("dir{}/file{i}.dat", i % 3));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        // ~100 KiB per file, 10 files ≈ 1 MiB total.
        fs::write(&path, vec![(i % 251) as u8; 100 * 1024]).unwrap();
    }
    src
}

fn config(root: &Path, src: &Path) -> BackupConfig {
    BackupConfig {
        sources: vec![src.to_path_buf()],
        storage_root: root.join("backups"),
        ..BackupConfig::default()
    }
}

fn orchestrator(config: BackupConfig) -> Arc<BackupOrchestrator> {
    Arc::new(BackupOrchestrator::new(config, Arc::new(LogNotifier)).unwrap())
}

#[tokio::test]
async fn manual_backup_runs_the_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let orchestrator = orchestrator(config(dir.path(), &src));
    let sub = orchestrator.bus().subscribe();

    let meta = orchestrator.create(BackupType::Manual).await.unwrap();

    assert_eq!(meta.status, BackupStatus::Completed);
    assert!(meta.compressed);
    assert!(meta.checksum.is_some());
    assert_eq!(meta.file_count, 10);
    assert!(meta.size_bytes > 0);
    assert!(meta.location.exists());

    // Stage ordering: preparing → copying → compressing → verifying →
    // completed, with the documented percentage bands.
    let mut events = Vec::new();
    while let Ok(e) = sub.try_recv() {
        events.push(e);
    }
    assert_eq!(events.first().unwrap().stage, ProgressStage::Preparing);
    let last = events.last().unwrap();
    assert_eq!(last.stage, ProgressStage::Completed);
    assert_eq!(last.percent, 100);

    for event in &events {
        match event.stage {
            ProgressStage::Preparing => assert_eq!(event.percent, 0),
            ProgressStage::Copying => assert!(event.percent <= 50),
            ProgressStage::Compressing => {
                assert!((50..=80).contains(&event.percent))
            }
            ProgressStage::Verifying => assert!(event.percent >= 80),
            ProgressStage::Completed => assert_eq!(event.percent, 100),
            ProgressStage::Failed => panic!("unexpected failure event"),
        }
    }

    // Monotonic progress until the terminal event.
    assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));

    // Catalog agrees with the returned metadata.
    let latest = orchestrator
        .history()
        .latest(Some(BackupType::Manual))
        .unwrap();
    assert_eq!(latest.id, meta.id);
    assert_eq!(latest.status, BackupStatus::Completed);

    // Terminated jobs are gone from the registry.
    assert!(orchestrator.registry().get(meta.id).is_none());
    assert!(orchestrator.registry().active().is_empty());
}

#[tokio::test]
async fn second_create_conflicts_while_a_job_is_active() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let orchestrator = orchestrator(config(dir.path(), &src));

    // Occupy the slot the way a running pipeline would.
    let guard = orchestrator.slot().acquire(BackupId::new()).unwrap();

    let err = orchestrator.create(BackupType::Manual).await.unwrap_err();
    assert!(err.is_conflict());
    // The rejected call must leave no trace.
    assert!(orchestrator.history().is_empty());
    assert!(orchestrator.registry().is_empty());

    drop(guard);
    orchestrator.create(BackupType::Manual).await.unwrap();
}

#[tokio::test]
async fn retention_invariant_holds_after_every_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let mut cfg = config(dir.path(), &src);
    cfg.retention.manual = 2;
    let orchestrator = orchestrator(cfg);

    for _ in 0..5 {
        orchestrator.create(BackupType::Manual).await.unwrap();
        assert!(
            orchestrator
                .history()
                .count_by_type(BackupType::Manual, BackupStatus::Completed)
                <= 2
        );
    }

    // Only the surviving artifacts remain on disk.
    for meta in orchestrator.history().all() {
        assert!(meta.location.exists());
    }
}

#[tokio::test]
async fn restore_is_idempotent_across_targets() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let orchestrator = orchestrator(config(dir.path(), &src));
    let meta = orchestrator.create(BackupType::Manual).await.unwrap();

    let restore = RestoreEngine::new(
        Arc::clone(orchestrator.history()),
        dir.path().join("restore"),
    );
    let a = dir.path().join("restore-a");
    let b = dir.path().join("restore-b");
    let report_a = restore.restore(meta.id, Some(a.clone())).await.unwrap();
    let report_b = restore.restore(meta.id, Some(b.clone())).await.unwrap();

    assert_eq!(report_a.files_restored, 10);
    assert_eq!(report_b.files_restored, 10);

    // Byte-identical trees.
    for i in 0..10 {
        let rel = format!("source/dir{}/file{i}.dat", i % 3);
        assert_eq!(
            fs::read(a.join(&rel)).unwrap(),
            fs::read(b.join(&rel)).unwrap(),
            "{rel} differs between restores"
        );
    }
}

#[tokio::test]
async fn corrupted_artifact_fails_restore_verification() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let orchestrator = orchestrator(config(dir.path(), &src));
    let meta = orchestrator.create(BackupType::Manual).await.unwrap();
    assert!(meta.checksum.is_some());

    // Flip bytes in the stored artifact after the fact.
    let mut raw = fs::read(&meta.location).unwrap();
    let mid = raw.len() / 2;
    for b in &mut raw[mid..mid + 4] {
        *b ^= 0xff;
    }
    fs::write(&meta.location, raw).unwrap();

    let restore = RestoreEngine::new(
        Arc::clone(orchestrator.history()),
        dir.path().join("restore"),
    );
    let err = restore.restore(meta.id, None).await.unwrap_err();
    assert!(matches!(err, BackupError::VerificationFailure(_)));
    // Nothing was written to the default target.
    assert!(!dir.path().join("restore").join(meta.id.to_string()).exists());
}

#[tokio::test]
async fn restore_refuses_occupied_target_and_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let orchestrator = orchestrator(config(dir.path(), &src));
    let meta = orchestrator.create(BackupType::Manual).await.unwrap();

    let restore = RestoreEngine::new(
        Arc::clone(orchestrator.history()),
        dir.path().join("restore"),
    );

    let occupied = dir.path().join("occupied");
    fs::create_dir_all(&occupied).unwrap();
    fs::write(occupied.join("keep.txt"), b"precious").unwrap();
    let err = restore
        .restore(meta.id, Some(occupied.clone()))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(fs::read(occupied.join("keep.txt")).unwrap(), b"precious");

    let err = restore.restore(BackupId::new(), None).await.unwrap_err();
    assert!(matches!(err, BackupError::NotFound));
}

#[tokio::test]
async fn uncompressed_backup_restores_by_copy() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let mut cfg = config(dir.path(), &src);
    cfg.compression.enabled = false;
    let orchestrator = orchestrator(cfg);

    let meta = orchestrator.create(BackupType::Manual).await.unwrap();
    assert!(!meta.compressed);
    assert!(meta.location.is_dir());
    assert!(meta.checksum.is_some());

    let restore = RestoreEngine::new(
        Arc::clone(orchestrator.history()),
        dir.path().join("restore"),
    );
    let report = restore.restore(meta.id, None).await.unwrap();
    assert_eq!(report.files_restored, 10);
}

#[tokio::test]
async fn failed_stage_records_failure_and_frees_the_slot() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let mut cfg = config(dir.path(), &src);
    // A vanished source makes the analyze stage fail before any data moves.
    cfg.sources = vec![dir.path().join("does-not-exist")];
    let orchestrator = Arc::new(
        BackupOrchestrator::new(cfg, Arc::new(LogNotifier)).unwrap(),
    );
    let sub = orchestrator.bus().subscribe();

    let err = orchestrator.create(BackupType::Daily).await.unwrap_err();
    assert!(matches!(err, BackupError::Io { stage: "analyze", .. }));

    let failed = orchestrator.history().latest(Some(BackupType::Daily)).unwrap();
    assert_eq!(failed.status, BackupStatus::Failed);
    assert!(!failed.error.as_deref().unwrap_or("").is_empty());

    // Subscribers got a terminal failed event.
    let mut last = None;
    while let Ok(e) = sub.try_recv() {
        last = Some(e);
    }
    assert_eq!(last.unwrap().stage, ProgressStage::Failed);

    // The slot is free again: a subsequent job over a good source succeeds,
    // which is exactly what the scheduler's next tick needs.
    assert!(orchestrator.registry().is_empty());
    let good = BackupConfig {
        sources: vec![src],
        storage_root: dir.path().join("backups"),
        ..BackupConfig::default()
    };
    let orchestrator = Arc::new(
        BackupOrchestrator::new(good, Arc::new(LogNotifier)).unwrap(),
    );
    orchestrator.create(BackupType::Daily).await.unwrap();
}

#[tokio::test]
async fn catalog_append_failure_still_terminates_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let cfg = config(dir.path(), &src);
    let storage_root = cfg.storage_root.clone();
    let orchestrator = orchestrator(cfg);
    let sub = orchestrator.bus().subscribe();

    // Squat a directory where the catalog file goes, so the post-pipeline
    // append fails even though the backup itself succeeds.
    fs::create_dir_all(storage_root.join("history.jsonl")).unwrap();

    let err = orchestrator.create(BackupType::Manual).await.unwrap_err();
    assert!(matches!(err, BackupError::Storage(_)));

    // The job still terminates: no phantom entry in the registry, and
    // subscribers got the terminal snapshot.
    assert!(orchestrator.registry().active().is_empty());
    let mut last = None;
    while let Ok(e) = sub.try_recv() {
        last = Some(e);
    }
    assert_eq!(last.unwrap().stage, ProgressStage::Completed);
}

#[tokio::test]
async fn failed_job_leaves_no_partial_artifact() {
    let dir = tempfile::tempdir().unwrap();
    // Two sources with the same directory name collide in staging: the copy
    // counts both files but only one survives, so verification fails after
    // the archive was already written.
    let a = dir.path().join("a/data");
    let b = dir.path().join("b/data");
    for src in [&a, &b] {
        fs::create_dir_all(src).unwrap();
        fs::write(src.join("x.txt"), b"payload").unwrap();
    }
    let cfg = BackupConfig {
        sources: vec![a, b],
        storage_root: dir.path().join("backups"),
        ..BackupConfig::default()
    };
    let storage_root = cfg.storage_root.clone();
    let orchestrator = orchestrator(cfg);

    let err = orchestrator.create(BackupType::Manual).await.unwrap_err();
    assert!(matches!(err, BackupError::VerificationFailure(_)));

    // The half-built artifact is gone; only the catalog remains on disk.
    let leftovers: Vec<_> = fs::read_dir(&storage_root)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(leftovers, vec!["history.jsonl".to_string()]);
    assert_eq!(
        orchestrator.history().latest(Some(BackupType::Manual)).unwrap().status,
        BackupStatus::Failed
    );
}

struct FlakyNotifier {
    calls: AtomicUsize,
}

impl NotificationPort for FlakyNotifier {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError("smtp down".to_string()))
    }
}

#[tokio::test]
async fn notification_failure_never_changes_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let notifier = Arc::new(FlakyNotifier {
        calls: AtomicUsize::new(0),
    });
    let orchestrator = Arc::new(
        BackupOrchestrator::new(config(dir.path(), &src), notifier.clone()).unwrap(),
    );

    let meta = orchestrator.create(BackupType::Manual).await.unwrap();
    assert_eq!(meta.status, BackupStatus::Completed);
    assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        orchestrator.history().get(meta.id).unwrap().status,
        BackupStatus::Completed
    );
}

struct CapturingNotifier {
    kinds: std::sync::Mutex<Vec<NotificationKind>>,
}

impl NotificationPort for CapturingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.kinds.lock().unwrap().push(notification.kind);
        Ok(())
    }
}

#[tokio::test]
async fn notifications_follow_config_toggles() {
    let dir = tempfile::tempdir().unwrap();
    let src = sample_source(dir.path());
    let mut cfg = config(dir.path(), &src);
    cfg.notifications.on_success = false;
    let notifier = Arc::new(CapturingNotifier {
        kinds: std::sync::Mutex::new(Vec::new()),
    });
    let orchestrator =
        Arc::new(BackupOrchestrator::new(cfg, notifier.clone()).unwrap());

    orchestrator.create(BackupType::Manual).await.unwrap();
    assert!(notifier.kinds.lock().unwrap().is_empty());
}
