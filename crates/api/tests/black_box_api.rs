use std::fs;
use std::path::Path;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use keeper_api::app::services::AppServices;
use keeper_core::{BackupConfig, BackupId};

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    /// Build the app (same router as prod) over a temp source tree and
    /// storage root, bound to an ephemeral port.
    async fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let source = dir.path().join("source");
        sample_source(&source);

        let config = BackupConfig {
            sources: vec![source],
            storage_root: dir.path().join("backups"),
            ..BackupConfig::default()
        };

        let (app, services) =
            keeper_api::app::build_app(config).expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            handle,
            _dir: dir,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn sample_source(root: &Path) {
    for d in 0..2 {
        let dir = root.join(format!("dir{d}"));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..3 {
            fs::write(dir.join(format!("file{f}.txt")), format!("payload {d}/{f}")).unwrap();
        }
    }
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn manual_backup_lifecycle_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/backups", srv.base_url))
        .json(&json!({ "type": "manual" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let meta: serde_json::Value = res.json().await.unwrap();
    assert_eq!(meta["status"], "completed");
    assert_eq!(meta["backup_type"], "manual");
    assert_eq!(meta["file_count"], 6);
    let id = meta["id"].as_str().unwrap().to_string();

    // The job is finished, so its progress entry is gone.
    let res = client
        .get(format!("{}/api/backups/{}/progress", srv.base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // But the catalog holds the record.
    let res = client
        .get(format!("{}/api/backups/history", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let records: serde_json::Value = res.json().await.unwrap();
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["id"].as_str().unwrap(), id);

    let res = client
        .get(format!("{}/api/backups/stats", srv.base_url))
        .send()
        .await
        .unwrap();
    let stats: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stats["total_backups"], 1);
    assert_eq!(stats["success_rate"], 100.0);
}

#[tokio::test]
async fn unknown_backup_type_is_a_bad_request() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/backups", srv.base_url))
        .json(&json!({ "type": "hourly" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_argument");
}

#[tokio::test]
async fn create_conflicts_while_a_job_holds_the_slot() {
    let srv = TestServer::spawn().await;

    // Occupy the single-job slot directly, as a running pipeline would.
    let guard = srv
        .services
        .orchestrator()
        .slot()
        .acquire(BackupId::new())
        .unwrap();

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/api/backups", srv.base_url))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "conflict");

    drop(guard);
    let res = client
        .post(format!("{}/api/backups", srv.base_url))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn restore_round_trips_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/backups", srv.base_url))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let meta: serde_json::Value = res.json().await.unwrap();
    let id = meta["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/api/backups/{}/restore", srv.base_url, id))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["files_restored"], 6);

    // A second restore into the same default target is a conflict.
    let res = client
        .post(format!("{}/api/backups/{}/restore", srv.base_url, id))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Unknown id.
    let res = client
        .post(format!(
            "{}/api/backups/{}/restore",
            srv.base_url,
            BackupId::new()
        ))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_honors_the_limit_parameter() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let res = client
            .post(format!("{}/api/backups", srv.base_url))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = client
        .get(format!("{}/api/backups/history?limit=2", srv.base_url))
        .send()
        .await
        .unwrap();
    let records: serde_json::Value = res.json().await.unwrap();
    assert_eq!(records.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn progress_stream_rejects_unknown_jobs() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!(
            "{}/api/backups/{}/stream",
            srv.base_url,
            BackupId::new()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{}/api/backups/not-a-uuid/stream", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
