use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use keeper_core::{BackupId, BackupType};

use crate::app::errors;
use crate::app::routes::stream;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_backup))
        .route("/active", get(list_active))
        .route("/history", get(list_history))
        .route("/stats", get(get_stats))
        .route("/:id/progress", get(get_progress))
        .route("/:id/restore", post(restore_backup))
        .route("/:id/stream", get(stream::stream_progress))
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    /// Backup kind; defaults to `manual`.
    #[serde(rename = "type")]
    pub backup_type: Option<String>,
}

pub async fn create_backup(
    Extension(services): Extension<Arc<AppServices>>,
    body: Option<Json<CreateBackupRequest>>,
) -> axum::response::Response {
    let raw = body
        .and_then(|Json(req)| req.backup_type)
        .unwrap_or_else(|| "manual".to_string());
    let backup_type: BackupType = match raw.parse() {
        Ok(t) => t,
        Err(e) => return errors::backup_error_to_response(e),
    };

    match services.orchestrator().create(backup_type).await {
        Ok(meta) => (StatusCode::CREATED, Json(meta)).into_response(),
        Err(e) => errors::backup_error_to_response(e),
    }
}

pub async fn list_active(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    Json(services.orchestrator().registry().active()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /api/backups/history?limit=N — catalog records, newest first.
pub async fn list_history(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<HistoryQuery>,
) -> axum::response::Response {
    let mut records = services.orchestrator().history().all();
    if let Some(limit) = query.limit {
        records.truncate(limit);
    }
    Json(records).into_response()
}

pub async fn get_stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    Json(services.stats()).into_response()
}

/// Progress of an in-flight job. Terminated jobs leave the registry, so a
/// finished id answers 404 here; its record lives in the history catalog.
pub async fn get_progress(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: BackupId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid backup id");
        }
    };
    match services.orchestrator().registry().get(id) {
        Some(progress) => Json(progress).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no active job with that id"),
    }
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub target: Option<PathBuf>,
}

pub async fn restore_backup(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Option<Json<RestoreRequest>>,
) -> axum::response::Response {
    let id: BackupId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid backup id");
        }
    };
    let target = body.and_then(|Json(req)| req.target);

    match services.restore_engine().restore(id, target).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::backup_error_to_response(e),
    }
}
