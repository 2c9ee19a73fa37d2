use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use keeper_core::BackupError;

/// Map the engine error taxonomy onto HTTP statuses.
pub fn backup_error_to_response(err: BackupError) -> axum::response::Response {
    match err {
        BackupError::InvalidArgument(msg) => {
            json_error(StatusCode::BAD_REQUEST, "invalid_argument", msg)
        }
        BackupError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        BackupError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "backup not found"),
        BackupError::VerificationFailure(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "verification_failure", msg)
        }
        e @ BackupError::Io { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "io_error", e.to_string())
        }
        BackupError::Config(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg)
        }
        BackupError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
