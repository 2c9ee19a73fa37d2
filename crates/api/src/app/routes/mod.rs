use axum::{Router, routing::get};

pub mod backups;
pub mod stream;
pub mod system;

/// Router for the full command surface.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/api/backups", backups::router())
}
