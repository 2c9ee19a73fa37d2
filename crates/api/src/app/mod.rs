//! Application assembly: services plus router.

pub mod errors;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{Extension, Router};

use keeper_core::{BackupConfig, BackupResult};

use self::services::AppServices;

/// Build the HTTP app and its backing services from a validated config.
///
/// The caller owns the services handle: `services.start()` registers the
/// recurring triggers, `services.stop()` cancels them.
pub fn build_app(config: BackupConfig) -> BackupResult<(Router, Arc<AppServices>)> {
    let services = Arc::new(AppServices::new(config)?);
    let app = routes::router().layer(Extension(Arc::clone(&services)));
    Ok((app, services))
}
