use std::path::PathBuf;

use keeper_core::BackupConfig;

#[tokio::main]
async fn main() {
    keeper_observability::init();

    let config_path = std::env::var("KEEPER_CONFIG").unwrap_or_else(|_| {
        tracing::warn!("KEEPER_CONFIG not set; using ./backup.json");
        "backup.json".to_string()
    });
    let config = match BackupConfig::from_file(&PathBuf::from(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_path, error = %e, "cannot load backup config");
            std::process::exit(1);
        }
    };

    let (app, services) = match keeper_api::app::build_app(config) {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(error = %e, "cannot start backup engine");
            std::process::exit(1);
        }
    };
    services.start();

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
