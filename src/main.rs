mod aggregate;
mod api;
mod assets;
mod config;
mod db;
mod error;
mod storage;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::ServerConfig;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "event_admin_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load();

    tokio::fs::create_dir_all(config.public_dir.join("uploads"))
        .await
        .expect("Failed to create public directory");

    let db = db::init_database(&config.db_path)
        .await
        .expect("Failed to initialize database");
    tracing::info!("Database initialized at {:?}", config.db_path);

    if let Some(bootstrap) = &config.bootstrap_merchant {
        api::ensure_merchant(&db, bootstrap)
            .await
            .expect("Failed to create bootstrap merchant");
    }

    let bind_addr = config.bind_addr;
    let public_dir = config.public_dir.clone();
    let state = Arc::new(AppState::new(config, db).expect("Failed to create application state"));
    let app = api::router(state);

    tracing::info!("Event admin server starting on http://{}", bind_addr);
    tracing::info!("Serving uploads from {:?}", public_dir.join("uploads"));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}
