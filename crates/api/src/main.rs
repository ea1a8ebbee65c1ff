use std::sync::Arc;

use trellis_api::app::{self, services::AppServices};
use trellis_api::config::AppConfig;
use trellis_infra::StorageAdapter;
use trellis_infra::adapter::{InMemoryAdapter, PgAdapter, PgAdapterConfig};

#[tokio::main]
async fn main() {
    trellis_observability::init();

    let config = AppConfig::from_env().expect("invalid configuration");

    match config.database_url.clone() {
        Some(url) => {
            let adapter = PgAdapter::new(
                PgAdapterConfig::new(url).with_max_connections(config.db_max_connections),
            );
            serve(adapter, config).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory adapter");
            serve(InMemoryAdapter::new(), config).await;
        }
    }
}

async fn serve<A: StorageAdapter>(adapter: A, config: AppConfig) {
    let services = Arc::new(
        AppServices::bootstrap(adapter, &config)
            .await
            .expect("failed to bootstrap services"),
    );

    let app = app::build_app(Arc::clone(&services));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    services.shutdown().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
