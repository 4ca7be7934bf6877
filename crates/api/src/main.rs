//! Push relay server binary entrypoint.

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pushrelay_common::config::AppConfig;

use pushrelay_api::routes::create_router;
use pushrelay_api::state::AppState;

/// Webhook bodies are single rows; anything larger is rejected.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("pushrelay_api=debug,pushrelay_notifier=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting push relay...");

    // Load configuration
    let config = AppConfig::from_env()?;
    if config.service_account.is_none() {
        tracing::warn!("FIREBASE_SERVICE_ACCOUNT is not set; deliveries will fail");
    }
    tracing::info!(
        access_token_cache = config.access_token_cache,
        http_timeout_secs = config.http_timeout_secs,
        "Configuration loaded"
    );

    let addr = config.bind_addr;

    // Build application state
    let state = AppState::from_config(&config)?;

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("Push relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
