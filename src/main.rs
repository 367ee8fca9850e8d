use std::sync::Arc;

use duet::{AppState, backend::SqliteBackend, config::Config};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SWEEP_EVERY: std::time::Duration = std::time::Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            config.session_idle_minutes,
        )));

    let backend = SqliteBackend::connect(&config.database_url, config.max_connections)
        .await?
        .with_session_ttl(time::Duration::minutes(config.session_idle_minutes));
    backend.spawn_sweeper(SWEEP_EVERY);
    let app_state = AppState {
        backend,
        config: Arc::new(config.clone()),
    };

    let app = duet::router()
        .with_state(app_state)
        .layer(session_layer);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
