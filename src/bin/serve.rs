use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use moviemeter_recs::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, Cache, PgRecommendationStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    let reader = Arc::new(PgRecommendationStore::new(pool));

    let mut state = AppState::new(reader);
    let mut cache_handle = None;
    match create_redis_client(&config.redis_url) {
        Ok(client) => {
            let (cache, handle) = Cache::new(client).await;
            state = state.with_cache(cache, config.recommendation_cache_ttl);
            cache_handle = Some(handle);
        }
        Err(e) => tracing::warn!(error = %e, "Redis unavailable, serving without a cache"),
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Recommendation API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
