use anyhow::Context;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use moviemeter_recs::{
    config::Config,
    db::{
        create_pool, create_redis_client, run_migrations, Cache, CacheKey, PgLikeSource,
        PgRecommendationStore,
    },
    services::{PipelineSettings, RecommendationPipeline, RunOutcome, TmdbProvider},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    let settings = PipelineSettings::from_config(&config)?;

    let pool = create_pool(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    run_migrations(&pool).await?;

    let source = PgLikeSource::new(pool.clone());
    let store = PgRecommendationStore::new(pool);
    let catalog = TmdbProvider::new(
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        Duration::from_secs(config.tmdb_request_timeout_secs),
    )?
    .with_auth(config.tmdb_auth()?)
    .with_max_in_flight(config.tmdb_max_concurrent_requests);

    tracing::info!(
        only_user = ?settings.only_user,
        factors = settings.model.factors,
        epochs = settings.model.epochs,
        batch_size = settings.batch_size,
        "Starting recommendation update"
    );

    let outcome = RecommendationPipeline::new(&settings, &source, &catalog, &store)
        .run()
        .await
        .context("Recommendation update failed")?;

    match outcome {
        RunOutcome::NothingToRecommend => {
            tracing::info!("Nothing to update");
        }
        RunOutcome::Completed(summary) => {
            tracing::info!(
                users = summary.user_ids.len(),
                interactions = summary.interactions,
                pool_size = summary.pool_size,
                skipped_pages = summary.skipped_pages,
                recommendations = summary.recommendations,
                batches = summary.batches,
                stale_deleted = summary.stale_deleted,
                elapsed_ms = summary.elapsed_ms,
                "Recommendation update complete"
            );

            if summary.recommendations > 0 {
                invalidate_served_lists(&config.redis_url, &summary.user_ids).await;
            }

            if summary.catalog_unavailable() {
                anyhow::bail!(
                    "Every catalog page failed ({} skipped); check TMDB_API_KEY and TMDB_AUTH",
                    summary.skipped_pages
                );
            }
        }
    }

    Ok(())
}

/// Drops cached API responses for rewritten users; redis being down is not fatal
async fn invalidate_served_lists(redis_url: &str, user_ids: &[String]) {
    let client = match create_redis_client(redis_url) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping cache invalidation");
            return;
        }
    };

    let (cache, handle) = Cache::new(client).await;
    let keys: Vec<CacheKey> = user_ids
        .iter()
        .cloned()
        .map(CacheKey::UserRecommendations)
        .collect();

    match cache.invalidate(&keys).await {
        Ok(removed) => tracing::info!(removed, "Invalidated cached recommendation lists"),
        Err(e) => tracing::warn!(error = %e, "Failed to invalidate cached recommendation lists"),
    }

    handle.shutdown().await;
}
