/// Movie catalog provider abstraction
///
/// The candidate pool is built from paginated catalog listings. Providers
/// fetch single pages and single items; the batched helpers fan those out
/// over tokio tasks, at most `max_in_flight` requests at a time, and absorb
/// per-request failures so that partial catalog coverage never aborts a run.
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, PageRequest},
};

pub mod tmdb;

pub use tmdb::{TmdbAuth, TmdbProvider};

/// Requests a provider keeps in flight unless it says otherwise
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

async fn acquire(limit: Arc<Semaphore>) -> AppResult<OwnedSemaphorePermit> {
    limit
        .acquire_owned()
        .await
        .map_err(|e| AppError::Internal(format!("Catalog request limiter closed: {}", e)))
}

/// Result of fetching many pages: successes in request order plus what was skipped
#[derive(Debug, Default)]
pub struct PageFetchOutcome {
    pub pages: Vec<(PageRequest, Vec<CatalogItem>)>,
    pub failed: Vec<PageRequest>,
}

/// Trait for movie catalog providers
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch one page of one facet
    async fn fetch_page(&self, request: &PageRequest) -> AppResult<Vec<CatalogItem>>;

    /// Fetch full details for a single item
    async fn fetch_item(&self, item_id: &str) -> AppResult<CatalogItem>;

    /// Fetch many pages in parallel
    ///
    /// Failed or timed-out pages are logged and reported in `failed`; results
    /// are returned in request order regardless of completion order.
    async fn fetch_pages(&self, requests: Vec<PageRequest>) -> PageFetchOutcome {
        let limit = Arc::new(Semaphore::new(self.max_in_flight().max(1)));
        let mut tasks = Vec::new();

        for request in requests {
            let provider = self.clone_for_task();
            let task_request = request.clone();
            let permits = limit.clone();
            let task = tokio::spawn(async move {
                let _permit = acquire(permits).await?;
                provider.fetch_page(&task_request).await
            });
            tasks.push((request, task));
        }

        let mut outcome = PageFetchOutcome::default();

        for (request, task) in tasks {
            match task.await {
                Ok(Ok(items)) => outcome.pages.push((request, items)),
                Ok(Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        page = %request,
                        provider = self.name(),
                        "Catalog page fetch failed, skipping"
                    );
                    outcome.failed.push(request);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %AppError::Internal(e.to_string()),
                        page = %request,
                        "Catalog page task join error, skipping"
                    );
                    outcome.failed.push(request);
                }
            }
        }

        if !outcome.failed.is_empty() {
            tracing::warn!(
                success_count = outcome.pages.len(),
                error_count = outcome.failed.len(),
                "Partial catalog fetch failure"
            );
        }

        outcome
    }

    /// Fetch details for many items in parallel, dropping the ones that fail
    async fn fetch_items(&self, item_ids: Vec<String>) -> Vec<CatalogItem> {
        let limit = Arc::new(Semaphore::new(self.max_in_flight().max(1)));
        let mut tasks = Vec::new();

        for item_id in item_ids {
            let provider = self.clone_for_task();
            let permits = limit.clone();
            let task = tokio::spawn(async move {
                let _permit = acquire(permits).await?;
                provider.fetch_item(&item_id).await
            });
            tasks.push(task);
        }

        let mut items = Vec::new();
        for task in tasks {
            match task.await {
                Ok(Ok(item)) => items.push(item),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, provider = self.name(), "Catalog item lookup failed, skipping");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Catalog item task join error, skipping");
                }
            }
        }

        items
    }

    /// Upper bound on concurrent requests in the batched helpers
    fn max_in_flight(&self) -> usize {
        DEFAULT_MAX_IN_FLIGHT
    }

    /// Clone provider for parallel task execution
    fn clone_for_task(&self) -> Box<dyn CatalogProvider>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
