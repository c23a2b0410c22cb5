use std::sync::Arc;

use crate::db::{Cache, RecommendationReader};

/// Seconds a served list stays cached when nothing is configured
pub const DEFAULT_CACHE_TTL: u64 = 300;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub reader: Arc<dyn RecommendationReader>,
    /// Read-through cache for stored lists; served straight from the store when absent
    pub cache: Option<Cache>,
    pub cache_ttl: u64,
}

impl AppState {
    /// State that always reads from the store
    pub fn new(reader: Arc<dyn RecommendationReader>) -> Self {
        Self {
            reader,
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_cache(mut self, cache: Cache, ttl: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }
}
