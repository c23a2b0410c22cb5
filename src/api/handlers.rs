use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    cached,
    db::{Cache, CacheKey, RecommendationReader},
    error::{AppError, AppResult},
    models::Recommendation,
};

use super::AppState;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

// Request/Response types

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationsQuery {
    pub limit: Option<usize>,
}

impl RecommendationsQuery {
    /// Requested list length; 0 is rejected and anything above the max is capped
    pub fn effective_limit(&self) -> AppResult<usize> {
        match self.limit {
            Some(0) => Err(AppError::InvalidInput(
                "limit must be greater than zero".to_string(),
            )),
            Some(limit) => Ok(limit.min(MAX_LIMIT)),
            None => Ok(DEFAULT_LIMIT),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationsResponse {
    pub user_id: String,
    pub count: usize,
    pub recommendations: Vec<Recommendation>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Stored recommendations for one user, best first
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<RecommendationsQuery>,
) -> AppResult<Json<RecommendationsResponse>> {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(AppError::InvalidInput("user id cannot be empty".to_string()));
    }
    let limit = query.effective_limit()?;

    let mut recommendations = match &state.cache {
        Some(cache) => {
            match cached_list(cache, state.reader.as_ref(), &user_id, state.cache_ttl).await {
                Err(AppError::Cache(e)) => {
                    tracing::warn!(error = %e, user_id = %user_id, "Cache unavailable, reading from store");
                    stored_list(state.reader.as_ref(), &user_id).await?
                }
                other => other?,
            }
        }
        None => stored_list(state.reader.as_ref(), &user_id).await?,
    };
    recommendations.truncate(limit);

    Ok(Json(RecommendationsResponse {
        user_id,
        count: recommendations.len(),
        recommendations,
    }))
}

/// The longest list any request may ask for, straight from the store
async fn stored_list(
    reader: &dyn RecommendationReader,
    user_id: &str,
) -> AppResult<Vec<Recommendation>> {
    reader.recommendations_for(user_id, MAX_LIMIT as i64).await
}

async fn cached_list(
    cache: &Cache,
    reader: &dyn RecommendationReader,
    user_id: &str,
    ttl: u64,
) -> AppResult<Vec<Recommendation>> {
    cached!(
        cache,
        CacheKey::UserRecommendations(user_id.to_string()),
        ttl,
        stored_list(reader, user_id)
    )
}
