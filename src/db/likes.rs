use sqlx::{types::Json, PgPool};

use crate::{error::AppResult, models::RawLike};

/// Optional narrowing of the like query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LikeFilter {
    pub user_id: Option<String>,
}

/// Read-only source of raw like events
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InteractionSource: Send + Sync {
    /// Returns every like record matching the filter, in no particular order
    async fn fetch_likes(&self, filter: &LikeFilter) -> AppResult<Vec<RawLike>>;
}

/// `liked_movies` table owned by the web application
///
/// Rows are read as JSON so the column types (uuid, int, text) and the
/// presence of a `rating` column do not have to be known up front.
#[derive(Clone)]
pub struct PgLikeSource {
    pool: PgPool,
}

impl PgLikeSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InteractionSource for PgLikeSource {
    async fn fetch_likes(&self, filter: &LikeFilter) -> AppResult<Vec<RawLike>> {
        let rows: Vec<Json<serde_json::Value>> = sqlx::query_scalar(
            r#"
            SELECT to_jsonb(l) AS row
            FROM liked_movies l
            WHERE $1::text IS NULL OR l.user_id::text = $1
            "#,
        )
        .bind(filter.user_id.as_deref())
        .fetch_all(&self.pool)
        .await?;

        let total = rows.len();
        let likes: Vec<RawLike> = rows
            .into_iter()
            .filter_map(|Json(row)| match serde_json::from_value::<RawLike>(row) {
                Ok(like) => Some(like),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed like record");
                    None
                }
            })
            .collect();

        tracing::debug!(rows = total, parsed = likes.len(), "Fetched liked_movies");

        Ok(likes)
    }
}
