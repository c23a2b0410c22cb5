use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{error::AppResult, models::Recommendation};

/// Rows older than a run that should be removed once the run is fully written
#[derive(Debug, Clone, PartialEq)]
pub struct StaleScope {
    pub generated_before: DateTime<Utc>,
    /// Limit the cleanup to one user
    pub user_id: Option<String>,
}

/// Write side of the recommendation store
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationSink: Send + Sync {
    /// Inserts or overwrites every record on its (user_id, movie_id) key
    async fn upsert_batch(&self, batch: &[Recommendation]) -> AppResult<u64>;

    /// Deletes rows not rewritten by the current run
    async fn delete_stale(&self, scope: &StaleScope) -> AppResult<u64>;
}

/// Read side of the recommendation store
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationReader: Send + Sync {
    /// Stored recommendations for one user, best first
    async fn recommendations_for(&self, user_id: &str, limit: i64)
        -> AppResult<Vec<Recommendation>>;
}

/// `movie_recommendations` table
#[derive(Clone)]
pub struct PgRecommendationStore {
    pool: PgPool,
}

impl PgRecommendationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecommendationSink for PgRecommendationStore {
    async fn upsert_batch(&self, batch: &[Recommendation]) -> AppResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut user_ids = Vec::with_capacity(batch.len());
        let mut movie_ids = Vec::with_capacity(batch.len());
        let mut titles = Vec::with_capacity(batch.len());
        let mut posters = Vec::with_capacity(batch.len());
        let mut release_dates = Vec::with_capacity(batch.len());
        let mut vote_averages = Vec::with_capacity(batch.len());
        let mut scores = Vec::with_capacity(batch.len());
        let mut generated = Vec::with_capacity(batch.len());

        for rec in batch {
            user_ids.push(rec.user_id.clone());
            movie_ids.push(rec.movie_id.clone());
            titles.push(rec.movie_title.clone());
            posters.push(rec.poster_path.clone());
            release_dates.push(rec.release_date.clone());
            vote_averages.push(rec.vote_average);
            scores.push(rec.score);
            generated.push(rec.generated_at);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO movie_recommendations
                (user_id, movie_id, movie_title, poster_path, release_date,
                 vote_average, score, generated_at)
            SELECT * FROM UNNEST(
                $1::text[], $2::text[], $3::text[], $4::text[], $5::text[],
                $6::float8[], $7::float8[], $8::timestamptz[]
            )
            ON CONFLICT (user_id, movie_id) DO UPDATE SET
                movie_title = EXCLUDED.movie_title,
                poster_path = EXCLUDED.poster_path,
                release_date = EXCLUDED.release_date,
                vote_average = EXCLUDED.vote_average,
                score = EXCLUDED.score,
                generated_at = EXCLUDED.generated_at
            "#,
        )
        .bind(&user_ids)
        .bind(&movie_ids)
        .bind(&titles)
        .bind(&posters)
        .bind(&release_dates)
        .bind(&vote_averages)
        .bind(&scores)
        .bind(&generated)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_stale(&self, scope: &StaleScope) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM movie_recommendations
            WHERE generated_at < $1
              AND ($2::text IS NULL OR user_id = $2)
            "#,
        )
        .bind(scope.generated_before)
        .bind(scope.user_id.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl RecommendationReader for PgRecommendationStore {
    async fn recommendations_for(
        &self,
        user_id: &str,
        limit: i64,
    ) -> AppResult<Vec<Recommendation>> {
        let rows = sqlx::query_as::<_, Recommendation>(
            r#"
            SELECT user_id, movie_id, movie_title, poster_path, release_date,
                   vote_average, score, generated_at
            FROM movie_recommendations
            WHERE user_id = $1
            ORDER BY score DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
