use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CatalogItem;

/// A scored, unseen movie for one user, as stored in `movie_recommendations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recommendation {
    pub user_id: String,
    pub movie_id: String,
    pub movie_title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub score: f64,
    pub generated_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn new(
        user_id: &str,
        item: &CatalogItem,
        score: f64,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            movie_id: item.item_id.clone(),
            movie_title: item.title.clone(),
            poster_path: item.poster_path.clone(),
            release_date: item.release_date.clone(),
            vote_average: item.external_rating,
            score,
            generated_at,
        }
    }

    /// Uniqueness key of a stored row
    pub fn key(&self) -> (&str, &str) {
        (&self.user_id, &self.movie_id)
    }
}
