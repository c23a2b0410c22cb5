use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

use super::candidate_pool::CandidatePool;
use super::interactions::InteractionTable;
use super::latent_factor::LatentFactorModel;
use super::similarity::NeighborhoodScores;
use crate::error::{AppError, AppResult};
use crate::models::{CatalogItem, Recommendation};

/// Weights of the composite score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub latent: f64,
    pub genre: f64,
    pub rating: f64,
    pub similarity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            latent: 1.0,
            genre: 2.0,
            rating: 0.5,
            similarity: 0.5,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> AppResult<()> {
        let all = [
            ("WEIGHT_LATENT", self.latent),
            ("WEIGHT_GENRE", self.genre),
            ("WEIGHT_RATING", self.rating),
            ("WEIGHT_SIMILARITY", self.similarity),
        ];
        for (name, weight) in all {
            if !weight.is_finite() || weight < 0.0 {
                return Err(AppError::Configuration(format!(
                    "{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        Ok(())
    }
}

/// Share of the user's liked genres that the candidate carries, 0 without history
pub fn genre_overlap(user_genres: &BTreeSet<String>, candidate_genres: &BTreeSet<String>) -> f64 {
    if user_genres.is_empty() {
        return 0.0;
    }
    let shared = user_genres.intersection(candidate_genres).count();
    shared as f64 / user_genres.len() as f64
}

/// Scores and ranks unseen pool items for every user
pub struct HybridScorer<'a> {
    model: &'a LatentFactorModel,
    neighborhood: &'a NeighborhoodScores,
    liked_genres: &'a HashMap<String, BTreeSet<String>>,
    weights: ScoreWeights,
    top_k: Option<usize>,
}

impl<'a> HybridScorer<'a> {
    pub fn new(
        model: &'a LatentFactorModel,
        neighborhood: &'a NeighborhoodScores,
        liked_genres: &'a HashMap<String, BTreeSet<String>>,
        weights: ScoreWeights,
        top_k: Option<usize>,
    ) -> Self {
        Self {
            model,
            neighborhood,
            liked_genres,
            weights,
            top_k,
        }
    }

    /// Weighted sum of every enabled signal
    pub fn composite(&self, user_id: &str, item: &CatalogItem, user_genres: &BTreeSet<String>) -> f64 {
        let mut score = self.weights.rating * item.normalized_rating()
            + self.weights.genre * genre_overlap(user_genres, &item.genres);

        if self.weights.latent > 0.0 {
            score += self.weights.latent * self.model.predict(user_id, &item.item_id);
        }
        if self.weights.similarity > 0.0 {
            score += self.weights.similarity * self.neighborhood.estimate(user_id, &item.item_id);
        }

        score
    }

    /// Ranked recommendations for one user, liked items excluded
    pub fn rank_for_user(
        &self,
        user_id: &str,
        table: &InteractionTable,
        pool: &CandidatePool,
        generated_at: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let empty = BTreeSet::new();
        let user_genres = self.liked_genres.get(user_id).unwrap_or(&empty);

        let mut scored: Vec<(f64, &CatalogItem)> = pool
            .iter()
            .filter(|item| !table.has_liked(user_id, &item.item_id))
            .map(|item| (self.composite(user_id, item, user_genres), item))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        if let Some(k) = self.top_k {
            scored.truncate(k);
        }

        scored
            .into_iter()
            .map(|(score, item)| Recommendation::new(user_id, item, score, generated_at))
            .collect()
    }

    /// Ranked recommendations for every user, concatenated in user order
    pub fn rank_all(
        &self,
        table: &InteractionTable,
        pool: &CandidatePool,
        generated_at: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        self.rank_users(table.users(), table, pool, generated_at)
    }

    /// Ranked recommendations for the given users only, in the order given
    pub fn rank_users(
        &self,
        users: &[String],
        table: &InteractionTable,
        pool: &CandidatePool,
        generated_at: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let per_user: Vec<Vec<Recommendation>> = users
            .par_iter()
            .map(|user_id| self.rank_for_user(user_id, table, pool, generated_at))
            .collect();

        per_user.into_iter().flatten().collect()
    }
}
