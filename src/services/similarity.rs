use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;

use super::matrix::InteractionMatrix;

/// L2-normalizes each row; zero rows stay zero instead of dividing by zero
pub fn normalize_rows(matrix: &Array2<f64>) -> Array2<f64> {
    let norms: Array1<f64> = matrix.map_axis(Axis(1), |row| {
        let norm = row.dot(&row).sqrt();
        if norm == 0.0 {
            1.0
        } else {
            norm
        }
    });
    matrix / &norms.insert_axis(Axis(1))
}

/// All-pairs cosine similarity between rows
pub fn cosine_similarity(matrix: &Array2<f64>) -> Array2<f64> {
    let normalized = normalize_rows(matrix);
    normalized.dot(&normalized.t())
}

/// User-neighborhood collaborative scores over the items in the matrix
#[derive(Debug, Clone)]
pub struct NeighborhoodScores {
    user_index: HashMap<String, usize>,
    item_index: HashMap<String, usize>,
    similarity: Array2<f64>,
    /// similarity x raw ratings
    weighted: Array2<f64>,
    /// Total absolute similarity per user
    mass: Array1<f64>,
}

impl NeighborhoodScores {
    pub fn compute(matrix: &InteractionMatrix) -> Self {
        let ratings = matrix.ratings();
        let similarity = cosine_similarity(ratings);
        let weighted = similarity.dot(ratings);
        let mass = similarity.map_axis(Axis(1), |row| row.iter().map(|s| s.abs()).sum());

        tracing::debug!(
            users = matrix.users().len(),
            items = matrix.items().len(),
            "Computed user similarity"
        );

        Self {
            user_index: matrix
                .users()
                .iter()
                .enumerate()
                .map(|(i, u)| (u.clone(), i))
                .collect(),
            item_index: matrix
                .items()
                .iter()
                .enumerate()
                .map(|(i, u)| (u.clone(), i))
                .collect(),
            similarity,
            weighted,
            mass,
        }
    }

    pub fn similarity(&self, user_a: &str, user_b: &str) -> Option<f64> {
        let a = *self.user_index.get(user_a)?;
        let b = *self.user_index.get(user_b)?;
        Some(self.similarity[[a, b]])
    }

    /// Raw weighted score; items outside the matrix get the mean of the user's row
    pub fn weighted_score(&self, user_id: &str, item_id: &str) -> Option<f64> {
        let row = *self.user_index.get(user_id)?;
        let scores = self.weighted.row(row);
        Some(match self.item_index.get(item_id) {
            Some(&col) => scores[col],
            None => scores.mean().unwrap_or(0.0),
        })
    }

    /// Weighted score divided by the user's similarity mass, on the rating scale
    ///
    /// Unknown users get 0; items outside the matrix get the row mean.
    pub fn estimate(&self, user_id: &str, item_id: &str) -> f64 {
        let Some(&row) = self.user_index.get(user_id) else {
            return 0.0;
        };
        let mass = self.mass[row];
        if mass == 0.0 {
            return 0.0;
        }
        self.weighted_score(user_id, item_id).unwrap_or(0.0) / mass
    }
}
