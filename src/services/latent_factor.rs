use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Instant;

use super::interactions::InteractionTable;
use crate::error::{AppError, AppResult};
use crate::models::{RATING_MAX, RATING_MIN};

/// Fixed hyperparameters of the factorization
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// Latent dimension
    pub factors: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub regularization: f64,
    /// Initial factors are drawn uniformly from `[-init_std, init_std)`
    pub init_std: f64,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            factors: 100,
            epochs: 20,
            learning_rate: 0.005,
            regularization: 0.02,
            init_std: 0.1,
            seed: None,
        }
    }
}

impl ModelParams {
    /// Rejects hyperparameters that would stall training or poison the factors
    pub fn validate(&self) -> AppResult<()> {
        if self.factors == 0 {
            return Err(AppError::Configuration(
                "MODEL_FACTORS must be greater than zero".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(AppError::Configuration(format!(
                "MODEL_LEARNING_RATE must be a positive number, got {}",
                self.learning_rate
            )));
        }
        let non_negative = [
            ("MODEL_REGULARIZATION", self.regularization),
            ("MODEL_INIT_STD", self.init_std),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::Configuration(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Biased matrix factorization trained with stochastic gradient descent
///
/// Predicts `mu + b_u + b_i + p_u . q_i`. Terms for a user or item absent from
/// training are dropped, so unseen ids degrade to bias-level estimates.
/// Initialization is random, so scores vary from run to run unless a seed is set.
#[derive(Debug, Clone)]
pub struct LatentFactorModel {
    global_mean: f64,
    user_index: HashMap<String, usize>,
    item_index: HashMap<String, usize>,
    user_bias: Array1<f64>,
    item_bias: Array1<f64>,
    user_factors: Array2<f64>,
    item_factors: Array2<f64>,
}

impl LatentFactorModel {
    /// Full-batch fit over every interaction
    pub fn train(table: &InteractionTable, params: &ModelParams) -> Self {
        let start = Instant::now();
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut user_index: HashMap<String, usize> = HashMap::new();
        let mut item_index: HashMap<String, usize> = HashMap::new();
        let mut samples: Vec<(usize, usize, f64)> = Vec::with_capacity(table.len());

        for interaction in table.iter() {
            let next_user = user_index.len();
            let u = *user_index
                .entry(interaction.user_id.clone())
                .or_insert(next_user);
            let next_item = item_index.len();
            let i = *item_index
                .entry(interaction.item_id.clone())
                .or_insert(next_item);
            samples.push((u, i, interaction.implicit_rating));
        }

        let global_mean = if samples.is_empty() {
            (RATING_MIN + RATING_MAX) / 2.0
        } else {
            samples.iter().map(|s| s.2).sum::<f64>() / samples.len() as f64
        };

        let k = params.factors;
        let mut model = Self {
            global_mean,
            user_bias: Array1::zeros(user_index.len()),
            item_bias: Array1::zeros(item_index.len()),
            user_factors: init_factors(&mut rng, user_index.len(), k, params.init_std),
            item_factors: init_factors(&mut rng, item_index.len(), k, params.init_std),
            user_index,
            item_index,
        };

        let lr = params.learning_rate;
        let reg = params.regularization;

        for _ in 0..params.epochs {
            samples.shuffle(&mut rng);

            for &(u, i, rating) in &samples {
                let dot = model.user_factors.row(u).dot(&model.item_factors.row(i));
                let err = rating - (model.global_mean + model.user_bias[u] + model.item_bias[i] + dot);

                let bu = model.user_bias[u];
                let bi = model.item_bias[i];
                model.user_bias[u] = bu + lr * (err - reg * bu);
                model.item_bias[i] = bi + lr * (err - reg * bi);

                for f in 0..k {
                    let puf = model.user_factors[[u, f]];
                    let qif = model.item_factors[[i, f]];
                    model.user_factors[[u, f]] += lr * (err * qif - reg * puf);
                    model.item_factors[[i, f]] += lr * (err * puf - reg * qif);
                }
            }
        }

        tracing::info!(
            users = model.user_index.len(),
            items = model.item_index.len(),
            factors = k,
            epochs = params.epochs,
            rmse = model.rmse(table),
            elapsed_ms = start.elapsed().as_millis(),
            "Latent factor model trained"
        );

        model
    }

    /// Estimated rating clipped to the rating scale, never failing
    pub fn predict(&self, user_id: &str, item_id: &str) -> f64 {
        let user = self.user_index.get(user_id).copied();
        let item = self.item_index.get(item_id).copied();

        let mut estimate = self.global_mean;
        if let Some(u) = user {
            estimate += self.user_bias[u];
        }
        if let Some(i) = item {
            estimate += self.item_bias[i];
        }
        if let (Some(u), Some(i)) = (user, item) {
            estimate += self.user_factors.row(u).dot(&self.item_factors.row(i));
        }

        if !estimate.is_finite() {
            return self.global_mean;
        }
        estimate.clamp(RATING_MIN, RATING_MAX)
    }

    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    pub fn knows_user(&self, user_id: &str) -> bool {
        self.user_index.contains_key(user_id)
    }

    pub fn knows_item(&self, item_id: &str) -> bool {
        self.item_index.contains_key(item_id)
    }

    /// Root mean squared error over a table
    pub fn rmse(&self, table: &InteractionTable) -> f64 {
        if table.is_empty() {
            return 0.0;
        }
        let sum: f64 = table
            .iter()
            .map(|i| (i.implicit_rating - self.predict(&i.user_id, &i.item_id)).powi(2))
            .sum();
        (sum / table.len() as f64).sqrt()
    }
}

fn init_factors<R: Rng>(rng: &mut R, rows: usize, k: usize, spread: f64) -> Array2<f64> {
    if !spread.is_finite() || spread <= 0.0 {
        return Array2::zeros((rows, k));
    }
    Array2::from_shape_simple_fn((rows, k), || rng.gen_range(-spread..spread))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interaction;

    #[test]
    fn test_non_finite_hyperparameters_rejected() {
        for params in [
            ModelParams {
                init_std: f64::NAN,
                ..ModelParams::default()
            },
            ModelParams {
                init_std: f64::INFINITY,
                ..ModelParams::default()
            },
            ModelParams {
                learning_rate: 0.0,
                ..ModelParams::default()
            },
            ModelParams {
                regularization: -0.01,
                ..ModelParams::default()
            },
        ] {
            assert!(matches!(
                params.validate(),
                Err(AppError::Configuration(_))
            ));
        }
        assert!(ModelParams::default().validate().is_ok());
    }

    #[test]
    fn test_non_finite_spread_initializes_zeros() {
        let mut rng = StdRng::seed_from_u64(1);
        let factors = init_factors(&mut rng, 2, 3, f64::NAN);
        assert!(factors.iter().all(|v| *v == 0.0));
    }

    fn interaction(user: &str, item: &str, rating: f64) -> Interaction {
        Interaction {
            user_id: user.to_string(),
            item_id: item.to_string(),
            implicit_rating: rating,
        }
    }

    fn polarized_table() -> InteractionTable {
        let mut rows = Vec::new();
        for u in 0..5 {
            let user = format!("u{}", u);
            rows.push(interaction(&user, "good", 5.0));
            rows.push(interaction(&user, "bad", 1.0));
        }
        rows.push(interaction("fresh", "other", 3.0));
        InteractionTable::from_interactions(rows)
    }

    fn params() -> ModelParams {
        ModelParams {
            factors: 10,
            epochs: 200,
            learning_rate: 0.02,
            seed: Some(11),
            ..ModelParams::default()
        }
    }

    #[test]
    fn test_predictions_stay_on_scale() {
        let table = polarized_table();
        let model = LatentFactorModel::train(&table, &params());

        for user in ["u0", "u3", "fresh", "ghost"] {
            for item in ["good", "bad", "other", "unknown"] {
                let score = model.predict(user, item);
                assert!(score.is_finite());
                assert!((RATING_MIN..=RATING_MAX).contains(&score));
            }
        }
    }

    #[test]
    fn test_learns_item_preference_for_cold_user() {
        let table = polarized_table();
        let model = LatentFactorModel::train(&table, &params());

        let good = model.predict("fresh", "good");
        let bad = model.predict("fresh", "bad");
        assert!(good - bad > 1.0, "good={} bad={}", good, bad);
    }

    #[test]
    fn test_unseen_ids_fall_back_to_global_mean() {
        let table = polarized_table();
        let model = LatentFactorModel::train(&table, &params());

        assert!((model.global_mean() - 3.0).abs() < 1e-9);
        assert!((model.predict("ghost", "unknown") - 3.0).abs() < 1e-9);
        assert!(!model.knows_user("ghost"));
        assert!(model.knows_item("good"));
    }

    #[test]
    fn test_training_reduces_error() {
        let table = polarized_table();
        let untrained = LatentFactorModel::train(
            &table,
            &ModelParams {
                epochs: 0,
                ..params()
            },
        );
        let trained = LatentFactorModel::train(&table, &params());
        assert!(trained.rmse(&table) < untrained.rmse(&table));
    }

    #[test]
    fn test_unseeded_runs_stay_within_tolerance() {
        let table = polarized_table();
        let unseeded = ModelParams {
            seed: None,
            ..params()
        };
        let first = LatentFactorModel::train(&table, &unseeded).predict("u0", "good");
        let second = LatentFactorModel::train(&table, &unseeded).predict("u0", "good");
        assert!((first - second).abs() < 0.5);
    }
}
