use chrono::{DateTime, SubsecRound, Utc};
use rand::{rngs::StdRng, SeedableRng};
use std::time::Instant;

use super::{
    candidate_pool::{build_candidate_pool, liked_genres, PoolSettings},
    interactions::load_interactions,
    latent_factor::{LatentFactorModel, ModelParams},
    matrix::InteractionMatrix,
    persister::{deduplicate, Persister},
    providers::CatalogProvider,
    scorer::{HybridScorer, ScoreWeights},
    similarity::NeighborhoodScores,
};
use crate::{
    config::Config,
    db::{InteractionSource, LikeFilter, RecommendationSink, StaleScope},
    error::AppResult,
    models::{RatingPolicy, RawId},
};

/// Tunables of one batch run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub rating_policy: RatingPolicy,
    pub model: ModelParams,
    pub pool: PoolSettings,
    pub weights: ScoreWeights,
    pub top_k: Option<usize>,
    pub batch_size: usize,
    pub write_retries: u32,
    /// Score and rewrite only this user; training still sees every like
    pub only_user: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            rating_policy: RatingPolicy::default(),
            model: ModelParams::default(),
            pool: PoolSettings::default(),
            weights: ScoreWeights::default(),
            top_k: Some(20),
            batch_size: 500,
            write_retries: 1,
            only_user: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        Ok(Self {
            rating_policy: config.rating_policy()?,
            model: config.model_params(),
            pool: PoolSettings {
                pages_per_facet: config.catalog_pages,
                genres: config.catalog_genres.clone(),
                similar_seed_limit: config.similar_seed_limit,
            },
            weights: config.score_weights(),
            top_k: config.top_k(),
            batch_size: config.batch_size,
            write_retries: config.write_retries,
            only_user: config
                .only_user
                .as_deref()
                .and_then(|user_id| RawId::from(user_id).canonical()),
        })
    }
}

/// Counts reported by a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    /// Users whose stored recommendations were rewritten
    pub user_ids: Vec<String>,
    pub interactions: usize,
    pub pool_size: usize,
    pub skipped_pages: usize,
    pub recommendations: usize,
    pub batches: usize,
    pub stale_deleted: u64,
    pub elapsed_ms: u128,
}

impl RunSummary {
    /// Pages were requested and none came back
    pub fn catalog_unavailable(&self) -> bool {
        self.pool_size == 0 && self.skipped_pages > 0
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No likes exist; nothing was computed or written
    NothingToRecommend,
    Completed(RunSummary),
}

/// One offline recommendation run over explicitly injected collaborators
pub struct RecommendationPipeline<'a> {
    settings: &'a PipelineSettings,
    source: &'a dyn InteractionSource,
    catalog: &'a dyn CatalogProvider,
    sink: &'a dyn RecommendationSink,
}

impl<'a> RecommendationPipeline<'a> {
    pub fn new(
        settings: &'a PipelineSettings,
        source: &'a dyn InteractionSource,
        catalog: &'a dyn CatalogProvider,
        sink: &'a dyn RecommendationSink,
    ) -> Self {
        Self {
            settings,
            source,
            catalog,
            sink,
        }
    }

    pub async fn run(&self) -> AppResult<RunOutcome> {
        let start = Instant::now();
        // Postgres keeps microseconds; a finer timestamp would make fresh rows look stale
        let started_at = Utc::now().trunc_subsecs(6);
        let settings = self.settings;

        let mut rng = match settings.model.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // Both collaborative signals need every user's likes, even for a single-user run
        let Some(table) = load_interactions(
            self.source,
            &LikeFilter::default(),
            settings.rating_policy,
            &mut rng,
        )
        .await?
        else {
            tracing::info!("No liked movies found, nothing to recommend");
            return Ok(RunOutcome::NothingToRecommend);
        };

        let targets: Vec<String> = match &settings.only_user {
            Some(user_id) if table.liked_items(user_id).is_some() => vec![user_id.clone()],
            Some(user_id) => {
                tracing::info!(user_id = %user_id, "Requested user has no liked movies, nothing to recommend");
                return Ok(RunOutcome::NothingToRecommend);
            }
            None => table.users().to_vec(),
        };

        let pool = build_candidate_pool(self.catalog, &settings.pool, &table).await;
        let genres = liked_genres(self.catalog, &pool, &table).await;

        let model = LatentFactorModel::train(&table, &settings.model);
        let matrix = InteractionMatrix::from_table(&table);
        let neighborhood = NeighborhoodScores::compute(&matrix);

        let scorer = HybridScorer::new(
            &model,
            &neighborhood,
            &genres,
            settings.weights,
            settings.top_k,
        );
        let recommendations =
            deduplicate(scorer.rank_users(&targets, &table, &pool, started_at));

        tracing::info!(
            users = targets.len(),
            candidates = pool.len(),
            recommendations = recommendations.len(),
            top_k = ?settings.top_k,
            "Generated recommendations"
        );

        let count = recommendations.len();
        let stale = StaleScope {
            generated_before: started_at,
            user_id: settings.only_user.clone(),
        };
        let report = Persister::new(self.sink, settings.batch_size, settings.write_retries)
            .persist(recommendations, &stale)
            .await?;

        Ok(RunOutcome::Completed(RunSummary {
            started_at,
            user_ids: targets,
            interactions: table.len(),
            pool_size: pool.len(),
            skipped_pages: pool.skipped_pages(),
            recommendations: count,
            batches: report.batches,
            stale_deleted: report.stale_deleted,
            elapsed_ms: start.elapsed().as_millis(),
        }))
    }
}
