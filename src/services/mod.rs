pub mod candidate_pool;
pub mod interactions;
pub mod latent_factor;
pub mod matrix;
pub mod persister;
pub mod pipeline;
pub mod providers;
pub mod scorer;
pub mod similarity;

pub use candidate_pool::{CandidatePool, PoolSettings};
pub use interactions::InteractionTable;
pub use latent_factor::{LatentFactorModel, ModelParams};
pub use pipeline::{PipelineSettings, RecommendationPipeline, RunOutcome, RunSummary};
pub use providers::{CatalogProvider, TmdbProvider};
pub use scorer::{HybridScorer, ScoreWeights};
