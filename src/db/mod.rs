pub mod likes;
pub mod postgres;
pub mod recommendations;
pub mod redis;

pub use likes::{InteractionSource, LikeFilter, PgLikeSource};
pub use postgres::{create_pool, run_migrations};
pub use recommendations::{
    PgRecommendationStore, RecommendationReader, RecommendationSink, StaleScope,
};
pub use self::redis::{create_redis_client, Cache, CacheKey};

#[cfg(test)]
pub use likes::MockInteractionSource;
#[cfg(test)]
pub use recommendations::{MockRecommendationReader, MockRecommendationSink};
