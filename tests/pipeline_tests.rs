use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use moviemeter_recs::{
    db::{InteractionSource, LikeFilter, RecommendationSink, StaleScope},
    error::{AppError, AppResult},
    models::{RawLike, Recommendation},
    services::{
        ModelParams, PipelineSettings, PoolSettings, RecommendationPipeline, RunOutcome,
        RunSummary, ScoreWeights, TmdbProvider,
    },
};

// ============================================================================
// In-memory stores
// ============================================================================

struct MemoryLikes(Vec<RawLike>);

#[async_trait::async_trait]
impl InteractionSource for MemoryLikes {
    async fn fetch_likes(&self, filter: &LikeFilter) -> AppResult<Vec<RawLike>> {
        Ok(self
            .0
            .iter()
            .filter(|like| match &filter.user_id {
                Some(user_id) => like.user_id.canonical().as_deref() == Some(user_id.as_str()),
                None => true,
            })
            .cloned()
            .collect())
    }
}

/// Keyed like the `movie_recommendations` primary key
#[derive(Default)]
struct MemoryStore {
    rows: Mutex<BTreeMap<(String, String), Recommendation>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl MemoryStore {
    fn keys(&self) -> Vec<(String, String)> {
        self.rows.lock().unwrap().keys().cloned().collect()
    }

    fn rows(&self) -> Vec<Recommendation> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    fn seed(&self, rec: Recommendation) {
        self.rows
            .lock()
            .unwrap()
            .insert((rec.user_id.clone(), rec.movie_id.clone()), rec);
    }
}

#[async_trait::async_trait]
impl RecommendationSink for MemoryStore {
    async fn upsert_batch(&self, batch: &[Recommendation]) -> AppResult<u64> {
        self.batch_sizes.lock().unwrap().push(batch.len());
        let mut rows = self.rows.lock().unwrap();
        for rec in batch {
            rows.insert((rec.user_id.clone(), rec.movie_id.clone()), rec.clone());
        }
        Ok(batch.len() as u64)
    }

    async fn delete_stale(&self, scope: &StaleScope) -> AppResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|(user_id, _), rec| {
            let in_scope = scope.user_id.as_ref().map_or(true, |u| u == user_id);
            !(in_scope && rec.generated_at < scope.generated_before)
        });
        Ok((before - rows.len()) as u64)
    }
}

struct BrokenStore;

#[async_trait::async_trait]
impl RecommendationSink for BrokenStore {
    async fn upsert_batch(&self, _batch: &[Recommendation]) -> AppResult<u64> {
        Err(AppError::Internal("disk full".to_string()))
    }

    async fn delete_stale(&self, _scope: &StaleScope) -> AppResult<u64> {
        panic!("stale rows must not be deleted after a failed write");
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn movie(id: u64, genres: &[u64], vote_average: f64) -> serde_json::Value {
    json!({
        "id": id,
        "title": format!("Movie {}", id),
        "poster_path": format!("/{}.jpg", id),
        "release_date": "2021-06-01",
        "vote_average": vote_average,
        "genre_ids": genres,
        "popularity": 50.0
    })
}

fn page(number: u32, results: Vec<serde_json::Value>) -> serde_json::Value {
    json!({ "page": number, "results": results, "total_pages": 2 })
}

async fn mount_popular(server: &MockServer, number: u32, results: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/movie/popular"))
        .and(query_param("page", number.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(number, results)))
        .mount(server)
        .await;
}

fn provider(server: &MockServer, timeout: Duration) -> TmdbProvider {
    TmdbProvider::new("test_token".to_string(), server.uri(), timeout).unwrap()
}

fn settings(pages: u32, top_k: Option<usize>) -> PipelineSettings {
    PipelineSettings {
        model: ModelParams {
            factors: 8,
            epochs: 15,
            seed: Some(7),
            ..ModelParams::default()
        },
        pool: PoolSettings {
            pages_per_facet: pages,
            genres: vec![],
            similar_seed_limit: 0,
        },
        top_k,
        ..PipelineSettings::default()
    }
}

fn completed(outcome: RunOutcome) -> RunSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_single_user_top_one_picks_unseen_movie() {
    let server = MockServer::start().await;
    mount_popular(
        &server,
        1,
        vec![
            movie(1, &[28], 7.0),
            movie(2, &[28], 7.0),
            movie(3, &[28], 8.0),
            movie(4, &[35], 6.0),
        ],
    )
    .await;

    let likes = MemoryLikes(vec![RawLike::new("u1", 1), RawLike::new("u1", 2)]);
    let store = MemoryStore::default();
    let catalog = provider(&server, Duration::from_secs(5));
    let settings = settings(1, Some(1));

    let summary = completed(
        RecommendationPipeline::new(&settings, &likes, &catalog, &store)
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.recommendations, 1);
    assert_eq!(summary.pool_size, 4);
    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, "u1");
    assert!(rows[0].movie_id == "3" || rows[0].movie_id == "4");
    assert!(rows[0].score.is_finite());
}

#[tokio::test]
async fn test_timed_out_page_is_skipped() {
    let server = MockServer::start().await;
    mount_popular(&server, 1, vec![movie(1, &[28], 7.0), movie(5, &[28], 7.5)]).await;
    Mock::given(method("GET"))
        .and(path("/movie/popular"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(2, vec![movie(6, &[18], 9.0)]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let likes = MemoryLikes(vec![RawLike::new("u1", 1)]);
    let store = MemoryStore::default();
    let catalog = provider(&server, Duration::from_millis(300));
    let settings = settings(2, None);

    let summary = completed(
        RecommendationPipeline::new(&settings, &likes, &catalog, &store)
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.skipped_pages, 1);
    assert_eq!(summary.pool_size, 2);
    assert_eq!(store.keys(), vec![("u1".to_string(), "5".to_string())]);
}

#[tokio::test]
async fn test_no_likes_means_no_writes() {
    let server = MockServer::start().await;
    let likes = MemoryLikes(vec![]);
    let store = MemoryStore::default();
    store.seed(Recommendation {
        user_id: "u9".to_string(),
        movie_id: "42".to_string(),
        movie_title: "Old".to_string(),
        poster_path: None,
        release_date: None,
        vote_average: 5.0,
        score: 1.0,
        generated_at: DateTime::<Utc>::UNIX_EPOCH,
    });
    let catalog = provider(&server, Duration::from_secs(5));
    let settings = settings(1, None);

    let outcome = RecommendationPipeline::new(&settings, &likes, &catalog, &store)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome, RunOutcome::NothingToRecommend);
    assert!(store.batch_sizes.lock().unwrap().is_empty());
    assert_eq!(store.keys().len(), 1);
}

#[tokio::test]
async fn test_many_users_never_get_their_own_likes() {
    let server = MockServer::start().await;
    mount_popular(
        &server,
        1,
        (1..=12).map(|id| movie(id, &[28], 6.0 + id as f64 / 10.0)).collect(),
    )
    .await;

    let likes = MemoryLikes(vec![
        RawLike::new("alice", 1),
        RawLike::new("alice", 2),
        RawLike::new("alice", 3),
        RawLike::new("bob", 2),
        RawLike::new("bob", 4),
        RawLike::new("carol", 5),
        RawLike::new("carol", 1),
        // duplicate like, same pair
        RawLike::new("carol", "5"),
    ]);
    let store = MemoryStore::default();
    let catalog = provider(&server, Duration::from_secs(5));
    let mut settings = settings(1, None);
    settings.batch_size = 4;

    let summary = completed(
        RecommendationPipeline::new(&settings, &likes, &catalog, &store)
            .run()
            .await
            .unwrap(),
    );

    let liked: HashSet<(String, String)> = [
        ("alice", "1"),
        ("alice", "2"),
        ("alice", "3"),
        ("bob", "2"),
        ("bob", "4"),
        ("carol", "5"),
        ("carol", "1"),
    ]
    .iter()
    .map(|(u, m)| (u.to_string(), m.to_string()))
    .collect();

    let keys = store.keys();
    assert!(keys.iter().all(|key| !liked.contains(key)));
    // 12 candidates minus each user's likes
    assert_eq!(keys.len(), 9 + 10 + 10);
    assert_eq!(summary.recommendations, keys.len());
    assert_eq!(summary.batches, (keys.len() + 3) / 4);
    assert!(store.batch_sizes.lock().unwrap().iter().all(|&n| n <= 4));
}

#[tokio::test]
async fn test_rerun_replaces_stale_rows() {
    let server = MockServer::start().await;
    mount_popular(
        &server,
        1,
        vec![movie(1, &[28], 7.0), movie(2, &[28], 7.0), movie(3, &[35], 7.0)],
    )
    .await;

    let likes = MemoryLikes(vec![RawLike::new("u1", 1)]);
    let store = MemoryStore::default();
    // left over from an earlier catalog
    store.seed(Recommendation {
        user_id: "u1".to_string(),
        movie_id: "999".to_string(),
        movie_title: "Gone".to_string(),
        poster_path: None,
        release_date: None,
        vote_average: 5.0,
        score: 3.0,
        generated_at: DateTime::<Utc>::UNIX_EPOCH,
    });
    let catalog = provider(&server, Duration::from_secs(5));
    let settings = settings(1, None);

    let first = completed(
        RecommendationPipeline::new(&settings, &likes, &catalog, &store)
            .run()
            .await
            .unwrap(),
    );
    assert_eq!(first.stale_deleted, 1);
    let after_first = store.keys();

    completed(
        RecommendationPipeline::new(&settings, &likes, &catalog, &store)
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(store.keys(), after_first);
    assert_eq!(
        after_first,
        vec![
            ("u1".to_string(), "2".to_string()),
            ("u1".to_string(), "3".to_string())
        ]
    );
}

#[tokio::test]
async fn test_only_user_leaves_other_users_alone() {
    let server = MockServer::start().await;
    mount_popular(&server, 1, vec![movie(1, &[28], 7.0), movie(2, &[28], 7.0)]).await;

    let likes = MemoryLikes(vec![RawLike::new("u1", 1), RawLike::new("u2", 2)]);
    let store = MemoryStore::default();
    store.seed(Recommendation {
        user_id: "u2".to_string(),
        movie_id: "1".to_string(),
        movie_title: "Movie 1".to_string(),
        poster_path: None,
        release_date: None,
        vote_average: 7.0,
        score: 2.0,
        generated_at: DateTime::<Utc>::UNIX_EPOCH,
    });
    let catalog = provider(&server, Duration::from_secs(5));
    let mut settings = settings(1, None);
    settings.only_user = Some("u1".to_string());

    let summary = completed(
        RecommendationPipeline::new(&settings, &likes, &catalog, &store)
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.user_ids, vec!["u1".to_string()]);
    assert_eq!(summary.stale_deleted, 0);
    assert_eq!(
        store.keys(),
        vec![
            ("u1".to_string(), "2".to_string()),
            ("u2".to_string(), "1".to_string())
        ]
    );
}

fn score_of(store: &MemoryStore, user_id: &str, movie_id: &str) -> f64 {
    store
        .rows()
        .into_iter()
        .find(|r| r.user_id == user_id && r.movie_id == movie_id)
        .map(|r| r.score)
        .unwrap()
}

#[tokio::test]
async fn test_only_user_keeps_neighbor_support() {
    let server = MockServer::start().await;
    mount_popular(
        &server,
        1,
        vec![movie(1, &[28], 7.0), movie(2, &[28], 7.0), movie(3, &[28], 7.0)],
    )
    .await;

    // u2 and u3 agree with u1 on movie 1 and both also liked movie 3
    let likes = MemoryLikes(vec![
        RawLike::new("u1", 1),
        RawLike::new("u2", 1),
        RawLike::new("u2", 3),
        RawLike::new("u3", 1),
        RawLike::new("u3", 3),
    ]);
    let catalog = provider(&server, Duration::from_secs(5));
    let mut settings = settings(1, None);
    settings.weights = ScoreWeights {
        latent: 0.0,
        genre: 0.0,
        rating: 0.0,
        similarity: 1.0,
    };

    let full_store = MemoryStore::default();
    completed(
        RecommendationPipeline::new(&settings, &likes, &catalog, &full_store)
            .run()
            .await
            .unwrap(),
    );

    settings.only_user = Some("u1".to_string());
    let single_store = MemoryStore::default();
    let summary = completed(
        RecommendationPipeline::new(&settings, &likes, &catalog, &single_store)
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.user_ids, vec!["u1".to_string()]);
    assert_eq!(summary.interactions, 5);
    assert!(single_store.rows().iter().all(|r| r.user_id == "u1"));

    let full = score_of(&full_store, "u1", "3");
    let single = score_of(&single_store, "u1", "3");
    assert!((full - single).abs() < 1e-9, "full {} vs single {}", full, single);
    // neighbor-weighted, not u1's own constant rating
    assert!(single < 5.0 - 1e-6);
    assert!(
        (score_of(&single_store, "u1", "2") - score_of(&full_store, "u1", "2")).abs() < 1e-9
    );
}

#[tokio::test]
async fn test_failed_writes_surface_as_persistence_error() {
    let server = MockServer::start().await;
    mount_popular(&server, 1, vec![movie(1, &[28], 7.0), movie(2, &[28], 7.0)]).await;

    let likes = MemoryLikes(vec![RawLike::new("u1", 1)]);
    let catalog = provider(&server, Duration::from_secs(5));
    let mut settings = settings(1, None);
    settings.write_retries = 0;

    let result = RecommendationPipeline::new(&settings, &likes, &catalog, &BrokenStore)
        .run()
        .await;

    match result {
        Err(AppError::Persistence {
            failed_batches,
            total_batches,
        }) => {
            assert_eq!(failed_batches, vec![0]);
            assert_eq!(total_batches, 1);
        }
        other => panic!("expected persistence error, got {:?}", other),
    }
}
