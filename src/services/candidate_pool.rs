use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use super::interactions::InteractionTable;
use super::providers::CatalogProvider;
use crate::models::{CatalogFacet, CatalogItem, PageRequest};

/// Which catalog listings feed the pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub pages_per_facet: u32,
    pub genres: Vec<String>,
    /// How many liked movies seed a "similar" listing
    pub similar_seed_limit: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pages_per_facet: 5,
            genres: vec!["28".to_string(), "35".to_string(), "18".to_string()],
            similar_seed_limit: 5,
        }
    }
}

/// Frozen universe of recommendable items, one record per item id
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    items: Vec<CatalogItem>,
    index: HashMap<String, usize>,
    skipped_pages: usize,
}

impl CandidatePool {
    /// First record seen for an id wins; later duplicates are ignored
    pub fn from_items(items: impl IntoIterator<Item = CatalogItem>) -> Self {
        let mut pool = Self::default();
        for item in items {
            pool.insert_if_absent(item);
        }
        pool
    }

    fn insert_if_absent(&mut self, item: CatalogItem) -> bool {
        if self.index.contains_key(&item.item_id) {
            return false;
        }
        self.index.insert(item.item_id.clone(), self.items.len());
        self.items.push(item);
        true
    }

    pub fn get(&self, item_id: &str) -> Option<&CatalogItem> {
        self.index.get(item_id).map(|&i| &self.items[i])
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.index.contains_key(item_id)
    }

    /// Items in the order they entered the pool
    pub fn iter(&self) -> impl Iterator<Item = &CatalogItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pages that failed and were left out
    pub fn skipped_pages(&self) -> usize {
        self.skipped_pages
    }
}

/// Every page to fetch, facet by facet
pub fn page_requests(settings: &PoolSettings, similar_seeds: &[String]) -> Vec<PageRequest> {
    let mut facets = vec![CatalogFacet::Popular];
    facets.extend(settings.genres.iter().map(|genre| CatalogFacet::Discover {
        genre: genre.clone(),
    }));
    facets.extend(
        similar_seeds
            .iter()
            .take(settings.similar_seed_limit)
            .map(|item_id| CatalogFacet::Similar {
                item_id: item_id.clone(),
            }),
    );

    facets
        .into_iter()
        .flat_map(|facet| {
            (1..=settings.pages_per_facet).map(move |page| PageRequest::new(facet.clone(), page))
        })
        .collect()
}

/// Fetches every configured listing and merges it into a deduplicated pool
pub async fn build_candidate_pool(
    provider: &dyn CatalogProvider,
    settings: &PoolSettings,
    table: &InteractionTable,
) -> CandidatePool {
    let start = Instant::now();
    let seeds = table.items_by_like_count();
    let requests = page_requests(settings, &seeds);
    let requested = requests.len();

    let outcome = provider.fetch_pages(requests).await;

    let mut pool = CandidatePool::default();
    let mut fetched = 0usize;
    let no_pages = outcome.pages.is_empty();
    for (_, items) in outcome.pages {
        fetched += items.len();
        for item in items {
            pool.insert_if_absent(item);
        }
    }
    pool.skipped_pages = outcome.failed.len();

    if requested > 0 && no_pages {
        tracing::error!(
            pages = requested,
            provider = provider.name(),
            "Every catalog page failed, the candidate pool is empty"
        );
    }

    tracing::info!(
        pages = requested,
        skipped_pages = pool.skipped_pages,
        fetched,
        unique = pool.len(),
        provider = provider.name(),
        elapsed_ms = start.elapsed().as_millis(),
        "Candidate pool built"
    );

    pool
}

/// Genres each user has liked, keyed by user id
///
/// Liked items already in the pool use its metadata; the rest are looked up
/// individually, and lookups that fail simply contribute no genres.
pub async fn liked_genres(
    provider: &dyn CatalogProvider,
    pool: &CandidatePool,
    table: &InteractionTable,
) -> HashMap<String, BTreeSet<String>> {
    let mut missing: Vec<String> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for interaction in table.iter() {
        let item_id = interaction.item_id.as_str();
        if !pool.contains(item_id) && seen.insert(item_id) {
            missing.push(item_id.to_string());
        }
    }

    let requested = missing.len();
    let looked_up: HashMap<String, BTreeSet<String>> = if missing.is_empty() {
        HashMap::new()
    } else {
        provider
            .fetch_items(missing)
            .await
            .into_iter()
            .map(|item| (item.item_id, item.genres))
            .collect()
    };

    if requested > 0 {
        tracing::info!(
            requested,
            resolved = looked_up.len(),
            "Resolved genres for liked movies outside the pool"
        );
    }

    let mut profiles: HashMap<String, BTreeSet<String>> = HashMap::new();
    for interaction in table.iter() {
        let genres = pool
            .get(&interaction.item_id)
            .map(|item| &item.genres)
            .or_else(|| looked_up.get(&interaction.item_id));

        let entry = profiles.entry(interaction.user_id.clone()).or_default();
        if let Some(genres) = genres {
            entry.extend(genres.iter().cloned());
        }
    }

    profiles
}
