use rand::Rng;
use std::collections::{HashMap, HashSet};

use crate::{
    db::{InteractionSource, LikeFilter},
    error::AppResult,
    models::{Interaction, RatingPolicy, RawLike, RATING_MAX, RATING_MIN},
};

/// Normalized likes for one run, with per-user lookups
#[derive(Debug, Clone, Default)]
pub struct InteractionTable {
    interactions: Vec<Interaction>,
    users: Vec<String>,
    liked: HashMap<String, HashSet<String>>,
}

impl InteractionTable {
    /// Builds the table, keeping the last rating seen for a repeated (user, item) pair
    pub fn from_interactions(rows: Vec<Interaction>) -> Self {
        let mut interactions: Vec<Interaction> = Vec::with_capacity(rows.len());
        let mut positions: HashMap<(String, String), usize> = HashMap::new();
        let mut users = Vec::new();
        let mut liked: HashMap<String, HashSet<String>> = HashMap::new();

        for row in rows {
            let key = (row.user_id.clone(), row.item_id.clone());
            if let Some(&pos) = positions.get(&key) {
                interactions[pos] = row;
                continue;
            }

            if !liked.contains_key(&row.user_id) {
                users.push(row.user_id.clone());
            }
            liked
                .entry(row.user_id.clone())
                .or_default()
                .insert(row.item_id.clone());
            positions.insert(key, interactions.len());
            interactions.push(row);
        }

        Self {
            interactions,
            users,
            liked,
        }
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interaction> {
        self.interactions.iter()
    }

    /// Users in first-seen order
    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn liked_items(&self, user_id: &str) -> Option<&HashSet<String>> {
        self.liked.get(user_id)
    }

    pub fn has_liked(&self, user_id: &str, item_id: &str) -> bool {
        self.liked
            .get(user_id)
            .is_some_and(|items| items.contains(item_id))
    }

    /// Distinct liked items, most-liked first and first-seen among equals
    pub fn items_by_like_count(&self) -> Vec<String> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (position, interaction) in self.interactions.iter().enumerate() {
            counts
                .entry(interaction.item_id.as_str())
                .or_insert((0, position))
                .0 += 1;
        }

        let mut items: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
        items.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        items.into_iter().map(|(id, _)| id.to_string()).collect()
    }
}

/// Canonicalizes identifiers and assigns ratings to raw like records
pub fn normalize_likes<R: Rng + ?Sized>(
    raw: Vec<RawLike>,
    policy: RatingPolicy,
    rng: &mut R,
) -> InteractionTable {
    let mut skipped = 0usize;
    let mut rows = Vec::with_capacity(raw.len());

    for like in raw {
        let (Some(user_id), Some(item_id)) = (like.user_id.canonical(), like.movie_id.canonical())
        else {
            skipped += 1;
            continue;
        };

        let implicit_rating = match like.rating {
            Some(rating) if rating.is_finite() => rating.clamp(RATING_MIN, RATING_MAX),
            _ => policy.assign(rng),
        };

        rows.push(Interaction {
            user_id,
            item_id,
            implicit_rating,
        });
    }

    if skipped > 0 {
        tracing::warn!(skipped, "Dropped like records with blank identifiers");
    }

    InteractionTable::from_interactions(rows)
}

/// Loads likes from the source; `None` means there is nothing to recommend
pub async fn load_interactions<R: Rng + ?Sized>(
    source: &dyn InteractionSource,
    filter: &LikeFilter,
    policy: RatingPolicy,
    rng: &mut R,
) -> AppResult<Option<InteractionTable>> {
    let raw = source.fetch_likes(filter).await?;
    let fetched = raw.len();
    let table = normalize_likes(raw, policy, rng);

    tracing::info!(
        fetched,
        interactions = table.len(),
        users = table.users().len(),
        policy = %policy,
        "Loaded interactions"
    );

    if table.is_empty() {
        return Ok(None);
    }

    Ok(Some(table))
}
