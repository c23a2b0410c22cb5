use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Lowest rating the pipeline stores or predicts
pub const RATING_MIN: f64 = 1.0;
/// Highest rating the pipeline stores or predicts
pub const RATING_MAX: f64 = 5.0;

/// Identifier as emitted by the like store, which is not consistent about types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Integer(i64),
    Uuid(Uuid),
    Text(String),
}

impl RawId {
    /// Canonical string form, `None` when the identifier is blank
    pub fn canonical(&self) -> Option<String> {
        match self {
            RawId::Integer(id) => Some(id.to_string()),
            RawId::Uuid(id) => Some(id.hyphenated().to_string()),
            RawId::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else if let Ok(uuid) = Uuid::parse_str(trimmed) {
                    Some(uuid.hyphenated().to_string())
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }
}

impl From<&str> for RawId {
    fn from(value: &str) -> Self {
        RawId::Text(value.to_string())
    }
}

impl From<i64> for RawId {
    fn from(value: i64) -> Self {
        RawId::Integer(value)
    }
}

impl From<i32> for RawId {
    fn from(value: i32) -> Self {
        RawId::Integer(value.into())
    }
}

/// One row from the `liked_movies` source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLike {
    pub user_id: RawId,
    pub movie_id: RawId,
    #[serde(default)]
    pub rating: Option<f64>,
}

impl RawLike {
    pub fn new(user_id: impl Into<RawId>, movie_id: impl Into<RawId>) -> Self {
        Self {
            user_id: user_id.into(),
            movie_id: movie_id.into(),
            rating: None,
        }
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Normalized like with the rating the pipeline trains on
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub user_id: String,
    pub item_id: String,
    pub implicit_rating: f64,
}

/// How a rating is synthesized for likes that carry none
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatingPolicy {
    Fixed(f64),
    /// Uniform in `[low, high]`
    Randomized { low: f64, high: f64 },
}

impl RatingPolicy {
    pub fn assign<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            RatingPolicy::Fixed(value) => value,
            RatingPolicy::Randomized { low, high } => rng.gen_range(low..=high),
        }
    }
}

impl Default for RatingPolicy {
    fn default() -> Self {
        RatingPolicy::Fixed(RATING_MAX)
    }
}

impl FromStr for RatingPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(RatingPolicy::Fixed(RATING_MAX)),
            "randomized" | "random" => Ok(RatingPolicy::Randomized {
                low: 4.0,
                high: RATING_MAX,
            }),
            other => Err(AppError::Configuration(format!(
                "Unknown IMPLICIT_RATING policy '{}', expected 'fixed' or 'randomized'",
                other
            ))),
        }
    }
}

impl Display for RatingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RatingPolicy::Fixed(value) => write!(f, "fixed({})", value),
            RatingPolicy::Randomized { low, high } => write!(f, "randomized({}..={})", low, high),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_canonical_integer() {
        assert_eq!(RawId::Integer(550).canonical(), Some("550".to_string()));
    }

    #[test]
    fn test_canonical_uuid_text_is_lowercased() {
        let id = RawId::Text("  6F9619FF-8B86-D011-B42D-00C04FC964FF ".to_string());
        assert_eq!(
            id.canonical(),
            Some("6f9619ff-8b86-d011-b42d-00c04fc964ff".to_string())
        );
    }

    #[test]
    fn test_canonical_blank_text() {
        assert_eq!(RawId::Text("   ".to_string()).canonical(), None);
    }

    #[test]
    fn test_raw_like_deserializes_mixed_types() {
        let json = r#"[
            {"user_id": "6f9619ff-8b86-d011-b42d-00c04fc964ff", "movie_id": 550},
            {"user_id": "alice", "movie_id": "680", "rating": 3.5}
        ]"#;
        let likes: Vec<RawLike> = serde_json::from_str(json).unwrap();
        assert!(matches!(likes[0].user_id, RawId::Uuid(_)));
        assert_eq!(likes[0].movie_id, RawId::Integer(550));
        assert_eq!(likes[0].rating, None);
        assert_eq!(likes[1].rating, Some(3.5));
    }

    #[test]
    fn test_randomized_policy_stays_in_range() {
        let policy: RatingPolicy = "randomized".parse().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let rating = policy.assign(&mut rng);
            assert!((4.0..=5.0).contains(&rating));
        }
    }

    #[test]
    fn test_fixed_policy() {
        let policy: RatingPolicy = "Fixed".parse().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(policy.assign(&mut rng), 5.0);
    }
}
