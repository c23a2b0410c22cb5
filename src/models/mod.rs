use serde::Deserialize;

pub mod catalog;
pub mod interaction;
pub mod recommendation;

pub use catalog::{CatalogFacet, CatalogItem, PageRequest, EXTERNAL_RATING_MAX};
pub use interaction::{Interaction, RatingPolicy, RawId, RawLike, RATING_MAX, RATING_MIN};
pub use recommendation::Recommendation;

// ============================================================================
// TMDb API Types
// ============================================================================

/// Paginated listing returned by /movie/popular, /discover/movie and /movie/{id}/similar
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage {
    pub page: u32,
    #[serde(default)]
    pub results: Vec<TmdbMovie>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// Movie entry inside a listing page
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genre_ids: Vec<u64>,
    #[serde(default)]
    pub popularity: f64,
}

/// API response from GET /movie/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovieDetails {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub popularity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenre {
    pub id: u64,
}

/// TMDb sends "" for unknown release dates
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<TmdbMovie> for CatalogItem {
    fn from(movie: TmdbMovie) -> Self {
        CatalogItem {
            item_id: movie.id.to_string(),
            title: movie.title,
            poster_path: non_empty(movie.poster_path),
            release_date: non_empty(movie.release_date),
            external_rating: movie.vote_average,
            genres: movie.genre_ids.iter().map(|g| g.to_string()).collect(),
            popularity: movie.popularity,
        }
    }
}

impl From<TmdbMovieDetails> for CatalogItem {
    fn from(details: TmdbMovieDetails) -> Self {
        CatalogItem {
            item_id: details.id.to_string(),
            title: details.title,
            poster_path: non_empty(details.poster_path),
            release_date: non_empty(details.release_date),
            external_rating: details.vote_average,
            genres: details.genres.iter().map(|g| g.id.to_string()).collect(),
            popularity: details.popularity,
        }
    }
}
