use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt::Display};

/// Upper bound of the catalog's `vote_average`
pub const EXTERNAL_RATING_MAX: f64 = 10.0;

/// A recommendable movie with the metadata we persist alongside a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_id: String,
    pub title: String,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    /// Catalog vote average on a 0-10 scale
    pub external_rating: f64,
    pub genres: BTreeSet<String>,
    pub popularity: f64,
}

impl CatalogItem {
    /// External rating scaled to `[0, 1]`
    pub fn normalized_rating(&self) -> f64 {
        (self.external_rating / EXTERNAL_RATING_MAX).clamp(0.0, 1.0)
    }
}

/// A listing the candidate pool is drawn from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CatalogFacet {
    Popular,
    /// Discovery filtered to one genre tag
    Discover { genre: String },
    /// Movies similar to one the user base liked
    Similar { item_id: String },
}

impl Display for CatalogFacet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogFacet::Popular => write!(f, "popular"),
            CatalogFacet::Discover { genre } => write!(f, "discover:{}", genre),
            CatalogFacet::Similar { item_id } => write!(f, "similar:{}", item_id),
        }
    }
}

/// One page of one facet
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub facet: CatalogFacet,
    pub page: u32,
}

impl PageRequest {
    pub fn new(facet: CatalogFacet, page: u32) -> Self {
        Self { facet, page }
    }
}

impl Display for PageRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.facet, self.page)
    }
}
