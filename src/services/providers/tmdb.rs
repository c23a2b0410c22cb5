/// TMDb (The Movie Database) catalog provider
///
/// Listing endpoints used per facet:
/// 1. Popular: /movie/popular
/// 2. Discover: /discover/movie?with_genres={genre}
/// 3. Similar: /movie/{id}/similar
///
/// Item details come from /movie/{id}. Requests authenticate either with a
/// v4 read access token as a bearer header or with a v3 key as the `api_key`
/// query parameter.
use crate::{
    error::{AppError, AppResult},
    models::{CatalogFacet, CatalogItem, PageRequest, TmdbMovieDetails, TmdbPage},
    services::providers::{CatalogProvider, DEFAULT_MAX_IN_FLIGHT},
};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use std::{str::FromStr, time::Duration};

const LANGUAGE: &str = "en-US";

/// How the credential is attached to each request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmdbAuth {
    /// v4 read access token in `Authorization: Bearer`
    Bearer,
    /// v3 API key as `?api_key=`
    QueryKey,
}

impl TmdbAuth {
    /// v3 keys are 32 hex characters; anything else is treated as a v4 token
    pub fn for_key(api_key: &str) -> Self {
        let key = api_key.trim();
        if key.len() == 32 && key.bytes().all(|b| b.is_ascii_hexdigit()) {
            TmdbAuth::QueryKey
        } else {
            TmdbAuth::Bearer
        }
    }
}

impl FromStr for TmdbAuth {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "bearer" => Ok(TmdbAuth::Bearer),
            "api_key" | "query" => Ok(TmdbAuth::QueryKey),
            other => Err(AppError::Configuration(format!(
                "Unknown TMDB_AUTH '{}', expected 'bearer' or 'api_key'",
                other
            ))),
        }
    }
}

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    auth: TmdbAuth,
    max_in_flight: usize,
}

impl TmdbProvider {
    /// Creates a provider whose requests give up after `timeout`
    ///
    /// The auth scheme is inferred from the key; override it with [`Self::with_auth`].
    pub fn new(api_key: String, api_url: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            auth: TmdbAuth::for_key(&api_key),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        })
    }

    pub fn with_auth(mut self, auth: TmdbAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Path and extra query parameters for one listing page
    fn listing_endpoint(&self, request: &PageRequest) -> (String, Vec<(&'static str, String)>) {
        let mut query = vec![
            ("language", LANGUAGE.to_string()),
            ("page", request.page.to_string()),
        ];

        let path = match &request.facet {
            CatalogFacet::Popular => "/movie/popular".to_string(),
            CatalogFacet::Discover { genre } => {
                query.push(("with_genres", genre.clone()));
                query.push(("sort_by", "popularity.desc".to_string()));
                "/discover/movie".to_string()
            }
            CatalogFacet::Similar { item_id } => format!("/movie/{}/similar", item_id),
        };

        (path, query)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let request = self.http_client.get(&url).query(query);
        let request = match self.auth {
            TmdbAuth::Bearer => request.bearer_auth(&self.api_key),
            TmdbAuth::QueryKey => request.query(&[("api_key", self.api_key.as_str())]),
        };
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDb API returned status {} for {}: {}",
                status, path, body
            )));
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            tracing::debug!(response = %response_text, "Raw TMDb response");
            AppError::ExternalApi(format!("Failed to parse TMDb response: {}", e))
        })
    }
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbProvider {
    async fn fetch_page(&self, request: &PageRequest) -> AppResult<Vec<CatalogItem>> {
        if request.page == 0 {
            return Err(AppError::InvalidInput(
                "TMDb pages start at 1".to_string(),
            ));
        }

        let (path, query) = self.listing_endpoint(request);
        let page: TmdbPage = self.get_json(&path, &query).await?;

        let items: Vec<CatalogItem> = page.results.into_iter().map(CatalogItem::from).collect();

        tracing::debug!(
            page = %request,
            results = items.len(),
            total_pages = ?page.total_pages,
            provider = "tmdb",
            "Catalog page fetched"
        );

        Ok(items)
    }

    async fn fetch_item(&self, item_id: &str) -> AppResult<CatalogItem> {
        if item_id.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Movie id cannot be empty".to_string(),
            ));
        }

        let path = format!("/movie/{}", item_id);
        let details: TmdbMovieDetails = self
            .get_json(&path, &[("language", LANGUAGE.to_string())])
            .await?;

        Ok(CatalogItem::from(details))
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    fn clone_for_task(&self) -> Box<dyn CatalogProvider> {
        Box::new(self.clone())
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
