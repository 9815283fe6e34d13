//! SearXNG metasearch engine provider.
//!
//! [SearXNG](https://docs.searxng.org/) is a free, open-source metasearch engine
//! that aggregates results from multiple search engines. It can be self-hosted
//! for privacy-focused applications.
//!
//! # Example
//!
//! ```no_run
//! use learnpath_core::{SearchCapability, model::SearchQuery};
//! use learnpath_search::SearXng;
//!
//! # async fn example() {
//! let provider = SearXng::new("http://localhost:8080");
//! let result = provider.search(&SearchQuery::new("privacy search engines", "seed")).await;
//! # let _ = result;
//! # }
//! ```

use learnpath_core::{
    capability::SearchCapability,
    model::{SearchHit, SearchItems, SearchQuery, SearchResult},
};
use serde::Deserialize;

/// The default instance URL, pointed at a well-known public SearXNG mirror.
/// Callers deploying against their own instance should use [`SearXng::new`].
pub const DEFAULT_SEARXNG_URL: &str = "https://searx.be";

/// How many hits to request per query.
const DEFAULT_LIMIT: usize = 8;

/// SearXNG metasearch engine provider.
///
/// Connects to a self-hosted [SearXNG](https://github.com/searxng/searxng) instance.
/// Requires the instance to have JSON format enabled in settings.
#[derive(Debug, Clone)]
pub struct SearXng {
    base_url: String,
    engines: Option<String>,
    client: reqwest::Client,
}

impl Default for SearXng {
    fn default() -> Self {
        Self::new(DEFAULT_SEARXNG_URL)
    }
}

impl SearXng {
    /// Create a new SearXNG provider with the given instance URL.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of your SearXNG instance (e.g., `http://localhost:8080`)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            engines: None,
            client: reqwest::Client::new(),
        }
    }

    /// Specify which engines to use (comma-separated).
    ///
    /// # Example
    ///
    /// ```
    /// use learnpath_search::SearXng;
    ///
    /// let provider = SearXng::new("http://localhost:8080")
    ///     .with_engines("google,duckduckgo,bing");
    /// ```
    #[must_use]
    pub fn with_engines(mut self, engines: impl Into<String>) -> Self {
        self.engines = Some(engines.into());
        self
    }

    async fn search_raw(&self, query: &SearchQuery) -> anyhow::Result<Vec<SearchHit>> {
        let mut url = format!(
            "{}/search?q={}&format=json",
            self.base_url,
            urlencoded(&query.keywords)
        );
        if let Some(engines) = &self.engines {
            url.push_str(&format!("&engines={engines}"));
        }

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, "learnpath-search/0.1")
            .send()
            .await?
            .error_for_status()?
            .json::<SearxngResponse>()
            .await?;

        Ok(response
            .results
            .into_iter()
            .take(DEFAULT_LIMIT)
            .map(|hit| SearchHit {
                title: hit.title,
                url: hit.url,
                content: hit.content.unwrap_or_default(),
                source: "searxng".to_string(),
            })
            .collect())
    }
}

impl SearchCapability for SearXng {
    async fn search(&self, query: &SearchQuery) -> SearchResult {
        match self.search_raw(query).await {
            Ok(hits) => SearchResult::ok(query, hits),
            Err(err) => {
                tracing::debug!(error = %err, query = %query.keywords, "searxng query failed");
                SearchResult::error(query, sanitize(&err))
            }
        }
    }
}

fn sanitize(err: &anyhow::Error) -> String {
    format!("search backend unavailable: {err}")
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    title: String,
    url: String,
    content: Option<String>,
}

fn urlencoded(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
