//! In-memory [`SearchCapability`] for demos and integration tests.

use std::{collections::HashMap, sync::Mutex};

use learnpath_core::{
    capability::SearchCapability,
    model::{SearchHit, SearchQuery, SearchResult},
};

/// A fixed mapping from query keywords to canned hits, useful for
/// deterministic tests and local demos that should not hit the network.
/// Keywords with no registered response return an empty `Ok` result rather
/// than an error, so an unconfigured mock never fails a run by surprise.
#[derive(Debug, Default)]
pub struct MockSearch {
    responses: Mutex<HashMap<String, Vec<SearchHit>>>,
}

impl MockSearch {
    /// An empty mock: every query succeeds with zero hits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the hits to return for `keywords`.
    #[must_use]
    pub fn with_response(self, keywords: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(keywords.into(), hits);
        self
    }
}

impl SearchCapability for MockSearch {
    async fn search(&self, query: &SearchQuery) -> SearchResult {
        let hits = self
            .responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&query.keywords)
            .cloned()
            .unwrap_or_default();
        SearchResult::ok(query, hits)
    }
}
