//! The data model flowing between stages: queries, search results, and the
//! module/submodule hierarchy.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One query issued against [`SearchCapability`](crate::capability::SearchCapability),
/// paired with the reasoning that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The literal keywords sent to the search backend.
    pub keywords: String,
    /// Why this query was chosen, carried through for prompts and debugging.
    pub rationale: String,
}

impl SearchQuery {
    /// Builds a query from keywords and a rationale.
    pub fn new(keywords: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            rationale: rationale.into(),
        }
    }

    /// The degraded single-query fallback used when structured query
    /// generation exhausts its retries.
    pub fn fallback(keywords: impl Into<String>) -> Self {
        Self::new(keywords, "fallback")
    }
}

/// One hit returned by a search backend for a single query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Page or document title.
    pub title: String,
    /// Source URL.
    pub url: String,
    /// Snippet or excerpt content.
    pub content: String,
    /// Origin label (e.g. the search engine or provider name).
    pub source: String,
}

/// A search backend never throws on transport failure; it reports failure
/// through this tagged alternative to `Vec<SearchHit>` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum SearchItems {
    /// The query succeeded and returned these hits (possibly empty).
    Ok(Vec<SearchHit>),
    /// The query failed; carries a sanitized error message, never a stack trace.
    Error(String),
}

impl SearchItems {
    /// The hits, if the query succeeded; `None` on error.
    pub fn hits(&self) -> Option<&[SearchHit]> {
        match self {
            Self::Ok(hits) => Some(hits),
            Self::Error(_) => None,
        }
    }

    /// True if this query failed.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// The outcome of executing one [`SearchQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The keywords that were searched.
    pub query: String,
    /// The rationale carried from the originating `SearchQuery`.
    pub rationale: String,
    /// Hits, or a sanitized error marker.
    pub items: SearchItems,
}

impl SearchResult {
    /// Builds a successful result.
    pub fn ok(query: &SearchQuery, hits: Vec<SearchHit>) -> Self {
        Self {
            query: query.keywords.clone(),
            rationale: query.rationale.clone(),
            items: SearchItems::Ok(hits),
        }
    }

    /// Builds a failed result carrying a sanitized message.
    pub fn error(query: &SearchQuery, message: impl Into<String>) -> Self {
        Self {
            query: query.keywords.clone(),
            rationale: query.rationale.clone(),
            items: SearchItems::Error(message.into()),
        }
    }

    /// Non-error hit count, used to compute `DevelopedSubmodule::resource_count`.
    pub fn resource_count(&self) -> usize {
        self.items.hits().map_or(0, <[SearchHit]>::len)
    }
}

/// How advanced a submodule's treatment of its topic should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DepthLevel {
    /// No prior exposure assumed.
    Basic,
    /// Some prior exposure assumed.
    Intermediate,
    /// Solid foundation assumed; covers nuance.
    Advanced,
    /// Practitioner-level depth.
    Expert,
}

impl Default for DepthLevel {
    fn default() -> Self {
        Self::Intermediate
    }
}

/// A module, as produced by the module planner (C6), before submodule
/// planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Module {
    /// Module title.
    pub title: String,
    /// Module description.
    pub description: String,
    /// The single idea the module organizes itself around, if the planner
    /// supplied one.
    pub core_concept: Option<String>,
    /// What the learner should be able to do after the module.
    pub learning_objective: Option<String>,
    /// Things the learner is assumed to already know.
    pub prerequisites: Vec<String>,
    /// Named sub-topics the module covers.
    pub key_components: Vec<String>,
    /// Concrete outcomes the module targets.
    pub expected_outcomes: Vec<String>,
}

/// A submodule as produced by the submodule planner (C7), ordered within its
/// parent module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submodule {
    /// Submodule title.
    pub title: String,
    /// Submodule description.
    pub description: String,
    /// 1-based position within the parent module (invariant 2: `order =
    /// position + 1`).
    pub order: u32,
    /// How advanced this submodule's treatment should be.
    pub depth_level: DepthLevel,
    /// The single idea the submodule organizes itself around, if supplied.
    pub core_concept: Option<String>,
    /// What the learner should be able to do after the submodule.
    pub learning_objective: Option<String>,
    /// Named sub-topics the submodule covers.
    pub key_components: Vec<String>,
}

/// A [`Module`] with its planned submodules attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancedModule {
    /// The underlying module.
    #[serde(flatten)]
    pub module: Module,
    /// Submodules, ordered by `order`.
    pub submodules: Vec<Submodule>,
}

/// The fully authored content for one `(module, submodule)` pair, produced by
/// C8's per-pair sub-pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevelopedSubmodule {
    /// Index into the final `modules` list.
    pub module_index: usize,
    /// Index into the parent module's `submodules` list.
    pub submodule_index: usize,
    /// Copied from the planned submodule, for convenience at the call site.
    pub title: String,
    /// Copied from the planned submodule.
    pub description: String,
    /// The submodule-specific queries that were issued.
    pub queries: Vec<SearchQuery>,
    /// The results of those queries.
    pub results: Vec<SearchResult>,
    /// The authored body text.
    pub content: String,
    /// A short summary: an explicit LLM-produced summary if one exists, else
    /// the first ~200 characters of `content`.
    pub summary: String,
    /// Whitespace-token count of `content`, computed by the finalizer.
    pub word_count: usize,
    /// Count of distinct non-error `SearchHit`s across `results`.
    pub resource_count: usize,
}

impl DevelopedSubmodule {
    /// Computes `word_count` and `resource_count` from `content`/`results`
    /// and a pre-determined summary; called by the finalizer (C9).
    pub fn finalize(
        module_index: usize,
        submodule_index: usize,
        title: String,
        description: String,
        queries: Vec<SearchQuery>,
        results: Vec<SearchResult>,
        content: String,
        summary: String,
    ) -> Self {
        let word_count = content.split_whitespace().count();
        let resource_count = results.iter().map(SearchResult::resource_count).sum();
        Self {
            module_index,
            submodule_index,
            title,
            description,
            queries,
            results,
            content,
            summary,
            word_count,
            resource_count,
        }
    }
}

/// Default summary length in characters.
pub const SUMMARY_CHARS: usize = 200;

/// Produces the default summary for authored content: the first
/// [`SUMMARY_CHARS`] characters, trimmed, suffixed with `"..."` if the
/// content was truncated.
pub fn default_summary(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(SUMMARY_CHARS) {
        Some((byte_idx, _)) => format!("{}...", trimmed[..byte_idx].trim_end()),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_items_hits_none_on_error() {
        let items = SearchItems::Error("timed out".into());
        assert!(items.is_error());
        assert_eq!(items.hits(), None);
    }

    #[test]
    fn submodule_order_is_one_based_by_convention() {
        let sub = Submodule {
            title: "intro".into(),
            description: "desc".into(),
            order: 1,
            depth_level: DepthLevel::Basic,
            core_concept: None,
            learning_objective: None,
            key_components: vec![],
        };
        assert_eq!(sub.order, 1);
    }

    #[test]
    fn default_summary_short_content_is_unchanged() {
        assert_eq!(default_summary("  hello world  "), "hello world");
    }

    #[test]
    fn default_summary_truncates_long_content() {
        let long = "word ".repeat(100);
        let summary = default_summary(&long);
        assert!(summary.ends_with("..."));
        assert!(summary.len() < long.len());
    }

    #[test]
    fn developed_submodule_finalize_counts_words_and_resources() {
        let query = SearchQuery::new("bst", "seed");
        let results = vec![
            SearchResult::ok(
                &query,
                vec![SearchHit {
                    title: "t".into(),
                    url: "u".into(),
                    content: "c".into(),
                    source: "s".into(),
                }],
            ),
            SearchResult::error(&query, "boom"),
        ];
        let developed = DevelopedSubmodule::finalize(
            0,
            0,
            "title".into(),
            "desc".into(),
            vec![query],
            results,
            "four words here now".into(),
            "summary".into(),
        );
        assert_eq!(developed.word_count, 4);
        assert_eq!(developed.resource_count, 1);
    }
}
