//! `RunRequest`, the engine's only configuration surface.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    capability::{Clock, NullProgressSink, ProgressSink, ProgressSnapshotStoreDyn, ScrapeCapabilityDyn, SystemClock},
    error::RunError,
};

/// Prose register the authoring prompts are asked to use. Affects
/// wording only, never the module/submodule structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExplanationStyle {
    /// Balanced, textbook register.
    #[default]
    Standard,
    /// Plain language, few technical terms.
    Simple,
    /// Precise, terminology-forward.
    Technical,
    /// Leads with worked examples.
    Example,
    /// Leads with the underlying mental model.
    Conceptual,
    /// Informal and a little irreverent.
    GrumpyGenius,
}

/// Default research-refinement bound.
pub const DEFAULT_MAX_RESEARCH_LOOPS: u32 = 3;

/// A request to generate one learning path. Generic over the two
/// capabilities every run requires — `Llm` and `Search` — so the engine can
/// be called with zero-cost concrete adapters; the remaining, optional
/// capabilities (scrape, progress sink, snapshot store, clock) are stored as
/// trait objects since most runs omit or share them across many requests.
///
/// Build with [`RunRequest::new`] and the `with_*` methods, then pass to
/// `learnpath_engine::run`.
pub struct RunRequest<Llm, Search> {
    pub(crate) topic: String,
    pub(crate) llm: Llm,
    pub(crate) search: Search,
    pub(crate) module_parallelism: usize,
    pub(crate) search_parallelism: usize,
    pub(crate) submodule_parallelism: usize,
    pub(crate) desired_module_count: Option<usize>,
    pub(crate) desired_submodule_count: Option<usize>,
    pub(crate) language: String,
    pub(crate) explanation_style: ExplanationStyle,
    pub(crate) max_research_loops: u32,
    /// Caller-supplied correlation id. The engine never reads this for its
    /// own bookkeeping — `run_id` is assigned independently in the
    /// finalizer.
    pub(crate) task_id: Option<String>,
    pub(crate) scrape: Option<Arc<dyn ScrapeCapabilityDyn>>,
    pub(crate) observer: Arc<dyn ProgressSink>,
    pub(crate) snapshot_store: Option<Arc<dyn ProgressSnapshotStoreDyn>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) cancellation: CancellationToken,
}

impl<Llm, Search> RunRequest<Llm, Search> {
    /// Starts a request for `topic` using the given required capabilities,
    /// with every other field at its spec-mandated default.
    pub fn new(topic: impl Into<String>, llm: Llm, search: Search) -> Self {
        Self {
            topic: topic.into(),
            llm,
            search,
            module_parallelism: 2,
            search_parallelism: 3,
            submodule_parallelism: 2,
            desired_module_count: None,
            desired_submodule_count: None,
            language: "en".to_string(),
            explanation_style: ExplanationStyle::default(),
            max_research_loops: DEFAULT_MAX_RESEARCH_LOOPS,
            task_id: None,
            scrape: None,
            observer: Arc::new(NullProgressSink),
            snapshot_store: None,
            clock: Arc::new(SystemClock),
            cancellation: CancellationToken::new(),
        }
    }

    /// Overrides `module_parallelism` (default 2).
    #[must_use]
    pub fn with_module_parallelism(mut self, value: usize) -> Self {
        self.module_parallelism = value;
        self
    }

    /// Overrides `search_parallelism` (default 3).
    #[must_use]
    pub fn with_search_parallelism(mut self, value: usize) -> Self {
        self.search_parallelism = value;
        self
    }

    /// Overrides `submodule_parallelism` (default 2).
    #[must_use]
    pub fn with_submodule_parallelism(mut self, value: usize) -> Self {
        self.submodule_parallelism = value;
        self
    }

    /// Requests a specific module count from the planner.
    #[must_use]
    pub fn with_desired_module_count(mut self, value: usize) -> Self {
        self.desired_module_count = Some(value);
        self
    }

    /// Requests a specific submodule count per module.
    #[must_use]
    pub fn with_desired_submodule_count(mut self, value: usize) -> Self {
        self.desired_submodule_count = Some(value);
        self
    }

    /// Overrides `language` (default `"en"`).
    #[must_use]
    pub fn with_language(mut self, value: impl Into<String>) -> Self {
        self.language = value.into();
        self
    }

    /// Overrides `explanation_style` (default [`ExplanationStyle::Standard`]).
    #[must_use]
    pub fn with_explanation_style(mut self, value: ExplanationStyle) -> Self {
        self.explanation_style = value;
        self
    }

    /// Overrides `max_research_loops` (default
    /// [`DEFAULT_MAX_RESEARCH_LOOPS`]).
    #[must_use]
    pub fn with_max_research_loops(mut self, value: u32) -> Self {
        self.max_research_loops = value;
        self
    }

    /// Attaches a caller-supplied correlation id, purely for the caller's
    /// own bookkeeping.
    #[must_use]
    pub fn with_task_id(mut self, value: impl Into<String>) -> Self {
        self.task_id = Some(value.into());
        self
    }

    /// Attaches an optional page-fetching capability.
    #[must_use]
    pub fn with_scrape(mut self, scrape: Arc<dyn ScrapeCapabilityDyn>) -> Self {
        self.scrape = Some(scrape);
        self
    }

    /// Attaches a progress observer. Defaults to a sink that discards every event.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressSink>) -> Self {
        self.observer = observer;
        self
    }

    /// Attaches a best-effort latest-snapshot store.
    #[must_use]
    pub fn with_snapshot_store(mut self, store: Arc<dyn ProgressSnapshotStoreDyn>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    /// Overrides the clock used to stamp progress events and the result.
    /// Mainly useful in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attaches a cancellation token the caller can trigger independently of
    /// the engine. If never called, the engine uses a token only it can
    /// trigger, so cancellation tests can still exercise the path
    /// deterministically.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The topic this request is for.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The language this request is for.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// The cancellation token this request carries.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Consumes the request, handing every field to the caller by value.
    /// `learnpath-engine`'s driver is the only intended caller: it needs to
    /// move `llm`/`search` into `Arc`s for fan-out and read everything else
    /// for the duration of the run, which a borrow of `self` cannot support
    /// once the request is also behind a `move` closure per stage.
    pub fn into_parts(self) -> RunRequestParts<Llm, Search> {
        RunRequestParts {
            topic: self.topic,
            llm: self.llm,
            search: self.search,
            module_parallelism: self.module_parallelism,
            search_parallelism: self.search_parallelism,
            submodule_parallelism: self.submodule_parallelism,
            desired_module_count: self.desired_module_count,
            desired_submodule_count: self.desired_submodule_count,
            language: self.language,
            explanation_style: self.explanation_style,
            max_research_loops: self.max_research_loops,
            task_id: self.task_id,
            scrape: self.scrape,
            observer: self.observer,
            snapshot_store: self.snapshot_store,
            clock: self.clock,
            cancellation: self.cancellation,
        }
    }

    /// Validates the request eagerly, surfacing failures as
    /// [`RunError::invalid_input`] rather than letting a later stage panic
    /// or silently misbehave.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.topic.trim().is_empty() {
            return Err(RunError::invalid_input("topic must not be empty"));
        }
        if self.module_parallelism < 1 {
            return Err(RunError::invalid_input("module_parallelism must be at least 1"));
        }
        if self.search_parallelism < 1 {
            return Err(RunError::invalid_input("search_parallelism must be at least 1"));
        }
        if self.submodule_parallelism < 1 {
            return Err(RunError::invalid_input("submodule_parallelism must be at least 1"));
        }
        if self.language.trim().is_empty() {
            return Err(RunError::invalid_input("language must not be empty"));
        }
        Ok(())
    }
}

/// The fields of a [`RunRequest`], handed to the caller by [`RunRequest::into_parts`].
pub struct RunRequestParts<Llm, Search> {
    pub topic: String,
    pub llm: Llm,
    pub search: Search,
    pub module_parallelism: usize,
    pub search_parallelism: usize,
    pub submodule_parallelism: usize,
    pub desired_module_count: Option<usize>,
    pub desired_submodule_count: Option<usize>,
    pub language: String,
    pub explanation_style: ExplanationStyle,
    pub max_research_loops: u32,
    pub task_id: Option<String>,
    pub scrape: Option<Arc<dyn ScrapeCapabilityDyn>>,
    pub observer: Arc<dyn ProgressSink>,
    pub snapshot_store: Option<Arc<dyn ProgressSnapshotStoreDyn>>,
    pub clock: Arc<dyn Clock>,
    pub cancellation: CancellationToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let request = RunRequest::new("Binary search trees", (), ());
        assert_eq!(request.module_parallelism, 2);
        assert_eq!(request.search_parallelism, 3);
        assert_eq!(request.submodule_parallelism, 2);
        assert_eq!(request.language, "en");
        assert_eq!(request.explanation_style, ExplanationStyle::Standard);
        assert_eq!(request.max_research_loops, DEFAULT_MAX_RESEARCH_LOOPS);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn empty_topic_is_invalid() {
        let request = RunRequest::new("", (), ());
        assert!(request.validate().is_err());
    }

    #[test]
    fn zero_parallelism_is_invalid() {
        let request = RunRequest::new("topic", (), ()).with_search_parallelism(0);
        assert!(request.validate().is_err());
    }
}
