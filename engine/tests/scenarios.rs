//! End-to-end scenarios against `learnpath_engine::run`, driven entirely by
//! mocked capabilities — no network access, no LLM provider. One scripted
//! model and one scripted search backend, dispatched by prompt template
//! rather than call order so concurrent submodule batches stay deterministic.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use learnpath_core::{
    capability::{LlmCapability, ProgressSink, SearchCapability},
    error::RunErrorKind,
    model::{SearchHit, SearchQuery, SearchResult},
    progress::{Action, Phase, ProgressEvent},
    prompts::{Prompt, PromptTemplate},
    request::RunRequest,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct MockError(String);

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

fn queries_json(count: usize, prefix: &str) -> String {
    let items: Vec<String> = (1..=count)
        .map(|i| format!(r#"{{"keywords":"{prefix}{i}","rationale":"r{i}"}}"#))
        .collect();
    format!(r#"{{"queries":[{}]}}"#, items.join(","))
}

fn modules_json(count: usize) -> String {
    let items: Vec<String> = (1..=count)
        .map(|i| {
            format!(
                r#"{{"title":"Module {i}","description":"d{i}","core_concept":null,"learning_objective":null,"prerequisites":[],"key_components":[],"expected_outcomes":[]}}"#
            )
        })
        .collect();
    format!(r#"{{"modules":[{}]}}"#, items.join(","))
}

fn submodules_json(module_title: &str, count: usize) -> String {
    let items: Vec<String> = (1..=count)
        .map(|i| {
            let summary = format!("{module_title} submodule {i}");
            format!(
                r#"{{"title":"{summary}","description":"{summary}","depth_level":"intermediate","core_concept":null,"learning_objective":null,"key_components":[]}}"#
            )
        })
        .collect();
    format!(r#"{{"submodules":[{}]}}"#, items.join(","))
}

/// A scripted model, dispatched on [`PromptTemplate`] and variable content
/// rather than call order — submodule batches run concurrently, so an
/// ordered response queue would race.
struct ScenarioLlm {
    module_count: usize,
    submodule_count: usize,
    refinement_query_count: usize,
    /// Popped in order, one per `EvaluateResearch` call; defaults to `true`
    /// once exhausted.
    evaluate_adequate: Mutex<VecDeque<bool>>,
    evaluate_calls: Arc<AtomicUsize>,
    /// `submodule_summary` value for which authoring should fail outright.
    fail_summary: Option<String>,
    /// Cancels `token` the moment authoring succeeds for this summary,
    /// simulating a signal fired right after a batch finishes.
    cancel_after_summary: Option<(String, CancellationToken)>,
    /// When set, every `EvaluateResearch` call reports `adequate: false`
    /// regardless of `evaluate_adequate`, to drive the refinement loop to
    /// its cap deterministically.
    force_inadequate: bool,
}

impl LlmCapability for ScenarioLlm {
    type Error = MockError;

    async fn complete_text(&self, prompt: Prompt) -> Result<String, Self::Error> {
        match prompt.template() {
            PromptTemplate::SeedQueries => Ok(queries_json(5, "seed")),
            PromptTemplate::RefinementQueries => Ok(queries_json(self.refinement_query_count, "refine")),
            PromptTemplate::EvaluateResearch => {
                self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
                let adequate = !self.force_inadequate && self.evaluate_adequate.lock().unwrap().pop_front().unwrap_or(true);
                Ok(format!(r#"{{"adequate":{adequate},"missing_aspects":["balancing"]}}"#))
            }
            PromptTemplate::PlanModules => Ok(modules_json(self.module_count)),
            PromptTemplate::PlanSubmodulesForModule => {
                let module_title = prompt.variables().get("module_title").cloned().unwrap_or_default();
                Ok(submodules_json(&module_title, self.submodule_count))
            }
            PromptTemplate::SubmoduleQueries => Ok(queries_json(1, "pair")),
            PromptTemplate::SubmoduleContent => {
                let summary = prompt.variables().get("submodule_summary").cloned().unwrap_or_default();
                if self.fail_summary.as_deref() == Some(summary.as_str()) {
                    return Err(MockError(format!("authoring backend rejected {summary}")));
                }
                if let Some((target, token)) = &self.cancel_after_summary {
                    if *target == summary {
                        token.cancel();
                    }
                }
                Ok(format!("content for {summary}"))
            }
        }
    }
}

struct ScenarioSearch {
    hits_per_query: usize,
}

impl SearchCapability for ScenarioSearch {
    async fn search(&self, query: &SearchQuery) -> SearchResult {
        let hits = (0..self.hits_per_query)
            .map(|i| SearchHit {
                title: format!("{} result {i}", query.keywords),
                url: format!("https://example.com/{}/{i}", query.keywords),
                content: "snippet".into(),
                source: "mock".into(),
            })
            .collect();
        SearchResult::ok(query, hits)
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RecordingSink {
    fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, phase: Phase, action: Action) -> usize {
        self.events().iter().filter(|e| e.phase == Some(phase) && e.action == Some(action)).count()
    }
}

fn base_llm(module_count: usize, submodule_count: usize) -> ScenarioLlm {
    ScenarioLlm {
        module_count,
        submodule_count,
        refinement_query_count: 3,
        evaluate_adequate: Mutex::new(VecDeque::from([true])),
        evaluate_calls: Arc::new(AtomicUsize::new(0)),
        fail_summary: None,
        cancel_after_summary: None,
        force_inadequate: false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s1_happy_path() {
    let sink = Arc::new(RecordingSink::default());
    let request = RunRequest::new("Binary search trees", base_llm(3, 2), ScenarioSearch { hits_per_query: 2 })
        .with_module_parallelism(2)
        .with_search_parallelism(3)
        .with_submodule_parallelism(2)
        .with_observer(Arc::clone(&sink) as Arc<dyn ProgressSink>);

    let result = learnpath_engine::run(request).await.unwrap();

    assert_eq!(result.modules.len(), 3);
    for module in &result.modules {
        assert_eq!(module.submodules.len(), 2);
        for submodule in &module.submodules {
            assert!(submodule.content.starts_with("content for "), "got {:?}", submodule.content);
        }
    }
    assert!(!result.execution_steps.is_empty());
    assert_eq!(sink.count(Phase::Completion, Action::Completed), 1);
    assert_eq!(sink.count(Phase::Error, Action::Error), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s2_refinement_then_success() {
    let mut llm = base_llm(3, 2);
    llm.evaluate_adequate = Mutex::new(VecDeque::from([false, true]));
    llm.refinement_query_count = 3;

    let request = RunRequest::new("Binary search trees", llm, ScenarioSearch { hits_per_query: 2 })
        .with_module_parallelism(2)
        .with_search_parallelism(3)
        .with_submodule_parallelism(2);

    let result = learnpath_engine::run(request).await.unwrap();

    assert_eq!(result.modules.len(), 3);
    for module in &result.modules {
        assert_eq!(module.submodules.len(), 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s3_research_exhausted_still_completes() {
    let mut llm = base_llm(3, 2);
    llm.force_inadequate = true;
    llm.refinement_query_count = 2;
    let evaluate_calls = Arc::clone(&llm.evaluate_calls);

    let request = RunRequest::new("Binary search trees", llm, ScenarioSearch { hits_per_query: 1 })
        .with_module_parallelism(1)
        .with_search_parallelism(2)
        .with_submodule_parallelism(1)
        .with_max_research_loops(3);

    let result = learnpath_engine::run(request).await.unwrap();
    assert_eq!(result.modules.len(), 3);
    assert!(result.execution_steps.iter().any(|s| s.contains("exhausted")));
    // Initial evaluation plus one per refinement round run to the cap.
    assert_eq!(evaluate_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s4_per_submodule_failure_keeps_marker_content_not_fatal() {
    let mut llm = base_llm(2, 2);
    // Module 2's second submodule, per `submodules_json`'s naming scheme.
    llm.fail_summary = Some("Module 2 submodule 2".to_string());

    let request = RunRequest::new("Binary search trees", llm, ScenarioSearch { hits_per_query: 1 })
        .with_module_parallelism(1)
        .with_search_parallelism(2)
        .with_submodule_parallelism(2);

    let result = learnpath_engine::run(request).await.unwrap();

    assert_eq!(result.modules.len(), 2);
    assert_eq!(result.modules[0].submodules.len(), 2);
    assert_eq!(result.modules[1].submodules.len(), 2, "a failed pair degrades in place rather than disappearing");
    let failed = &result.modules[1].submodules[1];
    assert!(failed.content.starts_with("content generation failed"), "got {:?}", failed.content);
    assert!(result.execution_steps.iter().any(|s| s.contains("authoring failed")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s5_desired_module_count_truncates() {
    let llm = base_llm(5, 1);
    let request = RunRequest::new("Binary search trees", llm, ScenarioSearch { hits_per_query: 1 })
        .with_desired_module_count(2)
        .with_module_parallelism(1)
        .with_search_parallelism(2)
        .with_submodule_parallelism(1);

    let result = learnpath_engine::run(request).await.unwrap();

    assert_eq!(result.modules.len(), 2);
    assert!(result.execution_steps.iter().any(|s| s.contains("truncating")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s6_cancellation_mid_submodule_yields_no_completion_event() {
    let token = CancellationToken::new();
    let mut llm = base_llm(2, 1);
    // Fires once the first batch's only pair finishes authoring, so the
    // driver's next-batch cancellation check (not a mid-pair bail) is what
    // actually aborts the run.
    llm.cancel_after_summary = Some(("Module 1 submodule 1".to_string(), token.clone()));

    let sink = Arc::new(RecordingSink::default());
    let request = RunRequest::new("Binary search trees", llm, ScenarioSearch { hits_per_query: 1 })
        .with_module_parallelism(1)
        .with_search_parallelism(2)
        .with_submodule_parallelism(1)
        .with_observer(Arc::clone(&sink) as Arc<dyn ProgressSink>)
        .with_cancellation(token);

    let err = learnpath_engine::run(request).await.unwrap_err();

    assert_eq!(err.kind, RunErrorKind::Cancelled);
    assert_eq!(sink.count(Phase::Error, Action::Error), 1);
    assert_eq!(sink.count(Phase::Completion, Action::Completed), 0);
}
