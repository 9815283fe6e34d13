//! C7 (submodule planner) and C8 (submodule developer): each module's
//! submodules are planned sequentially, then the full module×submodule grid
//! is flattened into pairs, batched, and run through each pair's own
//! query→search→author sub-pipeline.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use learnpath_core::{
    capability::{LlmCapability, ScrapeCapabilityDyn, SearchCapability},
    error::RunError,
    model::{default_summary, DepthLevel, DevelopedSubmodule, EnhancedModule, Module, SearchQuery, SearchResult, Submodule},
    progress::{Action, Phase, Preview, ProgressEvent},
    request::ExplanationStyle,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{batch::batch, bounded::run_bounded, progress::ProgressEmitter, prompts, state::StateDelta};

/// Timeout applied to an optional page fetch.
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout applied to each search call in a pair's query batch.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout applied to the free-form content-authoring call.
const LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Prefix `process_one` stamps on `content` when authoring fails, so the
/// outer pump can still surface the failure as an execution step even
/// though the pair itself degrades to marker content rather than being
/// dropped.
const AUTHORING_FAILURE_PREFIX: &str = "content generation failed: ";

/// `overall_progress` bounds for C8, spread across however many pairs exist.
const DEVELOP_PROGRESS_START: f64 = 0.45;
const DEVELOP_PROGRESS_END: f64 = 0.95;

#[derive(Debug, Deserialize, JsonSchema)]
struct PlannedSubmodules {
    submodules: Vec<PlannedSubmodule>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PlannedSubmodule {
    title: String,
    description: String,
    #[serde(default)]
    depth_level: DepthLevel,
    #[serde(default)]
    core_concept: Option<String>,
    #[serde(default)]
    learning_objective: Option<String>,
    #[serde(default)]
    key_components: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GeneratedQueries {
    queries: Vec<GeneratedQuery>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GeneratedQuery {
    keywords: String,
    rationale: String,
}

/// Interpolates `overall_progress` within C8's `[0.45, 0.95]` band. `step`
/// counts two sub-steps per pair (research, then authoring) out of
/// `total_steps = total_pairs * 2`, so progress still climbs monotonically
/// with `pair_index` even though pairs within a batch run concurrently.
fn develop_progress(step: usize, total_steps: usize) -> f64 {
    let total_steps = total_steps.max(1) as f64;
    DEVELOP_PROGRESS_START + (DEVELOP_PROGRESS_END - DEVELOP_PROGRESS_START) * (step as f64 / total_steps)
}

/// C7: plans submodules for every module, sequentially — each module's
/// prompt includes the outline so far, so planning one module at a time is
/// part of the contract, not an optimization left on the table.
pub async fn plan_submodules<Llm: LlmCapability>(
    llm: &Llm,
    topic: &str,
    modules: &[Module],
    desired_submodule_count: Option<usize>,
    emitter: &ProgressEmitter,
) -> StateDelta {
    tracing::info!(topic, module_count = modules.len(), "submodule planning started");
    emitter
        .emit(
            ProgressEvent::new("planning submodules", std::time::SystemTime::UNIX_EPOCH)
                .with_phase(Phase::SubmodulePlanning)
                .with_action(Action::Started),
        )
        .await;

    let mut steps = Vec::new();
    let mut enhanced = Vec::with_capacity(modules.len());
    let outline = prompts::format_outline(
        &modules
            .iter()
            .cloned()
            .map(|module| EnhancedModule { module, submodules: Vec::new() })
            .collect::<Vec<_>>(),
    );

    for module in modules {
        emitter
            .emit(
                ProgressEvent::new(format!("planning submodules for {}", module.title), std::time::SystemTime::UNIX_EPOCH)
                    .with_phase(Phase::SubmodulePlanning)
                    .with_action(Action::Processing)
                    .with_preview(Preview::empty().with_current_pair(module.title.clone(), "")),
            )
            .await;

        let prompt = prompts::plan_submodules_for_module(topic, module, &outline, desired_submodule_count);
        let submodules = match llm.complete_structured::<PlannedSubmodules>(prompt).await {
            Ok(planned) => {
                let mut submodules: Vec<Submodule> = planned
                    .submodules
                    .into_iter()
                    .enumerate()
                    .map(|(index, planned)| Submodule {
                        title: planned.title,
                        description: planned.description,
                        order: index as u32 + 1,
                        depth_level: planned.depth_level,
                        core_concept: planned.core_concept,
                        learning_objective: planned.learning_objective,
                        key_components: planned.key_components,
                    })
                    .collect();
                if let Some(desired) = desired_submodule_count {
                    if submodules.len() > desired {
                        steps.push(format!(
                            "submodule planner for \"{}\" returned {} submodules; truncating to the requested {desired}",
                            module.title,
                            submodules.len()
                        ));
                        submodules.truncate(desired);
                    } else if submodules.len() < desired {
                        steps.push(format!(
                            "submodule planner for \"{}\" returned {} of {desired} requested submodules; proceeding without padding",
                            module.title,
                            submodules.len()
                        ));
                    }
                }
                submodules
            }
            Err(err) => {
                tracing::warn!(module = %module.title, error = %err, "submodule planning failed; module has no submodules");
                steps.push(format!("submodule planning for \"{}\" failed ({err}); module has no submodules", module.title));
                Vec::new()
            }
        };

        enhanced.push(EnhancedModule { module: module.clone(), submodules });
    }

    tracing::info!(module_count = enhanced.len(), "submodule planning finished");

    StateDelta {
        enhanced_modules: Some(enhanced),
        steps,
        ..StateDelta::default()
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Optionally enriches each hit's content by fetching its page directly,
/// truncated to `MAX_SCRAPED_CHARS`. A fetch error leaves the original
/// snippet untouched.
async fn enrich_with_scrape(scrape: &Arc<dyn ScrapeCapabilityDyn>, results: &mut [SearchResult]) {
    for result in results.iter_mut() {
        if let learnpath_core::model::SearchItems::Ok(hits) = &mut result.items {
            for hit in hits.iter_mut() {
                match tokio::time::timeout(SCRAPE_TIMEOUT, scrape.fetch_dyn(&hit.url, SCRAPE_TIMEOUT)).await {
                    Ok((content, error)) => {
                        if error.is_none() && !content.is_empty() {
                            hit.content = truncate_chars(&content, learnpath_core::prompts::MAX_SCRAPED_CHARS);
                        }
                    }
                    Err(_) => tracing::warn!(url = %hit.url, timeout = ?SCRAPE_TIMEOUT, "page fetch timed out; keeping search snippet"),
                }
            }
        }
    }
}

/// Executes `queries` in batches of at most `search_parallelism`, mirroring
/// C5's query fan-out so a single pair's own query batch respects the same
/// bound. Each search call is wrapped in [`SEARCH_TIMEOUT`].
async fn execute_pair_queries<Search>(search: &Arc<Search>, queries: &[SearchQuery], search_parallelism: usize, cancellation: &CancellationToken) -> Vec<SearchResult>
where
    Search: SearchCapability + 'static,
{
    let batches = batch(queries.to_vec(), search_parallelism);
    let mut out = Vec::with_capacity(queries.len());

    for batch_queries in batches {
        let tasks: Vec<Pin<Box<dyn Future<Output = anyhow::Result<SearchResult>> + Send>>> = batch_queries
            .into_iter()
            .map(|query| {
                let search = Arc::clone(search);
                Box::pin(async move {
                    match tokio::time::timeout(SEARCH_TIMEOUT, search.search(&query)).await {
                        Ok(result) => Ok(result),
                        Err(_) => {
                            tracing::warn!(keywords = %query.keywords, timeout = ?SEARCH_TIMEOUT, "submodule search call timed out");
                            Ok(SearchResult::error(&query, format!("search timed out after {SEARCH_TIMEOUT:?}")))
                        }
                    }
                }) as Pin<Box<dyn Future<Output = _> + Send>>
            })
            .collect();

        for result in run_bounded(tasks, search_parallelism, cancellation).await {
            if let Ok(result) = result {
                out.push(result);
            }
        }
    }

    out
}

/// The per-pair sub-pipeline: submodule-specific queries, their searches,
/// then authoring. Degrades to fallback content on
/// any stage's failure rather than failing the pair outright — a pair only
/// returns `Err` when the run was cancelled mid-flight.
#[allow(clippy::too_many_arguments)]
async fn process_one<Llm, Search>(
    llm: Arc<Llm>,
    search: Arc<Search>,
    scrape: Option<Arc<dyn ScrapeCapabilityDyn>>,
    topic: String,
    language: String,
    explanation_style: ExplanationStyle,
    module_index: usize,
    submodule_index: usize,
    module: Module,
    submodule: Submodule,
    position: (usize, usize),
    outline: String,
    module_context: String,
    search_parallelism: usize,
    pair_index: usize,
    total_pairs: usize,
    emitter: ProgressEmitter,
    cancellation: CancellationToken,
) -> anyhow::Result<DevelopedSubmodule>
where
    Llm: LlmCapability,
    Search: SearchCapability + 'static,
{
    if cancellation.is_cancelled() {
        anyhow::bail!("cancelled");
    }
    tracing::info!(module = %module.title, submodule = %submodule.title, pair_index, "submodule development started");

    let total_steps = total_pairs * 2;
    emitter
        .emit(
            ProgressEvent::new(format!("researching \"{}\"", submodule.title), std::time::SystemTime::UNIX_EPOCH)
                .with_phase(Phase::SubmoduleResearch)
                .with_action(Action::Processing)
                .with_overall_progress(develop_progress(pair_index * 2, total_steps))
                .with_preview(Preview::empty().with_current_pair(module.title.clone(), submodule.title.clone())),
        )
        .await;

    let queries_prompt = prompts::submodule_queries(
        &topic,
        &language,
        explanation_style,
        &module,
        &submodule.title,
        &submodule.description,
        position,
        &outline,
        &module_context,
    );
    let queries: Vec<SearchQuery> = match llm.complete_structured::<GeneratedQueries>(queries_prompt).await {
        Ok(generated) if !generated.queries.is_empty() => generated
            .queries
            .into_iter()
            .map(|q| SearchQuery::new(q.keywords, q.rationale))
            .collect(),
        _ => {
            tracing::warn!(submodule = %submodule.title, "submodule query generation failed or empty; using fallback single query");
            vec![SearchQuery::fallback(&submodule.title)]
        }
    };

    if cancellation.is_cancelled() {
        anyhow::bail!("cancelled");
    }

    let mut results = execute_pair_queries(&search, &queries, search_parallelism, &cancellation).await;
    if let Some(scrape) = &scrape {
        enrich_with_scrape(scrape, &mut results).await;
    }

    if cancellation.is_cancelled() {
        anyhow::bail!("cancelled");
    }

    emitter
        .emit(
            ProgressEvent::new(format!("authoring \"{}\"", submodule.title), std::time::SystemTime::UNIX_EPOCH)
                .with_phase(Phase::SubmoduleContent)
                .with_action(Action::Processing)
                .with_overall_progress(develop_progress(pair_index * 2 + 1, total_steps))
                .with_preview(Preview::empty().with_current_pair(module.title.clone(), submodule.title.clone())),
        )
        .await;

    let content_prompt = prompts::submodule_content(
        &topic,
        &language,
        explanation_style,
        &module_context,
        &submodule.description,
        None,
        None,
        &results,
        &outline,
    );
    let content = match tokio::time::timeout(LLM_TIMEOUT, llm.complete_text(content_prompt)).await {
        Ok(Ok(text)) => {
            let trimmed = text.trim().to_string();
            if trimmed.is_empty() {
                tracing::warn!(submodule = %submodule.title, "content authoring returned empty text");
                format!("{AUTHORING_FAILURE_PREFIX}authoring returned empty content")
            } else {
                trimmed
            }
        }
        Ok(Err(err)) => {
            tracing::warn!(submodule = %submodule.title, error = %err, "content authoring failed");
            format!("{AUTHORING_FAILURE_PREFIX}{err}")
        }
        Err(_) => {
            tracing::warn!(submodule = %submodule.title, timeout = ?LLM_TIMEOUT, "content authoring timed out");
            format!("{AUTHORING_FAILURE_PREFIX}authoring timed out after {LLM_TIMEOUT:?}")
        }
    };
    let summary = default_summary(&content);

    tracing::info!(module = %module.title, submodule = %submodule.title, pair_index, "submodule development finished");

    Ok(DevelopedSubmodule::finalize(
        module_index,
        submodule_index,
        submodule.title,
        submodule.description,
        queries,
        results,
        content,
        summary,
    ))
}

/// C8's outer pump: flattens the module×submodule grid into row-major
/// `(module_index, submodule_index)` pairs, batches them by
/// `submodule_parallelism`, and runs each batch through [`run_bounded`].
#[allow(clippy::too_many_arguments)]
pub async fn develop_submodules<Llm, Search>(
    llm: Arc<Llm>,
    search: Arc<Search>,
    scrape: Option<Arc<dyn ScrapeCapabilityDyn>>,
    topic: &str,
    language: &str,
    explanation_style: ExplanationStyle,
    enhanced_modules: &[EnhancedModule],
    submodule_parallelism: usize,
    search_parallelism: usize,
    emitter: &ProgressEmitter,
    cancellation: &CancellationToken,
) -> Result<StateDelta, RunError>
where
    Llm: LlmCapability + 'static,
    Search: SearchCapability + 'static,
{
    let outline = prompts::format_outline(enhanced_modules);
    let pairs: Vec<(usize, usize)> = enhanced_modules
        .iter()
        .enumerate()
        .flat_map(|(m, module)| (0..module.submodules.len()).map(move |s| (m, s)))
        .collect();
    let total_pairs = pairs.len();
    tracing::info!(total_pairs, submodule_parallelism, "submodule development started");
    let batches = batch(pairs, submodule_parallelism);

    let mut developed = Vec::new();
    let mut steps = Vec::new();
    let mut pair_index = 0usize;

    for batch_pairs in batches {
        if cancellation.is_cancelled() {
            return Err(RunError::cancelled(emitter.key().to_string()));
        }

        emitter
            .emit(
                ProgressEvent::new("developing submodule batch", std::time::SystemTime::UNIX_EPOCH)
                    .with_phase(Phase::SubmoduleResearch)
                    .with_action(Action::Processing)
                    .with_overall_progress(develop_progress(pair_index * 2, total_pairs * 2)),
            )
            .await;

        let tasks: Vec<Pin<Box<dyn Future<Output = anyhow::Result<DevelopedSubmodule>> + Send>>> = batch_pairs
            .iter()
            .enumerate()
            .map(|(offset, &(m, s))| {
                let module = enhanced_modules[m].module.clone();
                let submodule = enhanced_modules[m].submodules[s].clone();
                let position = (s + 1, enhanced_modules[m].submodules.len());
                Box::pin(process_one(
                    Arc::clone(&llm),
                    Arc::clone(&search),
                    scrape.clone(),
                    topic.to_string(),
                    language.to_string(),
                    explanation_style,
                    m,
                    s,
                    module.clone(),
                    submodule,
                    position,
                    outline.clone(),
                    module.description,
                    search_parallelism,
                    pair_index + offset,
                    total_pairs,
                    emitter.clone(),
                    cancellation.clone(),
                )) as Pin<Box<dyn Future<Output = _> + Send>>
            })
            .collect();

        let batch_len = batch_pairs.len();
        for (index, result) in run_bounded(tasks, submodule_parallelism, cancellation).await.into_iter().enumerate() {
            match result {
                Ok(item) => {
                    if item.content.starts_with(AUTHORING_FAILURE_PREFIX) {
                        tracing::warn!(submodule = %item.title, "submodule authoring failed; kept with marker content");
                        steps.push(format!("submodule \"{}\" authoring failed; kept with marker content", item.title));
                    }
                    developed.push(item);
                }
                Err(err) => {
                    let (m, s) = batch_pairs[index];
                    tracing::warn!(module_index = m, submodule_index = s, error = %err, "submodule did not complete");
                    steps.push(format!("submodule ({m}, {s}) did not complete: {err}"));
                }
            }
        }
        pair_index += batch_len;
    }

    emitter
        .emit(
            ProgressEvent::new("finished developing submodules", std::time::SystemTime::UNIX_EPOCH)
                .with_phase(Phase::SubmoduleContent)
                .with_action(Action::Completed)
                .with_overall_progress(DEVELOP_PROGRESS_END),
        )
        .await;

    tracing::info!(developed = developed.len(), failed = steps.len(), "submodule development finished");

    Ok(StateDelta {
        developed,
        steps,
        ..StateDelta::default()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc as StdArc, Mutex};

    use learnpath_core::{
        capability::{NullProgressSink, SystemClock},
        model::SearchHit,
    };

    use super::*;

    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    impl LlmCapability for ScriptedLlm {
        type Error = std::convert::Infallible;

        async fn complete_text(&self, _prompt: learnpath_core::prompts::Prompt) -> Result<String, Self::Error> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(String::new())
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    struct EchoSearch;

    impl SearchCapability for EchoSearch {
        async fn search(&self, query: &SearchQuery) -> SearchResult {
            SearchResult::ok(
                query,
                vec![SearchHit {
                    title: "hit".into(),
                    url: "https://example.com".into(),
                    content: "content".into(),
                    source: "mock".into(),
                }],
            )
        }
    }

    fn emitter() -> ProgressEmitter {
        ProgressEmitter::new("test-run", StdArc::new(NullProgressSink), None, StdArc::new(SystemClock))
    }

    fn module(title: &str) -> Module {
        Module {
            title: title.into(),
            description: "d".into(),
            core_concept: None,
            learning_objective: None,
            prerequisites: vec![],
            key_components: vec![],
            expected_outcomes: vec![],
        }
    }

    #[tokio::test]
    async fn plan_submodules_assigns_one_based_order() {
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![
                r#"{"submodules":[{"title":"a","description":"d"},{"title":"b","description":"d"}]}"#.to_string(),
            ]),
        };
        let delta = plan_submodules(&llm, "topic", &[module("m1")], None, &emitter()).await;
        let enhanced = delta.enhanced_modules.unwrap();
        assert_eq!(enhanced[0].submodules[0].order, 1);
        assert_eq!(enhanced[0].submodules[1].order, 2);
    }

    #[tokio::test]
    async fn develop_submodules_flattens_and_completes_all_pairs() {
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![
                r#"{"queries":[{"keywords":"q","rationale":"r"}]}"#.to_string(),
                "body one".to_string(),
                r#"{"queries":[{"keywords":"q","rationale":"r"}]}"#.to_string(),
                "body two".to_string(),
            ]),
        };
        let enhanced = vec![EnhancedModule {
            module: module("m1"),
            submodules: vec![
                Submodule {
                    title: "s1".into(),
                    description: "d".into(),
                    order: 1,
                    depth_level: DepthLevel::Basic,
                    core_concept: None,
                    learning_objective: None,
                    key_components: vec![],
                },
                Submodule {
                    title: "s2".into(),
                    description: "d".into(),
                    order: 2,
                    depth_level: DepthLevel::Basic,
                    core_concept: None,
                    learning_objective: None,
                    key_components: vec![],
                },
            ],
        }];
        let token = CancellationToken::new();
        let delta = develop_submodules(
            StdArc::new(llm),
            StdArc::new(EchoSearch),
            None,
            "topic",
            "en",
            ExplanationStyle::Standard,
            &enhanced,
            1,
            2,
            &emitter(),
            &token,
        )
        .await
        .unwrap();
        assert_eq!(delta.developed.len(), 2);
    }
}
