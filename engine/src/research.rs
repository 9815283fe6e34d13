//! C5: the initial research stage. Generates seed queries, executes them,
//! judges whether the result is sufficient, and runs a bounded refinement
//! loop when it isn't.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use learnpath_core::{
    capability::{LlmCapability, SearchCapability},
    error::RunError,
    model::{SearchQuery, SearchResult},
    progress::{Action, Phase, Preview, ProgressEvent},
};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{batch::batch, bounded::run_bounded, progress::ProgressEmitter, prompts, state::StateDelta};

/// Seed queries are requested in this exact count; a shorter or longer list
/// from the model is truncated/left short rather than padded.
const SEED_QUERY_COUNT: usize = 5;

/// Pause between successive search batches.
const INTER_BATCH_PAUSE: Duration = Duration::from_millis(500);

/// Timeout applied to each search call.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// `overall_progress` bounds for C5.
const RESEARCH_PROGRESS_START: f64 = 0.0;
const RESEARCH_PROGRESS_END: f64 = 0.35;

#[derive(Debug, Deserialize, JsonSchema)]
struct GeneratedQueries {
    queries: Vec<GeneratedQuery>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GeneratedQuery {
    keywords: String,
    rationale: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ResearchAdequacy {
    adequate: bool,
    #[serde(default)]
    missing_aspects: Vec<String>,
}

fn cancelled(emitter: &ProgressEmitter) -> RunError {
    RunError::cancelled(emitter.key().to_string())
}

/// Interpolates `overall_progress` within C5's `[0.0, 0.35]` band; `step`
/// out of `total_steps` steps, so later calls never report a lower value.
fn research_progress(step: u32, total_steps: u32) -> f64 {
    let total_steps = total_steps.max(1) as f64;
    RESEARCH_PROGRESS_START + (RESEARCH_PROGRESS_END - RESEARCH_PROGRESS_START) * (step as f64 / total_steps)
}

fn into_queries(generated: GeneratedQueries) -> Vec<SearchQuery> {
    generated
        .queries
        .into_iter()
        .map(|q| SearchQuery::new(q.keywords, q.rationale))
        .collect()
}

/// Generates the five seed queries, falling back to a single
/// topic-as-keywords query if the model call or parse fails.
async fn generate_seed_queries<Llm: LlmCapability>(llm: &Llm, topic: &str, steps: &mut Vec<String>) -> Vec<SearchQuery> {
    match llm.complete_structured::<GeneratedQueries>(prompts::seed_queries(topic)).await {
        Ok(generated) => {
            let mut queries = into_queries(generated);
            if queries.is_empty() {
                tracing::warn!("seed query generation returned no queries; using fallback single query");
                steps.push("seed query generation returned no queries; using fallback single query".to_string());
                return vec![SearchQuery::fallback(topic)];
            }
            if queries.len() > SEED_QUERY_COUNT {
                queries.truncate(SEED_QUERY_COUNT);
            } else if queries.len() < SEED_QUERY_COUNT {
                steps.push(format!("seed query generation produced {} of {SEED_QUERY_COUNT} requested queries", queries.len()));
            }
            queries
        }
        Err(err) => {
            tracing::warn!(error = %err, "seed query generation failed; using fallback single query");
            steps.push(format!("seed query generation failed ({err}); using fallback single query"));
            vec![SearchQuery::fallback(topic)]
        }
    }
}

/// Generates refinement queries targeting `missing_aspects`, with the same
/// single-query fallback as seed generation.
async fn generate_refinement_queries<Llm: LlmCapability>(
    llm: &Llm,
    topic: &str,
    missing_aspects: &[String],
    steps: &mut Vec<String>,
) -> Vec<SearchQuery> {
    match llm
        .complete_structured::<GeneratedQueries>(prompts::refinement_queries(topic, missing_aspects))
        .await
    {
        Ok(generated) => {
            let queries = into_queries(generated);
            if queries.is_empty() {
                tracing::warn!("refinement query generation returned no queries; using fallback single query");
                steps.push("refinement query generation returned no queries; using fallback single query".to_string());
                vec![SearchQuery::fallback(topic)]
            } else {
                queries
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "refinement query generation failed; using fallback single query");
            steps.push(format!("refinement query generation failed ({err}); using fallback single query"));
            vec![SearchQuery::fallback(topic)]
        }
    }
}

/// Executes `queries` in batches of at most `search_parallelism`, pausing
/// [`INTER_BATCH_PAUSE`] between batches. A batch launched after
/// cancellation was requested short-circuits to a cancellation error;
/// batches already launched still run to completion.
async fn execute_queries<Search>(
    search: &Arc<Search>,
    queries: &[SearchQuery],
    search_parallelism: usize,
    cancellation: &CancellationToken,
) -> Result<Vec<SearchResult>, RunError>
where
    Search: SearchCapability + 'static,
{
    let batches = batch(queries.to_vec(), search_parallelism);
    let batch_count = batches.len();
    let mut out = Vec::with_capacity(queries.len());

    for (index, batch_queries) in batches.into_iter().enumerate() {
        if cancellation.is_cancelled() {
            return Err(RunError::cancelled("n/a"));
        }
        let tasks: Vec<Pin<Box<dyn Future<Output = anyhow::Result<SearchResult>> + Send>>> = batch_queries
            .into_iter()
            .map(|query| {
                let search = Arc::clone(search);
                Box::pin(async move {
                    match tokio::time::timeout(SEARCH_TIMEOUT, search.search(&query)).await {
                        Ok(result) => Ok(result),
                        Err(_) => {
                            tracing::warn!(keywords = %query.keywords, timeout = ?SEARCH_TIMEOUT, "search call timed out");
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

        if index + 1 < batch_count {
            tokio::time::sleep(INTER_BATCH_PAUSE).await;
        }
    }

    Ok(out)
}

/// Judges whether `accumulated` is sufficient. A parse failure is treated as
/// "adequate" so a flaky evaluator cannot wedge the run in its refinement
/// loop forever.
async fn evaluate_research<Llm: LlmCapability>(
    llm: &Llm,
    topic: &str,
    accumulated: &[SearchResult],
    steps: &mut Vec<String>,
) -> ResearchAdequacy {
    match llm.complete_structured::<ResearchAdequacy>(prompts::evaluate_research(topic, accumulated)).await {
        Ok(verdict) => verdict,
        Err(err) => {
            tracing::warn!(error = %err, "research adequacy evaluation failed; treating research as adequate");
            steps.push(format!("research adequacy evaluation failed ({err}); treating research as adequate"));
            ResearchAdequacy { adequate: true, missing_aspects: Vec::new() }
        }
    }
}

/// Runs C5 end to end: seed queries, seed searches, adequacy evaluation, and
/// the bounded refinement loop. Returns one delta carrying the final
/// `search_results`, `research_loop_count`, and `research_adequate`, plus
/// every degradation noted along the way.
pub async fn run<Llm, Search>(
    llm: &Llm,
    search: Arc<Search>,
    topic: &str,
    search_parallelism: usize,
    max_research_loops: u32,
    emitter: &ProgressEmitter,
    cancellation: &CancellationToken,
) -> Result<StateDelta, RunError>
where
    Llm: LlmCapability,
    Search: SearchCapability + 'static,
{
    tracing::info!(topic, max_research_loops, "research started");
    let mut steps = Vec::new();
    // seed generation + seed search + initial evaluation, plus two steps per refinement round.
    let total_steps = 3 + max_research_loops * 2;
    let mut step = 0u32;

    emitter
        .emit(
            ProgressEvent::new("generating seed research queries", std::time::SystemTime::UNIX_EPOCH)
                .with_phase(Phase::SearchQueries)
                .with_action(Action::Started)
                .with_overall_progress(research_progress(step, total_steps)),
        )
        .await;

    let seed_queries = generate_seed_queries(llm, topic, &mut steps).await;
    step += 1;

    emitter
        .emit(
            ProgressEvent::new("executing seed research queries", std::time::SystemTime::UNIX_EPOCH)
                .with_phase(Phase::WebSearches)
                .with_action(Action::Processing)
                .with_overall_progress(research_progress(step, total_steps))
                .with_preview(Preview::empty().with_search_queries(seed_queries.iter().map(|q| q.keywords.clone()).collect())),
        )
        .await;

    if cancellation.is_cancelled() {
        return Err(cancelled(emitter));
    }
    let mut accumulated = execute_queries(&search, &seed_queries, search_parallelism, cancellation).await?;
    step += 1;

    emitter
        .emit(
            ProgressEvent::new("evaluating research sufficiency", std::time::SystemTime::UNIX_EPOCH)
                .with_phase(Phase::ResearchEvaluation)
                .with_action(Action::Processing)
                .with_overall_progress(research_progress(step, total_steps)),
        )
        .await;

    let mut verdict = evaluate_research(llm, topic, &accumulated, &mut steps).await;
    step += 1;
    let mut loop_count = 0u32;

    while !verdict.adequate && loop_count < max_research_loops {
        if cancellation.is_cancelled() {
            return Err(cancelled(emitter));
        }
        loop_count += 1;

        emitter
            .emit(
                ProgressEvent::new(format!("refining research (round {loop_count}/{max_research_loops})"), std::time::SystemTime::UNIX_EPOCH)
                    .with_phase(Phase::ResearchRefinement)
                    .with_action(Action::Processing)
                    .with_overall_progress(research_progress(step, total_steps)),
            )
            .await;

        let refinement_queries = generate_refinement_queries(llm, topic, &verdict.missing_aspects, &mut steps).await;
        let refinement_results = execute_queries(&search, &refinement_queries, search_parallelism, cancellation).await?;
        accumulated.extend(refinement_results);
        step += 1;

        verdict = evaluate_research(llm, topic, &accumulated, &mut steps).await;
        step += 1;
    }

    if !verdict.adequate {
        tracing::warn!(loop_count, "research refinement loop exhausted; proceeding with accumulated research");
        steps.push(format!("research refinement loop exhausted after {loop_count} round(s); proceeding with accumulated research"));
    }

    tracing::info!(loop_count, adequate = verdict.adequate, result_count = accumulated.len(), "research finished");

    Ok(StateDelta {
        search_results: Some(accumulated),
        research_loop_count: Some(loop_count),
        research_adequate: Some(verdict.adequate),
        steps,
        ..StateDelta::default()
    })
}
