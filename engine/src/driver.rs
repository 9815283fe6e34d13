//! C10: the graph driver. Runs C5 through C9 in sequence against one shared
//! [`RunState`], honoring cancellation at every stage boundary.
//!
//! The two places the pipeline loops back on itself (research refinement,
//! submodule batch pump) are each modelled as an explicit bounded loop inside
//! their own stage function ([`research::run`], [`submodules::develop_submodules`])
//! rather than as a generic declarative-edge interpreter here: the driver
//! itself is a straight-line sequence of five stage calls rather than a
//! general graph-execution engine, since the pipeline is not, in practice,
//! reconfigured at runtime.

use std::sync::Arc;

use learnpath_core::{
    capability::{Clock, LlmCapability, SearchCapability},
    error::RunError,
    progress::ProgressEvent,
    request::RunRequest,
    RunResult,
};
use uuid::Uuid;

use crate::{finalize, modules, progress::ProgressEmitter, research, state::RunState, submodules};

/// Keys the emitter/snapshot store and correlation ids for one run: the
/// caller's `task_id` when supplied, otherwise a short id generated just for
/// this purpose. Never the same value as `RunResult::run_id`, which is
/// assigned independently and only once the run reaches a terminal point.
fn correlation_key(task_id: Option<&str>) -> String {
    task_id.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Runs one full learning-path generation: C5 (research) → C6 (modules) →
/// C7 (submodule planning) → C8 (submodule development) → C9 (finalize).
///
/// Returns `Err` only for cancellation or invalid input (checked via
/// [`RunRequest::validate`]) — every other failure mode degrades in place
/// (fallback queries, empty module lists, per-pair error steps) rather than
/// aborting the run.
pub async fn run<Llm, Search>(request: RunRequest<Llm, Search>) -> Result<RunResult, RunError>
where
    Llm: LlmCapability + 'static,
    Search: SearchCapability + 'static,
{
    request.validate()?;
    let parts = request.into_parts();

    let key = correlation_key(parts.task_id.as_deref());
    tracing::info!(key = %key, topic = %parts.topic, "run started");
    let emitter = ProgressEmitter::new(key.clone(), parts.observer, parts.snapshot_store, Arc::clone(&parts.clock));
    let cancellation = parts.cancellation;

    let llm = Arc::new(parts.llm);
    let search = Arc::new(parts.search);

    let mut state = RunState::default();

    let research_delta = match research::run(
        &*llm,
        Arc::clone(&search),
        &parts.topic,
        parts.search_parallelism,
        parts.max_research_loops,
        &emitter,
        &cancellation,
    )
    .await
    {
        Ok(delta) => delta,
        Err(err) => return Err(fail(err, &state, &parts.topic, &parts.language, &*parts.clock, &emitter).await),
    };
    state.apply(research_delta);

    let module_delta = modules::run(&*llm, &parts.topic, &state.search_results, parts.desired_module_count, &emitter).await;
    state.apply(module_delta);

    if cancellation.is_cancelled() {
        let err = RunError::cancelled(key.clone());
        return Err(fail(err, &state, &parts.topic, &parts.language, &*parts.clock, &emitter).await);
    }

    let submodule_plan_delta = submodules::plan_submodules(&*llm, &parts.topic, &state.modules, parts.desired_submodule_count, &emitter).await;
    state.apply(submodule_plan_delta);

    let develop_delta = match submodules::develop_submodules(
        Arc::clone(&llm),
        Arc::clone(&search),
        parts.scrape.clone(),
        &parts.topic,
        &parts.language,
        parts.explanation_style,
        &state.enhanced_modules,
        parts.submodule_parallelism,
        parts.search_parallelism,
        &emitter,
        &cancellation,
    )
    .await
    {
        Ok(delta) => delta,
        Err(err) => return Err(fail(err, &state, &parts.topic, &parts.language, &*parts.clock, &emitter).await),
    };
    state.apply(develop_delta);

    let result = finalize::run(
        &parts.topic,
        &parts.language,
        &state.enhanced_modules,
        state.developed,
        state.steps,
        &*parts.clock,
        &emitter,
    )
    .await;
    tracing::info!(key = %key, run_id = %result.run_id, module_count = result.modules.len(), "run finished");
    Ok(result)
}

/// Emits the single terminal failure event (spec invariant 7) and attaches
/// whatever `state` had accumulated as a partial result — the
/// developed-submodule list itself is discarded, but the execution trail is
/// kept so a caller can see how far the run got. `run_id` is generated here,
/// independently of the run's correlation key, since a failed run never
/// reaches the finalizer.
async fn fail(err: RunError, state: &RunState, topic: &str, language: &str, clock: &dyn Clock, emitter: &ProgressEmitter) -> RunError {
    let now = clock.now();
    tracing::warn!(error = %err, "run failed");
    emitter.emit(ProgressEvent::failed(err.message.clone(), now)).await;

    let partial = RunResult {
        run_id: Uuid::new_v4(),
        topic: topic.to_string(),
        language: language.to_string(),
        modules: Vec::new(),
        execution_steps: state.steps.clone(),
        generated_at: now,
    };
    err.with_partial_result(partial)
}
