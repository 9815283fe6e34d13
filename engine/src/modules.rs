//! C6: the module planner. Produces the ordered module list from the
//! accumulated research, asking for a bounded module count and treating a
//! parse failure as "no modules planned" rather than crashing the run.

use learnpath_core::{
    capability::LlmCapability,
    model::{Module, SearchResult},
    progress::{Action, Phase, ProgressEvent},
};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::{progress::ProgressEmitter, prompts, state::StateDelta};

/// Default lower bound on module count when the caller did not request a
/// specific one.
pub const DEFAULT_MIN_MODULES: usize = 3;
/// Default upper bound on module count when the caller did not request a
/// specific one.
pub const DEFAULT_MAX_MODULES: usize = 7;

#[derive(Debug, Deserialize, JsonSchema)]
struct PlannedModules {
    modules: Vec<Module>,
}

/// Plans the module list for `topic` from `research`. On total parse
/// failure, returns an empty list and a `Phase::Error` progress event rather
/// than failing the run outright — a later stage (C7) that finds zero
/// modules has nothing to iterate over and the finalizer still returns
/// whatever else succeeded.
pub async fn run<Llm: LlmCapability>(
    llm: &Llm,
    topic: &str,
    research: &[SearchResult],
    desired_module_count: Option<usize>,
    emitter: &ProgressEmitter,
) -> StateDelta {
    tracing::info!(topic, ?desired_module_count, "module planning started");
    emitter
        .emit(
            ProgressEvent::new("planning modules", std::time::SystemTime::UNIX_EPOCH)
                .with_phase(Phase::Modules)
                .with_action(Action::Started),
        )
        .await;

    let mut steps = Vec::new();
    let prompt = prompts::plan_modules(topic, research, desired_module_count);

    let modules = match llm.complete_structured::<PlannedModules>(prompt).await {
        Ok(planned) => {
            let mut modules = planned.modules;
            if let Some(desired) = desired_module_count {
                if modules.len() > desired {
                    tracing::warn!(planned = modules.len(), desired, "module planner overshot requested count; truncating");
                    steps.push(format!("module planner returned {} modules; truncating to the requested {desired}", modules.len()));
                    modules.truncate(desired);
                }
            } else if modules.len() > DEFAULT_MAX_MODULES {
                tracing::warn!(planned = modules.len(), max = DEFAULT_MAX_MODULES, "module planner exceeded default maximum; truncating");
                steps.push(format!("module planner returned {} modules; truncating to the default maximum of {DEFAULT_MAX_MODULES}", modules.len()));
                modules.truncate(DEFAULT_MAX_MODULES);
            }
            modules
        }
        Err(err) => {
            tracing::warn!(error = %err, "module planning failed; no modules were planned");
            steps.push(format!("module planning failed ({err}); no modules were planned"));
            emitter
                .emit(
                    ProgressEvent::new(format!("module planning failed: {err}"), std::time::SystemTime::UNIX_EPOCH)
                        .with_phase(Phase::Error)
                        .with_action(Action::Error),
                )
                .await;
            Vec::new()
        }
    };

    if !modules.is_empty() {
        emitter
            .emit(
                ProgressEvent::new(format!("planned {} modules", modules.len()), std::time::SystemTime::UNIX_EPOCH)
                    .with_phase(Phase::Modules)
                    .with_action(Action::Completed),
            )
            .await;
    }

    tracing::info!(module_count = modules.len(), "module planning finished");

    StateDelta {
        modules: Some(modules),
        steps,
        ..StateDelta::default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use learnpath_core::capability::{NullProgressSink, SystemClock};

    use super::*;

    struct StubLlm(&'static str);

    impl LlmCapability for StubLlm {
        type Error = std::convert::Infallible;

        async fn complete_text(&self, _prompt: learnpath_core::prompts::Prompt) -> Result<String, Self::Error> {
            Ok(self.0.to_string())
        }
    }

    fn emitter() -> ProgressEmitter {
        ProgressEmitter::new("test-run", Arc::new(NullProgressSink), None, Arc::new(SystemClock))
    }

    fn module(title: &str) -> String {
        format!(
            r#"{{"title":"{title}","description":"d","core_concept":null,"learning_objective":null,"prerequisites":[],"key_components":[],"expected_outcomes":[]}}"#
        )
    }

    #[tokio::test]
    async fn truncates_to_desired_count_when_planner_overshoots() {
        let body = format!(r#"{{"modules":[{},{},{}]}}"#, module("a"), module("b"), module("c"));
        let llm = StubLlm(Box::leak(body.into_boxed_str()));
        let delta = run(&llm, "topic", &[], Some(2), &emitter()).await;
        let modules = delta.modules.unwrap();
        assert_eq!(modules.len(), 2);
        assert!(delta.steps.iter().any(|s| s.contains("truncating")));
    }

    #[tokio::test]
    async fn parse_failure_yields_empty_modules_and_error_step() {
        let llm = StubLlm("not json");
        let delta = run(&llm, "topic", &[], None, &emitter()).await;
        assert!(delta.modules.unwrap().is_empty());
        assert!(delta.steps.iter().any(|s| s.contains("failed")));
    }
}
