//! Generates a learning path end to end against a canned in-process model,
//! logging each stage transition via `tracing`.
//!
//! Run: `cargo run --example generate_path`
//!
//! There is no bundled LLM provider — bring your own `LlmCapability`
//! implementation for a real model. This demo stands in a trivial one that
//! always returns the same scripted JSON, so the example runs with no
//! network access and no API key.

use std::sync::Arc;

use learnpath::{
    capability::{LlmCapability, ProgressSink},
    progress::ProgressEvent,
    request::RunRequest,
    run,
};
use learnpath_search::MockSearch;

struct CannedLlm;

impl LlmCapability for CannedLlm {
    type Error = std::convert::Infallible;

    async fn complete_text(&self, prompt: learnpath_core::prompts::Prompt) -> Result<String, Self::Error> {
        use learnpath_core::prompts::PromptTemplate::{
            EvaluateResearch, PlanModules, PlanSubmodulesForModule, RefinementQueries, SeedQueries, SubmoduleContent, SubmoduleQueries,
        };
        Ok(match prompt.template() {
            SeedQueries | RefinementQueries | SubmoduleQueries => {
                r#"{"queries":[{"keywords":"rust ownership","rationale":"core concept"}]}"#.to_string()
            }
            EvaluateResearch => r#"{"adequate":true,"missing_aspects":[]}"#.to_string(),
            PlanModules => {
                r#"{"modules":[{"title":"Ownership","description":"How Rust manages memory without a garbage collector.","core_concept":null,"learning_objective":null,"prerequisites":[],"key_components":[],"expected_outcomes":[]}]}"#
                    .to_string()
            }
            PlanSubmodulesForModule => {
                r#"{"submodules":[{"title":"Move semantics","description":"Values move by default.","depth_level":"intermediate","core_concept":null,"learning_objective":null,"key_components":[]}]}"#
                    .to_string()
            }
            SubmoduleContent => "Ownership ensures each value has exactly one owner at a time.".to_string(),
        })
    }
}

struct LoggingSink;

impl ProgressSink for LoggingSink {
    fn emit(&self, event: ProgressEvent) {
        tracing::info!(phase = ?event.phase, action = ?event.action, "{}", event.message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let request =
        RunRequest::new("Rust ownership", CannedLlm, MockSearch::new()).with_observer(Arc::new(LoggingSink) as Arc<dyn ProgressSink>);

    let result = run(request).await.map_err(|err| anyhow::anyhow!("{err}"))?;

    for module in &result.modules {
        println!("# {}", module.module.title);
        for submodule in &module.submodules {
            println!("  - {}: {}", submodule.title, submodule.content);
        }
    }

    Ok(())
}
