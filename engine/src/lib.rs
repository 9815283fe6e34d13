//! The learning-path generation engine: research a topic, plan modules and
//! submodules, develop each submodule's content concurrently, and return a
//! finished [`RunResult`].
//!
//! The external interface is exactly one function, [`run`]. Everything else
//! in this crate is internal plumbing: [`driver`] sequences the five stages,
//! [`state`] holds the value they thread through, [`batch`]/[`bounded`]
//! implement the two concurrency primitives every stage shares, and
//! [`progress`] fans status updates out to the caller's observer.

mod batch;
mod bounded;
mod driver;
mod finalize;
mod modules;
mod progress;
mod prompts;
mod research;
mod state;
mod submodules;

use learnpath_core::{
    capability::{LlmCapability, SearchCapability},
    error::RunError,
    request::RunRequest,
    RunResult,
};

/// Generates one learning path for `request.topic()`, running research,
/// planning, and content development to completion.
///
/// Returns `Ok` with the finished path, or `Err` with a [`RunError`] that, if
/// the run had already produced partial output, carries it via
/// `RunError::partial_result`.
pub async fn run<Llm, Search>(request: RunRequest<Llm, Search>) -> Result<RunResult, RunError>
where
    Llm: LlmCapability + 'static,
    Search: SearchCapability + 'static,
{
    driver::run(request).await
}
