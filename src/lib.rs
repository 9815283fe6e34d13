//! # learnpath
//!
//! High level façade crate that re-exports the public surface of
//! [`learnpath_core`] and [`learnpath_engine`]. Pull this crate into your
//! binary to generate a hierarchical learning path for any topic by wiring
//! up your own [`LlmCapability`] and [`SearchCapability`] implementations
//! (or reach for [`learnpath_search`] for a ready-made web-search adapter).
//!
//! ## Example
//!
//! ```no_run
//! use learnpath::{RunRequest, run};
//!
//! # async fn demo(llm: impl learnpath::LlmCapability + Clone, search: impl learnpath::SearchCapability + Clone) -> learnpath::Result<()> {
//! let request = RunRequest::new("Binary search trees", llm, search);
//! let result = run(request).await?;
//! println!("generated {} modules", result.modules.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## What's inside?
//!
//! - [`learnpath_core`] — capability traits, the data model, and the error
//!   taxonomy shared by every stage of the pipeline.
//! - [`learnpath_engine`] — the graph driver: research, planning,
//!   submodule development, and finalization.
//! - [`search`] — an optional concrete [`SearchCapability`] adapter, useful
//!   for demos and integration tests.

pub use learnpath_core::*;
pub use learnpath_engine::run;

/// Web-search capability adapters (SearXNG, in-memory mock).
pub use learnpath_search as search;
