//! # learnpath-core
//!
//! Capability traits, the data model, and the error taxonomy shared by every
//! stage of the learning-path generation engine in `learnpath-engine`. This
//! crate has no I/O of its own: it describes the seams the engine calls
//! through (an LLM, a search backend, an optional scraper, a progress sink
//! and snapshot store, a clock) and the values that flow across them.
//!
//! ## Modules
//!
//! - [`capability`] — `LlmCapability`, `SearchCapability`, `ScrapeCapability`,
//!   `ProgressSink`, `ProgressSnapshotStore`, `Clock`.
//! - [`model`] — `SearchQuery`, `SearchResult`, `Module`, `Submodule`,
//!   `EnhancedModule`, `DevelopedSubmodule`.
//! - [`progress`] — `ProgressEvent` and its `Phase`/`Action`/`Preview` fields.
//! - [`prompts`] — the named prompt-template contract (§4.11).
//! - [`request`] — `RunRequest` and its builder.
//! - [`result`] — `RunResult`.
//! - [`error`] — `RunError`, the six-kind taxonomy.

pub mod capability;
pub mod error;
pub mod model;
pub mod progress;
pub mod prompts;
pub mod request;
pub mod result;

#[doc(inline)]
pub use capability::{Clock, LlmCapability, ProgressSink, ProgressSnapshotStore, ScrapeCapability, SearchCapability, SystemClock};
#[doc(inline)]
pub use error::RunError;
#[doc(inline)]
pub use progress::{Action, Phase, Preview, ProgressEvent};
#[doc(inline)]
pub use request::RunRequest;
#[doc(inline)]
pub use result::RunResult;

/// Result type used throughout the engine's public surface.
pub type Result<T> = core::result::Result<T, RunError>;
