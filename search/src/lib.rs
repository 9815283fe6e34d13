//! Concrete [`SearchCapability`](learnpath_core::capability::SearchCapability)
//! adapters for the learnpath engine.
//!
//! # Default provider
//!
//! [`SearXng`] talks to a [SearXNG](https://docs.searxng.org/) instance over
//! HTTP — a free, open-source metasearch engine that needs no API key.
//!
//! ```no_run
//! use learnpath_search::SearXng;
//!
//! let provider = SearXng::new("http://localhost:8080");
//! ```
//!
//! # Testing
//!
//! [`MockSearch`] returns canned results from an in-memory table, useful for
//! integration tests that should not touch the network.

mod providers;

pub use providers::{DEFAULT_SEARXNG_URL, MockSearch, SearXng};
