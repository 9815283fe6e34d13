//! Web search provider implementations.

mod mock;
mod searxng;

pub use mock::MockSearch;
pub use searxng::{DEFAULT_SEARXNG_URL, SearXng};
