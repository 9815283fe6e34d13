//! The engine's success output.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{DepthLevel, Module};

/// One submodule as it appears in the finalized result: planner metadata
/// plus its authored content and summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSubmodule {
    /// 1-based position within the parent module.
    pub order: u32,
    /// Submodule title.
    pub title: String,
    /// Submodule description.
    pub description: String,
    /// How advanced this submodule's treatment is.
    pub depth_level: DepthLevel,
    /// The authored body text.
    pub content: String,
    /// A short summary of `content`.
    pub summary: String,
    /// Whitespace-token count of `content`.
    pub word_count: usize,
    /// Count of distinct non-error search hits behind this submodule.
    pub resource_count: usize,
}

/// One module as it appears in the finalized result: planner metadata plus
/// its ordered, developed submodules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultModule {
    /// The planner's module record.
    #[serde(flatten)]
    pub module: Module,
    /// Developed submodules, ordered by `order`.
    pub submodules: Vec<ResultSubmodule>,
}

/// The finalized learning path returned by `learnpath_engine::run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Assigned exactly once, at the end of the finalizer (C9).
    pub run_id: Uuid,
    /// The topic the request was for.
    pub topic: String,
    /// The language the request was for.
    pub language: String,
    /// Modules, in planner order.
    pub modules: Vec<ResultModule>,
    /// A human-readable trail of what the run did, including degradation
    /// warnings (truncated counts, fallback queries, per-pair failures).
    pub execution_steps: Vec<String>,
    /// When the finalizer produced this result, from the injected `Clock`.
    #[serde(with = "crate::progress::system_time_unix")]
    pub generated_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_result_roundtrips_through_json() {
        let result = RunResult {
            run_id: Uuid::nil(),
            topic: "Binary search trees".into(),
            language: "en".into(),
            modules: vec![],
            execution_steps: vec!["planned 3 modules".into()],
            generated_at: SystemTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
