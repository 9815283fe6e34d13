//! Run State: the shared value nodes read from and write
//! deltas into. The driver (`driver.rs`) owns merging; stage functions never
//! mutate `RunState` directly, only produce a [`StateDelta`].

use std::collections::HashMap;

use learnpath_core::model::{DevelopedSubmodule, EnhancedModule, Module, SearchResult};

/// One `(module_index, submodule_index)` pair's progress through its
/// sub-pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairState {
    /// Enqueued, not yet started.
    Pending,
    /// Generating submodule-specific search queries.
    QueriesRunning,
    /// Executing those queries.
    SearchesRunning,
    /// Authoring content.
    Authoring,
    /// Finished successfully; the result lives in `RunState::developed`.
    Completed,
    /// Failed at some stage; terminal, does not block peers.
    Error(String),
}

/// The engine's shared, append-only-per-field state. Created at
/// run entry, mutated only through [`RunState::apply`], discarded when the
/// run terminates.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Flat list of every search result gathered so far (initial research +
    /// any refinement rounds).
    pub search_results: Vec<SearchResult>,
    /// How many refinement rounds have run (invariant 3:
    /// `research_loop_count <= max_research_loops`).
    pub research_loop_count: u32,
    /// The evaluator's most recent verdict.
    pub research_adequate: bool,
    /// Planner output before submodule planning (C6).
    pub modules: Vec<Module>,
    /// Modules with their planned submodules attached (C7).
    pub enhanced_modules: Vec<EnhancedModule>,
    /// `(module_index, submodule_index)` pairs, batched by
    /// `submodule_parallelism` (C8 outer pump).
    pub submodule_batches: Vec<Vec<(usize, usize)>>,
    /// Index of the next batch to process.
    pub current_batch: usize,
    /// Per-pair status, keyed by `(module_index, submodule_index)`.
    pub in_flight: HashMap<(usize, usize), PairState>,
    /// Completed submodule content, at most one entry per pair (invariant 5).
    pub developed: Vec<DevelopedSubmodule>,
    /// Append-only human-readable trail, surfaced as `RunResult::execution_steps`.
    pub steps: Vec<String>,
}

/// A node's output: the fields it wrote this step. `None` means "this node
/// did not touch this field" (scalar fields keep their prior value);
/// `steps`/`developed` are always additive.
#[derive(Debug, Default)]
pub struct StateDelta {
    /// Overwrites `RunState::search_results` if set.
    pub search_results: Option<Vec<SearchResult>>,
    /// Last-writer-wins.
    pub research_loop_count: Option<u32>,
    /// Last-writer-wins.
    pub research_adequate: Option<bool>,
    /// Replace-if-provided.
    pub modules: Option<Vec<Module>>,
    /// Replace-if-provided.
    pub enhanced_modules: Option<Vec<EnhancedModule>>,
    /// Replace-if-provided.
    pub submodule_batches: Option<Vec<Vec<(usize, usize)>>>,
    /// Last-writer-wins.
    pub current_batch: Option<usize>,
    /// Upserted into `RunState::in_flight`.
    pub in_flight_updates: Vec<((usize, usize), PairState)>,
    /// Appended to `RunState::developed`, then de-duplicated by
    /// `(module_index, submodule_index)` keeping the latest.
    pub developed: Vec<DevelopedSubmodule>,
    /// Appended to `RunState::steps`.
    pub steps: Vec<String>,
}

impl StateDelta {
    /// A delta that only appends a step — the common case for a fallback or
    /// warning note.
    pub fn step(message: impl Into<String>) -> Self {
        Self {
            steps: vec![message.into()],
            ..Self::default()
        }
    }
}

impl RunState {
    /// Merges `delta` into this state.
    pub fn apply(&mut self, delta: StateDelta) {
        if let Some(value) = delta.search_results {
            self.search_results = value;
        }
        if let Some(value) = delta.research_loop_count {
            self.research_loop_count = value;
        }
        if let Some(value) = delta.research_adequate {
            self.research_adequate = value;
        }
        if let Some(value) = delta.modules {
            self.modules = value;
        }
        if let Some(value) = delta.enhanced_modules {
            self.enhanced_modules = value;
        }
        if let Some(value) = delta.submodule_batches {
            self.submodule_batches = value;
        }
        if let Some(value) = delta.current_batch {
            self.current_batch = value;
        }
        for (key, status) in delta.in_flight_updates {
            self.in_flight.insert(key, status);
        }
        for developed in delta.developed {
            let key = (developed.module_index, developed.submodule_index);
            self.developed.retain(|existing| (existing.module_index, existing.submodule_index) != key);
            self.developed.push(developed);
        }
        self.steps.extend(delta.steps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn developed(module_index: usize, submodule_index: usize, content: &str) -> DevelopedSubmodule {
        DevelopedSubmodule::finalize(
            module_index,
            submodule_index,
            "t".into(),
            "d".into(),
            vec![],
            vec![],
            content.into(),
            "s".into(),
        )
    }

    #[test]
    fn scalar_fields_are_last_writer_wins() {
        let mut state = RunState::default();
        state.apply(StateDelta {
            research_loop_count: Some(1),
            ..StateDelta::default()
        });
        state.apply(StateDelta {
            research_loop_count: Some(2),
            ..StateDelta::default()
        });
        assert_eq!(state.research_loop_count, 2);
    }

    #[test]
    fn steps_are_appended_not_replaced() {
        let mut state = RunState::default();
        state.apply(StateDelta::step("a"));
        state.apply(StateDelta::step("b"));
        assert_eq!(state.steps, vec!["a", "b"]);
    }

    #[test]
    fn developed_dedupes_by_pair_keeping_latest() {
        let mut state = RunState::default();
        state.apply(StateDelta {
            developed: vec![developed(0, 0, "first")],
            ..StateDelta::default()
        });
        state.apply(StateDelta {
            developed: vec![developed(0, 0, "second")],
            ..StateDelta::default()
        });
        assert_eq!(state.developed.len(), 1);
        assert_eq!(state.developed[0].content, "second");
    }

    #[test]
    fn untouched_scalar_field_keeps_prior_value() {
        let mut state = RunState::default();
        state.apply(StateDelta {
            research_adequate: Some(true),
            ..StateDelta::default()
        });
        state.apply(StateDelta::step("unrelated"));
        assert!(state.research_adequate);
    }
}
