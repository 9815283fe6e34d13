//! Progress events streamed out of the engine as it runs.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::model::Module;

/// Which stage of the graph emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Run accepted, before any capability call.
    Initialization,
    /// Generating seed or refinement search queries.
    SearchQueries,
    /// Executing web searches.
    WebSearches,
    /// Evaluating whether accumulated research is sufficient.
    ResearchEvaluation,
    /// Running the refinement loop.
    ResearchRefinement,
    /// Planning modules.
    Modules,
    /// Planning submodules for a module.
    SubmodulePlanning,
    /// Running a submodule's search sub-pipeline.
    SubmoduleResearch,
    /// Authoring a submodule's content.
    SubmoduleContent,
    /// The run finished successfully.
    Completion,
    /// The run aborted.
    Error,
    /// An observer attached mid-run.
    Connection,
}

/// What kind of thing just happened within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A stage began.
    Started,
    /// A stage is midway through its work.
    Processing,
    /// A stage finished.
    Completed,
    /// A stage (or the run) failed.
    Error,
    /// An observer connected (transport-level).
    Connected,
    /// Historical progress was persisted (transport-level).
    HistorySaved,
}

/// A lightweight look-ahead at what the next event(s) will cover, attached to
/// some progress events so observers can render a "currently working on…"
/// indicator without waiting for completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    /// Planned or finalized module titles/descriptions, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<Module>>,
    /// The search queries about to run or just generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_queries: Option<Vec<String>>,
    /// The module currently being processed (title).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_module: Option<String>,
    /// The submodule currently being processed (title).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_submodule: Option<String>,
}

impl Preview {
    /// An empty preview; most events carry one.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sets `search_queries`.
    #[must_use]
    pub fn with_search_queries(mut self, queries: Vec<String>) -> Self {
        self.search_queries = Some(queries);
        self
    }

    /// Sets `current_module`/`current_submodule`.
    #[must_use]
    pub fn with_current_pair(mut self, module: impl Into<String>, submodule: impl Into<String>) -> Self {
        self.current_module = Some(module.into());
        self.current_submodule = Some(submodule.into());
        self
    }
}

/// One structured progress update, emitted through [`ProgressSink::emit`](crate::capability::ProgressSink::emit)
/// and mirrored into [`ProgressSnapshotStore::put`](crate::capability::ProgressSnapshotStore::put).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Human-readable status line.
    pub message: String,
    /// When this event was produced, from the injected [`Clock`](crate::capability::Clock).
    #[serde(with = "system_time_unix")]
    pub timestamp: SystemTime,
    /// The stage this event belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    /// Progress within the current phase, in `[0.0, 1.0]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_progress: Option<f64>,
    /// Overall run progress, in `[0.0, 1.0]`, monotonically non-decreasing
    /// within a run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_progress: Option<f64>,
    /// What kind of thing just happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// A look-ahead at in-progress work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Preview>,
}

impl ProgressEvent {
    /// Builds an event stamped with `clock`'s current time.
    pub fn new(message: impl Into<String>, now: SystemTime) -> Self {
        Self {
            message: message.into(),
            timestamp: now,
            phase: None,
            phase_progress: None,
            overall_progress: None,
            action: None,
            preview: None,
        }
    }

    /// Sets `phase`.
    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Sets `phase_progress`.
    #[must_use]
    pub fn with_phase_progress(mut self, progress: f64) -> Self {
        self.phase_progress = Some(progress);
        self
    }

    /// Sets `overall_progress`.
    #[must_use]
    pub fn with_overall_progress(mut self, progress: f64) -> Self {
        self.overall_progress = Some(progress);
        self
    }

    /// Sets `action`.
    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Sets `preview`.
    #[must_use]
    pub fn with_preview(mut self, preview: Preview) -> Self {
        self.preview = Some(preview);
        self
    }

    /// The terminal success event: `phase=completion,
    /// action=completed`, emitted at most once per run.
    pub fn completed(now: SystemTime) -> Self {
        Self::new("learning path generated", now)
            .with_phase(Phase::Completion)
            .with_action(Action::Completed)
            .with_overall_progress(1.0)
    }

    /// The terminal failure event:
    /// `phase=error, action=error`, emitted at most once per run.
    pub fn failed(message: impl Into<String>, now: SystemTime) -> Self {
        Self::new(message, now)
            .with_phase(Phase::Error)
            .with_action(Action::Error)
    }
}

pub(crate) mod system_time_unix {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let duration = value.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_secs_f64(secs.max(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_event_has_full_progress() {
        let event = ProgressEvent::completed(SystemTime::UNIX_EPOCH);
        assert_eq!(event.phase, Some(Phase::Completion));
        assert_eq!(event.action, Some(Action::Completed));
        assert_eq!(event.overall_progress, Some(1.0));
    }

    #[test]
    fn serializes_timestamp_as_seconds_since_epoch() {
        let event = ProgressEvent::new("hi", SystemTime::UNIX_EPOCH);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["timestamp"], serde_json::json!(0.0));
    }

    #[test]
    fn roundtrips_through_json() {
        let event = ProgressEvent::new("searching", SystemTime::UNIX_EPOCH)
            .with_phase(Phase::WebSearches)
            .with_preview(Preview::empty().with_search_queries(vec!["bst".into()]));
        let json = serde_json::to_string(&event).unwrap();
        let back: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
