//! Progress emitter (C4): delivers events to an observer and best-effort
//! mirrors the latest one into a snapshot store.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use learnpath_core::{
    capability::{Clock, ProgressSink, ProgressSnapshotStoreDyn},
    progress::ProgressEvent,
};
use std::sync::Arc;

/// Default TTL for a progress snapshot.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Fans one [`ProgressEvent`] out to the observer and the snapshot store.
/// Snapshot-store failures are logged and disable the store for the
/// remainder of the run rather than aborting it.
///
/// Cheaply [`Clone`]able: every field is an `Arc`, so a clone can be moved
/// into a spawned, concurrently-running submodule task while still sharing
/// one `store_unusable` flag with the original.
#[derive(Clone)]
pub struct ProgressEmitter {
    key: String,
    sink: Arc<dyn ProgressSink>,
    store: Option<Arc<dyn ProgressSnapshotStoreDyn>>,
    store_unusable: Arc<AtomicBool>,
    clock: Arc<dyn Clock>,
}

impl ProgressEmitter {
    /// Builds an emitter for one run, keyed by `key` — the request's
    /// `task_id` when the caller supplied one, otherwise a short id
    /// generated just for this run. This key is never written into
    /// `RunResult::run_id`: that id is assigned once, in the finalizer.
    pub fn new(key: impl Into<String>, sink: Arc<dyn ProgressSink>, store: Option<Arc<dyn ProgressSnapshotStoreDyn>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            key: key.into(),
            sink,
            store,
            store_unusable: Arc::new(AtomicBool::new(false)),
            clock,
        }
    }

    /// The key this emitter snapshots and correlates under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stamps `event`'s timestamp with this emitter's clock and returns it,
    /// without delivering it — used when a caller needs to both emit and
    /// inspect the stamped event.
    pub fn stamp(&self, event: ProgressEvent) -> ProgressEvent {
        ProgressEvent {
            timestamp: self.clock.now(),
            ..event
        }
    }

    /// Delivers `event` to the observer and, if a store is configured and
    /// not yet marked unusable, best-effort overwrites the run's latest
    /// snapshot.
    pub async fn emit(&self, event: ProgressEvent) {
        let event = self.stamp(event);
        self.sink.emit(event.clone());

        if self.store_unusable.load(Ordering::Relaxed) {
            return;
        }
        let Some(store) = &self.store else { return };

        if let Err(err) = store.put_dyn(&self.key, event, DEFAULT_SNAPSHOT_TTL).await {
            tracing::warn!(error = %err, key = %self.key, "progress snapshot store write failed; disabling store for remainder of run");
            self.store_unusable.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use learnpath_core::capability::SystemClock;

    use super::*;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for RecordingSink {
        fn emit(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct FailingStore;

    impl learnpath_core::capability::ProgressSnapshotStore for FailingStore {
        async fn put(&self, _key: &str, _event: ProgressEvent, _ttl: Duration) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("kv unavailable"))
        }
    }

    #[tokio::test]
    async fn delivers_to_sink() {
        let sink = Arc::new(RecordingSink::default());
        let emitter = ProgressEmitter::new("test-run", sink.clone(), None, Arc::new(SystemClock));
        emitter.emit(ProgressEvent::new("hi", std::time::SystemTime::UNIX_EPOCH)).await;
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn store_failure_disables_store_without_failing_emit() {
        let sink = Arc::new(RecordingSink::default());
        let store: Arc<dyn ProgressSnapshotStoreDyn> = Arc::new(FailingStore);
        let emitter = ProgressEmitter::new("test-run", sink.clone(), Some(store), Arc::new(SystemClock));

        emitter.emit(ProgressEvent::new("one", std::time::SystemTime::UNIX_EPOCH)).await;
        assert!(emitter.store_unusable.load(Ordering::Relaxed));

        emitter.emit(ProgressEvent::new("two", std::time::SystemTime::UNIX_EPOCH)).await;
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }
}
