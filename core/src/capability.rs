//! Capability traits: the seams the engine calls through.
//!
//! Capabilities are injected by reference at run entry, never constructed
//! internally — there is no singleton registry and no global mutable state.

use std::{future::Future, pin::Pin, sync::Arc, time::{Duration, SystemTime}};

use schemars::{JsonSchema, schema_for};
use serde::de::DeserializeOwned;

use crate::{
    model::{SearchQuery, SearchResult},
    prompts::Prompt,
};

/// Error returned by [`LlmCapability::complete_structured`]'s default
/// implementation: either the underlying model call failed, or its output
/// never parsed into `T` after every recovery candidate was exhausted.
#[derive(Debug)]
pub enum StructuredParseError<E> {
    /// The model call itself failed.
    Llm(E),
    /// The model responded, but no parse candidate deserialized into `T`.
    Parse(anyhow::Error),
}

impl<E: std::fmt::Display> std::fmt::Display for StructuredParseError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Llm(err) => write!(f, "language model call failed: {err}"),
            Self::Parse(err) => write!(f, "structured output did not parse: {err}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for StructuredParseError<E> {}

/// Free-form and schema-constrained text generation.
///
/// Implementors only need to provide [`complete_text`](LlmCapability::complete_text);
/// [`complete_structured`](LlmCapability::complete_structured) has a default
/// that prompts for JSON-schema-conformant output and parses the response
/// with several recovery strategies, the same way a provider without native
/// structured-output support would. A provider with native support should
/// override it directly.
///
/// `complete_grounded` (web-grounded completion with citations) is not part
/// of this trait: it backs a chatbot surface outside the engine's scope and
/// the engine never calls it.
pub trait LlmCapability: Send + Sync {
    /// The error type returned by this model.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Free-form completion of `prompt`.
    fn complete_text(&self, prompt: Prompt) -> impl Future<Output = Result<String, Self::Error>> + Send;

    /// Completion constrained to a schema derived from `T`. Retries are the
    /// caller's (engine's) responsibility, not this trait's: the engine
    /// retries up to N times on parse failure, then falls back.
    fn complete_structured<T>(
        &self,
        prompt: Prompt,
    ) -> impl Future<Output = Result<T, StructuredParseError<Self::Error>>> + Send
    where
        T: JsonSchema + DeserializeOwned + Send + 'static,
    {
        structured_complete(self, prompt)
    }
}

/// How many times a parse failure is retried against the same prompt before
/// giving up and returning [`StructuredParseError::Parse`].
const MAX_STRUCTURED_PARSE_RETRIES: u32 = 2;

/// Timeout applied to each underlying [`LlmCapability::complete_text`] call.
const LLM_TIMEOUT: Duration = Duration::from_secs(120);

async fn structured_complete<M, T>(model: &M, mut prompt: Prompt) -> Result<T, StructuredParseError<M::Error>>
where
    M: LlmCapability + ?Sized,
    T: JsonSchema + DeserializeOwned + Send + 'static,
{
    let schema = schema_for!(T);
    let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_default();
    prompt.push_system_instruction(crate::prompts::structured_output_instructions(&schema_json));

    let mut last_parse_error = None;
    for attempt in 0..=MAX_STRUCTURED_PARSE_RETRIES {
        let text = match tokio::time::timeout(LLM_TIMEOUT, model.complete_text(prompt.clone())).await {
            Ok(result) => result.map_err(StructuredParseError::Llm)?,
            Err(_) => {
                return Err(StructuredParseError::Parse(anyhow::anyhow!(
                    "language model call timed out after {LLM_TIMEOUT:?}"
                )));
            }
        };

        match json_recovery::parse_with_recovery(&text) {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "structured output parse failed");
                last_parse_error = Some(err);
            }
        }
    }

    Err(StructuredParseError::Parse(last_parse_error.unwrap_or_else(|| anyhow::anyhow!("structured output never parsed"))))
}

/// Web search. Must not throw on transport failure — callers get
/// [`SearchResult`] back either way, with the failure encoded in its `items`
/// field so the caller can proceed.
pub trait SearchCapability: Send + Sync {
    /// Executes one query.
    fn search(&self, query: &SearchQuery) -> impl Future<Output = SearchResult> + Send;
}

/// Optional page-fetching capability used to enrich resource URLs downstream
/// of search. Content is truncated to
/// [`crate::MAX_SCRAPED_CHARS`](crate::prompts::MAX_SCRAPED_CHARS) by the
/// implementor.
pub trait ScrapeCapability: Send + Sync {
    /// Fetches `url`, returning `(content, error)`; `error` is set instead of
    /// the call failing outright.
    fn fetch(&self, url: &str, timeout: Duration) -> impl Future<Output = (String, Option<String>)> + Send;
}

/// Dyn-safe companion to [`ScrapeCapability`], used because `RunRequest`
/// holds this optional capability as `Arc<dyn ScrapeCapabilityDyn>` rather
/// than adding a third generic parameter for a capability most runs omit.
/// Blanket-implemented for every `ScrapeCapability`; never implement it
/// directly.
pub trait ScrapeCapabilityDyn: Send + Sync {
    /// Boxed-future version of [`ScrapeCapability::fetch`].
    fn fetch_dyn<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = (String, Option<String>)> + Send + 'a>>;
}

impl<T: ScrapeCapability> ScrapeCapabilityDyn for T {
    fn fetch_dyn<'a>(
        &'a self,
        url: &'a str,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = (String, Option<String>)> + Send + 'a>> {
        Box::pin(self.fetch(url, timeout))
    }
}

/// Delivers one [`ProgressEvent`](crate::progress::ProgressEvent) to an
/// observer. Intentionally synchronous and infallible so that
/// `Arc<dyn ProgressSink>` is usable from any stage without boxing a future
/// at every call site: a sink that needs to do real I/O owns its own
/// buffering (a channel, an internal task) rather than pushing that
/// complexity onto callers.
pub trait ProgressSink: Send + Sync {
    /// Appends `event` to this sink's queue. Must not block significantly;
    /// slow sinks should buffer internally and drain on their own task.
    fn emit(&self, event: crate::progress::ProgressEvent);
}

/// A [`ProgressSink`] that discards every event. The default when a caller
/// does not supply an observer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: crate::progress::ProgressEvent) {}
}

/// Best-effort "latest snapshot per run" store, keyed by a caller-chosen
/// string (the request's `task_id`, or a short id the engine generates when
/// none was given) with a TTL. A write failure here must never abort the
/// run — see `learnpath-engine`'s progress emitter, which marks the store
/// unusable for the remainder of the run rather than propagating the error.
///
/// Implement this trait directly; it is automatically erased into the
/// dyn-safe [`ProgressSnapshotStoreDyn`] companion so `RunRequest` can hold
/// `Arc<dyn ProgressSnapshotStoreDyn>` without requiring the engine to be
/// generic over every store implementation.
pub trait ProgressSnapshotStore: Send + Sync {
    /// Overwrites the snapshot for `key` with `event`, expiring after `ttl`.
    fn put(
        &self,
        key: &str,
        event: crate::progress::ProgressEvent,
        ttl: Duration,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Dyn-safe companion to [`ProgressSnapshotStore`], using the same
/// `ToolImpl`/`Tool`-style split as [`ScrapeCapabilityDyn`]. Blanket-
/// implemented for every `ProgressSnapshotStore`; never implement it
/// directly.
pub trait ProgressSnapshotStoreDyn: Send + Sync {
    /// Boxed-future version of [`ProgressSnapshotStore::put`].
    fn put_dyn<'a>(
        &'a self,
        key: &'a str,
        event: crate::progress::ProgressEvent,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

impl<T: ProgressSnapshotStore> ProgressSnapshotStoreDyn for T {
    fn put_dyn<'a>(
        &'a self,
        key: &'a str,
        event: crate::progress::ProgressEvent,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(self.put(key, event, ttl))
    }
}

/// Source of truth for timestamps stamped onto
/// [`ProgressEvent`](crate::progress::ProgressEvent)s and `RunResult`. Kept
/// synchronous and object-safe so tests can inject a fixed clock.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> SystemTime;
}

/// The real-time [`Clock`], backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> SystemTime {
        C::now(self)
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for Arc<S> {
    fn emit(&self, event: crate::progress::ProgressEvent) {
        S::emit(self, event);
    }
}

/// JSON extraction-and-recovery used by [`LlmCapability::complete_structured`]'s
/// default implementation: try the raw response, then a fenced code block,
/// then the first balanced `{...}`/`[...]`, then a dequoted JSON string,
/// then a `json:`-labeled blob.
mod json_recovery {
    use serde::de::DeserializeOwned;

    pub(super) fn parse_with_recovery<T: DeserializeOwned + 'static>(
        raw: &str,
    ) -> anyhow::Result<T> {
        let trimmed = raw.trim();
        let mut last_error: Option<serde_json::Error> = None;
        let mut last_candidate: Option<String> = None;

        for candidate in build_candidates(trimmed) {
            match serde_json::from_str::<T>(&candidate) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_error = Some(err);
                    last_candidate = Some(candidate);
                }
            }
        }

        if is_string_type::<T>() {
            if let Some(candidate) = last_candidate.clone() {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&candidate) {
                    let text = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    let encoded = serde_json::to_string(&text)?;
                    if let Ok(value) = serde_json::from_str::<T>(&encoded) {
                        return Ok(value);
                    }
                }
            }
        }

        let primary = last_error.map_or_else(
            || anyhow::anyhow!("structured output was empty or missing a JSON block"),
            anyhow::Error::new,
        );
        let snippet = last_candidate
            .as_deref()
            .unwrap_or(trimmed)
            .chars()
            .take(500)
            .collect::<String>();
        Err(primary.context(format!("failed to parse structured output; sample: {snippet}")))
    }

    fn build_candidates(raw: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        if !raw.is_empty() {
            candidates.push(raw.to_string());
        }
        if let Some(fenced) = strip_code_fences(raw) {
            candidates.push(fenced);
        }
        if let Some(block) = extract_json_block(raw) {
            candidates.push(block);
        }
        if let Some(dequoted) = dequote_json_string(raw) {
            candidates.push(dequoted);
        }
        if let Some(stripped) = strip_leading_label(raw, "json") {
            candidates.push(stripped);
        }

        let mut deduped = Vec::new();
        for candidate in candidates {
            if deduped.iter().all(|seen| seen != &candidate) {
                deduped.push(candidate);
            }
        }
        deduped
    }

    fn strip_code_fences(raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        let fence_start = trimmed.find("```")?;
        let after_fence = &trimmed[fence_start + 3..];
        let mut lines = after_fence.lines();
        let _maybe_lang = lines.next();
        let body = lines.collect::<Vec<_>>().join("\n");
        let content = body.rfind("```").map_or(body.as_str(), |end| &body[..end]);
        let cleaned = content.trim();
        if cleaned.is_empty() { None } else { Some(cleaned.to_string()) }
    }

    fn extract_json_block(raw: &str) -> Option<String> {
        if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
            if end >= start {
                let candidate = &raw[start..=end];
                if !candidate.trim().is_empty() {
                    return Some(candidate.trim().to_string());
                }
            }
        }
        if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
            if end >= start {
                let candidate = &raw[start..=end];
                if !candidate.trim().is_empty() {
                    return Some(candidate.trim().to_string());
                }
            }
        }
        None
    }

    fn dequote_json_string(raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if !(trimmed.starts_with('"') && trimmed.ends_with('"')) {
            return None;
        }
        let inner: String = serde_json::from_str(trimmed).ok()?;
        if inner.trim().is_empty() { None } else { Some(inner) }
    }

    fn strip_leading_label(raw: &str, label: &str) -> Option<String> {
        let trimmed = raw.trim_start();
        if !trimmed.to_ascii_lowercase().starts_with(label) {
            return None;
        }
        let stripped = trimmed[label.len()..]
            .trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == '-')
            .trim();
        if stripped.is_empty() { None } else { Some(stripped.to_string()) }
    }

    fn is_string_type<T: 'static>() -> bool {
        std::any::TypeId::of::<T>() == std::any::TypeId::of::<String>()
    }

    #[cfg(test)]
    mod tests {
        use super::parse_with_recovery;
        use serde::Deserialize;

        #[derive(Debug, Deserialize, PartialEq, Eq)]
        struct Foo {
            a: u8,
        }

        #[test]
        fn parses_plain_json() {
            let foo: Foo = parse_with_recovery(r#"{"a":1}"#).unwrap();
            assert_eq!(foo, Foo { a: 1 });
        }

        #[test]
        fn parses_code_fence_json() {
            let foo: Foo = parse_with_recovery("```json\n{\"a\":2}\n```").unwrap();
            assert_eq!(foo, Foo { a: 2 });
        }

        #[test]
        fn parses_embedded_block() {
            let foo: Foo = parse_with_recovery("noise {\"a\":3} trailing").unwrap();
            assert_eq!(foo, Foo { a: 3 });
        }

        #[test]
        fn parses_quoted_json_string() {
            let foo: Foo = parse_with_recovery(r#""{\"a\":4}""#).unwrap();
            assert_eq!(foo, Foo { a: 4 });
        }

        #[test]
        fn parses_labeled_json() {
            let foo: Foo = parse_with_recovery("json {\"a\":5}").unwrap();
            assert_eq!(foo, Foo { a: 5 });
        }

        #[test]
        fn coerces_object_to_string() {
            let value: String =
                parse_with_recovery(r#"{"title":"summary","type":"content"}"#).unwrap();
            assert!(value.contains("\"title\":\"summary\"") && value.contains("\"type\":\"content\""));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubLlm(&'static str);

    impl LlmCapability for StubLlm {
        type Error = std::convert::Infallible;

        async fn complete_text(&self, _prompt: Prompt) -> Result<String, Self::Error> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Debug, serde::Deserialize, JsonSchema, PartialEq, Eq)]
    struct Answer {
        value: u32,
    }

    #[tokio::test]
    async fn complete_structured_uses_default_recovery_parser() {
        let llm = StubLlm(r#"{"value": 42}"#);
        let prompt = Prompt::new(crate::prompts::PromptTemplate::EvaluateResearch);
        let answer: Answer = llm.complete_structured(prompt).await.unwrap();
        assert_eq!(answer, Answer { value: 42 });
    }

    #[tokio::test]
    async fn complete_structured_surfaces_parse_failure() {
        let llm = StubLlm("not json at all, sorry");
        let prompt = Prompt::new(crate::prompts::PromptTemplate::EvaluateResearch);
        let err = llm.complete_structured::<Answer>(prompt).await.unwrap_err();
        assert!(matches!(err, StructuredParseError::Parse(_)));
    }

    #[test]
    fn null_sink_accepts_any_event() {
        let sink = NullProgressSink;
        sink.emit(crate::progress::ProgressEvent::new("hi", SystemTime::UNIX_EPOCH));
    }
}
