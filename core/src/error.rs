//! The error taxonomy and the engine's single exit-mode error type.

use crate::result::RunResult;

/// The six kinds of failure the engine distinguishes. These are
/// kinds, not wrapped external error types — capabilities report through
/// `anyhow::Result`, and the engine classifies at its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    /// A capability returned a transport/5xx/timeout error.
    UpstreamUnavailable,
    /// A capability signaled 429 or equivalent after exhausting backoff retries.
    UpstreamRateLimited,
    /// LLM structured output did not conform to its schema after retries.
    StructuredParseFailed,
    /// The request failed validation.
    InvalidInput,
    /// The caller cancelled the run.
    Cancelled,
    /// A programmer invariant was violated (e.g. an out-of-range index after planning).
    InternalInvariantViolated,
}

impl RunErrorKind {
    fn label(self) -> &'static str {
        match self {
            Self::UpstreamUnavailable => "upstream unavailable",
            Self::UpstreamRateLimited => "upstream rate limited",
            Self::StructuredParseFailed => "structured output parse failed",
            Self::InvalidInput => "invalid input",
            Self::Cancelled => "cancelled",
            Self::InternalInvariantViolated => "internal invariant violated",
        }
    }
}

/// The engine's single error type. Every failure path converges here with a
/// [`RunErrorKind`], a sanitized `message`, and,
/// when the run produced partial output before failing, that output.
#[derive(Debug)]
pub struct RunError {
    /// Which of the six kinds this is.
    pub kind: RunErrorKind,
    /// Sanitized, user-visible message.
    pub message: String,
    /// Short, non-sensitive id a caller can use to cross-reference logs.
    pub correlation_id: String,
    /// Whatever the run had produced before failing, if anything.
    pub partial_result: Option<Box<RunResult>>,
}

impl RunError {
    /// Builds an error with no partial result.
    pub fn new(kind: RunErrorKind, message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            correlation_id: correlation_id.into(),
            partial_result: None,
        }
    }

    /// Attaches a partial result.
    #[must_use]
    pub fn with_partial_result(mut self, result: RunResult) -> Self {
        self.partial_result = Some(Box::new(result));
        self
    }

    /// Shorthand for [`RunErrorKind::Cancelled`].
    pub fn cancelled(correlation_id: impl Into<String>) -> Self {
        Self::new(RunErrorKind::Cancelled, "the run was cancelled", correlation_id)
    }

    /// Shorthand for [`RunErrorKind::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(RunErrorKind::InvalidInput, message, "n/a")
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (correlation_id={})",
            self.kind.label(),
            self.message,
            self.correlation_id
        )
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_correlation_id() {
        let err = RunError::new(RunErrorKind::UpstreamUnavailable, "search backend down", "abc123");
        assert_eq!(
            err.to_string(),
            "upstream unavailable: search backend down (correlation_id=abc123)"
        );
    }

    #[test]
    fn invalid_input_has_no_correlation_id_requirement() {
        let err = RunError::invalid_input("topic must not be empty");
        assert_eq!(err.kind, RunErrorKind::InvalidInput);
    }
}
