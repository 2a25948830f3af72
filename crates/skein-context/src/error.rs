//! Summarization error types

use thiserror::Error;

/// Failure of a single chunk-summary call.
///
/// These are never surfaced to the proxy caller; the summarizer recovers with
/// a deterministic fallback excerpt and only logs the cause.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summary call timed out after {0}s")]
    Timeout(u64),

    #[error("summary backend error: {0}")]
    Backend(String),

    #[error("summary response was empty")]
    EmptyResponse,
}
