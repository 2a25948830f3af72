//! Chunk summarization.
//!
//! A chunk is a contiguous slice of older messages. Summarization delegates
//! to the upstream completion service through the [`CompletionBackend`] seam;
//! any failure degrades to a deterministic literal excerpt so a single bad
//! upstream call can never fail the compression pass.

use crate::error::SummarizeError;
use async_trait::async_trait;
use skein_protocol::ChatMessage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Output-length cap requested from the summary model.
const SUMMARY_MAX_TOKENS: u32 = 400;

/// Deterministic-leaning sampling for summaries.
const SUMMARY_TEMPERATURE: f32 = 0.2;

/// Per-message prefix length used by the fallback excerpt.
const EXCERPT_CHARS: usize = 80;

/// Minimal completion seam: one prompt in, one text completion out.
///
/// The proxy implements this against the upstream API with its fast summary
/// model; tests implement it with stubs.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, SummarizeError>;
}

/// Result of summarizing one chunk.
///
/// The two paths are tagged so callers and tests can tell an LLM synopsis
/// from the degraded literal excerpt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkSummary {
    Summarized(String),
    Fallback(String),
}

impl ChunkSummary {
    pub fn text(&self) -> &str {
        match self {
            ChunkSummary::Summarized(s) | ChunkSummary::Fallback(s) => s,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ChunkSummary::Fallback(_))
    }
}

/// Summarizes chunks of older conversation via the completion backend.
pub struct ChunkSummarizer {
    backend: Arc<dyn CompletionBackend>,
    timeout: Duration,
}

impl ChunkSummarizer {
    pub fn new(backend: Arc<dyn CompletionBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Summarize one chunk. Never fails: on timeout, transport error, or an
    /// empty completion the deterministic fallback excerpt is returned.
    pub async fn summarize(
        &self,
        chunk: &[ChatMessage],
        chunk_index: usize,
        total_chunks: usize,
    ) -> ChunkSummary {
        let prompt = build_prompt(chunk, chunk_index, total_chunks);

        let call = self
            .backend
            .complete(&prompt, SUMMARY_MAX_TOKENS, SUMMARY_TEMPERATURE);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                debug!(chunk_index, total_chunks, "chunk summarized");
                ChunkSummary::Summarized(text.trim().to_string())
            }
            Ok(Ok(_)) => {
                warn!(chunk_index, total_chunks, "empty summary, using excerpt");
                ChunkSummary::Fallback(fallback_excerpt(chunk))
            }
            Ok(Err(e)) => {
                warn!(chunk_index, total_chunks, error = %e, "summary failed, using excerpt");
                ChunkSummary::Fallback(fallback_excerpt(chunk))
            }
            Err(_) => {
                warn!(
                    chunk_index,
                    total_chunks,
                    timeout_secs = self.timeout.as_secs(),
                    "summary timed out, using excerpt"
                );
                ChunkSummary::Fallback(fallback_excerpt(chunk))
            }
        }
    }
}

/// Render the chunk as a role-prefixed transcript and wrap it in an
/// instruction asking for salient facts rather than a generic summary.
fn build_prompt(chunk: &[ChatMessage], chunk_index: usize, total_chunks: usize) -> String {
    let mut transcript = String::new();
    for msg in chunk {
        transcript.push_str(msg.role.as_str());
        transcript.push_str(": ");
        transcript.push_str(&msg.content.to_plaintext());
        transcript.push('\n');
    }

    format!(
        "The following is part {}/{} of an earlier conversation. Extract the \
         salient facts in at most 300 words: named entities, decisions made, \
         relationships between participants, and any plot or state changes. \
         Do not write a generic summary; list concrete information that later \
         turns may refer back to.\n\n{}",
        chunk_index, total_chunks, transcript
    )
}

/// Degraded summary: per-message role-tagged prefixes, newline-joined.
/// O(chunk size), side-effect-free.
pub(crate) fn fallback_excerpt(chunk: &[ChatMessage]) -> String {
    chunk
        .iter()
        .map(|msg| {
            format!(
                "{}: {}",
                msg.role.as_str(),
                truncate_chars(&msg.content.to_plaintext(), EXCERPT_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}
