//! The compression policy.
//!
//! Given a full conversation, decide among no-op, tail trim, single-summary
//! compression, and multi-chunk parallel-summary compression, and produce a
//! bounded replacement conversation. The input is never mutated; every path
//! produces a fresh message vector.
//!
//! Ordering of the result is always: pinned system message (if kept), then
//! synthetic summary, then the preserved recent suffix verbatim. The recent
//! suffix is never summarized.

use crate::estimate::{CharEstimator, TokenEstimator};
use crate::summarize::{ChunkSummarizer, CompletionBackend};
use futures::future::join_all;
use skein_protocol::{ChatMessage, Role};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Tunables for one compression pass. Built once at startup and passed in
/// explicitly; the policy reads no ambient state.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Above this many messages the conversation no longer passes through.
    pub max_context_messages: usize,
    /// The most recent N non-system messages are always kept verbatim.
    pub preserve_recent: usize,
    /// At or below this many older messages, trim instead of summarizing.
    pub summarization_trigger: usize,
    /// Chunk size for the aggressive multi-chunk path.
    pub chunk_size: usize,
    /// Above this many total messages the aggressive path is taken.
    pub aggressive_threshold: usize,
    /// Estimated-token ceiling that forces compression even under the
    /// message-count limit.
    pub emergency_token_limit: usize,
    /// Keep the pinned system message at the front of the result.
    pub preserve_system_prompt: bool,
    /// Wall-clock bound for each chunk-summary call.
    pub summary_timeout: Duration,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_context_messages: 50,
            preserve_recent: 15,
            summarization_trigger: 20,
            chunk_size: 30,
            aggressive_threshold: 100,
            emergency_token_limit: 100_000,
            preserve_system_prompt: true,
            summary_timeout: Duration::from_secs(15),
        }
    }
}

/// Which path the policy took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionStrategy {
    /// Input returned unchanged.
    Passthrough,
    /// Older messages dropped without summarization.
    TailTrim,
    /// All older messages summarized as a single chunk.
    Standard,
    /// Older messages split into chunks summarized concurrently.
    Aggressive,
}

/// Before/after accounting for one pass, for logs and tests.
#[derive(Debug, Clone)]
pub struct CompressionReport {
    pub strategy: CompressionStrategy,
    pub messages_before: usize,
    pub messages_after: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub chunk_count: usize,
}

/// The bounded replacement conversation plus its report.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub messages: Vec<ChatMessage>,
    pub report: CompressionReport,
}

/// Applies the compression policy to one conversation.
pub struct Compressor {
    config: CompressionConfig,
    summarizer: ChunkSummarizer,
    estimator: Arc<dyn TokenEstimator>,
}

impl Compressor {
    pub fn new(config: CompressionConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        let summarizer = ChunkSummarizer::new(backend, config.summary_timeout);
        Self {
            config,
            summarizer,
            estimator: Arc::new(CharEstimator),
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Produce a bounded replacement for `conversation`.
    ///
    /// Deterministic given the same input and config, except for the literal
    /// wording of model-produced summaries.
    pub async fn compress(&self, conversation: &[ChatMessage]) -> CompressionOutcome {
        let cfg = &self.config;
        let total = conversation.len();
        let tokens_before = self.estimator.estimate_conversation(conversation);

        if total <= cfg.max_context_messages && tokens_before < cfg.emergency_token_limit {
            debug!(total, tokens_before, "within limits, passing through");
            return self.outcome(
                conversation.to_vec(),
                CompressionStrategy::Passthrough,
                total,
                tokens_before,
                0,
            );
        }

        // The first system message is pinned; later system-role entries are
        // ordinary turns.
        let (pinned, others) = split_pinned(conversation, cfg.preserve_system_prompt);

        let keep = cfg.preserve_recent.min(others.len());
        let (older, recent) = others.split_at(others.len() - keep);

        if older.is_empty() {
            let messages = assemble(pinned, None, recent);
            return self.outcome(messages, CompressionStrategy::TailTrim, total, tokens_before, 0);
        }

        if older.len() <= cfg.summarization_trigger {
            // Modest overflow: not worth an upstream round-trip. Keep the most
            // recent max_context_messages non-system turns.
            let tail_len = cfg.max_context_messages.min(others.len());
            let tail = &others[others.len() - tail_len..];
            let messages = assemble(pinned, None, tail);
            return self.outcome(messages, CompressionStrategy::TailTrim, total, tokens_before, 0);
        }

        let (summary, strategy, chunk_count) = if total > cfg.aggressive_threshold {
            let chunks: Vec<&[ChatMessage]> = older.chunks(cfg.chunk_size).collect();
            let count = chunks.len();
            let pending = chunks
                .iter()
                .enumerate()
                .map(|(i, chunk)| self.summarizer.summarize(chunk, i + 1, count));

            // Join barrier: wait for every chunk; a failed chunk has already
            // resolved to its fallback excerpt without affecting siblings.
            let summaries = join_all(pending).await;

            let combined = summaries
                .iter()
                .enumerate()
                .map(|(i, s)| format!("[Section {}/{}]\n{}", i + 1, count, s.text()))
                .collect::<Vec<_>>()
                .join("\n\n");
            (combined, CompressionStrategy::Aggressive, count)
        } else {
            let summary = self.summarizer.summarize(older, 1, 1).await;
            (summary.text().to_string(), CompressionStrategy::Standard, 1)
        };

        let summary_message = ChatMessage::system(format!(
            "Summary of {} earlier messages:\n\n{}",
            older.len(),
            summary
        ));

        let messages = assemble(pinned, Some(summary_message), recent);
        self.outcome(messages, strategy, total, tokens_before, chunk_count)
    }

    fn outcome(
        &self,
        messages: Vec<ChatMessage>,
        strategy: CompressionStrategy,
        messages_before: usize,
        tokens_before: usize,
        chunk_count: usize,
    ) -> CompressionOutcome {
        let tokens_after = self.estimator.estimate_conversation(&messages);
        let report = CompressionReport {
            strategy,
            messages_before,
            messages_after: messages.len(),
            tokens_before,
            tokens_after,
            chunk_count,
        };
        if strategy != CompressionStrategy::Passthrough {
            info!(
                ?strategy,
                messages_before,
                messages_after = report.messages_after,
                tokens_before,
                tokens_after,
                chunk_count,
                "conversation compressed"
            );
        }
        CompressionOutcome { messages, report }
    }
}

/// Split out the pinned system message, preserving the order of everything
/// else. When preservation is off, every message is an ordinary turn.
fn split_pinned(
    conversation: &[ChatMessage],
    preserve_system: bool,
) -> (Option<ChatMessage>, Vec<ChatMessage>) {
    if !preserve_system {
        return (None, conversation.to_vec());
    }
    let pinned_idx = conversation.iter().position(|m| m.role == Role::System);
    let others = conversation
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != pinned_idx)
        .map(|(_, m)| m.clone())
        .collect();
    (pinned_idx.map(|i| conversation[i].clone()), others)
}

fn assemble(
    pinned: Option<ChatMessage>,
    summary: Option<ChatMessage>,
    recent: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(recent.len() + 2);
    if let Some(p) = pinned {
        out.push(p);
    }
    if let Some(s) = summary {
        out.push(s);
    }
    out.extend_from_slice(recent);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SummarizeError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls; optionally fails or delays so tests can drive the
    /// fallback and ordering behavior.
    struct StubBackend {
        calls: AtomicUsize,
        fail: bool,
        stagger: bool,
    }

    impl StubBackend {
        fn ok() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail: false, stagger: false })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail: true, stagger: false })
        }

        fn staggered() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), fail: false, stagger: true })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for StubBackend {
        async fn complete(&self, prompt: &str, _: u32, _: f32) -> Result<String, SummarizeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SummarizeError::Backend("boom".into()));
            }
            if self.stagger {
                // Earlier chunks finish later.
                tokio::time::sleep(Duration::from_millis(500 - 100 * n as u64)).await;
            }
            Ok(format!("synopsis #{} ({} prompt chars)", n + 1, prompt.len()))
        }
    }

    fn turns(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("user turn {i}"))
                } else {
                    ChatMessage::assistant(format!("assistant turn {i}"))
                }
            })
            .collect()
    }

    fn config() -> CompressionConfig {
        CompressionConfig {
            max_context_messages: 25,
            preserve_recent: 15,
            summarization_trigger: 20,
            chunk_size: 30,
            aggressive_threshold: 100,
            ..CompressionConfig::default()
        }
    }

    #[tokio::test]
    async fn short_conversation_passes_through_unchanged() {
        // 10 messages against a threshold of 25.
        let backend = StubBackend::ok();
        let compressor = Compressor::new(config(), backend.clone());
        let input = turns(10);

        let out = compressor.compress(&input).await;
        assert_eq!(out.report.strategy, CompressionStrategy::Passthrough);
        assert_eq!(out.messages, input);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn standard_path_yields_single_summary_plus_recent() {
        // 40 messages -> [1 summary] + 15 verbatim recent.
        let backend = StubBackend::ok();
        let compressor = Compressor::new(config(), backend.clone());
        let input = turns(40);

        let out = compressor.compress(&input).await;
        assert_eq!(out.report.strategy, CompressionStrategy::Standard);
        assert_eq!(out.messages.len(), 16);
        assert_eq!(out.report.chunk_count, 1);
        assert_eq!(backend.calls(), 1);

        assert_eq!(out.messages[0].role, Role::System);
        assert!(out.messages[0]
            .content
            .to_plaintext()
            .starts_with("Summary of 25 earlier messages:"));
        assert_eq!(&out.messages[1..], &input[25..]);
    }

    #[tokio::test]
    async fn aggressive_path_chunks_and_preserves_section_order() {
        // 120 messages, chunk 30, preserve 20 -> 100 older -> 4
        // chunks -> 1 combined summary + 20 recent.
        let backend = StubBackend::staggered();
        let cfg = CompressionConfig {
            preserve_recent: 20,
            ..config()
        };
        let compressor = Compressor::new(cfg, backend.clone());
        let input = turns(120);

        let out = compressor.compress(&input).await;
        assert_eq!(out.report.strategy, CompressionStrategy::Aggressive);
        assert_eq!(out.report.chunk_count, 4);
        assert_eq!(out.messages.len(), 21);
        assert_eq!(backend.calls(), 4);
        assert_eq!(&out.messages[1..], &input[100..]);

        // Sections appear in input order even though earlier chunks finished
        // last (the stagger makes completion order 4, 3, 2, 1).
        let combined = out.messages[0].content.to_plaintext();
        let positions: Vec<usize> = (1..=4)
            .map(|i| combined.find(&format!("[Section {}/4]", i)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn pinned_system_message_stays_first() {
        let backend = StubBackend::ok();
        let compressor = Compressor::new(config(), backend.clone());
        let mut input = vec![ChatMessage::system("you are a helpful proxy")];
        input.extend(turns(40));

        let out = compressor.compress(&input).await;
        assert_eq!(out.messages.len(), 17);
        assert_eq!(out.messages[0], input[0]);
        assert_eq!(out.messages[1].role, Role::System);
        assert_eq!(&out.messages[2..], &input[input.len() - 15..]);
    }

    #[tokio::test]
    async fn later_system_messages_are_ordinary_turns() {
        let backend = StubBackend::ok();
        let compressor = Compressor::new(config(), backend.clone());
        let mut input = vec![ChatMessage::system("pinned")];
        input.extend(turns(30));
        input.push(ChatMessage::system("mid-conversation note"));
        input.extend(turns(10));

        let out = compressor.compress(&input).await;
        assert_eq!(out.messages[0].content.to_plaintext(), "pinned");
        // The stray system message is inside the preserved suffix, untouched.
        assert_eq!(&out.messages[2..], &input[input.len() - 15..]);
    }

    #[tokio::test]
    async fn modest_overflow_trims_without_summarizing() {
        // 28 non-system turns: older = 13 <= trigger 20 -> trim, no call.
        let backend = StubBackend::ok();
        let compressor = Compressor::new(config(), backend.clone());
        let input = turns(28);

        let out = compressor.compress(&input).await;
        assert_eq!(out.report.strategy, CompressionStrategy::TailTrim);
        assert_eq!(out.messages.len(), 25);
        assert_eq!(out.messages, input[3..].to_vec());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn failed_chunks_fall_back_without_aborting_the_pass() {
        let backend = StubBackend::failing();
        let compressor = Compressor::new(config(), backend.clone());
        let input = turns(40);

        let out = compressor.compress(&input).await;
        assert_eq!(out.report.strategy, CompressionStrategy::Standard);
        let summary = out.messages[0].content.to_plaintext();
        assert!(summary.contains("user turn 0"));
        assert_eq!(&out.messages[1..], &input[25..]);
    }

    #[tokio::test]
    async fn recompressing_a_compressed_result_is_a_noop() {
        let backend = StubBackend::ok();
        let compressor = Compressor::new(config(), backend.clone());
        let input = turns(40);

        let first = compressor.compress(&input).await;
        let second = compressor.compress(&first.messages).await;
        assert_eq!(second.report.strategy, CompressionStrategy::Passthrough);
        assert_eq!(second.messages, first.messages);
    }

    #[tokio::test]
    async fn emergency_token_limit_forces_compression() {
        let backend = StubBackend::ok();
        let cfg = CompressionConfig {
            emergency_token_limit: 50,
            ..config()
        };
        let compressor = Compressor::new(cfg, backend.clone());
        // 10 messages, each ~25 estimated tokens: under the message limit but
        // over the token ceiling. older = 0 -> trim path keeps the recent
        // suffix only.
        let input: Vec<ChatMessage> = (0..10)
            .map(|i| ChatMessage::user(format!("{i}: {}", "x".repeat(100))))
            .collect();

        let out = compressor.compress(&input).await;
        assert_eq!(out.report.strategy, CompressionStrategy::TailTrim);
        assert_eq!(out.messages, input.to_vec());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn sub_chunk_older_still_summarizes_as_one_chunk() {
        // older = 25 with chunk_size 30: standard path, one chunk.
        let backend = StubBackend::ok();
        let compressor = Compressor::new(config(), backend.clone());
        let input = turns(40);

        let out = compressor.compress(&input).await;
        assert_eq!(out.report.chunk_count, 1);
    }

    #[tokio::test]
    async fn result_is_bounded() {
        let backend = StubBackend::ok();
        let cfg = CompressionConfig {
            preserve_recent: 20,
            ..config()
        };
        let compressor = Compressor::new(cfg.clone(), backend.clone());
        for n in [26, 60, 101, 250, 500] {
            let out = compressor.compress(&turns(n)).await;
            assert!(out.messages.len() <= cfg.max_context_messages);
        }
    }
}
