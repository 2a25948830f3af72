//! Skein Context - Context window compression
//!
//! This crate decides what to do with a conversation that no longer fits the
//! upstream context window:
//! - Token estimation (heuristic, swappable)
//! - Chunk summarization via a pluggable completion backend
//! - The compression policy (no-op / trim / standard / aggressive)
//! - Format/style detection and instruction injection
//!
//! Everything here is per-request and stateless; nothing is retained across
//! requests.

mod compress;
mod error;
mod estimate;
mod style;
mod summarize;

pub use compress::{
    CompressionConfig, CompressionOutcome, CompressionReport, CompressionStrategy, Compressor,
};
pub use error::SummarizeError;
pub use estimate::{CharEstimator, TokenEstimator};
pub use style::{
    apply_style_instruction, build_instruction, FormatStrictness, StyleDetector, StyleProfile,
};
pub use summarize::{ChunkSummarizer, ChunkSummary, CompletionBackend};
