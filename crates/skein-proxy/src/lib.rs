//! Skein Proxy - a context-compressing chat-completion proxy.
//!
//! Clients speak (a subset of) the OpenAI `chat/completions` API. This crate
//! exposes that surface, bounds long conversations through the compression
//! subsystem in `skein-context`, remaps model ids onto the upstream catalog,
//! and forwards to a GLM-style inference API.
//!
//! Design goals:
//! - Accept OpenAI-formatted traffic (batch and SSE streaming).
//! - Keep arbitrarily long conversations inside the upstream context window.
//! - Translate responses back to the external shape, restoring the requested
//!   model id.
//! - No state across requests: every pass is per-request and discarded.

pub mod config;
pub mod models;
pub mod server;
pub mod streaming;
pub mod translation;
pub mod upstream;

pub use config::ProxyConfig;
pub use server::serve;
