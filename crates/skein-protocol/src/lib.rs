//! Skein Protocol - OpenAI-compatible wire types.
//!
//! This crate defines the external API surface the proxy speaks:
//! - Chat message types (roles, string-or-structured content)
//! - `/v1/chat/completions` request and response bodies
//! - `/v1/models` listing types
//! - The OpenAI-style error envelope
//!
//! Internally the proxy prefers plain-text content; structured content is
//! accepted on the wire and flattened lossily where text is needed.

mod api;
mod messages;

pub use api::*;
pub use messages::*;
