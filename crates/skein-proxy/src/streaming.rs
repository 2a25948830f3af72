//! Streaming relay (SSE).
//!
//! The upstream streams `data: {json}` lines terminated by `data: [DONE]`.
//! Each upstream event is reshaped into the external chunk shape and
//! forwarded before the next is read; the relay appends its own `[DONE]`
//! only when the upstream finished cleanly. A mid-stream upstream error
//! aborts the stream without a fabricated terminator.

use crate::translation;
use anyhow::{Context, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde_json::Value;

/// Relay an upstream SSE response as external SSE frames.
pub fn relay(
    response: reqwest::Response,
    external_model: String,
    merge_reasoning: bool,
) -> impl Stream<Item = Result<String>> + Send {
    try_stream! {
        let mut buffer = String::new();
        let mut stream = response.bytes_stream();

        'upstream: while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("failed to read upstream stream chunk")?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some((frame, rest)) = split_sse_frame(&buffer) {
                buffer = rest;

                let Some(data_str) = extract_data_line(&frame) else {
                    continue;
                };

                if data_str.trim() == "[DONE]" {
                    break 'upstream;
                }

                let v: Value = serde_json::from_str(data_str)
                    .with_context(|| format!("failed to parse upstream SSE json: {}", data_str))?;

                let out = translation::reshape_stream_event(&v, &external_model, merge_reasoning);
                yield format!("data: {}\n\n", out);
            }
        }

        yield "data: [DONE]\n\n".to_string();
    }
}

/// Split the current buffer into the first complete SSE frame and the
/// remaining buffer. Frames are separated by a blank line.
fn split_sse_frame(buffer: &str) -> Option<(String, String)> {
    let idx = buffer.find("\n\n")?;
    let (frame, rest) = buffer.split_at(idx + 2);
    Some((frame.to_string(), rest.to_string()))
}

fn extract_data_line(frame: &str) -> Option<&str> {
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            return Some(rest.trim_start());
        }
    }
    None
}
