//! Request/response transcoding.
//!
//! The external surface and the upstream API are both chat/completions
//! shaped, but the model catalog differs and the upstream adds a
//! `reasoning_content` side-channel. This module builds outbound request
//! bodies and reshapes batch responses and stream events back into the
//! external shape, restoring the externally requested model id.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use skein_protocol::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Usage,
};

/// Build the upstream chat/completions body from the bounded conversation
/// and the resolved upstream model id.
pub fn to_upstream_request(
    req: &ChatCompletionRequest,
    messages: &[ChatMessage],
    model: &str,
) -> Value {
    let mut out = json!({
        "model": model,
        "messages": messages,
    });

    if let Some(t) = req.temperature {
        out["temperature"] = json!(t);
    }
    if let Some(tp) = req.top_p {
        out["top_p"] = json!(tp);
    }
    if let Some(mt) = req.max_tokens {
        out["max_tokens"] = json!(mt);
    }
    if let Some(stream) = req.stream {
        out["stream"] = json!(stream);
        if stream {
            out["stream_options"] = json!({"include_usage": true});
        }
    }

    out
}

/// Reshape an upstream batch response into the external response shape.
pub fn to_external_response(
    upstream: Value,
    external_model: &str,
    merge_reasoning: bool,
) -> Result<ChatCompletionResponse> {
    let id = upstream
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("chatcmpl-unknown")
        .to_string();

    let created = upstream
        .get("created")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let upstream_choices = upstream
        .get("choices")
        .and_then(|v| v.as_array())
        .context("missing choices")?;

    let mut choices = Vec::with_capacity(upstream_choices.len());
    for (i, choice) in upstream_choices.iter().enumerate() {
        let msg = choice
            .get("message")
            .with_context(|| format!("missing choices[{i}].message"))?;

        let content = msg.get("content").and_then(|c| c.as_str()).unwrap_or("");
        let reasoning = msg
            .get("reasoning_content")
            .and_then(|c| c.as_str())
            .unwrap_or("");

        let text = merge_visible_text(content, reasoning, merge_reasoning);

        choices.push(ChatChoice {
            index: i as u32,
            message: ChatMessage::assistant(text),
            finish_reason: choice
                .get("finish_reason")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        });
    }

    let usage = upstream
        .get("usage")
        .and_then(|u| u.as_object())
        .map(|u| {
            let prompt = u.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let completion = u
                .get("completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32;
            let total = u
                .get("total_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or((prompt + completion) as u64) as u32;
            Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: total,
            }
        })
        .unwrap_or_default();

    Ok(ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created,
        model: external_model.to_string(),
        choices,
        usage,
    })
}

/// Reshape one upstream SSE data event into the external chunk shape.
pub fn reshape_stream_event(upstream: &Value, external_model: &str, merge_reasoning: bool) -> Value {
    let id = upstream
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("chatcmpl-unknown");
    let created = upstream
        .get("created")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    let empty = Vec::new();
    let upstream_choices = upstream
        .get("choices")
        .and_then(|v| v.as_array())
        .unwrap_or(&empty);

    let choices: Vec<Value> = upstream_choices
        .iter()
        .enumerate()
        .map(|(i, choice)| {
            let delta = choice.get("delta");
            let content = delta
                .and_then(|d| d.get("content"))
                .and_then(|c| c.as_str())
                .unwrap_or("");
            let reasoning = delta
                .and_then(|d| d.get("reasoning_content"))
                .and_then(|c| c.as_str())
                .unwrap_or("");

            let text = merge_visible_text(content, reasoning, merge_reasoning);

            let mut out_delta = json!({});
            if let Some(role) = delta.and_then(|d| d.get("role")).and_then(|r| r.as_str()) {
                out_delta["role"] = json!(role);
            }
            if !text.is_empty() {
                out_delta["content"] = json!(text);
            }

            json!({
                "index": i,
                "delta": out_delta,
                "finish_reason": choice.get("finish_reason").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();

    let mut out = json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": external_model,
        "choices": choices,
    });

    if let Some(usage) = upstream.get("usage") {
        if !usage.is_null() {
            out["usage"] = usage.clone();
        }
    }

    out
}

/// Merge the reasoning side-channel into visible text when the flag is on;
/// otherwise reasoning is dropped.
fn merge_visible_text(content: &str, reasoning: &str, merge_reasoning: bool) -> String {
    if !merge_reasoning || reasoning.is_empty() {
        return content.to_string();
    }
    if content.is_empty() {
        reasoning.to_string()
    } else {
        format!("{reasoning}\n\n{content}")
    }
}
