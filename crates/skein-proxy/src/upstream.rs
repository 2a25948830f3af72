//! Upstream inference API client.
//!
//! One shared `reqwest::Client` per process, bearer credential attached to
//! every call. Also implements the [`CompletionBackend`] seam so the
//! compression subsystem can issue chunk-summary calls through the same
//! client with the configured fast summary model.

use crate::config::ProxyConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use skein_context::{CompletionBackend, SummarizeError};
use tracing::debug;

#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    summary_model: String,
}

impl UpstreamClient {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            base_url: config.upstream_base_url_trimmed(),
            api_key: config.upstream_api_key.clone(),
            summary_model: config.summary_model.clone(),
        })
    }

    /// POST a chat/completions body upstream.
    pub async fn chat(&self, body: &Value) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
    }

    /// Test whether the upstream accepts `model` directly, with a minimal
    /// 1-token request. Any failure counts as a miss.
    pub async fn probe_model(&self, model: &str) -> bool {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": "ping"}],
            "max_tokens": 1,
            "stream": false,
        });

        match self.chat(&body).await {
            Ok(resp) => {
                let accepted = resp.status().is_success();
                debug!(model, accepted, "model probe");
                accepted
            }
            Err(e) => {
                debug!(model, error = %e, "model probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl CompletionBackend for UpstreamClient {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, SummarizeError> {
        let body = json!({
            "model": self.summary_model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
            "temperature": temperature,
            "stream": false,
        });

        let resp = self
            .chat(&body)
            .await
            .map_err(|e| SummarizeError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SummarizeError::Backend(format!(
                "upstream returned {}",
                resp.status()
            )));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| SummarizeError::Backend(e.to_string()))?;

        v.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
            .ok_or(SummarizeError::EmptyResponse)
    }
}
