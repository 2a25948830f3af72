//! Configuration from environment variables.
//!
//! Everything is read once at startup into an immutable [`ProxyConfig`] and
//! passed explicitly to the handlers and the compression policy.
//!
//! **Environment variables:**
//! - `PORT`: server port (default: 8088)
//! - `UPSTREAM_BASE_URL`: base URL of the inference API (default: https://open.bigmodel.cn/api/paas/v4)
//! - `UPSTREAM_API_KEY`: bearer credential forwarded upstream
//! - `REQUEST_TIMEOUT_SECS`: main completion call ceiling (default: 300)
//! - `SUMMARY_TIMEOUT_SECS`: per chunk-summary call (default: 15)
//! - `SUMMARY_MODEL`: fast model used for chunk summaries (default: glm-4-flash)
//! - `MAX_CONTEXT_MESSAGES` (50), `PRESERVE_RECENT_MESSAGES` (15),
//!   `SUMMARIZATION_TRIGGER` (20), `CHUNK_SIZE` (30),
//!   `AGGRESSIVE_THRESHOLD` (100), `EMERGENCY_TOKEN_LIMIT` (100000)
//! - `MERGE_REASONING`: fold the reasoning side-channel into visible text (default: false)
//! - `FORMAT_ENFORCEMENT`: style-instruction injection (default: false)
//! - `FORMAT_STRICTNESS`: lenient | standard | strict (default: standard)

use skein_context::{CompressionConfig, FormatStrictness};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub upstream_base_url: String,
    pub upstream_api_key: String,
    pub request_timeout_secs: u64,
    pub summary_timeout_secs: u64,
    pub summary_model: String,
    pub max_context_messages: usize,
    pub preserve_recent_messages: usize,
    pub summarization_trigger: usize,
    pub chunk_size: usize,
    pub aggressive_threshold: usize,
    pub emergency_token_limit: usize,
    pub merge_reasoning: bool,
    pub format_enforcement: bool,
    pub format_strictness: FormatStrictness,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: env_parse("PORT", 8088),
            upstream_base_url: env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| "https://open.bigmodel.cn/api/paas/v4".to_string()),
            upstream_api_key: env::var("UPSTREAM_API_KEY").unwrap_or_default(),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 300),
            summary_timeout_secs: env_parse("SUMMARY_TIMEOUT_SECS", 15),
            summary_model: env::var("SUMMARY_MODEL").unwrap_or_else(|_| "glm-4-flash".to_string()),
            max_context_messages: env_parse("MAX_CONTEXT_MESSAGES", 50),
            preserve_recent_messages: env_parse("PRESERVE_RECENT_MESSAGES", 15),
            summarization_trigger: env_parse("SUMMARIZATION_TRIGGER", 20),
            chunk_size: env_parse("CHUNK_SIZE", 30),
            aggressive_threshold: env_parse("AGGRESSIVE_THRESHOLD", 100),
            emergency_token_limit: env_parse("EMERGENCY_TOKEN_LIMIT", 100_000),
            merge_reasoning: env_bool("MERGE_REASONING", false),
            format_enforcement: env_bool("FORMAT_ENFORCEMENT", false),
            format_strictness: env::var("FORMAT_STRICTNESS")
                .ok()
                .and_then(|v| FormatStrictness::parse(&v))
                .unwrap_or_default(),
        }
    }
}

impl ProxyConfig {
    /// Project the compression tunables into the policy's own config type.
    pub fn compression(&self) -> CompressionConfig {
        CompressionConfig {
            max_context_messages: self.max_context_messages,
            preserve_recent: self.preserve_recent_messages,
            summarization_trigger: self.summarization_trigger,
            chunk_size: self.chunk_size,
            aggressive_threshold: self.aggressive_threshold,
            emergency_token_limit: self.emergency_token_limit,
            preserve_system_prompt: true,
            summary_timeout: Duration::from_secs(self.summary_timeout_secs),
        }
    }

    pub fn upstream_base_url_trimmed(&self) -> String {
        self.upstream_base_url.trim_end_matches('/').to_string()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_projection_carries_tunables() {
        let config = ProxyConfig {
            max_context_messages: 25,
            preserve_recent_messages: 10,
            summarization_trigger: 5,
            chunk_size: 7,
            aggressive_threshold: 60,
            emergency_token_limit: 9000,
            summary_timeout_secs: 3,
            ..ProxyConfig::default()
        };

        let c = config.compression();
        assert_eq!(c.max_context_messages, 25);
        assert_eq!(c.preserve_recent, 10);
        assert_eq!(c.summarization_trigger, 5);
        assert_eq!(c.chunk_size, 7);
        assert_eq!(c.aggressive_threshold, 60);
        assert_eq!(c.emergency_token_limit, 9000);
        assert_eq!(c.summary_timeout, Duration::from_secs(3));
        assert!(c.preserve_system_prompt);
    }

    #[test]
    fn base_url_is_trimmed() {
        let config = ProxyConfig {
            upstream_base_url: "http://localhost:4000///".to_string(),
            ..ProxyConfig::default()
        };
        assert_eq!(config.upstream_base_url_trimmed(), "http://localhost:4000");
    }
}
