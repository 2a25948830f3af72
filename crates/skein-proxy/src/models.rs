//! External model id resolution.
//!
//! The proxy advertises OpenAI model ids but the upstream serves the GLM
//! catalog. Resolution order: static table, then a direct-acceptance probe,
//! then a tiered substring heuristic keyed on size-class hints.

use crate::upstream::UpstreamClient;
use tracing::{debug, info};

/// External id the proxy assumes when a request omits `model`.
pub const DEFAULT_EXTERNAL_MODEL: &str = "gpt-4o";

/// Catch-all upstream model for unrecognized external ids.
const DEFAULT_INTERNAL_MODEL: &str = "glm-4-air";

/// External -> upstream model table. The external ids are also what
/// `GET /v1/models` advertises.
pub const MODEL_MAP: &[(&str, &str)] = &[
    ("gpt-4o", "glm-4-plus"),
    ("gpt-4o-mini", "glm-4-flash"),
    ("gpt-4-turbo", "glm-4-plus"),
    ("gpt-4", "glm-4-plus"),
    ("gpt-3.5-turbo", "glm-4-air"),
    ("o1", "glm-4-plus"),
    ("o1-mini", "glm-4-flash"),
];

/// Resolve an external model id to an upstream one.
///
/// Misses are never surfaced: an unknown id that the upstream rejects on a
/// probe falls through to the substring heuristic.
pub async fn resolve_model(external: &str, upstream: &UpstreamClient) -> String {
    if let Some((_, internal)) = MODEL_MAP.iter().find(|(ext, _)| *ext == external) {
        debug!(external, internal, "model resolved from table");
        return internal.to_string();
    }

    if upstream.probe_model(external).await {
        debug!(external, "model accepted directly by upstream");
        return external.to_string();
    }

    let internal = heuristic_fallback(external);
    info!(external, internal, "model resolved heuristically");
    internal.to_string()
}

/// Tiered size-class heuristic over the external id.
fn heuristic_fallback(external: &str) -> &'static str {
    let id = external.to_ascii_lowercase();
    const SMALL_HINTS: &[&str] = &["mini", "nano", "flash", "haiku", "small", "lite", "tiny"];
    const LARGE_HINTS: &[&str] = &["opus", "large", "pro", "plus", "ultra", "4o", "o1"];

    if SMALL_HINTS.iter().any(|h| id.contains(h)) {
        "glm-4-flash"
    } else if LARGE_HINTS.iter().any(|h| id.contains(h)) {
        "glm-4-plus"
    } else {
        DEFAULT_INTERNAL_MODEL
    }
}

/// External ids advertised by `GET /v1/models`.
pub fn external_model_ids() -> Vec<&'static str> {
    MODEL_MAP.iter().map(|(ext, _)| *ext).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_advertised_models() {
        assert_eq!(external_model_ids().len(), MODEL_MAP.len());
        assert!(external_model_ids().contains(&DEFAULT_EXTERNAL_MODEL));
    }

    #[test]
    fn heuristic_tiers_on_size_hints() {
        // Small hints win over large ones, matching the tier order.
        assert_eq!(heuristic_fallback("claude-3-haiku"), "glm-4-flash");
        assert_eq!(heuristic_fallback("gemini-2.0-flash-exp"), "glm-4-flash");
        assert_eq!(heuristic_fallback("claude-3-opus"), "glm-4-plus");
        assert_eq!(heuristic_fallback("some-large-model"), "glm-4-plus");
        assert_eq!(heuristic_fallback("mystery-model"), DEFAULT_INTERNAL_MODEL);
    }
}
