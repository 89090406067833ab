use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use bookworm_core::domain::conversation::Message;

/// Text-completion oracle. Replies are untrusted: callers must survive
/// errors and malformed output.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, history: &[Message]) -> Result<String>;
}

/// Removes a surrounding markdown code fence (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match body.find('\n') {
        Some(newline) if body[..newline].chars().all(|ch| ch.is_ascii_alphanumeric()) => {
            &body[newline + 1..]
        }
        _ => body.trim_start_matches("json"),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Strict JSON parse after fence stripping. Any failure is `None`.
pub fn parse_json<T>(raw: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    serde_json::from_str(strip_code_fences(raw)).ok()
}
