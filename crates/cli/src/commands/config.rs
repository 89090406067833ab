use std::env;
use std::fs;
use std::path::PathBuf;

use bookworm_core::config::{env_keys_for, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::{Table, Value};

/// Prints every effective setting with the layer it came from.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let file = ConfigFile::detect();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(effective_values(&config).into_iter().map(|(field, value)| {
        format!("- {field} = {value} (source: {})", file.source_of(field))
    }));
    lines.join("\n")
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    let AppConfig { database, llm, catalog, conversation, server, logging } = config;
    vec![
        ("database.url", database.url.clone()),
        ("database.max_connections", database.max_connections.to_string()),
        ("database.timeout_secs", database.timeout_secs.to_string()),
        ("llm.provider", format!("{:?}", llm.provider)),
        ("llm.model", llm.model.clone()),
        ("llm.base_url", llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string())),
        ("llm.api_key", redact_secret(llm.api_key.as_ref())),
        ("llm.temperature", llm.temperature.to_string()),
        ("llm.timeout_secs", llm.timeout_secs.to_string()),
        ("catalog.api_url", catalog.api_url.clone()),
        ("catalog.api_token", redact_secret(catalog.api_token.as_ref())),
        ("catalog.fallback_image_url", catalog.fallback_image_url.clone()),
        ("catalog.timeout_secs", catalog.timeout_secs.to_string()),
        ("conversation.min_questions", conversation.min_questions.to_string()),
        (
            "conversation.readiness_memory_threshold",
            conversation.readiness_memory_threshold.to_string(),
        ),
        ("conversation.delivery_days", conversation.delivery_days.to_string()),
        ("conversation.session_idle_ttl_secs", conversation.session_idle_ttl_secs.to_string()),
        ("server.bind_address", server.bind_address.clone()),
        ("server.port", server.port.to_string()),
        ("server.graceful_shutdown_secs", server.graceful_shutdown_secs.to_string()),
        ("logging.level", logging.level.clone()),
        ("logging.format", format!("{:?}", logging.format)),
    ]
}

/// The config file the loader would pick, parsed loosely for key lookups.
struct ConfigFile {
    path: Option<PathBuf>,
    document: Option<Table>,
}

impl ConfigFile {
    fn detect() -> Self {
        let path = ["bookworm.toml", "config/bookworm.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists());
        let document = path
            .as_ref()
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|raw| raw.parse::<Table>().ok());
        Self { path, document }
    }

    fn source_of(&self, field: &str) -> String {
        let set_in_env = env_keys_for(field)
            .iter()
            .find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()));
        if let Some(key) = set_in_env {
            return format!("env ({key})");
        }

        match (&self.document, &self.path) {
            (Some(document), Some(path)) if has_dotted_key(document, field) => {
                format!("file ({})", path.display())
            }
            _ => "default".to_string(),
        }
    }
}

fn has_dotted_key(document: &Table, field: &str) -> bool {
    let mut segments = field.split('.');
    let Some(first) = segments.next() else {
        return false;
    };
    let mut node: Option<&Value> = document.get(first);
    for segment in segments {
        node = node.and_then(|value| value.get(segment));
    }
    node.is_some()
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    // Keep only a recognisable scheme or vendor prefix.
    if let Some((scheme, _)) = trimmed.split_once(' ') {
        return format!("{scheme} ***");
    }
    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::redact_secret;

    #[test]
    fn secrets_keep_only_their_prefix() {
        assert_eq!(redact_secret(None), "<unset>");
        assert_eq!(redact_secret(Some(&SecretString::from("sk-live-abc"))), "sk-***");
        assert_eq!(redact_secret(Some(&SecretString::from("Bearer eyJhbGci"))), "Bearer ***");
        assert_eq!(redact_secret(Some(&SecretString::from("opaque"))), "<redacted>");
    }
}
