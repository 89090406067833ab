//! OpenAI-compatible chat-completions client backing the agents' `LlmClient`.
//!
//! Both providers speak the same wire format: OpenAI proper takes a bearer key,
//! Ollama exposes the same `/v1/chat/completions` route without one.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bookworm_agent::LlmClient;
use bookworm_core::config::{LlmConfig, LlmProvider};
use bookworm_core::domain::conversation::{Message, Role};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        let base_url = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
        let api_key = match config.provider {
            LlmProvider::OpenAi => config.api_key.clone(),
            LlmProvider::Ollama => None,
        };

        Ok(Self {
            client,
            endpoint: completions_url(base_url),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<'a>(&'a self, prompt: &'a str, history: &'a [Message]) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if history.is_empty() {
            messages.push(WireMessage { role: "user", content: prompt });
        } else {
            messages.push(WireMessage { role: "system", content: prompt });
            messages.extend(
                history
                    .iter()
                    .map(|message| WireMessage { role: wire_role(message.role), content: &message.content }),
            );
        }

        ChatRequest { model: &self.model, messages, temperature: self.temperature }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str, history: &[Message]) -> Result<String> {
        let mut request = self.client.post(&self.endpoint).json(&self.request(prompt, history));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                anyhow!("oracle request timed out")
            } else if error.is_connect() {
                anyhow!("oracle connection failed: {error}")
            } else {
                anyhow!("oracle request failed: {error}")
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                event_name = "oracle.request.rejected",
                status = status.as_u16(),
                "oracle returned a non-success status"
            );
            return Err(anyhow!("oracle returned {status}: {body}"));
        }

        let completion: ChatResponse =
            response.json().await.context("oracle response was not valid json")?;
        let content = completion.into_content()?;
        debug!(event_name = "oracle.request.completed", chars = content.len(), "oracle replied");
        Ok(content)
    }
}

fn completions_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}/v1/chat/completions")
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Ai => "assistant",
        Role::Human | Role::Unknown => "user",
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("oracle response carried no completion"))
    }
}
