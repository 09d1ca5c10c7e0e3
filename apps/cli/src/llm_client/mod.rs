//! LLM Gateway — the single point of entry for all model calls in cvtailor.
//!
//! ARCHITECTURAL RULE: no other module may talk to a model backend directly.
//! All LLM interactions go through [`TextGenerator::generate`].
//!
//! The gateway is single-shot: it resolves the prompt template, dispatches to
//! the selected provider backend, and unwraps the reply text. Retry policy
//! lives with the callers that can judge whether a reply is usable.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Hosted models are intentionally hardcoded to prevent accidental drift.
/// Only the local Ollama model is configurable (`OLLAMA_MODEL`).
const OPENAI_MODEL: &str = "gpt-4o";
const GROQ_MODEL: &str = "llama-3.3-70b-versatile";

const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("no value bound for prompt placeholder '{{{name}}}'")]
    MissingVariable { name: String },

    #[error("no API key configured for provider {provider}")]
    MissingApiKey { provider: Provider },

    #[error("model returned an empty reply")]
    EmptyReply,
}

impl GatewayError {
    /// Misconfiguration rather than a flaky backend. Callers must fail fast
    /// on these instead of consuming retry budget.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            GatewayError::MissingVariable { .. } | GatewayError::MissingApiKey { .. }
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Provider selection
// ────────────────────────────────────────────────────────────────────────────

/// The recognized model backends. Parsed once at startup from `AI_PROVIDER`;
/// everything past construction dispatches on the variant, never on a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
    Groq,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            "groq" => Ok(Provider::Groq),
            other => Err(format!(
                "unrecognized provider '{other}': supported providers are 'ollama', 'openai', and 'groq'"
            )),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
        };
        f.write_str(name)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generation seam
// ────────────────────────────────────────────────────────────────────────────

/// The one operation the rest of the pipeline needs from a model backend.
/// Carried as `&dyn TextGenerator` so tests can substitute a stub.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        template: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, GatewayError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Wire formats
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The production gateway. Holds the selected provider plus the little state
/// each backend needs; the adapters differ only in how the reply text is
/// unwrapped from the response envelope.
#[derive(Clone)]
pub struct LlmClient {
    provider: Provider,
    http: reqwest::Client,
    api_key: Option<String>,
    ollama_model: Option<String>,
    ollama_base_url: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        Self {
            provider: config.provider,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: config.api_key.clone(),
            ollama_model: config.ollama_model.clone(),
            ollama_base_url: config.ollama_base_url.clone(),
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    async fn call_ollama(&self, prompt: &str) -> Result<String, GatewayError> {
        let model = self.ollama_model.as_deref().unwrap_or_default();
        let request_body = OllamaRequest {
            model,
            prompt,
            stream: false,
        };

        let url = format!("{}/api/generate", self.ollama_base_url);
        let response = self.http.post(&url).json(&request_body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: OllamaResponse = response.json().await?;
        Ok(reply.response)
    }

    /// OpenAI-compatible chat completion call, shared by the OpenAI and Groq
    /// backends (Groq serves the same wire format).
    async fn call_chat(&self, url: &str, model: &str, prompt: &str) -> Result<String, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GatewayError::MissingApiKey {
                provider: self.provider,
            })?;

        let request_body = ChatRequest {
            model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Try to parse the provider's error envelope
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(GatewayError::EmptyReply)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(
        &self,
        template: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, GatewayError> {
        let prompt = resolve_template(template, variables)?;

        let text = match self.provider {
            Provider::Ollama => self.call_ollama(&prompt).await?,
            Provider::OpenAi => self.call_chat(OPENAI_API_URL, OPENAI_MODEL, &prompt).await?,
            Provider::Groq => self.call_chat(GROQ_API_URL, GROQ_MODEL, &prompt).await?,
        };

        if text.trim().is_empty() {
            return Err(GatewayError::EmptyReply);
        }

        debug!("Gateway reply: {} chars from {}", text.len(), self.provider);
        Ok(text)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Template resolution
// ────────────────────────────────────────────────────────────────────────────

/// Substitutes `{name}` placeholders from `variables` into `template`.
///
/// A placeholder is a brace-delimited run of lowercase letters and
/// underscores; anything else between braces (JSON examples in a prompt, for
/// instance) is passed through untouched. A placeholder with no matching
/// variable is a configuration error and is never retried.
pub fn resolve_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, GatewayError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('}') {
            Some(end)
                if end > 0
                    && after[..end]
                        .bytes()
                        .all(|b| b.is_ascii_lowercase() || b == b'_') =>
            {
                let name = &after[..end];
                match variables.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(GatewayError::MissingVariable {
                            name: name.to_string(),
                        })
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}
