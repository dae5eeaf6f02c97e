//! OpenAI-compatible chat-completions adapters.
//!
//! OpenAI, DeepSeek, Fireworks and a generic gateway speak nearly the same
//! wire format; the differences live in [`OpenAiFlavor`].

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    Backend, BackendError, BackendSettings, ChatExchange, ChatMessage, ChatRequest, RoleConfig,
    TokenUsage, construct_messages,
};

const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavor {
    OpenAi,
    DeepSeek,
    Fireworks,
    /// Self-hosted gateway; `base_url` is the full endpoint.
    Gateway,
}

impl OpenAiFlavor {
    pub fn name(self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "openai",
            OpenAiFlavor::DeepSeek => "deepseek",
            OpenAiFlavor::Fireworks => "fireworks",
            OpenAiFlavor::Gateway => "gateway",
        }
    }

    fn default_base_url(self) -> Option<&'static str> {
        match self {
            OpenAiFlavor::OpenAi => Some("https://api.openai.com/v1"),
            OpenAiFlavor::DeepSeek => Some("https://api.deepseek.com"),
            OpenAiFlavor::Fireworks => Some("https://api.fireworks.ai/inference/v1"),
            OpenAiFlavor::Gateway => None,
        }
    }

    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "OPENAI_API_KEY",
            OpenAiFlavor::DeepSeek => "DEEPSEEK_API_KEY",
            OpenAiFlavor::Fireworks => "FIREWORKS_API_KEY",
            OpenAiFlavor::Gateway => "GATEWAY_API_KEY",
        }
    }

    /// DeepSeek rejects a leading assistant turn.
    fn sends_priming(self) -> bool {
        !matches!(self, OpenAiFlavor::DeepSeek)
    }

    fn default_max_tokens(self) -> Option<u32> {
        match self {
            OpenAiFlavor::Fireworks => Some(20_480),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiBackend {
    flavor: OpenAiFlavor,
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiBackend {
    pub fn new(flavor: OpenAiFlavor, settings: &BackendSettings) -> Result<Self, BackendError> {
        let misconfigured = |reason: String| BackendError::Config {
            backend: flavor.name().to_string(),
            reason,
        };

        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var(flavor.api_key_env()).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| misconfigured(format!("API key missing; set {}", flavor.api_key_env())))?;

        let endpoint = match (flavor, settings.base_url.as_deref()) {
            (OpenAiFlavor::Gateway, Some(url)) => url.to_string(),
            (OpenAiFlavor::Gateway, None) => {
                return Err(misconfigured("base_url is required".into()));
            }
            (_, Some(base)) => chat_endpoint(base),
            (_, None) => chat_endpoint(flavor.default_base_url().unwrap_or_default()),
        };

        let max_tokens = settings.max_tokens.or(flavor.default_max_tokens());
        if flavor == OpenAiFlavor::Gateway && max_tokens.is_none() {
            return Err(misconfigured("max_tokens is required".into()));
        }
        if settings.model.trim().is_empty() {
            return Err(misconfigured("model is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(
                settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ))
            .build()
            .map_err(|source| BackendError::Http {
                backend: flavor.name().to_string(),
                source,
            })?;

        Ok(Self {
            flavor,
            client,
            endpoint,
            api_key,
            model: settings.model.clone(),
            max_tokens,
        })
    }

    pub fn boxed(
        flavor: OpenAiFlavor,
        settings: &BackendSettings,
    ) -> Result<Box<dyn Backend>, BackendError> {
        Ok(Box::new(Self::new(flavor, settings)?))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorization(&self) -> String {
        // The gateway takes the raw key, everyone else a bearer token.
        match self.flavor {
            OpenAiFlavor::Gateway => self.api_key.clone(),
            _ => format!("Bearer {}", self.api_key),
        }
    }
}

fn chat_endpoint(base: &str) -> String {
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(backend = self.flavor.name(), model = %self.model))]
    fn complete_chat(
        &self,
        role: &RoleConfig,
        user_message: &str,
    ) -> Result<ChatExchange, BackendError> {
        let backend = self.flavor.name().to_string();
        let messages = construct_messages(role, user_message, self.flavor.sends_priming());
        let wire = WireRequest {
            model: &self.model,
            messages: &messages,
            max_tokens: self.max_tokens,
            stream: false,
        };

        debug!(endpoint = %self.endpoint, messages = messages.len(), "sending chat request");
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", self.authorization())
            .json(&wire)
            .send()
            .map_err(|source| BackendError::Http {
                backend: backend.clone(),
                source,
            })?;

        let status = response.status();
        let text = response.text().map_err(|source| BackendError::Http {
            backend: backend.clone(),
            source,
        })?;
        if !status.is_success() {
            return Err(BackendError::Status {
                backend,
                status: status.as_u16(),
                body: text,
            });
        }

        let (reply, usage) = parse_completion(&text).map_err(|reason| BackendError::Malformed {
            backend: backend.clone(),
            reason,
        })?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
        };
        Ok(ChatExchange::new(request, reply, usage))
    }
}

/// Pull the first choice's text and the usage block out of a response body.
fn parse_completion(body: &str) -> Result<(String, TokenUsage), String> {
    let parsed: WireResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let reply = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| "no choices in response".to_string())?
        .message
        .content
        .unwrap_or_default();
    Ok((reply, parsed.usage.unwrap_or_default()))
}
