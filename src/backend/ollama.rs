//! Local Ollama server via its native `/api/chat` endpoint.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{
    Backend, BackendError, BackendSettings, ChatExchange, ChatMessage, ChatRequest, RoleConfig,
    TokenUsage, construct_messages,
};

const NAME: &str = "ollama";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct WireResponse {
    message: Option<WireMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

pub struct OllamaBackend {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(settings: &BackendSettings) -> Result<Self, BackendError> {
        if settings.model.trim().is_empty() {
            return Err(BackendError::Config {
                backend: NAME.into(),
                reason: "model is empty".into(),
            });
        }
        let base = settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let mut builder = Client::builder();
        if let Some(secs) = settings.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|source| BackendError::Http {
            backend: NAME.into(),
            source,
        })?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", base.trim_end_matches('/')),
            model: settings.model.clone(),
        })
    }

    pub fn boxed(settings: &BackendSettings) -> Result<Box<dyn Backend>, BackendError> {
        Ok(Box::new(Self::new(settings)?))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(backend = NAME, model = %self.model))]
    fn complete_chat(
        &self,
        role: &RoleConfig,
        user_message: &str,
    ) -> Result<ChatExchange, BackendError> {
        let messages = construct_messages(role, user_message, true);
        let http = |source| BackendError::Http {
            backend: NAME.into(),
            source,
        };

        debug!(endpoint = %self.endpoint, "sending chat request");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&WireRequest {
                model: &self.model,
                messages: &messages,
                stream: false,
            })
            .send()
            .map_err(http)?;

        let status = response.status();
        let text = response.text().map_err(http)?;
        if !status.is_success() {
            return Err(BackendError::Status {
                backend: NAME.into(),
                status: status.as_u16(),
                body: text,
            });
        }

        let (reply, usage) = parse_chat(&text).map_err(|reason| BackendError::Malformed {
            backend: NAME.into(),
            reason,
        })?;
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
        };
        Ok(ChatExchange::new(request, reply, usage))
    }
}

fn parse_chat(body: &str) -> Result<(String, TokenUsage), String> {
    let parsed: WireResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let message = parsed
        .message
        .ok_or_else(|| "response has no message".to_string())?;
    let total = match (parsed.prompt_eval_count, parsed.eval_count) {
        (Some(p), Some(c)) => Some(p + c),
        _ => None,
    };
    let usage = TokenUsage {
        prompt_tokens: parsed.prompt_eval_count,
        completion_tokens: parsed.eval_count,
        total_tokens: total,
    };
    Ok((message.content, usage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_is_local() {
        let b = OllamaBackend::new(&BackendSettings {
            model: "llama3".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(b.endpoint(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn chat_body_maps_eval_counts() {
        let body = r#"{"model":"llama3","message":{"role":"assistant","content":"ok"},
            "done":true,"prompt_eval_count":7,"eval_count":3}"#;
        let (reply, usage) = parse_chat(body).unwrap();
        assert_eq!(reply, "ok");
        assert_eq!(usage.total_tokens, Some(10));
        assert!(parse_chat(r#"{"done":true}"#).is_err());
    }
}
