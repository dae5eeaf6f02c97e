//! Backend adapter contract and the static registry of known backends.
//!
//! The chat step only ever sees `dyn Backend`. Concrete adapters map the
//! uniform request into a provider wire call and back.

pub mod ollama;
pub mod openai;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use ollama::OllamaBackend;
pub use openai::{OpenAiBackend, OpenAiFlavor};

/// System and optional assistant-priming text for a chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub developer_message: String,
    #[serde(default)]
    pub assistant_message: Option<String>,
}

impl RoleConfig {
    pub fn new(developer_message: impl Into<String>) -> Self {
        Self {
            developer_message: developer_message.into(),
            assistant_message: None,
        }
    }

    /// Copy of this role with `context` appended to the developer message.
    pub fn with_context(&self, context: &str) -> Self {
        let mut role = self.clone();
        if !context.trim().is_empty() {
            role.developer_message
                .push_str("\n\nHere are some relevant code files:\n\n");
            role.developer_message.push_str(context);
        }
        role
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Build the message list: system, optional assistant priming, user.
pub fn construct_messages(role: &RoleConfig, user_message: &str, priming: bool) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new("system", role.developer_message.clone())];
    if priming
        && let Some(assistant) = role.assistant_message.as_deref()
        && !assistant.is_empty()
    {
        messages.push(ChatMessage::new("assistant", assistant));
    }
    messages.push(ChatMessage::new("user", user_message));
    messages
}

/// What was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Token accounting; providers may omit any field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl std::fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn show(v: Option<u64>) -> String {
            v.map_or_else(|| "n/a".to_string(), |n| n.to_string())
        }
        write!(
            f,
            "Prompt: {}, Completion: {}, Total: {}",
            show(self.prompt_tokens),
            show(self.completion_tokens),
            show(self.total_tokens)
        )
    }
}

/// What came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub usage: TokenUsage,
}

/// Full record of one chat call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatExchange {
    pub request: ChatRequest,
    pub response: ChatResponse,
    pub reply: String,
}

impl ChatExchange {
    pub fn new(request: ChatRequest, reply: String, usage: TokenUsage) -> Self {
        Self {
            request,
            response: ChatResponse {
                response: reply.clone(),
                usage,
            },
            reply,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("unknown backend '{name}' (known: {known})")]
    Unknown { name: String, known: String },
    #[error("backend '{backend}' is misconfigured: {reason}")]
    Config { backend: String, reason: String },
    #[error("request to {backend} failed: {source}")]
    Http {
        backend: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{backend} returned HTTP {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },
    #[error("unexpected response from {backend}: {reason}")]
    Malformed { backend: String, reason: String },
}

/// Uniform chat-completion capability.
pub trait Backend {
    /// Stable lowercase identifier used for logging and selection.
    fn name(&self) -> &str;

    /// Model identifier requests are sent with.
    fn model(&self) -> &str;

    fn complete_chat(
        &self,
        role: &RoleConfig,
        user_message: &str,
    ) -> Result<ChatExchange, BackendError>;
}

/// Everything a constructor may need from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSettings {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

pub type BackendCtor =
    Box<dyn Fn(&BackendSettings) -> Result<Box<dyn Backend>, BackendError>>;

type BuiltinCtor = fn(&BackendSettings) -> Result<Box<dyn Backend>, BackendError>;

/// Known backends, in display order.
const BUILTIN: &[(&str, BuiltinCtor)] = &[
    ("openai", |s| OpenAiBackend::boxed(OpenAiFlavor::OpenAi, s)),
    ("deepseek", |s| OpenAiBackend::boxed(OpenAiFlavor::DeepSeek, s)),
    ("fireworks", |s| OpenAiBackend::boxed(OpenAiFlavor::Fireworks, s)),
    ("gateway", |s| OpenAiBackend::boxed(OpenAiFlavor::Gateway, s)),
    ("ollama", |s| OllamaBackend::boxed(s)),
];

/// Name → constructor table.
pub struct BackendRegistry {
    ctors: IndexMap<String, BackendCtor>,
}

impl BackendRegistry {
    /// Empty registry (tests register what they need).
    pub fn empty() -> Self {
        Self {
            ctors: IndexMap::new(),
        }
    }

    /// Registry with every built-in adapter.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        for (name, ctor) in BUILTIN {
            reg.ctors.insert((*name).to_string(), Box::new(*ctor));
        }
        reg
    }

    /// Add or replace a constructor; names are matched case-insensitively.
    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&BackendSettings) -> Result<Box<dyn Backend>, BackendError> + 'static,
    {
        self.ctors.insert(name.to_ascii_lowercase(), Box::new(ctor));
    }

    pub fn names(&self) -> Vec<&str> {
        self.ctors.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(&name.to_ascii_lowercase())
    }

    pub fn create(
        &self,
        name: &str,
        settings: &BackendSettings,
    ) -> Result<Box<dyn Backend>, BackendError> {
        let ctor = self
            .ctors
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| BackendError::Unknown {
                name: name.to_string(),
                known: self.names().join(", "),
            })?;
        ctor(settings)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
