//! Declarative step list as read from pipeline files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::remap::RemapRule;

/// `input_data_key` accepts a single key or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputKeys {
    One(String),
    Many(Vec<String>),
}

impl InputKeys {
    pub fn keys(&self) -> Vec<&str> {
        match self {
            InputKeys::One(k) => vec![k.as_str()],
            InputKeys::Many(ks) => ks.iter().map(String::as_str).collect(),
        }
    }
}

/// What a chat step stores as its output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emit {
    /// The assistant reply text.
    #[default]
    Reply,
    /// `{response, usage}`.
    Response,
}

/// One configured step. Type-specific fields are ignored by other types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDescriptor {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_data_key: Option<InputKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data_key: Option<String>,

    // chat
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emit: Option<Emit>,

    // user_input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message_file: Option<PathBuf>,

    // dictionary_rewriter
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RemapRule>,
}

impl StepDescriptor {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    pub fn input(mut self, key: &str) -> Self {
        self.input_data_key = Some(InputKeys::One(key.to_string()));
        self
    }

    pub fn inputs(mut self, keys: &[&str]) -> Self {
        self.input_data_key = Some(InputKeys::Many(
            keys.iter().map(|k| k.to_string()).collect(),
        ));
        self
    }

    pub fn output(mut self, key: &str) -> Self {
        self.output_data_key = Some(key.to_string());
        self
    }

    pub fn input_keys(&self) -> Vec<&str> {
        self.input_data_key
            .as_ref()
            .map(InputKeys::keys)
            .unwrap_or_default()
    }
}

/// A named pipeline file: `{ steps: [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
}

/// Pipelines available without a file on disk.
pub fn builtin_pipeline(name: &str) -> Option<PipelineConfig> {
    let steps = match name {
        "general_dev" => vec![
            StepDescriptor {
                source: Some("file,stdin".into()),
                ..StepDescriptor::new("user_input")
            }
            .output("user_message"),
            StepDescriptor::new("chat")
                .input("user_message")
                .output("reply"),
            StepDescriptor::new("file_update")
                .input("reply")
                .output("applied"),
        ],
        "revert" => vec![StepDescriptor::new("revert")],
        _ => return None,
    };
    Some(PipelineConfig { steps })
}

pub const BUILTIN_PIPELINES: [&str; 2] = ["general_dev", "revert"];
