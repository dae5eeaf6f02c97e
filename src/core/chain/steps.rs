//! Built-in step types.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{Emit, Step, StepDescriptor, StepEnv, StepError, StepOutput};
use crate::backend::RoleConfig;
use crate::core::apply::{ApplyOutcome, FileApplier};
use crate::core::parser::parse_response;
use crate::core::remap::{RemapRule, remap};
use crate::core::revert::Reverter;
use crate::infra::config::DEFAULT_ROLE;
use crate::infra::fsutil::resolve_under;

/// Word that ends the pipeline at the input prompt.
pub const EXIT: &str = "exit";

/// Map a descriptor to a step; `None` for unknown types.
pub fn build_step(desc: &StepDescriptor) -> Option<Box<dyn Step>> {
    let step: Box<dyn Step> = match desc.kind.as_str() {
        "user_input" => Box::new(UserInputStep::from_descriptor(desc)),
        "chat" => Box::new(ChatStep::from_descriptor(desc)),
        "file_update" => Box::new(FileUpdateStep),
        "dictionary_rewriter" | "remap" => Box::new(RemapStep {
            rules: desc.rules.clone(),
        }),
        "revert" => Box::new(RevertStep),
        _ => return None,
    };
    Some(step)
}

/// Render a stored value as prompt/response text.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// user_input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSource {
    pub file: bool,
    pub stdin: bool,
}

impl InputSource {
    /// Parse `stdin`, `file` or a comma list such as `file,stdin`.
    pub fn parse(list: &str) -> Self {
        let mut source = Self {
            file: false,
            stdin: false,
        };
        for token in list.split(',').map(|t| t.trim().to_ascii_lowercase()) {
            match token.as_str() {
                "file" => source.file = true,
                "stdin" => source.stdin = true,
                "" => {}
                other => warn!(source = other, "unknown input source ignored"),
            }
        }
        source
    }
}

impl Default for InputSource {
    fn default() -> Self {
        Self {
            file: false,
            stdin: true,
        }
    }
}

pub struct UserInputStep {
    source: InputSource,
    message_file: Option<PathBuf>,
}

impl UserInputStep {
    fn from_descriptor(desc: &StepDescriptor) -> Self {
        Self {
            source: desc
                .source
                .as_deref()
                .map(InputSource::parse)
                .unwrap_or_default(),
            message_file: desc.user_message_file.clone(),
        }
    }

    fn from_file(&self, env: &mut StepEnv<'_>) -> Result<Option<String>, StepError> {
        let configured = self
            .message_file
            .as_deref()
            .unwrap_or(&env.config.user_message_file);
        let path = resolve_under(env.project, configured);
        if !path.is_file() {
            debug!(path = %path.display(), "no user message file");
            return Ok(None);
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("read user message: {}", path.display()))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        env.console
            .info(format!("Loaded user message from file: {}", path.display()));
        env.console.block(text);
        if env.prompter.confirm("Do you want to use this message?")? {
            Ok(Some(text.to_string()))
        } else {
            Ok(None)
        }
    }
}

impl Step for UserInputStep {
    fn kind(&self) -> &'static str {
        "user_input"
    }

    #[instrument(skip_all, fields(file = self.source.file, stdin = self.source.stdin))]
    fn execute(&mut self, _inputs: Vec<Value>, env: &mut StepEnv<'_>) -> Result<StepOutput, StepError> {
        let mut message = None;
        if self.source.file {
            message = self.from_file(env)?;
        }
        if message.is_none() && self.source.stdin {
            let answer = env.prompter.ask("Enter your message: ")?;
            message = Some(answer.trim().to_string());
        }

        match message {
            Some(m) if !m.is_empty() && !m.eq_ignore_ascii_case(EXIT) => {
                Ok(StepOutput::Value(Value::String(m)))
            }
            Some(m) if m.eq_ignore_ascii_case(EXIT) => {
                env.console.info("Exiting. No request was sent.");
                Ok(StepOutput::Halt)
            }
            _ => {
                env.console.warn("No user message provided. Stopping.");
                Ok(StepOutput::Halt)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// chat
// ---------------------------------------------------------------------------

pub struct ChatStep {
    role_name: Option<String>,
    backend: Option<String>,
    model: Option<String>,
    user_message: Option<String>,
    emit: Emit,
}

impl ChatStep {
    fn from_descriptor(desc: &StepDescriptor) -> Self {
        Self {
            role_name: desc.role_name.clone(),
            backend: desc.backend.clone(),
            model: desc.model.clone(),
            user_message: desc.user_message.clone(),
            emit: desc.emit.unwrap_or_default(),
        }
    }

    fn user_message(&self, input: Option<&Value>) -> Result<String, StepError> {
        let text = match input {
            Some(Value::Array(parts)) => Some(
                parts
                    .iter()
                    .filter_map(value_text)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Some(v) => value_text(v),
            None => None,
        };
        text.or_else(|| self.user_message.clone())
            .ok_or_else(|| StepError::Input("chat step has no user message".into()))
    }
}

/// Flatten a context value into text for the developer message.
pub fn context_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Object(files) => files
            .iter()
            .map(|(name, body)| {
                format!(
                    "### `{name}`\n```\n{}\n```",
                    value_text(body).unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        other => other.to_string(),
    }
}

impl Step for ChatStep {
    fn kind(&self) -> &'static str {
        "chat"
    }

    #[instrument(skip_all, fields(role = ?self.role_name, backend = ?self.backend))]
    fn execute(&mut self, inputs: Vec<Value>, env: &mut StepEnv<'_>) -> Result<StepOutput, StepError> {
        let user_message = self.user_message(inputs.first())?;
        let context = inputs.get(1).map(context_text).unwrap_or_default();

        let role_name = self.role_name.as_deref().unwrap_or(DEFAULT_ROLE);
        let role: RoleConfig = env.config.role(role_name)?.with_context(&context);

        let backend_name = self.backend.as_deref().unwrap_or(&env.config.backend);
        let settings = env.config.backend_settings(self.model.as_deref());
        let backend = env.backends.create(backend_name, &settings)?;

        env.console.info(format!(
            "Sending request to {} ({})...",
            backend.name(),
            backend.model()
        ));
        let exchange = backend.complete_chat(&role, &user_message)?;

        env.chat_log.append(
            env.store.run().run_id(),
            backend.name(),
            &exchange.request,
            &exchange.response,
        )?;

        env.console.info(format!("{} assistant:", backend.name()));
        env.console.block(&exchange.reply);
        env.console
            .info(format!("Token usage - {}", exchange.response.usage));

        let value = match self.emit {
            Emit::Reply => Value::String(exchange.reply),
            Emit::Response => serde_json::to_value(&exchange.response)
                .context("serialize chat response")?,
        };
        Ok(StepOutput::Value(value))
    }
}

// ---------------------------------------------------------------------------
// file_update
// ---------------------------------------------------------------------------

pub struct FileUpdateStep;

impl Step for FileUpdateStep {
    fn kind(&self) -> &'static str {
        "file_update"
    }

    #[instrument(skip_all, fields(inputs = inputs.len()))]
    fn execute(&mut self, inputs: Vec<Value>, env: &mut StepEnv<'_>) -> Result<StepOutput, StepError> {
        let text = inputs
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("\n");

        let parsed = parse_response(&text);
        for diag in &parsed.diagnostics {
            env.console.warn(diag.to_string());
        }
        if parsed.is_empty() {
            env.console.warn("No file updates detected in the response.");
            return Ok(StepOutput::Value(Value::Array(Vec::new())));
        }

        let console = env.console;
        let report = FileApplier::new(env.project, env.store)
            .with_dry_run(env.dry_run)
            .apply_all(&parsed.records);

        for outcome in &report.outcomes {
            match outcome {
                ApplyOutcome::Updated { path, backup } => console.success(format!(
                    "Updated {} (backup: {})",
                    path.display(),
                    backup.display()
                )),
                ApplyOutcome::Created { path } => {
                    console.success(format!("Created {}", path.display()))
                }
                ApplyOutcome::Planned { path, diff } => {
                    console.info(format!("Would write {}", path.display()));
                    console.block(diff);
                }
            }
        }
        for failure in &report.failures {
            console.error(format!(
                "Failed to update {}: {}",
                failure.path.display(),
                failure.error
            ));
        }

        let applied = report
            .applied_paths()
            .into_iter()
            .map(|p| Value::String(p.display().to_string()))
            .collect();
        Ok(StepOutput::Value(Value::Array(applied)))
    }
}

// ---------------------------------------------------------------------------
// dictionary_rewriter / remap
// ---------------------------------------------------------------------------

pub struct RemapStep {
    rules: Vec<RemapRule>,
}

impl Step for RemapStep {
    fn kind(&self) -> &'static str {
        "dictionary_rewriter"
    }

    fn execute(&mut self, inputs: Vec<Value>, _env: &mut StepEnv<'_>) -> Result<StepOutput, StepError> {
        let input = inputs.into_iter().next().unwrap_or(Value::Null);
        Ok(StepOutput::Value(remap(&input, &self.rules)?))
    }
}

// ---------------------------------------------------------------------------
// revert
// ---------------------------------------------------------------------------

pub struct RevertStep;

impl Step for RevertStep {
    fn kind(&self) -> &'static str {
        "revert"
    }

    fn execute(&mut self, _inputs: Vec<Value>, env: &mut StepEnv<'_>) -> Result<StepOutput, StepError> {
        let outcome = Reverter::new(env.store, env.console).run(env.prompter)?;
        let value = serde_json::to_value(&outcome).context("serialize revert outcome")?;
        Ok(StepOutput::Value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_parsing() {
        assert_eq!(
            InputSource::parse("file, stdin"),
            InputSource {
                file: true,
                stdin: true
            }
        );
        assert_eq!(
            InputSource::parse("FILE"),
            InputSource {
                file: true,
                stdin: false
            }
        );
        assert!(InputSource::default().stdin);
    }

    #[test]
    fn context_from_map_is_fenced_per_file() {
        let text = context_text(&json!({"src/a.rs": "fn a() {}"}));
        assert_eq!(text, "### `src/a.rs`\n```\nfn a() {}\n```");
        assert_eq!(context_text(&json!(["x", "y"])), "x\n\ny");
        assert_eq!(context_text(&Value::Null), "");
    }

    #[test]
    fn chat_user_message_sources() {
        let step = ChatStep::from_descriptor(&StepDescriptor::new("chat"));
        assert_eq!(step.user_message(Some(&json!(["fix", "it"]))).unwrap(), "fix it");
        assert!(step.user_message(Some(&Value::Null)).is_err());

        let step = ChatStep::from_descriptor(&StepDescriptor {
            user_message: Some("fallback".into()),
            ..StepDescriptor::new("chat")
        });
        assert_eq!(step.user_message(None).unwrap(), "fallback");
        assert_eq!(step.user_message(Some(&json!("direct"))).unwrap(), "direct");
    }
}
