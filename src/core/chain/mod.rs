//! Sequential step pipeline with a shared keyed result store.
//!
//! Each step declares the keys it reads (`input_data_key`) and the key its
//! output is stored under (`output_data_key`). Steps run strictly in
//! configured order; a missing input reads as `null`.

mod descriptor;
pub mod steps;

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::backend::{BackendError, BackendRegistry};
use crate::core::backup::BackupStore;
use crate::core::remap::RemapError;
use crate::infra::chat_log::ChatLog;
use crate::infra::config::{ConfigError, ForgeConfig};
use crate::infra::console::Console;
use crate::infra::prompt::Prompter;

pub use descriptor::{
    BUILTIN_PIPELINES, Emit, InputKeys, PipelineConfig, StepDescriptor, builtin_pipeline,
};

/// Values produced by earlier steps, by key. Lives for one run.
#[derive(Debug, Default, Clone)]
pub struct ResultStore {
    values: HashMap<String, Value>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Current value of each key in order, `null` when absent.
    pub fn gather(&self, keys: &[&str]) -> Vec<Value> {
        keys.iter()
            .map(|k| self.values.get(*k).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn into_inner(self) -> HashMap<String, Value> {
        self.values
    }
}

/// What a step hands back to the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Value(Value),
    Nothing,
    /// Stop the pipeline without error.
    Halt,
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Remap(#[from] RemapError),
    #[error("{0}")]
    Input(String),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// A step failure with its position in the pipeline.
#[derive(Debug, thiserror::Error)]
#[error("step {} ({kind}) failed", index + 1)]
pub struct ChainError {
    pub index: usize,
    pub kind: String,
    #[source]
    pub source: StepError,
}

/// Shared collaborators for one run.
pub struct StepEnv<'a> {
    pub project: &'a Path,
    pub config: &'a ForgeConfig,
    pub backends: &'a BackendRegistry,
    pub store: &'a mut BackupStore,
    pub prompter: &'a mut dyn Prompter,
    pub chat_log: ChatLog,
    pub console: Console,
    pub dry_run: bool,
}

impl StepEnv<'_> {
    pub fn run_id(&self) -> &str {
        self.store.run().run_id()
    }
}

/// One executable pipeline stage.
pub trait Step {
    fn kind(&self) -> &'static str;

    fn execute(&mut self, inputs: Vec<Value>, env: &mut StepEnv<'_>) -> Result<StepOutput, StepError>;
}

struct Stage {
    step: Box<dyn Step>,
    input_keys: Vec<String>,
    output_key: Option<String>,
}

/// Result of [`Chain::run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub executed: usize,
    /// Index of the step that halted the run, if any.
    pub halted_at: Option<usize>,
    pub results: HashMap<String, Value>,
}

impl RunSummary {
    pub fn halted(&self) -> bool {
        self.halted_at.is_some()
    }
}

pub struct Chain {
    stages: Vec<Stage>,
    skipped: Vec<String>,
}

impl Chain {
    /// Build executable steps; unknown types are reported and skipped.
    pub fn build(descriptors: &[StepDescriptor], console: &Console) -> Self {
        let mut stages = Vec::new();
        let mut skipped = Vec::new();

        for desc in descriptors {
            match steps::build_step(desc) {
                Some(step) => stages.push(Stage {
                    step,
                    input_keys: desc.input_keys().into_iter().map(str::to_string).collect(),
                    output_key: desc.output_data_key.clone(),
                }),
                None => {
                    warn!(kind = %desc.kind, "unsupported step type");
                    console.warn(format!("Unsupported step type: {}", desc.kind));
                    skipped.push(desc.kind.clone());
                }
            }
        }
        Self { stages, skipped }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Step types that were dropped at build time.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.step.kind()).collect()
    }

    /// Execute every stage in order against a fresh result store.
    #[instrument(skip_all, fields(run_id = %env.run_id(), steps = self.stages.len()))]
    pub fn run(&mut self, env: &mut StepEnv<'_>) -> Result<RunSummary, ChainError> {
        let mut store = ResultStore::new();
        let mut executed = 0;
        let mut halted_at = None;

        for (index, stage) in self.stages.iter_mut().enumerate() {
            let keys: Vec<&str> = stage.input_keys.iter().map(String::as_str).collect();
            let inputs = store.gather(&keys);
            info!(index, kind = stage.step.kind(), "running step");

            let output = stage
                .step
                .execute(inputs, env)
                .map_err(|source| ChainError {
                    index,
                    kind: stage.step.kind().to_string(),
                    source,
                })?;
            executed += 1;

            match output {
                StepOutput::Value(value) => {
                    if let Some(key) = &stage.output_key {
                        store.insert(key, value);
                    }
                }
                StepOutput::Nothing => {}
                StepOutput::Halt => {
                    info!(index, "pipeline halted");
                    halted_at = Some(index);
                    break;
                }
            }
        }

        Ok(RunSummary {
            run_id: env.run_id().to_string(),
            executed,
            halted_at,
            results: store.into_inner(),
        })
    }
}
