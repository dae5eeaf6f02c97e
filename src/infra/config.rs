use std::path::{Path, PathBuf};

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BackendRegistry, BackendSettings, RoleConfig};
use crate::cli::{AppContext, InitArgs};
use crate::core::chain::{PipelineConfig, StepDescriptor, builtin_pipeline};
use crate::infra::console::Console;

/// Project config file names, in lookup order.
pub const CONFIG_FILES: [&str; 4] = ["forgeup.yaml", "forgeup.yml", "forgeup.toml", "forgeup.json"];

/// Extensions tried for pipeline files, in lookup order.
const PIPELINE_EXTS: [&str; 4] = ["yaml", "yml", "toml", "json"];

/// Role used by chat steps that do not name one.
pub const DEFAULT_ROLE: &str = "developer";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError
{
    #[error("no forgeup config found in {dir} (run `fup init`)")]
    NotFound
    {
        dir: PathBuf
    },
    #[error("failed to load configuration from {path}: {source}")]
    Load
    {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
    #[error("role '{0}' is not defined in the project config")]
    UnknownRole(String),
    #[error("unknown backend '{name}' (known: {known})")]
    UnknownBackend
    {
        name: String, known: String
    },
    #[error("pipeline '{name}' not found in {dir} and is not built in")]
    UnknownPipeline
    {
        name: String, dir: PathBuf
    },
    #[error("config file already exists at {0}; use --force to overwrite")]
    Exists(PathBuf),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Project configuration (`forgeup.yaml` plus `FORGEUP_*` overrides).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig
{
    /// Default backend identifier for chat steps
    pub backend: String,

    /// Default model for chat steps
    pub model: String,

    /// Override the backend's base URL
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    pub max_tokens: Option<u32>,

    pub timeout_secs: Option<u64>,

    /// Prompt file read by `user_input` steps with a file source
    pub user_message_file: PathBuf,

    /// Tool state directory (backups, logs, pipelines), relative to the project
    pub build_dir: PathBuf,

    /// Pipeline used by `fup run` without an argument
    pub default_pipeline: String,

    pub roles: IndexMap<String, RoleConfig>,
}

impl Default for ForgeConfig
{
    fn default() -> Self
    {
        let mut roles = IndexMap::new();
        roles.insert(
            DEFAULT_ROLE.to_string(),
            RoleConfig {
                developer_message: concat!(
                    "You are a senior developer. When you change a file, print its path ",
                    "on its own line as <`path/to/file`>, then the complete new content ",
                    "in a fenced code block whose last line is EOF."
                )
                .to_string(),
                assistant_message: None,
            },
        );

        Self {
            backend: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key_env: None,
            max_tokens: None,
            timeout_secs: None,
            user_message_file: PathBuf::from("user_message.txt"),
            build_dir: PathBuf::from(".forgeup"),
            default_pipeline: "general_dev".to_string(),
            roles,
        }
    }
}

impl ForgeConfig
{
    /// Look up a role by name.
    pub fn role(
        &self,
        name: &str,
    ) -> Result<&RoleConfig, ConfigError>
    {
        self.roles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownRole(name.to_string()))
    }

    /// Resolve the role and backend of every `chat` step up front, so a
    /// bad name fails the run before any step executes.
    pub fn check_chat_steps(
        &self,
        steps: &[StepDescriptor],
        backends: &BackendRegistry,
    ) -> Result<(), ConfigError>
    {
        for desc in steps.iter().filter(|d| d.kind == "chat")
        {
            self.role(desc.role_name.as_deref().unwrap_or(DEFAULT_ROLE))?;

            let backend = desc.backend.as_deref().unwrap_or(&self.backend);
            if !backends.contains(backend)
            {
                return Err(ConfigError::UnknownBackend {
                    name: backend.to_string(),
                    known: backends.names().join(", "),
                });
            }
        }
        Ok(())
    }

    /// Backend construction settings, with per-step overrides applied.
    pub fn backend_settings(
        &self,
        model_override: Option<&str>,
    ) -> BackendSettings
    {
        let api_key = self
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());

        BackendSettings {
            model: model_override
                .unwrap_or(&self.model)
                .to_string(),
            base_url: self.base_url.clone(),
            api_key,
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// First existing config file in `dir`.
pub fn find_config(dir: &Path) -> Option<PathBuf>
{
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Load the project config from `dir`, layering `FORGEUP_*` env vars on top.
///
/// Nested keys use a double underscore, e.g. `FORGEUP_ROLES__DEVELOPER__ASSISTANT_MESSAGE`.
pub fn load_config(dir: &Path) -> Result<ForgeConfig, ConfigError>
{
    let path = find_config(dir).ok_or_else(|| ConfigError::NotFound { dir: dir.to_path_buf() })?;
    let load_err = |source| ConfigError::Load { path: path.clone(), source };

    let cfg = config::Config::builder()
        .add_source(config::File::from(path.as_path()))
        .add_source(
            config::Environment::with_prefix("FORGEUP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(load_err)?;

    let parsed: ForgeConfig = cfg
        .try_deserialize()
        .map_err(load_err)?;

    debug!(path = %path.display(), backend = %parsed.backend, "config loaded");
    Ok(parsed)
}

/// Resolve a pipeline by name: `{build_dir}/pipelines/{name}.{ext}` first,
/// then the built-in definitions.
pub fn load_pipeline(
    build_dir: &Path,
    name: &str,
) -> Result<PipelineConfig, ConfigError>
{
    let dir = build_dir.join("pipelines");
    for ext in PIPELINE_EXTS
    {
        let path = dir.join(format!("{name}.{ext}"));
        if !path.is_file()
        {
            continue;
        }

        let load_err = |source| ConfigError::Load { path: path.clone(), source };
        let pipeline = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .build()
            .and_then(|c| c.try_deserialize::<PipelineConfig>())
            .map_err(load_err)?;
        debug!(path = %path.display(), steps = pipeline.steps.len(), "pipeline loaded");
        return Ok(pipeline);
    }

    builtin_pipeline(name).ok_or_else(|| ConfigError::UnknownPipeline {
        name: name.to_string(),
        dir,
    })
}

/// Write a default `forgeup.toml` into `dir` and create the build directory.
pub fn write_default(
    dir: &Path,
    force: bool,
) -> Result<PathBuf, ConfigError>
{
    if let Some(existing) = find_config(dir)
        && !force
    {
        return Err(ConfigError::Exists(existing));
    }

    let config = ForgeConfig::default();
    let config_path = dir.join("forgeup.toml");
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    let pipelines = dir
        .join(&config.build_dir)
        .join("pipelines");
    std::fs::create_dir_all(&pipelines)
        .with_context(|| format!("create {}", pipelines.display()))?;

    Ok(config_path)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<(), ConfigError>
{
    let path = write_default(&args.path, args.force)?;
    Console::from_ctx(ctx).success(format!("Created config file at {}", path.display()));
    Ok(())
}
