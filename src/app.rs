//! Command handlers behind the CLI, plus the error-to-exit-code mapping.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::backend::BackendRegistry;
use crate::cli::{AppContext, ParseArgs, ProjectArgs, RunArgs};
use crate::core::backup::{BackupStore, RunContext};
use crate::core::chain::{Chain, ChainError, RunSummary, StepEnv};
use crate::core::parser::{ParsedResponse, parse_response};
use crate::core::revert::{RevertOutcome, Reverter};
use crate::infra::chat_log::ChatLog;
use crate::infra::config::{ConfigError, ForgeConfig, load_config, load_pipeline, write_default};
use crate::infra::console::Console;
use crate::infra::fsutil::{expand_path, resolve_under};
use crate::infra::prompt::Prompter;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 0=success, 1=configuration or missing file, 2=step or I/O failure
pub fn exit_code_for(e: &AppError) -> i32 {
    match e {
        AppError::Config(_) | AppError::NotFound(_) => 1,
        AppError::Chain(_) | AppError::Other(_) => 2,
    }
}

/// Print the error chain and exit with its mapped code.
pub fn finish_with_exit(result: Result<(), AppError>, console: &Console) -> ! {
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let code = exit_code_for(&e);
            console.error(format!("{:#}", anyhow::Error::new(e)));
            std::process::exit(code);
        }
    }
}

fn project_root(args: &ProjectArgs) -> PathBuf {
    expand_path(&args.project)
}

/// Load the project config; offer to scaffold one when it is missing.
pub fn load_or_offer_init(
    project: &Path,
    console: &Console,
    prompter: &mut dyn Prompter,
) -> Result<ForgeConfig, AppError> {
    match load_config(project) {
        Err(ConfigError::NotFound { dir }) => {
            console.warn(format!("No forgeup config found in {}.", dir.display()));
            if !prompter.confirm("Create a default forgeup.toml now?")? {
                return Err(ConfigError::NotFound { dir }.into());
            }
            let path = write_default(project, false)?;
            console.success(format!("Created config file at {}", path.display()));
            Ok(load_config(project)?)
        }
        other => Ok(other?),
    }
}

/// `fup run`: resolve the pipeline and execute it once under a fresh run id.
pub fn run_pipeline(
    args: &RunArgs,
    ctx: &AppContext,
    backends: &BackendRegistry,
    prompter: &mut dyn Prompter,
) -> Result<RunSummary, AppError> {
    let console = Console::from_ctx(ctx);
    let project = project_root(&args.project);
    let config = load_or_offer_init(&project, &console, prompter)?;
    let build_dir = resolve_under(&project, &config.build_dir);

    let name = args
        .pipeline
        .clone()
        .unwrap_or_else(|| config.default_pipeline.clone());
    let pipeline = load_pipeline(&build_dir, &name)?;
    config.check_chat_steps(&pipeline.steps, backends)?;

    let mut store = BackupStore::open(&build_dir, RunContext::new());
    console.info(format!(
        "Run {} started (pipeline '{}')",
        store.run().run_id(),
        name
    ));

    let mut chain = Chain::build(&pipeline.steps, &console);
    if chain.is_empty() {
        console.warn(format!("Pipeline '{name}' has no runnable steps."));
    }

    let mut env = StepEnv {
        project: &project,
        config: &config,
        backends,
        store: &mut store,
        prompter,
        chat_log: ChatLog::new(&build_dir),
        console,
        dry_run: ctx.dry_run,
    };
    let summary = chain.run(&mut env)?;

    if summary.halted() {
        console.info("Pipeline stopped early.");
    } else {
        console.success(format!("Pipeline '{name}' finished ({} steps).", summary.executed));
    }
    Ok(summary)
}

/// `fup revert`: works without a config file, using the default build dir.
pub fn revert(
    args: &ProjectArgs,
    ctx: &AppContext,
    prompter: &mut dyn Prompter,
) -> Result<RevertOutcome, AppError> {
    let console = Console::from_ctx(ctx);
    let project = project_root(args);
    let config = match load_config(&project) {
        Err(ConfigError::NotFound { .. }) => ForgeConfig::default(),
        other => other?,
    };
    let build_dir = resolve_under(&project, &config.build_dir);
    let store = BackupStore::open(&build_dir, RunContext::new());

    Ok(Reverter::new(&store, console).run(prompter)?)
}

/// `fup parse`: show what a saved reply would write, touching nothing.
pub fn parse(
    args: &ParseArgs,
    ctx: &AppContext,
    out: &mut dyn Write,
) -> Result<ParsedResponse, AppError> {
    let console = Console::from_ctx(ctx);
    let text = match fs::read_to_string(&args.file) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(args.file.clone()));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("read {}", args.file.display()))
                .into());
        }
    };

    let parsed = parse_response(&text);
    if args.json {
        let json = serde_json::to_string_pretty(&parsed).context("serialize parse result")?;
        writeln!(out, "{json}").context("write parse result")?;
        return Ok(parsed);
    }

    for diag in &parsed.diagnostics {
        console.warn(diag.to_string());
    }
    if parsed.is_empty() {
        console.warn("No file updates detected in the response.");
    }
    for (i, record) in parsed.records.iter().enumerate() {
        writeln!(
            out,
            "{}. {} ({} lines)",
            i + 1,
            record.file_path.display(),
            record.content.lines().count()
        )
        .context("write parse result")?;
    }
    Ok(parsed)
}
