use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "fup")]
#[command(
    about = "Send project prompts to a language model and apply the files it writes back, with reversible backups"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress informational output (warnings and errors still print)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be written without touching any file
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline (default: the configured default pipeline)
    Run(RunArgs),

    /// Restore files overwritten by the most recent run
    Revert(ProjectArgs),

    /// Show the file updates a saved model reply would produce
    Parse(ParseArgs),

    /// Initialize a forgeup.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root (config, build dir and relative paths resolve here)
    #[arg(long, default_value = ".")]
    pub project: String,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Pipeline name; looked up in <build_dir>/pipelines, then built-ins
    pub pipeline: Option<String>,

    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// File containing a model reply
    pub file: PathBuf,

    /// Emit JSON instead of a listing
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,

    /// Output directory (default: .forgeup/completions)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
