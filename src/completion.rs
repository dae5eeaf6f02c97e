//! `fup completions`: shell scripts generated from the clap command tree.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate, generate_to};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::cli::{AppContext, Cli, CompletionsArgs};
use crate::infra::config::ForgeConfig;
use crate::infra::console::Console;

const BIN_NAME: &str = "fup";

/// Write the completion script for `shell` to `out`.
pub fn render(shell: Shell, out: &mut dyn Write) {
    generate(shell, &mut Cli::command(), BIN_NAME, out);
}

/// Scripts sit next to the rest of the tool state unless `--out-dir` is given.
fn default_dir() -> PathBuf {
    ForgeConfig::default().build_dir.join("completions")
}

pub fn run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    if args.stdout {
        render(args.shell, &mut io::stdout().lock());
        return Ok(());
    }

    let dir = args.out_dir.unwrap_or_else(default_dir);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = generate_to(args.shell, &mut Cli::command(), BIN_NAME, &dir)
        .with_context(|| format!("write {} completion into {}", args.shell, dir.display()))?;

    Console::from_ctx(ctx).success(format!("Wrote {} completion to {}", args.shell, path.display()));
    Ok(())
}
