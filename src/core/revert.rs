//! Interactive undo of the most recent run's overwrites.
//!
//! Only entries sharing the run id of the last ledger entry are offered.
//! A selection is all-or-nothing: any bad token rejects the whole input
//! before a single file is touched. Reverting is not itself logged.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::backup::{BackupEntry, BackupStore, describe_entries};
use crate::infra::console::Console;
use crate::infra::fsutil::ensure_parent;
use crate::infra::prompt::Prompter;

/// Word that aborts the selection prompt.
pub const CANCEL: &str = "cancel";

/// Parsed operator answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Cancel,
    /// Zero-based indices in the order given.
    Indices(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("{index} is out of range (1-{count})")]
    OutOfRange { index: usize, count: usize },
    #[error("empty selection")]
    Empty,
}

/// Parse `"1, 3"` style input against `count` candidates.
pub fn parse_selection(input: &str, count: usize) -> Result<Selection, SelectionError> {
    let input = input.trim();
    if input.eq_ignore_ascii_case(CANCEL) {
        return Ok(Selection::Cancel);
    }
    if input.is_empty() {
        return Err(SelectionError::Empty);
    }

    let mut picked = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        let index: usize = token
            .parse()
            .map_err(|_| SelectionError::NotANumber(token.to_string()))?;
        if index == 0 || index > count {
            return Err(SelectionError::OutOfRange { index, count });
        }
        picked.push(index - 1);
    }
    Ok(Selection::Indices(picked))
}

/// What a revert attempt ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RevertOutcome {
    NothingToRevert,
    Cancelled,
    Rejected { reason: String },
    Restored { files: Vec<PathBuf>, failed: Vec<PathBuf> },
}

pub struct Reverter<'a> {
    store: &'a BackupStore,
    console: Console,
}

impl<'a> Reverter<'a> {
    pub fn new(store: &'a BackupStore, console: Console) -> Self {
        Self { store, console }
    }

    /// Entries eligible for revert (latest run only).
    pub fn candidates(&self) -> Vec<BackupEntry> {
        self.store.latest_run_entries()
    }

    /// Copy chosen backups over their originals; per-file failures are collected.
    fn restore(&self, entries: &[BackupEntry], indices: &[usize]) -> RevertOutcome {
        let mut files = Vec::new();
        let mut failed = Vec::new();
        for &i in indices {
            let Some(entry) = entries.get(i) else {
                warn!(index = i, count = entries.len(), "selection outside the backup list");
                continue;
            };
            match restore_entry(entry) {
                Ok(()) => {
                    self.console.success(format!(
                        "Reverted '{}' to backup: {}",
                        entry.original_file.display(),
                        entry.backup_file.display()
                    ));
                    files.push(entry.original_file.clone());
                }
                Err(e) => {
                    self.console.error(format!("{e:#}"));
                    failed.push(entry.original_file.clone());
                }
            }
        }
        RevertOutcome::Restored { files, failed }
    }

    /// List candidates, ask for a selection and restore it.
    #[instrument(skip_all)]
    pub fn run(&self, prompter: &mut dyn Prompter) -> Result<RevertOutcome> {
        let entries = self.candidates();
        if entries.is_empty() {
            self.console.warn("No backups found.");
            return Ok(RevertOutcome::NothingToRevert);
        }

        let mut listing = Vec::new();
        describe_entries(&entries, &mut listing).context("render backup list")?;
        self.console.info("Files available for reversion:");
        self.console.block(String::from_utf8_lossy(&listing).trim_end());

        let answer = prompter.ask(
            "Enter the numbers of the files to revert (comma-separated, or 'cancel' to abort): ",
        )?;

        match parse_selection(&answer, entries.len()) {
            Ok(Selection::Cancel) => {
                self.console.info("Reversion cancelled.");
                Ok(RevertOutcome::Cancelled)
            }
            Ok(Selection::Indices(indices)) => {
                info!(count = indices.len(), "restoring selection");
                Ok(self.restore(&entries, &indices))
            }
            Err(e) => {
                self.console
                    .warn(format!("Invalid choice ({e}). Nothing was reverted."));
                Ok(RevertOutcome::Rejected {
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn restore_entry(entry: &BackupEntry) -> Result<()> {
    ensure_parent(&entry.original_file)?;
    fs::copy(&entry.backup_file, &entry.original_file).with_context(|| {
        format!(
            "restore {} from {}",
            entry.original_file.display(),
            entry.backup_file.display()
        )
    })?;
    Ok(())
}
