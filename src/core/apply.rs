//! Whole-file application of parsed edit records.
//!
//! Each record is backed up through the [`BackupStore`] and then written
//! atomically. Failures are collected per file so one bad path never stops
//! the rest of the batch.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use similar::TextDiff;
use tracing::{debug, instrument, warn};

use crate::core::backup::{BackupEntry, BackupStore};
use crate::core::parser::EditRecord;
use crate::infra::fsutil::{ensure_parent, resolve_under, write_atomic};

/// Per-record outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// File existed, was backed up and overwritten.
    Updated { path: PathBuf, backup: PathBuf },
    /// File did not exist and was created.
    Created { path: PathBuf },
    /// Dry run: nothing written; `diff` is a unified diff of the change.
    Planned { path: PathBuf, diff: String },
}

impl ApplyOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ApplyOutcome::Updated { path, .. }
            | ApplyOutcome::Created { path }
            | ApplyOutcome::Planned { path, .. } => path,
        }
    }
}

/// A record that could not be applied.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Batch result
#[derive(Debug, Default, Clone, Serialize)]
pub struct ApplyReport {
    pub outcomes: Vec<ApplyOutcome>,
    pub backups: Vec<BackupEntry>,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    pub fn applied_paths(&self) -> Vec<PathBuf> {
        self.outcomes.iter().map(|o| o.path().to_path_buf()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies records relative to a project root.
pub struct FileApplier<'a> {
    root: PathBuf,
    store: &'a mut BackupStore,
    dry_run: bool,
}

impl<'a> FileApplier<'a> {
    pub fn new(root: &Path, store: &'a mut BackupStore) -> Self {
        Self {
            root: root.to_path_buf(),
            store,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Apply one record: backup first, then overwrite (or create).
    #[instrument(skip(self, record), fields(file = %record.file_path.display()))]
    pub fn apply(&mut self, record: &EditRecord) -> Result<(ApplyOutcome, Option<BackupEntry>)> {
        let target = resolve_under(&self.root, &record.file_path);

        if self.dry_run {
            let before = fs::read_to_string(&target).unwrap_or_default();
            let diff = TextDiff::from_lines(before.as_str(), record.content.as_str())
                .unified_diff()
                .context_radius(3)
                .header(
                    &format!("a/{}", record.file_path.display()),
                    &format!("b/{}", record.file_path.display()),
                )
                .to_string();
            return Ok((ApplyOutcome::Planned { path: target, diff }, None));
        }

        let backup = self
            .store
            .backup(&target)
            .with_context(|| format!("backup before overwrite: {}", target.display()))?;

        ensure_parent(&target)?;
        write_atomic(&target, record.content.as_bytes())
            .with_context(|| format!("write {}", target.display()))?;

        let outcome = match &backup {
            Some(entry) => ApplyOutcome::Updated {
                path: target,
                backup: entry.backup_file.clone(),
            },
            None => ApplyOutcome::Created { path: target },
        };
        debug!(?outcome, "record applied");
        Ok((outcome, backup))
    }

    /// Apply records in order; later records for the same path win.
    pub fn apply_all(&mut self, records: &[EditRecord]) -> ApplyReport {
        let mut report = ApplyReport::default();
        for record in records {
            match self.apply(record) {
                Ok((outcome, backup)) => {
                    report.outcomes.push(outcome);
                    report.backups.extend(backup);
                }
                Err(e) => {
                    warn!(file = %record.file_path.display(), error = %format!("{e:#}"), "apply failed");
                    report.failures.push(ApplyFailure {
                        path: resolve_under(&self.root, &record.file_path),
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backup::RunContext;
    use tempfile::TempDir;

    fn store_in(tmp: &TempDir) -> BackupStore {
        BackupStore::open(&tmp.path().join(".forgeup"), RunContext::with_id("t"))
    }

    #[test]
    fn existing_file_is_backed_up_then_overwritten() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.py"), "old").unwrap();
        let mut store = store_in(&tmp);

        let report = FileApplier::new(tmp.path(), &mut store)
            .apply_all(&[EditRecord::new("a.py", "new")]);

        assert!(report.is_clean());
        assert_eq!(report.backups.len(), 1);
        assert_eq!(fs::read_to_string(tmp.path().join("a.py")).unwrap(), "new");
        assert_eq!(fs::read_to_string(&report.backups[0].backup_file).unwrap(), "old");
        assert_eq!(store.load_log().len(), 1);
    }

    #[test]
    fn new_file_is_created_without_backup() {
        let tmp = TempDir::new().unwrap();
        let mut store = store_in(&tmp);

        let report = FileApplier::new(tmp.path(), &mut store)
            .apply_all(&[EditRecord::new("pkg/mod/new.rs", "fn x() {}")]);

        assert_eq!(
            report.outcomes,
            vec![ApplyOutcome::Created {
                path: tmp.path().join("pkg/mod/new.rs")
            }]
        );
        assert!(report.backups.is_empty());
        assert!(store.load_log().is_empty());
    }

    #[test]
    fn repeated_path_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "0").unwrap();
        let mut store = store_in(&tmp);

        let report = FileApplier::new(tmp.path(), &mut store).apply_all(&[
            EditRecord::new("a.txt", "1"),
            EditRecord::new("a.txt", "2"),
        ]);

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "2");
        let contents: Vec<_> = store
            .load_log()
            .iter()
            .map(|e| fs::read_to_string(&e.backup_file).unwrap())
            .collect();
        assert_eq!(contents, vec!["0", "1"]);
    }

    #[test]
    fn failure_does_not_abort_batch() {
        let tmp = TempDir::new().unwrap();
        // A directory where a file is expected makes the write fail.
        fs::create_dir_all(tmp.path().join("blocked")).unwrap();
        let mut store = store_in(&tmp);

        let report = FileApplier::new(tmp.path(), &mut store).apply_all(&[
            EditRecord::new("blocked", "x"),
            EditRecord::new("ok.txt", "fine"),
        ]);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, tmp.path().join("blocked"));
        assert_eq!(fs::read_to_string(tmp.path().join("ok.txt")).unwrap(), "fine");
    }

    #[test]
    fn dry_run_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "one\n").unwrap();
        let mut store = store_in(&tmp);

        let report = FileApplier::new(tmp.path(), &mut store)
            .with_dry_run(true)
            .apply_all(&[EditRecord::new("a.txt", "two\n")]);

        match &report.outcomes[0] {
            ApplyOutcome::Planned { diff, .. } => {
                assert!(diff.contains("-one"));
                assert!(diff.contains("+two"));
            }
            other => panic!("expected plan, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "one\n");
        assert!(store.load_log().is_empty());
    }
}
