//! Run-scoped backup store with a single JSON ledger.
//!
//! Every overwrite made by the tool is preceded by a copy of the current
//! file into `<build_dir>/backup/` and an entry appended to
//! `<build_dir>/backup_log.json`. The ledger is loaded whole and rewritten
//! whole on every append; it is never pruned.

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

use crate::infra::fsutil::write_atomic;

/// Subdirectory of the build dir holding backup copies.
pub const BACKUP_DIR: &str = "backup";
/// Ledger file name inside the build dir.
pub const BACKUP_LOG: &str = "backup_log.json";

/// Same-second backups of one file before naming gives up.
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Reserve a unique `{base}_{timestamp}[_{n}].bak` name with create-new semantics.
fn claim_unique(dir: &Path, base: &str, timestamp: &str, attempts: u32) -> Result<PathBuf> {
    for n in 0..attempts {
        let name = if n == 0 {
            format!("{base}_{timestamp}.bak")
        } else {
            format!("{base}_{timestamp}_{n}.bak")
        };
        let candidate = dir.join(name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("reserve backup file: {}", candidate.display())));
            }
        }
    }
    anyhow::bail!(
        "no free backup name for {base}_{timestamp} in {} after {attempts} attempts",
        dir.display()
    )
}

/// Identity of one invocation of the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    run_id: String,
}

impl RunContext {
    /// Start a new run with a fresh UUID.
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Use a known run id (tests, replays).
    pub fn with_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// One pre-overwrite snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub run_id: String,
    pub original_file: PathBuf, // path that was overwritten
    pub backup_file: PathBuf,   // copy of its previous content
    pub timestamp: String,      // YYYYMMDDHHMMSS, local time
}

/// Owner of the backup directory and ledger for one run.
#[derive(Debug)]
pub struct BackupStore {
    build_dir: PathBuf,
    backup_dir: PathBuf,
    log_path: PathBuf,
    run: RunContext,
}

impl BackupStore {
    /// Bind a store to `build_dir`; directories are created lazily on first backup.
    pub fn open(build_dir: &Path, run: RunContext) -> Self {
        Self {
            build_dir: build_dir.to_path_buf(),
            backup_dir: build_dir.join(BACKUP_DIR),
            log_path: build_dir.join(BACKUP_LOG),
            run,
        }
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Snapshot `path` before it is modified.
    ///
    /// Returns `Ok(None)` (with a warning) when the file does not exist yet,
    /// so callers can proceed to create it without a backup.
    #[instrument(skip(self), fields(run_id = %self.run.run_id))]
    pub fn backup(&mut self, path: &Path) -> Result<Option<BackupEntry>> {
        if !path.exists() {
            warn!(path = %path.display(), "file does not exist, no backup created");
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("create backup dir: {}", self.backup_dir.display()))?;

        let timestamp = Local::now().format("%Y%m%d%H%M%S").to_string();
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", path.display()))?;

        let backup_file = self.claim_backup_path(&base, &timestamp)?;
        if let Err(e) = fs::copy(path, &backup_file) {
            let _ = fs::remove_file(&backup_file); // release the reserved name
            return Err(anyhow::Error::new(e).context(format!(
                "copy {} to backup {}",
                path.display(),
                backup_file.display()
            )));
        }

        let entry = BackupEntry {
            run_id: self.run.run_id.clone(),
            original_file: path.to_path_buf(),
            backup_file,
            timestamp,
        };

        let mut log = self.load_log();
        log.push(entry.clone());
        self.save_log(&log)?;

        debug!(backup = %entry.backup_file.display(), "backup created");
        Ok(Some(entry))
    }

    fn claim_backup_path(&self, base: &str, timestamp: &str) -> Result<PathBuf> {
        claim_unique(&self.backup_dir, base, timestamp, MAX_NAME_ATTEMPTS)
    }

    /// Read the whole ledger; a missing or malformed file reads as empty.
    pub fn load_log(&self) -> Vec<BackupEntry> {
        load_log_at(&self.log_path)
    }

    fn save_log(&self, log: &[BackupEntry]) -> Result<()> {
        fs::create_dir_all(&self.build_dir)
            .with_context(|| format!("create build dir: {}", self.build_dir.display()))?;
        let mut text = serde_json::to_string_pretty(log).context("serialize backup log")?;
        text.push('\n');
        write_atomic(&self.log_path, text.as_bytes())
            .with_context(|| format!("write backup log: {}", self.log_path.display()))
    }

    /// Run id of the most recently appended entry.
    pub fn latest_run_id(&self) -> Option<String> {
        self.load_log().last().map(|e| e.run_id.clone())
    }

    /// All entries recorded under `run_id`, in ledger order.
    pub fn entries_for_run(&self, run_id: &str) -> Vec<BackupEntry> {
        self.load_log()
            .into_iter()
            .filter(|e| e.run_id == run_id)
            .collect()
    }

    /// Entries of the latest run (empty when the ledger is empty).
    pub fn latest_run_entries(&self) -> Vec<BackupEntry> {
        let log = self.load_log();
        let Some(latest) = log.last().map(|e| e.run_id.clone()) else {
            return Vec::new();
        };
        log.into_iter().filter(|e| e.run_id == latest).collect()
    }
}

fn load_log_at(path: &Path) -> Vec<BackupEntry> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable backup log, treating as empty");
            return Vec::new();
        }
    };
    if text.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str(&text) {
        Ok(log) => log,
        Err(e) => {
            // tolerate corrupt ledgers
            warn!(path = %path.display(), error = %e, "malformed backup log, treating as empty");
            Vec::new()
        }
    }
}

/// Render entries as a 1-based numbered list.
pub fn describe_entries(entries: &[BackupEntry], mut out: impl Write) -> io::Result<()> {
    for (i, e) in entries.iter().enumerate() {
        writeln!(
            out,
            "{}. {} (Backup: {})",
            i + 1,
            e.original_file.display(),
            e.backup_file.display()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_creates_no_entry() {
        let tmp = TempDir::new().unwrap();
        let mut store = BackupStore::open(&tmp.path().join(".forgeup"), RunContext::new());

        let got = store.backup(&tmp.path().join("absent.txt")).unwrap();
        assert!(got.is_none());
        assert!(store.load_log().is_empty());
        assert!(!store.log_path().exists());
    }

    #[test]
    fn backup_copies_bytes_and_records_entry() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, "hello").unwrap();

        let mut store = BackupStore::open(&tmp.path().join(".forgeup"), RunContext::with_id("r1"));
        let entry = store.backup(&file).unwrap().unwrap();

        assert_eq!(entry.run_id, "r1");
        assert_eq!(entry.original_file, file);
        assert_eq!(entry.timestamp.len(), 14);
        assert_eq!(fs::read_to_string(&entry.backup_file).unwrap(), "hello");

        let name = entry.backup_file.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("file.txt_"));
        assert!(name.ends_with(".bak"));

        assert_eq!(store.load_log(), vec![entry]);
    }

    #[test]
    fn backup_naming_gives_up_when_exhausted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.rs_20250101000000.bak"), "").unwrap();
        fs::write(tmp.path().join("a.rs_20250101000000_1.bak"), "").unwrap();

        let err = claim_unique(tmp.path(), "a.rs", "20250101000000", 2).unwrap_err();
        assert!(err.to_string().contains("after 2 attempts"));

        let third = claim_unique(tmp.path(), "a.rs", "20250101000000", 3).unwrap();
        assert!(third.ends_with("a.rs_20250101000000_2.bak"));
    }

    #[test]
    fn repeated_backups_get_distinct_files() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("same.rs");
        let mut store = BackupStore::open(&tmp.path().join(".forgeup"), RunContext::with_id("run"));

        for i in 0..4 {
            fs::write(&file, format!("v{i}")).unwrap();
            store.backup(&file).unwrap();
        }

        let log = store.load_log();
        assert_eq!(log.len(), 4);
        assert!(log.iter().all(|e| e.run_id == "run"));

        let mut files: Vec<_> = log.iter().map(|e| e.backup_file.clone()).collect();
        files.sort();
        files.dedup();
        assert_eq!(files.len(), 4);

        let contents: Vec<_> = log
            .iter()
            .map(|e| fs::read_to_string(&e.backup_file).unwrap())
            .collect();
        assert_eq!(contents, vec!["v0", "v1", "v2", "v3"]);
    }

    #[test]
    fn latest_run_scopes_entries() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join(".forgeup");
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let mut first = BackupStore::open(&build, RunContext::with_id("old"));
        first.backup(&a).unwrap();
        first.backup(&b).unwrap();

        let mut second = BackupStore::open(&build, RunContext::with_id("new"));
        second.backup(&b).unwrap();

        assert_eq!(second.latest_run_id().as_deref(), Some("new"));
        let latest = second.latest_run_entries();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].original_file, b);
        assert_eq!(second.entries_for_run("old").len(), 2);
    }

    #[test]
    fn malformed_log_reads_as_empty_and_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join(".forgeup");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join(BACKUP_LOG), "{ not json").unwrap();

        let mut store = BackupStore::open(&build, RunContext::with_id("r"));
        assert!(store.load_log().is_empty());
        assert_eq!(store.latest_run_id(), None);

        let file = tmp.path().join("x");
        fs::write(&file, "x").unwrap();
        store.backup(&file).unwrap();
        assert_eq!(store.load_log().len(), 1);
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunContext::new().run_id(), RunContext::new().run_id());
    }
}
