//! Backup ledger and revert behaviour across runs.

use std::fs;

use assert_fs::prelude::*;
use tempfile::TempDir;

use forgeup::app;
use forgeup::cli::{AppContext, ProjectArgs};
use forgeup::core::apply::FileApplier;
use forgeup::core::backup::{BackupStore, RunContext};
use forgeup::core::parser::EditRecord;
use forgeup::core::revert::{RevertOutcome, Reverter};
use forgeup::infra::console::Console;
use forgeup::infra::prompt::ScriptedPrompter;

fn console() -> Console {
    Console::new(true, true)
}

/// Apply `records` under `project` as one run with id `run`.
fn apply_run(project: &std::path::Path, run: &str, records: &[EditRecord]) {
    let mut store = BackupStore::open(&project.join(".forgeup"), RunContext::with_id(run));
    let report = FileApplier::new(project, &mut store).apply_all(records);
    assert!(report.is_clean(), "{:?}", report.failures);
}

#[test]
fn repeated_writes_in_one_run_keep_every_version() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("f.txt"), "v0").unwrap();

    apply_run(
        tmp.path(),
        "one",
        &[
            EditRecord::new("f.txt", "v1"),
            EditRecord::new("f.txt", "v2"),
            EditRecord::new("f.txt", "v3"),
        ],
    );

    let store = BackupStore::open(&tmp.path().join(".forgeup"), RunContext::new());
    let log = store.load_log();
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|e| e.run_id == "one"));
    let versions: Vec<_> = log
        .iter()
        .map(|e| fs::read_to_string(&e.backup_file).unwrap())
        .collect();
    assert_eq!(versions, ["v0", "v1", "v2"]);
    assert_eq!(fs::read_to_string(tmp.path().join("f.txt")).unwrap(), "v3");
}

#[test]
fn revert_only_offers_the_latest_run() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "a0").unwrap();
    fs::write(tmp.path().join("b.txt"), "b0").unwrap();

    apply_run(tmp.path(), "first", &[EditRecord::new("a.txt", "a1")]);
    apply_run(
        tmp.path(),
        "second",
        &[EditRecord::new("a.txt", "a2"), EditRecord::new("b.txt", "b1")],
    );

    let store = BackupStore::open(&tmp.path().join(".forgeup"), RunContext::new());
    let reverter = Reverter::new(&store, console());
    let candidates = reverter.candidates();
    assert_eq!(candidates.len(), 2);
    assert!(candidates.iter().all(|e| e.run_id == "second"));

    let mut prompter = ScriptedPrompter::new(["2, 1"]);
    let outcome = reverter.run(&mut prompter).unwrap();
    match outcome {
        RevertOutcome::Restored { files, failed } => {
            assert_eq!(files.len(), 2);
            assert!(failed.is_empty());
        }
        other => panic!("expected restore, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "a1");
    assert_eq!(fs::read_to_string(tmp.path().join("b.txt")).unwrap(), "b0");

    // Reverting is not logged.
    assert_eq!(store.load_log().len(), 3);
}

#[test]
fn bad_selection_restores_nothing() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.txt"), "orig").unwrap();
    apply_run(tmp.path(), "r", &[EditRecord::new("a.txt", "changed")]);

    let store = BackupStore::open(&tmp.path().join(".forgeup"), RunContext::new());
    for answer in ["1,5", "one", "1,,", ""] {
        let mut prompter = ScriptedPrompter::new([answer]);
        let outcome = Reverter::new(&store, console()).run(&mut prompter).unwrap();
        assert!(
            matches!(outcome, RevertOutcome::Rejected { .. }),
            "{answer:?} gave {outcome:?}"
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("a.txt")).unwrap(),
            "changed"
        );
    }
}

#[test]
fn cancel_and_empty_ledger_are_not_errors() {
    let tmp = TempDir::new().unwrap();
    let store = BackupStore::open(&tmp.path().join(".forgeup"), RunContext::new());
    let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
    assert_eq!(
        Reverter::new(&store, console()).run(&mut prompter).unwrap(),
        RevertOutcome::NothingToRevert
    );
    assert!(prompter.asked.is_empty());

    fs::write(tmp.path().join("a.txt"), "orig").unwrap();
    apply_run(tmp.path(), "r", &[EditRecord::new("a.txt", "new")]);
    let mut prompter = ScriptedPrompter::new(["CANCEL"]);
    assert_eq!(
        Reverter::new(&store, console()).run(&mut prompter).unwrap(),
        RevertOutcome::Cancelled
    );
    assert_eq!(fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "new");
}

#[test]
fn deleted_original_is_recreated_on_revert() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("deep/dir")).unwrap();
    fs::write(tmp.path().join("deep/dir/x.rs"), "old").unwrap();
    apply_run(tmp.path(), "r", &[EditRecord::new("deep/dir/x.rs", "new")]);
    fs::remove_dir_all(tmp.path().join("deep")).unwrap();

    let store = BackupStore::open(&tmp.path().join(".forgeup"), RunContext::new());
    let mut prompter = ScriptedPrompter::new(["1"]);
    Reverter::new(&store, console()).run(&mut prompter).unwrap();
    assert_eq!(
        fs::read_to_string(tmp.path().join("deep/dir/x.rs")).unwrap(),
        "old"
    );
}

#[test]
fn app_revert_works_without_a_config_file() {
    let project = assert_fs::TempDir::new().unwrap();
    project.child("m.txt").write_str("m0").unwrap();
    apply_run(project.path(), "r", &[EditRecord::new("m.txt", "m1")]);

    let args = ProjectArgs {
        project: project.path().display().to_string(),
    };
    let ctx = AppContext {
        quiet: true,
        no_color: true,
        dry_run: false,
    };
    let mut prompter = ScriptedPrompter::new(["1"]);
    let outcome = app::revert(&args, &ctx, &mut prompter).unwrap();

    assert!(matches!(outcome, RevertOutcome::Restored { .. }));
    project.child("m.txt").assert("m0");
}
