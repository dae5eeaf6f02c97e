//! **forgeup** - Prompt-to-file-edit pipeline for LLM-assisted development
//!
//! Sends prompts to a configurable chat backend, parses the files written
//! back in the reply and applies them with a reversible backup trail.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Command handlers and exit-code mapping
pub mod app;

/// Core pipeline - parsing, applying and undoing file edits
pub mod core {
    /// Line scanner turning model replies into whole-file edit records
    pub mod parser;
    pub use parser::{EditRecord, ParseDiagnostic, ParsedResponse, parse_response};

    /// Run-scoped backups with a JSON ledger
    pub mod backup;
    pub use backup::{BackupEntry, BackupStore, RunContext};

    /// Backup-then-overwrite application of edit records
    pub mod apply;
    pub use apply::{ApplyOutcome, ApplyReport, FileApplier};

    /// Interactive restore of the latest run's backups
    pub mod revert;
    pub use revert::{RevertOutcome, Reverter};

    /// Dotted-path value rewriting
    pub mod remap;

    /// Configured step sequence over a shared result store
    pub mod chain;
    pub use chain::{Chain, RunSummary, StepDescriptor};
}

/// Chat backends behind a uniform trait
pub mod backend;

/// Infrastructure - Configuration, console output and file plumbing
pub mod infra {
    /// Layered project configuration and pipeline lookup
    pub mod config;
    pub use config::{ForgeConfig, load_config, load_pipeline};

    /// Marker-prefixed status output
    pub mod console;
    pub use console::Console;

    /// Operator prompts (stdin or scripted)
    pub mod prompt;
    pub use prompt::{Prompter, ScriptedPrompter, StdinPrompter};

    /// JSONL transcript of chat exchanges
    pub mod chat_log;

    /// Atomic writes and path helpers
    pub mod fsutil;
}

// Strategic re-exports for clean CLI interface
pub use backend::{Backend, BackendRegistry};
pub use cli::{AppContext, Cli, Commands};
pub use crate::core::{BackupStore, Chain, EditRecord, RunContext, parse_response};
pub use infra::{ForgeConfig, load_config};
