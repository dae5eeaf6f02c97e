//! User-facing status lines with a category marker.
//!
//! Diagnostics go to stderr, results to stdout. `--quiet` silences info and
//! success lines but never warnings or errors.

use owo_colors::OwoColorize;

use crate::cli::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    fn marker(self) -> &'static str {
        match self {
            Level::Info => "[info]",
            Level::Success => "[ok]",
            Level::Warning => "[warn]",
            Level::Error => "[error]",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    quiet: bool,
    no_color: bool,
}

impl Console {
    pub fn new(quiet: bool, no_color: bool) -> Self {
        Self { quiet, no_color }
    }

    pub fn from_ctx(ctx: &AppContext) -> Self {
        Self::new(ctx.quiet, ctx.no_color)
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.emit(Level::Info, msg.as_ref());
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        self.emit(Level::Success, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.emit(Level::Warning, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.emit(Level::Error, msg.as_ref());
    }

    /// Print a raw block (model replies, listings) to stdout.
    pub fn block(&self, text: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", text.as_ref());
        }
    }

    fn emit(&self, level: Level, msg: &str) {
        if self.quiet && matches!(level, Level::Info | Level::Success) {
            return;
        }
        let line = format!("{} {}", self.paint(level), msg);
        match level {
            Level::Info | Level::Success => println!("{line}"),
            Level::Warning | Level::Error => eprintln!("{line}"),
        }
    }

    fn paint(&self, level: Level) -> String {
        let marker = level.marker();
        if self.no_color {
            return marker.to_string();
        }
        match level {
            Level::Info => marker.cyan().to_string(),
            Level::Success => marker.green().to_string(),
            Level::Warning => marker.yellow().to_string(),
            Level::Error => marker.red().bold().to_string(),
        }
    }
}
