//! Interactive questions behind a trait so steps can be driven from tests.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input};
use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};

/// Source of operator answers.
pub trait Prompter {
    /// Show `question` and return the answer line without its newline.
    fn ask(&mut self, question: &str) -> Result<String>;

    /// Yes/no question; only `yes`/`y` (any case) counts as yes.
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{question} (yes/no): "))?;
        Ok(is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "yes" | "y")
}

/// dialoguer appends its own `: ` separator.
fn prompt_label(question: &str) -> &str {
    question.trim_end().trim_end_matches(':')
}

/// Lost terminal or closed input; both read as an empty answer.
fn is_hangup(err: &dialoguer::Error) -> bool {
    matches!(
        err,
        dialoguer::Error::IO(e) if matches!(
            e.kind(),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe
        )
    )
}

/// Terminal prompter: dialoguer widgets on a tty, plain lines when stdin is piped.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    fn interactive() -> bool {
        io::stdin().is_terminal() && io::stderr().is_terminal()
    }

    // dialoguer refuses non-tty input, so scripted runs read one line.
    fn read_piped(question: &str) -> Result<String> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{question}").context("write prompt")?;
        stdout.flush().context("flush prompt")?;

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read answer from stdin")?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl Prompter for StdinPrompter {
    fn ask(&mut self, question: &str) -> Result<String> {
        if !Self::interactive() {
            return Self::read_piped(question);
        }

        match Input::<String>::new()
            .with_prompt(prompt_label(question))
            .allow_empty(true)
            .interact_text()
        {
            Ok(answer) => Ok(answer),
            Err(e) if is_hangup(&e) => Ok(String::new()),
            Err(e) => Err(e).context("read answer from terminal"),
        }
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        if !Self::interactive() {
            let answer = Self::read_piped(&format!("{question} (yes/no): "))?;
            return Ok(is_yes(&answer));
        }

        match Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact()
        {
            Ok(answer) => Ok(answer),
            Err(e) if is_hangup(&e) => Ok(false),
            Err(e) => Err(e).context("read confirmation from terminal"),
        }
    }
}

/// Replays canned answers in order; errors once they run out.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, question: &str) -> Result<String> {
        self.asked.push(question.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted answer for: {question}"))
    }
}
