//! Response parser: pulls `(file, content)` edit records out of free-form
//! model output.
//!
//! The scanner is a single forward pass over lines with three states:
//!
//! - `Scanning`: outside any fence; prose is dropped, a line starting with
//!   three backticks opens a fence.
//! - `InFence`: a bare closing fence returns to `Scanning`, an `EOF` line
//!   flushes the active file, anything else is content.
//! - `Flushed`: the active file was flushed by `EOF`; lines are dropped
//!   until the bare closing fence.
//!
//! A filename header (a line shaped like ``<`path`>``) is recognised in
//! every state and always starts a new record.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

const FENCE: &str = "```";
const EOF_SENTINEL: &str = "EOF";
const HEADER_OPEN: &str = "<`";
const HEADER_CLOSE: &str = "`>";

static HEADER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<`([^`]+)`>").expect("static header regex"));

/// One whole-file replacement extracted from a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditRecord {
    pub file_path: PathBuf,
    pub content: String,
}

impl EditRecord {
    pub fn new(file_path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
        }
    }
}

/// Non-fatal findings reported while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseDiagnostic {
    /// Content for `file` ended without an `EOF` line; it was still flushed.
    MissingEof { file: PathBuf },
    /// `EOF` was not followed by a bare closing fence.
    EofWithoutClosingFence { file: PathBuf },
    /// A header had no fenced content and produced no record.
    EmptyBlock { file: PathBuf },
}

impl std::fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseDiagnostic::MissingEof { file } => {
                write!(f, "'EOF' not found for the file: {}", file.display())
            }
            ParseDiagnostic::EofWithoutClosingFence { file } => write!(
                f,
                "'EOF' found without closing backticks: {}",
                file.display()
            ),
            ParseDiagnostic::EmptyBlock { file } => {
                write!(f, "no content found for the file: {}", file.display())
            }
        }
    }
}

/// Parser output: records in encounter order plus diagnostics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ParsedResponse {
    pub records: Vec<EditRecord>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParsedResponse {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scanning,
    InFence,
    Flushed,
}

/// File currently collecting content.
#[derive(Debug)]
struct ActiveFile {
    path: PathBuf,
    lines: Vec<String>,
}

#[derive(Debug)]
struct Scanner {
    state: State,
    active: Option<ActiveFile>,
    // Set on the line right after an EOF flush; cleared by the next line.
    just_flushed: Option<PathBuf>,
    out: ParsedResponse,
}

impl Scanner {
    fn new() -> Self {
        Self {
            state: State::Scanning,
            active: None,
            just_flushed: None,
            out: ParsedResponse::default(),
        }
    }

    fn feed(&mut self, raw: &str) {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let trimmed = line.trim();

        // Only the line immediately after EOF can close the flushed fence cleanly.
        if let Some(file) = self.just_flushed.take()
            && trimmed != FENCE
        {
            self.out
                .diagnostics
                .push(ParseDiagnostic::EofWithoutClosingFence { file });
        }

        if let Some(name) = header_name(trimmed) {
            self.flush(false);
            self.active = Some(ActiveFile {
                path: PathBuf::from(name),
                lines: Vec::new(),
            });
            self.state = State::Scanning;
            return;
        }

        match self.state {
            State::Scanning => {
                if trimmed.starts_with(FENCE) {
                    self.state = State::InFence;
                }
            }
            State::InFence => {
                if trimmed == FENCE {
                    self.state = State::Scanning;
                } else if trimmed == EOF_SENTINEL {
                    if let Some(path) = self.active.as_ref().map(|a| a.path.clone()) {
                        self.flush(true);
                        self.just_flushed = Some(path);
                    }
                    self.state = State::Flushed;
                } else if let Some(active) = self.active.as_mut() {
                    active.lines.push(line.to_string());
                }
            }
            State::Flushed => {
                if trimmed == FENCE {
                    self.state = State::Scanning;
                }
            }
        }
    }

    /// Emit the active file (if it has content) and clear it.
    fn flush(&mut self, saw_eof: bool) {
        let Some(active) = self.active.take() else {
            return;
        };

        let content = active.lines.join("\n").trim().to_string();
        if content.is_empty() {
            self.out
                .diagnostics
                .push(ParseDiagnostic::EmptyBlock { file: active.path });
            return;
        }

        if !saw_eof {
            self.out.diagnostics.push(ParseDiagnostic::MissingEof {
                file: active.path.clone(),
            });
        }
        self.out.records.push(EditRecord {
            file_path: active.path,
            content,
        });
    }

    fn finish(mut self) -> ParsedResponse {
        if let Some(file) = self.just_flushed.take() {
            self.out
                .diagnostics
                .push(ParseDiagnostic::EofWithoutClosingFence { file });
        }
        self.flush(false);
        self.out
    }
}

/// Return the active name for a header line, or `None` if the line is not
/// a header. With several bracketed names the rightmost one wins.
fn header_name(trimmed: &str) -> Option<&str> {
    if !(trimmed.starts_with(HEADER_OPEN) && trimmed.ends_with(HEADER_CLOSE)) {
        return None;
    }
    HEADER_NAME
        .captures_iter(trimmed)
        .filter_map(|c| c.get(1))
        .last()
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
}

/// Parse a model response into edit records.
pub fn parse_response(text: &str) -> ParsedResponse {
    let mut scanner = Scanner::new();
    for line in text.split('\n') {
        scanner.feed(line);
    }
    let parsed = scanner.finish();
    tracing::debug!(
        records = parsed.records.len(),
        diagnostics = parsed.diagnostics.len(),
        "parsed response"
    );
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(text: &str) -> Vec<(String, String)> {
        parse_response(text)
            .records
            .into_iter()
            .map(|r| (r.file_path.display().to_string(), r.content))
            .collect()
    }

    fn pair(file: &str, body: &str) -> (String, String) {
        (file.to_string(), body.to_string())
    }

    #[test]
    fn plain_text_yields_nothing() {
        assert!(pairs("This is a plain text response without code blocks.").is_empty());
        assert!(pairs("").is_empty());
    }

    #[test]
    fn fence_without_header_yields_nothing() {
        let text = "\n```\ncode\n```\n";
        assert!(pairs(text).is_empty());
    }

    #[test]
    fn single_file_with_eof() {
        let text = "<`example.py`>\n```\ncode\nEOF\n```\n";
        let parsed = parse_response(text);
        assert_eq!(parsed.records, vec![EditRecord::new("example.py", "code")]);
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn single_file_without_eof_is_flushed_with_diagnostic() {
        let text = "\n<`example.py`>\n```\ncode\n```\n        ";
        let parsed = parse_response(text);
        assert_eq!(parsed.records, vec![EditRecord::new("example.py", "code")]);
        assert_eq!(
            parsed.diagnostics,
            vec![ParseDiagnostic::MissingEof {
                file: PathBuf::from("example.py")
            }]
        );
    }

    #[test]
    fn multiple_files_keep_order_and_repeats() {
        let text = "\
<`a.py`>
```python
one
EOF
```
<`b.py`>
```
two
EOF
```
<`a.py`>
```
three
EOF
```
";
        assert_eq!(
            pairs(text),
            vec![pair("a.py", "one"), pair("b.py", "two"), pair("a.py", "three")]
        );
    }

    #[test]
    fn header_followed_by_header_drops_first() {
        let text = "<`first.py`>\n<`second.py`>\n```\nbody\nEOF\n```\n";
        let parsed = parse_response(text);
        assert_eq!(pairs(text), vec![pair("second.py", "body")]);
        assert!(parsed.diagnostics.contains(&ParseDiagnostic::EmptyBlock {
            file: PathBuf::from("first.py")
        }));
    }

    #[test]
    fn rightmost_name_on_line_wins() {
        let text = "<`dropped.py`> and <`example.py`>\n```\ncode\nEOF\n```\n";
        assert_eq!(pairs(text), vec![pair("example.py", "code")]);
    }

    #[test]
    fn header_must_span_the_trimmed_line() {
        let text = "Update <`example.py`> as follows:\n```\ncode\nEOF\n```\n";
        assert!(pairs(text).is_empty());
    }

    #[test]
    fn decorative_backticks_are_content() {
        let text = "\
<`example.py`>
```
L2
```L3``` code ```` L3```
L2
EOF
```
";
        assert_eq!(
            pairs(text),
            vec![pair("example.py", "L2\n```L3``` code ```` L3```\nL2")]
        );
    }

    #[test]
    fn inline_fence_line_is_not_a_close() {
        let text = "<`example.py`>\n```\n```example```\nEOF\n```\n";
        assert_eq!(pairs(text), vec![pair("example.py", "```example```")]);
    }

    #[test]
    fn consecutive_fences_merge_into_one_record() {
        let text = "<`example.py`>\n```\ncode part 1\n```\n```\ncode part 2\n```\n";
        assert_eq!(
            pairs(text),
            vec![pair("example.py", "code part 1\ncode part 2")]
        );
    }

    #[test]
    fn language_tag_and_prose_are_dropped() {
        let text = "\
Here is the change.
<`example.py`>
Some explanation before the fence.
```python
def hello():
    print(\"Hello, World!\")
EOF
```
Trailing notes.
";
        assert_eq!(
            pairs(text),
            vec![pair(
                "example.py",
                "def hello():\n    print(\"Hello, World!\")"
            )]
        );
    }

    #[test]
    fn inner_lines_are_verbatim_and_edges_trimmed() {
        let text = "<`x.rs`>\n```\n\nfn a() {\n    b();  \n}\n\nEOF\n```\n";
        assert_eq!(pairs(text), vec![pair("x.rs", "fn a() {\n    b();  \n}")]);
    }

    #[test]
    fn eof_without_closing_fence_still_flushes() {
        let text = "<`a.txt`>\n```\nalpha\nEOF\nnot a fence\n<`b.txt`>\n```\nbeta\nEOF\n```\n";
        let parsed = parse_response(text);
        assert_eq!(
            parsed.records,
            vec![EditRecord::new("a.txt", "alpha"), EditRecord::new("b.txt", "beta")]
        );
        assert_eq!(
            parsed.diagnostics,
            vec![ParseDiagnostic::EofWithoutClosingFence {
                file: PathBuf::from("a.txt")
            }]
        );
    }

    #[test]
    fn lines_after_eof_are_not_content() {
        let text = "<`a.txt`>\n```\nalpha\nEOF\nstray\n```\n```\nlater\n```\n";
        assert_eq!(pairs(text), vec![pair("a.txt", "alpha")]);
    }

    #[test]
    fn crlf_input_is_tolerated() {
        let text = "<`a.txt`>\r\n```\r\nalpha\r\nbeta\r\nEOF\r\n```\r\n";
        assert_eq!(pairs(text), vec![pair("a.txt", "alpha\nbeta")]);
    }

    #[test]
    fn unterminated_fence_flushes_at_end() {
        let text = "<`a.txt`>\n```\nalpha\nbeta";
        let parsed = parse_response(text);
        assert_eq!(parsed.records, vec![EditRecord::new("a.txt", "alpha\nbeta")]);
        assert_eq!(parsed.diagnostics.len(), 1);
    }

    #[test]
    fn header_with_no_fence_at_end_is_dropped() {
        let parsed = parse_response("<`lonely.py`>\nno fence here\n");
        assert!(parsed.records.is_empty());
    }
}
