//! Append-only JSONL transcript of backend exchanges.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::backend::{ChatRequest, ChatResponse};

pub const CHAT_LOG: &str = "chat_log.jsonl";

/// One line of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub timestamp: String, // RFC 3339, local time
    pub run_id: String,
    pub backend: String,
    pub model: String,
    pub request: ChatRequest,
    pub response: ChatResponse,
}

#[derive(Debug, Clone)]
pub struct ChatLog {
    path: PathBuf,
}

impl ChatLog {
    pub fn new(build_dir: &Path) -> Self {
        Self {
            path: build_dir.join(CHAT_LOG),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one exchange as a single JSON line.
    pub fn append(
        &self,
        run_id: &str,
        backend: &str,
        request: &ChatRequest,
        response: &ChatResponse,
    ) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir: {}", parent.display()))?;
        }

        let entry = ChatLogEntry {
            timestamp: Local::now().to_rfc3339(),
            run_id: run_id.to_string(),
            backend: backend.to_string(),
            model: request.model.clone(),
            request: request.clone(),
            response: response.clone(),
        };

        let mut line = serde_json::to_string(&entry).context("serialize chat log entry")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open chat log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append chat log: {}", self.path.display()))
    }

    /// Read every entry back, skipping lines that fail to parse.
    pub fn read_all(&self) -> Result<Vec<ChatLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("read chat log: {}", self.path.display()))?;
        Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChatMessage, TokenUsage};
    use tempfile::TempDir;

    #[test]
    fn appends_one_line_per_exchange() {
        let tmp = TempDir::new().unwrap();
        let log = ChatLog::new(&tmp.path().join(".forgeup"));
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage::new("user", "hi")],
        };
        let response = ChatResponse {
            response: "hello".into(),
            usage: TokenUsage::default(),
        };

        log.append("r1", "canned", &request, &response).unwrap();
        log.append("r1", "canned", &request, &response).unwrap();

        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        let entries = log.read_all().unwrap();
        assert_eq!(entries[0].backend, "canned");
        assert_eq!(entries[1].response.response, "hello");
    }
}
