//! Job status log
//!
//! Status records are what the owning job sees ("GOOD", "ABORT", "WARN",
//! "INFO"). They are separate from diagnostic tracing output. Entries are kept
//! in memory and, when a path is configured, appended as JSONL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// A single status record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub timestamp: DateTime<Utc>,
    /// "GOOD", "ABORT", "WARN", "INFO", ...
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl StatusEntry {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            status: status.into(),
            subdir: None,
            test_name: None,
            message: None,
            hostname: None,
        }
    }

    pub fn with_test_name(mut self, test_name: impl Into<String>) -> Self {
        self.test_name = Some(test_name.into());
        self
    }

    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = Some(subdir.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
}

/// Sink for status records of the job owning a host
pub trait StatusRecorder: Send + Sync {
    fn record(&self, entry: StatusEntry);
}

/// Thread-safe status log shared by every session of a job
#[derive(Debug, Default)]
pub struct StatusLog {
    entries: Mutex<Vec<StatusEntry>>,
    path: Option<PathBuf>,
}

impl StatusLog {
    /// In-memory only
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every entry to `path` as JSONL
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of all entries recorded so far
    pub fn entries(&self) -> Vec<StatusEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Load a JSONL status log written by a previous run
    pub fn read_jsonl(path: &Path) -> anyhow::Result<Vec<StatusEntry>> {
        let content = fs::read_to_string(path)?;
        let mut entries = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }

    fn append_to_file(path: &Path, entry: &StatusEntry) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl StatusRecorder for StatusLog {
    fn record(&self, entry: StatusEntry) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(path) = &self.path {
            if let Err(e) = Self::append_to_file(path, &entry) {
                warn!("Failed to append status entry to {}: {}", path.display(), e);
            }
        }
        entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_log() {
        let log = StatusLog::new();
        log.record(StatusEntry::new("GOOD").with_test_name("reboot.verify"));
        log.record(StatusEntry::new("ABORT").with_message("Host did not shut down"));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, "GOOD");
        assert_eq!(entries[0].test_name.as_deref(), Some("reboot.verify"));
        assert_eq!(entries[1].message.as_deref(), Some("Host did not shut down"));
    }

    #[test]
    fn test_jsonl_persistence() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("status").join("status.jsonl");
        let log = StatusLog::with_path(&path);

        log.record(StatusEntry::new("WARN").with_hostname("rig1"));
        log.record(StatusEntry::new("GOOD").with_hostname("rig1"));

        let reloaded = StatusLog::read_jsonl(&path).unwrap();
        assert_eq!(reloaded, log.entries());
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("subdir"), "unset fields are skipped");
    }
}
