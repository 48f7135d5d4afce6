//! Append-only history log.
//!
//! One entry per line, plain text, the same shape shell history files use.
//! Every append reopens the file so that a broken path fails per line instead
//! of once at startup; callers treat failures as warnings.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use crate::error::HistoryError;

/// Line history persisted to a flat file.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    path: Option<PathBuf>,
}

impl HistoryStore {
    /// A store backed by `path`. `None` disables persistence.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// A store that records nothing.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Append one entry. Blank lines are skipped.
    pub fn append(&self, line: &str) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if line.trim().is_empty() {
            return Ok(());
        }

        let entry = format!("{line}\n");
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(entry.as_bytes()))
            .map_err(|cause| HistoryError {
                path: path.clone(),
                cause,
            })
    }

    /// The last `limit` entries, oldest first. A missing file is an empty
    /// history.
    pub fn load(&self, limit: usize) -> Result<Vec<String>, HistoryError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(cause) => {
                return Err(HistoryError {
                    path: path.clone(),
                    cause,
                })
            }
        };

        let entries: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let skip = entries.len().saturating_sub(limit);
        debug!(path = %path.display(), total = entries.len(), kept = entries.len() - skip, "history loaded");
        Ok(entries[skip..].iter().map(|l| l.to_string()).collect())
    }
}
