//! Session history - appends ended session summaries to file
//!
//! Summaries are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::stats::SessionSummary;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

pub struct SessionHistory {
    file_path: String,
}

impl SessionHistory {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "session_history_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append a summary to the history file
    /// Returns true if successful, false otherwise
    pub fn record(&self, summary: &SessionSummary) -> bool {
        match self.append_line(&summary.to_json()) {
            Ok(()) => {
                info!(
                    session_id = %summary.session_id,
                    total = %summary.total,
                    "session_history_written"
                );
                true
            }
            Err(e) => {
                error!(
                    session_id = %summary.session_id,
                    error = %e,
                    "session_history_write_failed"
                );
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "session_history_appended");

        Ok(())
    }
}
