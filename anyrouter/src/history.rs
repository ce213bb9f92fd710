use anyhow::{Context, Result};
use anyrouter_api::{SigninOutcome, SigninResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

const HEADER: [&str; 3] = ["timestamp", "outcome", "detail"];

/// One row of the sign-in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub outcome: SigninOutcome,
    pub detail: String,
}

impl HistoryEntry {
    pub fn new(outcome: SigninOutcome, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            outcome,
            detail: detail.into(),
        }
    }
}

impl From<SigninResult> for HistoryEntry {
    fn from(result: SigninResult) -> Self {
        Self::new(result.outcome, result.detail)
    }
}

/// Append-only CSV log of sign-in attempts.
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(HEADER)?;
        }
        writer.serialize(entry)?;
        writer.flush()?;

        tracing::debug!(outcome = %entry.outcome, "History entry appended");
        Ok(())
    }

    /// The last `limit` entries, oldest first and most recent last.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        if limit == 0 || !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let mut recent = VecDeque::with_capacity(limit);
        for (index, row) in reader.deserialize::<HistoryEntry>().enumerate() {
            match row {
                Ok(entry) => {
                    if recent.len() == limit {
                        recent.pop_front();
                    }
                    recent.push_back(entry);
                }
                Err(e) => {
                    tracing::warn!(row = index + 1, error = %e, "Skipping malformed history row");
                }
            }
        }

        Ok(recent.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(dir: &tempfile::TempDir) -> HistoryLog {
        HistoryLog::new(dir.path().join("history.csv"))
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(log(&dir).read_recent(5).unwrap().is_empty());
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(&dir);
        log.append(&HistoryEntry::new(SigninOutcome::Success, "ok"))
            .unwrap();
        log.append(&HistoryEntry::new(SigninOutcome::Failure, "HTTP 500"))
            .unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines[0], "timestamp,outcome,detail");
        assert_eq!(lines.len(), 3);
        assert_eq!(contents.matches("timestamp,outcome,detail").count(), 1);
    }

    #[test]
    fn read_recent_returns_last_entries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(&dir);
        for i in 0..5 {
            log.append(&HistoryEntry::new(SigninOutcome::Success, format!("run {}", i)))
                .unwrap();
        }

        let details: Vec<_> = log
            .read_recent(3)
            .unwrap()
            .into_iter()
            .map(|e| e.detail)
            .collect();
        assert_eq!(details, vec!["run 2", "run 3", "run 4"]);
    }

    #[test]
    fn read_recent_with_fewer_entries_returns_all() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(&dir);
        log.append(&HistoryEntry::new(SigninOutcome::Failure, "only"))
            .unwrap();

        assert_eq!(log.read_recent(10).unwrap().len(), 1);
        assert!(log.read_recent(0).unwrap().is_empty());
    }

    #[test]
    fn details_with_commas_and_quotes_survive() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(&dir);
        let detail = "HTTP 500: {\"message\":\"boom, again\"}";
        log.append(&HistoryEntry::new(SigninOutcome::Failure, detail))
            .unwrap();

        assert_eq!(log.read_recent(1).unwrap()[0].detail, detail);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(&dir);
        log.append(&HistoryEntry::new(SigninOutcome::Success, "first"))
            .unwrap();

        let mut contents = fs::read_to_string(log.path()).unwrap();
        contents.push_str("not-a-date,success,broken\n");
        contents.push_str("2026-01-01T09:00:00Z,maybe,unknown outcome\n");
        contents.push_str("just one column\n");
        fs::write(log.path(), contents).unwrap();

        log.append(&HistoryEntry::new(SigninOutcome::Failure, "last"))
            .unwrap();

        let details: Vec<_> = log
            .read_recent(10)
            .unwrap()
            .into_iter()
            .map(|e| e.detail)
            .collect();
        assert_eq!(details, vec!["first", "last"]);
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let dir = tempfile::tempdir().unwrap();
        let log = log(&dir);
        log.append(&HistoryEntry::new(SigninOutcome::Success, "ok"))
            .unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let row = contents.lines().nth(1).unwrap();
        let timestamp = row.split(',').next().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}
