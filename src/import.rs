//! Bulk import of usage events from JSONL files
//!
//! Each non-empty line holds one [`UsageEvent`]. Lines that fail to parse
//! are reported and skipped; parsed events are replayed through the ledger
//! on concurrent tokio tasks. Replaying the same file twice is harmless as
//! long as events carry ids.
//!
//! ```text
//! {"event_id":"m-1","user_id":42,"category":"chat_tokens","quantity":1200,"timestamp":"2024-03-15T10:00:00Z"}
//! {"event_id":"m-2","user_id":42,"category":"number_images","quantity":1,"model":"512x512","timestamp":"2024-03-15T10:05:00Z"}
//! ```

use costbook_core::error::Result;
use costbook_core::types::UsageEvent;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::ledger::Ledger;

/// A line that could not be imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    /// 1-based line number
    pub line: usize,
    pub message: String,
}

/// Summary of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Non-empty lines read
    pub total: usize,
    /// Events applied for the first time
    pub applied: usize,
    /// Events skipped as already applied
    pub duplicates: usize,
    /// Applied events that arrived after their day closed
    pub late: usize,
    /// Lines rejected by parsing or by the ledger
    pub failures: Vec<ImportFailure>,
}

/// Replays JSONL usage files into a ledger
pub struct Importer {
    ledger: Arc<Ledger>,
    concurrency: usize,
    show_progress: bool,
}

impl Importer {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            concurrency: 16,
            show_progress: false,
        }
    }

    /// Maximum number of events in flight
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Show a progress bar while replaying
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Read events from a JSONL file
    pub async fn read_events(
        path: &Path,
    ) -> Result<(Vec<(usize, UsageEvent)>, Vec<ImportFailure>)> {
        let file = tokio::fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut line_number = 0;
        let mut events = Vec::new();
        let mut failures = Vec::new();

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<UsageEvent>(&line) {
                Ok(event) => events.push((line_number, event)),
                Err(e) => {
                    warn!(
                        "Failed to parse line {} in {}: {}",
                        line_number,
                        path.display(),
                        e
                    );
                    failures.push(ImportFailure {
                        line: line_number,
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!("Read {} events from {}", events.len(), path.display());
        Ok((events, failures))
    }

    /// Import every event of a JSONL file
    pub async fn import_file(&self, path: &Path) -> Result<ImportReport> {
        let (events, failures) = Self::read_events(path).await?;
        let mut report = ImportReport {
            total: events.len() + failures.len(),
            failures,
            ..ImportReport::default()
        };

        let progress = if self.show_progress {
            let pb = ProgressBar::new(events.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}")
            {
                pb.set_style(style);
            }
            pb.set_message("Importing usage events");
            Some(pb)
        } else {
            None
        };

        let mut results = futures::stream::iter(events)
            .map(|(line, event)| {
                let ledger = Arc::clone(&self.ledger);
                tokio::spawn(async move { (line, ledger.record_usage(event).await) })
            })
            .buffer_unordered(self.concurrency);

        while let Some(joined) = results.next().await {
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            let (line, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Import task failed: {}", e);
                    report.failures.push(ImportFailure {
                        line: 0,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            match result {
                Ok(outcome) if outcome.applied => {
                    report.applied += 1;
                    if outcome.late {
                        report.late += 1;
                    }
                }
                Ok(_) => report.duplicates += 1,
                Err(e) => {
                    warn!("Line {} rejected: {}", line, e);
                    report.failures.push(ImportFailure {
                        line,
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("Import complete");
        }

        report.failures.sort_by_key(|failure| failure.line);
        info!(
            total = report.total,
            applied = report.applied,
            duplicates = report.duplicates,
            late = report.late,
            failed = report.failures.len(),
            "Imported {}",
            path.display()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use costbook_core::timezone::TimezoneConfig;
    use costbook_core::types::{Money, UserId};
    use costbook_pricing::{CostCalculator, PricingTable};
    use costbook_store::MemoryStore;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    fn ledger() -> Arc<Ledger> {
        Arc::new(Ledger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(CostCalculator::new(Arc::new(PricingTable::builtin()))),
            LedgerConfig::default().with_timezone(TimezoneConfig::utc()),
        ))
    }

    async fn write_file(dir: &TempDir, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join("events.jsonl");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        for line in lines {
            file.write_all(line.as_bytes()).await.unwrap();
            file.write_all(b"\n").await.unwrap();
        }
        file.flush().await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_import_counts_outcomes() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            &[
                r#"{"event_id":"a","user_id":1,"category":"chat_tokens","quantity":1000,"timestamp":"2024-03-15T10:00:00Z"}"#,
                "",
                r#"{"event_id":"a","user_id":1,"category":"chat_tokens","quantity":1000,"timestamp":"2024-03-15T10:00:00Z"}"#,
                r#"{"event_id":"b","user_id":1,"category":"number_images","quantity":1.5,"timestamp":"2024-03-15T10:00:00Z"}"#,
                "not json",
                r#"{"event_id":"c","user_id":1,"category":"number_images","quantity":1,"model":"256x256","timestamp":"2024-03-15T11:00:00Z"}"#,
            ],
        )
        .await;

        let ledger = ledger();
        let report = Importer::new(Arc::clone(&ledger))
            .with_concurrency(1)
            .import_file(&path)
            .await
            .unwrap();

        assert_eq!(report.total, 5);
        assert_eq!(report.applied, 2);
        assert_eq!(report.duplicates, 1);
        let failed_lines: Vec<_> = report.failures.iter().map(|f| f.line).collect();
        assert_eq!(failed_lines, vec![4, 5]);

        let costs = ledger
            .store()
            .get_costs(UserId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(costs.all_time, Money::from_micros(2_000 + 16_000));
    }

    #[tokio::test]
    async fn test_reimport_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<String> = (0..50)
            .map(|i| {
                format!(
                    r#"{{"event_id":"e{i}","user_id":{},"category":"chat_tokens","quantity":100,"timestamp":"2024-03-15T10:00:00Z"}}"#,
                    i % 3
                )
            })
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let path = write_file(&dir, &refs).await;

        let ledger = ledger();
        let importer = Importer::new(Arc::clone(&ledger)).with_concurrency(8);
        let first = importer.import_file(&path).await.unwrap();
        let second = importer.import_file(&path).await.unwrap();
        assert_eq!(first.applied, 50);
        assert_eq!(second.applied, 0);
        assert_eq!(second.duplicates, 50);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let importer = Importer::new(ledger());
        assert!(
            importer
                .import_file(Path::new("/nonexistent/events.jsonl"))
                .await
                .is_err()
        );
    }
}
