//! Append-only record of failed conversions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::queue::WorkItem;

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The item as it was when it failed.
    pub item: WorkItem,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Failures of the current run, independent of the live queue.
///
/// Removing an item from the queue does not remove its failure record.
#[derive(Debug, Default)]
pub struct FailureLedger {
    records: Mutex<Vec<FailureRecord>>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FailureRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, item: WorkItem, reason: impl Into<String>) {
        self.lock().push(FailureRecord {
            item,
            error: reason.into(),
            failed_at: Utc::now(),
        });
    }

    pub fn records(&self) -> Vec<FailureRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// One formatted block per record, numbered from 1.
    pub fn export_entries(&self) -> Vec<String> {
        self.lock()
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let error = if record.error.is_empty() {
                    "unknown error"
                } else {
                    record.error.as_str()
                };
                format!(
                    "{}. {}\n   path: {}\n   error: {}\n",
                    i + 1,
                    record.item.name,
                    record.item.input_path.display(),
                    error
                )
            })
            .collect()
    }

    /// Report text with entries separated by a blank line.
    pub fn export_text(&self) -> String {
        self.export_entries().join("\n")
    }
}

/// Default file name of the exported report for `date`.
pub fn report_file_name(date: NaiveDate) -> String {
    format!("failed-list_{}.txt", date.format("%Y-%m-%d"))
}
