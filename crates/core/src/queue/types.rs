//! Core work item data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::progress::ProgressEvent;

/// Identifier of a work item. Never reused within a store.
pub type ItemId = u64;

/// Lifecycle of a single work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ItemStatus {
    /// Whether the item has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known progress of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub percent: f64,
    pub elapsed_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// Snapshot of a normalized event, stamped now.
    pub fn from_event(event: &ProgressEvent) -> Self {
        Self {
            percent: event.percent,
            elapsed_secs: event.elapsed_secs,
            remaining_secs: event.remaining_secs,
            bitrate_kbps: event.bitrate_kbps,
            updated_at: Utc::now(),
        }
    }

    /// Final snapshot of a finished conversion.
    pub fn finished(elapsed_secs: f64) -> Self {
        Self {
            percent: 100.0,
            elapsed_secs,
            remaining_secs: None,
            bitrate_kbps: None,
            updated_at: Utc::now(),
        }
    }
}

/// One file to convert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    /// File name with extension.
    pub name: String,
    pub input_path: PathBuf,
    /// Path relative to the scanned root, used to mirror the folder layout.
    pub relative_path: PathBuf,
    /// Unset until an output folder is chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    /// Failure reason, only while `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Field changes applied together with a status update.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub output_path: Option<PathBuf>,
    pub progress: Option<ProgressSnapshot>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

impl ItemPatch {
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_output_path(mut self, path: PathBuf) -> Self {
        self.output_path = Some(path);
        self
    }

    pub fn with_progress(mut self, progress: ProgressSnapshot) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }
}

/// Number of items per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.queued + self.processing + self.completed + self.failed
    }
}
