//! Types for the scheduler module.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::queue::{ItemId, QueueCounts};

/// Scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Nothing running; the queue may be edited and replaced.
    Idle,
    /// Pulling queued items one at a time.
    Running,
    /// Not pulling new items; an in-flight conversion may still finish.
    Paused,
    /// Transient while a stop resets in-flight work.
    Stopping,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejections of user commands. None of them changes scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Select an output folder first")]
    NoOutputDir,

    #[error("Queue is empty, scan a folder first")]
    EmptyQueue,

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        state: SchedulerState,
        action: &'static str,
    },
}

/// Stage at which an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No destination when the item was selected.
    OutputPath,
    /// Input missing or unreadable.
    Input,
    Probe,
    Conversion,
    /// Encoder finished without a usable output file.
    Output,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutputPath => "output_path",
            Self::Input => "input",
            Self::Probe => "probe",
            Self::Conversion => "conversion",
            Self::Output => "output",
        }
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Item owning the conversion slot, if it is still in the queue.
    pub active_item: Option<ItemId>,
    /// Whether a conversion is running, even one detached from its item.
    pub busy: bool,
    pub counts: QueueCounts,
    pub failures_recorded: usize,
}

/// Configuration for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Raw progress ticks buffered between converter and scheduler.
    #[serde(default = "default_progress_channel_capacity")]
    pub progress_channel_capacity: usize,
}

fn default_progress_channel_capacity() -> usize {
    64
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            progress_channel_capacity: default_progress_channel_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SchedulerError::NoOutputDir.to_string(),
            "Select an output folder first"
        );
        let err = SchedulerError::InvalidTransition {
            state: SchedulerState::Idle,
            action: "pause",
        };
        assert_eq!(err.to_string(), "Cannot pause while idle");
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&SchedulerState::Paused).unwrap();
        assert_eq!(json, "\"paused\"");
    }
}
