//! Sequential conversion scheduler.
//!
//! Pulls queued items one at a time and runs each through pre-flight, probe,
//! convert and output verification. At most one conversion is in flight.
//!
//! ```text
//!            start              pause
//!   Idle ─────────────▶ Running ─────▶ Paused
//!    ▲  ◀── queue drained ─┘   ◀─────   │
//!    │                          resume  │
//!    └──────── Stopping ◀───── stop ────┘
//! ```
//!
//! Pausing is cooperative: the running conversion finishes and records its
//! outcome, but nothing new starts. Stopping abandons the running conversion
//! and puts its item back to queued.

mod runner;
mod types;

pub use runner::{Scheduler, OUTPUT_PATH_NOT_SET};
pub use types::{FailureKind, SchedulerConfig, SchedulerError, SchedulerState, SchedulerStatus};
