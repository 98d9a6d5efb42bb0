//! Fan-out of log and progress events.
//!
//! Every event produced while processing the queue is a [`LogEntry`]. The
//! [`EventRelay`] mirrors it to `tracing`, persists non-progress entries to an
//! optional [`LogSink`] and hands it to each subscriber inside its own failure
//! boundary.
//!
//! # Example
//!
//! ```ignore
//! use retro2mp4_core::relay::{EventRelay, FileLogSink, LogEntry};
//!
//! let sink = FileLogSink::create(&log_dir)?;
//! let relay = EventRelay::with_sink(Arc::new(sink));
//!
//! let token = relay.subscribe(|entry| {
//!     println!("{}", entry.format_line());
//!     Ok(())
//! });
//!
//! relay.info("scan", "Found 12 files");
//! relay.unsubscribe(token);
//! ```

mod entry;
mod error;
mod event_relay;
mod file_sink;

pub use entry::{LogEntry, LogLevel};
pub use error::RelayError;
pub use event_relay::{EventRelay, SubscriptionToken};
pub use file_sink::{FileLogSink, LogSink};
