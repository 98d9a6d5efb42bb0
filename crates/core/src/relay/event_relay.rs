use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

use super::entry::{LogEntry, LogLevel};
use super::file_sink::LogSink;
use crate::metrics;

type Subscriber = Arc<dyn Fn(&LogEntry) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`EventRelay::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Broadcasts log entries to subscribers and an optional sink.
///
/// A subscriber that returns an error or panics is logged and skipped; the
/// remaining subscribers still receive the entry and the publisher never sees
/// the failure. Subscribers run outside the internal lock, so they may
/// subscribe, unsubscribe or publish themselves.
pub struct EventRelay {
    subscribers: RwLock<Vec<(SubscriptionToken, Subscriber)>>,
    next_token: AtomicU64,
    sink: Option<Arc<dyn LogSink>>,
}

impl Default for EventRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRelay {
    /// Relay without durable sink.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(1),
            sink: None,
        }
    }

    /// Relay persisting info and error entries to `sink`.
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new()
        }
    }

    pub fn sink(&self) -> Option<&Arc<dyn LogSink>> {
        self.sink.as_ref()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionToken
    where
        F: Fn(&LogEntry) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((token, Arc::new(callback)));
        token
    }

    /// Returns false if the token was unknown.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(t, _)| *t != token);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `entry` to the tracing log, the sink and every subscriber.
    pub fn publish(&self, entry: LogEntry) {
        match entry.level {
            LogLevel::Info => info!(module = %entry.module, "{}", entry.message),
            LogLevel::Error => error!(module = %entry.module, "{}", entry.message),
            LogLevel::Progress => debug!(module = %entry.module, "{}", entry.message),
        }

        if entry.level != LogLevel::Progress {
            if let Some(sink) = &self.sink {
                if let Err(e) = sink.write(&entry) {
                    metrics::RELAY_SINK_ERRORS.inc();
                    warn!("Failed to write log entry: {}", e);
                }
            }
        }

        let subscribers: Vec<(SubscriptionToken, Subscriber)> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (token, subscriber) in subscribers {
            match catch_unwind(AssertUnwindSafe(|| subscriber(&entry))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    metrics::RELAY_SUBSCRIBER_ERRORS.inc();
                    warn!(token = token.0, "Log subscriber failed: {:#}", e);
                }
                Err(_) => {
                    metrics::RELAY_SUBSCRIBER_ERRORS.inc();
                    warn!(token = token.0, "Log subscriber panicked");
                }
            }
        }
    }

    /// Publishes every entry in order.
    pub fn publish_all(&self, entries: impl IntoIterator<Item = LogEntry>) {
        for entry in entries {
            self.publish(entry);
        }
    }

    pub fn info(&self, module: &str, message: impl Into<String>) {
        self.publish(LogEntry::info(module, message));
    }

    /// Publishes an error entry carrying the error text as payload.
    pub fn error(&self, module: &str, message: impl Into<String>, err: &dyn std::fmt::Display) {
        self.publish(
            LogEntry::error(module, message)
                .with_data(serde_json::json!({ "error": err.to_string() })),
        );
    }

    /// Writes a section separator to the sink.
    pub fn section(&self, title: &str) {
        info!("==== {} ====", title);
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.section(title) {
                metrics::RELAY_SINK_ERRORS.inc();
                warn!("Failed to write log section: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for EventRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRelay")
            .field("subscribers", &self.subscriber_count())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
