//! Sequential scheduler implementation.

use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::converter::{ConversionJob, ConversionResult, Converter, ConverterError, RawProgress};
use crate::ledger::FailureLedger;
use crate::metrics;
use crate::progress::{normalize, ProgressEvent};
use crate::queue::{ItemId, ItemPatch, ItemStatus, ProgressSnapshot, QueueStore, WorkItem};
use crate::relay::{EventRelay, LogEntry};
use crate::scanner::{resolve_output_file, ScannedFile};

use super::types::{
    FailureKind, SchedulerConfig, SchedulerError, SchedulerState, SchedulerStatus,
};

/// Module name on relayed entries.
const MODULE: &str = "scheduler";

/// Reason given to an item selected without destination.
pub const OUTPUT_PATH_NOT_SET: &str = "output path not set";

/// The conversion currently holding the single slot.
#[derive(Debug)]
struct InFlight {
    attempt: u64,
    /// `None` once the item was removed from the queue.
    item_id: Option<ItemId>,
    started: Instant,
}

#[derive(Debug)]
struct Machine {
    state: SchedulerState,
    in_flight: Option<InFlight>,
    next_attempt: u64,
    output_dir: Option<PathBuf>,
}

/// Terminal result of one attempt.
#[derive(Debug)]
enum Outcome {
    Completed(ConversionResult),
    Failed { kind: FailureKind, reason: String },
}

impl Outcome {
    fn failed(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            reason: reason.into(),
        }
    }
}

struct Shared<C> {
    converter: Arc<C>,
    queue: QueueStore,
    ledger: FailureLedger,
    relay: Arc<EventRelay>,
    config: SchedulerConfig,
    machine: Mutex<Machine>,
    state_tx: watch::Sender<SchedulerState>,
}

/// Drives the queue through the converter, one item at a time.
///
/// All transitions (user commands, progress, terminal outcomes) go through a
/// single state-machine lock. Relay entries produced under that lock are
/// collected and published after it is released, so subscribers may call
/// back into the scheduler.
///
/// Must be used from within a tokio runtime: starting an item spawns a task.
pub struct Scheduler<C: Converter> {
    shared: Arc<Shared<C>>,
}

impl<C: Converter> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Converter + 'static> Scheduler<C> {
    pub fn new(converter: C, relay: Arc<EventRelay>, config: SchedulerConfig) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            shared: Arc::new(Shared {
                converter: Arc::new(converter),
                queue: QueueStore::new(),
                ledger: FailureLedger::new(),
                relay,
                config,
                machine: Mutex::new(Machine {
                    state: SchedulerState::Idle,
                    in_flight: None,
                    next_attempt: 1,
                    output_dir: None,
                }),
                state_tx,
            }),
        }
    }

    /// Read access to the queue. Mutations go through the scheduler.
    pub fn queue(&self) -> &QueueStore {
        &self.shared.queue
    }

    pub fn ledger(&self) -> &FailureLedger {
        &self.shared.ledger
    }

    pub fn relay(&self) -> &Arc<EventRelay> {
        &self.shared.relay
    }

    pub fn converter(&self) -> &C {
        &self.shared.converter
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.lock().state
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        self.shared.lock().output_dir.clone()
    }

    pub fn status(&self) -> SchedulerStatus {
        let m = self.shared.lock();
        SchedulerStatus {
            state: m.state,
            active_item: m.in_flight.as_ref().and_then(|f| f.item_id),
            busy: m.in_flight.is_some(),
            counts: self.shared.queue.counts(),
            failures_recorded: self.shared.ledger.len(),
        }
    }

    /// Receiver notified on every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.shared.state_tx.subscribe()
    }

    /// Resolves once the scheduler is idle.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|state| *state == SchedulerState::Idle).await;
    }

    /// Replaces the queue with a scanned batch. Only allowed while idle.
    pub fn load(&self, files: Vec<ScannedFile>) -> Result<Vec<WorkItem>, SchedulerError> {
        let items = {
            let m = self.shared.lock();
            if m.state != SchedulerState::Idle {
                return Err(SchedulerError::InvalidTransition {
                    state: m.state,
                    action: "load a new batch",
                });
            }
            self.shared
                .queue
                .enqueue_batch(files, m.output_dir.as_deref())
        };

        self.shared.relay.publish(
            LogEntry::info(MODULE, format!("Loaded {} files", items.len()))
                .with_data(json!({ "count": items.len() })),
        );
        Ok(items)
    }

    /// Sets or clears the output folder and re-targets queued items.
    pub fn set_output_dir(&self, dir: Option<PathBuf>) {
        {
            let mut m = self.shared.lock();
            self.shared.queue.assign_output_paths(dir.as_deref());
            m.output_dir = dir.clone();
        }

        let message = match &dir {
            Some(dir) => format!("Output folder set to {}", dir.display()),
            None => "Output folder cleared".to_string(),
        };
        self.shared.relay.info(MODULE, message);
    }

    /// Starts processing the queue.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut notes = Vec::new();
        {
            let mut m = self.shared.lock();
            if m.state != SchedulerState::Idle {
                return Err(SchedulerError::InvalidTransition {
                    state: m.state,
                    action: "start",
                });
            }
            let Some(dir) = m.output_dir.clone() else {
                return Err(SchedulerError::NoOutputDir);
            };
            if self.shared.queue.is_empty() {
                return Err(SchedulerError::EmptyQueue);
            }

            self.shared.queue.assign_output_paths(Some(&dir));
            metrics::RUNS_STARTED.inc();
            self.shared.relay.section("Batch started");
            self.shared.set_state(&mut m, SchedulerState::Running);

            let queued = self.shared.queue.counts().queued;
            notes.push(
                LogEntry::info(MODULE, format!("Starting batch of {} files", queued))
                    .with_data(json!({ "queued": queued, "output_dir": dir })),
            );
            self.shared.advance(&mut m, &mut notes);
        }

        self.shared.relay.publish_all(notes);
        Ok(())
    }

    /// Stops pulling new items. The running conversion is left to finish.
    pub fn pause(&self) -> Result<(), SchedulerError> {
        {
            let mut m = self.shared.lock();
            if m.state != SchedulerState::Running {
                return Err(SchedulerError::InvalidTransition {
                    state: m.state,
                    action: "pause",
                });
            }
            self.shared.set_state(&mut m, SchedulerState::Paused);
        }

        self.shared.relay.info(MODULE, "Paused");
        Ok(())
    }

    /// Continues pulling items.
    pub fn resume(&self) -> Result<(), SchedulerError> {
        let mut notes = vec![LogEntry::info(MODULE, "Resumed")];
        {
            let mut m = self.shared.lock();
            if m.state != SchedulerState::Paused {
                return Err(SchedulerError::InvalidTransition {
                    state: m.state,
                    action: "resume",
                });
            }
            self.shared.set_state(&mut m, SchedulerState::Running);
            self.shared.advance(&mut m, &mut notes);
        }

        self.shared.relay.publish_all(notes);
        Ok(())
    }

    /// Abandons the running conversion and returns its item to the queue.
    ///
    /// The external process is not killed; whatever it reports afterwards is
    /// ignored.
    pub fn stop(&self) -> Result<(), SchedulerError> {
        let reset = {
            let mut m = self.shared.lock();
            if !matches!(m.state, SchedulerState::Running | SchedulerState::Paused) {
                return Err(SchedulerError::InvalidTransition {
                    state: m.state,
                    action: "stop",
                });
            }
            self.shared.set_state(&mut m, SchedulerState::Stopping);
            let reset = self.shared.queue.reset_processing();
            if let Some(flight) = m.in_flight.take() {
                debug!(attempt = flight.attempt, "Abandoning in-flight conversion");
            }
            self.shared.set_state(&mut m, SchedulerState::Idle);
            reset
        };

        self.shared.relay.publish(
            LogEntry::info(MODULE, "Stopped").with_data(json!({ "requeued": reset })),
        );
        Ok(())
    }

    /// Removes an item in any status.
    ///
    /// Removing the item being converted detaches it: the conversion keeps
    /// the slot until it ends, then its outcome is dropped and the next item
    /// starts.
    pub fn remove(&self, id: ItemId) -> bool {
        let (removed, detached) = {
            let mut m = self.shared.lock();
            let removed = self.shared.queue.remove(id);
            let mut detached = false;
            if let Some(flight) = m.in_flight.as_mut() {
                if flight.item_id == Some(id) {
                    flight.item_id = None;
                    detached = true;
                }
            }
            (removed, detached)
        };

        if removed {
            let message = if detached {
                format!("Removed item {} while converting; its result will be discarded", id)
            } else {
                format!("Removed item {}", id)
            };
            self.shared.relay.info(MODULE, message);
        }
        removed
    }
}

impl<C: Converter + 'static> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, m: &mut Machine, state: SchedulerState) {
        if m.state != state {
            debug!(from = %m.state, to = %state, "Scheduler state change");
        }
        m.state = state;
        self.state_tx.send_replace(state);
    }

    /// Single decision point after any event that may free the slot.
    ///
    /// Starts the next queued item when running and idle, failing items that
    /// have no destination along the way, or goes idle when nothing is left.
    fn advance(self: &Arc<Self>, m: &mut Machine, notes: &mut Vec<LogEntry>) {
        loop {
            if m.state != SchedulerState::Running || m.in_flight.is_some() {
                return;
            }

            let Some(next) = self.queue.find_next_queued() else {
                self.set_state(m, SchedulerState::Idle);
                let counts = self.queue.counts();
                notes.push(
                    LogEntry::info(
                        MODULE,
                        format!(
                            "Batch finished: {} completed, {} failed",
                            counts.completed, counts.failed
                        ),
                    )
                    .with_data(json!(counts)),
                );
                return;
            };

            let Some(output_path) = next
                .output_path
                .as_deref()
                .map(|path| resolve_output_file(path, &next.input_path))
            else {
                self.fail_item(next.id, FailureKind::OutputPath, OUTPUT_PATH_NOT_SET, notes);
                continue;
            };

            let patch = ItemPatch::default()
                .with_output_path(output_path.clone())
                .with_started_at(Utc::now());
            let Some(item) = self.queue.update_status(next.id, ItemStatus::Processing, patch)
            else {
                continue;
            };

            let attempt = m.next_attempt;
            m.next_attempt += 1;
            m.in_flight = Some(InFlight {
                attempt,
                item_id: Some(item.id),
                started: Instant::now(),
            });

            notes.push(
                LogEntry::info(MODULE, format!("Converting {}", item.name)).with_data(json!({
                    "id": item.id,
                    "input": item.input_path,
                    "output": output_path,
                })),
            );
            tokio::spawn(run_attempt(Arc::clone(self), attempt, item, output_path));
            return;
        }
    }

    fn fail_item(&self, id: ItemId, kind: FailureKind, reason: &str, notes: &mut Vec<LogEntry>) {
        metrics::FAILURES_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc();

        if let Some(item) = self
            .queue
            .update_status(id, ItemStatus::Failed, ItemPatch::error(reason))
        {
            notes.push(
                LogEntry::error(MODULE, format!("Failed: {}", item.name)).with_data(json!({
                    "id": id,
                    "input": item.input_path,
                    "stage": kind.as_str(),
                    "error": reason,
                })),
            );
            self.ledger.append(item, reason);
        }
    }

    /// Whether `attempt` is in flight and still attached to its item.
    fn owns(&self, attempt: u64, item_id: ItemId) -> bool {
        self.lock()
            .in_flight
            .as_ref()
            .is_some_and(|f| f.attempt == attempt && f.item_id == Some(item_id))
    }

    /// Stores a progress tick if the attempt still owns its item.
    fn apply_progress(&self, attempt: u64, item_id: ItemId, event: &ProgressEvent) -> bool {
        let m = self.lock();
        let current = m
            .in_flight
            .as_ref()
            .is_some_and(|f| f.attempt == attempt && f.item_id == Some(item_id));
        current
            && self
                .queue
                .update_progress(item_id, ProgressSnapshot::from_event(event))
    }

    /// Applies a terminal outcome and moves on.
    fn finish(self: &Arc<Self>, attempt: u64, outcome: Outcome) {
        let mut notes = Vec::new();
        {
            let mut m = self.lock();
            match m.in_flight.take() {
                Some(flight) if flight.attempt == attempt => {
                    let elapsed = flight.started.elapsed().as_secs_f64();
                    match flight.item_id {
                        Some(id) => self.apply_outcome(id, outcome, elapsed, &mut notes),
                        None => {
                            metrics::CONVERSIONS_TOTAL
                                .with_label_values(&["discarded"])
                                .inc();
                            notes.push(LogEntry::info(
                                MODULE,
                                "Conversion of a removed item ended, result discarded",
                            ));
                        }
                    }

                    match m.state {
                        SchedulerState::Running => self.advance(&mut m, &mut notes),
                        SchedulerState::Paused if self.queue.find_next_queued().is_none() => {
                            self.set_state(&mut m, SchedulerState::Idle);
                            notes.push(LogEntry::info(MODULE, "Nothing left to convert"));
                        }
                        _ => {}
                    }
                }
                other => {
                    m.in_flight = other;
                    metrics::CONVERSIONS_TOTAL
                        .with_label_values(&["discarded"])
                        .inc();
                    debug!(attempt, "Discarding outcome of abandoned attempt");
                }
            }
        }

        self.relay.publish_all(notes);
    }

    fn apply_outcome(&self, id: ItemId, outcome: Outcome, elapsed: f64, notes: &mut Vec<LogEntry>) {
        match outcome {
            Outcome::Completed(result) => {
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&["completed"])
                    .inc();
                metrics::CONVERSION_DURATION
                    .with_label_values(&["completed"])
                    .observe(elapsed);

                let patch = ItemPatch::default().with_progress(ProgressSnapshot::finished(elapsed));
                if let Some(item) = self.queue.update_status(id, ItemStatus::Completed, patch) {
                    notes.push(
                        LogEntry::info(MODULE, format!("Completed {}", item.name)).with_data(
                            json!({
                                "id": id,
                                "output": result.output_path,
                                "size_bytes": result.output_size_bytes,
                                "duration_ms": result.duration_ms,
                            }),
                        ),
                    );
                }
            }
            Outcome::Failed { kind, reason } => {
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                metrics::CONVERSION_DURATION
                    .with_label_values(&["failed"])
                    .observe(elapsed);
                self.fail_item(id, kind, &reason, notes);
            }
        }
    }
}

/// Runs one attempt to completion and reports its outcome.
async fn run_attempt<C: Converter + 'static>(
    shared: Arc<Shared<C>>,
    attempt: u64,
    item: WorkItem,
    output_path: PathBuf,
) {
    let task = tokio::spawn(execute(Arc::clone(&shared), attempt, item, output_path));
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(attempt, "Conversion task aborted: {}", e);
            Outcome::failed(FailureKind::Conversion, format!("conversion task aborted: {}", e))
        }
    };
    shared.finish(attempt, outcome);
}

/// Pre-flight, probe, convert and verify one item.
async fn execute<C: Converter + 'static>(
    shared: Arc<Shared<C>>,
    attempt: u64,
    item: WorkItem,
    output_path: PathBuf,
) -> Outcome {
    match tokio::fs::metadata(&item.input_path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            return Outcome::failed(
                FailureKind::Input,
                format!("input is not a file: {}", item.input_path.display()),
            )
        }
        Err(_) => {
            return Outcome::failed(
                FailureKind::Input,
                format!("input file not found: {}", item.input_path.display()),
            )
        }
    }
    if let Err(e) = tokio::fs::File::open(&item.input_path).await {
        return Outcome::failed(
            FailureKind::Input,
            format!("input file not readable: {}: {}", item.input_path.display(), e),
        );
    }

    let info = match shared.converter.probe(&item.input_path).await {
        Ok(info) => info,
        Err(e) => return Outcome::failed(FailureKind::Probe, e.detail()),
    };
    if shared.owns(attempt, item.id) {
        shared.relay.publish(
            LogEntry::info(MODULE, format!("Probed {}", item.name)).with_data(json!({
                "id": item.id,
                "duration_secs": info.duration_secs,
                "format": info.format,
                "video_codec": info.video_codec,
                "audio_codec": info.audio_codec,
                "size_bytes": info.size_bytes,
            })),
        );
    }

    let (tx, rx) = mpsc::channel(shared.config.progress_channel_capacity.max(1));
    let forwarder = tokio::spawn(forward_progress(
        Arc::clone(&shared),
        attempt,
        item.id,
        item.name.clone(),
        info.duration_secs,
        Instant::now(),
        rx,
    ));

    let job = ConversionJob::new(
        item.id.to_string(),
        item.input_path.clone(),
        output_path.clone(),
    );
    let result = shared.converter.convert_with_progress(job, tx).await;

    if let Err(e) = forwarder.await {
        warn!(attempt, "Progress forwarder ended abnormally: {}", e);
    }

    match result {
        Ok(result) => match tokio::fs::metadata(&output_path).await {
            Ok(meta) if meta.len() > 0 => Outcome::Completed(result),
            Ok(_) => Outcome::failed(
                FailureKind::Output,
                format!("output file is empty: {}", output_path.display()),
            ),
            Err(_) => Outcome::failed(
                FailureKind::Output,
                format!("output file missing after conversion: {}", output_path.display()),
            ),
        },
        Err(e) => {
            let kind = match e {
                ConverterError::InputNotFound { .. } => FailureKind::Input,
                ConverterError::OutputMissing { .. } => FailureKind::Output,
                _ => FailureKind::Conversion,
            };
            Outcome::failed(kind, e.detail())
        }
    }
}

/// Normalizes raw ticks and relays them while the attempt owns its item.
async fn forward_progress<C: Converter + 'static>(
    shared: Arc<Shared<C>>,
    attempt: u64,
    item_id: ItemId,
    name: String,
    duration_secs: f64,
    started: Instant,
    mut rx: mpsc::Receiver<RawProgress>,
) {
    while let Some(raw) = rx.recv().await {
        let event = normalize(&raw, duration_secs, started.elapsed());
        if !shared.apply_progress(attempt, item_id, &event) {
            continue;
        }
        shared.relay.publish(
            LogEntry::progress(MODULE, format!("{} {:.1}%", name, event.percent))
                .with_data(json!({ "id": item_id, "progress": event })),
        );
    }
}
