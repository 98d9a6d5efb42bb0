//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock, Semaphore};

use crate::converter::{
    ConversionJob, ConversionResult, Converter, ConverterError, MediaInfo, RawProgress,
};

/// Bytes written to every produced output file.
const MOCK_OUTPUT: &[u8] = b"mock mp4 payload";

/// A recorded conversion job for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    /// The job that was submitted.
    pub job: ConversionJob,
    /// Whether the conversion succeeded.
    pub success: bool,
}

/// Mock implementation of the Converter trait.
///
/// Provides controllable behavior for testing:
/// - Track conversion jobs for assertions
/// - Fail probe or conversion for specific inputs
/// - Script the raw progress ticks of each conversion
/// - Hold probes or conversions until the test releases them
/// - Observe how many conversions overlap
///
/// Clones share all state, so a test can keep a handle after giving the
/// converter to a scheduler.
///
/// # Example
///
/// ```rust,ignore
/// use retro2mp4_core::testing::MockConverter;
///
/// let converter = MockConverter::new();
/// converter.fail_probe("/videos/broken.avi", "moov atom not found").await;
/// converter.set_progress_ticks(&["00:00:30.00", "00:01:00.00"]).await;
///
/// converter.hold_conversions().await;
/// // ... start a batch, assert on the running item ...
/// converter.release_all().await;
/// ```
#[derive(Debug, Clone)]
pub struct MockConverter {
    /// Finished conversions.
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    /// Conversions that have started, finished or not.
    started: Arc<RwLock<Vec<ConversionJob>>>,
    /// Pre-configured probe results by path.
    probe_results: Arc<RwLock<HashMap<PathBuf, MediaInfo>>>,
    /// Probe failures by path.
    probe_failures: Arc<RwLock<HashMap<PathBuf, String>>>,
    /// Conversion failures by input path.
    convert_failures: Arc<RwLock<HashMap<PathBuf, String>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ConverterError>>>,
    /// Simulated conversion duration in milliseconds.
    conversion_duration_ms: Arc<RwLock<u64>>,
    /// Raw ticks sent by every conversion, spread over its duration.
    progress_ticks: Arc<RwLock<Vec<RawProgress>>>,
    /// Whether a successful conversion writes its output file.
    write_output: Arc<RwLock<bool>>,
    /// Whether conversions wait on the gate before finishing.
    held: Arc<RwLock<bool>>,
    gate: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    /// Whether probes wait on their own gate before answering.
    probes_held: Arc<RwLock<bool>>,
    probe_gate: Arc<Semaphore>,
    probes_waiting: Arc<AtomicUsize>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a new mock converter.
    pub fn new() -> Self {
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            started: Arc::new(RwLock::new(Vec::new())),
            probe_results: Arc::new(RwLock::new(HashMap::new())),
            probe_failures: Arc::new(RwLock::new(HashMap::new())),
            convert_failures: Arc::new(RwLock::new(HashMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            conversion_duration_ms: Arc::new(RwLock::new(0)),
            progress_ticks: Arc::new(RwLock::new(Vec::new())),
            write_output: Arc::new(RwLock::new(true)),
            held: Arc::new(RwLock::new(false)),
            gate: Arc::new(Semaphore::new(0)),
            waiting: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            probes_held: Arc::new(RwLock::new(false)),
            probe_gate: Arc::new(Semaphore::new(0)),
            probes_waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get all finished conversions.
    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }

    /// Get the number of conversions that have started.
    pub async fn started_count(&self) -> usize {
        self.started.read().await.len()
    }

    /// Input paths in the order their conversions started.
    pub async fn started_inputs(&self) -> Vec<PathBuf> {
        self.started
            .read()
            .await
            .iter()
            .map(|job| job.input_path.clone())
            .collect()
    }

    /// Waits until at least `count` conversions have started.
    pub async fn wait_for_started(&self, count: usize) {
        while self.started_count().await < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Highest number of conversions observed running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Set a probe result for a specific path.
    pub async fn set_probe_result(&self, path: impl AsRef<Path>, info: MediaInfo) {
        self.probe_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), info);
    }

    /// Make probing `path` fail with `reason`.
    pub async fn fail_probe(&self, path: impl AsRef<Path>, reason: &str) {
        self.probe_failures
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), reason.to_string());
    }

    /// Make converting `path` fail with `reason`.
    pub async fn fail_conversion(&self, path: impl AsRef<Path>, reason: &str) {
        self.convert_failures
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), reason.to_string());
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the simulated conversion duration.
    pub async fn set_conversion_duration(&self, duration: Duration) {
        *self.conversion_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Timemarks sent as raw progress by every conversion.
    pub async fn set_progress_ticks(&self, timemarks: &[&str]) {
        *self.progress_ticks.write().await =
            timemarks.iter().map(|t| RawProgress::new(*t)).collect();
    }

    /// Whether successful conversions write their output file.
    pub async fn set_write_output(&self, write: bool) {
        *self.write_output.write().await = write;
    }

    /// Make conversions wait after sending progress until released.
    pub async fn hold_conversions(&self) {
        *self.held.write().await = true;
    }

    /// Let one held conversion finish.
    pub fn release_one(&self) {
        self.gate.add_permits(1);
    }

    /// Stop holding and let every waiting conversion finish.
    pub async fn release_all(&self) {
        *self.held.write().await = false;
        self.gate.add_permits(self.waiting.load(Ordering::SeqCst));
    }

    /// Make probes wait until [`release_probes`](Self::release_probes).
    pub async fn hold_probes(&self) {
        *self.probes_held.write().await = true;
    }

    /// Number of probes currently held.
    pub fn probes_waiting(&self) -> usize {
        self.probes_waiting.load(Ordering::SeqCst)
    }

    /// Stop holding probes and let the waiting ones answer.
    pub async fn release_probes(&self) {
        *self.probes_held.write().await = false;
        self.probe_gate
            .add_permits(self.probes_waiting.load(Ordering::SeqCst));
    }

    /// Take the next error if set.
    async fn take_error(&self) -> Option<ConverterError> {
        self.next_error.write().await.take()
    }

    async fn wait_for_release(&self) {
        if !*self.held.read().await {
            return;
        }
        self.waiting.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }

    /// Create a default MediaInfo for testing.
    fn create_default_info(path: &Path) -> MediaInfo {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown");

        MediaInfo {
            path: path.to_path_buf(),
            size_bytes: 20 * 1024 * 1024, // 20 MB
            duration_secs: 120.0,
            bitrate_kbps: Some(1400),
            format: extension.to_string(),
            video_codec: Some("mpeg4".to_string()),
            audio_codec: Some("mp3".to_string()),
            width: Some(640),
            height: Some(480),
            fps: Some(25.0),
        }
    }

    async fn record(&self, job: ConversionJob, success: bool) {
        self.conversions
            .write()
            .await
            .push(RecordedConversion { job, success });
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConverterError> {
        if *self.probes_held.read().await {
            self.probes_waiting.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.probe_gate.acquire().await {
                permit.forget();
            }
            self.probes_waiting.fetch_sub(1, Ordering::SeqCst);
        }

        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        if let Some(reason) = self.probe_failures.read().await.get(path) {
            return Err(ConverterError::probe_failed(reason.clone()));
        }

        if let Some(info) = self.probe_results.read().await.get(path) {
            return Ok(info.clone());
        }

        Ok(Self::create_default_info(path))
    }

    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError> {
        let (tx, _) = mpsc::channel(1);
        self.convert_with_progress(job, tx).await
    }

    async fn convert_with_progress(
        &self,
        job: ConversionJob,
        progress_tx: mpsc::Sender<RawProgress>,
    ) -> Result<ConversionResult, ConverterError> {
        self.started.write().await.push(job.clone());
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);

        let result = self.run(&job, progress_tx).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.record(job, result.is_ok()).await;
        result
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(())
    }
}

impl MockConverter {
    async fn run(
        &self,
        job: &ConversionJob,
        progress_tx: mpsc::Sender<RawProgress>,
    ) -> Result<ConversionResult, ConverterError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        let duration_ms = *self.conversion_duration_ms.read().await;
        let ticks = self.progress_ticks.read().await.clone();
        let step = Duration::from_millis(duration_ms / (ticks.len() as u64 + 1));

        for tick in ticks {
            tokio::time::sleep(step).await;
            // A closed receiver only means nobody listens to progress.
            let _ = progress_tx.send(tick).await;
        }
        drop(progress_tx);
        tokio::time::sleep(step).await;

        self.wait_for_release().await;

        if let Some(reason) = self.convert_failures.read().await.get(&job.input_path) {
            return Err(ConverterError::conversion_failed(
                reason.clone(),
                Some(format!("{}: {}", job.input_path.display(), reason)),
            ));
        }

        let mut output_size_bytes = 0;
        if *self.write_output.read().await {
            if let Some(parent) = job.output_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&job.output_path, MOCK_OUTPUT).await?;
            output_size_bytes = MOCK_OUTPUT.len() as u64;
        }

        Ok(ConversionResult {
            job_id: job.job_id.clone(),
            output_path: job.output_path.clone(),
            output_size_bytes,
            duration_ms,
        })
    }
}
