//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::Converter;
use super::types::{ConversionJob, ConversionResult, MediaInfo, RawProgress};

/// Number of non-progress stderr lines kept for error reports.
const MAX_DIAGNOSTIC_LINES: usize = 20;

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Builds the ffmpeg command line for a job.
    fn build_args(&self, job: &ConversionJob) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            job.input_path.to_string_lossy().to_string(),
        ];

        args.extend(job.options.to_ffmpeg_args());

        // Log level and machine readable progress on stderr
        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        args.push(job.output_path.to_string_lossy().to_string());

        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, ConverterError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
            size: Option<String>,
            bit_rate: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
            r_frame_rate: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| ConverterError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let size_bytes = probe
            .format
            .size
            .as_ref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");
        let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");

        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs,
            bitrate_kbps: probe
                .format
                .bit_rate
                .as_ref()
                .and_then(|b| b.parse::<u32>().ok())
                .map(|b| b / 1000),
            format: format_name.to_string(),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
            width: video_stream.and_then(|s| s.width),
            height: video_stream.and_then(|s| s.height),
            fps: video_stream
                .and_then(|s| s.r_frame_rate.as_ref())
                .and_then(|r| parse_frame_rate(r)),
        })
    }

    /// Runs the conversion with optional progress reporting.
    async fn run_conversion(
        &self,
        job: &ConversionJob,
        progress_tx: Option<mpsc::Sender<RawProgress>>,
    ) -> Result<ConversionResult, ConverterError> {
        let start = Instant::now();

        if !tokio::fs::try_exists(&job.input_path).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: job.input_path.clone(),
            });
        }

        if let Some(parent) = job.output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| {
                ConverterError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            })?;
        }

        let args = self.build_args(job);
        debug!(job_id = %job.job_id, args = ?args, "Starting ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    ConverterError::SpawnFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        let drained = match self.config.timeout_secs {
            Some(timeout_secs) => {
                let waited = timeout(
                    Duration::from_secs(timeout_secs),
                    self.drain_and_wait(&mut child, progress_tx.as_ref()),
                )
                .await;
                match waited {
                    Ok(drained) => drained,
                    Err(_) => {
                        let _ = child.kill().await;
                        return Err(ConverterError::Timeout { timeout_secs });
                    }
                }
            }
            None => self.drain_and_wait(&mut child, progress_tx.as_ref()).await,
        };

        let (status, diagnostics) = drained?;
        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(ConverterError::conversion_failed(
                format!("FFmpeg exited with code: {}", code),
                if diagnostics.is_empty() {
                    None
                } else {
                    Some(diagnostics.join("\n"))
                },
            ));
        }

        let output_meta = tokio::fs::metadata(&job.output_path).await.map_err(|_| {
            ConverterError::OutputMissing {
                path: job.output_path.clone(),
            }
        })?;

        info!(
            job_id = %job.job_id,
            output = %job.output_path.display(),
            size_bytes = output_meta.len(),
            "Conversion finished"
        );

        Ok(ConversionResult {
            job_id: job.job_id.clone(),
            output_path: job.output_path.clone(),
            output_size_bytes: output_meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Reads stderr until ffmpeg closes it, forwarding throttled progress
    /// ticks, then waits for the process to exit.
    async fn drain_and_wait(
        &self,
        child: &mut Child,
        progress_tx: Option<&mpsc::Sender<RawProgress>>,
    ) -> std::io::Result<(ExitStatus, Vec<String>)> {
        let mut diagnostics = VecDeque::new();

        if let Some(stderr) = child.stderr.take() {
            // Lines are read as bytes: file names and metadata of legacy
            // containers are often not UTF-8.
            let mut reader = BufReader::new(stderr).split(b'\n');
            let mut parser = ProgressParser::new();
            let interval = Duration::from_millis(self.config.progress_interval_ms);
            let mut last_sent: Option<Instant> = None;

            loop {
                let bytes = match reader.next_segment().await {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read ffmpeg output");
                        break;
                    }
                };
                let line = String::from_utf8_lossy(&bytes);
                match parser.feed(&line) {
                    StderrLine::Tick(tick) => {
                        let Some(tx) = progress_tx else { continue };
                        if last_sent.is_none_or(|t| t.elapsed() >= interval) {
                            // Non-blocking send
                            let _ = tx.try_send(tick);
                            last_sent = Some(Instant::now());
                        }
                    }
                    StderrLine::Field => {}
                    StderrLine::Message(message) => {
                        if message.to_lowercase().contains("error") {
                            warn!(line = %message, "ffmpeg reported an error");
                        }
                        if diagnostics.len() == MAX_DIAGNOSTIC_LINES {
                            diagnostics.pop_front();
                        }
                        diagnostics.push_back(message);
                    }
                }
            }
        }

        let status = child.wait().await?;
        Ok((status, diagnostics.into_iter().collect()))
    }
}

/// Parses a frame rate like "24000/1001" or "25".
fn parse_frame_rate(rate: &str) -> Option<f32> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f32>().ok()?;
            let den = den.parse::<f32>().ok()?;
            if den > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
        None => rate.parse::<f32>().ok(),
    }
}

/// Classification of one stderr line.
#[derive(Debug, PartialEq)]
enum StderrLine {
    /// A `progress=` line closed a block.
    Tick(RawProgress),
    /// Any other `key=value` line of the progress stream.
    Field,
    /// Regular ffmpeg log output.
    Message(String),
}

/// Accumulates the key/value blocks written by `-progress`.
struct ProgressParser {
    field_re: Option<Regex>,
    bitrate_re: Option<Regex>,
    timemark: Option<String>,
    total_size: Option<u64>,
    bitrate: Option<f64>,
}

impl ProgressParser {
    fn new() -> Self {
        Self {
            field_re: Regex::new(r"^([a-z0-9_]+)=(.*)$").ok(),
            bitrate_re: Regex::new(r"(\d+(?:\.\d+)?)\s*kbits/s").ok(),
            timemark: None,
            total_size: None,
            bitrate: None,
        }
    }

    fn feed(&mut self, line: &str) -> StderrLine {
        let trimmed = line.trim();
        let Some(caps) = self.field_re.as_ref().and_then(|re| re.captures(trimmed)) else {
            return StderrLine::Message(trimmed.to_string());
        };
        let key = caps.get(1).map_or("", |m| m.as_str());
        let value = caps.get(2).map_or("", |m| m.as_str()).trim();

        match key {
            "out_time" => self.timemark = Some(value.to_string()),
            "total_size" => self.total_size = value.parse().ok(),
            "bitrate" => {
                self.bitrate = self
                    .bitrate_re
                    .as_ref()
                    .and_then(|re| re.captures(value))
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok());
            }
            "progress" => {
                if let Some(timemark) = self.timemark.take() {
                    return StderrLine::Tick(RawProgress {
                        timemark,
                        target_size_bytes: self.total_size.take(),
                        current_kbps: self.bitrate.take(),
                    });
                }
            }
            _ => {}
        }

        StderrLine::Field
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConverterError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ConverterError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError> {
        self.run_conversion(&job, None).await
    }

    async fn convert_with_progress(
        &self,
        job: ConversionJob,
        progress_tx: mpsc::Sender<RawProgress>,
    ) -> Result<ConversionResult, ConverterError> {
        self.run_conversion(&job, Some(progress_tx)).await
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffmpeg_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConverterError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(ConverterError::Io(e));
        }

        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConverterError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(ConverterError::Io(e));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job() -> ConversionJob {
        ConversionJob::new(
            "job-1",
            PathBuf::from("/videos/old/clip.rmvb"),
            PathBuf::from("/videos/mp4/clip.mp4"),
        )
    }

    #[test]
    fn test_build_args() {
        let converter = FfmpegConverter::with_defaults();
        let args = converter.build_args(&job());

        assert_eq!(args[0], "-y");
        assert_eq!(args[1], "-i");
        assert_eq!(args[2], "/videos/old/clip.rmvb");
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"+faststart".to_string()));

        let progress_at = args.iter().position(|a| a == "-progress").unwrap();
        assert_eq!(args[progress_at + 1], "pipe:2");
        assert!(args.contains(&"-nostats".to_string()));
        assert_eq!(args.last().unwrap(), "/videos/mp4/clip.mp4");
    }

    #[test]
    fn test_build_args_extra_before_output() {
        let mut config = ConverterConfig::default();
        config.extra_ffmpeg_args = vec!["-threads".to_string(), "2".to_string()];
        let converter = FfmpegConverter::new(config);
        let args = converter.build_args(&job());

        let n = args.len();
        assert_eq!(&args[n - 3..n - 1], ["-threads", "2"]);
    }

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "format": {
                "filename": "clip.rmvb",
                "format_name": "rm",
                "duration": "1325.500000",
                "size": "210000000",
                "bit_rate": "1267453"
            },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "rv40",
                    "width": 720,
                    "height": 480,
                    "r_frame_rate": "24000/1001"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "cook"
                }
            ]
        }"#;

        let info = FfmpegConverter::parse_probe_output(Path::new("clip.rmvb"), json).unwrap();
        assert_eq!(info.format, "rm");
        assert!((info.duration_secs - 1325.5).abs() < 0.01);
        assert_eq!(info.size_bytes, 210000000);
        assert_eq!(info.bitrate_kbps, Some(1267));
        assert_eq!(info.video_codec, Some("rv40".to_string()));
        assert_eq!(info.audio_codec, Some("cook".to_string()));
        assert_eq!(info.width, Some(720));
        let fps = info.fps.unwrap();
        assert!((fps - 23.976).abs() < 0.01);
    }

    #[test]
    fn test_parse_probe_output_without_duration() {
        let json = r#"{
            "format": { "filename": "x.flv", "format_name": "flv" },
            "streams": []
        }"#;

        let info = FfmpegConverter::parse_probe_output(Path::new("x.flv"), json).unwrap();
        assert_eq!(info.duration_secs, 0.0);
        assert!(info.video_codec.is_none());
    }

    #[test]
    fn test_parse_probe_output_invalid_json() {
        let result = FfmpegConverter::parse_probe_output(Path::new("x.avi"), "not json");
        assert!(matches!(result, Err(ConverterError::ParseError { .. })));
    }

    #[test]
    fn test_progress_parser_emits_tick_per_block() {
        let mut parser = ProgressParser::new();
        let block = [
            "frame=250",
            "fps=61.2",
            "bitrate= 845.3kbits/s",
            "total_size=1048576",
            "out_time_us=10010000",
            "out_time=00:00:10.010000",
            "speed=2.45x",
        ];
        for line in block {
            assert_eq!(parser.feed(line), StderrLine::Field);
        }

        match parser.feed("progress=continue") {
            StderrLine::Tick(tick) => {
                assert_eq!(tick.timemark, "00:00:10.010000");
                assert_eq!(tick.target_size_bytes, Some(1048576));
                assert_eq!(tick.current_kbps, Some(845.3));
            }
            other => panic!("expected tick, got {:?}", other),
        }

        // Counters do not leak into the next block
        parser.feed("out_time=00:00:11.000000");
        match parser.feed("progress=end") {
            StderrLine::Tick(tick) => {
                assert_eq!(tick.target_size_bytes, None);
                assert_eq!(tick.current_kbps, None);
            }
            other => panic!("expected tick, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_parser_na_bitrate() {
        let mut parser = ProgressParser::new();
        parser.feed("bitrate=N/A");
        parser.feed("out_time=N/A");
        match parser.feed("progress=continue") {
            StderrLine::Tick(tick) => {
                assert_eq!(tick.timemark, "N/A");
                assert_eq!(tick.current_kbps, None);
            }
            other => panic!("expected tick, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_parser_passes_log_lines_through() {
        let mut parser = ProgressParser::new();
        let line = "[flv @ 0x55d5] Error while decoding stream #0:0";
        assert_eq!(parser.feed(line), StderrLine::Message(line.to_string()));
        // A block end without out_time is not a tick
        assert_eq!(parser.feed("progress=continue"), StderrLine::Field);
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("30"), Some(30.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[tokio::test]
    async fn test_convert_missing_input() {
        let converter = FfmpegConverter::with_defaults();
        let job = ConversionJob::new(
            "job-x",
            PathBuf::from("/definitely/not/here.avi"),
            std::env::temp_dir().join("retro2mp4-never-written.mp4"),
        );
        let result = converter.convert(job).await;
        assert!(matches!(result, Err(ConverterError::InputNotFound { .. })));
    }

    /// Writes an executable stand-in for ffmpeg that reports progress on
    /// stderr and writes its last argument.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, stderr_preamble: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = format!(
            r#"#!/bin/sh
for last; do :; done
printf '{}\n' >&2
i=0
while [ $i -lt 200 ]; do
  printf 'out_time=00:00:01.000000\nprogress=continue\n' >&2
  i=$((i + 1))
done
printf 'out_time=00:00:02.000000\nprogress=end\n' >&2
printf 'mp4' > "$last"
"#,
            stderr_preamble
        );
        let path = dir.join("ffmpeg");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_survives_non_utf8_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        // Latin-1 bytes in a container title
        let ffmpeg = fake_ffmpeg(dir.path(), r"Input #0, flv, from Pel\355cula \377\376.flv:");
        let input = dir.path().join("clip.flv");
        std::fs::write(&input, b"flv").unwrap();
        let output = dir.path().join("out").join("clip.mp4");

        let config = ConverterConfig::with_paths(ffmpeg, PathBuf::from("ffprobe"))
            .with_progress_interval(0);
        let converter = FfmpegConverter::new(config);
        let (tx, mut rx) = mpsc::channel(512);

        let result = converter
            .convert_with_progress(ConversionJob::new("job-bytes", input, output.clone()), tx)
            .await
            .unwrap();

        assert_eq!(result.output_path, output);
        assert_eq!(result.output_size_bytes, 3);

        let mut ticks = Vec::new();
        while let Ok(tick) = rx.try_recv() {
            ticks.push(tick);
        }
        assert_eq!(ticks.len(), 201);
        assert_eq!(ticks.last().unwrap().timemark, "00:00:02.000000");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_failure_keeps_decoded_diagnostics() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(
            &ffmpeg,
            "#!/bin/sh\nprintf 'bad header \\377 in clip.rm\\n' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();
        let input = dir.path().join("clip.rm");
        std::fs::write(&input, b"rm").unwrap();

        let converter = FfmpegConverter::new(ConverterConfig::with_paths(
            ffmpeg,
            PathBuf::from("ffprobe"),
        ));
        let job = ConversionJob::new("job-fail", input, dir.path().join("clip.mp4"));

        match converter.convert(job).await {
            Err(e) => {
                let detail = e.detail();
                assert!(detail.contains("exited with code: 1"), "{}", detail);
                assert!(detail.contains("bad header \u{FFFD} in clip.rm"), "{}", detail);
            }
            Ok(_) => panic!("expected failure"),
        }
    }
}
