//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Encoding settings applied to every conversion.
///
/// The defaults target broadly compatible MP4 output: H.264 video, stereo AAC
/// audio and the moov atom moved to the front of the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// ffmpeg video encoder.
    pub video_codec: String,
    /// x264 speed preset.
    pub preset: String,
    /// Constant rate factor (lower is better quality).
    pub crf: u8,
    /// ffmpeg audio encoder.
    pub audio_codec: String,
    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,
    /// Output audio channel count.
    pub audio_channels: u8,
    /// Output audio sample rate.
    pub audio_sample_rate_hz: u32,
    /// Muxer queue size, large enough for badly interleaved legacy files.
    pub max_muxing_queue_size: u32,
    /// Write the index at the start of the file.
    pub faststart: bool,
    /// Stop at the end of the shortest stream.
    pub shortest: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "fast".to_string(),
            crf: 22,
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 192,
            audio_channels: 2,
            audio_sample_rate_hz: 44100,
            max_muxing_queue_size: 9999,
            faststart: true,
            shortest: true,
        }
    }
}

impl EncodeOptions {
    /// Returns the ffmpeg output options for these settings.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            format!("{}k", self.audio_bitrate_kbps),
            "-ac".to_string(),
            self.audio_channels.to_string(),
            "-ar".to_string(),
            self.audio_sample_rate_hz.to_string(),
            "-max_muxing_queue_size".to_string(),
            self.max_muxing_queue_size.to_string(),
        ];

        if self.faststart {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
        if self.shortest {
            args.push("-shortest".to_string());
        }

        args
    }
}

/// A single conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Identifier used in logs and results.
    pub job_id: String,
    /// Source file.
    pub input_path: PathBuf,
    /// Destination file (always a file path, never a directory).
    pub output_path: PathBuf,
    /// Encoding settings.
    #[serde(default)]
    pub options: EncodeOptions,
}

impl ConversionJob {
    /// Creates a job with the default encode options.
    pub fn new(job_id: impl Into<String>, input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            job_id: job_id.into(),
            input_path,
            output_path,
            options: EncodeOptions::default(),
        }
    }
}

/// A raw progress tick as reported by the transcoding engine.
///
/// Values are passed through unmodified; normalization happens in
/// [`crate::progress`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProgress {
    /// Position in the output stream, `HH:MM:SS.fraction`.
    pub timemark: String,
    /// Bytes written so far.
    pub target_size_bytes: Option<u64>,
    /// Current output bitrate.
    pub current_kbps: Option<f64>,
}

impl RawProgress {
    pub fn new(timemark: impl Into<String>) -> Self {
        Self {
            timemark: timemark.into(),
            target_size_bytes: None,
            current_kbps: None,
        }
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub job_id: String,
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    /// Wall-clock conversion time.
    pub duration_ms: u64,
}

/// Media file information from ffprobe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Container duration, 0 when unknown.
    pub duration_secs: f64,
    /// Overall bitrate.
    pub bitrate_kbps: Option<u32>,
    /// Container format (first entry of ffprobe's `format_name`).
    pub format: String,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encode_args() {
        let args = EncodeOptions::default().to_ffmpeg_args();
        let joined = args.join(" ");

        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-preset fast"));
        assert!(joined.contains("-crf 22"));
        assert!(joined.contains("-c:a aac"));
        assert!(joined.contains("-b:a 192k"));
        assert!(joined.contains("-ac 2"));
        assert!(joined.contains("-ar 44100"));
        assert!(joined.contains("-max_muxing_queue_size 9999"));
        assert!(joined.contains("-movflags +faststart"));
        assert_eq!(args.last().map(String::as_str), Some("-shortest"));
    }

    #[test]
    fn test_optional_flags_omitted() {
        let options = EncodeOptions {
            faststart: false,
            shortest: false,
            ..Default::default()
        };
        let args = options.to_ffmpeg_args();
        assert!(!args.contains(&"-movflags".to_string()));
        assert!(!args.contains(&"-shortest".to_string()));
    }

    #[test]
    fn test_job_uses_default_options() {
        let job = ConversionJob::new("1", PathBuf::from("/in/a.avi"), PathBuf::from("/out/a.mp4"));
        assert_eq!(job.options, EncodeOptions::default());
    }
}
