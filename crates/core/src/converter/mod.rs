//! Converter module for transcoding legacy video files to MP4.
//!
//! This module provides the `Converter` trait and an FFmpeg implementation.
//! Conversions use a fixed set of [`EncodeOptions`] (H.264 + AAC, fast start)
//! and report raw progress ticks over an mpsc channel.
//!
//! # Example
//!
//! ```ignore
//! use retro2mp4_core::converter::{Converter, ConversionJob, FfmpegConverter};
//!
//! let converter = FfmpegConverter::with_defaults();
//! converter.validate().await?;
//!
//! let info = converter.probe(Path::new("/videos/clip.flv")).await?;
//! println!("Duration: {} seconds", info.duration_secs);
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(32);
//! let job = ConversionJob::new(
//!     "1",
//!     PathBuf::from("/videos/clip.flv"),
//!     PathBuf::from("/mp4/clip.mp4"),
//! );
//! let handle = tokio::spawn(async move { converter.convert_with_progress(job, tx).await });
//! while let Some(tick) = rx.recv().await {
//!     println!("at {}", tick.timemark);
//! }
//! let result = handle.await??;
//! println!("Converted in {} ms", result.duration_ms);
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegConverter;
pub use traits::Converter;
pub use types::{ConversionJob, ConversionResult, EncodeOptions, MediaInfo, RawProgress};
