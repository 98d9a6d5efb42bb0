//! Testing utilities and mock implementations.
//!
//! This module provides a mock [`Converter`](crate::converter::Converter) so
//! the scheduler can be exercised end to end without ffmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! use retro2mp4_core::testing::{fixtures, MockConverter};
//!
//! let converter = MockConverter::new();
//! converter.set_progress_ticks(&["00:01:00.00"]).await;
//!
//! let files = fixtures::touch_inputs(source_dir.path(), &["a.avi", "sub/b.flv"]);
//! scheduler.load(files)?;
//! ```

mod mock_converter;

pub use mock_converter::{MockConverter, RecordedConversion};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::fs;
    use std::path::{Path, PathBuf};

    use crate::converter::MediaInfo;
    use crate::scanner::ScannedFile;

    /// A scanned file under `root` without touching the filesystem.
    pub fn scanned_file(root: impl AsRef<Path>, relative: &str) -> ScannedFile {
        let relative_path = PathBuf::from(relative);
        let name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| relative.to_string());
        let extension = relative_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        ScannedFile {
            path: root.as_ref().join(&relative_path),
            name,
            extension,
            relative_path,
        }
    }

    /// Creates small input files under `root` and returns them as scanned.
    pub fn touch_inputs(root: &Path, relatives: &[&str]) -> Vec<ScannedFile> {
        relatives
            .iter()
            .map(|relative| {
                let file = scanned_file(root, relative);
                if let Some(parent) = file.path.parent() {
                    fs::create_dir_all(parent).expect("Failed to create input dir");
                }
                fs::write(&file.path, b"legacy video").expect("Failed to write input");
                file
            })
            .collect()
    }

    /// Probe result for a clip of `duration_secs`.
    pub fn media_info(path: impl AsRef<Path>, duration_secs: f64) -> MediaInfo {
        let path = path.as_ref();
        MediaInfo {
            path: path.to_path_buf(),
            size_bytes: 10 * 1024 * 1024, // 10 MB
            duration_secs,
            bitrate_kbps: Some(900),
            format: path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            video_codec: Some("flv1".to_string()),
            audio_codec: Some("mp3".to_string()),
            width: Some(320),
            height: Some(240),
            fps: Some(25.0),
        }
    }
}
