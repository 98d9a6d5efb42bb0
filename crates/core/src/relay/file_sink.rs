use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::entry::LogEntry;
use super::error::RelayError;

/// Width of the `=` rule around section titles.
const SECTION_RULE_WIDTH: usize = 50;

/// Durable destination for info and error entries.
pub trait LogSink: Send + Sync {
    /// Appends one entry.
    fn write(&self, entry: &LogEntry) -> Result<(), RelayError>;

    /// Appends a visual separator with a title.
    fn section(&self, title: &str) -> Result<(), RelayError>;

    /// Where the log lives, if it is a file.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Append-only text log, one file per run.
#[derive(Debug)]
pub struct FileLogSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogSink {
    /// Creates `conversion-<timestamp>.log` in `dir`, creating `dir` if needed.
    pub fn create(dir: &Path) -> Result<Self, RelayError> {
        fs::create_dir_all(dir)?;
        let now = Local::now();
        let path = dir.join(format!("conversion-{}.log", now.format("%Y-%m-%dT%H-%M-%S")));

        let sink = Self::open(&path)?;
        sink.append(&format!(
            "retro2mp4 conversion log\nStarted: {}\n\n",
            now.format("%Y-%m-%d %H:%M:%S")
        ))?;
        Ok(sink)
    }

    /// Opens (or creates) an existing log file for appending.
    pub fn open(path: &Path) -> Result<Self, RelayError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full contents of the log written so far.
    pub fn read_all(&self) -> Result<String, RelayError> {
        Ok(fs::read_to_string(&self.path)?)
    }

    /// Copies the log to `dest`, returning the number of bytes written.
    pub fn export_to(&self, dest: &Path) -> Result<u64, RelayError> {
        Ok(fs::copy(&self.path, dest)?)
    }

    fn append(&self, text: &str) -> Result<(), RelayError> {
        let mut file = self
            .file
            .lock()
            .map_err(|e| RelayError::Unavailable(e.to_string()))?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl LogSink for FileLogSink {
    fn write(&self, entry: &LogEntry) -> Result<(), RelayError> {
        self.append(&entry.format_block())
    }

    fn section(&self, title: &str) -> Result<(), RelayError> {
        let rule = "=".repeat(SECTION_RULE_WIDTH);
        self.append(&format!("\n{rule}\n{title}\n{rule}\n\n"))
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_create_names_file_per_run() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("nested").join("logs");
        let sink = FileLogSink::create(&logs).unwrap();

        let name = sink.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("conversion-"), "unexpected name {}", name);
        assert!(name.ends_with(".log"));
        assert!(sink.read_all().unwrap().starts_with("retro2mp4 conversion log\n"));
        assert_eq!(sink.location(), Some(sink.path()));
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let sink = FileLogSink::open(&dir.path().join("run.log")).unwrap();

        sink.write(&LogEntry::info("scanner", "Found 2 files")).unwrap();
        sink.write(
            &LogEntry::error("scheduler", "Conversion failed")
                .with_data(json!({ "error": "FFmpeg exited with code: 1" })),
        )
        .unwrap();

        let contents = sink.read_all().unwrap();
        assert!(contents.contains("[scanner] Found 2 files\n"));
        assert!(contents.contains("[scheduler] ERROR: Conversion failed\n"));
        assert!(contents.contains("\"error\": \"FFmpeg exited with code: 1\""));
    }

    #[test]
    fn test_section_separator() {
        let dir = TempDir::new().unwrap();
        let sink = FileLogSink::open(&dir.path().join("run.log")).unwrap();
        sink.section("Batch started").unwrap();

        let rule = "=".repeat(50);
        assert_eq!(
            sink.read_all().unwrap(),
            format!("\n{rule}\nBatch started\n{rule}\n\n")
        );
    }

    #[test]
    fn test_export_to() {
        let dir = TempDir::new().unwrap();
        let sink = FileLogSink::open(&dir.path().join("run.log")).unwrap();
        sink.write(&LogEntry::info("cli", "hello")).unwrap();

        let dest = dir.path().join("copy.log");
        let bytes = sink.export_to(&dest).unwrap();
        assert!(bytes > 0);
        assert_eq!(fs::read_to_string(dest).unwrap(), sink.read_all().unwrap());
    }
}
