//! Discovery of convertible files and output path resolution.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Extensions picked up by a scan, with leading dot, lower case.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".flv", ".asf", ".rmvb", ".mpeg", ".mpg", ".wmv", ".avi"];

/// Extension of every produced file.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Errors from scanning a folder.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Scan root not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Scan root is not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

/// A file found by [`scan_folder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedFile {
    /// Absolute (or root-joined) path.
    pub path: PathBuf,
    /// File name with extension.
    pub name: String,
    /// Lower-case extension with leading dot.
    pub extension: String,
    /// Path relative to the scan root.
    pub relative_path: PathBuf,
}

/// Returns the lower-case, dot-prefixed extension of `path` if it is in `extensions`.
pub fn matching_extension(path: &Path, extensions: &[String]) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    let dotted = format!(".{}", ext.to_lowercase());
    extensions
        .iter()
        .any(|e| e.eq_ignore_ascii_case(&dotted))
        .then_some(dotted)
}

/// The default extension list as owned strings.
pub fn default_extensions() -> Vec<String> {
    SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

/// Recursively collects files under `root` whose extension is in `extensions`.
///
/// Sub-directories that cannot be read are logged and skipped. Results are
/// sorted by path.
pub fn scan_folder(root: &Path, extensions: &[String]) -> Result<Vec<ScannedFile>, ScanError> {
    if !root.exists() {
        return Err(ScanError::RootNotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(ScanError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    info!("Scanning directory: {:?}", root);
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(extension) = matching_extension(path, extensions) else {
            continue;
        };

        let relative_path = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(entry.file_name()));

        files.push(ScannedFile {
            path: path.to_path_buf(),
            name: entry.file_name().to_string_lossy().to_string(),
            extension,
            relative_path,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    info!("Scan complete: {} files found in {:?}", files.len(), root);
    Ok(files)
}

/// Destination of a scanned file: `output_dir/<relative path>.mp4`.
pub fn output_path_for(output_dir: &Path, relative_path: &Path) -> PathBuf {
    output_dir.join(relative_path).with_extension(OUTPUT_EXTENSION)
}

/// Turns a user supplied output location into a concrete file path.
///
/// An existing directory gets `<input stem>.mp4` appended, a path without
/// extension gets `.mp4`, anything else is used as-is.
pub fn resolve_output_file(output: &Path, input: &Path) -> PathBuf {
    if output.is_dir() {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        return output.join(format!("{}.{}", stem, OUTPUT_EXTENSION));
    }

    if output.extension().is_none() {
        return output.with_extension(OUTPUT_EXTENSION);
    }

    output.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"data").unwrap();
    }

    #[test]
    fn test_scan_recursive_case_insensitive() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.avi");
        touch(dir.path(), "B.FLV");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "already.mp4");
        touch(dir.path(), "season1/ep1.RmVb");
        touch(dir.path(), "season1/deeper/ep2.mpg");

        let files = scan_folder(dir.path(), &default_extensions()).unwrap();
        let rels: Vec<_> = files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().to_string())
            .collect();

        assert_eq!(files.len(), 4, "found {:?}", rels);
        assert!(rels.contains(&"a.avi".to_string()));
        assert!(rels.contains(&"B.FLV".to_string()));
        assert!(rels.contains(&"season1/ep1.RmVb".to_string()));
        assert!(rels.contains(&"season1/deeper/ep2.mpg".to_string()));

        let flv = files.iter().find(|f| f.name == "B.FLV").unwrap();
        assert_eq!(flv.extension, ".flv");
        assert_eq!(flv.path, dir.path().join("B.FLV"));
    }

    #[test]
    fn test_scan_custom_extensions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.avi");
        touch(dir.path(), "b.wmv");

        let files = scan_folder(dir.path(), &[".wmv".to_string()]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "b.wmv");
    }

    #[test]
    fn test_scan_empty_folder() {
        let dir = TempDir::new().unwrap();
        let files = scan_folder(dir.path(), &default_extensions()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_scan_missing_root() {
        let result = scan_folder(Path::new("/no/such/folder/here"), &default_extensions());
        assert!(matches!(result, Err(ScanError::RootNotFound { .. })));
    }

    #[test]
    fn test_scan_root_is_file() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.avi");
        let result = scan_folder(&dir.path().join("a.avi"), &default_extensions());
        assert!(matches!(result, Err(ScanError::NotADirectory { .. })));
    }

    #[test]
    fn test_output_path_for_keeps_structure() {
        let out = output_path_for(Path::new("/out"), Path::new("season1/ep1.rmvb"));
        assert_eq!(out, PathBuf::from("/out/season1/ep1.mp4"));
    }

    #[test]
    fn test_resolve_output_file() {
        let dir = TempDir::new().unwrap();
        let input = Path::new("/in/movie.wmv");

        assert_eq!(
            resolve_output_file(dir.path(), input),
            dir.path().join("movie.mp4")
        );
        assert_eq!(
            resolve_output_file(Path::new("/out/renamed"), input),
            PathBuf::from("/out/renamed.mp4")
        );
        assert_eq!(
            resolve_output_file(Path::new("/out/renamed.mp4"), input),
            PathBuf::from("/out/renamed.mp4")
        );
    }

    #[test]
    fn test_matching_extension() {
        let exts = default_extensions();
        assert_eq!(
            matching_extension(Path::new("x.MPEG"), &exts),
            Some(".mpeg".to_string())
        );
        assert_eq!(matching_extension(Path::new("x.mkv"), &exts), None);
        assert_eq!(matching_extension(Path::new("noext"), &exts), None);
    }
}
