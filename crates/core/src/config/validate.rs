use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one scan extension, each starting with a dot
/// - ffmpeg and ffprobe paths are set
/// - Progress channel capacity is not 0
/// - Output dir, when set, is not an existing file
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.scan.extensions.is_empty() {
        return Err(ConfigError::ValidationError(
            "scan.extensions cannot be empty".to_string(),
        ));
    }
    if let Some(bad) = config
        .scan
        .extensions
        .iter()
        .find(|e| !e.starts_with('.') || e.len() < 2)
    {
        return Err(ConfigError::ValidationError(format!(
            "scan.extensions entry '{}' must look like '.avi'",
            bad
        )));
    }

    if config.converter.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffmpeg_path cannot be empty".to_string(),
        ));
    }
    if config.converter.ffprobe_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffprobe_path cannot be empty".to_string(),
        ));
    }

    if config.scheduler.progress_channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.progress_channel_capacity cannot be 0".to_string(),
        ));
    }

    if let Some(dir) = &config.output.dir {
        if dir.is_file() {
            return Err(ConfigError::ValidationError(format!(
                "output.dir {:?} is a file",
                dir
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_empty_extensions_fails() {
        let mut config = Config::default();
        config.scan.extensions.clear();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_extension_without_dot_fails() {
        let mut config = Config::default();
        config.scan.extensions = vec!["avi".to_string()];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("'avi'"));
    }

    #[test]
    fn test_validate_zero_capacity_fails() {
        let mut config = Config::default();
        config.scheduler.progress_channel_capacity = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_ffmpeg_path_fails() {
        let mut config = Config::default();
        config.converter.ffmpeg_path = PathBuf::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_output_dir_is_file_fails() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.output.dir = Some(file.path().to_path_buf());
        assert!(validate_config(&config).is_err());
    }
}
