mod commands;
mod convert;
mod display;
mod metrics;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retro2mp4_core::{
    load_config, load_config_or_default, scan_folder, validate_config, Config, Converter,
    FfmpegConverter, FileLogSink,
};

use convert::ConvertArgs;

/// Config file used when none is given.
const DEFAULT_CONFIG: &str = "retro2mp4.toml";

#[derive(Debug, Parser)]
#[command(name = "retro2mp4", version, about = "Batch convert legacy video files to MP4")]
struct Cli {
    /// Configuration file [env: RETRO2MP4_CONFIG] [default: retro2mp4.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the convertible files under a folder
    Scan {
        input: PathBuf,
    },
    /// Print media information of one file as JSON
    Probe {
        file: PathBuf,
    },
    /// Convert every file under a folder to MP4
    Convert(ConvertArgs),
    /// Print a run log written earlier, or copy it elsewhere
    Log {
        file: PathBuf,

        /// Copy the log to this path instead of printing it
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging. The relay prints run events, so default to warn.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load(cli.config.as_deref())?;

    match cli.command {
        Command::Scan { input } => {
            let files = scan_folder(&input, &config.scan.extensions)
                .with_context(|| format!("Failed to scan {:?}", input))?;
            for file in &files {
                println!("{}", file.relative_path.display());
            }
            println!("{} supported files", files.len());
        }
        Command::Probe { file } => {
            let converter = FfmpegConverter::new(config.converter.clone());
            let media = converter
                .probe(&file)
                .await
                .with_context(|| format!("Failed to probe {:?}", file))?;
            println!("{}", serde_json::to_string_pretty(&media)?);
        }
        Command::Convert(args) => convert::run(config, args).await?,
        Command::Log { file, export } => {
            anyhow::ensure!(file.is_file(), "Log file not found: {:?}", file);
            let sink = FileLogSink::open(&file)?;
            match export {
                Some(dest) => {
                    let bytes = sink
                        .export_to(&dest)
                        .with_context(|| format!("Failed to export log to {:?}", dest))?;
                    println!("Exported {} bytes to {}", bytes, dest.display());
                }
                None => print!("{}", sink.read_all()?),
            }
        }
    }

    Ok(())
}

/// Loads the configuration from the flag, `RETRO2MP4_CONFIG` or the default
/// file. Only the default file may be absent.
fn load(flag: Option<&Path>) -> Result<Config> {
    let explicit = flag
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("RETRO2MP4_CONFIG").map(PathBuf::from));

    let config = match &explicit {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None => load_config_or_default(Path::new(DEFAULT_CONFIG))
            .context("Failed to load configuration")?,
    };

    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert_arguments() {
        let cli = Cli::parse_from([
            "retro2mp4",
            "--config",
            "custom.toml",
            "convert",
            "/videos",
            "-o",
            "/mp4",
            "--no-log-file",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        let Command::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.input, PathBuf::from("/videos"));
        assert_eq!(args.output, Some(PathBuf::from("/mp4")));
        assert!(args.no_log_file);
        assert!(!args.metrics);
        assert!(args.failed_report.is_none());
    }

    #[test]
    fn test_load_explicit_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[output]\ndir = \"/srv/mp4\"").unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.output.dir, Some(PathBuf::from("/srv/mp4")));
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        assert!(load(Some(Path::new("/nonexistent/retro2mp4.toml"))).is_err());
    }
}
