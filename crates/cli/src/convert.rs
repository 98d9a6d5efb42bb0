//! The `convert` command: scan, queue, run and report.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::mpsc;
use tracing::{info, warn};

use retro2mp4_core::{
    ledger::report_file_name, scan_folder, Config, Converter, EventRelay, FailureLedger,
    FfmpegConverter, FileLogSink, Scheduler, SchedulerStatus,
};

use crate::commands::{ConsoleCommand, HELP};
use crate::display::ProgressDisplay;
use crate::metrics;

/// Lines buffered between the stdin reader thread and the run loop.
const STDIN_BUFFER: usize = 16;

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Folder scanned recursively for legacy video files
    pub input: PathBuf,

    /// Output folder; the input tree is mirrored below it
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Where to write the failed list [default: <output>/failed-list_<date>.txt]
    #[arg(long)]
    pub failed_report: Option<PathBuf>,

    /// Do not write a run log file
    #[arg(long)]
    pub no_log_file: bool,

    /// Print metrics in Prometheus text format when done
    #[arg(long)]
    pub metrics: bool,
}

pub async fn run(config: Config, args: ConvertArgs) -> Result<()> {
    let output_dir = args
        .output
        .clone()
        .or_else(|| config.output.dir.clone())
        .context("No output folder: pass --output or set [output] dir in the config")?;

    let files = scan_folder(&args.input, &config.scan.extensions)
        .with_context(|| format!("Failed to scan {:?}", args.input))?;
    if files.is_empty() {
        println!("No supported files found in {}", args.input.display());
        return Ok(());
    }

    let converter = FfmpegConverter::new(config.converter.clone());
    converter
        .validate()
        .await
        .context("ffmpeg is not usable, check [converter] paths")?;

    let sink = if config.logging.file_enabled && !args.no_log_file {
        let sink = FileLogSink::create(&config.logging.dir)
            .with_context(|| format!("Failed to create run log in {:?}", config.logging.dir))?;
        info!("Run log: {:?}", sink.path());
        Some(Arc::new(sink))
    } else {
        None
    };
    let relay = Arc::new(match &sink {
        Some(sink) => EventRelay::with_sink(sink.clone()),
        None => EventRelay::new(),
    });

    let display = ProgressDisplay::new();
    display.attach(&relay);

    let scheduler = Scheduler::new(converter, Arc::clone(&relay), config.scheduler.clone());
    scheduler.set_output_dir(Some(output_dir.clone()));
    let items = scheduler.load(files)?;
    for item in &items {
        display.println(format!("  [{}] {}", item.id, item.relative_path.display()));
    }
    display.println("Type 'help' for commands.");

    scheduler.start()?;
    let log_path = sink.as_ref().map(|s| s.path().to_path_buf());
    drive(&scheduler, &display, log_path.as_deref()).await?;
    display.finish();

    let status = scheduler.status();
    println!("{}", summary(&status));

    let ledger = scheduler.ledger();
    if !ledger.is_empty() {
        let report_path = args.failed_report.clone().unwrap_or_else(|| {
            output_dir.join(report_file_name(chrono::Local::now().date_naive()))
        });
        write_failed_report(&report_path, ledger).await?;
        println!("Failed list: {}", report_path.display());
    }
    if let Some(path) = &log_path {
        println!("Run log: {}", path.display());
    }

    if args.metrics {
        metrics::collect_status(&status);
        print!("{}", metrics::encode_metrics());
    }

    Ok(())
}

/// Waits for the run to end while serving console commands and Ctrl+C.
async fn drive<C: Converter + 'static>(
    scheduler: &Scheduler<C>,
    display: &ProgressDisplay,
    log_path: Option<&Path>,
) -> Result<()> {
    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;
    let idle = scheduler.wait_until_idle();
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = &mut idle => break,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                display.println("Interrupted, stopping");
                if let Err(e) = scheduler.stop() {
                    warn!("Stop on interrupt rejected: {}", e);
                }
                break;
            }
            line = lines.recv(), if stdin_open => match line {
                Some(line) if !line.trim().is_empty() => {
                    handle_command(scheduler, display, log_path, &line);
                }
                Some(_) => {}
                None => stdin_open = false,
            },
        }
    }

    Ok(())
}

/// Reads stdin on a plain thread so a pending read never holds up shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(STDIN_BUFFER);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn handle_command<C: Converter + 'static>(
    scheduler: &Scheduler<C>,
    display: &ProgressDisplay,
    log_path: Option<&Path>,
    line: &str,
) {
    let command = match line.parse::<ConsoleCommand>() {
        Ok(command) => command,
        Err(e) => {
            display.println(e.to_string());
            return;
        }
    };

    // State changes report themselves through the relay.
    let result = match command {
        ConsoleCommand::Pause => scheduler.pause(),
        ConsoleCommand::Resume => scheduler.resume(),
        ConsoleCommand::Stop => scheduler.stop(),
        ConsoleCommand::Remove(id) => {
            if !scheduler.remove(id) {
                display.println(format!("No item with id {}", id));
            }
            Ok(())
        }
        ConsoleCommand::Status => {
            display.println(format_status(&scheduler.status()));
            Ok(())
        }
        ConsoleCommand::Failed => {
            let ledger = scheduler.ledger();
            if ledger.is_empty() {
                display.println("No failures so far");
            } else {
                display.println(ledger.export_text());
            }
            Ok(())
        }
        ConsoleCommand::Log => {
            match log_path {
                Some(path) => display.println(format!("Run log: {}", path.display())),
                None => display.println("Run log disabled"),
            }
            Ok(())
        }
        ConsoleCommand::Help => {
            display.println(HELP);
            Ok(())
        }
    };

    if let Err(e) = result {
        display.println(format!("Error: {}", e));
    }
}

async fn write_failed_report(path: &Path, ledger: &FailureLedger) -> Result<()> {
    tokio::fs::write(path, ledger.export_text())
        .await
        .with_context(|| format!("Failed to write failed list to {:?}", path))
}

pub fn format_status(status: &SchedulerStatus) -> String {
    let counts = &status.counts;
    let active = match (status.active_item, status.busy) {
        (Some(id), _) => format!(", converting item {}", id),
        (None, true) => ", finishing a removed item".to_string(),
        (None, false) => String::new(),
    };
    format!(
        "State: {}{} | queued {}, processing {}, completed {}, failed {}",
        status.state, active, counts.queued, counts.processing, counts.completed, counts.failed
    )
}

fn summary(status: &SchedulerStatus) -> String {
    let counts = &status.counts;
    let mut text = format!(
        "Done: {} of {} converted, {} failed",
        counts.completed,
        counts.total(),
        counts.failed
    );
    if counts.queued > 0 {
        text.push_str(&format!(", {} not started", counts.queued));
    }
    text
}
