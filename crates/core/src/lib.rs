pub mod config;
pub mod converter;
pub mod ledger;
pub mod metrics;
pub mod progress;
pub mod queue;
pub mod relay;
pub mod scanner;
pub mod scheduler;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError,
};
pub use converter::{Converter, ConverterConfig, ConverterError, FfmpegConverter};
pub use ledger::{FailureLedger, FailureRecord};
pub use queue::{ItemId, ItemStatus, QueueStore, WorkItem};
pub use relay::{EventRelay, FileLogSink, LogEntry, LogLevel, LogSink};
pub use scanner::{scan_folder, ScanError, ScannedFile};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError, SchedulerState, SchedulerStatus};
