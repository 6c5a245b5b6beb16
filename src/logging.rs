/// Structured logging for the phenology pipeline
///
/// Provides context-rich logging with pipeline stage and station/decade
/// group identifiers, timestamps, and severity levels. Supports both
/// console output and file-based logging for batch runs.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::{GroupKey, PhenologyError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Config,
    Grouping,
    Curve,
    Phenology,
    Bootstrap,
    Aggregate,
    Trend,
    System,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Config => write!(f, "CFG"),
            Stage::Grouping => write!(f, "GRP"),
            Stage::Curve => write!(f, "CURVE"),
            Stage::Phenology => write!(f, "PHENO"),
            Stage::Bootstrap => write!(f, "BOOT"),
            Stage::Aggregate => write!(f, "AGG"),
            Stage::Trend => write!(f, "TREND"),
            Stage::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected gap - a station was not sampled in a decade, or a method
    /// has too few points
    Expected,
    /// Data produced a degenerate statistic (flat curve, no threshold crossing)
    Degenerate,
    /// Indicates a configuration or programming problem
    Unexpected,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Degenerate => write!(f, "DEGENERATE"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut guard) = LOGGER.lock() {
            *guard = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, stage: Stage, group: Option<&GroupKey>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let group_part = group.map(|g| format!(" [{}]", g)).unwrap_or_default();
        let log_entry = format!("{} {} {}{}: {}", timestamp, level, stage, group_part, message);

        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", stage, group_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", stage, group_part, message),
                LogLevel::Info => println!("   {}{}: {}", stage, group_part, message),
                LogLevel::Debug => {} // Skip debug in non-timestamp mode
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn emit(level: LogLevel, stage: Stage, group: Option<&GroupKey>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, stage, group, message);
        }
    }
}

pub fn info(stage: Stage, group: Option<&GroupKey>, message: &str) {
    emit(LogLevel::Info, stage, group, message);
}

pub fn warn(stage: Stage, group: Option<&GroupKey>, message: &str) {
    emit(LogLevel::Warning, stage, group, message);
}

pub fn error(stage: Stage, group: Option<&GroupKey>, message: &str) {
    emit(LogLevel::Error, stage, group, message);
}

pub fn debug(stage: Stage, group: Option<&GroupKey>, message: &str) {
    emit(LogLevel::Debug, stage, group, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

pub fn classify_failure(err: &PhenologyError) -> FailureType {
    match err {
        PhenologyError::MissingGroupData(_)
        | PhenologyError::InsufficientDataForMethod { .. }
        | PhenologyError::OverrideNotApplicable { .. } => FailureType::Expected,
        PhenologyError::UndefinedMetric { .. } | PhenologyError::DegenerateFit { .. } => {
            FailureType::Degenerate
        }
        PhenologyError::InvalidConfig(_)
        | PhenologyError::ConfigIo { .. }
        | PhenologyError::ConfigParse(_) => FailureType::Unexpected,
    }
}

/// Log a stage failure with automatic classification
pub fn log_failure(stage: Stage, group: Option<&GroupKey>, operation: &str, err: &PhenologyError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => info(stage, group, &message),
        FailureType::Degenerate => warn(stage, group, &message),
        FailureType::Unexpected => error(stage, group, &message),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of per-group processing
pub fn log_run_summary(total: usize, computed: usize, skipped: usize) {
    let message = format!(
        "Group processing complete: {}/{} computed, {} skipped",
        computed, total, skipped
    );

    if skipped == 0 {
        info(Stage::System, None, &message);
    } else if computed == 0 {
        error(Stage::System, None, &message);
    } else {
        warn(Stage::System, None, &message);
    }
}
