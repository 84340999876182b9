//! Structured logging - JSON lines behind the `log` facade
//!
//! Library code logs through `log::debug!` and friends. The binary calls
//! [`init`] to install a backend that writes one JSON object per record to
//! stderr and/or a file:
//!
//!   {"timestamp":"2024-01-10T12:34:56.000Z","level":"debug","target":"shellsense::exec","message":"..."}
//!
//! Stdout is reserved for completion results, so nothing is ever logged
//! there.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::Config(format!("unknown log level `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    level: &'a str,
    target: &'a str,
    message: String,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub file_path: Option<PathBuf>,
    pub stderr: bool,
    pub min_level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            stderr: true,
            min_level: LogLevel::Info,
        }
    }
}

struct JsonLogger {
    min_level: LogLevel,
    stderr: bool,
    file: Mutex<Option<File>>,
}

impl log::Log for JsonLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.min_level.as_filter()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(record, Utc::now());
        if self.stderr {
            eprintln!("{}", line);
        }
        if let Ok(mut file) = self.file.lock() {
            if let Some(ref mut file) = *file {
                let _ = writeln!(file, "{}", line);
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            if let Some(ref mut file) = *file {
                let _ = file.flush();
            }
        }
    }
}

/// Render a record as one JSON line
fn format_record(record: &log::Record, now: DateTime<Utc>) -> String {
    let level = record.level().as_str().to_lowercase();
    let entry = LogEntry {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        level: &level,
        target: record.target(),
        message: record.args().to_string(),
    };
    serde_json::to_string(&entry).unwrap_or_else(|_| format!("{:?}", entry))
}

/// Install the JSON logger as the global `log` backend
pub fn init(config: LogConfig) -> Result<()> {
    let file = match &config.file_path {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::io(path, e))?,
        ),
        None => None,
    };

    let logger = JsonLogger {
        min_level: config.min_level,
        stderr: config.stderr,
        file: Mutex::new(file),
    };
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| Error::Config(format!("logger already installed: {e}")))?;
    log::set_max_level(config.min_level.as_filter());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_level_parsing() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_record_is_one_json_line() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 34, 56).unwrap();
        let line = format_record(
            &log::Record::builder()
                .args(format_args!("spawned `{}`", "git"))
                .level(log::Level::Debug)
                .target("shellsense::exec")
                .build(),
            now,
        );
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["timestamp"], "2024-01-10T12:34:56.000Z");
        assert_eq!(value["level"], "debug");
        assert_eq!(value["target"], "shellsense::exec");
        assert_eq!(value["message"], "spawned `git`");
    }

    #[test]
    fn test_logger_filters_by_level() {
        use log::Log;

        let logger = JsonLogger {
            min_level: LogLevel::Warn,
            stderr: false,
            file: Mutex::new(None),
        };
        let warn = log::Metadata::builder().level(log::Level::Warn).build();
        let debug = log::Metadata::builder().level(log::Level::Debug).build();
        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&debug));
    }
}
