use crate::config::Config;
use crate::error::{Result, WorkerError};
use chrono::{DateTime, Utc};
use colored::*;
use log::{Level, Metadata, Record};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

static WORKER_LOGGER: Lazy<WorkerLogger> = Lazy::new(WorkerLogger::new);

const CRATE_TARGET: &str = "uno_worker";

pub fn init_with_config(config: LoggerConfig) -> Result<()> {
    let level = config.min_level;
    WORKER_LOGGER.update_config(config)?;

    log::set_logger(&*WORKER_LOGGER)
        .map_err(|e| WorkerError::ConfigError(format!("Failed to set logger: {}", e)))?;
    log::set_max_level(level.to_log_level_filter());
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::Cyan,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            LogLevel::Trace => "🔍",
            LogLevel::Debug => "🐛",
            LogLevel::Info => "💡",
            LogLevel::Warn => "⚠️",
            LogLevel::Error => "❌",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn to_log_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::Trace,
            LogLevel::Debug => Level::Debug,
            LogLevel::Info => Level::Info,
            LogLevel::Warn => Level::Warn,
            LogLevel::Error => Level::Error,
        }
    }

    pub fn to_log_level_filter(&self) -> log::LevelFilter {
        self.to_log_level().to_level_filter()
    }

    pub fn from_log_level(level: Level) -> Self {
        match level {
            Level::Trace => LogLevel::Trace,
            Level::Debug => LogLevel::Debug,
            Level::Info => LogLevel::Info,
            Level::Warn => LogLevel::Warn,
            Level::Error => LogLevel::Error,
        }
    }
}

impl FromStr for LogLevel {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(WorkerError::ConfigError(format!("unknown log level '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub module: String,
    pub file: String,
    pub line: u32,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: String, module: String, file: String, line: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message,
            module,
            file,
            line,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub min_level: LogLevel,
    /// Records from other crates are never shown below this level.
    pub dependency_level: LogLevel,
    pub show_colors: bool,
    pub show_emojis: bool,
    pub show_file_location: bool,
    pub show_module: bool,
    pub timestamp_format: String,
    pub output_json: bool,
    pub log_file_path: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            dependency_level: LogLevel::Warn,
            show_colors: true,
            show_emojis: true,
            show_file_location: false,
            show_module: true,
            timestamp_format: "%Y-%m-%d %H:%M:%S%.3f".to_string(),
            output_json: false,
            log_file_path: None,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `LOG_FORMAT=json` selects the production preset; `LOG_LEVEL` and
    /// `LOG_FILE` override either preset. Unknown levels fall back to info.
    pub fn from_env() -> Self {
        let mut config = match env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") => Self::production(),
            _ => Self::default(),
        };
        if let Some(level) = env::var("LOG_LEVEL").ok().and_then(|l| l.parse().ok()) {
            config.min_level = level;
        }
        if let Ok(path) = env::var("LOG_FILE") {
            if !path.is_empty() {
                config = config.with_file_output(&path);
            }
        }
        config
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.show_colors = enabled;
        self
    }

    pub fn with_file_output(mut self, path: &str) -> Self {
        self.log_file_path = Some(path.to_string());
        self
    }

    pub fn with_json_output(mut self, enabled: bool) -> Self {
        self.output_json = enabled;
        self
    }

    pub fn production() -> Self {
        Self {
            min_level: LogLevel::Info,
            show_colors: false,
            show_emojis: false,
            output_json: true,
            ..Default::default()
        }
    }

    pub fn development() -> Self {
        Self {
            min_level: LogLevel::Debug,
            show_colors: true,
            show_emojis: true,
            show_file_location: true,
            ..Default::default()
        }
    }
}

pub struct WorkerLogger {
    config: Mutex<LoggerConfig>,
    log_file: Mutex<Option<File>>,
}

impl WorkerLogger {
    pub fn new() -> Self {
        Self {
            config: Mutex::new(LoggerConfig::default()),
            log_file: Mutex::new(None),
        }
    }

    pub fn update_config(&self, new_config: LoggerConfig) -> Result<()> {
        let file = match &new_config.log_file_path {
            Some(path) => Some(OpenOptions::new().create(true).append(true).open(path)?),
            None => None,
        };

        if let Ok(mut log_file) = self.log_file.lock() {
            *log_file = file;
        }
        if let Ok(mut config) = self.config.lock() {
            *config = new_config;
        }
        Ok(())
    }

    fn format_console_output(&self, entry: &LogEntry, config: &LoggerConfig) -> String {
        let mut output = String::new();

        let timestamp = entry.timestamp.format(&config.timestamp_format).to_string();
        if config.show_colors {
            output.push_str(&format!("{} ", timestamp.bright_black()));
        } else {
            output.push_str(&format!("{} ", timestamp));
        }

        let level_str = if config.show_emojis {
            format!("{} {}", entry.level.emoji(), entry.level.as_str())
        } else {
            entry.level.as_str().to_string()
        };
        if config.show_colors {
            output.push_str(&format!(
                "[{}] ",
                level_str.color(entry.level.color()).bold()
            ));
        } else {
            output.push_str(&format!("[{}] ", level_str));
        }

        if config.show_module && !entry.module.is_empty() {
            if config.show_colors {
                output.push_str(&format!("{}: ", entry.module.bright_blue()));
            } else {
                output.push_str(&format!("{}: ", entry.module));
            }
        }

        if config.show_colors {
            output.push_str(&entry.message.white().bold().to_string());
        } else {
            output.push_str(&entry.message);
        }

        if config.show_file_location {
            let location = format!("{}:{}", entry.file, entry.line);
            if config.show_colors {
                output.push_str(&format!(" ({})", location.bright_black()));
            } else {
                output.push_str(&format!(" ({})", location));
            }
        }

        output
    }

    fn format_line(&self, entry: &LogEntry, config: &LoggerConfig) -> String {
        if config.output_json {
            serde_json::to_string(entry).unwrap_or_default()
        } else {
            self.format_console_output(entry, config)
        }
    }

    fn create_log_entry(&self, record: &Record) -> LogEntry {
        LogEntry::new(
            LogLevel::from_log_level(record.level()),
            record.args().to_string(),
            record.module_path().unwrap_or("unknown").to_string(),
            record.file().unwrap_or("unknown").to_string(),
            record.line().unwrap_or(0),
        )
    }
}

impl Default for WorkerLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl log::Log for WorkerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let Ok(config) = self.config.lock() else {
            return true;
        };
        let floor = if metadata.target().starts_with(CRATE_TARGET) {
            config.min_level
        } else {
            config.min_level.max(config.dependency_level)
        };
        metadata.level() <= floor.to_log_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = self.create_log_entry(record);

        let Ok(config) = self.config.lock() else {
            return;
        };
        println!("{}", self.format_line(&entry, &config));

        if let Ok(mut log_file) = self.log_file.lock() {
            if let Some(file) = log_file.as_mut() {
                let plain = LoggerConfig {
                    show_colors: false,
                    ..config.clone()
                };
                let _ = writeln!(file, "{}", self.format_line(&entry, &plain));
            }
        }
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        if let Ok(mut log_file) = self.log_file.lock() {
            if let Some(file) = log_file.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Logs how long a stage took when dropped.
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::debug!("⏱️  Starting {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        log::info!(
            "⏱️  {} completed in {}ms",
            self.name,
            self.elapsed().as_millis()
        );
    }
}

pub fn timer(name: &str) -> Timer {
    Timer::new(name)
}

pub fn log_startup_info(app_name: &str, version: &str) {
    log::info!("🚀 Starting {} v{}", app_name, version);
}

/// Logs the effective configuration. Credentials are never printed.
pub fn log_config_info(config: &Config) {
    log::info!("⚙️  Configuration loaded:");
    log::info!(
        "   Pipeline: {} backend, model {}",
        config.pipeline.backend,
        config.pipeline.model_name()
    );
    log::info!(
        "   Offload: {} | Only LoRA: {} | LoRA rank: {}",
        if config.pipeline.offload { "✅" } else { "❌" },
        if config.pipeline.only_lora { "✅" } else { "❌" },
        config.pipeline.lora_rank
    );
    log::info!(
        "   Output: {}x{}, guidance {}, {} steps, ref size {}, pe {}",
        config.generation.width,
        config.generation.height,
        config.generation.guidance,
        config.generation.num_steps,
        config.generation.ref_size,
        config.generation.pe.as_str()
    );
    log::info!("   B2 bucket: {}", config.b2.bucket_name);
    log::info!(
        "   Job queue: {}",
        if config.runtime.has_job_queue() { "✅" } else { "❌" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert_eq!(LogLevel::Info.as_str(), "INFO");
        assert_eq!(LogLevel::Error.emoji(), "❌");
        assert_eq!(LogLevel::Debug.color(), Color::Blue);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_logger_config() {
        let config = LoggerConfig::development();
        assert_eq!(config.min_level, LogLevel::Debug);
        assert!(config.show_colors);

        let prod_config = LoggerConfig::production();
        assert!(!prod_config.show_colors);
        assert!(prod_config.output_json);
    }

    #[test]
    fn plain_console_line_has_level_module_and_message() {
        let logger = WorkerLogger::new();
        let config = LoggerConfig::new().with_colors(false);
        let entry = LogEntry::new(
            LogLevel::Warn,
            "inference server not ready".into(),
            "uno_worker::pipeline".into(),
            "src/pipeline/remote.rs".into(),
            42,
        );

        let line = logger.format_line(&entry, &config);
        assert!(line.contains("WARN"));
        assert!(line.contains("uno_worker::pipeline: inference server not ready"));
        assert!(!line.contains("remote.rs:42"));

        let json_line = logger.format_line(&entry, &config.with_json_output(true));
        let parsed: LogEntry = serde_json::from_str(&json_line).unwrap();
        assert_eq!(parsed.level, LogLevel::Warn);
        assert_eq!(parsed.line, 42);
    }

    #[test]
    fn dependencies_are_capped_at_warn() {
        let logger = WorkerLogger::new();
        logger
            .update_config(LoggerConfig::development())
            .unwrap();

        let ours = Metadata::builder()
            .level(Level::Debug)
            .target("uno_worker::handler")
            .build();
        let theirs = Metadata::builder()
            .level(Level::Info)
            .target("hyper::proto")
            .build();
        assert!(log::Log::enabled(&logger, &ours));
        assert!(!log::Log::enabled(&logger, &theirs));
    }

    #[test]
    fn file_output_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.log");
        let logger = WorkerLogger::new();
        logger
            .update_config(LoggerConfig::new().with_file_output(path.to_str().unwrap()))
            .unwrap();

        log::Log::log(
            &logger,
            &Record::builder()
                .level(Level::Error)
                .target("uno_worker::storage")
                .module_path(Some("uno_worker::storage"))
                .args(format_args!("upload failed"))
                .build(),
        );
        log::Log::flush(&logger);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("upload failed"));
        assert!(!written.contains('\u{1b}'));
    }

    #[test]
    fn test_logger_initialization() {
        let config = LoggerConfig::development();
        assert!(init_with_config(config).is_ok());
    }
}
