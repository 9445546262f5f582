//! Configuration schema for loggers, file output, archiving and the manager.
//!
//! These structures are the entire externally visible configuration
//! surface. They derive serde traits so hosts can load them from whatever
//! format they already use; this crate parses no files itself.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoggerError, Result};
use crate::types::LogLevel;

/// Default rendering pattern, carried verbatim for sinks that understand it.
pub const DEFAULT_PATTERN: &str = "[%Y-%m-%d %H:%M:%S.%e] [%l] [%n] %v";

/// File output settings for a logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Path of the (current) log file.
    pub filename: PathBuf,
    /// Rotate when the file exceeds `max_size`.
    pub rotating: bool,
    /// Rotation threshold in bytes.
    pub max_size: u64,
    /// Number of rotated files to keep.
    pub max_files: usize,
    /// Start a new file once a day.
    pub daily_rotation: bool,
    /// Hour (0-23) at which daily rotation happens.
    pub rotation_hour: u32,
    /// Minute (0-59) at which daily rotation happens.
    pub rotation_minute: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            filename: PathBuf::from("logs/claw.log"),
            rotating: false,
            max_size: 10 * 1024 * 1024, // 10 MB
            max_files: 5,
            daily_rotation: false,
            rotation_hour: 0,
            rotation_minute: 0,
        }
    }
}

impl FileConfig {
    /// Creates a basic (non-rotating) file config.
    #[must_use]
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// Enables size-based rotation.
    #[must_use]
    pub const fn with_rotation(mut self, max_size: u64, max_files: usize) -> Self {
        self.rotating = true;
        self.max_size = max_size;
        self.max_files = max_files;
        self
    }

    /// Enables daily rotation at the given wall-clock time.
    #[must_use]
    pub const fn with_daily_rotation(mut self, hour: u32, minute: u32) -> Self {
        self.daily_rotation = true;
        self.rotation_hour = hour;
        self.rotation_minute = minute;
        self
    }

    /// Checks the file settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.filename.as_os_str().is_empty() {
            return Err(LoggerError::invalid_config("file name must not be empty"));
        }
        if self.rotating && self.daily_rotation {
            return Err(LoggerError::invalid_config(
                "size rotation and daily rotation are mutually exclusive",
            ));
        }
        if self.rotating && (self.max_size == 0 || self.max_files == 0) {
            return Err(LoggerError::invalid_config(
                "rotating file needs non-zero max_size and max_files",
            ));
        }
        if self.rotation_hour > 23 {
            return Err(LoggerError::invalid_config(format!(
                "rotation_hour out of range: {}",
                self.rotation_hour
            )));
        }
        if self.rotation_minute > 59 {
            return Err(LoggerError::invalid_config(format!(
                "rotation_minute out of range: {}",
                self.rotation_minute
            )));
        }
        Ok(())
    }
}

/// Configuration for a single named logger.
///
/// Immutable once the logger is built; level and sampling changes go
/// through the logger's mutators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Unique registry key.
    pub name: String,
    /// Minimum level that is recorded.
    pub level: LogLevel,
    /// Output pattern handed to pattern-aware sinks.
    pub pattern: String,
    /// Dispatch through a background queue instead of the calling thread.
    #[serde(rename = "async")]
    pub async_mode: bool,
    /// Capacity of the async queue.
    pub queue_size: usize,
    /// Number of async worker threads.
    pub thread_count: usize,
    /// Optional file output.
    pub file: Option<FileConfig>,
    /// Write to stdout.
    pub console_output: bool,
    /// Colour console output by level.
    pub colored_output: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            level: LogLevel::Info,
            pattern: DEFAULT_PATTERN.to_string(),
            async_mode: false,
            queue_size: 8192,
            thread_count: 1,
            file: None,
            console_output: true,
            colored_output: true,
        }
    }
}

impl LoggerConfig {
    /// Creates a config with the given name and default settings.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the minimum level.
    #[must_use]
    pub const fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the output pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Enables async dispatch.
    #[must_use]
    pub const fn with_async(mut self, queue_size: usize, thread_count: usize) -> Self {
        self.async_mode = true;
        self.queue_size = queue_size;
        self.thread_count = thread_count;
        self
    }

    /// Adds file output.
    #[must_use]
    pub fn with_file(mut self, file: FileConfig) -> Self {
        self.file = Some(file);
        self
    }

    /// Enables or disables console output.
    #[must_use]
    pub const fn with_console(mut self, enabled: bool, colored: bool) -> Self {
        self.console_output = enabled;
        self.colored_output = colored;
        self
    }

    /// Disables every built-in output; sinks are attached explicitly.
    #[must_use]
    pub fn without_outputs(mut self) -> Self {
        self.console_output = false;
        self.file = None;
        self
    }

    /// Checks the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LoggerError::invalid_config("logger name must not be empty"));
        }
        if self.async_mode && self.queue_size == 0 {
            return Err(LoggerError::invalid_config("async queue_size must be > 0"));
        }
        if self.async_mode && self.thread_count == 0 {
            return Err(LoggerError::invalid_config("async thread_count must be > 0"));
        }
        if let Some(ref file) = self.file {
            file.validate()?;
        }
        Ok(())
    }
}

/// Compression codec used for archived files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressFormat {
    /// Zstandard, `.zst`
    #[default]
    Zstd,
}

impl CompressFormat {
    /// File extension (without the dot) for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Zstd => "zst",
        }
    }
}

/// Retention rules for a directory of rotated log files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Files older than this are compressed.
    #[serde(rename = "max_age_secs", with = "duration_secs")]
    pub max_age: Duration,
    /// Maximum number of files kept; the oldest beyond this are deleted.
    pub max_files: usize,
    /// Byte budget for the whole directory.
    pub max_total_size: u64,
    /// Compress old files.
    pub compress: bool,
    /// `*`/`?` wildcard selecting the managed file names.
    pub archive_pattern: String,
    /// Codec for compression.
    pub compress_format: CompressFormat,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            max_files: 100,
            max_total_size: 1024 * 1024 * 1024, // 1 GB
            compress: true,
            archive_pattern: "*".to_string(),
            compress_format: CompressFormat::Zstd,
        }
    }
}

impl ArchiveConfig {
    /// Sets the compression age threshold.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Sets the file count limit.
    #[must_use]
    pub const fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Sets the total size budget.
    #[must_use]
    pub const fn with_max_total_size(mut self, bytes: u64) -> Self {
        self.max_total_size = bytes;
        self
    }

    /// Enables or disables compression.
    #[must_use]
    pub const fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Sets the file-name wildcard.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.archive_pattern = pattern.into();
        self
    }
}

/// Settings for the process-wide [`LoggerManager`](crate::LoggerManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Period of the background maintenance sweep.
    #[serde(rename = "maintenance_interval_secs", with = "duration_secs")]
    pub maintenance_interval: Duration,
    /// Directory swept by the archiver; no archiver when `None`.
    pub archive_dir: Option<PathBuf>,
    /// Retention rules for `archive_dir`.
    pub archive: ArchiveConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: Duration::from_secs(5 * 60),
            archive_dir: None,
            archive: ArchiveConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Sets the maintenance period.
    #[must_use]
    pub const fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Enables archiving of the given directory.
    #[must_use]
    pub fn with_archive(mut self, dir: impl Into<PathBuf>, archive: ArchiveConfig) -> Self {
        self.archive_dir = Some(dir.into());
        self.archive = archive;
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    // ===========================================
    // LoggerConfig Tests
    // ===========================================

    #[test]
    fn logger_config_defaults() {
        let config = LoggerConfig::new("app");
        assert_eq!(config.name, "app");
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.pattern, DEFAULT_PATTERN);
        assert!(!config.async_mode);
        assert_eq!(config.queue_size, 8192);
        assert_eq!(config.thread_count, 1);
        assert!(config.file.is_none());
        assert!(config.console_output);
        assert!(config.colored_output);
    }

    #[test]
    fn logger_config_builder() {
        let config = LoggerConfig::new("svc")
            .with_level(LogLevel::Debug)
            .with_async(1024, 2)
            .with_console(true, false)
            .with_file(FileConfig::new("/tmp/svc.log").with_rotation(1024, 3));

        assert_eq!(config.level, LogLevel::Debug);
        assert!(config.async_mode);
        assert_eq!(config.queue_size, 1024);
        assert_eq!(config.thread_count, 2);
        assert!(!config.colored_output);
        assert!(config.file.as_ref().is_some_and(|f| f.rotating));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn logger_config_rejects_empty_name() {
        let err = LoggerConfig::new("  ").validate();
        assert_eq!(err.err().map(|e| e.kind()), Some(ErrorKind::InvalidConfig));
    }

    #[test]
    fn logger_config_rejects_zero_queue() {
        let config = LoggerConfig::new("a").with_async(0, 1);
        assert!(config.validate().is_err());

        let config = LoggerConfig::new("a").with_async(16, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn logger_config_deserializes_with_defaults() {
        let config: LoggerConfig =
            serde_json::from_str(r#"{"name":"api","level":"warn","async":true}"#)
                .expect("deserialize");
        assert_eq!(config.name, "api");
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.async_mode);
        assert_eq!(config.queue_size, 8192);
    }

    // ===========================================
    // FileConfig Tests
    // ===========================================

    #[test]
    fn file_config_rejects_bad_rotation_time() {
        let config = FileConfig::new("a.log").with_daily_rotation(24, 0);
        assert!(config.validate().is_err());

        let config = FileConfig::new("a.log").with_daily_rotation(3, 60);
        assert!(config.validate().is_err());

        let config = FileConfig::new("a.log").with_daily_rotation(23, 59);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_config_rejects_both_rotation_modes() {
        let config = FileConfig::new("a.log")
            .with_rotation(1024, 2)
            .with_daily_rotation(0, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_config_rejects_zero_rotation_limits() {
        let config = FileConfig::new("a.log").with_rotation(0, 2);
        assert!(config.validate().is_err());

        let config = FileConfig::new("a.log").with_rotation(1024, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_config_rejects_empty_filename() {
        let config = FileConfig::new("");
        assert!(config.validate().is_err());
    }

    // ===========================================
    // ArchiveConfig / ManagerConfig Tests
    // ===========================================

    #[test]
    fn archive_config_defaults() {
        let config = ArchiveConfig::default();
        assert_eq!(config.max_age, Duration::from_secs(604_800));
        assert_eq!(config.max_files, 100);
        assert!(config.compress);
        assert_eq!(config.archive_pattern, "*");
        assert_eq!(config.compress_format.extension(), "zst");
    }

    #[test]
    fn archive_config_serializes_age_in_seconds() {
        let config = ArchiveConfig::default().with_max_age(Duration::from_secs(90));
        let json = serde_json::to_value(&config).expect("serialize");
        assert_eq!(json["max_age_secs"], serde_json::json!(90));

        let parsed: ArchiveConfig = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed.max_age, Duration::from_secs(90));
    }

    #[test]
    fn manager_config_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.maintenance_interval, Duration::from_secs(300));
        assert!(config.archive_dir.is_none());
    }

    #[test]
    fn manager_config_with_archive() {
        let config = ManagerConfig::default()
            .with_maintenance_interval(Duration::from_secs(1))
            .with_archive("/var/log/claw", ArchiveConfig::default().with_max_files(3));
        assert_eq!(config.archive_dir, Some(PathBuf::from("/var/log/claw")));
        assert_eq!(config.archive.max_files, 3);
    }
}
