//! Output backends that receive finished log lines.
//!
//! This module provides:
//! - [`Sink`] — The capability a logger dispatches accepted records to
//! - [`ConsoleSink`] — Plain or ANSI-coloured stdout output
//! - [`FileSink`] — Basic, size-rotating, or daily-rotating file output
//! - [`MemorySink`] — In-memory capture
//! - [`TracingSink`] — Forwards records into `tracing`
//! - [`AsyncSink`] — Bounded queue drained by worker threads

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::config::FileConfig;
use crate::error::{LoggerError, Result};
use crate::types::LogLevel;

/// An output backend for finished log lines.
///
/// Implement this trait to send records to a custom destination. Sinks
/// are shared between threads and may be written concurrently.
pub trait Sink: Send + Sync {
    /// Returns the sink name.
    fn name(&self) -> &str;

    /// Writes one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot accept the record.
    fn write(&self, level: LogLevel, message: &str) -> Result<()>;

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered output cannot be written.
    fn flush(&self) -> Result<()>;
}

/// Renders the default `[timestamp] [level] [logger] message` line.
#[must_use]
pub fn render_line(logger: &str, level: LogLevel, message: &str) -> String {
    format!(
        "[{}] [{}] [{}] {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        level,
        logger,
        message
    )
}

// ========== Console ==========

const ANSI_RESET: &str = "\x1b[0m";

const fn level_color(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "\x1b[37m",
        LogLevel::Debug => "\x1b[36m",
        LogLevel::Info => "\x1b[32m",
        LogLevel::Warn => "\x1b[33m",
        LogLevel::Error => "\x1b[31m",
        LogLevel::Critical => "\x1b[1;41m",
        LogLevel::Off => "",
    }
}

/// Writes lines to stdout, optionally colouring the level.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    name: String,
    logger: String,
    colored: bool,
}

impl ConsoleSink {
    /// Creates a console sink for the named logger.
    #[must_use]
    pub fn new(logger: impl Into<String>, colored: bool) -> Self {
        let logger = logger.into();
        let name = if colored { "console_color" } else { "console" };
        Self {
            name: format!("{logger}:{name}"),
            logger,
            colored,
        }
    }

    /// Returns the line this sink would print.
    #[must_use]
    pub fn format(&self, level: LogLevel, message: &str) -> String {
        if !self.colored {
            return render_line(&self.logger, level, message);
        }
        format!(
            "[{}] [{}{}{}] [{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level_color(level),
            level,
            ANSI_RESET,
            self.logger,
            message
        )
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, level: LogLevel, message: &str) -> Result<()> {
        let line = self.format(level, message);
        let mut out = io::stdout().lock();
        writeln!(out, "{line}")?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        io::stdout().lock().flush()?;
        Ok(())
    }
}

// ========== File ==========

/// How a [`FileSink`] decides when to start a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Append to a single file forever.
    Basic,
    /// Roll over when the file would exceed `max_size` bytes.
    Rotating {
        /// Size threshold in bytes.
        max_size: u64,
        /// Number of rotated files kept.
        max_files: usize,
    },
    /// Start a new dated file every day at `hour:minute` (UTC).
    Daily {
        /// Rotation hour.
        hour: u32,
        /// Rotation minute.
        minute: u32,
    },
}

impl FileMode {
    /// Derives the mode from a file config.
    #[must_use]
    pub const fn from_config(config: &FileConfig) -> Self {
        if config.rotating {
            Self::Rotating {
                max_size: config.max_size,
                max_files: config.max_files,
            }
        } else if config.daily_rotation {
            Self::Daily {
                hour: config.rotation_hour,
                minute: config.rotation_minute,
            }
        } else {
            Self::Basic
        }
    }
}

struct FileState {
    writer: BufWriter<File>,
    path: PathBuf,
    size: u64,
    next_rotation: Option<DateTime<Utc>>,
}

/// Appends lines to a log file, rotating by size or by day.
pub struct FileSink {
    name: String,
    logger: String,
    base: PathBuf,
    mode: FileMode,
    state: Mutex<FileState>,
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("name", &self.name)
            .field("base", &self.base)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Returns `dir/stem.{index}.ext` for a base path `dir/stem.ext`.
fn rotated_path(base: &Path, index: usize) -> PathBuf {
    let stem = base.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let name = match base.extension() {
        Some(ext) => format!("{stem}.{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{index}"),
    };
    base.with_file_name(name)
}

/// Returns `dir/stem_YYYY-MM-DD.ext` for a base path `dir/stem.ext`.
fn dated_path(base: &Path, at: DateTime<Utc>) -> PathBuf {
    let stem = base.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let date = at.format("%Y-%m-%d");
    let name = match base.extension() {
        Some(ext) => format!("{stem}_{date}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{date}"),
    };
    base.with_file_name(name)
}

/// Next instant strictly after `now` at `hour:minute` UTC.
fn next_rotation_after(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let Some(today) = now.date_naive().and_hms_opt(hour, minute, 0) else {
        return now + ChronoDuration::days(1);
    };
    let today = today.and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

fn open_append(path: &Path) -> Result<(BufWriter<File>, u64)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LoggerError::from_io(path, e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoggerError::from_io(path, e))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((BufWriter::new(file), size))
}

impl FileSink {
    /// Opens (creating if needed) the file described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::FileCreationFailed`], [`LoggerError::PermissionDenied`]
    /// or [`LoggerError::DiskFull`] if the file cannot be opened.
    pub fn open(logger: impl Into<String>, config: &FileConfig) -> Result<Self> {
        Self::with_mode(logger, &config.filename, FileMode::from_config(config))
    }

    /// Opens a file sink with an explicit mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn with_mode(logger: impl Into<String>, base: &Path, mode: FileMode) -> Result<Self> {
        let logger = logger.into();
        let now = Utc::now();
        let (path, next_rotation) = match mode {
            FileMode::Daily { hour, minute } => (
                dated_path(base, now),
                Some(next_rotation_after(now, hour, minute)),
            ),
            FileMode::Basic | FileMode::Rotating { .. } => (base.to_path_buf(), None),
        };
        let (writer, size) = open_append(&path)?;

        tracing::debug!(logger = %logger, path = %path.display(), "opened log file");

        Ok(Self {
            name: format!("{logger}:file"),
            logger,
            base: base.to_path_buf(),
            mode,
            state: Mutex::new(FileState {
                writer,
                path,
                size,
                next_rotation,
            }),
        })
    }

    /// Path of the file currently being written.
    #[must_use]
    pub fn current_path(&self) -> PathBuf {
        self.state.lock().path.clone()
    }

    /// Returns the rotation mode.
    #[must_use]
    pub const fn mode(&self) -> FileMode {
        self.mode
    }

    fn rotate_by_size(&self, state: &mut FileState, max_files: usize) -> Result<()> {
        state.writer.flush()?;

        let oldest = rotated_path(&self.base, max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..max_files).rev() {
            let from = rotated_path(&self.base, index);
            if from.exists() {
                fs::rename(&from, rotated_path(&self.base, index + 1))?;
            }
        }
        fs::rename(&self.base, rotated_path(&self.base, 1))?;

        let (writer, size) = open_append(&self.base)?;
        state.writer = writer;
        state.size = size;
        Ok(())
    }

    fn rotate_daily(&self, state: &mut FileState, now: DateTime<Utc>, hour: u32, minute: u32) -> Result<()> {
        state.writer.flush()?;
        let path = dated_path(&self.base, now);
        let (writer, size) = open_append(&path)?;
        state.writer = writer;
        state.path = path;
        state.size = size;
        state.next_rotation = Some(next_rotation_after(now, hour, minute));
        Ok(())
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, level: LogLevel, message: &str) -> Result<()> {
        let line = render_line(&self.logger, level, message);
        let line_bytes = line.len() as u64 + 1;

        let mut state = self.state.lock();
        match self.mode {
            FileMode::Rotating { max_size, max_files } => {
                if state.size > 0 && state.size + line_bytes > max_size {
                    self.rotate_by_size(&mut state, max_files)?;
                }
            }
            FileMode::Daily { hour, minute } => {
                let now = Utc::now();
                if state.next_rotation.is_some_and(|at| now >= at) {
                    self.rotate_daily(&mut state, now, hour, minute)?;
                }
            }
            FileMode::Basic => {}
        }

        writeln!(state.writer, "{line}")?;
        state.size += line_bytes;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.state.lock().writer.flush()?;
        Ok(())
    }
}

// ========== Memory ==========

/// A record captured by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRecord {
    /// Level of the record.
    pub level: LogLevel,
    /// Final message, after enrichment.
    pub message: String,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    name: String,
    records: Mutex<Vec<CapturedRecord>>,
    flushes: AtomicU64,
}

impl MemorySink {
    /// Creates an empty memory sink.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns a copy of every captured record.
    #[must_use]
    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records.lock().clone()
    }

    /// Returns the captured messages in order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.message.clone()).collect()
    }

    /// Number of captured records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Checks if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Number of `flush` calls received.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Discards every captured record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, level: LogLevel, message: &str) -> Result<()> {
        self.records.lock().push(CapturedRecord {
            level,
            message: message.to_string(),
        });
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ========== Tracing ==========

/// Forwards records to the `tracing` infrastructure.
///
/// Levels map one to one, except that critical records are emitted at
/// `ERROR` with `critical = true`.
#[derive(Debug, Clone)]
pub struct TracingSink {
    name: String,
    logger: String,
}

impl TracingSink {
    /// Creates a tracing sink for the named logger.
    #[must_use]
    pub fn new(logger: impl Into<String>) -> Self {
        let logger = logger.into();
        Self {
            name: format!("{logger}:tracing"),
            logger,
        }
    }
}

impl Sink for TracingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, level: LogLevel, message: &str) -> Result<()> {
        let logger = self.logger.as_str();
        match level {
            LogLevel::Trace => tracing::trace!(target: "claw_logger::record", logger, "{message}"),
            LogLevel::Debug => tracing::debug!(target: "claw_logger::record", logger, "{message}"),
            LogLevel::Info => tracing::info!(target: "claw_logger::record", logger, "{message}"),
            LogLevel::Warn => tracing::warn!(target: "claw_logger::record", logger, "{message}"),
            LogLevel::Error => tracing::error!(target: "claw_logger::record", logger, "{message}"),
            LogLevel::Critical => {
                tracing::error!(target: "claw_logger::record", logger, critical = true, "{message}");
            }
            LogLevel::Off => {}
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ========== Async ==========

struct Job {
    level: LogLevel,
    message: String,
}

/// Tickets for queued records. `flush` waits on the tickets issued before it
/// started, so producers that keep writing cannot hold it off.
#[derive(Default)]
struct Pending {
    counts: Mutex<Tickets>,
    progress: Condvar,
}

#[derive(Default)]
struct Tickets {
    issued: u64,
    finished: u64,
}

impl Pending {
    fn issue(&self) {
        self.counts.lock().issued += 1;
    }

    fn finish(&self) {
        self.counts.lock().finished += 1;
        self.progress.notify_all();
    }

    fn wait_for_issued(&self) {
        let mut counts = self.counts.lock();
        let target = counts.issued;
        while counts.finished < target {
            self.progress.wait(&mut counts);
        }
    }
}

/// Dispatches to inner sinks from a bounded queue drained by worker threads.
///
/// `write` blocks while the queue is full. `flush` waits until as many
/// records as were queued when it started have been written, then flushes
/// the inner sinks.
pub struct AsyncSink {
    name: String,
    sinks: Arc<Vec<Arc<dyn Sink>>>,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<Pending>,
    failures: Arc<AtomicU64>,
}

impl std::fmt::Debug for AsyncSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncSink")
            .field("name", &self.name)
            .field("sinks", &self.sinks.len())
            .field("workers", &self.workers.lock().len())
            .finish_non_exhaustive()
    }
}

impl AsyncSink {
    /// Starts `thread_count` workers behind a queue of `queue_size` records.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::AsyncInitFailed`] if the sizes are zero or a
    /// worker thread cannot be spawned.
    pub fn new(
        logger: &str,
        sinks: Vec<Arc<dyn Sink>>,
        queue_size: usize,
        thread_count: usize,
    ) -> Result<Self> {
        if queue_size == 0 || thread_count == 0 {
            return Err(LoggerError::AsyncInitFailed {
                reason: format!(
                    "queue_size ({queue_size}) and thread_count ({thread_count}) must be > 0"
                ),
            });
        }

        let sinks = Arc::new(sinks);
        let pending = Arc::new(Pending::default());
        let failures = Arc::new(AtomicU64::new(0));
        let (sender, receiver) = channel::bounded::<Job>(queue_size);

        let mut workers = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let worker = Worker {
                receiver: receiver.clone(),
                sinks: Arc::clone(&sinks),
                pending: Arc::clone(&pending),
                failures: Arc::clone(&failures),
            };
            let handle = thread::Builder::new()
                .name(format!("claw-logger-{logger}-{index}"))
                .spawn(move || worker.run())
                .map_err(|e| LoggerError::AsyncInitFailed {
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }

        tracing::debug!(logger, queue_size, thread_count, "started async sink");

        Ok(Self {
            name: format!("{logger}:async"),
            sinks,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            pending,
            failures,
        })
    }

    /// Number of inner sink writes that failed.
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Stops accepting records, drains the queue and joins the workers.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                tracing::warn!(sink = %self.name, "async worker panicked");
            }
        }
    }
}

impl Sink for AsyncSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&self, level: LogLevel, message: &str) -> Result<()> {
        let Some(sender) = self.sender.lock().clone() else {
            return Err(LoggerError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "async sink is shut down",
            )));
        };

        self.pending.issue();
        let job = Job {
            level,
            message: message.to_string(),
        };
        if sender.send(job).is_err() {
            self.pending.finish();
            return Err(LoggerError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "async workers have exited",
            )));
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.pending.wait_for_issued();
        for sink in self.sinks.iter() {
            sink.flush()?;
        }
        Ok(())
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    receiver: Receiver<Job>,
    sinks: Arc<Vec<Arc<dyn Sink>>>,
    pending: Arc<Pending>,
    failures: Arc<AtomicU64>,
}

impl Worker {
    fn run(self) {
        for job in &self.receiver {
            for sink in self.sinks.iter() {
                match panic::catch_unwind(AssertUnwindSafe(|| sink.write(job.level, &job.message))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(sink = sink.name(), error = %e, "async sink write failed");
                    }
                    Err(_) => {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(sink = sink.name(), "async sink panicked");
                    }
                }
            }
            self.pending.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).expect("read log file")
    }

    // ===========================================
    // Rendering Tests
    // ===========================================

    #[test]
    fn render_line_layout() {
        let line = render_line("api", LogLevel::Warn, "disk almost full");
        assert!(line.starts_with('['));
        assert!(line.ends_with("] [warn] [api] disk almost full"));
    }

    #[test]
    fn console_colours_only_the_level() {
        let colored = ConsoleSink::new("api", true);
        let line = colored.format(LogLevel::Error, "boom");
        assert!(line.contains("\x1b[31merror\x1b[0m"));
        assert!(line.ends_with("[api] boom"));

        let plain = ConsoleSink::new("api", false);
        assert!(!plain.format(LogLevel::Error, "boom").contains('\x1b'));
        assert_eq!(plain.name(), "api:console");
    }

    #[test]
    fn rotated_and_dated_paths() {
        let base = Path::new("/var/log/app.log");
        assert_eq!(rotated_path(base, 2), PathBuf::from("/var/log/app.2.log"));

        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).single().expect("valid date");
        assert_eq!(dated_path(base, at), PathBuf::from("/var/log/app_2024-03-09.log"));

        let bare = Path::new("app");
        assert_eq!(rotated_path(bare, 1), PathBuf::from("app.1"));
    }

    #[test]
    fn next_rotation_is_strictly_in_the_future() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 10, 30, 0).single().expect("valid date");
        let later_today = next_rotation_after(now, 12, 0);
        assert_eq!(later_today, Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).single().expect("valid date"));

        let tomorrow = next_rotation_after(now, 10, 30);
        assert_eq!(tomorrow, Utc.with_ymd_and_hms(2024, 3, 10, 10, 30, 0).single().expect("valid date"));
    }

    // ===========================================
    // FileSink Tests
    // ===========================================

    #[test]
    fn basic_file_sink_appends() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested/app.log");
        let sink = FileSink::open("app", &FileConfig::new(&path)).expect("open");

        sink.write(LogLevel::Info, "first").expect("write");
        sink.write(LogLevel::Error, "second").expect("write");
        sink.flush().expect("flush");

        let content = read(&path);
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[info] [app] first"));
        assert!(lines[1].ends_with("[error] [app] second"));
        assert_eq!(sink.mode(), FileMode::Basic);
    }

    #[test]
    fn rotating_file_sink_shifts_files() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("app.log");
        let config = FileConfig::new(&path).with_rotation(100, 2);
        let sink = FileSink::open("app", &config).expect("open");

        // each line is well over 50 bytes, so every write after the first rotates
        for i in 0..5 {
            sink.write(LogLevel::Info, &format!("message number {i} with padding text")).expect("write");
        }
        sink.flush().expect("flush");

        assert!(read(&path).contains("message number 4"));
        assert!(read(&rotated_path(&path, 1)).contains("message number 3"));
        assert!(read(&rotated_path(&path, 2)).contains("message number 2"));
        assert!(!rotated_path(&path, 3).exists());
    }

    #[test]
    fn daily_file_sink_uses_dated_name() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("app.log");
        let config = FileConfig::new(&path).with_daily_rotation(0, 0);
        let sink = FileSink::open("app", &config).expect("open");

        sink.write(LogLevel::Info, "hello").expect("write");
        sink.flush().expect("flush");

        let current = sink.current_path();
        let name = current.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        assert!(name.starts_with("app_"));
        assert!(name.ends_with(".log"));
        assert!(read(&current).contains("hello"));
        assert!(!path.exists());
    }

    #[test]
    fn file_sink_reports_creation_failure() {
        let dir = TempDir::new().expect("tempdir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").expect("write blocker");

        let result = FileSink::open("app", &FileConfig::new(blocker.join("app.log")));
        assert!(result.is_err());
    }

    // ===========================================
    // MemorySink Tests
    // ===========================================

    #[test]
    fn memory_sink_captures_records() {
        let sink = MemorySink::new("mem");
        sink.write(LogLevel::Info, "a").expect("write");
        sink.write(LogLevel::Warn, "b").expect("write");
        sink.flush().expect("flush");

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.messages(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sink.records()[1].level, LogLevel::Warn);
        assert_eq!(sink.flush_count(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    /// Shared buffer a test subscriber writes into.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn tracing_sink_forwards_records() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();

        let sink = TracingSink::new("api");
        tracing::subscriber::with_default(subscriber, || {
            for level in LogLevel::ALL {
                assert!(sink.write(level, &format!("{level} record")).is_ok());
            }
            assert!(sink.flush().is_ok());
        });

        let output = String::from_utf8(captured.0.lock().clone()).expect("utf8");
        assert!(output.contains("WARN"));
        assert!(output.contains("warn record"));
        assert!(output.contains("critical record"));
        assert!(output.contains("api"));
        assert!(!output.contains("off record"));
    }

    // ===========================================
    // AsyncSink Tests
    // ===========================================

    #[test]
    fn async_sink_delivers_everything_by_flush() {
        let memory = Arc::new(MemorySink::new("mem"));
        let sink = AsyncSink::new("app", vec![Arc::clone(&memory) as Arc<dyn Sink>], 4, 2)
            .expect("start async sink");

        for i in 0..100 {
            sink.write(LogLevel::Info, &format!("m{i}")).expect("write");
        }
        sink.flush().expect("flush");

        assert_eq!(memory.len(), 100);
        assert_eq!(memory.flush_count(), 1);
        assert_eq!(sink.failed_writes(), 0);
    }

    #[test]
    fn async_sink_single_worker_preserves_order() {
        let memory = Arc::new(MemorySink::new("mem"));
        let sink = AsyncSink::new("app", vec![Arc::clone(&memory) as Arc<dyn Sink>], 8, 1)
            .expect("start async sink");

        for i in 0..20 {
            sink.write(LogLevel::Info, &i.to_string()).expect("write");
        }
        sink.flush().expect("flush");

        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(memory.messages(), expected);
    }

    #[test]
    fn async_sink_flush_returns_under_steady_load() {
        use std::sync::atomic::AtomicBool;
        use std::time::Duration;

        let memory = Arc::new(MemorySink::new("mem"));
        let sink = Arc::new(
            AsyncSink::new("app", vec![Arc::clone(&memory) as Arc<dyn Sink>], 4, 1)
                .expect("start async sink"),
        );
        let stop = Arc::new(AtomicBool::new(false));

        let producer = {
            let sink = Arc::clone(&sink);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut i = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let _ = sink.write(LogLevel::Info, &format!("m{i}"));
                    i += 1;
                }
            })
        };
        thread::sleep(Duration::from_millis(20));

        let (done_tx, done_rx) = channel::bounded(1);
        let flusher = {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                let _ = done_tx.send(sink.flush().is_ok());
            })
        };
        let flushed = done_rx.recv_timeout(Duration::from_secs(5));

        stop.store(true, Ordering::Relaxed);
        producer.join().expect("producer");
        flusher.join().expect("flusher");

        assert_eq!(flushed, Ok(true));
        assert!(!memory.is_empty());
    }

    #[test]
    fn async_sink_rejects_zero_sizes() {
        let err = AsyncSink::new("app", Vec::new(), 0, 1).expect_err("zero queue");
        assert_eq!(err.kind(), crate::error::ErrorKind::AsyncInitFailed);

        let err = AsyncSink::new("app", Vec::new(), 1, 0).expect_err("zero threads");
        assert_eq!(err.kind(), crate::error::ErrorKind::AsyncInitFailed);
    }

    #[test]
    fn async_sink_write_after_shutdown_fails() {
        let memory = Arc::new(MemorySink::new("mem"));
        let sink = AsyncSink::new("app", vec![Arc::clone(&memory) as Arc<dyn Sink>], 8, 1)
            .expect("start async sink");
        sink.write(LogLevel::Info, "before").expect("write");

        sink.shutdown();

        assert!(sink.write(LogLevel::Info, "after").is_err());
        assert_eq!(memory.messages(), vec!["before".to_string()]);
    }
}
