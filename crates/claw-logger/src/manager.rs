//! Process-wide logger registry with background maintenance.
//!
//! This module provides the [`LoggerManager`], the entry point a host
//! constructs once at startup. It owns every named [`Logger`], the shared
//! [`EventBus`] and the optional [`Archiver`], and runs one maintenance
//! thread that periodically archives old files and flushes all loggers.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive::Archiver;
use crate::compress::{Compressor, ZstdCompressor};
use crate::config::{CompressFormat, LoggerConfig, ManagerConfig};
use crate::error::{LoggerError, Result};
use crate::event::{EventBus, LogEvent};
use crate::logger::Logger;
use crate::sink::{AsyncSink, ConsoleSink, FileSink, Sink};
use crate::types::LogLevel;

/// Aggregated statistics across every registered logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Number of registered loggers.
    pub total_loggers: usize,
    /// Sum of `total_logs` over all loggers.
    pub total_logs: u64,
    /// Sum of `failed_logs` over all loggers.
    pub total_errors: u64,
    /// Mean of the per-logger `logs_per_second` (0 with no loggers).
    pub avg_logs_per_second: f64,
}

/// Builds the sinks a logger config asks for.
///
/// Console output comes first, then the file. With `async_mode` set the
/// sinks are wrapped in a single [`AsyncSink`].
///
/// # Errors
///
/// Returns the file sink's open error, or [`LoggerError::AsyncInitFailed`]
/// if the async workers cannot start.
pub fn build_sinks(config: &LoggerConfig) -> Result<Vec<Arc<dyn Sink>>> {
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    if config.console_output {
        sinks.push(Arc::new(ConsoleSink::new(&config.name, config.colored_output)));
    }
    if let Some(ref file) = config.file {
        sinks.push(Arc::new(FileSink::open(&config.name, file)?));
    }
    if config.async_mode && !sinks.is_empty() {
        let async_sink = AsyncSink::new(&config.name, sinks, config.queue_size, config.thread_count)?;
        sinks = vec![Arc::new(async_sink)];
    }
    Ok(sinks)
}

/// Stop flag the maintenance thread sleeps on.
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    /// Sleeps for `timeout` or until stopped; returns true if stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut stopped = self.stopped.lock();
        while !*stopped {
            match deadline {
                Some(deadline) => {
                    if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                        break;
                    }
                }
                // Past the representable range: only a stop ends the wait.
                None => self.wake.wait(&mut stopped),
            }
        }
        *stopped
    }
}

/// State shared between the manager and its maintenance thread.
struct Shared {
    loggers: RwLock<HashMap<String, Arc<Logger>>>,
    event_bus: Arc<EventBus>,
    archiver: Option<Arc<Archiver>>,
}

impl Shared {
    fn snapshot(&self) -> Vec<Arc<Logger>> {
        self.loggers.read().values().cloned().collect()
    }

    fn flush_all(&self) {
        for logger in self.snapshot() {
            logger.flush();
        }
    }

    fn run_maintenance(&self) {
        if let Some(ref archiver) = self.archiver {
            let report = archiver.archive_old_files();
            debug!(
                deleted = report.deleted,
                compressed = report.compressed,
                "maintenance archive pass"
            );
        }
        self.flush_all();
    }
}

fn maintenance_loop(shared: &Shared, stop: &StopSignal, interval: Duration) {
    debug!(interval_secs = interval.as_secs(), "maintenance thread started");
    while !stop.wait(interval) {
        if panic::catch_unwind(AssertUnwindSafe(|| shared.run_maintenance())).is_err() {
            warn!("maintenance sweep panicked");
        }
    }
    debug!("maintenance thread stopped");
}

/// The process-wide logger registry.
///
/// Construct one with [`LoggerManager::init`] and tear it down with
/// [`LoggerManager::shutdown`] (also run on drop). Registry mutation takes
/// the exclusive lock; lookups and aggregation share it.
pub struct LoggerManager {
    config: ManagerConfig,
    shared: Arc<Shared>,
    stop: Arc<StopSignal>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for LoggerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerManager")
            .field("config", &self.config)
            .field("loggers", &self.logger_count())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl LoggerManager {
    /// Creates the manager and starts its maintenance thread.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfig`] for a zero maintenance
    /// interval or an uncompilable `archive_pattern`, or
    /// [`LoggerError::AsyncInitFailed`] if the thread cannot be spawned.
    pub fn init(config: ManagerConfig) -> Result<Self> {
        if config.maintenance_interval.is_zero() {
            return Err(LoggerError::invalid_config("maintenance_interval must be > 0"));
        }

        let archiver = match config.archive_dir {
            Some(ref dir) => {
                let compressor: Arc<dyn Compressor> = match config.archive.compress_format {
                    CompressFormat::Zstd => Arc::new(ZstdCompressor::new()),
                };
                Some(Arc::new(Archiver::new(dir.clone(), config.archive.clone(), compressor)?))
            }
            None => None,
        };

        let shared = Arc::new(Shared {
            loggers: RwLock::new(HashMap::new()),
            event_bus: Arc::new(EventBus::new()),
            archiver,
        });
        let stop = Arc::new(StopSignal::default());

        let worker = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            let interval = config.maintenance_interval;
            thread::Builder::new()
                .name("claw-logger-maintenance".to_string())
                .spawn(move || maintenance_loop(&shared, &stop, interval))
                .map_err(|e| LoggerError::AsyncInitFailed {
                    reason: format!("failed to start maintenance thread: {e}"),
                })?
        };

        info!(
            interval_secs = config.maintenance_interval.as_secs(),
            archive_dir = ?config.archive_dir,
            "logger manager started"
        );

        Ok(Self {
            config,
            shared,
            stop,
            worker: Mutex::new(Some(worker)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ============ Registry ============

    /// Creates and registers a logger.
    ///
    /// Sinks are built from the config's console and file settings. A name
    /// can be claimed by only one logger, even under concurrent calls.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfig`] if the name is taken, the
    /// config is invalid, or the manager is shut down; or any error raised
    /// while building the sinks.
    pub fn create_logger(&self, config: LoggerConfig) -> Result<Arc<Logger>> {
        if self.is_shut_down() {
            return Err(LoggerError::invalid_config("logger manager is shut down"));
        }
        config.validate()?;

        let name = config.name.clone();
        if self.shared.loggers.read().contains_key(&name) {
            return Err(duplicate_name(&name));
        }

        let sinks = build_sinks(&config)?;
        let logger = Arc::new(
            Logger::builder(config)
                .with_sinks(sinks)
                .with_event_bus(Arc::clone(&self.shared.event_bus))
                .build_unannounced()?,
        );

        match self.shared.loggers.write().entry(name.clone()) {
            Entry::Occupied(_) => return Err(duplicate_name(&name)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&logger));
            }
        }

        logger.announce_created();
        info!(logger = %name, level = %logger.level(), "created logger");
        Ok(logger)
    }

    /// Looks up a logger by name.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::LoggerNotFound`] if no logger has that name.
    pub fn get_logger(&self, name: &str) -> Result<Arc<Logger>> {
        self.shared
            .loggers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LoggerError::LoggerNotFound {
                name: name.to_string(),
            })
    }

    /// Flushes and unregisters a logger. Returns false if it did not exist.
    pub fn remove_logger(&self, name: &str) -> bool {
        let Some(logger) = self.shared.loggers.write().remove(name) else {
            return false;
        };
        logger.flush();
        logger.emit(LogEvent::LoggerDestroyed, None);
        info!(logger = %name, "removed logger");
        true
    }

    /// Names of every registered logger, sorted.
    #[must_use]
    pub fn logger_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.loggers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered loggers.
    #[must_use]
    pub fn logger_count(&self) -> usize {
        self.shared.loggers.read().len()
    }

    // ============ Bulk Operations ============

    /// Flushes every registered logger.
    pub fn flush_all(&self) {
        self.shared.flush_all();
    }

    /// Sets the level of every registered logger.
    pub fn set_global_level(&self, level: LogLevel) {
        for logger in self.shared.snapshot() {
            logger.set_level(level);
        }
        info!(%level, "set global log level");
    }

    /// Aggregates counters across all loggers.
    #[must_use]
    pub fn global_stats(&self) -> GlobalStats {
        let loggers = self.shared.loggers.read();
        let mut stats = GlobalStats {
            total_loggers: loggers.len(),
            ..GlobalStats::default()
        };
        let mut rate_sum = 0.0;
        for logger in loggers.values() {
            stats.total_logs += logger.stats().total_logs();
            stats.total_errors += logger.stats().failed_logs();
            rate_sum += logger.stats().logs_per_second();
        }
        if stats.total_loggers > 0 {
            stats.avg_logs_per_second = rate_sum / stats.total_loggers as f64;
        }
        stats
    }

    /// Runs one maintenance sweep (archive, then flush) on the calling thread.
    pub fn run_maintenance(&self) {
        self.shared.run_maintenance();
    }

    // ============ Components ============

    /// The shared event bus every managed logger publishes to.
    #[must_use]
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.shared.event_bus
    }

    /// The archiver, if an archive directory was configured.
    #[must_use]
    pub fn archiver(&self) -> Option<&Arc<Archiver>> {
        self.shared.archiver.as_ref()
    }

    // ============ Lifecycle ============

    /// Checks if [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stops maintenance, flushes and clears the registry.
    ///
    /// The maintenance thread is joined before the final flush. Calls after
    /// the first are no-ops.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.stop.stop();
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                warn!("maintenance thread panicked");
            }
        }

        self.shared.flush_all();
        let removed: Vec<Arc<Logger>> = self.shared.loggers.write().drain().map(|(_, l)| l).collect();
        for logger in &removed {
            logger.emit(LogEvent::LoggerDestroyed, None);
        }

        info!(loggers = removed.len(), "logger manager shut down");
    }
}

impl Drop for LoggerManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn duplicate_name(name: &str) -> LoggerError {
    LoggerError::invalid_config(format!("logger name already exists: {name}"))
}
