//! Per-name logger and its decision pipeline.
//!
//! Every call runs the same stages: level gate, sampling, filtering,
//! enrichment, dispatch to sinks, bookkeeping. Failures in filtering or
//! dispatch are counted and announced on the event bus; they never reach
//! the caller.

use std::error::Error as StdError;
use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::RwLock;
use serde::Serialize;

use crate::config::LoggerConfig;
use crate::error::{LoggerError, Result};
use crate::event::{EventBus, EventPayload, LogEvent};
use crate::filter::{Filter, FilterChain};
use crate::sampler::{LogSampler, Sampler, SamplingStrategy};
use crate::sink::Sink;
use crate::types::{LogContext, LogLevel, LogStats, LogType};

/// Builder for [`Logger`].
pub struct LoggerBuilder {
    config: LoggerConfig,
    sinks: Vec<Arc<dyn Sink>>,
    event_bus: Option<Arc<EventBus>>,
    sampler: Option<Arc<dyn Sampler>>,
    context: LogContext,
    log_type: LogType,
}

impl fmt::Debug for LoggerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerBuilder")
            .field("config", &self.config)
            .field("sinks", &self.sinks.len())
            .field("event_bus", &self.event_bus.is_some())
            .finish_non_exhaustive()
    }
}

impl LoggerBuilder {
    /// Attaches a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Attaches several sinks.
    #[must_use]
    pub fn with_sinks(mut self, sinks: impl IntoIterator<Item = Arc<dyn Sink>>) -> Self {
        self.sinks.extend(sinks);
        self
    }

    /// Publishes lifecycle events to `bus`.
    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Replaces the default (keep-everything) sampler.
    #[must_use]
    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Sets the initial attached context.
    #[must_use]
    pub fn with_context(mut self, context: LogContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the initial log type.
    #[must_use]
    pub const fn with_log_type(mut self, log_type: LogType) -> Self {
        self.log_type = log_type;
        self
    }

    /// Validates the config and builds the logger.
    ///
    /// Emits [`LogEvent::LoggerCreated`] when an event bus is attached.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfig`] if the config is invalid.
    pub fn build(self) -> Result<Logger> {
        let logger = self.build_unannounced()?;
        logger.announce_created();
        Ok(logger)
    }

    /// Builds without emitting [`LogEvent::LoggerCreated`]; the caller
    /// announces the logger once it is registered.
    pub(crate) fn build_unannounced(self) -> Result<Logger> {
        self.config.validate()?;

        let logger = Logger {
            name: self.config.name.clone(),
            level: AtomicU8::new(self.config.level as u8),
            log_type: AtomicU8::new(self.log_type.to_u8()),
            context: RwLock::new(self.context),
            filters: FilterChain::new(),
            sampler: self
                .sampler
                .unwrap_or_else(|| Arc::new(LogSampler::default())),
            sinks: RwLock::new(self.sinks),
            stats: LogStats::new(),
            event_bus: self.event_bus,
            config: self.config,
        };
        Ok(logger)
    }
}

/// A named logger.
///
/// All methods take `&self`; a logger is normally shared as `Arc<Logger>`.
pub struct Logger {
    name: String,
    config: LoggerConfig,
    level: AtomicU8,
    log_type: AtomicU8,
    context: RwLock<LogContext>,
    filters: FilterChain,
    sampler: Arc<dyn Sampler>,
    sinks: RwLock<Vec<Arc<dyn Sink>>>,
    stats: LogStats,
    event_bus: Option<Arc<EventBus>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("log_type", &self.log_type())
            .field("filters", &self.filters.filter_count())
            .field("sinks", &self.sink_count())
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Starts building a logger from `config`.
    #[must_use]
    pub fn builder(config: LoggerConfig) -> LoggerBuilder {
        LoggerBuilder {
            config,
            sinks: Vec::new(),
            event_bus: None,
            sampler: None,
            context: LogContext::default(),
            log_type: LogType::General,
        }
    }

    /// Builds a logger with no sinks and no event bus.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfig`] if the config is invalid.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    // ========== Logging ==========

    /// Logs `message` at `level` with the attached context.
    pub fn log(&self, level: LogLevel, message: &str) {
        self.process(level, message, None);
    }

    /// Logs with a per-call context merged over the attached one.
    ///
    /// Non-empty per-call fields win; the merged context is used for both
    /// filtering and the rendered prefix.
    pub fn log_with_context(&self, level: LogLevel, context: &LogContext, message: &str) {
        self.process(level, message, Some(context));
    }

    /// Logs a value rendered as compact JSON.
    ///
    /// A value that fails to serialize counts as a failed log.
    pub fn log_structured<T: Serialize + ?Sized>(&self, level: LogLevel, data: &T) {
        if !self.is_enabled(level) {
            return;
        }
        match serde_json::to_string(data) {
            Ok(json) => self.process(level, &json, None),
            Err(e) => self.record_failure(&LoggerError::from(e)),
        }
    }

    /// Logs only when `condition` holds.
    pub fn log_if(&self, condition: bool, level: LogLevel, message: &str) {
        if condition {
            self.log(level, message);
        }
    }

    /// Logs an error and its whole `source()` chain.
    ///
    /// Renders as `"{context}: {error} (caused by: {source}) ..."`; the
    /// `"{context}: "` part is omitted when `context` is empty.
    pub fn log_exception(&self, level: LogLevel, error: &dyn StdError, context: &str) {
        if !self.is_enabled(level) {
            return;
        }
        self.log(level, &render_error_chain(error, context));
    }

    /// Logs at [`LogLevel::Trace`].
    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    /// Logs at [`LogLevel::Debug`].
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Logs at [`LogLevel::Info`].
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Logs at [`LogLevel::Warn`].
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Logs at [`LogLevel::Error`].
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Logs at [`LogLevel::Critical`].
    pub fn critical(&self, message: &str) {
        self.log(LogLevel::Critical, message);
    }

    /// Checks whether a record at `level` passes the level gate.
    #[must_use]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        let configured = self.level();
        configured != LogLevel::Off && level >= configured
    }

    // ========== Configuration ==========

    /// Logger name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Config the logger was built from.
    #[must_use]
    pub const fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Current minimum level.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Changes the minimum level.
    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Current log type tag.
    #[must_use]
    pub fn log_type(&self) -> LogType {
        LogType::from_u8(self.log_type.load(Ordering::Relaxed))
    }

    /// Changes the log type tag; non-general types prefix each message.
    pub fn set_log_type(&self, log_type: LogType) {
        self.log_type.store(log_type.to_u8(), Ordering::Relaxed);
    }

    /// Appends a filter.
    pub fn add_filter(&self, filter: Arc<dyn Filter>) {
        self.filters.add_filter(filter);
    }

    /// Removes every filter.
    pub fn clear_filters(&self) {
        self.filters.clear_filters();
    }

    /// The logger's filter chain.
    #[must_use]
    pub const fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// Changes the sampling strategy and rate.
    pub fn set_sampling(&self, strategy: SamplingStrategy, rate: f64) {
        self.sampler.set_strategy(strategy, rate);
    }

    /// The logger's sampler.
    #[must_use]
    pub fn sampler(&self) -> &dyn Sampler {
        self.sampler.as_ref()
    }

    /// Replaces the attached context.
    pub fn set_context(&self, context: LogContext) {
        *self.context.write() = context;
    }

    /// Clears the attached context.
    pub fn clear_context(&self) {
        *self.context.write() = LogContext::default();
    }

    /// Returns a copy of the attached context.
    #[must_use]
    pub fn context(&self) -> LogContext {
        self.context.read().clone()
    }

    /// Attaches another sink and emits [`LogEvent::SinkAdded`].
    pub fn add_sink(&self, sink: Arc<dyn Sink>) {
        let sink_name = sink.name().to_string();
        self.sinks.write().push(sink);
        tracing::debug!(logger = %self.name, sink = %sink_name, "sink added");
        self.emit(LogEvent::SinkAdded, Some(sink_name));
    }

    /// Number of attached sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.read().len()
    }

    /// Pipeline counters.
    #[must_use]
    pub const fn stats(&self) -> &LogStats {
        &self.stats
    }

    /// Flushes every sink and emits [`LogEvent::FlushTriggered`].
    ///
    /// A failing sink is reported through [`LogEvent::ErrorOccurred`] and
    /// does not stop the remaining sinks from flushing.
    pub fn flush(&self) {
        for sink in self.sink_snapshot() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.flush()));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("flush of sink {} failed: {e}", sink.name()),
                Err(_) => format!("sink {} panicked during flush", sink.name()),
            };
            tracing::warn!(logger = %self.name, %reason, "sink flush failed");
            self.emit(LogEvent::ErrorOccurred, Some(reason));
        }
        self.emit(LogEvent::FlushTriggered, None);
    }

    // ========== Pipeline ==========

    fn process(&self, level: LogLevel, message: &str, call_context: Option<&LogContext>) {
        if !self.is_enabled(level) {
            return;
        }

        if !self.sampler.should_sample() {
            self.stats.record_sampled();
            return;
        }

        let context = {
            let attached = self.context.read();
            match call_context {
                Some(call) => attached.merge(call),
                None => attached.clone(),
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| {
            self.filters.should_log(message, level, &context)
        })) {
            Ok(true) => {}
            Ok(false) => {
                self.stats.record_filtered();
                return;
            }
            Err(_) => {
                self.record_failure(&"filter panicked");
                return;
            }
        }

        let line = self.enrich(message, &context);

        match self.dispatch(level, &line) {
            Ok(()) => self.stats.record_total(),
            Err(reason) => self.record_failure(&reason),
        }
    }

    fn enrich(&self, message: &str, context: &LogContext) -> String {
        let log_type = self.log_type();
        let prefix = context.render_prefix();
        if log_type == LogType::General && prefix.is_none() {
            return message.to_string();
        }

        let mut line = String::with_capacity(message.len() + 64);
        if log_type != LogType::General {
            let _ = write!(line, "[{log_type}] ");
        }
        if let Some(prefix) = prefix {
            line.push_str(&prefix);
            line.push(' ');
        }
        line.push_str(message);
        line
    }

    /// Writes to every sink; the first failure is reported after all were tried.
    fn dispatch(&self, level: LogLevel, line: &str) -> std::result::Result<(), String> {
        let mut failure = None;
        for sink in self.sink_snapshot() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.write(level, line)));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("write to sink {} failed: {e}", sink.name()),
                Err(_) => format!("sink {} panicked during write", sink.name()),
            };
            failure.get_or_insert(reason);
        }
        failure.map_or(Ok(()), Err)
    }

    fn sink_snapshot(&self) -> Vec<Arc<dyn Sink>> {
        self.sinks.read().clone()
    }

    fn record_failure(&self, reason: &dyn fmt::Display) {
        self.stats.record_failed();
        let reason = reason.to_string();
        tracing::warn!(logger = %self.name, %reason, "log call failed");
        self.emit(LogEvent::ErrorOccurred, Some(reason));
    }

    pub(crate) fn announce_created(&self) {
        self.emit(LogEvent::LoggerCreated, None);
    }

    pub(crate) fn emit(&self, event: LogEvent, detail: Option<String>) {
        if let Some(bus) = &self.event_bus {
            let payload = EventPayload::new(event, &self.name);
            bus.emit(match detail {
                Some(detail) => payload.with_detail(detail),
                None => payload,
            });
        }
    }
}

/// Renders `error` and every `source()` below it.
fn render_error_chain(error: &dyn StdError, context: &str) -> String {
    let mut out = if context.is_empty() {
        error.to_string()
    } else {
        format!("{context}: {error}")
    };
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(out, " (caused by: {cause})");
        source = cause.source();
    }
    out
}
