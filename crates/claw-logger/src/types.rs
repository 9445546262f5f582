//! Core types for the logging control plane.
//!
//! This module provides:
//! - [`LogLevel`] — Ordered severity levels, including `Off`
//! - [`LogType`] — Category tag attached to a logger
//! - [`LogContext`] — Structured metadata rendered into the message prefix
//! - [`FieldValue`] — Dynamic value stored in custom context fields
//! - [`LogStats`] — Per-logger atomic counters

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::LoggerError;

/// Log severity levels, ordered from most to least verbose.
///
/// `Off` sorts above every real level; a logger configured at `Off`
/// rejects everything.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed debugging information
    Trace = 0,
    /// Debugging information
    Debug = 1,
    /// General information
    #[default]
    Info = 2,
    /// Warning conditions
    Warn = 3,
    /// Error conditions
    Error = 4,
    /// Unrecoverable conditions
    Critical = 5,
    /// Logging disabled
    Off = 6,
}

impl LogLevel {
    /// All levels in ascending order.
    pub const ALL: [Self; 7] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Critical,
        Self::Off,
    ];

    /// Returns true if this level is at least as severe as the given level.
    #[must_use]
    pub fn is_at_least(&self, level: Self) -> bool {
        *self >= level
    }

    /// Returns the string representation of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Off => "off",
        }
    }

    /// Converts a raw discriminant back into a level. Out-of-range values map to `Off`.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Trace,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warn,
            4 => Self::Error,
            5 => Self::Critical,
            _ => Self::Off,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" | "t" => Ok(Self::Trace),
            "debug" | "d" => Ok(Self::Debug),
            "info" | "i" => Ok(Self::Info),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "error" | "err" | "e" => Ok(Self::Error),
            "critical" | "crit" | "c" | "fatal" => Ok(Self::Critical),
            "off" => Ok(Self::Off),
            other => Err(LoggerError::invalid_config(format!(
                "unknown log level: {other}"
            ))),
        }
    }
}

/// Category tag for a logger's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// Ordinary application output; rendered without a tag.
    #[default]
    General,
    /// Security-relevant events
    Security,
    /// Timing and throughput measurements
    Performance,
    /// Business-level events
    Business,
    /// Audit trail entries
    Audit,
    /// Host/system events
    System,
}

impl LogType {
    /// Returns the string representation of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Business => "business",
            Self::Audit => "audit",
            Self::System => "system",
        }
    }

    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::General => 0,
            Self::Security => 1,
            Self::Performance => 2,
            Self::Business => 3,
            Self::Audit => 4,
            Self::System => 5,
        }
    }

    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Security,
            2 => Self::Performance,
            3 => Self::Business,
            4 => Self::Audit,
            5 => Self::System,
            _ => Self::General,
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dynamically typed custom context value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean value
    Bool(bool),
    /// Signed integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Structured metadata attached to a logger or to a single call.
///
/// Well-known fields are empty when `None` or `Some("")`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogContext {
    /// Acting user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Distributed trace identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Request identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Open-ended additional fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, FieldValue>,
}

fn field_is_set(field: Option<&String>) -> bool {
    field.is_some_and(|v| !v.is_empty())
}

fn pick(mine: Option<&String>, theirs: Option<&String>) -> Option<String> {
    if field_is_set(theirs) {
        theirs.cloned()
    } else {
        mine.cloned()
    }
}

impl LogContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user ID.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the session ID.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the trace ID.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Sets the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Adds a custom field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.custom_fields.insert(key.into(), value.into());
        self
    }

    /// Returns the user ID if it is set and non-empty.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|v| !v.is_empty())
    }

    /// Returns true if no well-known field is set and there are no custom fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !field_is_set(self.user_id.as_ref())
            && !field_is_set(self.session_id.as_ref())
            && !field_is_set(self.trace_id.as_ref())
            && !field_is_set(self.request_id.as_ref())
            && self.custom_fields.is_empty()
    }

    /// Produces a new context where `other`'s non-empty fields win.
    ///
    /// Custom fields are unioned, with `other`'s values replacing ours on
    /// key collisions.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut custom_fields = self.custom_fields.clone();
        for (key, value) in &other.custom_fields {
            custom_fields.insert(key.clone(), value.clone());
        }

        Self {
            user_id: pick(self.user_id.as_ref(), other.user_id.as_ref()),
            session_id: pick(self.session_id.as_ref(), other.session_id.as_ref()),
            trace_id: pick(self.trace_id.as_ref(), other.trace_id.as_ref()),
            request_id: pick(self.request_id.as_ref(), other.request_id.as_ref()),
            custom_fields,
        }
    }

    /// Renders the `[user=… session=… trace=… request=…]` prefix.
    ///
    /// Only non-empty well-known fields appear, in that fixed order.
    /// Returns `None` when none of them is set.
    #[must_use]
    pub fn render_prefix(&self) -> Option<String> {
        let parts: Vec<String> = [
            ("user", &self.user_id),
            ("session", &self.session_id),
            ("trace", &self.trace_id),
            ("request", &self.request_id),
        ]
        .into_iter()
        .filter(|(_, value)| field_is_set(value.as_ref()))
        .map(|(label, value)| format!("{label}={}", value.as_deref().unwrap_or_default()))
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(format!("[{}]", parts.join(" ")))
        }
    }
}

/// Atomic per-logger counters.
#[derive(Debug)]
pub struct LogStats {
    total_logs: AtomicU64,
    filtered_logs: AtomicU64,
    sampled_logs: AtomicU64,
    failed_logs: AtomicU64,
    started: Instant,
}

/// Point-in-time copy of [`LogStats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogStatsSnapshot {
    /// Records successfully dispatched
    pub total_logs: u64,
    /// Records rejected by the filter chain
    pub filtered_logs: u64,
    /// Records dropped by the sampler
    pub sampled_logs: u64,
    /// Records that failed during filtering, enrichment or dispatch
    pub failed_logs: u64,
    /// Time since the logger was created
    pub uptime: Duration,
    /// `total_logs / uptime` in seconds, 0 when no time has elapsed
    pub logs_per_second: f64,
}

impl Default for LogStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStats {
    /// Creates zeroed counters starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_logs: AtomicU64::new(0),
            filtered_logs: AtomicU64::new(0),
            sampled_logs: AtomicU64::new(0),
            failed_logs: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub(crate) fn record_total(&self) {
        self.total_logs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.filtered_logs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sampled(&self) {
        self.sampled_logs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed_logs.fetch_add(1, Ordering::Relaxed);
    }

    /// Records successfully dispatched.
    #[must_use]
    pub fn total_logs(&self) -> u64 {
        self.total_logs.load(Ordering::Relaxed)
    }

    /// Records that failed.
    #[must_use]
    pub fn failed_logs(&self) -> u64 {
        self.failed_logs.load(Ordering::Relaxed)
    }

    /// Average dispatch rate since creation.
    #[must_use]
    pub fn logs_per_second(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_logs() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Takes a consistent-enough snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> LogStatsSnapshot {
        let uptime = self.started.elapsed();
        let total_logs = self.total_logs();
        let secs = uptime.as_secs_f64();
        LogStatsSnapshot {
            total_logs,
            filtered_logs: self.filtered_logs.load(Ordering::Relaxed),
            sampled_logs: self.sampled_logs.load(Ordering::Relaxed),
            failed_logs: self.failed_logs(),
            uptime,
            logs_per_second: if secs > 0.0 {
                total_logs as f64 / secs
            } else {
                0.0
            },
        }
    }
}
