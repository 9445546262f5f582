//! # claw-logger
//!
//! Structured logging control plane for Clawbernetes services.
//!
//! This crate decides whether and how each log call is recorded, and manages
//! many independent named loggers:
//!
//! - [`LoggerManager`] — Process-wide registry with background maintenance
//! - [`Logger`] — Per-name pipeline: level gate, sampling, filtering,
//!   context enrichment, dispatch to sinks
//! - [`FilterChain`] — Ordered accept/reject predicates
//! - [`LogSampler`] — Lock-free uniform, adaptive and burst sampling
//! - [`EventBus`] — Lifecycle notifications (callbacks or an async stream)
//! - [`Archiver`] — Age, count and size retention over rotated log files
//! - [`Sink`] — Output backends (console, file, memory, tracing, async)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use claw_logger::{LogContext, LogLevel, LoggerConfig, LoggerManager, ManagerConfig, MemorySink};
//!
//! let manager = LoggerManager::init(ManagerConfig::default()).unwrap();
//! let logger = manager
//!     .create_logger(LoggerConfig::new("api").without_outputs())
//!     .unwrap();
//!
//! let memory = Arc::new(MemorySink::new("capture"));
//! logger.add_sink(memory.clone());
//! logger.set_context(LogContext::new().with_user_id("u42"));
//!
//! logger.debug("below the default level");
//! logger.info("request served");
//!
//! assert_eq!(memory.messages(), vec!["[user=u42] request served".to_string()]);
//! assert_eq!(logger.stats().total_logs(), 1);
//! manager.shutdown();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod archive;
pub mod compress;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod logger;
pub mod manager;
pub mod sampler;
pub mod sink;
pub mod types;

// Re-export main types
pub use archive::{ArchiveReport, ArchiveStats, Archiver};
pub use compress::{Compressor, ZstdCompressor};
pub use config::{ArchiveConfig, CompressFormat, FileConfig, LoggerConfig, ManagerConfig};
pub use error::{ErrorKind, LoggerError, Result};
pub use event::{EventBus, EventCallback, EventPayload, EventStream, LogEvent, SubscriptionId};
pub use filter::{
    DuplicateFilter, Filter, FilterChain, FnFilter, KeywordFilter, LevelFilter, RateLimitFilter,
    RegexFilter, SamplingFilter, TimeWindowFilter, UserFilter,
};
pub use logger::{Logger, LoggerBuilder};
pub use manager::{GlobalStats, LoggerManager};
pub use sampler::{LogSampler, Sampler, SamplingStrategy};
pub use sink::{AsyncSink, ConsoleSink, FileSink, MemorySink, Sink, TracingSink};
pub use types::{FieldValue, LogContext, LogLevel, LogStats, LogStatsSnapshot, LogType};
