//! In-process publish/subscribe for logger lifecycle notifications.
//!
//! This module provides:
//! - [`LogEvent`] — The lifecycle events that can be observed
//! - [`EventPayload`] — What subscribers receive
//! - [`EventBus`] — Ordered callback delivery with panic isolation
//! - [`EventStream`] — Async stream of every emitted payload

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, ready};

use chrono::{DateTime, Utc};
use futures::Stream;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

/// Lifecycle events published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// A logger was constructed.
    LoggerCreated,
    /// A logger was removed from the registry.
    LoggerDestroyed,
    /// A sink was attached to a logger.
    SinkAdded,
    /// A record failed inside a logger pipeline.
    ErrorOccurred,
    /// Loggers were flushed.
    FlushTriggered,
}

impl LogEvent {
    /// Returns the string representation of this event.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LoggerCreated => "logger_created",
            Self::LoggerDestroyed => "logger_destroyed",
            Self::SinkAdded => "sink_added",
            Self::ErrorOccurred => "error_occurred",
            Self::FlushTriggered => "flush_triggered",
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Which event fired
    pub event: LogEvent,
    /// Logger (or component) the event concerns
    pub source: String,
    /// Free-form detail, e.g. an error description
    pub detail: Option<String>,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

impl EventPayload {
    /// Creates a payload without detail.
    #[must_use]
    pub fn new(event: LogEvent, source: impl Into<String>) -> Self {
        Self {
            event,
            source: source.into(),
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches detail text.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Identifier returned by [`EventBus::subscribe`]. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// A subscriber callback.
pub type EventCallback = Arc<dyn Fn(&EventPayload) + Send + Sync>;

const STREAM_BUFFER_SIZE: usize = 256;

/// Thread-safe event bus.
///
/// Subscriber-list mutation takes the exclusive lock; emission takes the
/// shared lock only long enough to snapshot the callbacks, then invokes
/// them in subscription order. A panicking callback is contained and does
/// not prevent later callbacks from running.
pub struct EventBus {
    subscribers: RwLock<HashMap<LogEvent, Vec<(SubscriptionId, EventCallback)>>>,
    next_id: AtomicU64,
    broadcast: broadcast::Sender<EventPayload>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.subscribers.read();
        let counts: HashMap<&LogEvent, usize> =
            subscribers.iter().map(|(k, v)| (k, v.len())).collect();
        f.debug_struct("EventBus")
            .field("subscribers", &counts)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (broadcast, _) = broadcast::channel(STREAM_BUFFER_SIZE);
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            broadcast,
        }
    }

    /// Registers `callback` for `event` and returns its subscription ID.
    pub fn subscribe<F>(&self, event: LogEvent, callback: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(event)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes a subscription. Returns false if it was not registered for `event`.
    pub fn unsubscribe(&self, event: LogEvent, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(list) = subscribers.get_mut(&event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub_id, _)| *sub_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(&event);
        }
        removed
    }

    /// Delivers `payload` to every subscriber of its event, in subscription order.
    pub fn emit(&self, payload: EventPayload) {
        let callbacks: Vec<(SubscriptionId, EventCallback)> = self
            .subscribers
            .read()
            .get(&payload.event)
            .cloned()
            .unwrap_or_default();

        for (id, callback) in callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&payload)));
            if outcome.is_err() {
                warn!(
                    event = %payload.event,
                    subscription = id.0,
                    "event subscriber panicked; continuing"
                );
            }
        }

        // No receivers is fine
        let _ = self.broadcast.send(payload);
    }

    /// Number of subscribers for `event`.
    #[must_use]
    pub fn subscriber_count(&self, event: LogEvent) -> usize {
        self.subscribers.read().get(&event).map_or(0, Vec::len)
    }

    /// Drops every subscription. IDs keep increasing afterwards.
    pub fn clear_all_subscriptions(&self) {
        self.subscribers.write().clear();
    }

    /// Returns a stream receiving every payload emitted from now on.
    #[must_use]
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.broadcast.subscribe())
    }
}

/// Async stream of emitted event payloads.
///
/// Payloads dropped because the consumer lagged are skipped.
pub struct EventStream {
    inner: BroadcastStream<EventPayload>,
    closed: bool,
}

impl EventStream {
    fn new(receiver: broadcast::Receiver<EventPayload>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            closed: false,
        }
    }

    /// Closes the stream.
    pub const fn close(&mut self) {
        self.closed = true;
    }

    /// Returns true if the stream is closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Stream for EventStream {
    type Item = EventPayload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.closed {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(payload)) => return Poll::Ready(Some(payload)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(skipped, "event stream lagged");
                }
                None => self.closed = true,
            }
        }
    }
}
