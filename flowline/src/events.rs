//! Event sink trait and implementations.
//!
//! The engine emits lifecycle events (`pipeline.started`, `step.failed`, ...)
//! through a sink. Sinks are the extension point for metrics and tracing
//! backends; the core ships only a no-op sink, a tracing-backed logging sink,
//! and a bounded buffering wrapper.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};

/// Trait for sinks that receive engine lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);

    /// Tries to emit an event without blocking.
    ///
    /// Must never fail loudly; delivery problems are logged and suppressed.
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// A sink that discards all events. The default when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// A sink that logs events through the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: &Option<serde_json::Value>) {
        match self.level {
            Level::DEBUG => {
                debug!(event_type = %event_type, event_data = ?data, "Event: {}", event_type);
            }
            _ => {
                info!(event_type = %event_type, event_data = ?data, "Event: {}", event_type);
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log_event(event_type, &data);
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log_event(event_type, &data);
    }
}

struct EventMessage {
    event_type: String,
    data: Option<serde_json::Value>,
}

/// A sink that queues events on a bounded channel in front of a downstream
/// sink.
///
/// Events are dropped rather than blocking the engine when the queue is
/// full. Drops are counted and logged.
pub struct BufferedEventSink {
    tx: mpsc::Sender<EventMessage>,
    dropped: Arc<AtomicU64>,
}

impl BufferedEventSink {
    /// Creates a buffered sink forwarding to `downstream`.
    ///
    /// `buffer_size` bounds the in-flight queue; the forwarding task runs
    /// until all senders are dropped.
    #[must_use]
    pub fn new(downstream: Arc<dyn EventSink>, buffer_size: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<EventMessage>(buffer_size.max(1));
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                downstream.emit(&message.event_type, message.data).await;
            }
        });

        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the number of events dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for BufferedEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedEventSink")
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[async_trait]
impl EventSink for BufferedEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        let message = EventMessage {
            event_type: event_type.to_string(),
            data,
        };
        if self.tx.send(message).await.is_err() {
            warn!(event_type = %event_type, "event sink worker stopped; event dropped");
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        let message = EventMessage {
            event_type: event_type.to_string(),
            data,
        };
        if self.tx.try_send(message).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
