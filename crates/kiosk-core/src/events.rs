//! Structured event sink consumed by UI and log collaborators.
//!
//! The dispense flow reports every notable transition and device call as a
//! [`KioskEvent`]. Where the events end up is decided by the [`EventSink`]
//! handed to the orchestrator at construction:
//!
//! - [`TracingSink`] forwards to `tracing`, so events share the process log.
//! - [`MemorySink`] retains the most recent events for a diagnostic panel.
//! - [`FanoutSink`] duplicates each event to several sinks.
//!
//! # Example
//!
//! ```
//! use kiosk_core::events::{EventLevel, EventSink, KioskEvent, MemorySink};
//!
//! let sink = MemorySink::new(10);
//! sink.emit(KioskEvent::success("dispense", "Card released"));
//!
//! let events = sink.snapshot();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].level, EventLevel::Success);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::MAX_RETAINED_EVENTS;

/// Severity of a kiosk event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Success,
    Warn,
    Error,
    Debug,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Debug => "debug",
        };
        write!(f, "{}", name)
    }
}

/// One entry delivered to an [`EventSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KioskEvent {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,

    /// Emitting area, e.g. `"state"`, `"network"`, `"usb"`, `"dispense"`.
    pub category: String,

    pub message: String,

    /// Optional structured payload.
    pub data: Option<serde_json::Value>,
}

impl KioskEvent {
    /// Create an event stamped with the current time.
    pub fn new(level: EventLevel, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            category: category.into(),
            message: message.into(),
            data: None,
        }
    }

    pub fn info(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, category, message)
    }

    pub fn success(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Success, category, message)
    }

    pub fn warn(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warn, category, message)
    }

    pub fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, category, message)
    }

    pub fn debug(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Debug, category, message)
    }

    /// Attach a structured payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Receiver of kiosk events.
///
/// Implementations must not block: sinks are called synchronously from the
/// dispense flow.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: KioskEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: KioskEvent) {
        (**self).emit(event)
    }
}

/// Sink that writes every event to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: KioskEvent) {
        let data = event
            .data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();

        match event.level {
            EventLevel::Info => {
                tracing::info!(category = %event.category, data = %data, "{}", event.message)
            }
            EventLevel::Success => tracing::info!(
                category = %event.category,
                outcome = "success",
                data = %data,
                "{}",
                event.message
            ),
            EventLevel::Warn => {
                tracing::warn!(category = %event.category, data = %data, "{}", event.message)
            }
            EventLevel::Error => {
                tracing::error!(category = %event.category, data = %data, "{}", event.message)
            }
            EventLevel::Debug => {
                tracing::debug!(category = %event.category, data = %data, "{}", event.message)
            }
        }
    }
}

/// Ring buffer of the most recent events.
///
/// Cloning yields another handle to the same buffer.
#[derive(Debug, Clone)]
pub struct MemorySink {
    capacity: usize,
    events: Arc<Mutex<VecDeque<KioskEvent>>>,
}

impl MemorySink {
    /// Create a sink retaining at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Copy of the retained events, oldest first.
    pub fn snapshot(&self) -> Vec<KioskEvent> {
        self.lock().iter().cloned().collect()
    }

    /// Retained events of a given level, oldest first.
    pub fn with_level(&self, level: EventLevel) -> Vec<KioskEvent> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<KioskEvent>> {
        // A panicking emitter must not take the diagnostics down with it.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(MAX_RETAINED_EVENTS)
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: KioskEvent) {
        let mut events = self.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that forwards each event to every inner sink, in insertion order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink (builder style).
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: KioskEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
