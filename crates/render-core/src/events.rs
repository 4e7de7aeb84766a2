//! Structured engine events.
//!
//! The engine reports failures (and notable state changes) as structured
//! events through an [`EventSink`] rather than depending on any UI framework.
//! Sinks are invoked synchronously; an embedding application decides whether
//! to display, log, or queue them.

use std::fmt;

/// Event severity, mirrored into the log level by [`LogSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One reported engine event.
#[derive(Clone, Debug)]
pub struct EngineEvent {
    pub message: String,
    pub severity: Severity,
    /// Optional presentation context (e.g. a window identifier) passed
    /// through untouched for the embedding application.
    pub context: Option<String>,
}

impl EngineEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            context: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }
}

/// Destination for engine events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Sink that forwards events to the `log` crate.
#[derive(Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: EngineEvent) {
        match event.severity {
            Severity::Info => log::info!(target: "engine", "{}", event.message),
            Severity::Warning => log::warn!(target: "engine", "{}", event.message),
            Severity::Error => log::error!(target: "engine", "{}", event.message),
        }
    }
}

/// Sink that queues events on an unbounded channel, decoupling the engine
/// from whoever presents them.
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<EngineEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving half for the consumer.
    pub fn new() -> (Self, crossbeam_channel::Receiver<EngineEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        // A disconnected receiver means nobody is listening; drop silently.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_delivers_events_in_order() {
        let (sink, rx) = ChannelSink::new();
        sink.emit(EngineEvent::error("buffer 'image' cannot be created"));
        sink.emit(EngineEvent::warning("capability query returned 0"));

        let first = rx.recv().unwrap();
        assert_eq!(first.severity, Severity::Error);
        assert!(first.message.contains("image"));

        let second = rx.recv().unwrap();
        assert_eq!(second.severity, Severity::Warning);
        assert!(second.context.is_none());
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(EngineEvent::error("nobody listening"));
    }
}
