use std::future::Future;

use common::LogLevel;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Notifications pushed by a link: inbound messages and its own diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Received(String),
    Log {
        level: LogLevel,
        source: &'static str,
        message: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// A message link to the rover.
///
/// Implementations serialize bytes, not calls: nothing stops a second `send`
/// before the first settles, and replies are not tied to requests. Inbound
/// messages and diagnostics are delivered on the [`EventSender`] the link was
/// built with, once per message and in arrival order.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Idempotent.
    fn disconnect(&self) -> Result<(), TransportError>;

    fn send(&self, payload: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn device_name(&self) -> Option<String>;
}

pub(crate) fn emit_log(events: &EventSender, level: LogLevel, source: &'static str, message: String) {
    // A closed channel only means nobody is listening any more.
    let _ = events.send(TransportEvent::Log {
        level,
        source,
        message,
    });
}
