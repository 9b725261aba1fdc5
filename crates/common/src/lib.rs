use std::time::Instant;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod diagnostics;
pub mod drive;
pub mod joystick;
pub mod metrics;
pub mod terminal;

pub use config::{ConfigError, ConsoleConfig, TransportConfig, TransportKind};
pub use diagnostics::{DiagnosticsSnapshot, SharedDiagnostics};
pub use drive::DriveCommand;
pub use joystick::{Joystick, JoystickPosition, SurfaceRect};
pub use metrics::{RoundTrip, TimingAggregator, TimingRecorder, TimingSnapshot};
pub use terminal::{AutoScroll, LogCategory, LogEntry, TerminalLog};

/// Identifier assigned to an outbound message when its send is attempted.
pub type MessageId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub id: MessageId,
    pub payload: String,
    pub sent_at: Instant,
}

/// Severity attached to transport diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
