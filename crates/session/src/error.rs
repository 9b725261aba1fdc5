use thiserror::Error;

/// Failures reported by a link implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device is not connected")]
    NotConnected,
    #[error("connection request cancelled")]
    Cancelled,
    #[error("link rejected the message: {0}")]
    Rejected(String),
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("send failed: {0}")]
    Dispatch(#[source] TransportError),
    #[error("Echo timeout after {timeout_ms} ms")]
    EchoTimeout { timeout_ms: u64 },
    #[error("echo wait replaced by a newer registration")]
    EchoSuperseded,
    #[error("connect failed: {0}")]
    Connect(#[source] TransportError),
    #[error("disconnect failed: {0}")]
    Disconnect(#[source] TransportError),
    #[error("cannot encode joystick position: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("dispatcher task is not running")]
    DispatcherClosed,
}
