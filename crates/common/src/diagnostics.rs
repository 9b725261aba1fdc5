use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct SharedDiagnostics {
    pub dispatch_failures: AtomicU64,
    pub echo_timeouts: AtomicU64,
    pub unmatched_arrivals: AtomicU64,
    pub streams_started: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DiagnosticsSnapshot {
    pub dispatch_failures: u64,
    pub echo_timeouts: u64,
    pub unmatched_arrivals: u64,
    pub streams_started: u64,
}

impl SharedDiagnostics {
    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_echo_timeout(&self) {
        self.echo_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// An inbound message arrived with no send outstanding.
    pub fn record_unmatched_arrival(&self) {
        self.unmatched_arrivals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_started(&self) {
        self.streams_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            echo_timeouts: self.echo_timeouts.load(Ordering::Relaxed),
            unmatched_arrivals: self.unmatched_arrivals.load(Ordering::Relaxed),
            streams_started: self.streams_started.load(Ordering::Relaxed),
        }
    }
}
