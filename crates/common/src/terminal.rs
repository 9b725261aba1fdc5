use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Plain,
    Incoming,
    Outgoing,
    Error,
    Timing,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Plain => "plain",
            LogCategory::Incoming => "incoming",
            LogCategory::Outgoing => "outgoing",
            LogCategory::Error => "error",
            LogCategory::Timing => "timing",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the console terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub category: LogCategory,
    pub message: String,
}

struct LogState {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

/// Thread-safe terminal buffer keeping the most recent `max_size` lines.
#[derive(Clone)]
pub struct TerminalLog {
    state: Arc<Mutex<LogState>>,
    max_size: usize,
    mirror_to_tracing: bool,
}

impl TerminalLog {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            state: Arc::new(Mutex::new(LogState {
                entries: VecDeque::with_capacity(max_size.min(4096)),
                next_seq: 0,
            })),
            max_size,
            mirror_to_tracing: true,
        }
    }

    /// When enabled (the default) every line is also emitted as a tracing event.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.mirror_to_tracing = enabled;
        self
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, message: &str, category: LogCategory) -> u64 {
        if self.mirror_to_tracing {
            match category {
                LogCategory::Error => tracing::warn!(target: "terminal", "{message}"),
                LogCategory::Timing => tracing::debug!(target: "terminal", "{message}"),
                _ => tracing::info!(target: "terminal", category = category.as_str(), "{message}"),
            }
        }

        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.push_back(LogEntry {
            seq,
            category,
            message: message.to_string(),
        });

        // Keep only the most recent lines
        if state.entries.len() > self.max_size {
            state.entries.pop_front();
        }
        seq
    }

    pub fn get_recent(&self, count: usize) -> Vec<LogEntry> {
        let state = self.lock();
        let start = state.entries.len().saturating_sub(count);
        state.entries.iter().skip(start).cloned().collect()
    }

    pub fn get_all(&self) -> Vec<LogEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Lines with `seq >= from`, oldest first.
    pub fn entries_since(&self, from: u64) -> Vec<LogEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.seq >= from)
            .cloned()
            .collect()
    }

    /// Sequence number the next line will receive.
    pub fn next_seq(&self) -> u64 {
        self.lock().next_seq
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Auto-scroll policy: follow new output unless the user scrolled more than
/// half a viewport away from the bottom.
#[derive(Debug, Clone, Copy)]
pub struct AutoScroll {
    limit: f32,
    pinned: bool,
}

impl AutoScroll {
    pub fn new(viewport_height: f32) -> Self {
        Self {
            limit: viewport_height / 2.0,
            pinned: true,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Call whenever the user scrolls the terminal.
    pub fn on_scroll(&mut self, scroll_top: f32, scroll_height: f32, viewport_height: f32) {
        let unpin_below = scroll_height - viewport_height - self.limit;
        self.pinned = unpin_below < scroll_top;
    }

    /// Scroll offset to jump to after new content, if still pinned.
    pub fn target_after_append(&self, scroll_height: f32, viewport_height: f32) -> Option<f32> {
        if !self.pinned {
            return None;
        }
        let scroll_top = scroll_height - viewport_height;
        (scroll_top > 0.0).then_some(scroll_top)
    }
}
