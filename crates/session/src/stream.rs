use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// User-controlled "keep streaming" switch.
///
/// The streaming loop polls it once per cycle; it never interrupts a cycle in
/// flight. Every raise starts a new generation so a loop left over from an
/// earlier toggle exits instead of running alongside the new one.
#[derive(Debug, Clone, Default)]
pub struct StreamingFlag {
    active: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl StreamingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns streaming on and returns the generation the new loop must carry.
    pub fn raise(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.store(true, Ordering::SeqCst);
        generation
    }

    pub fn lower(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Lowers the flag only if no newer loop has been started since `generation`.
    pub fn lower_if_current(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.lower();
        }
    }

    pub fn is_set(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.is_set() && self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Why a streaming loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStop {
    FlagCleared,
    DispatchFailed,
    EchoTimeout,
    EchoSuperseded,
    EncodeFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Cycles whose echo arrived.
    pub cycles: u64,
    pub stop: StreamStop,
}
