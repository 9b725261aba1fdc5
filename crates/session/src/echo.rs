//! Turns the fire-and-forget inbound stream into "wait for the next message".
//!
//! There is a single waiter slot. Each registration gets a fresh
//! [`EchoToken`]; only the holder of the token currently in the slot may clear
//! it, so a timer that lost the race against a resolution can never clear a
//! newer registration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::ConsoleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EchoToken(u64);

#[derive(Debug)]
struct Registration {
    token: EchoToken,
    resolve: oneshot::Sender<String>,
}

#[derive(Debug, Default)]
pub struct EchoSlot {
    next_token: AtomicU64,
    current: Mutex<Option<Registration>>,
}

impl EchoSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Registration>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the slot. A registration already in it is dropped, and its
    /// waiter finishes with [`ConsoleError::EchoSuperseded`].
    pub fn register(self: &Arc<Self>) -> EchoWaiter {
        let token = EchoToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let (resolve, receiver) = oneshot::channel();

        let mut current = self.lock();
        if let Some(previous) = current.replace(Registration { token, resolve }) {
            tracing::debug!(token = previous.token.0, "echo waiter superseded");
            drop(previous);
        }
        drop(current);

        EchoWaiter {
            slot: Arc::clone(self),
            token,
            receiver,
        }
    }

    /// Hands `message` to the registered waiter and clears the slot.
    /// Returns false when nobody was waiting.
    pub fn resolve(&self, message: &str) -> bool {
        // Deliver under the lock so a racing timeout sees either the slot or the value.
        let mut current = self.lock();
        match current.take() {
            Some(registration) => registration.resolve.send(message.to_string()).is_ok(),
            None => false,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.lock().is_some()
    }

    pub fn current_token(&self) -> Option<EchoToken> {
        self.lock().as_ref().map(|registration| registration.token)
    }

    /// Clears the slot only if `token` still owns it.
    fn release(&self, token: EchoToken) -> bool {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|registration| registration.token == token) {
            *current = None;
            true
        } else {
            false
        }
    }
}

/// A pending claim on the next inbound message. Dropping it without waiting
/// gives the slot back.
#[derive(Debug)]
pub struct EchoWaiter {
    slot: Arc<EchoSlot>,
    token: EchoToken,
    receiver: oneshot::Receiver<String>,
}

impl EchoWaiter {
    pub fn token(&self) -> EchoToken {
        self.token
    }

    pub async fn wait(mut self, timeout: Duration) -> Result<String, ConsoleError> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(ConsoleError::EchoSuperseded),
            Err(_elapsed) => {
                if self.slot.release(self.token) {
                    return Err(ConsoleError::EchoTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                // Someone else emptied the slot first: either our message was
                // delivered just as the timer fired, or we were replaced.
                match self.receiver.try_recv() {
                    Ok(message) => Ok(message),
                    Err(TryRecvError::Empty | TryRecvError::Closed) => {
                        Err(ConsoleError::EchoSuperseded)
                    }
                }
            }
        }
    }
}

impl Drop for EchoWaiter {
    fn drop(&mut self) {
        self.slot.release(self.token);
    }
}
