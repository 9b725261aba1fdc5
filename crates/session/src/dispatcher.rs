//! Single writer for the outbound channel.
//!
//! Every send, one-shot or streamed, is queued here and executed by one task,
//! so the pending-send table is filled in exactly the order bytes hit the link.

use std::sync::Arc;

use common::{MessageId, OutboundMessage, TimingRecorder};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ConsoleError, TransportError};
use crate::transport::Transport;

struct DispatchRequest {
    payload: String,
    reply: oneshot::Sender<Result<OutboundMessage, TransportError>>,
}

/// Cloneable handle for queueing sends.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    requests: mpsc::Sender<DispatchRequest>,
}

impl Dispatcher {
    /// Starts the dispatcher task. Must be called inside a tokio runtime.
    pub fn spawn<T: Transport>(
        transport: Arc<T>,
        timing: TimingRecorder,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (requests, queue) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_dispatcher(transport, timing, queue));
        (Self { requests }, task)
    }

    /// Sends `payload` and resolves once the link accepted or refused it.
    pub async fn dispatch(&self, payload: String) -> Result<OutboundMessage, ConsoleError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(DispatchRequest { payload, reply })
            .await
            .map_err(|_| ConsoleError::DispatcherClosed)?;

        response
            .await
            .map_err(|_| ConsoleError::DispatcherClosed)?
            .map_err(ConsoleError::Dispatch)
    }
}

async fn run_dispatcher<T: Transport>(
    transport: Arc<T>,
    timing: TimingRecorder,
    mut queue: mpsc::Receiver<DispatchRequest>,
) {
    let mut next_id: MessageId = 0;

    while let Some(DispatchRequest { payload, reply }) = queue.recv().await {
        let id = next_id;
        next_id += 1;
        let sent_at = Instant::now().into_std();

        let result = match transport.send(&payload).await {
            Ok(()) => {
                timing.record_send(id, sent_at);
                tracing::debug!(id, %payload, "dispatched");
                Ok(OutboundMessage {
                    id,
                    payload,
                    sent_at,
                })
            }
            Err(err) => {
                // The id was never used on the wire; hand it to the next send.
                next_id -= 1;
                tracing::warn!(id, error = %err, "dispatch failed");
                Err(err)
            }
        };

        // The caller may have given up; the outcome is already recorded.
        let _ = reply.send(result);
    }

    tracing::debug!("dispatcher stopped");
}
