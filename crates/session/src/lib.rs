//! Message-exchange layer between the console front ends and the rover link.

use std::time::Duration;

use common::ConsoleConfig;

pub mod console;
pub mod device;
pub mod dispatcher;
pub mod echo;
pub mod error;
pub mod line;
pub mod link;
pub mod stream;
pub mod transport;

pub use console::{Console, ConsoleStats};
pub use device::SimulatedRover;
pub use dispatcher::Dispatcher;
pub use echo::{EchoSlot, EchoToken, EchoWaiter};
pub use error::{ConsoleError, TransportError};
pub use line::LineLink;
pub use link::Link;
pub use stream::{StreamOutcome, StreamStop, StreamingFlag};
pub use transport::{event_channel, EventReceiver, EventSender, Transport, TransportEvent};

/// Opens the configured link and starts a console on it.
/// Must be called inside a tokio runtime.
pub fn launch(config: &ConsoleConfig) -> Console<Link> {
    let (link, events) = Link::open(&config.transport);
    Console::start(config, link, events)
}

/// Connects, streams the resting stick for `duration`, then disconnects.
/// Used by the headless benchmark run.
pub async fn run_stream_session(
    config: &ConsoleConfig,
    duration: Duration,
) -> Result<(Console<Link>, StreamOutcome), ConsoleError> {
    let console = launch(config);
    console.connect().await?;

    let stream = console.start_streaming();
    tokio::time::sleep(duration).await;
    console.stop_streaming();

    let outcome = match stream.await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(error = %err, "streaming task failed");
            StreamOutcome {
                cycles: 0,
                stop: StreamStop::DispatchFailed,
            }
        }
    };
    console.disconnect()?;
    Ok((console, outcome))
}
