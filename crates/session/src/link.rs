use common::{TransportConfig, TransportKind};

use crate::device::SimulatedRover;
use crate::error::TransportError;
use crate::line::LineLink;
use crate::transport::{event_channel, EventReceiver, Transport};

/// The link picked by configuration.
pub enum Link {
    Simulated(SimulatedRover),
    Tcp(LineLink),
}

impl Link {
    pub fn open(config: &TransportConfig) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel();
        let link = match config.kind {
            TransportKind::Simulated => Link::Simulated(SimulatedRover::new(
                config.device_name.clone(),
                config.round_trip(),
                events,
            )),
            TransportKind::Tcp => Link::Tcp(LineLink::new(config, events)),
        };
        (link, receiver)
    }

    pub fn as_simulated(&self) -> Option<&SimulatedRover> {
        match self {
            Link::Simulated(rover) => Some(rover),
            Link::Tcp(_) => None,
        }
    }
}

impl Transport for Link {
    async fn connect(&self) -> Result<(), TransportError> {
        match self {
            Link::Simulated(rover) => rover.connect().await,
            Link::Tcp(line) => line.connect().await,
        }
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        match self {
            Link::Simulated(rover) => rover.disconnect(),
            Link::Tcp(line) => line.disconnect(),
        }
    }

    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        match self {
            Link::Simulated(rover) => rover.send(payload).await,
            Link::Tcp(line) => line.send(payload).await,
        }
    }

    fn device_name(&self) -> Option<String> {
        match self {
            Link::Simulated(rover) => rover.device_name(),
            Link::Tcp(line) => line.device_name(),
        }
    }
}
