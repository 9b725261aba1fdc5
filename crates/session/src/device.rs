//! In-process stand-in for the rover firmware.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use common::drive::{self, DriveCommand};
use common::LogLevel;
use serde_json::Value;

use crate::error::TransportError;
use crate::transport::{emit_log, EventSender, Transport, TransportEvent};

const SOURCE: &str = "rover";

/// Probe sent by some terminal apps; the firmware never answers it.
const PROBE: &str = "TX=";

type ReceiveHook = Box<dyn Fn(u64, &str) + Send + Sync>;

/// Behaves like the rover firmware behind a serial bridge: replies `OK` to
/// drive commands and `UNKNOWN: <payload>` to anything else after a fixed
/// round trip.
pub struct SimulatedRover {
    name: Option<String>,
    round_trip: Duration,
    events: EventSender,
    connected: Arc<AtomicBool>,
    responsive: AtomicBool,
    reject_sends: AtomicBool,
    received: AtomicU64,
    last_drive: Mutex<DriveCommand>,
    on_receive: Mutex<Option<ReceiveHook>>,
}

impl SimulatedRover {
    pub fn new(name: Option<String>, round_trip: Duration, events: EventSender) -> Self {
        Self {
            name,
            round_trip,
            events,
            connected: Arc::new(AtomicBool::new(false)),
            responsive: AtomicBool::new(true),
            reject_sends: AtomicBool::new(false),
            received: AtomicU64::new(0),
            last_drive: Mutex::new(DriveCommand::STOP),
            on_receive: Mutex::new(None),
        }
    }

    /// When false, messages are accepted but never answered.
    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::SeqCst);
    }

    /// When true, every send fails as if the link refused the write.
    pub fn set_reject_sends(&self, reject: bool) {
        self.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// Called with the running count and payload of every accepted message,
    /// before any reply is scheduled.
    pub fn on_receive<F>(&self, hook: F)
    where
        F: Fn(u64, &str) + Send + Sync + 'static,
    {
        *self.on_receive.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    pub fn last_drive(&self) -> DriveCommand {
        *self.last_drive.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn reply_to(&self, payload: &str) -> Option<String> {
        if payload == PROBE {
            return None;
        }
        match parse_drive(payload) {
            Some((x, y)) => {
                let command = drive::mix(x, y);
                *self.last_drive.lock().unwrap_or_else(PoisonError::into_inner) = command;
                Some("OK".to_string())
            }
            None => Some(format!("UNKNOWN: {payload}")),
        }
    }
}

/// A drive command is a JSON object with a numeric `x`, `y` or both.
/// A missing axis is 0; values are clamped to [-1, 1].
pub fn parse_drive(payload: &str) -> Option<(f64, f64)> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let x = value.get("x").and_then(Value::as_f64);
    let y = value.get("y").and_then(Value::as_f64);
    if x.is_none() && y.is_none() {
        return None;
    }
    Some((
        x.unwrap_or(0.0).clamp(-1.0, 1.0),
        y.unwrap_or(0.0).clamp(-1.0, 1.0),
    ))
}

impl Transport for SimulatedRover {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        emit_log(
            &self.events,
            LogLevel::Info,
            SOURCE,
            format!("Connected to {}", self.name.as_deref().unwrap_or("rover")),
        );
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            *self.last_drive.lock().unwrap_or_else(PoisonError::into_inner) = DriveCommand::STOP;
            emit_log(&self.events, LogLevel::Info, SOURCE, "Disconnected".to_string());
        }
        Ok(())
    }

    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected(payload.to_string()));
        }

        let count = self.received.fetch_add(1, Ordering::SeqCst) + 1;
        emit_log(&self.events, LogLevel::Debug, SOURCE, format!("received '{payload}'"));
        if let Some(hook) = self.on_receive.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            hook(count, payload);
        }

        let reply = match self.reply_to(payload) {
            Some(reply) if self.responsive.load(Ordering::SeqCst) => reply,
            _ => return Ok(()),
        };

        let events = self.events.clone();
        let connected = Arc::clone(&self.connected);
        let delay = self.round_trip;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if connected.load(Ordering::SeqCst) {
                let _ = events.send(TransportEvent::Received(reply));
            }
        });
        Ok(())
    }

    fn device_name(&self) -> Option<String> {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{event_channel, EventReceiver};

    fn rover() -> (SimulatedRover, EventReceiver) {
        let (events, receiver) = event_channel();
        (
            SimulatedRover::new(Some("HC-06".into()), Duration::from_millis(50), events),
            receiver,
        )
    }

    async fn next_reply(receiver: &mut EventReceiver) -> String {
        loop {
            match receiver.recv().await {
                Some(TransportEvent::Received(reply)) => return reply,
                Some(TransportEvent::Log { .. }) => continue,
                None => panic!("link closed"),
            }
        }
    }

    #[test]
    fn drive_parsing_follows_firmware_rules() {
        assert_eq!(parse_drive(r#"{"x":0.5,"y":-1}"#), Some((0.5, -1.0)));
        assert_eq!(parse_drive(r#"{"y":3}"#), Some((0.0, 1.0)));
        assert_eq!(parse_drive(r#"{"x":"left"}"#), None);
        assert_eq!(parse_drive(r#"{"z":1}"#), None);
        assert_eq!(parse_drive("hello"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn send_requires_connection() {
        let (rover, _receiver) = rover();
        let err = rover.send("hi").await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn replies_after_round_trip() {
        let (rover, mut receiver) = rover();
        rover.connect().await.unwrap();

        let started = tokio::time::Instant::now();
        rover.send(r#"{"x":0,"y":1}"#).await.unwrap();
        assert_eq!(next_reply(&mut receiver).await, "OK");
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(rover.last_drive(), DriveCommand { left: 1.0, right: 1.0 });

        rover.send("hello").await.unwrap();
        assert_eq!(next_reply(&mut receiver).await, "UNKNOWN: hello");
        assert_eq!(rover.received_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_and_unresponsive_mode_get_no_reply() {
        let (rover, mut receiver) = rover();
        rover.connect().await.unwrap();

        rover.send(PROBE).await.unwrap();
        rover.set_responsive(false);
        rover.send("{}").await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        while let Ok(event) = receiver.try_recv() {
            assert!(!matches!(event, TransportEvent::Received(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejecting_link_fails_sends() {
        let (rover, _receiver) = rover();
        rover.connect().await.unwrap();
        rover.set_reject_sends(true);
        assert!(matches!(
            rover.send("x").await.unwrap_err(),
            TransportError::Rejected(_)
        ));
        assert_eq!(rover.received_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent_and_drops_replies_in_flight() {
        let (rover, mut receiver) = rover();
        rover.connect().await.unwrap();
        rover.send(r#"{"x":1}"#).await.unwrap();

        rover.disconnect().unwrap();
        rover.disconnect().unwrap();
        assert_eq!(rover.last_drive(), DriveCommand::STOP);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut disconnects = 0;
        while let Ok(event) = receiver.try_recv() {
            match event {
                TransportEvent::Received(reply) => panic!("unexpected reply {reply}"),
                TransportEvent::Log { message, .. } if message == "Disconnected" => disconnects += 1,
                TransportEvent::Log { .. } => {}
            }
        }
        assert_eq!(disconnects, 1);
    }
}
