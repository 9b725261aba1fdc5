//! Send orchestration: one-shot sends, the joystick streaming loop and the
//! handling of everything the link pushes back.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::{
    ConsoleConfig, DiagnosticsSnapshot, Joystick, JoystickPosition, LogCategory, LogLevel,
    OutboundMessage, SharedDiagnostics, SurfaceRect, TerminalLog, TimingRecorder, TimingSnapshot,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::dispatcher::Dispatcher;
use crate::echo::EchoSlot;
use crate::error::ConsoleError;
use crate::stream::{StreamOutcome, StreamStop, StreamingFlag};
use crate::transport::{EventReceiver, Transport, TransportEvent};

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleStats {
    pub timing: TimingSnapshot,
    pub diagnostics: DiagnosticsSnapshot,
    pub streaming: bool,
    pub device: String,
}

/// State touched by inbound traffic. Kept apart from the console so the event
/// pump does not hold the transport alive.
#[derive(Clone)]
struct Inbound {
    timing: TimingRecorder,
    echo: Arc<EchoSlot>,
    log: TerminalLog,
    diagnostics: Arc<SharedDiagnostics>,
}

impl Inbound {
    fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Received(message) => self.on_received(&message),
            TransportEvent::Log { level, source, message } => {
                if level == LogLevel::Debug {
                    return;
                }
                tracing::trace!(source, "link log");
                self.log.add(&message, LogCategory::Plain);
            }
        }
    }

    fn on_received(&self, message: &str) {
        let arrived_at = Instant::now().into_std();

        match self.timing.record_arrival(arrived_at) {
            Some(sample) => {
                self.log.add(
                    &format!(
                        "Round-trip: {}ms, average: {}ms ({} samples)",
                        sample.latency_ms, sample.average_ms, sample.sample_count
                    ),
                    LogCategory::Timing,
                );
            }
            None => self.diagnostics.record_unmatched_arrival(),
        }

        // Logged before the waiter wakes so `incoming` precedes the stream's `outgoing`.
        self.log.add(message, LogCategory::Incoming);
        self.echo.resolve(message);
    }
}

async fn pump_events(inbound: Inbound, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        inbound.handle(event);
    }
    tracing::debug!("link event stream closed");
}

/// The console session. Cheap to clone; clones drive the same link.
pub struct Console<T: Transport> {
    transport: Arc<T>,
    dispatcher: Dispatcher,
    inbound: Inbound,
    joystick: Arc<Mutex<Joystick>>,
    streaming: StreamingFlag,
    /// Held for the length of one stream cycle, so a restarted loop cannot
    /// dispatch while a retired loop still waits for its echo.
    cycle_gate: Arc<tokio::sync::Mutex<()>>,
    device_label: Arc<Mutex<String>>,
    default_device_name: Arc<str>,
    echo_timeout: Duration,
}

impl<T: Transport> Clone for Console<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            dispatcher: self.dispatcher.clone(),
            inbound: self.inbound.clone(),
            joystick: Arc::clone(&self.joystick),
            streaming: self.streaming.clone(),
            cycle_gate: Arc::clone(&self.cycle_gate),
            device_label: Arc::clone(&self.device_label),
            default_device_name: Arc::clone(&self.default_device_name),
            echo_timeout: self.echo_timeout,
        }
    }
}

impl<T: Transport> Console<T> {
    /// Wires a console to `transport`, whose events arrive on `events`.
    /// Spawns the dispatcher and the event pump, so it must run inside a
    /// tokio runtime.
    pub fn start(config: &ConsoleConfig, transport: T, events: EventReceiver) -> Self {
        let transport = Arc::new(transport);
        let timing = TimingRecorder::new(config.timing_history_capacity);
        let (dispatcher, _) = Dispatcher::spawn(
            Arc::clone(&transport),
            timing.clone(),
            config.dispatch_queue_capacity,
        );

        let inbound = Inbound {
            timing,
            echo: Arc::new(EchoSlot::new()),
            log: TerminalLog::new(config.log_capacity).with_tracing(config.enable_logging),
            diagnostics: Arc::new(SharedDiagnostics::default()),
        };
        tokio::spawn(pump_events(inbound.clone(), events));

        tracing::info!(
            session = %config.session_name,
            echo_timeout_ms = config.echo_timeout_ms,
            "console started"
        );

        Self {
            transport,
            dispatcher,
            inbound,
            joystick: Arc::new(Mutex::new(Joystick::new(config.fraction_digits))),
            streaming: StreamingFlag::new(),
            cycle_gate: Arc::new(tokio::sync::Mutex::new(())),
            device_label: Arc::new(Mutex::new(config.default_device_name.clone())),
            default_device_name: Arc::from(config.default_device_name.as_str()),
            echo_timeout: config.echo_timeout(),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn log(&self) -> &TerminalLog {
        &self.inbound.log
    }

    pub fn timing(&self) -> &TimingRecorder {
        &self.inbound.timing
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.inbound.diagnostics.snapshot()
    }

    pub fn streaming_flag(&self) -> &StreamingFlag {
        &self.streaming
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_set()
    }

    pub fn device_label(&self) -> String {
        lock(&self.device_label).clone()
    }

    pub fn stats(&self) -> ConsoleStats {
        ConsoleStats {
            timing: self.inbound.timing.snapshot(),
            diagnostics: self.diagnostics(),
            streaming: self.is_streaming(),
            device: self.device_label(),
        }
    }

    /// Feeds one link event through the same path the event pump uses.
    pub fn handle_event(&self, event: TransportEvent) {
        self.inbound.handle(event);
    }

    pub async fn connect(&self) -> Result<(), ConsoleError> {
        if let Err(err) = self.transport.connect().await {
            let err = ConsoleError::Connect(err);
            self.log().add(&err.to_string(), LogCategory::Error);
            return Err(err);
        }

        let name = self
            .transport
            .device_name()
            .unwrap_or_else(|| self.default_device_name.to_string());
        tracing::info!(device = %name, "connected");
        *lock(&self.device_label) = name;
        Ok(())
    }

    /// Stops streaming and forgets outstanding sends so their replies cannot
    /// be credited to the next session.
    pub fn disconnect(&self) -> Result<(), ConsoleError> {
        if let Err(err) = self.transport.disconnect() {
            let err = ConsoleError::Disconnect(err);
            self.log().add(&err.to_string(), LogCategory::Error);
            return Err(err);
        }

        self.streaming.lower();
        self.inbound.timing.clear_pending();
        *lock(&self.device_label) = self.default_device_name.to_string();
        tracing::info!("disconnected");
        Ok(())
    }

    /// Sends `message` as-is without waiting for a reply.
    pub async fn send(&self, message: &str) -> Result<OutboundMessage, ConsoleError> {
        if self.streaming.is_set() {
            // The reply still pairs FIFO, but the stream's echo wait may take it.
            tracing::warn!(%message, "one-shot send while streaming");
        }

        match self.dispatcher.dispatch(message.to_string()).await {
            Ok(sent) => {
                self.log().add(message, LogCategory::Outgoing);
                Ok(sent)
            }
            Err(err) => {
                self.inbound.diagnostics.record_dispatch_failure();
                self.log().add(&err.to_string(), LogCategory::Error);
                Err(err)
            }
        }
    }

    /// Flips streaming and returns the new state. Turning it on spawns the
    /// loop detached; use [`Console::start_streaming`] to keep the handle.
    pub fn toggle_streaming(&self) -> bool {
        if self.streaming.is_set() {
            self.stop_streaming();
            false
        } else {
            drop(self.start_streaming());
            true
        }
    }

    pub fn start_streaming(&self) -> JoinHandle<StreamOutcome> {
        let generation = self.streaming.raise();
        self.inbound.diagnostics.record_stream_started();
        tracing::info!(generation, "streaming started");

        let console = self.clone();
        tokio::spawn(async move { console.run_stream(generation).await })
    }

    /// Takes effect at the next cycle boundary; a cycle in flight completes.
    /// Restarting before then queues the new loop behind that cycle.
    pub fn stop_streaming(&self) {
        self.streaming.lower();
    }

    async fn run_stream(&self, generation: u64) -> StreamOutcome {
        let mut cycles = 0;

        let stop = loop {
            if !self.streaming.is_current(generation) {
                break StreamStop::FlagCleared;
            }
            let _cycle = self.cycle_gate.lock().await;
            if !self.streaming.is_current(generation) {
                break StreamStop::FlagCleared;
            }

            if let Err(err) = self.stream_cycle().await {
                let stop = match &err {
                    ConsoleError::EchoTimeout { .. } => {
                        self.inbound.diagnostics.record_echo_timeout();
                        StreamStop::EchoTimeout
                    }
                    ConsoleError::EchoSuperseded => StreamStop::EchoSuperseded,
                    ConsoleError::Encode(_) => StreamStop::EncodeFailed,
                    _ => {
                        self.inbound.diagnostics.record_dispatch_failure();
                        StreamStop::DispatchFailed
                    }
                };
                self.log().add(&err.to_string(), LogCategory::Error);
                self.streaming.lower_if_current(generation);
                break stop;
            }
            cycles += 1;
        };

        tracing::info!(generation, cycles, ?stop, "streaming stopped");
        StreamOutcome { cycles, stop }
    }

    /// One compose, dispatch, await-echo round. Returns the payload sent.
    async fn stream_cycle(&self) -> Result<String, ConsoleError> {
        let payload = self.joystick_position().to_json()?;

        // Claim the slot first so a fast reply cannot slip past us.
        let waiter = self.inbound.echo.register();
        self.dispatcher.dispatch(payload.clone()).await?;
        waiter.wait(self.echo_timeout).await?;

        self.log().add(&payload, LogCategory::Outgoing);
        Ok(payload)
    }

    pub fn joystick_position(&self) -> JoystickPosition {
        lock(&self.joystick).position()
    }

    pub fn pointer_down(&self, area: SurfaceRect, client_x: f64, client_y: f64) -> Option<JoystickPosition> {
        lock(&self.joystick).pointer_down(area, client_x, client_y)
    }

    pub fn pointer_move(&self, client_x: f64, client_y: f64) -> Option<JoystickPosition> {
        lock(&self.joystick).pointer_move(client_x, client_y)
    }

    pub fn pointer_up(&self) -> Option<JoystickPosition> {
        lock(&self.joystick).pointer_up()
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
