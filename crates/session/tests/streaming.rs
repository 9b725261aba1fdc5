use std::time::Duration;

use common::{ConsoleConfig, LogCategory};
use session::{event_channel, Console, SimulatedRover, StreamOutcome, StreamStop};
use tokio::time::Instant;

const ROUND_TRIP: Duration = Duration::from_millis(50);

fn console() -> Console<SimulatedRover> {
    let config = ConsoleConfig {
        enable_logging: false,
        ..ConsoleConfig::default()
    };
    let (events, receiver) = event_channel();
    let rover = SimulatedRover::new(Some("HC-06".to_string()), ROUND_TRIP, events);
    Console::start(&config, rover, receiver)
}

fn lines(console: &Console<SimulatedRover>, category: LogCategory) -> Vec<String> {
    console
        .log()
        .get_all()
        .into_iter()
        .filter(|entry| entry.category == category)
        .map(|entry| entry.message)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn resting_stick_streams_exactly_n_cycles() {
    const CYCLES: u64 = 5;

    let console = console();
    console.connect().await.unwrap();

    // Clear the flag while the N-th message is in flight: its echo still
    // completes the cycle, and no N+1-th message is composed.
    let flag = console.streaming_flag().clone();
    console.transport().on_receive(move |count, _| {
        if count == CYCLES {
            flag.lower();
        }
    });

    let started = Instant::now();
    let outcome = console.start_streaming().await.unwrap();
    assert_eq!(
        outcome,
        StreamOutcome {
            cycles: CYCLES,
            stop: StreamStop::FlagCleared
        }
    );
    assert!(started.elapsed() >= ROUND_TRIP * CYCLES as u32);
    assert_eq!(console.transport().received_count(), CYCLES);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let outgoing = lines(&console, LogCategory::Outgoing);
    assert_eq!(outgoing, vec![r#"{"x":0,"y":0}"#; CYCLES as usize]);
    assert_eq!(lines(&console, LogCategory::Incoming), vec!["OK"; CYCLES as usize]);

    let timing = console.timing().get_results();
    assert_eq!(timing.len(), CYCLES as usize);
    assert!(timing.iter().all(|sample| sample.latency_ms == 50));
    assert_eq!(console.stats().timing.pending, 0);
}

#[tokio::test(start_paused = true)]
async fn stopping_mid_wait_lets_the_cycle_finish() {
    let console = console();
    console.connect().await.unwrap();

    let stream = console.start_streaming();
    tokio::time::sleep(Duration::from_millis(75)).await;
    console.stop_streaming();

    let outcome = stream.await.unwrap();
    assert_eq!(outcome.cycles, 2);
    assert_eq!(outcome.stop, StreamStop::FlagCleared);
    assert!(lines(&console, LogCategory::Error).is_empty());
}

#[tokio::test(start_paused = true)]
async fn lost_echo_halts_the_stream() {
    let console = console();
    console.connect().await.unwrap();

    let stream = console.start_streaming();
    // The third reply is already scheduled when the rover goes quiet.
    tokio::time::sleep(Duration::from_millis(120)).await;
    console.transport().set_responsive(false);

    let outcome = stream.await.unwrap();
    assert_eq!(
        outcome,
        StreamOutcome {
            cycles: 3,
            stop: StreamStop::EchoTimeout
        }
    );
    assert!(!console.is_streaming());
    assert_eq!(lines(&console, LogCategory::Error), vec!["Echo timeout after 2000 ms"]);
    assert_eq!(console.diagnostics().echo_timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn refused_send_halts_the_stream_without_pending_entry() {
    let console = console();
    console.connect().await.unwrap();

    let stream = console.start_streaming();
    tokio::time::sleep(Duration::from_millis(120)).await;
    console.transport().set_reject_sends(true);

    let outcome = stream.await.unwrap();
    assert_eq!(outcome.cycles, 3);
    assert_eq!(outcome.stop, StreamStop::DispatchFailed);
    assert_eq!(console.stats().timing.pending, 0);
    assert_eq!(console.diagnostics().dispatch_failures, 1);

    let errors = lines(&console, LogCategory::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("send failed"));
}

#[tokio::test(start_paused = true)]
async fn one_shot_send_gets_unknown_reply() {
    let console = console();
    console.connect().await.unwrap();
    assert_eq!(console.device_label(), "HC-06");

    let sent = console.send("hello").await.unwrap();
    assert_eq!(sent.payload, "hello");
    tokio::time::sleep(ROUND_TRIP * 2).await;

    assert_eq!(lines(&console, LogCategory::Outgoing), vec!["hello"]);
    assert_eq!(lines(&console, LogCategory::Incoming), vec!["UNKNOWN: hello"]);
    assert_eq!(
        lines(&console, LogCategory::Timing),
        vec!["Round-trip: 50ms, average: 50ms (1 samples)"]
    );
    assert!(lines(&console, LogCategory::Plain).contains(&"Connected to HC-06".to_string()));
}

#[tokio::test(start_paused = true)]
async fn one_shot_during_streaming_keeps_fifo_pairing() {
    let console = console();
    console.connect().await.unwrap();

    let stream = console.start_streaming();
    tokio::time::sleep(Duration::from_millis(20)).await;
    console.send("ping").await.unwrap();
    tokio::time::sleep(Duration::from_millis(110)).await;
    console.stop_streaming();
    stream.await.unwrap();

    // Let every reply land: each send got exactly one, so nothing is left pending.
    tokio::time::sleep(ROUND_TRIP * 4).await;
    let stats = console.stats();
    assert_eq!(stats.timing.pending, 0);
    assert_eq!(stats.timing.sample_count, console.transport().received_count());
}

#[tokio::test(start_paused = true)]
async fn disconnect_resets_the_session() {
    let console = console();
    console.connect().await.unwrap();
    console.send("a").await.unwrap();
    let stream = console.start_streaming();

    console.disconnect().unwrap();
    assert_eq!(console.device_label(), "Web Bluetooth Terminal");
    assert_eq!(console.stats().timing.pending, 0);

    let outcome = stream.await.unwrap();
    assert!(matches!(
        outcome.stop,
        StreamStop::FlagCleared | StreamStop::DispatchFailed
    ));
    assert!(console.send("b").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn launch_uses_configured_simulated_link() {
    let config = ConsoleConfig {
        enable_logging: false,
        ..ConsoleConfig::default()
    };
    let console = session::launch(&config);
    console.connect().await.unwrap();
    assert!(console.transport().as_simulated().is_some());

    console.send(r#"{"x":1,"y":0}"#).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(lines_of(&console), vec!["OK"]);
}

fn lines_of(console: &Console<session::Link>) -> Vec<String> {
    console
        .log()
        .get_all()
        .into_iter()
        .filter(|entry| entry.category == LogCategory::Incoming)
        .map(|entry| entry.message)
        .collect()
}
