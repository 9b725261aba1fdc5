mod menu;

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::config::{load_config, DEFAULT_CONFIG_PATH};
use common::{ConsoleConfig, LogCategory, LogEntry, SurfaceRect, TerminalLog};
use session::{Console, Link};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use menu::Command;

const LOG_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<(), Box<dyn Error>> {
    // Terminal lines are printed directly; keep tracing for warnings unless asked.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,terminal=off")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path)?;
    tracing::info!(path = %config_path, transport = ?config.transport.kind, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: ConsoleConfig) -> Result<(), Box<dyn Error>> {
    let console = session::launch(&config);
    let pad = SurfaceRect::new(0.0, 0.0, config.surface.width, config.surface.height);

    let shutdown = Arc::new(AtomicBool::new(false));
    let printer = tokio::spawn(print_log(console.log().clone(), Arc::clone(&shutdown)));

    menu::show_help(pad.width, pad.height);
    menu::prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match menu::parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(&console, pad, command).await,
            Err(message) => println!("{message}"),
        }
        menu::prompt();
    }

    console.stop_streaming();
    // Already recorded in the terminal log if it fails.
    let _ = console.disconnect();

    tokio::time::sleep(LOG_POLL_INTERVAL).await;
    shutdown.store(true, Ordering::Relaxed);
    printer.await?;
    println!("Goodbye!");
    Ok(())
}

// Console failures land in the terminal log, so results are not reported twice.
async fn execute(console: &Console<Link>, pad: SurfaceRect, command: Command) {
    match command {
        Command::Connect => {
            let _ = console.connect().await;
        }
        Command::Disconnect => {
            let _ = console.disconnect();
        }
        Command::ToggleStream => {
            let streaming = console.toggle_streaming();
            println!("Streaming {}", if streaming { "on" } else { "off" });
        }
        Command::Press(x, y) => report_position(console.pointer_down(pad, x, y)),
        Command::Drag(x, y) => report_position(console.pointer_move(x, y)),
        Command::Release => report_position(console.pointer_up()),
        Command::Stats => display_stats(console),
        Command::Save(path) => match console.timing().save_to_csv(&path) {
            Ok(count) => println!("Saved {count} samples to {path}"),
            Err(err) => println!("Failed to save {path}: {err}"),
        },
        Command::Help => menu::show_help(pad.width, pad.height),
        // A bare Enter would leave a pending entry the rover never answers.
        Command::Send(message) if message.is_empty() => {}
        Command::Send(message) => {
            let _ = console.send(&message).await;
        }
        Command::Quit => {}
    }
}

fn report_position(position: Option<common::JoystickPosition>) {
    if let Some(position) = position {
        println!("Joystick x={} y={}", position.x, position.y);
    }
}

fn display_stats(console: &Console<Link>) {
    let stats = console.stats();

    println!("\n=== Session Statistics ===");
    println!("Device: {}", stats.device);
    println!("Streaming: {}", if stats.streaming { "on" } else { "off" });
    println!("Pending sends: {}", stats.timing.pending);
    println!("Round-trip samples: {}", stats.timing.sample_count);
    match stats.timing.last {
        Some(last) => println!(
            "Last round-trip: {}ms (average {}ms)",
            last.latency_ms, last.average_ms
        ),
        None => println!("Last round-trip: -"),
    }
    println!("Dispatch failures: {}", stats.diagnostics.dispatch_failures);
    println!("Echo timeouts: {}", stats.diagnostics.echo_timeouts);
    println!("Unmatched arrivals: {}", stats.diagnostics.unmatched_arrivals);
    println!("Streams started: {}", stats.diagnostics.streams_started);
}

async fn print_log(log: TerminalLog, shutdown: Arc<AtomicBool>) {
    let mut cursor = log.next_seq();
    let mut ticker = tokio::time::interval(LOG_POLL_INTERVAL);

    while !shutdown.load(Ordering::Relaxed) {
        ticker.tick().await;
        for entry in log.entries_since(cursor) {
            print_entry(&entry);
            cursor = entry.seq + 1;
        }
    }
}

fn print_entry(entry: &LogEntry) {
    let marker = match entry.category {
        LogCategory::Plain => "  ",
        LogCategory::Incoming => "<<",
        LogCategory::Outgoing => ">>",
        LogCategory::Error => "!!",
        LogCategory::Timing => "..",
    };
    println!("{marker} {}", entry.message);
}
