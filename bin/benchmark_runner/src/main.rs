use common::config::{load_config, ConsoleConfig};
use common::joystick::{Joystick, SurfaceRect};
use common::metrics::{RoundTrip, TimingAggregator};
use criterion::{black_box, Criterion};
use session::{run_stream_session, StreamOutcome};
use std::env;
use std::error::Error;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_DURATION_SECS: u64 = 5;
const RESULTS_CSV: &str = "round_trip_results.csv";

fn analyze_results_detailed(results: &[RoundTrip], outcome: &StreamOutcome, elapsed: Duration) {
    println!("\n=== Streaming Analysis ===");
    println!("Stream stopped: {:?} after {} cycles", outcome.stop, outcome.cycles);
    println!(
        "Throughput: {:.1} cycles/s",
        outcome.cycles as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    if results.is_empty() {
        println!("No round-trip samples to analyze");
        return;
    }

    let mut latencies: Vec<u64> = results.iter().map(|r| r.latency_ms).collect();
    latencies.sort_unstable();

    let min = latencies[0];
    let max = latencies[latencies.len() - 1];
    let p99 = latencies[((latencies.len() - 1) as f64 * 0.99).round() as usize];
    let average = results.last().map(|r| r.average_ms).unwrap_or_default();

    println!("Samples retained: {}", results.len());
    println!("Round-trip (ms): avg={}, min={}, max={}, p99={}", average, min, max, p99);
}

fn benchmark_joystick(c: &mut Criterion, config: &ConsoleConfig) {
    let area = SurfaceRect::new(0.0, 0.0, config.surface.width, config.surface.height);

    c.bench_function("joystick_gesture", |b| {
        b.iter(|| {
            let mut stick = Joystick::new(config.fraction_digits);
            stick.pointer_down(area, black_box(10.0), black_box(10.0));
            for step in 0..100 {
                stick.pointer_move(black_box(step as f64 * 1.7), black_box(step as f64 * 0.9));
            }
            black_box(stick.pointer_up());
        });
    });

    c.bench_function("joystick_to_json", |b| {
        let mut stick = Joystick::new(config.fraction_digits);
        stick.pointer_down(area, 37.0, 151.0);
        b.iter(|| black_box(stick.position().to_json()));
    });
}

fn benchmark_timing(c: &mut Criterion, config: &ConsoleConfig) {
    c.bench_function("timing_send_arrival", |b| {
        let mut timing = TimingAggregator::new(config.timing_history_capacity);
        let base = Instant::now();
        let mut id = 0;
        b.iter(|| {
            timing.record_send(id, base);
            id += 1;
            black_box(timing.record_arrival(base + Duration::from_micros(id % 5_000)));
        });
    });
}

fn benchmark_stream(c: &mut Criterion, config: &ConsoleConfig) -> Result<(), Box<dyn Error>> {
    let mut config = config.clone();
    config.transport.round_trip_ms = 0;
    let rt = tokio::runtime::Runtime::new()?;

    c.bench_function("stream_session_50ms", |b| {
        b.iter(|| {
            let result = rt.block_on(run_stream_session(&config, Duration::from_millis(50)));
            black_box(result.map(|(_, outcome)| outcome.cycles).ok());
        });
    });
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: benchmark_runner <config_file> [seconds] [--criterion]");
        eprintln!("Example: benchmark_runner configs/console.toml 10");
        eprintln!("Example: benchmark_runner configs/console.toml --criterion");
        std::process::exit(1);
    }

    let config_path = &args[1];
    let use_criterion = args.iter().any(|arg| arg == "--criterion");
    let duration_secs = args
        .get(2)
        .filter(|arg| !arg.starts_with("--"))
        .map(|arg| arg.parse::<u64>())
        .transpose()?
        .unwrap_or(DEFAULT_DURATION_SECS);

    let mut config = load_config(config_path)?;
    tracing::info!(path = %config_path, "configuration loaded");
    // The terminal log would flood the output and skew timing.
    config.enable_logging = false;

    println!("========================================");
    println!("Rover Console Streaming Benchmark");
    println!("========================================");
    println!("Config: {}", config_path);
    println!("Session: {}", config.session_name);
    println!("Transport: {:?} ({})", config.transport.kind, config.transport.address);
    println!("Echo timeout: {} ms", config.echo_timeout_ms);
    if use_criterion {
        println!("Using Criterion for statistical analysis");
    } else {
        println!("Duration: {} seconds", duration_secs);
    }
    println!("========================================\n");

    if use_criterion {
        let mut criterion = Criterion::default()
            .sample_size(20)
            .measurement_time(Duration::from_secs(10));

        benchmark_joystick(&mut criterion, &config);
        benchmark_timing(&mut criterion, &config);
        benchmark_stream(&mut criterion, &config)?;

        println!("\n========================================");
        println!("Criterion statistical analysis complete!");
        println!("Check the target/criterion directory for detailed HTML reports.");
        println!("========================================");
        return Ok(());
    }

    println!("Streaming resting joystick...");
    let rt = tokio::runtime::Runtime::new()?;
    let start = Instant::now();
    let (console, outcome) =
        rt.block_on(run_stream_session(&config, Duration::from_secs(duration_secs)))?;
    let elapsed = start.elapsed();
    println!("Streaming completed in {:.2} seconds", elapsed.as_secs_f64());

    let results = console.timing().get_results();
    analyze_results_detailed(&results, &outcome, elapsed);

    let diagnostics = console.diagnostics();
    println!(
        "Dispatch failures: {}, echo timeouts: {}, unmatched arrivals: {}",
        diagnostics.dispatch_failures, diagnostics.echo_timeouts, diagnostics.unmatched_arrivals
    );

    let saved = console.timing().save_to_csv(RESULTS_CSV)?;
    println!("{} samples saved to {}", saved, RESULTS_CSV);

    println!("\n========================================");
    println!("Benchmark complete!");
    println!("========================================");
    Ok(())
}
