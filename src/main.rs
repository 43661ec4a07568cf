//! ChronoTrace demo - Main Entry Point
//!
//! Runs a few traced worker threads, flushes their events into the store
//! and replays the captured history in a playback session.
//!
//! Usage: `chronotrace-rs [CONFIG] [RECORD_OUT]`

use anyhow::Context;
use chronotrace_rs::{
    config::LoggingConfig, Event, EventKind, EventSource, PlaybackUpdate, Timestamp,
    TraceConfig, TraceRuntime,
};
use std::path::Path;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const WORKERS: usize = 3;
const ITERATIONS: usize = 4;

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => TraceConfig::load(&path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => TraceConfig::load_or_default(),
    };
    let record_path = args.next();

    // Held until exit so buffered log lines reach the file
    let _log_guard = init_logging(&config.logging);

    tracing::info!("Starting ChronoTrace demo");
    let mut runtime = TraceRuntime::new(config).context("Failed to start trace runtime")?;

    std::thread::scope(|scope| {
        for worker in 0..WORKERS {
            let producer = runtime.register_producer(format!("worker-{worker}"));
            scope.spawn(move || {
                let correlation = format!("job-{worker}");
                let node = format!("worker.rs:{worker}");
                for i in 0..ITERATIONS {
                    producer.submit(
                        Event::function_entry(Timestamp::now(), format!("process_{worker}"))
                            .with_correlation(correlation.clone())
                            .with_source_node(node.clone()),
                    );
                    producer.submit(
                        Event::state_change(Timestamp::now(), "iteration", serde_json::json!(i))
                            .with_correlation(correlation.clone()),
                    );
                    producer.submit(
                        Event::new(Timestamp::now(), EventKind::MessageSend)
                            .with_correlation(correlation.clone())
                            .with_payload(serde_json::json!({ "from": worker, "seq": i })),
                    );
                    producer.submit(
                        Event::function_exit(Timestamp::now())
                            .with_correlation(correlation.clone()),
                    );
                }
            });
        }
    });

    runtime.flush_now()?;
    let stats = runtime.capture_stats();
    tracing::info!(
        accepted = stats.accepted,
        flushed = stats.flushed_events,
        dropped = stats.buffer_dropped,
        "Capture complete"
    );

    let session = runtime.start_session("demo", EventSource::All)?;
    let updates = session.updates();

    for _ in 0..3 {
        session.step_forward()?;
    }
    let snapshot = session.step_backward()?;
    tracing::info!(
        index = snapshot.current_index,
        stack = ?snapshot.reconstructed_state.call_stack,
        "Stepped"
    );

    let middle = (snapshot.total_events / 2) as i64;
    let snapshot = session.seek_to(middle)?;
    tracing::info!(
        index = snapshot.current_index,
        bindings = ?snapshot.reconstructed_state.bindings,
        "Seeked"
    );

    session.set_speed(10.0)?;
    session.play()?;
    while let Ok(update) = updates.recv_timeout(Duration::from_secs(5)) {
        if update == PlaybackUpdate::Finished {
            break;
        }
    }

    let snapshot = session.get_state()?;
    tracing::info!(
        state = snapshot.state.display_name(),
        index = snapshot.current_index,
        total = snapshot.total_events,
        "Playback finished"
    );

    if let Some(path) = record_path {
        session
            .record()?
            .save_to_file(Path::new(&path))
            .with_context(|| format!("Failed to save session record to {path}"))?;
        tracing::info!("Session record saved to {}", path);
    }

    tracing::info!("Shutting down...");
    runtime.shutdown();
    Ok(())
}
