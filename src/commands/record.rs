use crate::cli::RecordArgs;
use crate::commands::report;
use crate::exit_codes;
use anyhow::Context;
use pattern_client::capture::{
    CaptureHub, CapturedEvent, FlushOutcome, HttpBeacon, RecordingCapture,
};
use pattern_client::config::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub async fn execute(args: RecordArgs) -> i32 {
    match run(args).await {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

async fn run(args: RecordArgs) -> anyhow::Result<i32> {
    let config = ClientConfig::from_env()?;

    let text = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input))?;
    let events = parse_events(&text);

    let hub = CaptureHub::new();
    if let Some(path) = &args.snapshot {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path))?;
        let snapshot: CapturedEvent =
            serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path))?;
        if !snapshot.is_full_snapshot() {
            eprintln!("Error: {} is not a full snapshot event", path);
            return Ok(exit_codes::INPUT_ERROR);
        }
        hub.set_snapshot_provider(move || Some(snapshot.clone()));
    }

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
        .context("Failed to create HTTP client")?;
    let beacon = Arc::new(HttpBeacon::spawn(client, &config.api_base));

    let capture = RecordingCapture::new(config.capture(), Arc::new(hub.clone()));
    let handle = capture.start(beacon.clone());
    eprintln!(
        "Recording {} events to {} (Ctrl-C to stop)...",
        events.len(),
        beacon.endpoint()
    );

    let interrupted = tokio::select! {
        _ = emit_all(&hub, events, Duration::from_millis(args.pace_ms)) => false,
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            true
        }
    };

    let outcome = if interrupted {
        handle.teardown()
    } else {
        handle.stop().await
    };

    let stats = handle.stats();
    eprintln!(
        "Captured {} events, delivered {} in {} sessions ({} flushes skipped)",
        stats.events_captured, stats.events_delivered, stats.flushes_delivered, stats.flushes_skipped
    );

    beacon.shutdown(Duration::from_secs(args.grace)).await;

    match outcome {
        Some(FlushOutcome::MissingSnapshot { buffered }) => {
            eprintln!(
                "Error: {} events were not sent because no full snapshot was captured",
                buffered
            );
            Ok(exit_codes::NOT_REPLAYABLE)
        }
        _ => Ok(exit_codes::SUCCESS),
    }
}

/// One event per line; blank and malformed lines are skipped
fn parse_events(text: &str) -> Vec<CapturedEvent> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping line {}: {}", idx + 1, e);
                None
            }
        })
        .collect()
}

async fn emit_all(hub: &CaptureHub, events: Vec<CapturedEvent>, pace: Duration) {
    for event in events {
        hub.emit(event);
        if !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }
}
