use crate::cli::WatchArgs;
use crate::commands::{format_record, report};
use crate::exit_codes;
use crate::output;
use anyhow::Context;
use pattern_client::config::ClientConfig;
use pattern_client::stream::{StreamConsumer, WebSocketTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn execute(args: WatchArgs) -> i32 {
    match run(args).await {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

async fn run(args: WatchArgs) -> anyhow::Result<i32> {
    let config = ClientConfig::from_env()?;
    let auth = config.auth_context();
    let _session = auth.subscribe();

    let consumer = StreamConsumer::new(config.stream(), Arc::new(WebSocketTransport::new()));
    let json = args.json;
    consumer.on_record(move |record| {
        let line = if json {
            output::to_json(record, true)
        } else {
            Ok(format_record(record))
        };
        if let Err(e) = line.and_then(|line| output::write_line(&line)) {
            warn!("{}", e);
        }
    });
    consumer.on_state(|state| info!("Live feed state: {:?}", state));

    let handle = consumer.connect(Arc::new(auth.clone()));
    eprintln!("Watching {} (Ctrl-C to stop)...", config.ws_base);

    match args.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?,
    }

    handle.close().await;

    let summary = handle.summary(args.summary_span);
    let stats = handle.stats();
    eprintln!();
    eprintln!(
        "Received {} records ({} shown, {} malformed), {} reconnects",
        stats.records_received,
        stats.records_dispatched,
        stats.malformed_frames,
        stats.reconnects_scheduled
    );
    eprintln!(
        "Last {} records: {} anomalies, {} normal",
        summary.considered, summary.anomalies, summary.normal
    );

    Ok(exit_codes::SUCCESS)
}
