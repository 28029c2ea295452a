use crate::cli::HistoryArgs;
use crate::commands::{api_client, report};
use crate::exit_codes;
use crate::output;
use pattern_client::api::{HistoryFilter, ResultRecord};
use pattern_client::config::ClientConfig;
use std::path::Path;

pub async fn execute(args: HistoryArgs) -> i32 {
    match run(args).await {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

async fn run(args: HistoryArgs) -> anyhow::Result<i32> {
    let config = ClientConfig::from_env()?;
    let auth = config.auth_context();
    let _session = auth.subscribe();
    let api = api_client(&config, &auth)?;

    if let (Some(file_id), Some(dest)) = (&args.download, &args.output) {
        let written = api.download_result(file_id, Path::new(dest)).await?;
        eprintln!("Saved {} bytes to {}", written, dest);
        return Ok(exit_codes::SUCCESS);
    }

    let filter = HistoryFilter {
        start_date: args.from,
        end_date: args.to,
        filename: args.filename,
    };
    let records = api.results_history(&filter).await?;

    if args.json {
        return Ok(output::print_json(&records, false));
    }

    if records.is_empty() {
        println!("No past results.");
        return Ok(exit_codes::SUCCESS);
    }

    println!(
        "{:<24} {:<32} {:>8} {:>9}  {}",
        "TIMESTAMP", "FILE", "RECORDS", "ANOMALIES", "ID"
    );
    for record in &records {
        println!("{}", format_row(record));
    }
    Ok(exit_codes::SUCCESS)
}

fn format_row(record: &ResultRecord) -> String {
    format!(
        "{:<24} {:<32} {:>8} {:>9}  {}",
        record.timestamp, record.file_name, record.total_records, record.anomaly_count, record.file_id
    )
}
