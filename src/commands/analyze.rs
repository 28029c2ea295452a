use crate::cli::AnalyzeArgs;
use crate::commands::{api_client, format_record, report};
use crate::exit_codes;
use crate::output;
use pattern_client::config::ClientConfig;
use pattern_client::reveal::BatchRevealer;
use std::path::Path;
use tokio::sync::mpsc;

pub async fn execute(args: AnalyzeArgs) -> i32 {
    match run(args).await {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

async fn run(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let path = Path::new(&args.file);
    if !path.is_file() {
        eprintln!("Error: File not found: {}", args.file);
        return Ok(exit_codes::INPUT_ERROR);
    }

    let config = ClientConfig::from_env()?;
    let auth = config.auth_context();
    let _session = auth.subscribe();
    let api = api_client(&config, &auth)?;

    if !args.quiet {
        eprintln!("Uploading {} for analysis...", args.file);
    }
    let analysis = api.analyze(path).await?;

    if args.json {
        let code = output::print_json(&analysis, false);
        if code != exit_codes::SUCCESS {
            return Ok(code);
        }
    } else {
        println!(
            "Total: {}  Anomalies: {}  Normal: {}",
            analysis.summary.total, analysis.summary.anomalies, analysis.summary.normal
        );
        println!("File ID: {}", analysis.file_id);
        println!();

        let mut records = analysis.records();
        if let Some(limit) = args.limit {
            records.truncate(limit);
        }

        let revealer = BatchRevealer::new(config.reveal());
        let (tx, mut rx) = mpsc::unbounded_channel();
        revealer.on_progress(move |progress| {
            let _ = tx.send(progress);
        });
        revealer.reveal(records);

        let mut printed = 0;
        while let Some(progress) = rx.recv().await {
            let revealed = revealer.revealed();
            for record in &revealed[printed..] {
                println!("{}", format_record(record));
            }
            printed = revealed.len();

            if !args.quiet && progress.total > 0 {
                eprintln!("Revealed {}/{} rows", progress.revealed, progress.total);
            }
            if progress.is_complete() {
                break;
            }
        }
    }

    if let Some(dest) = &args.download {
        let bytes = api
            .download_anomalies(&analysis.file_id, Path::new(dest))
            .await?;
        if !args.quiet {
            eprintln!("Saved anomalies to {} ({} bytes)", dest, bytes);
        }
    }

    Ok(exit_codes::SUCCESS)
}
