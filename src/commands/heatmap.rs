use crate::cli::HeatmapArgs;
use crate::commands::{api_client, report};
use crate::exit_codes;
use crate::output;
use anyhow::Context;
use pattern_client::config::ClientConfig;
use pattern_client::heatmap::{DensityField, HeatmapAggregator};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

#[derive(Serialize)]
struct HeatmapReport {
    total_points: usize,
    dropped_entries: usize,
    range: Option<[f64; 2]>,
    at: Option<f64>,
    visible_points: usize,
    cells: usize,
    peak: f64,
    top_cells: Vec<CellReport>,
}

#[derive(Serialize)]
struct CellReport {
    x: f64,
    y: f64,
    intensity: f64,
    normalized: f64,
}

pub async fn execute(args: HeatmapArgs) -> i32 {
    match run(args).await {
        Ok(code) => code,
        Err(e) => report(e),
    }
}

async fn run(args: HeatmapArgs) -> anyhow::Result<i32> {
    let config = ClientConfig::from_env()?;

    let entries = match &args.input {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path))?;
            match serde_json::from_str::<Value>(&text)
                .with_context(|| format!("Failed to parse {}", path))?
            {
                Value::Array(entries) => entries,
                _ => {
                    eprintln!("Error: {} must contain a JSON array of clicks", path);
                    return Ok(exit_codes::INPUT_ERROR);
                }
            }
        }
        None => {
            let auth = config.auth_context();
            let _session = auth.subscribe();
            let api = api_client(&config, &auth)?;

            if let Some(upload) = &args.upload {
                let summary = api.upload_click_log(Path::new(upload)).await?;
                eprintln!("Uploaded {} click records", summary.count);
            }
            api.fetch_clicks().await?
        }
    };

    let mut aggregator = HeatmapAggregator::new(config.heatmap());
    let dropped = aggregator.load_json(&entries);

    let at = args.at.or_else(|| aggregator.range().map(|(_, max)| max));
    let field = match at {
        Some(at) => aggregator.density(at),
        None => DensityField::empty(aggregator.config()),
    };

    let report = HeatmapReport {
        total_points: aggregator.len(),
        dropped_entries: dropped,
        range: aggregator.range().map(|(min, max)| [min, max]),
        at,
        visible_points: field.point_count(),
        cells: field.cell_count(),
        peak: field.peak(),
        top_cells: top_cells(&field, args.top),
    };

    if args.json {
        return Ok(output::print_json(&report, false));
    }

    if aggregator.is_empty() {
        println!("No valid click data to render heatmap.");
        return Ok(exit_codes::SUCCESS);
    }

    if let (Some([min, max]), Some(at)) = (report.range, report.at) {
        println!("Time range: {} .. {} (showing <= {})", min, max, at);
    }
    println!(
        "Points: {} visible of {} ({} dropped)",
        report.visible_points, report.total_points, report.dropped_entries
    );
    println!("Cells: {}  Peak intensity: {}", report.cells, report.peak);
    for cell in &report.top_cells {
        println!(
            "  ({:>7.1}, {:>7.1})  {:>4.1}  {:>5.1}%",
            cell.x,
            cell.y,
            cell.intensity,
            cell.normalized * 100.0
        );
    }

    Ok(exit_codes::SUCCESS)
}

fn top_cells(field: &DensityField, top: usize) -> Vec<CellReport> {
    let mut cells: Vec<_> = field.cells().collect();
    cells.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    cells
        .into_iter()
        .take(top)
        .map(|((col, row), intensity)| {
            let x = (col as f64 + 0.5) * field.cell_size;
            let y = (row as f64 + 0.5) * field.cell_size;
            CellReport {
                x,
                y,
                intensity,
                normalized: field.normalized_at(x, y),
            }
        })
        .collect()
}
