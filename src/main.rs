use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod exit_codes;
mod output;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "pattern_client=info",
        1 => "pattern_client=debug",
        _ => "pattern_client=trace,reqwest=debug,tokio_tungstenite=debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let exit_code = match cli.command {
        cli::Command::Watch(args) => commands::watch::execute(args).await,
        cli::Command::Analyze(args) => commands::analyze::execute(args).await,
        cli::Command::Heatmap(args) => commands::heatmap::execute(args).await,
        cli::Command::History(args) => commands::history::execute(args).await,
        cli::Command::Paths(args) => commands::paths::execute(args).await,
        cli::Command::Profile(args) => commands::profile::execute(args).await,
        cli::Command::Sessions(args) => commands::sessions::execute(args).await,
        cli::Command::Record(args) => commands::record::execute(args).await,
    };

    std::process::exit(exit_code);
}
