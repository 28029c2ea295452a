use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use pattern_client::api::HistoryFilter;

#[derive(Parser)]
#[command(
    name = "pattern-client",
    version,
    about = "User Pattern Analyzer client: live anomaly feed, batch analysis and session replay",
    long_about = "Watch the live anomaly feed, upload logs for batch analysis, inspect click \
                  heatmaps and record or check replayable sessions.\n\
                  Service endpoints come from $API_BASE and $WS_BASE (or a .env file)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Follow the live feed of classified records
    Watch(WatchArgs),
    /// Upload a log file for batch anomaly analysis
    Analyze(AnalyzeArgs),
    /// Aggregate click logs into a density heatmap
    Heatmap(HeatmapArgs),
    /// List past analysis runs
    History(HistoryArgs),
    /// Show page-to-page navigation counts
    Paths(PathsArgs),
    /// Show the learned behaviour profile
    Profile(ProfileArgs),
    /// List or check recorded sessions
    Sessions(SessionsArgs),
    /// Record captured events into sessions
    Record(RecordArgs),
}

#[derive(Args)]
pub struct WatchArgs {
    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long)]
    pub duration: Option<u64>,

    /// Number of most recent records in the closing summary
    #[arg(long, default_value_t = 10)]
    pub summary_span: usize,

    /// Print each record as a compact JSON line
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Log file to analyze (CSV or JSON)
    #[arg(long)]
    pub file: String,

    /// Save the anomalous rows to this path
    #[arg(long)]
    pub download: Option<String>,

    /// Print at most this many revealed rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print the full response as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct HeatmapArgs {
    /// Read click entries from a local JSON array instead of the service
    #[arg(long)]
    pub input: Option<String>,

    /// Upload a click log before aggregating
    #[arg(long, conflicts_with = "input")]
    pub upload: Option<String>,

    /// Only include clicks up to this timestamp (default: latest)
    #[arg(long)]
    pub at: Option<f64>,

    /// Number of densest cells to list
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct HistoryArgs {
    /// First day to include (DD-MM-YYYY)
    #[arg(long, value_parser = HistoryFilter::parse_day)]
    pub from: Option<NaiveDate>,

    /// Last day to include (DD-MM-YYYY)
    #[arg(long, value_parser = HistoryFilter::parse_day)]
    pub to: Option<NaiveDate>,

    /// Only runs whose file name contains this text
    #[arg(long)]
    pub filename: Option<String>,

    /// Save the anomaly CSV of this run (file id)
    #[arg(long, requires = "output")]
    pub download: Option<String>,

    /// Destination of --download
    #[arg(long)]
    pub output: Option<String>,

    /// Print the runs as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct PathsArgs {
    /// Number of busiest transitions to list
    #[arg(long, default_value_t = 20)]
    pub top: usize,

    /// Print the raw flow as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ProfileArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct SessionsArgs {
    #[command(subcommand)]
    pub command: SessionsCommand,
}

#[derive(Subcommand)]
pub enum SessionsCommand {
    /// List recorded sessions, newest first
    List {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check that a session can be replayed
    Check {
        /// Session id
        #[arg(required_unless_present = "latest")]
        id: Option<String>,

        /// Check the most recent session instead
        #[arg(long, conflicts_with = "id")]
        latest: bool,
    },
}

#[derive(Args)]
pub struct RecordArgs {
    /// JSON-lines file of captured events
    #[arg(long)]
    pub input: String,

    /// Full snapshot event emitted whenever one is requested
    #[arg(long)]
    pub snapshot: Option<String>,

    /// Delay between emitted events in milliseconds
    #[arg(long, default_value_t = 0)]
    pub pace_ms: u64,

    /// Seconds to wait for queued deliveries on exit
    #[arg(long, default_value_t = 5)]
    pub grace: u64,
}
