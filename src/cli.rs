use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::model::{AppId, ChartType};
use crate::store::ConflictPolicy;

#[derive(Parser)]
#[command(name = "mas-cache")]
#[command(about = "Collects applications and top charts from the Mac App Store cache")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to settings.json in the config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overrides the settings file
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// More log output, repeat for debug logs
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan the App Store cache for applications, charts, and metadata.
    ///
    /// The App Store clears its cache aggressively, so run this several
    /// times while browsing the store.
    Scan(ScanArgs),

    /// Print or export the latest top charts
    Charts(ChartsArgs),

    /// Print the latest cached metadata of an application as JSON.
    ///
    /// The data is in the format the App Store uses internally. The
    /// official lookup is https://itunes.apple.com/lookup?id=<app_id>,
    /// which uses a different format.
    Metadata(MetadataArgs),

    /// List known genres
    Genres,

    /// List previous scan runs
    Runs(RunsArgs),
}

#[derive(Parser)]
pub struct ScanArgs {
    /// Cache directory containing Cache.db and fsCachedData (defaults to the App Store container)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// What to do when a cached observation differs from the stored one
    #[arg(long, value_enum, default_value_t = ConflictPolicy::Keep)]
    pub on_conflict: ConflictPolicy,

    /// Print the scan summary as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ChartsArgs {
    /// Print only application IDs in chart order, one per line
    #[arg(long, default_value_t = false, conflicts_with = "json")]
    pub list: bool,

    /// Print the chart as JSON (IDs, bundle IDs, and names, no metadata)
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Leave out application bundles such as Microsoft 365
    #[arg(long, default_value_t = false)]
    pub skip_bundles: bool,

    /// Leave out applications without retrieved metadata
    #[arg(long, default_value_t = false)]
    pub skip_unknown: bool,

    /// Chart type (default: free)
    #[arg(long = "type", short = 't', value_enum)]
    pub chart_type: Option<ChartType>,

    /// iTunes genre ID (default: 36, the App Store itself)
    #[arg(long, short = 'g')]
    pub genre: Option<u32>,

    /// Store country code, e.g. us or de (default: first store in the database)
    #[arg(long, short = 's')]
    pub store: Option<String>,
}

#[derive(Parser)]
pub struct MetadataArgs {
    /// Store country code (default: first store in the database)
    #[arg(long, short = 's')]
    pub store: Option<String>,

    /// ID of the application
    pub app: AppId,
}

#[derive(Parser)]
pub struct RunsArgs {
    /// Show at most this many runs
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
