use clap::Parser;
use mas_cache::cache::CacheDir;
use mas_cache::charts::{self, ChartFilter};
use mas_cache::cli::{ChartsArgs, Cli, Command, MetadataArgs, ScanArgs};
use mas_cache::config::Config;
use mas_cache::error::Result;
use mas_cache::metadata;
use mas_cache::report::{self, ChartFormat};
use mas_cache::scan;
use mas_cache::store::Store;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so JSON and list output stay pipeable.
/// RUST_LOG overrides the level picked from -v.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_scan(config: &Config, store: &Store, args: &ScanArgs) -> Result<()> {
    let cache = CacheDir::new(config.cache_dir(args.cache_dir.as_deref())?);
    let result = scan::run(&cache, store, args.on_conflict)?;
    report::print_scan(&result, args.json);
    Ok(())
}

fn run_charts(config: &Config, store: &Store, args: &ChartsArgs) -> Result<()> {
    let country = store.resolve_store(config.store(args.store.as_deref()))?;
    let filter = ChartFilter {
        skip_bundles: args.skip_bundles,
        skip_unknown: args.skip_unknown,
    };
    let chart = charts::latest(
        store,
        &country,
        config.genre(args.genre),
        config.chart_type(args.chart_type),
        filter,
    )?;

    let format = if args.json {
        ChartFormat::Json
    } else if args.list {
        ChartFormat::List
    } else {
        ChartFormat::Table
    };
    report::print_chart(&chart, format);
    Ok(())
}

fn run_metadata(config: &Config, store: &Store, args: &MetadataArgs) -> Result<()> {
    let country = store.resolve_store(config.store(args.store.as_deref()))?;
    let found = metadata::latest(store, &country, args.app)?;
    println!("{}", report::json::render_metadata(&found));
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.config.as_deref(), cli.database.as_deref())?;
    tracing::debug!(database = %config.database.display(), platform = ?config.platform, "resolved configuration");
    let store = Store::open(&config.database)?;

    match &cli.command {
        Command::Scan(args) => run_scan(&config, &store, args),
        Command::Charts(args) => run_charts(&config, &store, args),
        Command::Metadata(args) => run_metadata(&config, &store, args),
        Command::Genres => {
            print!("{}", report::table::render_genres(&store.list_genres()?));
            Ok(())
        }
        Command::Runs(args) => {
            print!("{}", report::table::render_runs(&store.list_scan_runs(args.limit)?));
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
