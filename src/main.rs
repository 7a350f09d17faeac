// pylon command line.
// Operator tools for inspecting and maintaining the device cache.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ratatui::{TerminalOptions, Viewport};
use tracing::{error, info};

use pylon::cache::FileSystem;
use pylon::{CacheConfig, Result, Store, logging, ui};

/// Command line interface parser.
#[derive(Parser)]
#[command(name = "pylon", version, about = "Inspect and maintain the pylon device cache")]
struct Cli {
    /// Cache directory (defaults to $PYLON_CACHE_DIR or the platform cache dir).
    #[arg(long, value_name = "DIR", global = true)]
    cache_dir: Option<PathBuf>,

    /// Log debug output.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show cache statistics.
    Stats {
        /// Print JSON instead of drawing a panel.
        #[arg(long)]
        json: bool,
    },
    /// Remove expired entries.
    Cleanup {
        /// Minimum seconds since the last cleanup (defaults to one hour).
        #[arg(long, value_name = "SECS", conflicts_with = "force")]
        interval: Option<u64>,
        /// Sweep now, ignoring when the last cleanup ran.
        #[arg(long)]
        force: bool,
    },
    /// Drop cached data for a device.
    Invalidate {
        device: String,
        /// Only this data type.
        #[arg(long, value_name = "TYPE")]
        data_type: Option<String>,
    },
    /// Remove everything from the cache.
    Clear,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(if cli.verbose { "debug" } else { "info" });

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match cli.cache_dir {
        Some(dir) => CacheConfig::resolve(Some(dir))?,
        None => CacheConfig::from_env()?,
    };
    let store = Store::from_config(&config);

    match cli.command {
        Command::Stats { json } => {
            let stats = store.stats()?;
            if json {
                let out = serde_json::to_string_pretty(&stats).map_err(pylon::PylonError::Encode)?;
                println!("{out}");
            } else {
                draw_stats(&stats)?;
            }
        }
        Command::Cleanup { interval, force } => {
            let config = match interval {
                Some(secs) => config.with_cleanup_interval(Duration::from_secs(secs)),
                None => config,
            };
            let removed = run_cleanup(&store, &config, force)?;
            info!(removed, root = %config.root.display(), "cleanup finished");
        }
        Command::Invalidate { device, data_type } => match data_type {
            Some(data_type) => {
                store.invalidate(&device, &data_type)?;
                info!(device = %device, data_type = %data_type, "invalidated entry");
            }
            None => {
                let removed = store.invalidate_device(&device)?;
                info!(device = %device, removed, "invalidated device");
            }
        },
        Command::Clear => {
            store.invalidate_all()?;
            info!(root = %config.root.display(), "cache cleared");
        }
    }

    Ok(())
}

/// Sweep expired entries, throttled by the configured interval unless forced.
fn run_cleanup<F: FileSystem>(store: &Store<F>, config: &CacheConfig, force: bool) -> Result<usize> {
    if force {
        store.cleanup()
    } else {
        store.cleanup_if_needed(config.cleanup_interval)
    }
}

/// Draw the stats panel inline, below the prompt.
fn draw_stats(stats: &pylon::CacheStats) -> Result<()> {
    let mut terminal = ratatui::init_with_options(TerminalOptions {
        viewport: Viewport::Inline(ui::stats_height(stats)),
    });
    let result = terminal.draw(|frame| ui::render_stats(frame, stats, frame.area()));
    ratatui::restore();

    result
        .map(|_| ())
        .map_err(|err| pylon::PylonError::io("draw", "stdout", err))
}
