//! region_counts - inspect and reset region counters and stored events

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use regionwatch::{parse_timestamp, DetectionEvent, EventStore, RegionCountStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the region counts snapshot.
    #[arg(long, env = "REGIONWATCH_COUNTS_PATH", default_value = "region_count.json")]
    counts_path: PathBuf,
    /// Base directory of stored events.
    #[arg(long, env = "REGIONWATCH_EVENTS_DIR", default_value = "events")]
    events_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print unique counts per region as JSON.
    Show,
    /// Reset one region, or every region when no name is given.
    Clear {
        #[arg(long)]
        region: Option<String>,
    },
    /// List stored events, optionally filtered.
    Events {
        /// Only events from this camera id.
        #[arg(long)]
        camera: Option<u32>,
        /// Inclusive lower bound, "yyyy-MM-dd HH:mm:ss".
        #[arg(long, requires = "until")]
        since: Option<String>,
        /// Inclusive upper bound, "yyyy-MM-dd HH:mm:ss".
        #[arg(long, requires = "since")]
        until: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::Show => {
            let store = load_counts(&args.counts_path)?;
            println!("{}", serde_json::to_string_pretty(&store.get_all())?);
        }
        Command::Clear { region } => {
            let store = load_counts(&args.counts_path)?;
            match region {
                Some(name) => {
                    if !store.clear_region(&name) {
                        return Err(anyhow!("region '{}' has no counter", name));
                    }
                    log::info!("cleared region '{}'", name);
                }
                None => {
                    store.clear_all();
                    log::info!("cleared all regions");
                }
            }
            store.save_to_file(&args.counts_path)?;
        }
        Command::Events {
            camera,
            since,
            until,
        } => {
            let store = EventStore::new(&args.events_dir);
            store.load_from_directory()?;
            let mut events: Vec<DetectionEvent> = match (since, until) {
                (Some(since), Some(until)) => {
                    store.by_time_range(parse_timestamp(&since)?, parse_timestamp(&until)?)
                }
                _ => store.all(),
            };
            if let Some(camera_id) = camera {
                events.retain(|e| e.camera_id == camera_id);
            }
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }
    Ok(())
}

fn load_counts(path: &Path) -> Result<RegionCountStore> {
    let store = RegionCountStore::new();
    if path.exists() {
        store.load_from_file(path)?;
    } else {
        log::warn!("no counts snapshot at {}", path.display());
    }
    Ok(store)
}
