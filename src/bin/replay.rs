//! Replay driver for the context engine.
//!
//! Reads a JSONL stream of [`context_engine::Fix`] records (one per line,
//! from a file or stdin) and drives a [`DetectionEngine`] end-to-end exactly
//! as a live platform adapter would, printing each published
//! `DetectionState` as it is produced. Useful for replaying a captured trip
//! against a candidate config change without a device.
//!
//! ```bash
//! ./replay --input trip.jsonl --data-dir /tmp/ctx-engine
//! ```

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use clap::Parser;
use context_engine::clock::SystemClock;
use context_engine::config::{self, DetectionConfig};
use context_engine::footprint_cache::{FootprintCache, MapServiceClient};
use context_engine::storage::{EngineStorage, ProcessLock};
use context_engine::types::Fix;
use context_engine::{Clock, DetectionEngine};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "replay")]
#[command(about = "Replays a JSONL fix stream through the context engine")]
struct Args {
    /// Path to a JSONL file of `Fix` records. Reads stdin if omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory for the engine's persisted sled state. Runs in-memory,
    /// non-persistent mode if omitted.
    #[arg(long, env = "CONTEXT_ENGINE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Base URL of the map-footprint service.
    #[arg(long, env = "CONTEXT_ENGINE_MAP_SERVICE_URL", default_value = "http://localhost:8080")]
    map_service_url: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = DetectionConfig::load();
    config::init(cfg.clone());

    let _lock = args
        .data_dir
        .as_ref()
        .map(ProcessLock::acquire)
        .transpose()?;

    let storage = match &args.data_dir {
        Some(dir) => Some(EngineStorage::open(dir)?),
        None => None,
    };

    let client = MapServiceClient::new(
        args.map_service_url.clone(),
        StdDuration::from_secs(cfg.footprint_cache.fetch_timeout_seconds),
    );
    let cache = FootprintCache::new(client, storage.clone(), cfg.footprint_cache.clone());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut engine = DetectionEngine::new(clock, cfg.clone(), cache, storage);

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(run(&mut engine, &args))
}

async fn run(engine: &mut DetectionEngine, args: &Args) -> anyhow::Result<()> {
    let lines: Box<dyn Iterator<Item = io::Result<String>>> = match &args.input {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            Box::new(io::BufReader::new(file).lines())
        }
        None => Box::new(io::stdin().lock().lines()),
    };

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fix: Fix = serde_json::from_str(&line)?;

        let Some(outcome) = engine.process_fix(fix).await else {
            tracing::debug!("dropped stale fix");
            continue;
        };

        println!("{}", serde_json::to_string(&outcome.state)?);
    }

    Ok(())
}
