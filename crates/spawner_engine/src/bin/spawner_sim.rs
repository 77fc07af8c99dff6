//! Spawner simulation
//!
//! Places a few spawners, opens a panel on each, runs the engine for a while
//! and prints the final snapshots as JSON.
//!
//! Run with: cargo run -p spawner_engine --bin spawner_sim -- [config.toml] [seconds]

use spawner_engine::prelude::*;
use std::path::Path;
use std::thread;
use std::time::Duration;

const DEFAULT_CONFIG: &str = "crates/spawner_engine/spawners.toml";
const DEFAULT_SECONDS: u64 = 10;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("Simulation failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let seconds = match args.next() {
        Some(s) => s.parse::<u64>()?,
        None => DEFAULT_SECONDS,
    };

    let config = load_config(&config_path)?;
    let entity_types: Vec<String> = config.mobs.keys().cloned().collect();
    if entity_types.is_empty() {
        log::warn!("No [mobs] defined; spawners will only track their timers");
    }

    let engine = SpawnerEngine::builder(config).threaded(true).build();

    let types = if entity_types.is_empty() {
        vec!["ZOMBIE".to_string()]
    } else {
        entity_types
    };
    for (i, entity_type) in types.iter().enumerate() {
        let spawner = engine.place(Location::new("world", i as i32 * 16, 64, 0), entity_type)?;
        engine.set_stack_size(spawner.id(), 1 + i as u32 * 4)?;
        engine.open_panel(
            ViewerId::new(format!("viewer-{}", i)),
            spawner.id(),
            ViewKind::Primary,
        )?;
    }

    engine.start();
    log::info!("Running {} spawners for {}s", engine.manager().len(), seconds);
    thread::sleep(Duration::from_secs(seconds));
    engine.stop();

    let stats = engine.stats();
    log::info!("Engine: {}", serde_json::to_string(&stats)?);
    log::info!("View: {:?}", engine.view().stats());

    println!("{}", serde_json::to_string_pretty(&engine.snapshot_all())?);
    Ok(())
}

fn load_config(path: &str) -> Result<SpawnerConfig, ConfigError> {
    if Path::new(path).exists() {
        log::info!("Loading configuration from {}", path);
        SpawnerConfig::load(path)
    } else {
        log::warn!("Config file {} not found, using defaults", path);
        Ok(SpawnerConfig::default())
    }
}
