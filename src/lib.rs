pub mod config;
pub mod entities;
pub mod error;
pub mod persistence;
pub mod telemetry;
pub mod world;

pub use error::{WorldError, WorldResult};
pub use world::state::WorldState;

use std::path::Path;

const ENGINE_CONFIG_FILE: &str = "engine.yml";
const HOUSE_ITEMS_FILE: &str = "house_items.bin";

/// Loads the engine configuration and the world fixture under the asset root,
/// restores saved house items and prints what was loaded.
pub fn run(args: &[String]) -> Result<(), String> {
    let config = config::AppConfig::from_args(args)?;
    telemetry::logging::init(&config.root, config.log_level)?;

    let engine = config::EngineConfig::load(&config.root.join(ENGINE_CONFIG_FILE))
        .map_err(|err| format!("engine config: {}", err))?;
    let (mut world, summary) = world::loader::load_world(&config.world_file, engine)
        .map_err(|err| format!("world load: {}", err))?;
    let house_items = restore_house_items(&mut world, &config.root.join(HOUSE_ITEMS_FILE))?;

    println!("tibia-world: {}", config.world_file.display());
    println!("- item types: {}", summary.item_types);
    println!("- towns: {}", summary.towns);
    println!("- tiles: {} ({} items)", summary.tiles, summary.items);
    println!("- houses: {} ({} saved items restored)", summary.houses, house_items);
    println!("- zones: {}", summary.zones);
    log::logger().flush();
    Ok(())
}

fn restore_house_items(world: &mut WorldState, path: &Path) -> Result<usize, String> {
    if !path.exists() {
        return Ok(0);
    }
    let data = std::fs::read(path).map_err(|err| format!("read {}: {}", path.display(), err))?;
    let records = persistence::map_items::decode_records(&data)
        .map_err(|err| format!("{}: {}", path.display(), err))?;
    Ok(world.load_house_items(&records))
}
