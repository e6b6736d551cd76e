use crate::error::WorldError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub world_file: PathBuf,
    pub log_level: log::LevelFilter,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err("usage: tibia-world <asset-root> [world-file]".to_string());
        }

        let root = Path::new(&args[1]).to_path_buf();
        let world_file = if args.len() > 2 {
            PathBuf::from(&args[2])
        } else {
            env_value("TIBIA_WORLD_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| root.join("world.yml"))
        };
        let log_level = match env_value("TIBIA_LOG_LEVEL") {
            Some(value) => value
                .parse::<log::LevelFilter>()
                .map_err(|_| format!("invalid TIBIA_LOG_LEVEL '{}'", value))?,
            None => log::LevelFilter::Info,
        };
        Ok(Self {
            root,
            world_file,
            log_level,
        })
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Gameplay switches the world engine consults while validating moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Only players invited to a house may move items on its tiles.
    pub only_invited_can_move_house_items: bool,
    /// The account that owns a house character owns the house for all of its characters.
    pub house_owned_by_account: bool,
    /// Either hand accepts any hand item; otherwise left is weapon, right is shield/quiver.
    pub classic_equipment_slots: bool,
    pub max_depot_items: u32,
    pub spectator_cache_capacity: usize,
    /// Fixed seed for the placement shuffle; random when absent.
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            only_invited_can_move_house_items: true,
            house_owned_by_account: false,
            classic_equipment_slots: false,
            max_depot_items: 2000,
            spectator_cache_capacity: 4096,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, WorldError> {
        if !path.exists() {
            log::debug!("no engine config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, WorldError> {
        let config: EngineConfig = serde_yaml::from_str(text)?;
        if config.spectator_cache_capacity == 0 {
            return Err(WorldError::Config(
                "spectator_cache_capacity must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}
