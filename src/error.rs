use crate::world::position::Position;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("world fixture error: {0}")]
    Fixture(String),

    #[error("unknown item type {0}")]
    UnknownItemType(u16),

    #[error("no tile at ({}, {}, {})", .0.x, .0.y, .0.z)]
    MissingTile(Position),

    #[error("zone {0} is already registered")]
    DuplicateZone(u16),

    #[error("zone id 0 is reserved")]
    ReservedZone,

    #[error("duplicate {kind} id {id}")]
    Duplicate { kind: &'static str, id: u32 },

    #[error("property stream: {0}")]
    PropStream(String),
}

pub type WorldResult<T> = Result<T, WorldError>;
