pub mod container;
pub mod cylinder;
pub mod depot;
pub mod events;
pub mod housing;
pub mod item_types;
pub mod loader;
pub mod mailbox;
pub mod map;
pub mod movement;
pub mod pathfinding;
pub mod position;
pub mod qtree;
pub mod sight;
pub mod spectators;
pub mod state;
pub mod teleport;
pub mod tile;
pub mod towns;
pub mod transfer;
pub mod trash_holder;
pub mod zones;
