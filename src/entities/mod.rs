pub mod creature;
pub mod inventory;
pub mod item;
