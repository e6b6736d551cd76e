pub mod map_items;
pub mod prop_stream;
