use crate::entities::creature::CreatureId;
use crate::error::WorldError;
use crate::world::position::Position;
use crate::world::state::WorldState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Town {
    pub id: u32,
    pub name: String,
    pub temple: Position,
}

#[derive(Debug, Clone, Default)]
pub struct Towns {
    towns: BTreeMap<u32, Town>,
    waypoints: BTreeMap<String, Position>,
}

impl Towns {
    pub fn add(&mut self, town: Town) -> Result<(), WorldError> {
        if self.towns.contains_key(&town.id) {
            return Err(WorldError::Duplicate {
                kind: "town",
                id: town.id,
            });
        }
        self.towns.insert(town.id, town);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&Town> {
        self.towns.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Town> {
        self.towns
            .values()
            .find(|town| town.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Town> {
        self.towns.values()
    }

    pub fn len(&self) -> usize {
        self.towns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towns.is_empty()
    }

    /// Named map positions; names compare case-insensitively and a later
    /// entry replaces an earlier one.
    pub fn add_waypoint(&mut self, name: &str, position: Position) {
        self.waypoints.insert(name.to_lowercase(), position);
    }

    pub fn waypoint(&self, name: &str) -> Option<Position> {
        self.waypoints.get(&name.to_lowercase()).copied()
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }
}

impl WorldState {
    /// Temple of the player's home town.
    pub fn temple_position(&self, player: CreatureId) -> Option<Position> {
        let town_id = self.creature(player)?.as_player()?.town_id;
        self.towns.get(town_id).map(|town| town.temple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::test_support::{fixture, spawn_monster, spawn_player};

    #[test]
    fn duplicate_towns_are_rejected() {
        let mut towns = Towns::default();
        let town = Town {
            id: 1,
            name: "Thais".to_string(),
            temple: Position::new(100, 100, 7),
        };
        towns.add(town.clone()).expect("first");
        assert!(matches!(
            towns.add(town),
            Err(WorldError::Duplicate { kind: "town", id: 1 })
        ));
        assert_eq!(towns.by_name("thais").map(|town| town.id), Some(1));

        towns.add_waypoint("Thais Depot", Position::new(105, 98, 7));
        towns.add_waypoint("thais depot", Position::new(106, 98, 7));
        assert_eq!(towns.waypoint("THAIS DEPOT"), Some(Position::new(106, 98, 7)));
        assert_eq!(towns.waypoint_count(), 1);
    }

    #[test]
    fn players_resolve_their_home_temple() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let monster = spawn_monster(&mut world, "Rat", (101, 100, 7));
        assert_eq!(world.temple_position(player), world.towns.get(1).map(|town| town.temple));
        assert!(world.temple_position(player).is_some());
        assert_eq!(world.temple_position(monster), None);

        if let Some(data) = world.creature_mut(player).and_then(|c| c.as_player_mut()) {
            data.town_id = 77;
        }
        assert_eq!(world.temple_position(player), None);
    }
}
