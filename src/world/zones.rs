use crate::entities::creature::CreatureId;
use crate::entities::item::ItemId;
use crate::error::WorldError;
use crate::world::position::Position;
use crate::world::state::WorldState;
use crate::world::tile::TileCylinder;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct Zones {
    zones: BTreeMap<u16, BTreeSet<Position>>,
    by_position: HashMap<Position, BTreeSet<u16>>,
}

impl Zones {
    /// Registers a zone. Id 0 is reserved and ids are unique.
    pub fn register(&mut self, id: u16, positions: impl IntoIterator<Item = Position>) -> Result<(), WorldError> {
        if id == 0 {
            return Err(WorldError::ReservedZone);
        }
        if self.zones.contains_key(&id) {
            return Err(WorldError::DuplicateZone(id));
        }
        let positions: BTreeSet<Position> = positions.into_iter().collect();
        for position in &positions {
            self.by_position.entry(*position).or_default().insert(id);
        }
        self.zones.insert(id, positions);
        Ok(())
    }

    pub fn add_position(&mut self, id: u16, position: Position) -> bool {
        let Some(positions) = self.zones.get_mut(&id) else {
            return false;
        };
        if !positions.insert(position) {
            return false;
        }
        self.by_position.entry(position).or_default().insert(id);
        true
    }

    pub fn remove(&mut self, id: u16) -> bool {
        let Some(positions) = self.zones.remove(&id) else {
            return false;
        };
        for position in positions {
            if let Some(ids) = self.by_position.get_mut(&position) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_position.remove(&position);
                }
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.zones.clear();
        self.by_position.clear();
    }

    /// Ids of every zone covering `position`, ascending.
    pub fn zones_at(&self, position: Position) -> Vec<u16> {
        self.by_position
            .get(&position)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn positions(&self, id: u16) -> Vec<Position> {
        self.zones
            .get(&id)
            .map(|positions| positions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.zones.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

impl WorldState {
    pub fn creatures_in_zone(&self, id: u16) -> Vec<CreatureId> {
        self.zones
            .positions(id)
            .into_iter()
            .filter_map(|position| self.map.tile(position))
            .flat_map(|tile| tile.creatures().iter().copied())
            .collect()
    }

    /// Ground and stacked items on the zone's tiles, not container contents.
    pub fn items_in_zone(&self, id: u16) -> Vec<ItemId> {
        self.zones
            .positions(id)
            .into_iter()
            .flat_map(|position| TileCylinder(position).all_items(self))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::cylinder::{Cylinder, Thing};
    use crate::world::state::test_support::{fixture, spawn_player, SWORD};

    fn square(x0: u16, y0: u16, size: u16) -> Vec<Position> {
        let mut positions = Vec::new();
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                positions.push(Position::new(x, y, 7));
            }
        }
        positions
    }

    #[test]
    fn registration_rejects_reserved_and_duplicate_ids() {
        let mut zones = Zones::default();
        assert!(matches!(zones.register(0, square(100, 100, 2)), Err(WorldError::ReservedZone)));
        zones.register(3, square(100, 100, 2)).expect("zone");
        assert!(matches!(zones.register(3, Vec::new()), Err(WorldError::DuplicateZone(3))));
        assert_eq!(zones.len(), 1);
    }

    #[test]
    fn overlapping_zones_are_indexed_by_position() {
        let mut zones = Zones::default();
        zones.register(2, square(100, 100, 3)).expect("zone");
        zones.register(1, square(102, 102, 2)).expect("zone");
        assert_eq!(zones.zones_at(Position::new(102, 102, 7)), vec![1, 2]);
        assert_eq!(zones.zones_at(Position::new(100, 100, 7)), vec![2]);
        assert!(zones.zones_at(Position::new(90, 90, 7)).is_empty());

        assert!(zones.add_position(1, Position::new(90, 90, 7)));
        assert!(!zones.add_position(1, Position::new(90, 90, 7)));
        assert_eq!(zones.zones_at(Position::new(90, 90, 7)), vec![1]);

        assert!(zones.remove(2));
        assert_eq!(zones.zones_at(Position::new(102, 102, 7)), vec![1]);
        assert!(zones.zones_at(Position::new(100, 100, 7)).is_empty());
    }

    #[test]
    fn zone_queries_collect_creatures_and_items() {
        let mut world = fixture();
        world.zones.register(5, square(100, 100, 2)).expect("zone");
        let player = spawn_player(&mut world, "Ana", (101, 101, 7));
        spawn_player(&mut world, "Bruno", (105, 105, 7));
        let sword = world.create_item(SWORD, 1);
        TileCylinder(Position::new(100, 100, 7)).add_thing(&mut world, 0, Thing::Item(sword));

        assert_eq!(world.creatures_in_zone(5), vec![player]);
        let items = world.items_in_zone(5);
        assert!(items.contains(&sword));
        // Four grounds and the sword.
        assert_eq!(items.len(), 5);
    }
}
