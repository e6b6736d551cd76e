use crate::config::EngineConfig;
use crate::entities::creature::CreatureId;
use crate::world::cylinder::{Cylinder, CylinderFlags, CylinderId, CylinderLink, ReturnValue, Thing};
use crate::world::events::WorldEvent;
use crate::world::position::{Direction, Position};
use crate::world::qtree::{LeafId, QTree, QTreeLeafNode, FLOOR_SIZE, MAP_MAX_LAYERS};
use crate::world::spectators::SpectatorCache;
use crate::world::state::WorldState;
use crate::world::tile::{Tile, TileCylinder, TileFlags};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Offsets tried around a blocked login position.
const NORMAL_PLACEMENT: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// The first four entries are shuffled among themselves, then the rest.
const EXTENDED_PLACEMENT: [(i32, i32); 12] = [
    (0, -2),
    (2, 0),
    (0, 2),
    (-2, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 1),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// The spatial index plus the state that travels with it.
#[derive(Debug)]
pub struct Map {
    pub(crate) qtree: QTree,
    pub spectators: SpectatorCache,
    pub(crate) rng: StdRng,
    tile_count: usize,
}

impl Default for Map {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Map {
    pub fn new(config: &EngineConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            qtree: QTree::default(),
            spectators: SpectatorCache::new(config.spectator_cache_capacity),
            rng,
            tile_count: 0,
        }
    }

    pub fn tile(&self, position: Position) -> Option<&Tile> {
        if position.z >= MAP_MAX_LAYERS {
            return None;
        }
        let leaf = self
            .qtree
            .get_leaf(u32::from(position.x), u32::from(position.y))?;
        self.qtree
            .leaf(leaf)
            .floor(position.z)?
            .tile(position.x, position.y)
    }

    pub fn tile_mut(&mut self, position: Position) -> Option<&mut Tile> {
        if position.z >= MAP_MAX_LAYERS {
            return None;
        }
        let leaf = self
            .qtree
            .get_leaf(u32::from(position.x), u32::from(position.y))?;
        self.qtree
            .leaf_mut(leaf)
            .floor_mut(position.z)?
            .tile_mut(position.x, position.y)
    }

    /// Lookup by signed coordinates; anything outside the map is `None`.
    pub fn tile_at(&self, x: i32, y: i32, z: i32) -> Option<&Tile> {
        let x = u16::try_from(x).ok()?;
        let y = u16::try_from(y).ok()?;
        let z = u8::try_from(z).ok()?;
        self.tile(Position::new(x, y, z))
    }

    pub fn has_tile(&self, position: Position) -> bool {
        self.tile(position).is_some()
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn leaf_count(&self) -> usize {
        self.qtree.leaf_count()
    }

    pub fn leaf_at(&self, position: Position) -> Option<&QTreeLeafNode> {
        self.qtree
            .get_leaf(u32::from(position.x), u32::from(position.y))
            .map(|leaf| self.qtree.leaf(leaf))
    }

    fn leaf_id_at(&self, position: Position) -> Option<LeafId> {
        self.qtree
            .get_leaf(u32::from(position.x), u32::from(position.y))
    }

    /// Creates the leaf for (x, y) and, when it is new, links it with the
    /// leaves around it so spectator walks can follow sibling links.
    fn create_linked_leaf(&mut self, x: u16, y: u16) -> LeafId {
        let (leaf, created) = self.qtree.create_leaf(u32::from(x), u32::from(y));
        if !created {
            return leaf;
        }
        let (x, y) = (u32::from(x), u32::from(y));
        let size = u32::from(FLOOR_SIZE);
        if let Some(north) = y.checked_sub(size).and_then(|ny| self.qtree.get_leaf(x, ny)) {
            self.qtree.leaf_mut(north).leaf_s = Some(leaf);
        }
        if let Some(west) = x.checked_sub(size).and_then(|wx| self.qtree.get_leaf(wx, y)) {
            self.qtree.leaf_mut(west).leaf_e = Some(leaf);
        }
        let south = self.qtree.get_leaf(x, y + size);
        let east = self.qtree.get_leaf(x + size, y);
        let node = self.qtree.leaf_mut(leaf);
        node.leaf_s = south;
        node.leaf_e = east;
        leaf
    }

    /// Puts `tile` into an empty cell. An occupied cell keeps its tile and
    /// the incoming one is handed back for merging.
    fn install(&mut self, tile: Tile) -> Option<Tile> {
        let position = tile.position();
        let leaf = self.create_linked_leaf(position.x, position.y);
        let floor = self.qtree.leaf_mut(leaf).create_floor(position.z);
        if floor.tile(position.x, position.y).is_some() {
            return Some(tile);
        }
        floor.set(position.x, position.y, Some(tile));
        self.tile_count += 1;
        None
    }

    /// Returns the tile at `position`, creating an empty one if needed.
    pub fn ensure_tile(&mut self, position: Position) -> Option<&mut Tile> {
        if position.z >= MAP_MAX_LAYERS {
            log::error!("attempt to create a tile on invalid coordinate {}", position);
            return None;
        }
        if !self.has_tile(position) {
            self.install(Tile::new(position));
        }
        self.tile_mut(position)
    }

    fn take_tile(&mut self, position: Position) -> Option<Tile> {
        let leaf = self.leaf_id_at(position)?;
        let floor = self.qtree.leaf_mut(leaf).floor_mut(position.z)?;
        let taken = floor.set(position.x, position.y, None);
        if taken.is_some() {
            self.tile_count -= 1;
        }
        taken
    }

    pub(crate) fn add_leaf_creature(&mut self, position: Position, creature: CreatureId, is_player: bool) {
        if let Some(leaf) = self.leaf_id_at(position) {
            self.qtree.leaf_mut(leaf).add_creature(creature, is_player);
        }
    }

    pub(crate) fn remove_leaf_creature(&mut self, position: Position, creature: CreatureId) {
        if let Some(leaf) = self.leaf_id_at(position) {
            self.qtree.leaf_mut(leaf).remove_creature(creature);
        }
    }
}

impl WorldState {
    /// Sets the tile at its position. If a tile is already there the new
    /// tile's items are added onto it (ground last, replacing the old one).
    pub fn set_tile(&mut self, tile: Tile) {
        let position = tile.position();
        if position.z >= MAP_MAX_LAYERS {
            log::error!("attempt to set tile on invalid coordinate {}", position);
            return;
        }
        let cylinder = TileCylinder(position);
        match self.map.install(tile) {
            None => cylinder.adopt_items(self),
            Some(mut incoming) => {
                let (ground, items) = incoming.take_contents();
                for item in items.into_iter().rev() {
                    cylinder.add_thing(self, 0, Thing::Item(item));
                }
                if let Some(ground) = ground {
                    cylinder.add_thing(self, 0, Thing::Item(ground));
                }
            }
        }
    }

    /// Clears a tile: players go to their temple, other creatures and every
    /// item are removed. The tile itself stays, emptied.
    pub fn remove_tile(&mut self, position: Position) {
        let Some(tile) = self.map.tile(position) else {
            return;
        };
        let creatures: Vec<CreatureId> = tile.creatures().iter().rev().copied().collect();
        let items: Vec<_> = tile.items().to_vec();
        let ground = tile.ground;

        for creature in creatures {
            let is_player = self.creature(creature).map_or(false, |entry| entry.is_player());
            match self.temple_position(creature).filter(|_| is_player) {
                Some(temple) => {
                    self.internal_teleport(Thing::Creature(creature), temple, false, CylinderFlags::NOLIMIT);
                }
                None => {
                    self.remove_creature(creature);
                }
            }
        }
        for item in items {
            self.internal_remove_item(item, -1, false, CylinderFlags::empty());
        }
        if let Some(ground) = ground {
            self.internal_remove_item(ground, -1, false, CylinderFlags::empty());
            if let Some(tile) = self.map.tile_mut(position) {
                tile.ground = None;
            }
        }
    }

    /// Drops the tile from the index without touching what it held.
    pub fn detach_tile(&mut self, position: Position) -> Option<Tile> {
        self.map.take_tile(position)
    }

    /// Places a creature at `center`, or on a free neighbour when the center
    /// refuses it. Emits the appear event and the owner notification.
    pub fn place_creature(
        &mut self,
        center: Position,
        creature: CreatureId,
        extended_pos: bool,
        force_login: bool,
    ) -> bool {
        let Some(entry) = self.creature(creature) else {
            return false;
        };
        if entry.placed {
            return false;
        }

        let mut target = None;
        let mut place_in_pz = false;
        if let Some(tile) = self.map.tile(center) {
            place_in_pz = tile.has_flag(TileFlags::PROTECTIONZONE);
            let ret = TileCylinder(center).query_add(
                self,
                0,
                Thing::Creature(creature),
                1,
                CylinderFlags::IGNOREBLOCKITEM,
                None,
            );
            if force_login || ret.is_ok() || ret == ReturnValue::PlayerIsNotInvited {
                target = Some(center);
            }
        }

        if target.is_none() {
            let mut candidates: Vec<(i32, i32)> = if extended_pos {
                let mut list = EXTENDED_PLACEMENT.to_vec();
                let (near, rest) = list.split_at_mut(4);
                near.shuffle(&mut self.map.rng);
                rest.shuffle(&mut self.map.rng);
                list
            } else {
                let mut list = NORMAL_PLACEMENT.to_vec();
                list.shuffle(&mut self.map.rng);
                list
            };

            for (dx, dy) in candidates.drain(..) {
                let Some(candidate) = center.offset(crate::world::position::PositionDelta {
                    dx: dx as i16,
                    dy: dy as i16,
                    dz: 0,
                }) else {
                    continue;
                };
                let Some(tile) = self.map.tile(candidate) else {
                    continue;
                };
                if place_in_pz && !tile.has_flag(TileFlags::PROTECTIONZONE) {
                    continue;
                }
                let ret = TileCylinder(candidate).query_add(
                    self,
                    0,
                    Thing::Creature(creature),
                    1,
                    CylinderFlags::empty(),
                    None,
                );
                if ret.is_ok() && (!extended_pos || self.is_sight_clear(center, candidate, false)) {
                    target = Some(candidate);
                    break;
                }
            }
        }

        let Some(target) = target else {
            log::debug!("no room to place creature {} around {}", creature.0, center);
            return false;
        };

        let mut index = 0;
        let mut dest_item = None;
        let mut flags = CylinderFlags::empty();
        let destination = TileCylinder(target).query_destination(
            self,
            &mut index,
            Thing::Creature(creature),
            &mut dest_item,
            &mut flags,
        );
        let Some(position) = destination.as_tile() else {
            return false;
        };
        TileCylinder(position).internal_add_thing(self, 0, Thing::Creature(creature));
        let is_player = self.creature(creature).map_or(false, |entry| entry.is_player());
        self.map.add_leaf_creature(position, creature, is_player);
        self.map.spectators.clear();

        let spectators = self.get_spectators(position, true, false, 0, 0, 0, 0);
        let spectators = self.players_among(spectators);
        self.events.push(WorldEvent::CreatureAppeared {
            creature,
            position,
            spectators,
        });
        TileCylinder(position).post_add_notification(
            self,
            Thing::Creature(creature),
            None,
            0,
            CylinderLink::Owner,
        );
        true
    }

    /// Moves a placed creature onto `to`. Leaving a non-adjacent tile, a
    /// different floor or arriving on a tile without ground is a teleport.
    pub fn move_creature(&mut self, creature: CreatureId, to: Position, force_teleport: bool) {
        let Some(from) = self
            .creature(creature)
            .filter(|entry| entry.placed)
            .map(|entry| entry.position)
        else {
            return;
        };
        let on_old_tile = self
            .map
            .tile(from)
            .map_or(false, |tile| tile.creatures().contains(&creature));
        let Some(new_tile) = self.map.tile(to) else {
            return;
        };
        if !on_old_tile {
            return;
        }
        let teleport = force_teleport || new_tile.ground.is_none() || !from.in_range(to, 1, 1, 0);

        let mut spectators = self.get_spectators(from, true, false, 0, 0, 0, 0);
        for spectator in self.get_spectators(to, true, false, 0, 0, 0, 0) {
            if !spectators.contains(&spectator) {
                spectators.push(spectator);
            }
        }
        let old_stack_pos = TileCylinder(from).client_index_of_creature(self, None, creature);

        TileCylinder(from).remove_thing(self, Thing::Creature(creature), 0);
        let old_leaf = self.map.leaf_id_at(from);
        let new_leaf = self.map.leaf_id_at(to);
        if old_leaf != new_leaf {
            let is_player = self.creature(creature).map_or(false, |entry| entry.is_player());
            self.map.remove_leaf_creature(from, creature);
            self.map.add_leaf_creature(to, creature, is_player);
        }
        TileCylinder(to).add_thing(self, 0, Thing::Creature(creature));
        self.map.spectators.clear();

        if !teleport {
            if let Some(entry) = self.creature_mut(creature) {
                if from.y > to.y {
                    entry.direction = Direction::North;
                } else if from.y < to.y {
                    entry.direction = Direction::South;
                }
                if from.x < to.x {
                    entry.direction = Direction::East;
                } else if from.x > to.x {
                    entry.direction = Direction::West;
                }
            }
        }

        let spectators = self.players_among(spectators);
        self.events.push(WorldEvent::CreatureMoved {
            creature,
            from,
            to,
            old_stack_pos,
            teleport,
            spectators,
        });
        TileCylinder(from).post_remove_notification(
            self,
            Thing::Creature(creature),
            Some(CylinderId::Tile(to)),
            0,
            CylinderLink::Owner,
        );
        TileCylinder(to).post_add_notification(
            self,
            Thing::Creature(creature),
            Some(CylinderId::Tile(from)),
            0,
            CylinderLink::Owner,
        );
    }

    /// Takes a creature off the map. It stays in the creature table.
    pub fn remove_creature(&mut self, creature: CreatureId) -> bool {
        let Some(position) = self
            .creature(creature)
            .filter(|entry| entry.placed)
            .map(|entry| entry.position)
        else {
            return false;
        };
        let spectators = self.get_spectators(position, true, false, 0, 0, 0, 0);
        let spectators = self.players_among(spectators);
        let stack_pos = TileCylinder(position).client_index_of_creature(self, None, creature);

        self.map.remove_leaf_creature(position, creature);
        TileCylinder(position).remove_thing(self, Thing::Creature(creature), 0);
        self.map.spectators.clear();
        if let Some(entry) = self.creature_mut(creature) {
            entry.placed = false;
        }

        self.events.push(WorldEvent::CreatureRemoved {
            creature,
            position,
            stack_pos,
            spectators,
        });
        TileCylinder(position).post_remove_notification(
            self,
            Thing::Creature(creature),
            None,
            0,
            CylinderLink::Owner,
        );
        true
    }

    fn players_among(&self, creatures: Vec<CreatureId>) -> Vec<CreatureId> {
        creatures
            .into_iter()
            .filter(|id| self.creature(*id).map_or(false, |entry| entry.is_player()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::test_support::{
        fixture, spawn_monster, spawn_player, GRASS, SWORD, COIN, WALL,
    };

    #[test]
    fn invalid_floor_is_rejected() {
        let mut world = fixture();
        let before = world.map.tile_count();
        world.set_tile(Tile::new(Position::new(10, 10, MAP_MAX_LAYERS)));
        assert_eq!(world.map.tile_count(), before);
        assert!(world.map.tile(Position::new(10, 10, MAP_MAX_LAYERS)).is_none());
    }

    #[test]
    fn set_tile_merges_into_the_existing_tile() {
        let mut world = fixture();
        let position = Position::new(300, 300, 7);
        let first_ground = world.create_item(GRASS, 1);
        let sword = world.create_item(SWORD, 1);
        let mut base = Tile::new(position);
        base.stage_item(first_ground, true, false);
        base.stage_item(sword, false, false);
        world.set_tile(base);
        assert_eq!(world.item(sword).and_then(|item| item.parent), Some(CylinderId::Tile(position)));

        let second_ground = world.create_item(GRASS, 1);
        let coins = world.create_item(COIN, 7);
        let mut patch = Tile::new(position);
        patch.stage_item(second_ground, true, false);
        patch.stage_item(coins, false, false);
        world.set_tile(patch);

        let tile = world.map.tile(position).expect("tile");
        assert_eq!(tile.ground, Some(second_ground));
        assert!(tile.down_items().contains(&sword));
        assert!(tile.down_items().contains(&coins));
        assert!(world.item(first_ground).is_none());
    }

    #[test]
    fn new_leaves_are_linked_to_their_neighbours() {
        let mut world = fixture();
        world.set_tile(Tile::new(Position::new(400, 400, 7)));
        world.set_tile(Tile::new(Position::new(408, 400, 7)));
        world.set_tile(Tile::new(Position::new(400, 408, 7)));
        let leaf = world.map.leaf_at(Position::new(400, 400, 7)).expect("leaf");
        let east = world.map.leaf_id_at(Position::new(408, 400, 7));
        let south = world.map.leaf_id_at(Position::new(400, 408, 7));
        assert_eq!(leaf.leaf_e, east);
        assert_eq!(leaf.leaf_s, south);
    }

    #[test]
    fn placement_falls_back_to_a_free_neighbour() {
        let mut world = fixture();
        let center = Position::new(100, 100, 7);
        let wall = world.create_item(WALL, 1);
        TileCylinder(center).add_thing(&mut world, 0, Thing::Item(wall));
        let rat = spawn_monster(&mut world, "rat", (110, 110, 7));
        world.remove_creature(rat);

        assert!(world.place_creature(center, rat, false, false));
        let position = world.creature(rat).map(|c| c.position).expect("rat");
        assert_ne!(position, center);
        assert!(position.in_range(center, 1, 1, 0));
        assert!(world
            .map
            .leaf_at(position)
            .map_or(false, |leaf| leaf.creature_list.contains(&rat)));
    }

    #[test]
    fn changing_floor_between_stacked_tiles_is_a_teleport() {
        let mut world = fixture();
        let lower = Position::new(100, 100, 8);
        let ground = world.create_item(GRASS, 1);
        world.map.ensure_tile(lower);
        TileCylinder(lower).add_thing(&mut world, 0, Thing::Item(ground));
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        world.events.drain();

        world.move_creature(player, lower, false);
        let moved = world.events.iter().find_map(|event| match event {
            WorldEvent::CreatureMoved { teleport, to, .. } => Some((*teleport, *to)),
            _ => None,
        });
        assert_eq!(moved, Some((true, lower)));
        assert_eq!(world.creature(player).map(|c| c.position), Some(lower));
        assert!(world.map.tile(Position::new(100, 100, 7)).map_or(false, |t| t.creatures().is_empty()));
    }

    #[test]
    fn walking_one_step_turns_the_creature() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        world.move_creature(player, Position::new(101, 100, 7), false);
        let creature = world.creature(player).expect("player");
        assert_eq!(creature.direction, Direction::East);
        let moved = world.events.iter().any(|event| {
            matches!(event, WorldEvent::CreatureMoved { teleport: false, .. })
        });
        assert!(moved);
    }

    #[test]
    fn removed_creatures_leave_tile_and_leaf() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        assert!(world.remove_creature(player));
        assert!(!world.remove_creature(player));
        let position = Position::new(100, 100, 7);
        assert!(world.map.tile(position).map_or(false, |tile| tile.creatures().is_empty()));
        assert!(world.map.leaf_at(position).map_or(true, |leaf| !leaf.creature_list.contains(&player)));
    }
}
