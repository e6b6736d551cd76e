use crate::entities::creature::CreatureId;
use crate::entities::item::{ItemId, ItemTypeId, ItemVariant};
use crate::world::cylinder::{
    Cylinder, CylinderFlags, CylinderId, CylinderLink, ReturnValue, Thing, INDEX_WHEREEVER,
};
use crate::world::position::{Direction, Position};
use crate::world::state::WorldState;
use crate::world::tile::TileCylinder;

/// Sends whatever lands on its tile to a fixed destination.
#[derive(Debug, Clone, Copy)]
pub struct TeleportCylinder(pub ItemId);

impl TeleportCylinder {
    pub fn destination(&self, world: &WorldState) -> Option<Position> {
        match world.item(self.0).map(|entry| &entry.variant) {
            Some(ItemVariant::Teleport { destination }) => Some(*destination),
            _ => None,
        }
    }

    fn parent(&self, world: &WorldState) -> Option<CylinderId> {
        world.item(self.0).and_then(|entry| entry.parent)
    }

    /// Follows teleports standing on destination tiles and reports whether
    /// the chain comes back to a position already visited.
    fn loops(&self, world: &WorldState, destination: Position) -> bool {
        let Some(start) = self.parent(world).and_then(CylinderId::as_tile) else {
            return false;
        };
        let mut visited = vec![start];
        let mut next = TileCylinder(destination).teleport_item(world);
        while let Some(teleport) = next {
            let Some(position) = TeleportCylinder(teleport).destination(world) else {
                break;
            };
            if visited.contains(&position) {
                log::warn!("possible infinite teleport loop at {}", position);
                return true;
            }
            if world.map.tile(position).is_none() {
                break;
            }
            visited.push(position);
            next = TileCylinder(position).teleport_item(world);
        }
        false
    }
}

impl Cylinder for TeleportCylinder {
    fn query_add(
        &self,
        _world: &WorldState,
        _index: i32,
        _thing: Thing,
        _count: u32,
        _flags: CylinderFlags,
        _actor: Option<CreatureId>,
    ) -> ReturnValue {
        ReturnValue::NotPossible
    }

    fn query_max_count(
        &self,
        _world: &WorldState,
        _index: i32,
        _thing: Thing,
        _count: u32,
        _flags: CylinderFlags,
    ) -> (ReturnValue, u32) {
        (ReturnValue::NotPossible, 0)
    }

    fn query_remove(
        &self,
        _world: &WorldState,
        _thing: Thing,
        _count: u32,
        _flags: CylinderFlags,
        _actor: Option<CreatureId>,
    ) -> ReturnValue {
        ReturnValue::NoError
    }

    fn query_destination(
        &self,
        world: &WorldState,
        _index: &mut i32,
        _thing: Thing,
        _dest_item: &mut Option<ItemId>,
        _flags: &mut CylinderFlags,
    ) -> CylinderId {
        self.parent(world).unwrap_or(CylinderId::Item(self.0))
    }

    fn add_thing(&self, world: &mut WorldState, _index: i32, thing: Thing) {
        let Some(destination) = self.destination(world) else {
            return;
        };
        if world.map.tile(destination).is_none() || self.loops(world, destination) {
            return;
        }

        match thing {
            Thing::Creature(creature) => {
                let Some(origin) = world.creature(creature).map(|entry| entry.position) else {
                    return;
                };
                let facing = if origin.x > destination.x {
                    Direction::West
                } else {
                    Direction::East
                };
                world.turn_creature(creature, facing);
                world.move_creature(creature, destination, false);
            }
            Thing::Item(item) => {
                let Some(entry) = world.item(item) else {
                    return;
                };
                let count = u32::from(entry.count);
                let to = CylinderId::Tile(destination);
                let ret = match entry.parent {
                    Some(from) => {
                        world
                            .internal_move_item(from, to, INDEX_WHEREEVER, item, count, CylinderFlags::NOLIMIT, None)
                            .0
                    }
                    None => world.internal_add_item(to, item, INDEX_WHEREEVER, CylinderFlags::NOLIMIT, false),
                };
                if !ret.is_ok() {
                    log::debug!("teleport {} could not forward item {}: {}", self.0 .0, item.0, ret);
                }
            }
        }
    }

    fn update_thing(&self, _world: &mut WorldState, _thing: Thing, _type_id: ItemTypeId, _count: u32) {}

    fn replace_thing(&self, _world: &mut WorldState, _index: u32, _thing: Thing) {}

    fn remove_thing(&self, _world: &mut WorldState, _thing: Thing, _count: u32) {}

    fn post_add_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        old_parent: Option<CylinderId>,
        index: i32,
        _link: CylinderLink,
    ) {
        if let Some(parent) = self.parent(world) {
            parent.post_add_notification(world, thing, old_parent, index, CylinderLink::Parent);
        }
    }

    fn post_remove_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        new_parent: Option<CylinderId>,
        index: i32,
        _link: CylinderLink,
    ) {
        if let Some(parent) = self.parent(world) {
            parent.post_remove_notification(world, thing, new_parent, index, CylinderLink::Parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::position::Direction;
    use crate::world::state::test_support::{fixture, spawn_player, COIN, TELEPORT};

    fn teleport_at(world: &mut WorldState, at: Position, destination: Position) -> ItemId {
        let teleport = world.create_item(TELEPORT, 1);
        if let Some(entry) = world.item_mut(teleport) {
            entry.variant = ItemVariant::Teleport { destination };
        }
        TileCylinder(at).add_thing(world, 0, Thing::Item(teleport));
        teleport
    }

    #[test]
    fn walking_onto_a_teleport_moves_the_creature() {
        let mut world = fixture();
        let pad = Position::new(101, 100, 7);
        let destination = Position::new(95, 95, 7);
        teleport_at(&mut world, pad, destination);
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));

        let ret = world.internal_move_creature_dir(player, Direction::East, CylinderFlags::empty());
        assert!(ret.is_ok());
        let creature = world.creature(player).expect("player");
        assert_eq!(creature.position, destination);
        assert_eq!(creature.direction, Direction::West);
    }

    #[test]
    fn items_dropped_on_a_teleport_are_forwarded() {
        let mut world = fixture();
        let pad = Position::new(101, 100, 7);
        let destination = Position::new(110, 100, 7);
        teleport_at(&mut world, pad, destination);

        let source = Position::new(100, 100, 7);
        let coins = world.create_item(COIN, 4);
        TileCylinder(source).add_thing(&mut world, 0, Thing::Item(coins));
        let (ret, _) = world.internal_move_item(
            CylinderId::Tile(source),
            CylinderId::Tile(pad),
            INDEX_WHEREEVER,
            coins,
            4,
            CylinderFlags::empty(),
            None,
        );
        assert!(ret.is_ok());
        assert_eq!(world.item(coins).and_then(|item| item.parent), Some(CylinderId::Tile(destination)));
    }

    #[test]
    fn looping_teleports_do_not_forward() {
        let mut world = fixture();
        let a = Position::new(101, 100, 7);
        let b = Position::new(105, 100, 7);
        let first = teleport_at(&mut world, a, b);
        teleport_at(&mut world, b, a);
        assert!(TeleportCylinder(first).loops(&world, b));

        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        world.internal_move_creature_dir(player, Direction::East, CylinderFlags::empty());
        assert_eq!(world.creature(player).map(|c| c.position), Some(a));

        let coins = world.create_item(COIN, 1);
        assert_eq!(
            TeleportCylinder(first).query_add(&world, 0, Thing::Item(coins), 1, CylinderFlags::empty(), None),
            ReturnValue::NotPossible
        );
    }
}
