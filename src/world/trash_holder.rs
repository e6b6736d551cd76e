use crate::entities::creature::CreatureId;
use crate::entities::item::{ItemId, ItemTypeId};
use crate::world::cylinder::{Cylinder, CylinderFlags, CylinderId, CylinderLink, ReturnValue, Thing};
use crate::world::state::WorldState;
use crate::world::tile::{item_has_property, ItemProperty, TileFlags};

/// Swallows whatever is put on or into it.
#[derive(Debug, Clone, Copy)]
pub struct TrashHolderCylinder(pub ItemId);

impl TrashHolderCylinder {
    fn parent(&self, world: &WorldState) -> Option<CylinderId> {
        world.item(self.0).and_then(|entry| entry.parent)
    }

    /// Hangable items thrown onto a trash ground that can hold them stay.
    fn keeps(&self, world: &WorldState, item: ItemId) -> bool {
        if !world.item_type_of(item).hangable || !world.item_type_of(self.0).is_ground_tile() {
            return false;
        }
        self.parent(world)
            .and_then(CylinderId::as_tile)
            .and_then(|position| world.map.tile(position))
            .map_or(false, |tile| tile.has_flag(TileFlags::SUPPORTS_HANGABLE))
    }
}

impl Cylinder for TrashHolderCylinder {
    fn query_add(
        &self,
        _world: &WorldState,
        _index: i32,
        _thing: Thing,
        _count: u32,
        _flags: CylinderFlags,
        _actor: Option<CreatureId>,
    ) -> ReturnValue {
        ReturnValue::NoError
    }

    fn query_max_count(
        &self,
        _world: &WorldState,
        _index: i32,
        _thing: Thing,
        count: u32,
        _flags: CylinderFlags,
    ) -> (ReturnValue, u32) {
        (ReturnValue::NoError, count.max(1))
    }

    fn query_remove(
        &self,
        _world: &WorldState,
        _thing: Thing,
        _count: u32,
        _flags: CylinderFlags,
        _actor: Option<CreatureId>,
    ) -> ReturnValue {
        ReturnValue::NotPossible
    }

    fn query_destination(
        &self,
        _world: &WorldState,
        _index: &mut i32,
        _thing: Thing,
        _dest_item: &mut Option<ItemId>,
        _flags: &mut CylinderFlags,
    ) -> CylinderId {
        CylinderId::Item(self.0)
    }

    fn add_thing(&self, world: &mut WorldState, _index: i32, thing: Thing) {
        let Some(item) = thing.item() else {
            return;
        };
        if item == self.0 || !item_has_property(world, item, ItemProperty::Moveable) {
            return;
        }
        if self.keeps(world, item) {
            return;
        }
        let attached = world.item(item).map_or(false, |entry| entry.parent.is_some());
        if attached {
            world.internal_remove_item(item, -1, false, CylinderFlags::empty());
        } else {
            world.release_item(item);
        }
        log::trace!("item {} trashed", item.0);
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
    use crate::world::cylinder::INDEX_WHEREEVER;
    use crate::world::position::Position;
    use crate::world::state::test_support::{fixture, spawn_player, COIN, TRASH, WALL};
    use crate::world::tile::TileCylinder;

    #[test]
    fn items_thrown_onto_a_trash_tile_disappear() {
        let mut world = fixture();
        let trash_position = Position::new(102, 100, 7);
        let trash = world.create_item(TRASH, 1);
        TileCylinder(trash_position).add_thing(&mut world, 0, Thing::Item(trash));

        let source = Position::new(101, 100, 7);
        let coins = world.create_item(COIN, 7);
        TileCylinder(source).add_thing(&mut world, 0, Thing::Item(coins));
        let (ret, _) = world.internal_move_item(
            CylinderId::Tile(source),
            CylinderId::Tile(trash_position),
            INDEX_WHEREEVER,
            coins,
            7,
            CylinderFlags::empty(),
            None,
        );
        assert!(ret.is_ok());
        assert!(world.item(coins).is_none());
        assert!(world.item(trash).is_some());
        let tile = world.map.tile(trash_position).expect("tile");
        assert!(tile.contains_item(trash));
        assert_eq!(tile.item_count(), 1);
    }

    #[test]
    fn creatures_and_fixed_items_are_left_alone() {
        let mut world = fixture();
        let trash = world.create_item(TRASH, 1);
        let position = Position::new(102, 100, 7);
        TileCylinder(position).add_thing(&mut world, 0, Thing::Item(trash));
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));

        let cylinder = TrashHolderCylinder(trash);
        cylinder.add_thing(&mut world, 0, Thing::Creature(player));
        assert!(world.creature(player).is_some());

        let wall = world.create_item(WALL, 1);
        cylinder.add_thing(&mut world, 0, Thing::Item(wall));
        assert!(world.item(wall).is_some());
        cylinder.add_thing(&mut world, 0, Thing::Item(trash));
        assert!(world.item(trash).is_some());
    }
}
