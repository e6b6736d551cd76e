use crate::entities::creature::CreatureId;
use crate::entities::item::{ContainerKind, ItemId, ItemTypeId, ItemVariant, MAX_STACK};
use crate::world::container::ContainerCylinder;
use crate::world::cylinder::{
    Cylinder, CylinderFlags, CylinderId, CylinderLink, ReturnValue, Thing, INDEX_WHEREEVER,
};
use crate::world::item_types::ITEM_BROWSEFIELD;
use crate::world::position::Position;
use crate::world::qtree::MAP_MAX_LAYERS;
use crate::world::state::WorldState;
use crate::world::tile::TileCylinder;

/// Browse fields hold at most this many mirrored items.
const BROWSE_FIELD_CAPACITY: u32 = 30;

impl WorldState {
    /// A browse field stands in for its tile when used as a move source.
    fn browse_source(&self, cylinder: CylinderId) -> CylinderId {
        let Some(id) = cylinder.as_item() else {
            return cylinder;
        };
        match self.item(id) {
            Some(item) if item.container_kind() == Some(ContainerKind::BrowseField) => {
                item.parent.unwrap_or(cylinder)
            }
            _ => cylinder,
        }
    }

    /// Copy of a stack with a new count. Contents of containers are not copied.
    pub(crate) fn split_stack(&mut self, item: ItemId, count: u32) -> Option<ItemId> {
        let source = self.item(item)?;
        let type_id = source.type_id;
        let attributes = source.attributes.clone();
        let copy = self.create_item(type_id, count.min(u32::from(MAX_STACK)) as u16);
        if let Some(entry) = self.item_mut(copy) {
            entry.attributes = attributes;
        }
        Some(copy)
    }

    /// Moves `count` of `item` from `from` into `to`. Returns the verdict and
    /// the item that ended up at the destination (the merged stack, the
    /// split-off part or the item itself).
    #[allow(clippy::too_many_arguments)]
    pub fn internal_move_item(
        &mut self,
        from: CylinderId,
        to: CylinderId,
        index: i32,
        item: ItemId,
        count: u32,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> (ReturnValue, Option<ItemId>) {
        let from = self.browse_source(from);
        let mut index = index;
        let mut flags = flags;
        let mut to = to;
        let mut to_item: Option<ItemId> = None;

        for _ in 0..MAP_MAX_LAYERS {
            let next = to.query_destination(self, &mut index, Thing::Item(item), &mut to_item, &mut flags);
            if next == to {
                break;
            }
            to = next;
        }

        if to_item == Some(item) {
            return (ReturnValue::NoError, Some(item));
        }

        let mut ret = to.query_add(self, index, Thing::Item(item), count, flags, actor);
        if ret == ReturnValue::NeedExchange {
            if let Some(exchange) = to_item {
                ret = self.exchange_into_source(from, to, item, exchange, flags, actor);
                if ret.is_ok() {
                    to_item = None;
                    ret = to.query_add(self, index, Thing::Item(item), count, flags, None);
                } else if ret == ReturnValue::NeedExchange {
                    ret = ReturnValue::NotEnoughRoom;
                }
            }
        }
        if !ret.is_ok() {
            return (ret, None);
        }

        let (ret_max_count, max_query_count) =
            to.query_max_count(self, index, Thing::Item(item), count, flags);
        if !ret_max_count.is_ok() && max_query_count == 0 {
            return (ret_max_count, None);
        }

        let stackable = self.item_type_of(item).stackable;
        let moved_count = if stackable {
            count.min(max_query_count)
        } else {
            max_query_count
        };

        let ret = from.query_remove(self, Thing::Item(item), moved_count, flags, actor);
        if !ret.is_ok() {
            return (ret, None);
        }

        let item_index = from.thing_index(self, Thing::Item(item));
        from.remove_thing(self, Thing::Item(item), moved_count);
        let detached = self.item(item).map_or(true, |entry| entry.parent.is_none());

        let mut update_item = None;
        let mut move_item = Some(item);
        if stackable {
            let mut merged = 0;
            if let Some(target) = to_item.filter(|target| self.items_stack(item, *target)) {
                let target_count = self.item(target).map_or(0, |entry| u32::from(entry.count));
                merged = (u32::from(MAX_STACK) - target_count).min(moved_count);
                let type_id = self.item(target).map_or(ItemTypeId(0), |entry| entry.type_id);
                to.update_thing(self, Thing::Item(target), type_id, target_count + merged);
                update_item = Some(target);
            }

            let remainder = moved_count - merged;
            move_item = if remainder == 0 {
                None
            } else if detached {
                if let Some(entry) = self.item_mut(item) {
                    entry.count = remainder as u16;
                }
                Some(item)
            } else {
                self.split_stack(item, remainder)
            };
        }

        if let Some(added) = move_item {
            to.add_thing(self, index, Thing::Item(added));
        }

        if item_index != -1 {
            from.post_remove_notification(self, Thing::Item(item), Some(to), item_index, CylinderLink::Owner);
        }
        if let Some(added) = move_item {
            let added_index = to.thing_index(self, Thing::Item(added));
            if added_index != -1 {
                to.post_add_notification(self, Thing::Item(added), Some(from), added_index, CylinderLink::Owner);
            }
        }
        if let Some(updated) = update_item {
            let updated_index = to.thing_index(self, Thing::Item(updated));
            if updated_index != -1 {
                to.post_add_notification(self, Thing::Item(updated), Some(from), updated_index, CylinderLink::Owner);
            }
        }

        // A fully merged stack no longer exists anywhere.
        if detached && move_item != Some(item) {
            self.release_item(item);
        }

        let result = move_item.or(update_item);
        if stackable && max_query_count < count {
            return (ret_max_count, result);
        }
        (ReturnValue::NoError, result)
    }

    /// Puts the occupant of the destination back where the moving item came
    /// from, making room for the move.
    fn exchange_into_source(
        &mut self,
        from: CylinderId,
        to: CylinderId,
        item: ItemId,
        exchange: ItemId,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue {
        let exchange_count = self.item(exchange).map_or(0, |entry| u32::from(entry.count));
        let source_index = from.thing_index(self, Thing::Item(item));
        let ret = from.query_add(
            self,
            source_index,
            Thing::Item(exchange),
            exchange_count,
            CylinderFlags::empty(),
            None,
        );
        if !ret.is_ok() {
            return ret;
        }

        let (ret, max_count) = from.query_max_count(
            self,
            INDEX_WHEREEVER,
            Thing::Item(exchange),
            exchange_count,
            CylinderFlags::empty(),
        );
        if !ret.is_ok() && max_count == 0 {
            return ret;
        }

        let ret = to.query_remove(self, Thing::Item(exchange), exchange_count, flags, actor);
        if !ret.is_ok() {
            return ret;
        }

        let old_index = to.thing_index(self, Thing::Item(exchange));
        to.remove_thing(self, Thing::Item(exchange), exchange_count);
        from.add_thing(self, 0, Thing::Item(exchange));
        if old_index != -1 {
            to.post_remove_notification(self, Thing::Item(exchange), Some(from), old_index, CylinderLink::Owner);
        }
        let new_index = from.thing_index(self, Thing::Item(exchange));
        if new_index != -1 {
            from.post_add_notification(self, Thing::Item(exchange), Some(to), new_index, CylinderLink::Owner);
        }
        ReturnValue::NoError
    }

    /// Same type, identical attributes and stackable.
    fn items_stack(&self, a: ItemId, b: ItemId) -> bool {
        match (self.item(a), self.item(b)) {
            (Some(a), Some(b)) => a.equals(b) && self.item_type_of(a.id).stackable,
            _ => false,
        }
    }

    /// Adds a free-standing item to `to`, topping up a matching stack first.
    pub fn internal_add_item(
        &mut self,
        to: CylinderId,
        item: ItemId,
        index: i32,
        flags: CylinderFlags,
        test: bool,
    ) -> ReturnValue {
        let (ret, remainder) = self.internal_add_item_counted(to, item, index, flags, test);
        if remainder != 0 {
            log::debug!("{} units of item {} did not fit into {:?}", remainder, item.0, to);
        }
        ret
    }

    /// Like [`WorldState::internal_add_item`], also reporting how many units of
    /// a split remainder found no room.
    pub fn internal_add_item_counted(
        &mut self,
        to: CylinderId,
        item: ItemId,
        index: i32,
        flags: CylinderFlags,
        test: bool,
    ) -> (ReturnValue, u32) {
        let Some(entry) = self.item(item) else {
            return (ReturnValue::NotPossible, 0);
        };
        let item_count = u32::from(entry.count);
        let destination = to;
        let mut index = index;
        let mut flags = flags;
        let mut to_item = None;
        let to = destination.query_destination(self, &mut index, Thing::Item(item), &mut to_item, &mut flags);

        let ret = to.query_add(self, index, Thing::Item(item), item_count, flags, None);
        if !ret.is_ok() {
            return (ret, 0);
        }
        let (ret, max_query_count) =
            destination.query_max_count(self, INDEX_WHEREEVER, Thing::Item(item), item_count, flags);
        if !ret.is_ok() {
            return (ret, 0);
        }
        if test {
            return (ReturnValue::NoError, 0);
        }

        let mut remainder_count = 0;
        match to_item.filter(|target| self.items_stack(item, *target)) {
            Some(target) => {
                let target_count = self.item(target).map_or(0, |entry| u32::from(entry.count));
                let movable = item_count.min(max_query_count);
                let merged = (u32::from(MAX_STACK) - target_count).min(movable);
                let type_id = self.item(target).map_or(ItemTypeId(0), |entry| entry.type_id);
                to.update_thing(self, Thing::Item(target), type_id, target_count + merged);

                let rest = movable - merged;
                if rest > 0 {
                    if rest != item_count {
                        if let Some(remainder) = self.split_stack(item, rest) {
                            let (ret, _) = self.internal_add_item_counted(
                                destination,
                                remainder,
                                INDEX_WHEREEVER,
                                flags,
                                false,
                            );
                            if !ret.is_ok() {
                                self.release_item(remainder);
                                remainder_count = rest;
                            }
                        }
                        self.release_item(item);
                    } else {
                        to.add_thing(self, index, Thing::Item(item));
                        let added_index = to.thing_index(self, Thing::Item(item));
                        if added_index != -1 {
                            to.post_add_notification(self, Thing::Item(item), None, added_index, CylinderLink::Owner);
                        }
                    }
                } else {
                    self.release_item(item);
                    let target_index = to.thing_index(self, Thing::Item(target));
                    if target_index != -1 {
                        to.post_add_notification(self, Thing::Item(target), None, target_index, CylinderLink::Owner);
                    }
                }
            }
            None => {
                to.add_thing(self, index, Thing::Item(item));
                let added_index = to.thing_index(self, Thing::Item(item));
                if added_index != -1 {
                    to.post_add_notification(self, Thing::Item(item), None, added_index, CylinderLink::Owner);
                }
            }
        }
        (ReturnValue::NoError, remainder_count)
    }

    /// Removes `count` units (all when negative) of an item from wherever it
    /// is. A fully removed item leaves the arena.
    pub fn internal_remove_item(
        &mut self,
        item: ItemId,
        count: i32,
        test: bool,
        flags: CylinderFlags,
    ) -> ReturnValue {
        let Some(entry) = self.item(item) else {
            return ReturnValue::NotPossible;
        };
        let Some(parent) = entry.parent else {
            return ReturnValue::NotPossible;
        };
        let cylinder = self.browse_source(parent);
        let count = if count < 0 {
            u32::from(entry.count)
        } else {
            count as u32
        };

        let ret = cylinder.query_remove(
            self,
            Thing::Item(item),
            count,
            flags | CylinderFlags::IGNORENOTMOVEABLE,
            None,
        );
        if !ret.is_ok() {
            return ret;
        }
        if !self.can_remove(item) {
            return ReturnValue::NotPossible;
        }
        if test {
            return ReturnValue::NoError;
        }

        let index = cylinder.thing_index(self, Thing::Item(item));
        cylinder.remove_thing(self, Thing::Item(item), count);
        cylinder.post_remove_notification(self, Thing::Item(item), None, index, CylinderLink::Owner);
        if self.item(item).map_or(false, |entry| entry.parent.is_none()) {
            self.release_item(item);
        }
        ReturnValue::NoError
    }

    /// Beds that belong to a house stay put.
    pub fn can_remove(&self, item: ItemId) -> bool {
        match self.item(item).map(|entry| &entry.variant) {
            Some(ItemVariant::Bed { house_id }) => house_id.is_none(),
            Some(_) => true,
            None => false,
        }
    }

    /// Changes an item's type in place, or swaps in a fresh item when the
    /// two types cannot share an instance. Returns the item now standing in
    /// the old one's place, `None` when it was consumed.
    pub fn transform_item(&mut self, item: ItemId, new_type: ItemTypeId, new_count: i32) -> Option<ItemId> {
        let entry = self.item(item)?;
        let cur_type_id = entry.type_id;
        let stackable = self.item_type_of(item).stackable;
        let sub_type = entry.sub_type(stackable);
        if cur_type_id == new_type && (new_count == -1 || (new_count == sub_type && new_count != 0)) {
            return Some(item);
        }

        let parent = entry.parent?;
        let cylinder = self.browse_source(parent);
        let index = cylinder.thing_index(self, Thing::Item(item));
        if index == -1 {
            return Some(item);
        }
        let Some(target_type) = self.item_types.get(new_type) else {
            log::warn!("transform of item {} into unknown type {}", item.0, new_type.0);
            return Some(item);
        };
        let target_on_top = target_type.always_on_top;
        let target_group = target_type.group;
        let target_has_sub_type = target_type.stackable || target_type.is_splash();
        let current_type = self.item_type_of(item);
        let current_on_top = current_type.always_on_top;
        let current_group = current_type.group;

        if current_on_top != target_on_top {
            // Moves between the down and top lists of a tile.
            let count = self.item(item).map_or(1, |entry| u32::from(entry.count));
            cylinder.remove_thing(self, Thing::Item(item), count);
            cylinder.post_remove_notification(self, Thing::Item(item), Some(cylinder), index, CylinderLink::Owner);
            let count = if new_count == -1 { count } else { new_count.max(0) as u32 };
            self.set_item_type(item, new_type, count);
            cylinder.add_thing(self, 0, Thing::Item(item));
            let Some(new_parent) = self.item(item).and_then(|entry| entry.parent) else {
                self.release_item(item);
                return None;
            };
            let new_index = new_parent.thing_index(self, Thing::Item(item));
            new_parent.post_add_notification(self, Thing::Item(item), Some(cylinder), new_index, CylinderLink::Owner);
            return Some(item);
        }

        if current_group == target_group {
            if new_count == 0 && stackable {
                self.internal_remove_item(item, -1, false, CylinderFlags::empty());
                return None;
            }
            cylinder.post_remove_notification(self, Thing::Item(item), Some(cylinder), index, CylinderLink::Owner);
            let count = if new_count != -1 && target_has_sub_type {
                new_count as u32
            } else {
                sub_type.max(0) as u32
            };
            cylinder.update_thing(self, Thing::Item(item), new_type, count);
            cylinder.post_add_notification(self, Thing::Item(item), Some(cylinder), index, CylinderLink::Owner);
            return Some(item);
        }

        let count = if new_count == -1 { 1 } else { new_count.max(1) as u16 };
        let replacement = self.create_item(new_type, count);
        cylinder.replace_thing(self, index as u32, Thing::Item(replacement));
        cylinder.post_add_notification(self, Thing::Item(replacement), Some(cylinder), index, CylinderLink::Owner);
        self.set_item_parent(item, None);
        cylinder.post_remove_notification(self, Thing::Item(item), Some(cylinder), index, CylinderLink::Owner);
        self.release_item(item);
        Some(replacement)
    }

    /// Opens (or returns the open) browse field of a tile. It lists the
    /// tile's moveable items and containers; they stay owned by the tile.
    pub fn browse_field(&mut self, position: Position) -> Option<ItemId> {
        if !self.map.has_tile(position) {
            return None;
        }
        if let Some(existing) = self.browse_field_at(position) {
            return Some(existing);
        }

        let field = self.create_container(ITEM_BROWSEFIELD, ContainerKind::BrowseField, BROWSE_FIELD_CAPACITY);
        self.set_item_parent(field, Some(CylinderId::Tile(position)));
        self.browse_fields.insert(position, field);

        let items = TileCylinder(position).all_items(self);
        let cylinder = ContainerCylinder(field);
        for item in items {
            if TileCylinder::mirrors_into_browse_field(self, item) {
                cylinder.mirror_add(self, item);
            }
        }
        log::trace!("browse field opened at {}", position);
        Some(field)
    }

    /// Drops a browse field. Its listed items never left the tile.
    pub fn close_browse_field(&mut self, field: ItemId) -> bool {
        let Some(position) = self
            .item(field)
            .filter(|entry| entry.container_kind() == Some(ContainerKind::BrowseField))
            .and_then(|entry| entry.parent)
            .and_then(CylinderId::as_tile)
        else {
            return false;
        };
        self.browse_fields.remove(&position);
        if let Some(data) = self.item_mut(field).and_then(|entry| entry.container_mut()) {
            data.items.clear();
        }
        self.set_item_parent(field, None);
        self.release_item(field);
        true
    }
}
