use crate::entities::creature::CreatureId;
use crate::entities::item::{ContainerData, ContainerKind, ItemId, ItemTypeId, MAX_STACK};
use crate::world::cylinder::{
    Cylinder, CylinderFlags, CylinderId, CylinderLink, ReturnValue, Thing, INDEX_ANYWHERE,
    INDEX_MOVE_UP, INDEX_WHEREEVER,
};
use crate::world::depot;
use crate::world::events::WorldEvent;
use crate::world::item_types::WeaponType;
use crate::world::state::WorldState;
use std::collections::VecDeque;

/// Breadth-first walk over a container's items; nested non-empty containers
/// are visited after the current level.
pub struct ContainerIterator<'a> {
    world: &'a WorldState,
    containers: VecDeque<ItemId>,
    index: usize,
}

impl<'a> ContainerIterator<'a> {
    pub fn new(world: &'a WorldState, container: ItemId) -> Self {
        let mut containers = VecDeque::new();
        if world
            .item(container)
            .and_then(|item| item.container())
            .map_or(false, |data| !data.is_empty())
        {
            containers.push_back(container);
        }
        Self {
            world,
            containers,
            index: 0,
        }
    }
}

impl Iterator for ContainerIterator<'_> {
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        loop {
            let current = *self.containers.front()?;
            let next = self
                .world
                .item(current)
                .and_then(|item| item.container())
                .and_then(|data| data.item_at(self.index));
            match next {
                Some(item) => {
                    self.index += 1;
                    let nested = self
                        .world
                        .item(item)
                        .and_then(|entry| entry.container())
                        .map_or(false, |data| !data.is_empty());
                    if nested {
                        self.containers.push_back(item);
                    }
                    return Some(item);
                }
                None => {
                    self.containers.pop_front();
                    self.index = 0;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContainerCylinder(pub ItemId);

impl ContainerCylinder {
    fn this(&self) -> CylinderId {
        CylinderId::Item(self.0)
    }

    pub fn data<'a>(&self, world: &'a WorldState) -> Option<&'a ContainerData> {
        world.item(self.0).and_then(|item| item.container())
    }

    fn data_mut<'a>(&self, world: &'a mut WorldState) -> Option<&'a mut ContainerData> {
        world.item_mut(self.0).and_then(|item| item.container_mut())
    }

    fn kind(&self, world: &WorldState) -> ContainerKind {
        self.data(world)
            .map_or(ContainerKind::Regular, |data| data.kind)
    }

    pub fn size(&self, world: &WorldState) -> usize {
        self.data(world).map_or(0, ContainerData::size)
    }

    pub fn capacity(&self, world: &WorldState) -> u32 {
        self.data(world).map_or(0, |data| data.capacity)
    }

    /// Number of items inside, nested ones included.
    pub fn holding_count(&self, world: &WorldState) -> u32 {
        ContainerIterator::new(world, self.0).count() as u32
    }

    pub fn is_holding_item(&self, world: &WorldState, item: ItemId) -> bool {
        let Some(probe) = world.item(item) else {
            return false;
        };
        ContainerIterator::new(world, self.0)
            .filter_map(|id| world.item(id))
            .any(|entry| entry.equals(probe))
    }

    pub fn content_description(&self, world: &WorldState) -> String {
        let names: Vec<&str> = ContainerIterator::new(world, self.0)
            .filter(|id| {
                world
                    .item(*id)
                    .and_then(|item| item.container())
                    .map_or(true, |data| data.is_empty())
            })
            .map(|id| world.item_type_of(id).name.as_str())
            .collect();
        if names.is_empty() {
            "nothing".to_string()
        } else {
            names.join(", ")
        }
    }

    /// Applies a weight delta here and to every enclosing container.
    pub fn update_item_weight(&self, world: &mut WorldState, diff: i64) {
        if let Some(data) = self.data_mut(world) {
            data.total_weight = apply_delta(data.total_weight, diff);
        }
        let mut parent = world.parent_of(self.this());
        while let Some(CylinderId::Item(id)) = parent {
            match world.item_mut(id).and_then(|item| item.container_mut()) {
                Some(data) => data.total_weight = apply_delta(data.total_weight, diff),
                None => break,
            }
            parent = world.parent_of(CylinderId::Item(id));
        }
    }

    fn has_visible_parent(&self, world: &WorldState) -> bool {
        matches!(world.parent_of(self.this()), Some(parent) if parent != CylinderId::Virtual)
    }

    fn notify(&self, world: &mut WorldState, build: impl FnOnce(Vec<CreatureId>) -> WorldEvent) {
        let spectators = match world.cylinder_position(self.this()) {
            Some(position) => world.get_spectators(position, false, true, 1, 1, 1, 1),
            None => Vec::new(),
        };
        world.events.push(build(spectators));
    }

    /// Appends at the back, the path used by player-initiated additions
    /// such as browse fields and depot deliveries.
    pub fn add_item_back(&self, world: &mut WorldState, item: ItemId) {
        world.set_item_parent(item, Some(self.this()));
        self.push_back_tracked(world, item);
    }

    /// Appends without taking ownership; the item keeps its parent.
    pub(crate) fn mirror_add(&self, world: &mut WorldState, item: ItemId) {
        self.push_back_tracked(world, item);
    }

    fn push_back_tracked(&self, world: &mut WorldState, item: ItemId) {
        let weight = i64::from(world.item_weight(item));
        let count = world.item(item).map_or(0, |entry| u32::from(entry.count));
        if let Some(data) = self.data_mut(world) {
            data.items.push_back(item);
            data.ammo_count += count;
        }
        self.update_item_weight(world, weight);
        if self.has_visible_parent(world) {
            let container = self.0;
            self.notify(world, |spectators| WorldEvent::ContainerItemAdded {
                container,
                item,
                spectators,
            });
        }
    }

    /// Drops a mirrored entry without touching the item's parent.
    pub(crate) fn mirror_remove(&self, world: &mut WorldState, item: ItemId) {
        let Some(index) = self.data(world).and_then(|data| data.index_of(item)) else {
            return;
        };
        let weight = i64::from(world.item_weight(item));
        let count = world.item(item).map_or(0, |entry| u32::from(entry.count));
        if let Some(data) = self.data_mut(world) {
            data.items.remove(index);
            data.ammo_count = data.ammo_count.saturating_sub(count);
        }
        self.update_item_weight(world, -weight);
        let container = self.0;
        self.notify(world, |spectators| WorldEvent::ContainerItemRemoved {
            container,
            slot: index as u32,
            spectators,
        });
    }

    /// Swaps a mirrored entry in place; neither item is reparented.
    pub(crate) fn mirror_replace(&self, world: &mut WorldState, old: ItemId, new: ItemId) {
        let Some(index) = self.data(world).and_then(|data| data.index_of(old)) else {
            return;
        };
        let diff = i64::from(world.item_weight(new)) - i64::from(world.item_weight(old));
        if let Some(data) = self.data_mut(world) {
            data.items[index] = new;
        }
        self.update_item_weight(world, diff);
        let container = self.0;
        self.notify(world, |spectators| WorldEvent::ContainerItemUpdated {
            container,
            slot: index as u32,
            item: new,
            spectators,
        });
    }

    /// Raw insertion used by loaders: back of the list, parent only.
    pub fn add_item(&self, world: &mut WorldState, item: ItemId) {
        world.set_item_parent(item, Some(self.this()));
        if let Some(data) = self.data_mut(world) {
            data.items.push_back(item);
        }
    }

    fn query_add_regular(
        &self,
        world: &WorldState,
        index: i32,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue {
        if flags.contains(CylinderFlags::CHILDISOWNER) {
            return ReturnValue::NoError;
        }
        let Some(data) = self.data(world) else {
            return ReturnValue::NotPossible;
        };
        if !data.unlocked {
            return ReturnValue::NotPossible;
        }
        let Some(item) = thing.item().and_then(|id| world.item(id)) else {
            return ReturnValue::NotPossible;
        };
        let item_type = world.item_type_of(item.id);
        if !item_type.pickupable {
            return ReturnValue::CannotPickup;
        }
        if item.id == self.0 {
            return ReturnValue::ThisIsImpossible;
        }
        if world.item_type_of(self.0).weapon_type == WeaponType::Quiver
            && item_type.weapon_type != WeaponType::Ammo
        {
            return ReturnValue::QuiverAmmoOnly;
        }
        if item.is_store_item() && data.kind != ContainerKind::DepotChest {
            return ReturnValue::ItemCannotBeMovedThere;
        }

        let mut cylinder = world.parent_of(self.this());
        let parent_is_store_inbox = matches!(
            cylinder,
            Some(CylinderId::Item(parent))
                if world.item(parent).and_then(|p| p.container_kind()) == Some(ContainerKind::StoreInbox)
        );
        if parent_is_store_inbox && world.item(self.0).map_or(false, |me| me.is_store_item()) {
            return if item.is_store_item() {
                ReturnValue::ItemCannotBeMovedThere
            } else {
                ReturnValue::CannotMoveItemIsNotStoreItem
            };
        }

        let moving = CylinderId::Item(item.id);
        let no_limit = flags.contains(CylinderFlags::NOLIMIT);
        while let Some(current) = cylinder {
            if current == moving {
                return ReturnValue::ThisIsImpossible;
            }
            if !no_limit {
                if let CylinderId::Item(id) = current {
                    if world.item(id).and_then(|entry| entry.container_kind())
                        == Some(ContainerKind::Inbox)
                    {
                        return ReturnValue::ContainerNotEnoughRoom;
                    }
                }
            }
            cylinder = world.parent_of(current);
        }
        if !no_limit && index == INDEX_WHEREEVER && data.is_full() && !data.pagination {
            return ReturnValue::ContainerNotEnoughRoom;
        }

        let top_parent = world.top_parent(self.this());
        if world.denies_house_actor(top_parent, actor) {
            return ReturnValue::PlayerIsNotInvited;
        }

        if top_parent != self.this() {
            return top_parent.query_add(
                world,
                INDEX_WHEREEVER,
                thing,
                count,
                flags | CylinderFlags::CHILDISOWNER,
                actor,
            );
        }
        ReturnValue::NoError
    }
}

fn apply_delta(total: u32, diff: i64) -> u32 {
    (i64::from(total) + diff).clamp(0, i64::from(u32::MAX)) as u32
}

impl Cylinder for ContainerCylinder {
    fn query_add(
        &self,
        world: &WorldState,
        index: i32,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue {
        match self.kind(world) {
            ContainerKind::DepotLocker => ReturnValue::NotEnoughRoom,
            ContainerKind::Inbox => depot::inbox_query_add(world, self.0, thing, flags),
            ContainerKind::StoreInbox => depot::store_inbox_query_add(world, self.0, thing, flags),
            ContainerKind::DepotChest => {
                let ret = depot::depot_chest_query_add(world, self, thing, count, flags);
                if !ret.is_ok() {
                    return ret;
                }
                self.query_add_regular(world, index, thing, count, flags, actor)
            }
            ContainerKind::Regular | ContainerKind::BrowseField => {
                self.query_add_regular(world, index, thing, count, flags, actor)
            }
        }
    }

    fn query_max_count(
        &self,
        world: &WorldState,
        index: i32,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
    ) -> (ReturnValue, u32) {
        let Some(item) = thing.item().and_then(|id| world.item(id)) else {
            return (ReturnValue::NotPossible, 0);
        };
        let Some(data) = self.data(world) else {
            return (ReturnValue::NotPossible, 0);
        };
        if flags.contains(CylinderFlags::NOLIMIT) || data.pagination {
            return (ReturnValue::NoError, count.max(1));
        }

        let free_slots = data.capacity.saturating_sub(data.size() as u32);
        if !world.item_type_of(item.id).stackable {
            if free_slots == 0 {
                return (ReturnValue::ContainerNotEnoughRoom, 0);
            }
            return (ReturnValue::NoError, free_slots);
        }

        let mut n = 0;
        if index == INDEX_WHEREEVER {
            let mut slot_index = 0;
            for entry in data.items.iter().filter_map(|id| world.item(*id)) {
                if entry.id != item.id && entry.equals(item) && entry.count < MAX_STACK {
                    let slot = slot_index;
                    slot_index += 1;
                    if self.query_add(world, slot, thing, count, flags, None).is_ok() {
                        n += u32::from(MAX_STACK - entry.count);
                    }
                }
            }
        } else if let Some(dest) = usize::try_from(index)
            .ok()
            .and_then(|slot| data.item_at(slot))
            .and_then(|id| world.item(id))
        {
            if item.equals(dest)
                && dest.count < MAX_STACK
                && self.query_add(world, index, thing, count, flags, None).is_ok()
            {
                n = u32::from(MAX_STACK - dest.count);
            }
        }

        let max_count = free_slots * u32::from(MAX_STACK) + n;
        if max_count < count {
            return (ReturnValue::ContainerNotEnoughRoom, max_count);
        }
        (ReturnValue::NoError, max_count)
    }

    fn query_remove(
        &self,
        world: &WorldState,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue {
        if self.thing_index(world, thing) == -1 {
            return ReturnValue::NotPossible;
        }
        let Some(item) = thing.item().and_then(|id| world.item(id)) else {
            return ReturnValue::NotPossible;
        };
        let item_type = world.item_type_of(item.id);
        if count == 0 || (item_type.stackable && count > u32::from(item.count)) {
            return ReturnValue::NotPossible;
        }
        if !item_type.moveable && !flags.contains(CylinderFlags::IGNORENOTMOVEABLE) {
            return ReturnValue::NotMoveable;
        }
        let top_parent = world.top_parent(self.this());
        if world.denies_house_actor(top_parent, actor) {
            return ReturnValue::PlayerIsNotInvited;
        }
        ReturnValue::NoError
    }

    fn query_destination(
        &self,
        world: &WorldState,
        index: &mut i32,
        thing: Thing,
        dest_item: &mut Option<ItemId>,
        flags: &mut CylinderFlags,
    ) -> CylinderId {
        let this = self.this();
        let Some(data) = self.data(world) else {
            return this;
        };
        if !data.unlocked {
            *dest_item = None;
            return this;
        }

        if *index == INDEX_MOVE_UP {
            *index = INDEX_WHEREEVER;
            *dest_item = None;
            return match world.parent_of(this) {
                Some(parent) if parent != CylinderId::Virtual => parent,
                _ => this,
            };
        }

        if *index == INDEX_ANYWHERE || *index >= data.capacity as i32 {
            *index = INDEX_WHEREEVER;
            *dest_item = None;
        }

        let Some(item) = thing.item().and_then(|id| world.item(id)) else {
            return this;
        };

        if *index != INDEX_WHEREEVER {
            if let Some(at_index) = usize::try_from(*index)
                .ok()
                .and_then(|slot| data.item_at(slot))
            {
                *dest_item = Some(at_index);
            }
            if let Some(sub) = *dest_item {
                if CylinderId::Item(sub).is_item_cylinder(world) {
                    *index = INDEX_WHEREEVER;
                    *dest_item = None;
                    return CylinderId::Item(sub);
                }
            }
        }

        let auto_stack = !flags.contains(CylinderFlags::IGNOREAUTOSTACK);
        if auto_stack && world.item_type_of(item.id).stackable && item.parent != Some(this) {
            if let Some(dest) = dest_item.and_then(|id| world.item(id)) {
                if dest.equals(item) && dest.count < MAX_STACK {
                    return this;
                }
            }
            for (n, entry) in data.items.iter().filter_map(|id| world.item(*id)).enumerate() {
                if entry.id != item.id && entry.equals(item) && entry.count < MAX_STACK {
                    *dest_item = Some(entry.id);
                    *index = n as i32;
                    return this;
                }
            }
        }
        this
    }

    fn add_thing(&self, world: &mut WorldState, index: i32, thing: Thing) {
        if index >= self.capacity(world) as i32 {
            return;
        }
        let Some(item) = thing.item() else {
            return;
        };
        world.set_item_parent(item, Some(self.this()));
        let weight = i64::from(world.item_weight(item));
        let count = world.item(item).map_or(0, |entry| u32::from(entry.count));
        if let Some(data) = self.data_mut(world) {
            data.items.push_front(item);
            data.ammo_count += count;
        }
        self.update_item_weight(world, weight);

        if self.has_visible_parent(world) {
            let container = self.0;
            self.notify(world, |spectators| WorldEvent::ContainerItemAdded {
                container,
                item,
                spectators,
            });
        }
    }

    fn update_thing(&self, world: &mut WorldState, thing: Thing, type_id: ItemTypeId, count: u32) {
        let index = self.thing_index(world, thing);
        let Some(item) = thing.item() else {
            return;
        };
        if index == -1 {
            return;
        }
        let old_count = world.item(item).map_or(0, |entry| u32::from(entry.count));
        let old_weight = i64::from(world.item_weight(item));
        world.set_item_type(item, type_id, count);
        let new_weight = i64::from(world.item_weight(item));
        if let Some(data) = self.data_mut(world) {
            data.ammo_count = (data.ammo_count + count).saturating_sub(old_count);
        }
        self.update_item_weight(world, new_weight - old_weight);

        if world.parent_of(self.this()).is_some() {
            let container = self.0;
            self.notify(world, |spectators| WorldEvent::ContainerItemUpdated {
                container,
                slot: index as u32,
                item,
                spectators,
            });
        }
    }

    fn replace_thing(&self, world: &mut WorldState, index: u32, thing: Thing) {
        let Some(item) = thing.item() else {
            return;
        };
        let Some(replaced) = self.data(world).and_then(|data| data.item_at(index as usize)) else {
            return;
        };
        let replaced_count = world.item(replaced).map_or(0, |entry| u32::from(entry.count));
        let replaced_weight = i64::from(world.item_weight(replaced));
        let count = world.item(item).map_or(0, |entry| u32::from(entry.count));
        if let Some(data) = self.data_mut(world) {
            data.items[index as usize] = item;
            data.ammo_count = (data.ammo_count + count).saturating_sub(replaced_count);
        }
        world.set_item_parent(item, Some(self.this()));
        let weight = i64::from(world.item_weight(item));
        self.update_item_weight(world, weight - replaced_weight);

        if world.parent_of(self.this()).is_some() {
            let container = self.0;
            self.notify(world, |spectators| WorldEvent::ContainerItemUpdated {
                container,
                slot: index,
                item,
                spectators,
            });
        }
        world.set_item_parent(replaced, None);
    }

    fn remove_thing(&self, world: &mut WorldState, thing: Thing, count: u32) {
        let Some(item) = thing.item() else {
            return;
        };
        let index = self.thing_index(world, thing);
        if index == -1 {
            return;
        }
        let container = self.0;
        let current = world.item(item).map_or(0, |entry| u32::from(entry.count));
        let old_weight = i64::from(world.item_weight(item));

        if world.item_type_of(item).stackable && count != current {
            let new_count = current.saturating_sub(count);
            if let Some(entry) = world.item_mut(item) {
                entry.count = new_count as u16;
            }
            if let Some(data) = self.data_mut(world) {
                data.ammo_count = data.ammo_count.saturating_sub(current - new_count);
            }
            let new_weight = i64::from(world.item_weight(item));
            self.update_item_weight(world, new_weight - old_weight);
            if world.parent_of(self.this()).is_some() {
                self.notify(world, |spectators| WorldEvent::ContainerItemUpdated {
                    container,
                    slot: index as u32,
                    item,
                    spectators,
                });
            }
            return;
        }

        self.update_item_weight(world, -old_weight);
        if let Some(data) = self.data_mut(world) {
            data.ammo_count = data.ammo_count.saturating_sub(current);
        }
        if world.parent_of(self.this()).is_some() {
            self.notify(world, |spectators| WorldEvent::ContainerItemRemoved {
                container,
                slot: index as u32,
                spectators,
            });
        }
        world.set_item_parent(item, None);
        if let Some(data) = self.data_mut(world) {
            data.items.remove(index as usize);
        }
    }

    fn post_add_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        old_parent: Option<CylinderId>,
        index: i32,
        _link: CylinderLink,
    ) {
        let (target, link) = match self.notification_route(world) {
            Some(route) => route,
            None => return,
        };
        target.post_add_notification(world, thing, old_parent, index, link);
    }

    fn post_remove_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        new_parent: Option<CylinderId>,
        index: i32,
        _link: CylinderLink,
    ) {
        let (target, link) = match self.notification_route(world) {
            Some(route) => route,
            None => return,
        };
        target.post_remove_notification(world, thing, new_parent, index, link);
    }

    fn thing_index(&self, world: &WorldState, thing: Thing) -> i32 {
        thing
            .item()
            .and_then(|item| self.data(world).and_then(|data| data.index_of(item)))
            .map_or(-1, |index| index as i32)
    }

    fn last_index(&self, world: &WorldState) -> usize {
        self.size(world)
    }

    fn thing_at(&self, world: &WorldState, index: usize) -> Option<Thing> {
        self.data(world)
            .and_then(|data| data.item_at(index))
            .map(Thing::Item)
    }

    fn item_type_count(&self, world: &WorldState, type_id: ItemTypeId, sub_type: i32) -> u32 {
        self.data(world).map_or(0, |data| {
            data.items
                .iter()
                .map(|item| world.count_by_type(*item, type_id, sub_type))
                .sum()
        })
    }

    fn internal_add_thing(&self, world: &mut WorldState, _index: u32, thing: Thing) {
        let Some(item) = thing.item() else {
            return;
        };
        world.set_item_parent(item, Some(self.this()));
        let weight = i64::from(world.item_weight(item));
        let count = world.item(item).map_or(0, |entry| u32::from(entry.count));
        if let Some(data) = self.data_mut(world) {
            data.items.push_front(item);
            data.ammo_count += count;
        }
        self.update_item_weight(world, weight);
    }
}

impl ContainerCylinder {
    /// Where a change inside this container is reported, and with which link.
    fn notification_route(&self, world: &WorldState) -> Option<(CylinderId, CylinderLink)> {
        let this = self.this();
        match self.kind(world) {
            ContainerKind::DepotChest | ContainerKind::DepotLocker | ContainerKind::Inbox => {
                return world
                    .parent_of(this)
                    .map(|parent| (parent, CylinderLink::Parent));
            }
            ContainerKind::StoreInbox => {
                return world
                    .item(self.0)
                    .and_then(|item| item.parent)
                    .map(|parent| (parent, CylinderLink::TopParent));
            }
            ContainerKind::Regular | ContainerKind::BrowseField => {}
        }

        let top_parent = world.top_parent(this);
        if matches!(top_parent, CylinderId::Creature(_)) {
            Some((top_parent, CylinderLink::TopParent))
        } else if top_parent == this {
            world
                .parent_of(top_parent)
                .map(|parent| (parent, CylinderLink::Near))
        } else {
            Some((top_parent, CylinderLink::Parent))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::inventory::{InventorySlot, PlayerInventory};
    use crate::world::state::test_support::{fixture, spawn_player, ARROW, BACKPACK, BAG, COIN, QUIVER, SWORD};

    fn place_in(world: &mut WorldState, container: ItemId, item: ItemId) {
        ContainerCylinder(container).add_thing(world, 0, Thing::Item(item));
    }

    #[test]
    fn nested_weight_propagates_to_every_ancestor() {
        let mut world = fixture();
        let x = world.create_item(BAG, 1);
        let y = world.create_item(BAG, 1);
        let a = world.create_item(SWORD, 1);
        let bag_weight = world.item_type_of(x).weight;
        let sword_weight = world.item_type_of(a).weight;

        place_in(&mut world, x, a);
        place_in(&mut world, y, x);
        let y_data = ContainerCylinder(y);
        assert_eq!(
            y_data.data(&world).map(|data| data.total_weight),
            Some(sword_weight + bag_weight)
        );

        ContainerCylinder(x).remove_thing(&mut world, Thing::Item(a), 1);
        assert_eq!(y_data.data(&world).map(|data| data.total_weight), Some(bag_weight));
        assert_eq!(world.item_weight(y), 2 * bag_weight);
    }

    fn total_weight(world: &WorldState, container: ItemId) -> Option<u32> {
        ContainerCylinder(container).data(world).map(|data| data.total_weight)
    }

    #[test]
    fn carried_nesting_tracks_weight_at_every_level() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let backpack = world.create_item(BACKPACK, 1);
        let outer = world.create_item(BAG, 1);
        let inner = world.create_item(BAG, 1);
        let coins = world.create_item(COIN, 30);
        PlayerInventory(player).add_thing(
            &mut world,
            i32::from(InventorySlot::Backpack.index()),
            Thing::Item(backpack),
        );
        place_in(&mut world, backpack, outer);
        place_in(&mut world, outer, inner);
        place_in(&mut world, inner, coins);

        assert_eq!(total_weight(&world, inner), Some(300));
        assert_eq!(total_weight(&world, outer), Some(2100));
        assert_eq!(total_weight(&world, backpack), Some(3900));
        assert_eq!(PlayerInventory(player).inventory_weight(&world), 5700);

        let flags = CylinderFlags::empty();
        assert!(world.internal_remove_item(coins, 20, false, flags).is_ok());
        assert_eq!(world.item(coins).map(|entry| entry.count), Some(10));
        assert_eq!(total_weight(&world, inner), Some(100));
        assert_eq!(total_weight(&world, outer), Some(1900));
        assert_eq!(total_weight(&world, backpack), Some(3700));

        assert_eq!(
            world.internal_remove_item(coins, 50, false, flags),
            ReturnValue::NotPossible
        );
        assert_eq!(total_weight(&world, inner), Some(100));
        assert_eq!(total_weight(&world, backpack), Some(3700));
        assert_eq!(PlayerInventory(player).inventory_weight(&world), 5500);

        ContainerCylinder(inner).update_thing(&mut world, Thing::Item(coins), COIN, 25);
        assert_eq!(total_weight(&world, inner), Some(250));
        assert_eq!(total_weight(&world, outer), Some(2050));
        assert_eq!(total_weight(&world, backpack), Some(3850));

        assert!(world.internal_remove_item(coins, -1, false, flags).is_ok());
        assert_eq!(total_weight(&world, inner), Some(0));
        assert_eq!(total_weight(&world, outer), Some(1800));
        assert_eq!(total_weight(&world, backpack), Some(3600));
        assert_eq!(PlayerInventory(player).inventory_weight(&world), 5400);
    }

    #[test]
    fn container_cannot_be_put_into_itself_or_a_descendant() {
        let mut world = fixture();
        let outer = world.create_item(BAG, 1);
        let inner = world.create_item(BAG, 1);
        place_in(&mut world, outer, inner);

        let flags = CylinderFlags::empty();
        assert_eq!(
            ContainerCylinder(outer).query_add(&world, 0, Thing::Item(outer), 1, flags, None),
            ReturnValue::ThisIsImpossible
        );
        assert_eq!(
            ContainerCylinder(inner).query_add(&world, 0, Thing::Item(outer), 1, flags, None),
            ReturnValue::ThisIsImpossible
        );
        assert_eq!(
            ContainerCylinder(inner).query_add(
                &world,
                0,
                Thing::Item(outer),
                1,
                CylinderFlags::NOLIMIT,
                None
            ),
            ReturnValue::ThisIsImpossible
        );
    }

    #[test]
    fn full_container_refuses_wherever_additions() {
        let mut world = fixture();
        let bag = world.create_item(BAG, 1);
        let capacity = ContainerCylinder(bag).capacity(&world);
        for _ in 0..capacity {
            let sword = world.create_item(SWORD, 1);
            place_in(&mut world, bag, sword);
        }
        let extra = world.create_item(SWORD, 1);
        let cylinder = ContainerCylinder(bag);
        assert_eq!(
            cylinder.query_add(&world, INDEX_WHEREEVER, Thing::Item(extra), 1, CylinderFlags::empty(), None),
            ReturnValue::ContainerNotEnoughRoom
        );
        assert_eq!(
            cylinder.query_max_count(&world, INDEX_WHEREEVER, Thing::Item(extra), 1, CylinderFlags::empty()),
            (ReturnValue::ContainerNotEnoughRoom, 0)
        );
        assert_eq!(cylinder.size(&world) as u32, capacity);
    }

    #[test]
    fn stackable_max_count_includes_partial_stacks() {
        let mut world = fixture();
        let bag = world.create_item(BAG, 1);
        let partial = world.create_item(COIN, 60);
        place_in(&mut world, bag, partial);
        let coins = world.create_item(COIN, 100);

        let free = ContainerCylinder(bag).capacity(&world) - 1;
        let (ret, max) = ContainerCylinder(bag).query_max_count(
            &world,
            INDEX_WHEREEVER,
            Thing::Item(coins),
            100,
            CylinderFlags::empty(),
        );
        assert!(ret.is_ok());
        assert_eq!(max, free * 100 + 40);
    }

    #[test]
    fn autostack_points_at_the_partial_stack() {
        let mut world = fixture();
        let bag = world.create_item(BAG, 1);
        let sword = world.create_item(SWORD, 1);
        let partial = world.create_item(COIN, 60);
        place_in(&mut world, bag, partial);
        place_in(&mut world, bag, sword);
        let coins = world.create_item(COIN, 10);

        let mut index = INDEX_WHEREEVER;
        let mut dest = None;
        let mut flags = CylinderFlags::empty();
        let target = ContainerCylinder(bag).query_destination(
            &world,
            &mut index,
            Thing::Item(coins),
            &mut dest,
            &mut flags,
        );
        assert_eq!(target, CylinderId::Item(bag));
        assert_eq!(dest, Some(partial));
        assert_eq!(index, 1);
    }

    #[test]
    fn quiver_only_takes_ammunition() {
        let mut world = fixture();
        let quiver = world.create_item(QUIVER, 1);
        let sword = world.create_item(SWORD, 1);
        let arrows = world.create_item(ARROW, 20);
        let cylinder = ContainerCylinder(quiver);
        assert_eq!(
            cylinder.query_add(&world, 0, Thing::Item(sword), 1, CylinderFlags::empty(), None),
            ReturnValue::QuiverAmmoOnly
        );
        assert!(cylinder
            .query_add(&world, 0, Thing::Item(arrows), 20, CylinderFlags::empty(), None)
            .is_ok());
    }

    #[test]
    fn iteration_is_breadth_first() {
        let mut world = fixture();
        let outer = world.create_item(BAG, 1);
        let inner = world.create_item(BAG, 1);
        let deep = world.create_item(SWORD, 1);
        let top = world.create_item(COIN, 3);
        place_in(&mut world, inner, deep);
        place_in(&mut world, outer, inner);
        place_in(&mut world, outer, top);

        let order: Vec<ItemId> = ContainerIterator::new(&world, outer).collect();
        assert_eq!(order, vec![top, inner, deep]);
        assert_eq!(ContainerCylinder(outer).holding_count(&world), 3);
        let description = ContainerCylinder(outer).content_description(&world);
        assert_eq!(description, "gold coin, sword");
    }
}
