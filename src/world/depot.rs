use crate::entities::creature::CreatureId;
use crate::entities::item::{ContainerKind, ItemId};
use crate::world::container::ContainerCylinder;
use crate::world::cylinder::{CylinderFlags, CylinderId, ReturnValue, Thing};
use crate::world::item_types::{ITEM_DEPOT, ITEM_INBOX, ITEM_LOCKER, ITEM_STORE_INBOX};
use crate::world::position::Position;
use crate::world::state::WorldState;

const DEFAULT_CHEST_CAPACITY: u32 = 30;
const LOCKER_CAPACITY: u32 = 3;

pub(crate) fn depot_chest_query_add(
    world: &WorldState,
    chest: &ContainerCylinder,
    thing: Thing,
    count: u32,
    flags: CylinderFlags,
) -> ReturnValue {
    let Some(item) = thing.item().and_then(|id| world.item(id)) else {
        return ReturnValue::NotPossible;
    };
    if flags.contains(CylinderFlags::NOLIMIT) {
        return ReturnValue::NoError;
    }

    let mut add_count = 0;
    if world.item_type_of(item.id).stackable && u32::from(item.count) != count {
        add_count = 1;
    }
    if world.top_parent(CylinderId::Item(item.id)) != CylinderId::Item(chest.0) {
        add_count = if item.is_container() {
            ContainerCylinder(item.id).holding_count(world) + 1
        } else {
            1
        };
    }
    if chest.holding_count(world) + add_count > world.config.max_depot_items {
        return ReturnValue::DepotIsFull;
    }
    ReturnValue::NoError
}

pub(crate) fn inbox_query_add(
    world: &WorldState,
    inbox: ItemId,
    thing: Thing,
    flags: CylinderFlags,
) -> ReturnValue {
    if !flags.contains(CylinderFlags::NOLIMIT) {
        return ReturnValue::ContainerNotEnoughRoom;
    }
    check_plain_receiver(world, inbox, thing)
}

pub(crate) fn store_inbox_query_add(
    world: &WorldState,
    store_inbox: ItemId,
    thing: Thing,
    flags: CylinderFlags,
) -> ReturnValue {
    let ret = check_plain_receiver(world, store_inbox, thing);
    if !ret.is_ok() || flags.contains(CylinderFlags::NOLIMIT) {
        return ret;
    }
    let Some(item) = thing.item().and_then(|id| world.item(id)) else {
        return ReturnValue::NotPossible;
    };
    if !item.is_store_item() {
        return ReturnValue::CannotMoveItemIsNotStoreItem;
    }
    if item.container().map_or(false, |data| !data.is_empty()) {
        return ReturnValue::ItemCannotBeMovedThere;
    }
    ReturnValue::NoError
}

fn check_plain_receiver(world: &WorldState, receiver: ItemId, thing: Thing) -> ReturnValue {
    let Some(item) = thing.item() else {
        return ReturnValue::NotPossible;
    };
    if item == receiver {
        return ReturnValue::ThisIsImpossible;
    }
    if !world.item_type_of(item).pickupable {
        return ReturnValue::CannotPickup;
    }
    ReturnValue::NoError
}

fn chest_capacity(world: &WorldState) -> u32 {
    match world.item_types.get_or_default(ITEM_DEPOT).capacity {
        0 => DEFAULT_CHEST_CAPACITY,
        capacity => u32::from(capacity),
    }
}

impl WorldState {
    /// The player's depot chest for `depot_id`, created on first use.
    pub fn depot_chest(&mut self, player: CreatureId, depot_id: u32) -> Option<ItemId> {
        let existing = self
            .creature(player)?
            .as_player()?
            .depot_chests
            .get(&depot_id)
            .copied();
        if existing.is_some() {
            return existing;
        }
        let capacity = chest_capacity(self);
        let chest = self.create_container(ITEM_DEPOT, ContainerKind::DepotChest, capacity);
        self.creature_mut(player)?
            .as_player_mut()?
            .depot_chests
            .insert(depot_id, chest);
        Some(chest)
    }

    pub fn inbox(&mut self, player: CreatureId) -> Option<ItemId> {
        if let Some(inbox) = self.creature(player)?.as_player()?.inbox {
            return Some(inbox);
        }
        let inbox = self.create_container(ITEM_INBOX, ContainerKind::Inbox, 0);
        self.creature_mut(player)?.as_player_mut()?.inbox = Some(inbox);
        Some(inbox)
    }

    /// The store inbox hangs directly off the player.
    pub fn store_inbox(&mut self, player: CreatureId) -> Option<ItemId> {
        if let Some(store_inbox) = self.creature(player)?.as_player()?.store_inbox {
            return Some(store_inbox);
        }
        let store_inbox = self.create_container(ITEM_STORE_INBOX, ContainerKind::StoreInbox, 0);
        self.set_item_parent(store_inbox, Some(CylinderId::Creature(player)));
        self.creature_mut(player)?.as_player_mut()?.store_inbox = Some(store_inbox);
        Some(store_inbox)
    }

    /// Opens the player's locker for `depot_id` at the locker tile. The locker
    /// holds the inbox and the matching depot chest; the inbox follows the
    /// player to whichever locker was opened last.
    pub fn open_depot_locker(
        &mut self,
        player: CreatureId,
        depot_id: u32,
        at: Position,
    ) -> Option<ItemId> {
        let inbox = self.inbox(player)?;
        let existing = self
            .creature(player)?
            .as_player()?
            .depot_lockers
            .get(&depot_id)
            .copied();
        let locker = match existing {
            Some(locker) => {
                if let Some(previous) = self.item(inbox).and_then(|item| item.parent) {
                    if previous != CylinderId::Item(locker) {
                        self.detach_from_container(previous, inbox);
                        ContainerCylinder(locker).add_item(self, inbox);
                    }
                }
                locker
            }
            None => {
                let locker =
                    self.create_container(ITEM_LOCKER, ContainerKind::DepotLocker, LOCKER_CAPACITY);
                let chest = self.depot_chest(player, depot_id)?;
                if let Some(previous) = self.item(inbox).and_then(|item| item.parent) {
                    self.detach_from_container(previous, inbox);
                }
                ContainerCylinder(locker).add_item(self, inbox);
                ContainerCylinder(locker).add_item(self, chest);
                self.creature_mut(player)?
                    .as_player_mut()?
                    .depot_lockers
                    .insert(depot_id, locker);
                locker
            }
        };
        self.set_item_parent(locker, Some(CylinderId::Tile(at)));
        log::debug!("player {} opened depot {} at {}", player.0, depot_id, at);
        Some(locker)
    }

    fn detach_from_container(&mut self, parent: CylinderId, item: ItemId) {
        if let Some(data) = parent
            .as_item()
            .and_then(|id| self.item_mut(id))
            .and_then(|entry| entry.container_mut())
        {
            if let Some(index) = data.index_of(item) {
                data.items.remove(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::cylinder::{Cylinder, INDEX_WHEREEVER};
    use crate::world::state::test_support::{fixture, spawn_player, BAG, COIN, SWORD};

    #[test]
    fn depot_chest_counts_nested_items_against_the_limit() {
        let mut world = fixture();
        world.config.max_depot_items = 3;
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let chest = world.depot_chest(player, 1).expect("chest");
        let cylinder = ContainerCylinder(chest);

        let sword = world.create_item(SWORD, 1);
        cylinder.add_thing(&mut world, 0, Thing::Item(sword));

        let bag = world.create_item(BAG, 1);
        let inner = world.create_item(SWORD, 1);
        ContainerCylinder(bag).add_thing(&mut world, 0, Thing::Item(inner));
        assert!(cylinder
            .query_add(&world, INDEX_WHEREEVER, Thing::Item(bag), 1, CylinderFlags::empty(), None)
            .is_ok());

        let big_bag = world.create_item(BAG, 1);
        for _ in 0..2 {
            let filler = world.create_item(SWORD, 1);
            ContainerCylinder(big_bag).add_thing(&mut world, 0, Thing::Item(filler));
        }
        assert_eq!(
            cylinder.query_add(&world, INDEX_WHEREEVER, Thing::Item(big_bag), 1, CylinderFlags::empty(), None),
            ReturnValue::DepotIsFull
        );
        assert!(cylinder
            .query_add(&world, INDEX_WHEREEVER, Thing::Item(big_bag), 1, CylinderFlags::NOLIMIT, None)
            .is_ok());
    }

    #[test]
    fn inbox_only_takes_forced_deliveries() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let inbox = world.inbox(player).expect("inbox");
        let coins = world.create_item(COIN, 10);
        let cylinder = ContainerCylinder(inbox);
        assert_eq!(
            cylinder.query_add(&world, INDEX_WHEREEVER, Thing::Item(coins), 10, CylinderFlags::empty(), None),
            ReturnValue::ContainerNotEnoughRoom
        );
        assert!(cylinder
            .query_add(&world, INDEX_WHEREEVER, Thing::Item(coins), 10, CylinderFlags::NOLIMIT, None)
            .is_ok());
        assert_eq!(
            cylinder.query_add(&world, INDEX_WHEREEVER, Thing::Item(inbox), 1, CylinderFlags::NOLIMIT, None),
            ReturnValue::ThisIsImpossible
        );
    }

    #[test]
    fn store_inbox_rejects_ordinary_items() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let store_inbox = world.store_inbox(player).expect("store inbox");
        let sword = world.create_item(SWORD, 1);
        let cylinder = ContainerCylinder(store_inbox);
        assert_eq!(
            cylinder.query_add(&world, INDEX_WHEREEVER, Thing::Item(sword), 1, CylinderFlags::empty(), None),
            ReturnValue::CannotMoveItemIsNotStoreItem
        );
        if let Some(item) = world.item_mut(sword) {
            item.attributes.store_item = true;
        }
        assert!(cylinder
            .query_add(&world, INDEX_WHEREEVER, Thing::Item(sword), 1, CylinderFlags::empty(), None)
            .is_ok());
        assert_eq!(world.top_parent(CylinderId::Item(sword)), CylinderId::Item(sword));
    }

    #[test]
    fn locker_holds_inbox_and_chest_and_refuses_direct_adds() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let at = Position::new(101, 100, 7);
        let locker = world.open_depot_locker(player, 2, at).expect("locker");
        let chest = world.depot_chest(player, 2).expect("chest");
        let inbox = world.inbox(player).expect("inbox");

        let data = world.item(locker).and_then(|item| item.container()).expect("data");
        assert_eq!(data.size(), 2);
        assert_eq!(world.parent_of(CylinderId::Item(chest)), Some(CylinderId::Tile(at)));
        assert_eq!(world.parent_of(CylinderId::Item(inbox)), Some(CylinderId::Tile(at)));

        let sword = world.create_item(SWORD, 1);
        assert_eq!(
            ContainerCylinder(locker).query_add(&world, INDEX_WHEREEVER, Thing::Item(sword), 1, CylinderFlags::empty(), None),
            ReturnValue::NotEnoughRoom
        );

        let other = world.open_depot_locker(player, 3, at).expect("second locker");
        assert_ne!(other, locker);
        assert_eq!(world.item(inbox).and_then(|item| item.parent), Some(CylinderId::Item(other)));
        let first = world.item(locker).and_then(|item| item.container()).expect("data");
        assert_eq!(first.size(), 1);
    }
}
