use crate::entities::creature::{CreatureId, PlayerData};
use crate::entities::item::{ContainerKind, ItemId, ItemTypeId, MAX_STACK};
use crate::world::container::ContainerIterator;
use crate::world::cylinder::{
    Cylinder, CylinderFlags, CylinderId, CylinderLink, ReturnValue, Thing, INDEX_WHEREEVER,
};
use crate::world::events::WorldEvent;
use crate::world::item_types::WeaponType;
use crate::world::state::WorldState;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub const SLOT_WHEREEVER: u8 = 0;
pub const SLOT_FIRST: u8 = 1;
pub const SLOT_LAST: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventorySlot {
    Head,
    Necklace,
    Backpack,
    Armor,
    RightHand,
    LeftHand,
    Legs,
    Feet,
    Ring,
    Ammo,
}

impl InventorySlot {
    pub fn index(self) -> u8 {
        match self {
            InventorySlot::Head => 1,
            InventorySlot::Necklace => 2,
            InventorySlot::Backpack => 3,
            InventorySlot::Armor => 4,
            InventorySlot::RightHand => 5,
            InventorySlot::LeftHand => 6,
            InventorySlot::Legs => 7,
            InventorySlot::Feet => 8,
            InventorySlot::Ring => 9,
            InventorySlot::Ammo => 10,
        }
    }

    pub fn from_index(index: i32) -> Option<Self> {
        match index {
            1 => Some(InventorySlot::Head),
            2 => Some(InventorySlot::Necklace),
            3 => Some(InventorySlot::Backpack),
            4 => Some(InventorySlot::Armor),
            5 => Some(InventorySlot::RightHand),
            6 => Some(InventorySlot::LeftHand),
            7 => Some(InventorySlot::Legs),
            8 => Some(InventorySlot::Feet),
            9 => Some(InventorySlot::Ring),
            10 => Some(InventorySlot::Ammo),
            _ => None,
        }
    }
}

pub const INVENTORY_SLOTS: [InventorySlot; 10] = [
    InventorySlot::Head,
    InventorySlot::Necklace,
    InventorySlot::Backpack,
    InventorySlot::Armor,
    InventorySlot::RightHand,
    InventorySlot::LeftHand,
    InventorySlot::Legs,
    InventorySlot::Feet,
    InventorySlot::Ring,
    InventorySlot::Ammo,
];

bitflags! {
    /// Where an item type may be worn.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SlotPositions: u16 {
        const HEAD = 1 << 0;
        const NECKLACE = 1 << 1;
        const BACKPACK = 1 << 2;
        const ARMOR = 1 << 3;
        const RIGHT = 1 << 4;
        const LEFT = 1 << 5;
        const LEGS = 1 << 6;
        const FEET = 1 << 7;
        const RING = 1 << 8;
        const AMMO = 1 << 9;
        const TWO_HAND = 1 << 11;
        const HAND = Self::LEFT.bits() | Self::RIGHT.bits();
    }
}

/// The equipment slots of one player seen as a cylinder.
#[derive(Debug, Clone, Copy)]
pub struct PlayerInventory(pub CreatureId);

impl PlayerInventory {
    fn data<'a>(&self, world: &'a WorldState) -> Option<&'a PlayerData> {
        world.creature(self.0).and_then(|creature| creature.as_player())
    }

    fn slot_item(&self, world: &WorldState, index: i32) -> Option<ItemId> {
        let slot = InventorySlot::from_index(index)?;
        self.data(world)
            .and_then(|player| player.inventory[usize::from(slot.index())])
    }

    fn set_slot(&self, world: &mut WorldState, index: u8, item: Option<ItemId>) {
        if let Some(player) = world
            .creature_mut(self.0)
            .and_then(|creature| creature.as_player_mut())
        {
            player.inventory[usize::from(index)] = item;
        }
    }

    fn slot_of(&self, world: &WorldState, item: ItemId) -> Option<u8> {
        let player = self.data(world)?;
        (SLOT_FIRST..=SLOT_LAST).find(|slot| player.inventory[usize::from(*slot)] == Some(item))
    }

    fn slot_weapon(&self, world: &WorldState, index: i32) -> Option<(ItemId, WeaponType, bool)> {
        let item = self.slot_item(world, index)?;
        let item_type = world.item_type_of(item);
        Some((
            item,
            item_type.weapon_type,
            item_type.slot_position.contains(SlotPositions::TWO_HAND),
        ))
    }

    /// Weight of everything carried, including the store inbox.
    pub fn inventory_weight(&self, world: &WorldState) -> u32 {
        let Some(player) = self.data(world) else {
            return 0;
        };
        let mut weight: u32 = (SLOT_FIRST..=SLOT_LAST)
            .filter_map(|slot| player.inventory[usize::from(slot)])
            .map(|item| world.item_weight(item))
            .sum();
        if let Some(store_inbox) = player.store_inbox {
            weight = weight.saturating_add(world.item_weight(store_inbox));
        }
        weight
    }

    pub fn free_capacity(&self, world: &WorldState) -> u32 {
        match self.data(world) {
            None => 0,
            Some(player) if player.cannot_pickup => 0,
            Some(player) if player.infinite_capacity => u32::MAX,
            Some(player) => player.capacity.saturating_sub(self.inventory_weight(world)),
        }
    }

    pub fn has_capacity(&self, world: &WorldState, item: ItemId, count: u32) -> bool {
        let Some(player) = self.data(world) else {
            return false;
        };
        if player.cannot_pickup {
            return false;
        }
        if player.infinite_capacity
            || world.top_parent(CylinderId::Item(item)) == CylinderId::Creature(self.0)
        {
            return true;
        }

        let item_type = world.item_type_of(item);
        let mut weight = if world.item(item).map_or(false, |item| item.is_container()) {
            world.item_weight(item)
        } else {
            item_type.weight
        };
        if item_type.stackable {
            weight = weight.saturating_mul(count);
        }
        weight <= self.free_capacity(world)
    }

    fn check_right_hand(&self, world: &WorldState, item: ItemId, count: u32) -> ReturnValue {
        let item_type = world.item_type_of(item);
        let slot_position = item_type.slot_position;
        let weapon = item_type.weapon_type;
        let left = self.slot_weapon(world, i32::from(InventorySlot::LeftHand.index()));

        if !world.config.classic_equipment_slots {
            if weapon != WeaponType::Shield && weapon != WeaponType::Quiver {
                return ReturnValue::CannotBeDressed;
            }
            return match left {
                Some((_, left_type, left_two_hand))
                    if left_two_hand || slot_position.contains(SlotPositions::TWO_HAND) =>
                {
                    if left_type != WeaponType::Distance || weapon != WeaponType::Quiver {
                        ReturnValue::BothHandsNeedToBeFree
                    } else {
                        ReturnValue::NoError
                    }
                }
                _ => ReturnValue::NoError,
            };
        }

        if slot_position.contains(SlotPositions::TWO_HAND) {
            return match left {
                Some((left_item, _, _)) if left_item != item => ReturnValue::BothHandsNeedToBeFree,
                _ => ReturnValue::NoError,
            };
        }

        let Some((left_item, left_type, left_two_hand)) = left else {
            return ReturnValue::NoError;
        };
        if left_two_hand {
            if left_type != WeaponType::Distance || weapon != WeaponType::Quiver {
                return ReturnValue::DropTwoHandedItem;
            }
            return ReturnValue::NoError;
        }
        hand_pairing(world, item, count, left_item, left_type, weapon)
    }

    fn check_left_hand(&self, world: &WorldState, item: ItemId, count: u32) -> ReturnValue {
        let item_type = world.item_type_of(item);
        let slot_position = item_type.slot_position;
        let weapon = item_type.weapon_type;
        let right = self.slot_weapon(world, i32::from(InventorySlot::RightHand.index()));

        if !world.config.classic_equipment_slots {
            if matches!(
                weapon,
                WeaponType::None | WeaponType::Shield | WeaponType::Ammo | WeaponType::Quiver
            ) {
                return ReturnValue::CannotBeDressed;
            }
            return match right {
                Some((_, right_type, _)) if slot_position.contains(SlotPositions::TWO_HAND) => {
                    if weapon != WeaponType::Distance || right_type != WeaponType::Quiver {
                        ReturnValue::BothHandsNeedToBeFree
                    } else {
                        ReturnValue::NoError
                    }
                }
                _ => ReturnValue::NoError,
            };
        }

        if slot_position.contains(SlotPositions::TWO_HAND) {
            return match right {
                Some((right_item, right_type, _)) if right_item != item => {
                    if weapon != WeaponType::Distance || right_type != WeaponType::Quiver {
                        ReturnValue::BothHandsNeedToBeFree
                    } else {
                        ReturnValue::NoError
                    }
                }
                _ => ReturnValue::NoError,
            };
        }

        let Some((right_item, right_type, right_two_hand)) = right else {
            return ReturnValue::NoError;
        };
        if right_two_hand {
            if weapon != WeaponType::Distance || right_type != WeaponType::Quiver {
                return ReturnValue::DropTwoHandedItem;
            }
            return ReturnValue::NoError;
        }
        hand_pairing(world, item, count, right_item, right_type, weapon)
    }
}

/// Whether `item` may share the hands with `other`, already held in the opposite hand.
fn hand_pairing(
    world: &WorldState,
    item: ItemId,
    count: u32,
    other: ItemId,
    other_type: WeaponType,
    weapon: WeaponType,
) -> ReturnValue {
    let same_whole_stack = item == other
        && world
            .item(item)
            .map_or(false, |item| u32::from(item.count) == count);
    if same_whole_stack {
        return ReturnValue::NoError;
    }
    if other_type == WeaponType::Shield && weapon == WeaponType::Shield {
        return ReturnValue::CanOnlyUseOneShield;
    }
    let either = |kind: WeaponType| other_type == kind || weapon == kind;
    if either(WeaponType::None)
        || either(WeaponType::Shield)
        || either(WeaponType::Ammo)
        || either(WeaponType::Quiver)
    {
        ReturnValue::NoError
    } else {
        ReturnValue::CanOnlyUseOneWeapon
    }
}

impl Cylinder for PlayerInventory {
    fn query_add(
        &self,
        world: &WorldState,
        index: i32,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
        _actor: Option<CreatureId>,
    ) -> ReturnValue {
        let Some(item) = thing.item() else {
            return ReturnValue::NotPossible;
        };

        if flags.contains(CylinderFlags::CHILDISOWNER) {
            // a carried container asks whether its owner can bear the weight
            if flags.contains(CylinderFlags::NOLIMIT) || self.has_capacity(world, item, count) {
                return ReturnValue::NoError;
            }
            return ReturnValue::NotEnoughCapacity;
        }

        let item_type = world.item_type_of(item);
        if !item_type.pickupable {
            return ReturnValue::CannotPickup;
        }
        if world.item(item).map_or(false, |item| item.is_store_item()) {
            return ReturnValue::ItemCannotBeMovedThere;
        }

        let slot_position = item_type.slot_position;
        let classic = world.config.classic_equipment_slots;
        let mut ret = if slot_position.intersects(
            SlotPositions::HEAD
                | SlotPositions::NECKLACE
                | SlotPositions::BACKPACK
                | SlotPositions::ARMOR
                | SlotPositions::LEGS
                | SlotPositions::FEET
                | SlotPositions::RING,
        ) {
            ReturnValue::CannotBeDressed
        } else if slot_position.contains(SlotPositions::TWO_HAND) {
            ReturnValue::PutThisObjectInBothHands
        } else if slot_position.intersects(SlotPositions::HAND) {
            if classic {
                ReturnValue::PutThisObjectInYourHand
            } else {
                ReturnValue::CannotBeDressed
            }
        } else {
            ReturnValue::NotPossible
        };

        let allow = |position: SlotPositions, ret: &mut ReturnValue| {
            if slot_position.contains(position) {
                *ret = ReturnValue::NoError;
            }
        };
        match InventorySlot::from_index(index) {
            Some(InventorySlot::Head) => allow(SlotPositions::HEAD, &mut ret),
            Some(InventorySlot::Necklace) => allow(SlotPositions::NECKLACE, &mut ret),
            Some(InventorySlot::Backpack) => allow(SlotPositions::BACKPACK, &mut ret),
            Some(InventorySlot::Armor) => allow(SlotPositions::ARMOR, &mut ret),
            Some(InventorySlot::Legs) => allow(SlotPositions::LEGS, &mut ret),
            Some(InventorySlot::Feet) => allow(SlotPositions::FEET, &mut ret),
            Some(InventorySlot::Ring) => allow(SlotPositions::RING, &mut ret),
            Some(InventorySlot::RightHand) => {
                if slot_position.contains(SlotPositions::RIGHT) {
                    ret = self.check_right_hand(world, item, count);
                }
            }
            Some(InventorySlot::LeftHand) => {
                if slot_position.contains(SlotPositions::LEFT) {
                    ret = self.check_left_hand(world, item, count);
                }
            }
            Some(InventorySlot::Ammo) => {
                if slot_position.contains(SlotPositions::AMMO) || classic {
                    ret = ReturnValue::NoError;
                }
            }
            None if index == i32::from(SLOT_WHEREEVER) || index == INDEX_WHEREEVER => {
                ret = ReturnValue::NotEnoughRoom;
            }
            None => ret = ReturnValue::NotPossible,
        }

        if ret != ReturnValue::NoError && ret != ReturnValue::NotEnoughRoom {
            return ret;
        }

        if !self.has_capacity(world, item, count) {
            return ReturnValue::NotEnoughCapacity;
        }

        if let Some(occupant) = self.slot_item(world, index) {
            let stacks_onto = world.item_type_of(occupant).stackable
                && world.item(occupant).map(|entry| entry.type_id)
                    == world.item(item).map(|entry| entry.type_id);
            if !stacks_onto {
                if !classic {
                    let swappable = match world.top_parent(CylinderId::Item(item)) {
                        CylinderId::Creature(owner) => world
                            .creature(owner)
                            .map_or(false, |creature| creature.is_player()),
                        CylinderId::Item(top) => {
                            world.item(top).and_then(|top| top.container_kind())
                                == Some(ContainerKind::DepotChest)
                        }
                        _ => false,
                    };
                    if swappable {
                        return ReturnValue::NeedExchange;
                    }
                    return ReturnValue::NotEnoughRoom;
                }
                return ReturnValue::NeedExchange;
            }
        }
        ret
    }

    fn query_max_count(
        &self,
        world: &WorldState,
        index: i32,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
    ) -> (ReturnValue, u32) {
        let Some(item) = thing.item() else {
            return (ReturnValue::NotPossible, 0);
        };
        let Some(moving) = world.item(item) else {
            return (ReturnValue::NotPossible, 0);
        };
        let stackable = world.item_type_of(item).stackable;
        let item_count = u32::from(moving.count);

        let max_count = if index == INDEX_WHEREEVER {
            let mut n: u32 = 0;
            for slot in SLOT_FIRST..=SLOT_LAST {
                let slot_index = i32::from(slot);
                match self.slot_item(world, slot_index) {
                    Some(occupant) => {
                        let Some(occupant_item) = world.item(occupant) else {
                            continue;
                        };
                        if occupant_item.is_container() {
                            let sub = CylinderId::Item(occupant);
                            n += sub
                                .query_max_count(world, INDEX_WHEREEVER, thing, item_count, flags)
                                .1;
                            for nested in ContainerIterator::new(world, occupant) {
                                if world.item(nested).map_or(false, |entry| entry.is_container()) {
                                    n += CylinderId::Item(nested)
                                        .query_max_count(
                                            world,
                                            INDEX_WHEREEVER,
                                            thing,
                                            item_count,
                                            flags,
                                        )
                                        .1;
                                }
                            }
                        } else if stackable
                            && moving.equals(occupant_item)
                            && occupant_item.count < MAX_STACK
                        {
                            let remainder = u32::from(MAX_STACK - occupant_item.count);
                            if self
                                .query_add(world, slot_index, thing, remainder, flags, None)
                                .is_ok()
                            {
                                n += remainder;
                            }
                        }
                    }
                    None => {
                        if self
                            .query_add(world, slot_index, thing, item_count, flags, None)
                            .is_ok()
                        {
                            n += if stackable { u32::from(MAX_STACK) } else { 1 };
                        }
                    }
                }
            }
            n
        } else {
            match self.slot_item(world, index).and_then(|dest| world.item(dest)) {
                Some(dest) => {
                    if world.item_type_of(dest.id).stackable
                        && moving.equals(dest)
                        && dest.count < MAX_STACK
                    {
                        u32::from(MAX_STACK - dest.count)
                    } else {
                        0
                    }
                }
                None => {
                    if self.query_add(world, index, thing, count, flags, None).is_ok() {
                        let max = if stackable { u32::from(MAX_STACK) } else { 1 };
                        return (ReturnValue::NoError, max);
                    }
                    0
                }
            }
        };

        if max_count < count {
            (ReturnValue::NotEnoughRoom, max_count)
        } else {
            (ReturnValue::NoError, max_count)
        }
    }

    fn query_remove(
        &self,
        world: &WorldState,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
        _actor: Option<CreatureId>,
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
        let this = CylinderId::Creature(self.0);
        if *index == i32::from(SLOT_WHEREEVER) || *index == INDEX_WHEREEVER {
            *dest_item = None;
            let Some(item) = thing.item().and_then(|id| world.item(id)) else {
                return this;
            };
            let item_count = u32::from(item.count);
            let auto_stack = !flags.contains(CylinderFlags::IGNOREAUTOSTACK);
            let stackable = world.item_type_of(item.id).stackable;

            let mut containers: Vec<ItemId> = Vec::new();
            for slot in SLOT_FIRST..=SLOT_LAST {
                let slot_index = i32::from(slot);
                match self.slot_item(world, slot_index) {
                    Some(occupant) => {
                        if occupant == item.id {
                            continue;
                        }
                        let Some(occupant_item) = world.item(occupant) else {
                            continue;
                        };
                        if auto_stack
                            && stackable
                            && self
                                .query_add(
                                    world,
                                    slot_index,
                                    thing,
                                    item_count,
                                    CylinderFlags::empty(),
                                    None,
                                )
                                .is_ok()
                            && occupant_item.equals(item)
                            && occupant_item.count < MAX_STACK
                        {
                            *index = slot_index;
                            *dest_item = Some(occupant);
                            return this;
                        }
                        if occupant_item.is_container() {
                            containers.push(occupant);
                        }
                    }
                    None => {
                        if self
                            .query_add(world, slot_index, thing, item_count, *flags, None)
                            .is_ok()
                        {
                            *index = slot_index;
                            *dest_item = None;
                            return this;
                        }
                    }
                }
            }

            let mut next = 0;
            while next < containers.len() {
                let container = containers[next];
                next += 1;
                let Some(data) = world.item(container).and_then(|entry| entry.container()) else {
                    continue;
                };
                let cylinder = CylinderId::Item(container);
                let capacity = data.capacity;

                if !auto_stack || !stackable {
                    // first free slot wins for items that cannot merge
                    let free = capacity - capacity.min(data.size() as u32);
                    for n in (1..=free).rev() {
                        let slot = (capacity - n) as i32;
                        if cylinder
                            .query_add(world, slot, thing, item_count, *flags, None)
                            .is_ok()
                        {
                            *index = slot;
                            *dest_item = None;
                            return cylinder;
                        }
                    }
                    for child in data.items.iter() {
                        if world.item(*child).map_or(false, |entry| entry.is_container()) {
                            containers.push(*child);
                        }
                    }
                    continue;
                }

                let mut n: u32 = 0;
                for child in data.items.iter() {
                    if *child == item.id {
                        continue;
                    }
                    let Some(child_item) = world.item(*child) else {
                        continue;
                    };
                    if child_item.equals(item) && child_item.count < MAX_STACK {
                        *index = n as i32;
                        *dest_item = Some(*child);
                        return cylinder;
                    }
                    if child_item.is_container() {
                        containers.push(*child);
                    }
                    n += 1;
                }

                if n < capacity
                    && cylinder
                        .query_add(world, n as i32, thing, item_count, *flags, None)
                        .is_ok()
                {
                    *index = n as i32;
                    *dest_item = None;
                    return cylinder;
                }
            }
            return this;
        }

        let occupant = self.slot_item(world, *index);
        *dest_item = occupant;
        match occupant {
            Some(sub) if CylinderId::Item(sub).is_item_cylinder(world) => {
                *index = INDEX_WHEREEVER;
                *dest_item = None;
                CylinderId::Item(sub)
            }
            _ => this,
        }
    }

    fn add_thing(&self, world: &mut WorldState, index: i32, thing: Thing) {
        if index < i32::from(SLOT_FIRST) || index > i32::from(SLOT_LAST) {
            return;
        }
        let Some(item) = thing.item() else {
            return;
        };
        world.set_item_parent(item, Some(CylinderId::Creature(self.0)));
        self.set_slot(world, index as u8, Some(item));
        world.events.push(WorldEvent::InventoryChanged {
            player: self.0,
            slot: index as u8,
            item: Some(item),
        });
    }

    fn update_thing(&self, world: &mut WorldState, thing: Thing, type_id: ItemTypeId, count: u32) {
        let index = self.thing_index(world, thing);
        let Some(item) = thing.item() else {
            return;
        };
        if index == -1 {
            return;
        }
        world.set_item_type(item, type_id, count);
        world.events.push(WorldEvent::InventoryChanged {
            player: self.0,
            slot: index as u8,
            item: Some(item),
        });
    }

    fn replace_thing(&self, world: &mut WorldState, index: u32, thing: Thing) {
        if index > u32::from(SLOT_LAST) || self.slot_item(world, index as i32).is_none() {
            return;
        }
        let Some(item) = thing.item() else {
            return;
        };
        world.events.push(WorldEvent::InventoryChanged {
            player: self.0,
            slot: index as u8,
            item: Some(item),
        });
        world.set_item_parent(item, Some(CylinderId::Creature(self.0)));
        self.set_slot(world, index as u8, Some(item));
    }

    fn remove_thing(&self, world: &mut WorldState, thing: Thing, count: u32) {
        let Some(item) = thing.item() else {
            return;
        };
        let Some(slot) = self.slot_of(world, item) else {
            return;
        };
        let stackable = world.item_type_of(item).stackable;
        let current = world.item(item).map_or(0, |entry| u32::from(entry.count));

        if stackable && count != current {
            if let Some(entry) = world.item_mut(item) {
                entry.count = current.saturating_sub(count) as u16;
            }
            world.events.push(WorldEvent::InventoryChanged {
                player: self.0,
                slot,
                item: Some(item),
            });
            return;
        }

        world.events.push(WorldEvent::InventoryChanged {
            player: self.0,
            slot,
            item: None,
        });
        world.set_item_parent(item, None);
        self.set_slot(world, slot, None);
    }

    fn post_add_notification(
        &self,
        world: &mut WorldState,
        _thing: Thing,
        _old_parent: Option<CylinderId>,
        _index: i32,
        link: CylinderLink,
    ) {
        if matches!(link, CylinderLink::Owner | CylinderLink::TopParent) {
            let free_capacity = self.free_capacity(world);
            world.events.push(WorldEvent::PlayerStats {
                player: self.0,
                free_capacity,
            });
        }
    }

    fn post_remove_notification(
        &self,
        world: &mut WorldState,
        _thing: Thing,
        _new_parent: Option<CylinderId>,
        _index: i32,
        link: CylinderLink,
    ) {
        if matches!(link, CylinderLink::Owner | CylinderLink::TopParent) {
            let free_capacity = self.free_capacity(world);
            world.events.push(WorldEvent::PlayerStats {
                player: self.0,
                free_capacity,
            });
        }
    }

    fn thing_index(&self, world: &WorldState, thing: Thing) -> i32 {
        thing
            .item()
            .and_then(|item| self.slot_of(world, item))
            .map_or(-1, i32::from)
    }

    fn first_index(&self) -> usize {
        usize::from(SLOT_FIRST)
    }

    fn last_index(&self, _world: &WorldState) -> usize {
        usize::from(SLOT_LAST) + 1
    }

    fn thing_at(&self, world: &WorldState, index: usize) -> Option<Thing> {
        self.slot_item(world, index as i32).map(Thing::Item)
    }

    fn item_type_count(&self, world: &WorldState, type_id: ItemTypeId, sub_type: i32) -> u32 {
        let mut count = 0;
        for slot in SLOT_FIRST..=SLOT_LAST {
            let Some(item) = self.slot_item(world, i32::from(slot)) else {
                continue;
            };
            count += world.count_by_type(item, type_id, sub_type);
            if world.item(item).map_or(false, |entry| entry.is_container()) {
                for nested in ContainerIterator::new(world, item) {
                    count += world.count_by_type(nested, type_id, sub_type);
                }
            }
        }
        count
    }

    fn internal_add_thing(&self, world: &mut WorldState, index: u32, thing: Thing) {
        let Some(item) = thing.item() else {
            return;
        };
        if index > u32::from(SLOT_WHEREEVER) && index <= u32::from(SLOT_LAST) {
            if self.slot_item(world, index as i32).is_some() {
                return;
            }
            self.set_slot(world, index as u8, Some(item));
            world.set_item_parent(item, Some(CylinderId::Creature(self.0)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::test_support::{fixture, spawn_player, BACKPACK, COIN, SHIELD, SWORD, TWO_HANDED_SWORD};

    fn equip(world: &mut WorldState, player: CreatureId, slot: InventorySlot, item: ItemId) {
        PlayerInventory(player).add_thing(world, i32::from(slot.index()), Thing::Item(item));
    }

    #[test]
    fn slots_accept_only_matching_positions() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let sword = world.create_item(SWORD, 1);
        let inventory = PlayerInventory(player);
        let flags = CylinderFlags::empty();

        assert_eq!(
            inventory.query_add(&world, i32::from(InventorySlot::Head.index()), Thing::Item(sword), 1, flags, None),
            ReturnValue::CannotBeDressed
        );
        assert!(inventory
            .query_add(&world, i32::from(InventorySlot::LeftHand.index()), Thing::Item(sword), 1, flags, None)
            .is_ok());
        assert_eq!(
            inventory.query_add(&world, INDEX_WHEREEVER, Thing::Item(sword), 1, flags, None),
            ReturnValue::NotEnoughRoom
        );
    }

    #[test]
    fn two_handed_weapon_needs_a_free_right_hand() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let shield = world.create_item(SHIELD, 1);
        equip(&mut world, player, InventorySlot::RightHand, shield);

        let sword = world.create_item(TWO_HANDED_SWORD, 1);
        assert_eq!(
            PlayerInventory(player).query_add(
                &world,
                i32::from(InventorySlot::LeftHand.index()),
                Thing::Item(sword),
                1,
                CylinderFlags::empty(),
                None
            ),
            ReturnValue::BothHandsNeedToBeFree
        );
    }

    #[test]
    fn capacity_limits_heavy_items() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        if let Some(data) = world.creature_mut(player).and_then(|c| c.as_player_mut()) {
            data.capacity = 25;
        }
        let coins = world.create_item(COIN, 3);
        let inventory = PlayerInventory(player);
        assert!(inventory.has_capacity(&world, coins, 2));
        assert!(!inventory.has_capacity(&world, coins, 3));
        assert_eq!(
            inventory.query_add(
                &world,
                i32::from(InventorySlot::Ammo.index()),
                Thing::Item(coins),
                3,
                CylinderFlags::empty(),
                None
            ),
            ReturnValue::NotEnoughCapacity
        );
    }

    #[test]
    fn wherever_destination_falls_through_to_carried_backpack() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let backpack = world.create_item(BACKPACK, 1);
        equip(&mut world, player, InventorySlot::Backpack, backpack);
        let coins = world.create_item(COIN, 10);

        let mut index = INDEX_WHEREEVER;
        let mut dest = None;
        let mut flags = CylinderFlags::empty();
        let target = PlayerInventory(player).query_destination(
            &world,
            &mut index,
            Thing::Item(coins),
            &mut dest,
            &mut flags,
        );
        // coins fit the ammo slot before any container is searched
        assert_eq!(target, CylinderId::Creature(player));
        assert_eq!(index, i32::from(InventorySlot::Ammo.index()));
        assert_eq!(dest, None);
    }

    #[test]
    fn removing_part_of_a_stack_keeps_the_slot() {
        let mut world = fixture();
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));
        let coins = world.create_item(COIN, 30);
        equip(&mut world, player, InventorySlot::Ammo, coins);
        let inventory = PlayerInventory(player);

        inventory.remove_thing(&mut world, Thing::Item(coins), 10);
        assert_eq!(world.item(coins).map(|item| item.count), Some(20));
        assert_eq!(inventory.thing_index(&world, Thing::Item(coins)), 10);

        inventory.remove_thing(&mut world, Thing::Item(coins), 20);
        assert_eq!(inventory.thing_index(&world, Thing::Item(coins)), -1);
        assert_eq!(world.item(coins).and_then(|item| item.parent), None);
    }
}
