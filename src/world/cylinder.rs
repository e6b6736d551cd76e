use crate::entities::creature::CreatureId;
use crate::entities::inventory::PlayerInventory;
use crate::entities::item::{ItemId, ItemTypeId, ItemVariant};
use crate::world::container::ContainerCylinder;
use crate::world::mailbox::MailboxCylinder;
use crate::world::position::Position;
use crate::world::state::WorldState;
use crate::world::teleport::TeleportCylinder;
use crate::world::tile::TileCylinder;
use crate::world::trash_holder::TrashHolderCylinder;
use bitflags::bitflags;
use std::fmt;

/// Let the destination pick the slot.
pub const INDEX_WHEREEVER: i32 = -1;
/// Move into the container's parent.
pub const INDEX_MOVE_UP: i32 = 254;
pub const INDEX_ANYWHERE: i32 = 255;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CylinderFlags: u32 {
        const NOLIMIT = 1 << 0;
        const IGNOREBLOCKITEM = 1 << 1;
        const IGNOREBLOCKCREATURE = 1 << 2;
        const CHILDISOWNER = 1 << 3;
        const PATHFINDING = 1 << 4;
        const IGNOREFIELDDAMAGE = 1 << 5;
        const IGNORENOTMOVEABLE = 1 << 6;
        const IGNOREAUTOSTACK = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CylinderLink {
    Owner,
    Parent,
    TopParent,
    Near,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnValue {
    NoError,
    NotPossible,
    NotEnoughRoom,
    NeedExchange,
    CannotPickup,
    ThisIsImpossible,
    NotMoveable,
    PlayerIsNotInvited,
    QuiverAmmoOnly,
    ItemCannotBeMovedThere,
    CannotMoveItemIsNotStoreItem,
    ContainerNotEnoughRoom,
    DepotIsFull,
    NotEnoughCapacity,
    CannotBeDressed,
    PutThisObjectInBothHands,
    PutThisObjectInYourHand,
    BothHandsNeedToBeFree,
    DropTwoHandedItem,
    CanOnlyUseOneShield,
    CanOnlyUseOneWeapon,
    PlayerIsPzLocked,
    PlayerIsPzLockedEnterPvpZone,
    PlayerIsPzLockedLeavePvpZone,
}

impl ReturnValue {
    pub fn is_ok(self) -> bool {
        self == ReturnValue::NoError
    }

    pub fn message(self) -> &'static str {
        match self {
            ReturnValue::NoError => "No error.",
            ReturnValue::NotPossible => "Sorry, not possible.",
            ReturnValue::NotEnoughRoom => "There is not enough room.",
            ReturnValue::NeedExchange => "The destination slot must be exchanged.",
            ReturnValue::CannotPickup => "You cannot take this object.",
            ReturnValue::ThisIsImpossible => "This is impossible.",
            ReturnValue::NotMoveable => "You cannot move this object.",
            ReturnValue::PlayerIsNotInvited => "You are not invited.",
            ReturnValue::QuiverAmmoOnly => "This quiver only holds arrows and bolts.",
            ReturnValue::ItemCannotBeMovedThere => "This item cannot be moved there.",
            ReturnValue::CannotMoveItemIsNotStoreItem => {
                "You cannot move this item into your Store inbox as it was not bought in the Store."
            }
            ReturnValue::ContainerNotEnoughRoom => "You cannot put more objects in this container.",
            ReturnValue::DepotIsFull => "You cannot put more items in this depot.",
            ReturnValue::NotEnoughCapacity => "This object is too heavy for you to carry.",
            ReturnValue::CannotBeDressed => "You cannot dress this object there.",
            ReturnValue::PutThisObjectInBothHands => "Put this object in both hands.",
            ReturnValue::PutThisObjectInYourHand => "Put this object in your hand.",
            ReturnValue::BothHandsNeedToBeFree => "Both hands need to be free.",
            ReturnValue::DropTwoHandedItem => "Drop the double-handed object first.",
            ReturnValue::CanOnlyUseOneShield => "You may use only one shield.",
            ReturnValue::CanOnlyUseOneWeapon => "You may only use one weapon.",
            ReturnValue::PlayerIsPzLocked => {
                "You can not enter a protection zone after attacking another player."
            }
            ReturnValue::PlayerIsPzLockedEnterPvpZone => {
                "You can not enter a pvp zone after attacking another player."
            }
            ReturnValue::PlayerIsPzLockedLeavePvpZone => {
                "You can not leave a pvp zone after attacking another player."
            }
        }
    }
}

impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Anything that can occupy a cylinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Thing {
    Item(ItemId),
    Creature(CreatureId),
}

impl Thing {
    pub fn item(self) -> Option<ItemId> {
        match self {
            Thing::Item(id) => Some(id),
            Thing::Creature(_) => None,
        }
    }

    pub fn creature(self) -> Option<CreatureId> {
        match self {
            Thing::Creature(id) => Some(id),
            Thing::Item(_) => None,
        }
    }
}

/// Non-owning reference to a place that holds things.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CylinderId {
    Tile(Position),
    Item(ItemId),
    Creature(CreatureId),
    Virtual,
}

impl CylinderId {
    pub fn as_item(self) -> Option<ItemId> {
        match self {
            CylinderId::Item(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_tile(self) -> Option<Position> {
        match self {
            CylinderId::Tile(position) => Some(position),
            _ => None,
        }
    }

    pub fn as_creature(self) -> Option<CreatureId> {
        match self {
            CylinderId::Creature(id) => Some(id),
            _ => None,
        }
    }

    /// Items that behave as receivers: containers and the special receptacles.
    pub fn is_item_cylinder(self, world: &WorldState) -> bool {
        matches!(
            self.resolve(world),
            CylinderHandle::Container(_)
                | CylinderHandle::Mailbox(_)
                | CylinderHandle::TrashHolder(_)
                | CylinderHandle::Teleport(_)
        )
    }

    fn resolve(self, world: &WorldState) -> CylinderHandle {
        match self {
            CylinderId::Tile(position) => CylinderHandle::Tile(TileCylinder(position)),
            CylinderId::Item(id) => match world.item(id).map(|item| &item.variant) {
                Some(ItemVariant::Container(_)) => CylinderHandle::Container(ContainerCylinder(id)),
                Some(ItemVariant::Mailbox) => CylinderHandle::Mailbox(MailboxCylinder(id)),
                Some(ItemVariant::TrashHolder) => {
                    CylinderHandle::TrashHolder(TrashHolderCylinder(id))
                }
                Some(ItemVariant::Teleport { .. }) => CylinderHandle::Teleport(TeleportCylinder(id)),
                _ => CylinderHandle::Virtual(VirtualCylinder),
            },
            CylinderId::Creature(id) => match world.creature(id) {
                Some(creature) if creature.is_player() => {
                    CylinderHandle::Player(PlayerInventory(id))
                }
                _ => CylinderHandle::Virtual(VirtualCylinder),
            },
            CylinderId::Virtual => CylinderHandle::Virtual(VirtualCylinder),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CylinderHandle {
    Tile(TileCylinder),
    Container(ContainerCylinder),
    Mailbox(MailboxCylinder),
    TrashHolder(TrashHolderCylinder),
    Teleport(TeleportCylinder),
    Player(PlayerInventory),
    Virtual(VirtualCylinder),
}

impl CylinderHandle {
    fn as_dyn(&self) -> &dyn Cylinder {
        match self {
            CylinderHandle::Tile(handle) => handle,
            CylinderHandle::Container(handle) => handle,
            CylinderHandle::Mailbox(handle) => handle,
            CylinderHandle::TrashHolder(handle) => handle,
            CylinderHandle::Teleport(handle) => handle,
            CylinderHandle::Player(handle) => handle,
            CylinderHandle::Virtual(handle) => handle,
        }
    }
}

pub trait Cylinder {
    /// Whether `thing` (or `count` of it) may be added at `index`.
    fn query_add(
        &self,
        world: &WorldState,
        index: i32,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue;

    /// How many units of `thing` fit, returned next to the verdict.
    fn query_max_count(
        &self,
        world: &WorldState,
        index: i32,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
    ) -> (ReturnValue, u32);

    fn query_remove(
        &self,
        world: &WorldState,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue;

    /// Resolves where an add really lands. May rewrite `index`, `dest_item`
    /// and `flags`.
    fn query_destination(
        &self,
        world: &WorldState,
        index: &mut i32,
        thing: Thing,
        dest_item: &mut Option<ItemId>,
        flags: &mut CylinderFlags,
    ) -> CylinderId;

    fn add_thing(&self, world: &mut WorldState, index: i32, thing: Thing);

    fn update_thing(&self, world: &mut WorldState, thing: Thing, type_id: ItemTypeId, count: u32);

    fn replace_thing(&self, world: &mut WorldState, index: u32, thing: Thing);

    fn remove_thing(&self, world: &mut WorldState, thing: Thing, count: u32);

    fn post_add_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        old_parent: Option<CylinderId>,
        index: i32,
        link: CylinderLink,
    );

    fn post_remove_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        new_parent: Option<CylinderId>,
        index: i32,
        link: CylinderLink,
    );

    fn thing_index(&self, _world: &WorldState, _thing: Thing) -> i32 {
        -1
    }

    fn first_index(&self) -> usize {
        0
    }

    fn last_index(&self, _world: &WorldState) -> usize {
        0
    }

    fn thing_at(&self, _world: &WorldState, _index: usize) -> Option<Thing> {
        None
    }

    fn item_type_count(&self, _world: &WorldState, _type_id: ItemTypeId, _sub_type: i32) -> u32 {
        0
    }

    /// Raw insertion used while loading. Skips notifications.
    fn internal_add_thing(&self, _world: &mut WorldState, _index: u32, _thing: Thing) {}
}

impl Cylinder for CylinderId {
    fn query_add(
        &self,
        world: &WorldState,
        index: i32,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue {
        self.resolve(world)
            .as_dyn()
            .query_add(world, index, thing, count, flags, actor)
    }

    fn query_max_count(
        &self,
        world: &WorldState,
        index: i32,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
    ) -> (ReturnValue, u32) {
        self.resolve(world)
            .as_dyn()
            .query_max_count(world, index, thing, count, flags)
    }

    fn query_remove(
        &self,
        world: &WorldState,
        thing: Thing,
        count: u32,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue {
        self.resolve(world)
            .as_dyn()
            .query_remove(world, thing, count, flags, actor)
    }

    fn query_destination(
        &self,
        world: &WorldState,
        index: &mut i32,
        thing: Thing,
        dest_item: &mut Option<ItemId>,
        flags: &mut CylinderFlags,
    ) -> CylinderId {
        self.resolve(world)
            .as_dyn()
            .query_destination(world, index, thing, dest_item, flags)
    }

    fn add_thing(&self, world: &mut WorldState, index: i32, thing: Thing) {
        let handle = self.resolve(world);
        handle.as_dyn().add_thing(world, index, thing);
    }

    fn update_thing(&self, world: &mut WorldState, thing: Thing, type_id: ItemTypeId, count: u32) {
        let handle = self.resolve(world);
        handle.as_dyn().update_thing(world, thing, type_id, count);
    }

    fn replace_thing(&self, world: &mut WorldState, index: u32, thing: Thing) {
        let handle = self.resolve(world);
        handle.as_dyn().replace_thing(world, index, thing);
    }

    fn remove_thing(&self, world: &mut WorldState, thing: Thing, count: u32) {
        let handle = self.resolve(world);
        handle.as_dyn().remove_thing(world, thing, count);
    }

    fn post_add_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        old_parent: Option<CylinderId>,
        index: i32,
        link: CylinderLink,
    ) {
        let handle = self.resolve(world);
        handle
            .as_dyn()
            .post_add_notification(world, thing, old_parent, index, link);
    }

    fn post_remove_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        new_parent: Option<CylinderId>,
        index: i32,
        link: CylinderLink,
    ) {
        let handle = self.resolve(world);
        handle
            .as_dyn()
            .post_remove_notification(world, thing, new_parent, index, link);
    }

    fn thing_index(&self, world: &WorldState, thing: Thing) -> i32 {
        self.resolve(world).as_dyn().thing_index(world, thing)
    }

    fn first_index(&self) -> usize {
        match self {
            CylinderId::Creature(_) => crate::entities::inventory::SLOT_FIRST as usize,
            _ => 0,
        }
    }

    fn last_index(&self, world: &WorldState) -> usize {
        self.resolve(world).as_dyn().last_index(world)
    }

    fn thing_at(&self, world: &WorldState, index: usize) -> Option<Thing> {
        self.resolve(world).as_dyn().thing_at(world, index)
    }

    fn item_type_count(&self, world: &WorldState, type_id: ItemTypeId, sub_type: i32) -> u32 {
        self.resolve(world)
            .as_dyn()
            .item_type_count(world, type_id, sub_type)
    }

    fn internal_add_thing(&self, world: &mut WorldState, index: u32, thing: Thing) {
        let handle = self.resolve(world);
        handle.as_dyn().internal_add_thing(world, index, thing);
    }
}

/// Stand-in destination that refuses everything, used where a move has no
/// real target (e.g. an item about to be deleted).
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualCylinder;

impl Cylinder for VirtualCylinder {
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
        CylinderId::Virtual
    }

    fn add_thing(&self, _world: &mut WorldState, _index: i32, _thing: Thing) {}

    fn update_thing(&self, _world: &mut WorldState, _thing: Thing, _type_id: ItemTypeId, _count: u32) {}

    fn replace_thing(&self, _world: &mut WorldState, _index: u32, _thing: Thing) {}

    fn remove_thing(&self, _world: &mut WorldState, _thing: Thing, _count: u32) {}

    fn post_add_notification(
        &self,
        _world: &mut WorldState,
        _thing: Thing,
        _old_parent: Option<CylinderId>,
        _index: i32,
        _link: CylinderLink,
    ) {
    }

    fn post_remove_notification(
        &self,
        _world: &mut WorldState,
        _thing: Thing,
        _new_parent: Option<CylinderId>,
        _index: i32,
        _link: CylinderLink,
    ) {
    }
}
