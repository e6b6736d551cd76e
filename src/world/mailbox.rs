use crate::entities::creature::CreatureId;
use crate::entities::item::{ItemId, ItemTypeId};
use crate::world::cylinder::{
    Cylinder, CylinderFlags, CylinderId, CylinderLink, ReturnValue, Thing, INDEX_WHEREEVER,
};
use crate::world::item_types::{ITEM_LABEL, ITEM_LETTER, ITEM_PARCEL};
use crate::world::state::WorldState;

#[derive(Debug, Clone, Copy)]
pub struct MailboxCylinder(pub ItemId);

impl MailboxCylinder {
    pub fn can_send(world: &WorldState, item: ItemId) -> bool {
        world
            .item(item)
            .map_or(false, |entry| entry.type_id == ITEM_PARCEL || entry.type_id == ITEM_LETTER)
    }

    /// First line of a letter's text, or of the first addressed label inside
    /// a parcel.
    pub fn receiver(world: &WorldState, item: ItemId) -> Option<String> {
        let entry = world.item(item)?;
        if let Some(data) = entry.container() {
            return data
                .items
                .iter()
                .filter(|inner| world.item(**inner).map_or(false, |label| label.type_id == ITEM_LABEL))
                .find_map(|label| Self::receiver(world, *label));
        }
        let text = entry.attributes.text.as_deref()?;
        if text.is_empty() {
            return None;
        }
        let name = text.lines().next().unwrap_or_default().trim();
        Some(name.to_string())
    }

    /// Moves the item into the receiver's inbox and stamps it. Mail for
    /// unknown or offline players stays where it is.
    pub fn send_item(&self, world: &mut WorldState, item: ItemId) -> bool {
        let Some(name) = Self::receiver(world, item).filter(|name| !name.is_empty()) else {
            return false;
        };
        let Some(player) = world.player_by_name(&name) else {
            log::debug!(target: "mail", "no online receiver named {}, mail kept", name);
            return false;
        };
        let Some(inbox) = world.inbox(player) else {
            return false;
        };

        let Some(entry) = world.item(item) else {
            return false;
        };
        let type_id = entry.type_id;
        let ret = match entry.parent {
            Some(parent) => {
                let count = u32::from(entry.count);
                world
                    .internal_move_item(
                        parent,
                        CylinderId::Item(inbox),
                        INDEX_WHEREEVER,
                        item,
                        count,
                        CylinderFlags::NOLIMIT,
                        None,
                    )
                    .0
            }
            None => world.internal_add_item(
                CylinderId::Item(inbox),
                item,
                INDEX_WHEREEVER,
                CylinderFlags::NOLIMIT,
                false,
            ),
        };
        if !ret.is_ok() {
            log::warn!(target: "mail", "delivery of item {} to {} failed: {}", item.0, name, ret);
            return false;
        }
        world.transform_item(item, ItemTypeId(type_id.0 + 1), -1);
        log::debug!(target: "mail", "delivered item {} to {}", item.0, name);
        true
    }

    fn parent(&self, world: &WorldState) -> Option<CylinderId> {
        world.item(self.0).and_then(|entry| entry.parent)
    }
}

impl Cylinder for MailboxCylinder {
    fn query_add(
        &self,
        world: &WorldState,
        _index: i32,
        thing: Thing,
        _count: u32,
        _flags: CylinderFlags,
        _actor: Option<CreatureId>,
    ) -> ReturnValue {
        match thing.item() {
            Some(item) if Self::can_send(world, item) => ReturnValue::NoError,
            _ => ReturnValue::NotPossible,
        }
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
        let Some(item) = thing.item().filter(|item| Self::can_send(world, *item)) else {
            return;
        };
        if self.send_item(world, item) {
            return;
        }
        // Undelivered mail dropped straight into the slot falls next to the box.
        let detached = world.item(item).map_or(false, |entry| entry.parent.is_none());
        if let (true, Some(parent)) = (detached, self.parent(world)) {
            parent.add_thing(world, INDEX_WHEREEVER, Thing::Item(item));
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
