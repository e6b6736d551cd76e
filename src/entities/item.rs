use crate::world::cylinder::CylinderId;
use crate::world::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u32);

impl ItemId {
    pub fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemTypeId(pub u16);

pub const MAX_STACK: u16 = 100;

/// Per-instance attributes. Two items stack only when these match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemAttributes {
    pub action_id: u16,
    pub unique_id: u16,
    pub text: Option<String>,
    pub written_by: Option<String>,
    pub description: Option<String>,
    pub door_id: u8,
    pub charges: u16,
    pub wrap_id: u16,
    pub store_item: bool,
    pub sleeper_guid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Regular,
    BrowseField,
    DepotLocker,
    DepotChest,
    Inbox,
    StoreInbox,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerData {
    pub kind: ContainerKind,
    /// Front is index 0.
    pub items: VecDeque<ItemId>,
    pub capacity: u32,
    pub total_weight: u32,
    pub ammo_count: u32,
    pub unlocked: bool,
    pub pagination: bool,
}

impl ContainerData {
    pub fn new(capacity: u32) -> Self {
        Self {
            kind: ContainerKind::Regular,
            items: VecDeque::new(),
            capacity,
            total_weight: 0,
            ammo_count: 0,
            unlocked: true,
            pagination: false,
        }
    }

    pub fn with_kind(kind: ContainerKind, capacity: u32) -> Self {
        let mut data = Self::new(capacity);
        data.kind = kind;
        match kind {
            ContainerKind::BrowseField => {
                data.capacity = 30;
                data.unlocked = false;
                data.pagination = true;
            }
            ContainerKind::Inbox => {
                data.capacity = 30;
                data.unlocked = false;
                data.pagination = true;
            }
            ContainerKind::StoreInbox => {
                data.capacity = 20;
                data.pagination = true;
            }
            ContainerKind::DepotChest => {
                data.pagination = true;
            }
            ContainerKind::Regular | ContainerKind::DepotLocker => {}
        }
        data
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity as usize
    }

    pub fn item_at(&self, index: usize) -> Option<ItemId> {
        self.items.get(index).copied()
    }

    pub fn index_of(&self, item: ItemId) -> Option<usize> {
        self.items.iter().position(|entry| *entry == item)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemVariant {
    Plain,
    Container(ContainerData),
    Mailbox,
    TrashHolder,
    Teleport { destination: Position },
    Door { house_id: Option<u32> },
    Bed { house_id: Option<u32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub type_id: ItemTypeId,
    pub count: u16,
    pub attributes: ItemAttributes,
    pub parent: Option<CylinderId>,
    pub variant: ItemVariant,
}

impl Item {
    pub fn new(id: ItemId, type_id: ItemTypeId, count: u16, variant: ItemVariant) -> Self {
        Self {
            id,
            type_id,
            count: count.max(1),
            attributes: ItemAttributes::default(),
            parent: None,
            variant,
        }
    }

    pub fn container(&self) -> Option<&ContainerData> {
        match &self.variant {
            ItemVariant::Container(data) => Some(data),
            _ => None,
        }
    }

    pub fn container_mut(&mut self) -> Option<&mut ContainerData> {
        match &mut self.variant {
            ItemVariant::Container(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.variant, ItemVariant::Container(_))
    }

    pub fn container_kind(&self) -> Option<ContainerKind> {
        self.container().map(|data| data.kind)
    }

    pub fn has_unique_id(&self) -> bool {
        self.attributes.unique_id != 0
    }

    pub fn is_store_item(&self) -> bool {
        self.attributes.store_item
    }

    pub fn house_id(&self) -> Option<u32> {
        match self.variant {
            ItemVariant::Door { house_id } | ItemVariant::Bed { house_id } => house_id,
            _ => None,
        }
    }

    /// Same type and identical attributes.
    pub fn equals(&self, other: &Item) -> bool {
        self.type_id == other.type_id && self.attributes == other.attributes
    }

    /// Count if `sub_type` is -1 or matches, else 0.
    pub fn count_by_type(&self, stackable: bool, sub_type: i32) -> u32 {
        if sub_type == -1 || sub_type == self.sub_type(stackable) {
            u32::from(self.count)
        } else {
            0
        }
    }

    pub fn sub_type(&self, stackable: bool) -> i32 {
        if stackable {
            i32::from(self.count)
        } else {
            i32::from(self.attributes.charges)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_identity_and_count() {
        let a = Item::new(ItemId(1), ItemTypeId(3031), 40, ItemVariant::Plain);
        let b = Item::new(ItemId(2), ItemTypeId(3031), 7, ItemVariant::Plain);
        assert_ne!(a.id, b.id);
        assert!(a.equals(&b));

        let mut c = b.clone();
        c.attributes.action_id = 1000;
        assert!(!a.equals(&c));
    }

    #[test]
    fn count_by_type_filters_on_sub_type() {
        let coins = Item::new(ItemId(3), ItemTypeId(3031), 25, ItemVariant::Plain);
        assert_eq!(coins.count_by_type(true, -1), 25);
        assert_eq!(coins.count_by_type(true, 25), 25);
        assert_eq!(coins.count_by_type(true, 3), 0);
    }

    #[test]
    fn special_container_kinds_set_their_limits() {
        let inbox = ContainerData::with_kind(ContainerKind::Inbox, 0);
        assert_eq!(inbox.capacity, 30);
        assert!(!inbox.unlocked);
        assert!(inbox.pagination);

        let store = ContainerData::with_kind(ContainerKind::StoreInbox, 0);
        assert_eq!(store.capacity, 20);
        assert!(store.unlocked);
        assert!(store.pagination);

        let chest = ContainerData::with_kind(ContainerKind::DepotChest, 15);
        assert_eq!(chest.capacity, 15);
        assert!(chest.pagination);
    }
}
