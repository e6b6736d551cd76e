use crate::entities::creature::CombatTypes;
use crate::entities::inventory::SlotPositions;
use crate::entities::item::ItemTypeId;
use crate::error::WorldError;
use crate::world::tile::TileFlags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ITEM_BROWSEFIELD: ItemTypeId = ItemTypeId(460);
pub const ITEM_PARCEL: ItemTypeId = ItemTypeId(2595);
pub const ITEM_LETTER: ItemTypeId = ItemTypeId(2597);
pub const ITEM_LABEL: ItemTypeId = ItemTypeId(2599);
pub const ITEM_LOCKER: ItemTypeId = ItemTypeId(2589);
pub const ITEM_DEPOT: ItemTypeId = ItemTypeId(2594);
pub const ITEM_INBOX: ItemTypeId = ItemTypeId(14404);
pub const ITEM_STORE_INBOX: ItemTypeId = ItemTypeId(26052);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemGroup {
    #[default]
    Normal,
    Ground,
    Container,
    DepotLocker,
    Mailbox,
    TrashHolder,
    Teleport,
    Door,
    Bed,
    MagicField,
    Splash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponType {
    #[default]
    None,
    Sword,
    Club,
    Axe,
    Shield,
    Distance,
    Wand,
    Ammo,
    Quiver,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldInfo {
    pub combat_type: CombatTypes,
    pub damage: i32,
    pub replaceable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemType {
    pub id: ItemTypeId,
    pub name: String,
    pub group: ItemGroup,
    pub weight: u32,
    pub stackable: bool,
    pub capacity: u16,
    pub pickupable: bool,
    pub moveable: bool,
    pub block_solid: bool,
    pub block_projectile: bool,
    pub block_path_find: bool,
    pub has_height: bool,
    pub allow_pickupable: bool,
    pub is_vertical: bool,
    pub is_horizontal: bool,
    pub hangable: bool,
    pub always_on_top: bool,
    pub top_order: u8,
    pub floor_change: TileFlags,
    pub slot_position: SlotPositions,
    pub weapon_type: WeaponType,
    pub field: Option<FieldInfo>,
}

impl Default for ItemType {
    fn default() -> Self {
        Self {
            id: ItemTypeId(0),
            name: String::new(),
            group: ItemGroup::Normal,
            weight: 0,
            stackable: false,
            capacity: 0,
            pickupable: false,
            moveable: true,
            block_solid: false,
            block_projectile: false,
            block_path_find: false,
            has_height: false,
            allow_pickupable: false,
            is_vertical: false,
            is_horizontal: false,
            hangable: false,
            always_on_top: false,
            top_order: 0,
            floor_change: TileFlags::empty(),
            slot_position: SlotPositions::empty(),
            weapon_type: WeaponType::None,
            field: None,
        }
    }
}

impl ItemType {
    pub fn is_ground_tile(&self) -> bool {
        self.group == ItemGroup::Ground
    }

    pub fn is_container(&self) -> bool {
        matches!(self.group, ItemGroup::Container | ItemGroup::DepotLocker)
    }

    pub fn is_splash(&self) -> bool {
        self.group == ItemGroup::Splash
    }

    pub fn is_magic_field(&self) -> bool {
        self.group == ItemGroup::MagicField
    }

    pub fn is_bed(&self) -> bool {
        self.group == ItemGroup::Bed
    }

    pub fn is_quiver(&self) -> bool {
        self.weapon_type == WeaponType::Quiver
    }

    pub fn is_ammo(&self) -> bool {
        self.weapon_type == WeaponType::Ammo
    }

    pub fn field_damage(&self) -> i32 {
        self.field.as_ref().map_or(0, |field| field.damage)
    }

    pub fn field_combat(&self) -> CombatTypes {
        self.field
            .as_ref()
            .map_or(CombatTypes::empty(), |field| field.combat_type)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ItemTypeIndex {
    types: HashMap<ItemTypeId, ItemType>,
    fallback: ItemType,
}

impl ItemTypeIndex {
    pub fn get(&self, id: ItemTypeId) -> Option<&ItemType> {
        self.types.get(&id)
    }

    /// Unknown ids resolve to an inert default type.
    pub fn get_or_default(&self, id: ItemTypeId) -> &ItemType {
        self.types.get(&id).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, id: ItemTypeId) -> bool {
        self.types.contains_key(&id)
    }

    pub fn insert(&mut self, item: ItemType) -> Result<(), WorldError> {
        if self.types.contains_key(&item.id) {
            return Err(WorldError::Duplicate {
                kind: "item type",
                id: u32::from(item.id.0),
            });
        }
        self.types.insert(item.id, item);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn from_yaml(text: &str) -> Result<Self, WorldError> {
        let list: Vec<ItemType> = serde_yaml::from_str(text)?;
        let mut index = Self::default();
        for item in list {
            index.insert(item)?;
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_types_default_to_moveable_plain_items() {
        let index = ItemTypeIndex::from_yaml(
            "- id: 3031\n  name: gold coin\n  stackable: true\n  pickupable: true\n  weight: 10\n\
             - id: 4526\n  name: grass\n  group: ground\n  moveable: false\n",
        )
        .expect("parse");
        assert_eq!(index.len(), 2);
        let coin = index.get(ItemTypeId(3031)).expect("coin");
        assert!(coin.moveable);
        assert!(coin.stackable);
        assert_eq!(coin.group, ItemGroup::Normal);
        assert!(index.get_or_default(ItemTypeId(4526)).is_ground_tile());
        assert_eq!(index.get_or_default(ItemTypeId(9)).id, ItemTypeId(0));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = ItemTypeIndex::from_yaml("- id: 1\n- id: 1\n").unwrap_err();
        assert!(matches!(err, WorldError::Duplicate { id: 1, .. }));
    }
}
