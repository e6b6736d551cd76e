use crate::entities::creature::{Creature, CreatureId, CreatureKind};
use crate::entities::item::{ItemId, ItemTypeId, ItemVariant};
use crate::world::cylinder::{
    Cylinder, CylinderFlags, CylinderId, CylinderLink, ReturnValue, Thing,
};
use crate::world::events::WorldEvent;
use crate::world::mailbox::MailboxCylinder;
use crate::world::position::Position;
use crate::world::state::WorldState;
use crate::world::teleport::TeleportCylinder;
use crate::world::trash_holder::TrashHolderCylinder;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

const MAX_TILE_ITEMS: usize = 0xFFFF;
/// Clients only address the first ten things of a tile.
const MAX_STACK_POS: i32 = 10;
/// Above this many things the clients get a full tile refresh.
const TILE_REFRESH_THRESHOLD: usize = 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct TileFlags: u32 {
        const FLOORCHANGE_DOWN = 1 << 0;
        const FLOORCHANGE_NORTH = 1 << 1;
        const FLOORCHANGE_SOUTH = 1 << 2;
        const FLOORCHANGE_EAST = 1 << 3;
        const FLOORCHANGE_WEST = 1 << 4;
        const FLOORCHANGE_SOUTH_ALT = 1 << 5;
        const FLOORCHANGE_EAST_ALT = 1 << 6;
        const PROTECTIONZONE = 1 << 7;
        const NOPVPZONE = 1 << 8;
        const NOLOGOUT = 1 << 9;
        const PVPZONE = 1 << 10;
        const TELEPORT = 1 << 11;
        const MAGICFIELD = 1 << 12;
        const MAILBOX = 1 << 13;
        const TRASHHOLDER = 1 << 14;
        const BED = 1 << 15;
        const DEPOT = 1 << 16;
        const BLOCKSOLID = 1 << 17;
        const BLOCKPATH = 1 << 18;
        const IMMOVABLEBLOCKSOLID = 1 << 19;
        const IMMOVABLEBLOCKPATH = 1 << 20;
        const IMMOVABLENOFIELDBLOCKPATH = 1 << 21;
        const NOFIELDBLOCKPATH = 1 << 22;
        const SUPPORTS_HANGABLE = 1 << 23;

        const FLOORCHANGE = Self::FLOORCHANGE_DOWN.bits()
            | Self::FLOORCHANGE_NORTH.bits()
            | Self::FLOORCHANGE_SOUTH.bits()
            | Self::FLOORCHANGE_EAST.bits()
            | Self::FLOORCHANGE_WEST.bits()
            | Self::FLOORCHANGE_SOUTH_ALT.bits()
            | Self::FLOORCHANGE_EAST_ALT.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneType {
    Protection,
    NoPvp,
    Pvp,
    Normal,
}

/// Per-item properties derived from the item type and the unique id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemProperty {
    BlockSolid,
    HasHeight,
    BlockProjectile,
    BlockPath,
    IsVertical,
    IsHorizontal,
    Moveable,
    ImmovableBlockSolid,
    ImmovableBlockPath,
    ImmovableNoFieldBlockPath,
    NoFieldBlockPath,
    SupportHangable,
}

pub fn item_has_property(world: &WorldState, item: ItemId, property: ItemProperty) -> bool {
    let Some(entry) = world.item(item) else {
        return false;
    };
    let item_type = world.item_type_of(item);
    let immovable = !item_type.moveable || entry.has_unique_id();
    match property {
        ItemProperty::BlockSolid => item_type.block_solid,
        ItemProperty::Moveable => item_type.moveable && !entry.has_unique_id(),
        ItemProperty::HasHeight => item_type.has_height,
        ItemProperty::BlockProjectile => item_type.block_projectile,
        ItemProperty::BlockPath => item_type.block_path_find,
        ItemProperty::IsVertical => item_type.is_vertical,
        ItemProperty::IsHorizontal => item_type.is_horizontal,
        ItemProperty::ImmovableBlockSolid => item_type.block_solid && immovable,
        ItemProperty::ImmovableBlockPath => item_type.block_path_find && immovable,
        ItemProperty::ImmovableNoFieldBlockPath => {
            !item_type.is_magic_field() && item_type.block_path_find && immovable
        }
        ItemProperty::NoFieldBlockPath => {
            !item_type.is_magic_field() && item_type.block_path_find
        }
        ItemProperty::SupportHangable => item_type.is_horizontal || item_type.is_vertical,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    position: Position,
    pub ground: Option<ItemId>,
    items: Vec<ItemId>,
    down_count: usize,
    creatures: Vec<CreatureId>,
    pub flags: TileFlags,
    pub house_id: Option<u32>,
}

impl Tile {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            ground: None,
            items: Vec::new(),
            down_count: 0,
            creatures: Vec::new(),
            flags: TileFlags::empty(),
            house_id: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn has_flag(&self, flags: TileFlags) -> bool {
        self.flags.intersects(flags)
    }

    pub fn is_house_tile(&self) -> bool {
        self.house_id.is_some()
    }

    pub fn zone(&self) -> ZoneType {
        if self.flags.contains(TileFlags::PROTECTIONZONE) {
            ZoneType::Protection
        } else if self.flags.contains(TileFlags::NOPVPZONE) {
            ZoneType::NoPvp
        } else if self.flags.contains(TileFlags::PVPZONE) {
            ZoneType::Pvp
        } else {
            ZoneType::Normal
        }
    }

    /// Non-ground items, down items first.
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn down_items(&self) -> &[ItemId] {
        &self.items[..self.down_count]
    }

    pub fn top_items(&self) -> &[ItemId] {
        &self.items[self.down_count..]
    }

    pub fn creatures(&self) -> &[CreatureId] {
        &self.creatures
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn creature_count(&self) -> usize {
        self.creatures.len()
    }

    pub fn thing_count(&self) -> usize {
        usize::from(self.ground.is_some()) + self.items.len() + self.creatures.len()
    }

    pub fn top_down_item(&self) -> Option<ItemId> {
        self.down_items().first().copied()
    }

    pub fn top_top_item(&self) -> Option<ItemId> {
        self.top_items().last().copied()
    }

    pub fn top_creature(&self) -> Option<CreatureId> {
        self.creatures.first().copied()
    }

    pub fn bottom_creature(&self) -> Option<CreatureId> {
        self.creatures.last().copied()
    }

    pub fn contains_item(&self, item: ItemId) -> bool {
        self.ground == Some(item) || self.items.contains(&item)
    }

    pub(crate) fn insert_creature_front(&mut self, creature: CreatureId) {
        self.creatures.insert(0, creature);
    }

    pub(crate) fn remove_creature_entry(&mut self, creature: CreatureId) -> bool {
        match self.creatures.iter().position(|id| *id == creature) {
            Some(index) => {
                self.creatures.remove(index);
                true
            }
            None => false,
        }
    }

    fn insert_down_front(&mut self, item: ItemId) {
        self.items.insert(0, item);
        self.down_count += 1;
    }

    fn insert_top_at(&mut self, offset: usize, item: ItemId) {
        self.items.insert(self.down_count + offset, item);
    }

    fn remove_item_entry(&mut self, item: ItemId) -> bool {
        let Some(index) = self.items.iter().position(|id| *id == item) else {
            return false;
        };
        self.items.remove(index);
        if index < self.down_count {
            self.down_count -= 1;
        }
        true
    }

    /// Places an item on a tile that is not on the map yet. Down items go to
    /// the front, top items to the back; parents and flags are settled when
    /// the tile is set.
    pub fn stage_item(&mut self, item: ItemId, is_ground: bool, on_top: bool) {
        if is_ground {
            self.ground = Some(item);
        } else if on_top {
            self.items.push(item);
        } else {
            self.insert_down_front(item);
        }
    }

    /// Empties the tile, returning its ground and its other items.
    pub(crate) fn take_contents(&mut self) -> (Option<ItemId>, Vec<ItemId>) {
        self.down_count = 0;
        (self.ground.take(), std::mem::take(&mut self.items))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TileCylinder(pub Position);

impl TileCylinder {
    fn this(&self) -> CylinderId {
        CylinderId::Tile(self.0)
    }

    pub fn tile<'a>(&self, world: &'a WorldState) -> Option<&'a Tile> {
        world.map.tile(self.0)
    }

    fn tile_mut<'a>(&self, world: &'a mut WorldState) -> Option<&'a mut Tile> {
        world.map.tile_mut(self.0)
    }

    fn has_flag(&self, world: &WorldState, flags: TileFlags) -> bool {
        self.tile(world).map_or(false, |tile| tile.has_flag(flags))
    }

    fn set_flag(&self, world: &mut WorldState, flags: TileFlags) {
        if let Some(tile) = self.tile_mut(world) {
            tile.flags.insert(flags);
        }
    }

    fn reset_flag(&self, world: &mut WorldState, flags: TileFlags) {
        if let Some(tile) = self.tile_mut(world) {
            tile.flags.remove(flags);
        }
    }

    /// Ground first, then the item list.
    pub fn all_items(&self, world: &WorldState) -> Vec<ItemId> {
        self.tile(world).map_or_else(Vec::new, |tile| {
            tile.ground.iter().chain(tile.items.iter()).copied().collect()
        })
    }

    pub fn has_property(&self, world: &WorldState, property: ItemProperty) -> bool {
        self.all_items(world)
            .into_iter()
            .any(|item| item_has_property(world, item, property))
    }

    pub fn has_property_except(
        &self,
        world: &WorldState,
        exclude: ItemId,
        property: ItemProperty,
    ) -> bool {
        self.all_items(world)
            .into_iter()
            .any(|item| item != exclude && item_has_property(world, item, property))
    }

    /// Whether exactly `n` stacked height items are reached.
    pub fn has_height(&self, world: &WorldState, n: u32) -> bool {
        let mut height = 0;
        for item in self.all_items(world) {
            if item_has_property(world, item, ItemProperty::HasHeight) {
                height += 1;
            }
            if height == n {
                return true;
            }
        }
        false
    }

    /// Ground first, then items from the top of the stack down.
    fn find_special(
        &self,
        world: &WorldState,
        flag: TileFlags,
        matches: impl Fn(&WorldState, ItemId) -> bool,
    ) -> Option<ItemId> {
        let tile = self.tile(world)?;
        if !tile.has_flag(flag) {
            return None;
        }
        if let Some(ground) = tile.ground {
            if matches(world, ground) {
                return Some(ground);
            }
        }
        tile.items.iter().rev().copied().find(|item| matches(world, *item))
    }

    pub fn field_item(&self, world: &WorldState) -> Option<ItemId> {
        self.find_special(world, TileFlags::MAGICFIELD, |world, item| {
            world.item_type_of(item).is_magic_field()
        })
    }

    pub fn teleport_item(&self, world: &WorldState) -> Option<ItemId> {
        let tile = self.tile(world)?;
        if !tile.has_flag(TileFlags::TELEPORT) {
            return None;
        }
        tile.items
            .iter()
            .rev()
            .copied()
            .find(|item| has_variant(world, *item, |variant| matches!(variant, ItemVariant::Teleport { .. })))
    }

    pub fn trash_holder(&self, world: &WorldState) -> Option<ItemId> {
        self.find_special(world, TileFlags::TRASHHOLDER, |world, item| {
            has_variant(world, item, |variant| matches!(variant, ItemVariant::TrashHolder))
        })
    }

    pub fn mailbox(&self, world: &WorldState) -> Option<ItemId> {
        self.find_special(world, TileFlags::MAILBOX, |world, item| {
            has_variant(world, item, |variant| matches!(variant, ItemVariant::Mailbox))
        })
    }

    pub fn bed_item(&self, world: &WorldState) -> Option<ItemId> {
        self.find_special(world, TileFlags::BED, |world, item| {
            has_variant(world, item, |variant| matches!(variant, ItemVariant::Bed { .. }))
        })
    }

    /// Stack position of `item` as seen by `viewer`; `None` sees every creature.
    /// Returns -1 past the tenth visible thing.
    pub fn stack_pos_of_item(
        &self,
        world: &WorldState,
        viewer: Option<CreatureId>,
        item: ItemId,
    ) -> i32 {
        let Some(tile) = self.tile(world) else {
            return -1;
        };
        let mut n = 0;
        if let Some(ground) = tile.ground {
            if ground == item {
                return n;
            }
            n += 1;
        }

        let on_top = world.item_type_of(item).always_on_top;
        if on_top {
            for entry in tile.top_items() {
                if *entry == item {
                    return n;
                }
                n += 1;
                if n == MAX_STACK_POS {
                    return -1;
                }
            }
        } else {
            n += tile.top_items().len() as i32;
            if n >= MAX_STACK_POS {
                return -1;
            }
        }

        let viewer = viewer.and_then(|id| world.creature(id));
        for creature in &tile.creatures {
            if can_see(world, viewer, *creature) {
                n += 1;
                if n >= MAX_STACK_POS {
                    return -1;
                }
            }
        }

        if !on_top {
            for entry in tile.down_items() {
                if *entry == item {
                    return n;
                }
                n += 1;
                if n >= MAX_STACK_POS {
                    return -1;
                }
            }
        }
        -1
    }

    /// Client stack position of a creature; creatures are counted from the
    /// bottom of the list.
    pub fn client_index_of_creature(
        &self,
        world: &WorldState,
        viewer: Option<CreatureId>,
        creature: CreatureId,
    ) -> i32 {
        let Some(tile) = self.tile(world) else {
            return -1;
        };
        let mut n = i32::from(tile.ground.is_some()) + tile.top_items().len() as i32;
        let viewer = viewer.and_then(|id| world.creature(id));
        for entry in tile.creatures.iter().rev() {
            if *entry == creature {
                return n;
            }
            if can_see(world, viewer, *entry) {
                n += 1;
            }
        }
        -1
    }

    pub fn is_invited(&self, world: &WorldState, player: CreatureId) -> bool {
        match self.tile(world).and_then(|tile| tile.house_id) {
            Some(house_id) => world.is_invited(house_id, Some(player)),
            None => true,
        }
    }

    fn query_add_creature(
        &self,
        world: &WorldState,
        tile: &Tile,
        creature: &Creature,
        flags: CylinderFlags,
    ) -> ReturnValue {
        if flags.contains(CylinderFlags::NOLIMIT) {
            return ReturnValue::NoError;
        }
        if flags.contains(CylinderFlags::PATHFINDING)
            && tile.has_flag(TileFlags::FLOORCHANGE | TileFlags::TELEPORT)
        {
            return ReturnValue::NotPossible;
        }
        if tile.ground.is_none() {
            return ReturnValue::NotPossible;
        }

        let in_protection_zone = tile.has_flag(TileFlags::PROTECTIONZONE);
        if !flags.contains(CylinderFlags::IGNOREBLOCKCREATURE) {
            for other in tile.creatures.iter().filter_map(|id| world.creature(*id)) {
                let other_blocks = !other.ghost && other.is_player() && !other.is_access_player();
                if other_blocks
                    && creature.is_player()
                    && !creature.is_access_player()
                    && !creature.can_walk_through(other, in_protection_zone)
                {
                    return ReturnValue::NotEnoughRoom;
                }
            }
        }

        if !flags.contains(CylinderFlags::IGNOREBLOCKITEM) {
            if tile.has_flag(TileFlags::BLOCKSOLID) {
                return ReturnValue::NotEnoughRoom;
            }
        } else {
            let immovable_block = tile
                .ground
                .iter()
                .chain(tile.items.iter())
                .any(|item| item_has_property(world, *item, ItemProperty::ImmovableBlockSolid));
            if immovable_block {
                return ReturnValue::NotPossible;
            }
        }

        match creature.kind {
            CreatureKind::Player => self.query_add_player(world, tile, creature, flags),
            CreatureKind::Monster => self.query_add_monster(world, tile, creature, flags),
            CreatureKind::Npc => query_add_npc(tile, creature, flags),
        }
    }

    fn query_add_player(
        &self,
        world: &WorldState,
        tile: &Tile,
        player: &Creature,
        flags: CylinderFlags,
    ) -> ReturnValue {
        if let Some(house_id) = tile.house_id {
            if !world.is_invited(house_id, Some(player.id)) {
                return ReturnValue::PlayerIsNotInvited;
            }
        }

        let in_protection_zone = tile.has_flag(TileFlags::PROTECTIONZONE);
        if !flags.contains(CylinderFlags::IGNOREBLOCKCREATURE) && !player.is_access_player() {
            let blocked = tile
                .creatures
                .iter()
                .filter_map(|id| world.creature(*id))
                .any(|other| !player.can_walk_through(other, in_protection_zone));
            if blocked {
                return ReturnValue::NotPossible;
            }
        }

        if let Some(field) = self.field_item(world) {
            if world.item_type_of(field).field_damage() != 0
                && flags.contains(CylinderFlags::PATHFINDING)
                && !flags.contains(CylinderFlags::IGNOREFIELDDAMAGE)
            {
                return ReturnValue::NotPossible;
            }
        }

        if !player.placed && tile.has_flag(TileFlags::NOLOGOUT) {
            return ReturnValue::NotPossible;
        }

        let pz_locked = player.as_player().map_or(false, |data| data.pz_locked);
        let current = if player.placed {
            world.map.tile(player.position)
        } else {
            None
        };
        if let (Some(current), true) = (current, pz_locked) {
            if !current.has_flag(TileFlags::PVPZONE) {
                if tile.has_flag(TileFlags::PVPZONE) {
                    return ReturnValue::PlayerIsPzLockedEnterPvpZone;
                }
            } else if !tile.has_flag(TileFlags::PVPZONE) {
                return ReturnValue::PlayerIsPzLockedLeavePvpZone;
            }

            if (!current.has_flag(TileFlags::NOPVPZONE) && tile.has_flag(TileFlags::NOPVPZONE))
                || (!current.has_flag(TileFlags::PROTECTIONZONE)
                    && tile.has_flag(TileFlags::PROTECTIONZONE))
            {
                return ReturnValue::PlayerIsPzLocked;
            }
        }
        ReturnValue::NoError
    }

    fn query_add_monster(
        &self,
        world: &WorldState,
        tile: &Tile,
        monster: &Creature,
        flags: CylinderFlags,
    ) -> ReturnValue {
        let data = monster.as_monster().cloned().unwrap_or_default();
        if tile.has_flag(TileFlags::PROTECTIONZONE | TileFlags::FLOORCHANGE | TileFlags::TELEPORT) {
            return ReturnValue::NotPossible;
        }
        if tile.is_house_tile() {
            return ReturnValue::NotPossible;
        }
        if tile.has_flag(TileFlags::IMMOVABLEBLOCKSOLID) {
            return ReturnValue::NotPossible;
        }
        let pathfinding = flags.contains(CylinderFlags::PATHFINDING);
        if pathfinding && tile.has_flag(TileFlags::IMMOVABLENOFIELDBLOCKPATH) {
            return ReturnValue::NotPossible;
        }
        if (tile.has_flag(TileFlags::BLOCKSOLID)
            || (pathfinding && tile.has_flag(TileFlags::NOFIELDBLOCKPATH)))
            && !(data.can_push_items || flags.contains(CylinderFlags::IGNOREBLOCKITEM))
        {
            return ReturnValue::NotPossible;
        }

        for other in tile.creatures.iter().filter_map(|id| world.creature(*id)) {
            if !other.ghost {
                return ReturnValue::NotEnoughRoom;
            }
            if data.can_push_creatures && !data.summon {
                if other.is_player() {
                    continue;
                }
                let pushable = other.as_monster().map_or(false, |other_data| {
                    other_data.pushable && !(other_data.summon && other_data.master_is_player)
                });
                if !pushable {
                    return ReturnValue::NotPossible;
                }
            }
        }

        let Some(field) = self.field_item(world) else {
            return ReturnValue::NoError;
        };
        let field_type = world.item_type_of(field);
        if field_type.block_solid || field_type.field_damage() == 0 {
            return ReturnValue::NoError;
        }
        let combat = field_type.field_combat();
        if !monster.is_immune(combat) {
            if flags.contains(CylinderFlags::IGNOREFIELDDAMAGE) {
                if !(monster.can_walk_on_field(combat) || data.ignoring_field_damage) {
                    return ReturnValue::NotPossible;
                }
            } else {
                return ReturnValue::NotPossible;
            }
        }
        ReturnValue::NoError
    }

    fn query_add_item(
        &self,
        world: &WorldState,
        tile: &Tile,
        item: ItemId,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue {
        if tile.items.len() >= MAX_TILE_ITEMS {
            return ReturnValue::NotPossible;
        }
        if flags.contains(CylinderFlags::NOLIMIT) {
            return ReturnValue::NoError;
        }
        let Some(entry) = world.item(item) else {
            return ReturnValue::NotPossible;
        };
        if entry.is_store_item() {
            return ReturnValue::ItemCannotBeMovedThere;
        }
        let item_type = world.item_type_of(item);
        let hangable = item_type.hangable;
        if tile.ground.is_none() && !hangable {
            return ReturnValue::NotPossible;
        }

        if let Some(house_id) = tile.house_id {
            if entry.is_store_item() && entry.attributes.wrap_id == 0 {
                return ReturnValue::ItemCannotBeMovedThere;
            }
            if actor.is_some()
                && world.config.only_invited_can_move_house_items
                && !world.is_invited(house_id, actor)
            {
                return ReturnValue::PlayerIsNotInvited;
            }
        }

        let blocking = item_type.block_solid;
        if blocking
            && !flags.contains(CylinderFlags::IGNOREBLOCKCREATURE)
            && tile
                .creatures
                .iter()
                .filter_map(|id| world.creature(*id))
                .any(|creature| !creature.ghost)
        {
            return ReturnValue::NotEnoughRoom;
        }

        if hangable && tile.has_flag(TileFlags::SUPPORTS_HANGABLE) {
            if tile
                .items
                .iter()
                .any(|other| world.item_type_of(*other).hangable)
            {
                return ReturnValue::NeedExchange;
            }
            return ReturnValue::NoError;
        }

        let is_field = item_type.is_magic_field();
        let pickupable = item_type.pickupable;
        for other in tile.ground.iter().chain(tile.items.iter()) {
            let other_type = world.item_type_of(*other);
            if !other_type.block_solid {
                continue;
            }
            if other_type.allow_pickupable && !is_field && !blocking {
                continue;
            }
            if !pickupable {
                return ReturnValue::NotEnoughRoom;
            }
            if !other_type.has_height || other_type.pickupable || other_type.is_bed() {
                return ReturnValue::NotEnoughRoom;
            }
        }
        ReturnValue::NoError
    }

    /// Takes ownership of every item already stored in a freshly set tile.
    pub(crate) fn adopt_items(&self, world: &mut WorldState) {
        for item in self.all_items(world) {
            world.set_item_parent(item, Some(self.this()));
            self.update_house(world, item);
            self.set_tile_flags(world, item);
        }
    }

    fn set_tile_flags(&self, world: &mut WorldState, item: ItemId) {
        let Some(tile) = self.tile(world) else {
            return;
        };
        let mut flags = TileFlags::empty();
        let item_type = world.item_type_of(item);
        if !tile.has_flag(TileFlags::FLOORCHANGE) && !item_type.floor_change.is_empty() {
            flags |= item_type.floor_change;
        }
        let property_flags = [
            (ItemProperty::ImmovableBlockSolid, TileFlags::IMMOVABLEBLOCKSOLID),
            (ItemProperty::BlockPath, TileFlags::BLOCKPATH),
            (ItemProperty::NoFieldBlockPath, TileFlags::NOFIELDBLOCKPATH),
            (ItemProperty::ImmovableNoFieldBlockPath, TileFlags::IMMOVABLENOFIELDBLOCKPATH),
            (ItemProperty::ImmovableBlockPath, TileFlags::IMMOVABLEBLOCKPATH),
            (ItemProperty::BlockSolid, TileFlags::BLOCKSOLID),
            (ItemProperty::SupportHangable, TileFlags::SUPPORTS_HANGABLE),
        ];
        for (property, flag) in property_flags {
            if item_has_property(world, item, property) {
                flags |= flag;
            }
        }
        flags |= special_flags(world, item);
        self.set_flag(world, flags);
    }

    fn reset_tile_flags(&self, world: &mut WorldState, item: ItemId) {
        let mut flags = TileFlags::empty();
        if !world.item_type_of(item).floor_change.is_empty() {
            flags |= TileFlags::FLOORCHANGE;
        }
        let property_flags = [
            (ItemProperty::BlockSolid, TileFlags::BLOCKSOLID),
            (ItemProperty::ImmovableBlockSolid, TileFlags::IMMOVABLEBLOCKSOLID),
            (ItemProperty::BlockPath, TileFlags::BLOCKPATH),
            (ItemProperty::NoFieldBlockPath, TileFlags::NOFIELDBLOCKPATH),
            (ItemProperty::ImmovableBlockPath, TileFlags::IMMOVABLEBLOCKPATH),
            (ItemProperty::ImmovableNoFieldBlockPath, TileFlags::IMMOVABLENOFIELDBLOCKPATH),
        ];
        for (property, flag) in property_flags {
            if item_has_property(world, item, property)
                && !self.has_property_except(world, item, property)
            {
                flags |= flag;
            }
        }
        flags |= special_flags(world, item);
        if item_has_property(world, item, ItemProperty::SupportHangable) {
            flags |= TileFlags::SUPPORTS_HANGABLE;
        }
        self.reset_flag(world, flags);
    }

    /// Doors with a door id and beds on house tiles register with the house.
    fn update_house(&self, world: &mut WorldState, item: ItemId) {
        let Some(house_id) = self.tile(world).and_then(|tile| tile.house_id) else {
            return;
        };
        let (is_door, door_id, is_bed) = match world.item(item) {
            Some(entry) => (
                matches!(entry.variant, ItemVariant::Door { .. }),
                entry.attributes.door_id,
                matches!(entry.variant, ItemVariant::Bed { .. }),
            ),
            None => return,
        };
        if is_door {
            if door_id != 0 {
                world.register_house_door(house_id, item, door_id);
            }
        } else if is_bed {
            world.register_house_bed(house_id, item);
        }
    }

    fn browse_field(&self, world: &WorldState) -> Option<ItemId> {
        world.browse_field_at(self.0)
    }

    /// Browse fields list moveable items and containers, never unique ones.
    pub(crate) fn mirrors_into_browse_field(world: &WorldState, item: ItemId) -> bool {
        let Some(entry) = world.item(item) else {
            return false;
        };
        !entry.has_unique_id()
            && (entry.is_container() || item_has_property(world, item, ItemProperty::Moveable))
    }

    fn on_add_tile_item(&self, world: &mut WorldState, item: ItemId) {
        if Self::mirrors_into_browse_field(world, item) {
            if let Some(field) = self.browse_field(world) {
                crate::world::container::ContainerCylinder(field).mirror_add(world, item);
            }
        }
        self.set_tile_flags(world, item);
        let spectators = world.get_spectators(self.0, true, true, 0, 0, 0, 0);
        world.events.push(WorldEvent::TileItemAdded {
            position: self.0,
            item,
            spectators,
        });
    }

    fn on_update_tile_item(&self, world: &mut WorldState, old: ItemId, new: ItemId) {
        if let Some(field) = self.browse_field(world) {
            let container = crate::world::container::ContainerCylinder(field);
            if Self::mirrors_into_browse_field(world, new) {
                if old != new {
                    container.mirror_replace(world, old, new);
                }
            } else if Self::mirrors_into_browse_field(world, old) || old == new {
                container.mirror_remove(world, old);
            }
        }
        let stack_pos = self.stack_pos_of_item(world, None, new);
        let spectators = world.get_spectators(self.0, true, true, 0, 0, 0, 0);
        world.events.push(WorldEvent::TileItemUpdated {
            position: self.0,
            stack_pos,
            item: new,
            spectators,
        });
    }

    fn on_remove_tile_item(&self, world: &mut WorldState, item: ItemId, stack_pos: i32) {
        if let Some(field) = self.browse_field(world) {
            crate::world::container::ContainerCylinder(field).mirror_remove(world, item);
        }
        self.reset_tile_flags(world, item);
        let spectators = world.get_spectators(self.0, true, true, 0, 0, 0, 0);
        world.events.push(WorldEvent::TileItemRemoved {
            position: self.0,
            stack_pos,
            item,
            spectators,
        });
    }

    fn add_creature(&self, world: &mut WorldState, creature: CreatureId) {
        world.map.spectators.clear_chunks();
        let position = self.0;
        if let Some(entry) = world.creature_mut(creature) {
            entry.position = position;
            entry.placed = true;
        }
        if let Some(tile) = self.tile_mut(world) {
            tile.insert_creature_front(creature);
        }
    }

    fn add_item(&self, world: &mut WorldState, item: ItemId) {
        if self.tile(world).map_or(true, |tile| tile.items.len() >= MAX_TILE_ITEMS) {
            return;
        }
        world.set_item_parent(item, Some(self.this()));
        self.update_house(world, item);

        let item_type = world.item_type_of(item);
        let is_ground = item_type.is_ground_tile();
        let on_top = item_type.always_on_top;
        let top_order = item_type.top_order;
        let is_splash = item_type.is_splash();
        let is_field = item_type.is_magic_field();

        if is_ground {
            let old_ground = self.tile(world).and_then(|tile| tile.ground);
            if let Some(tile) = self.tile_mut(world) {
                tile.ground = Some(item);
            }
            match old_ground {
                None => self.on_add_tile_item(world, item),
                Some(old) => {
                    world.set_item_parent(old, None);
                    self.reset_tile_flags(world, old);
                    self.set_tile_flags(world, item);
                    self.on_update_tile_item(world, old, item);
                    self.post_remove_notification(world, Thing::Item(old), None, 0, CylinderLink::Owner);
                    world.release_item(old);
                }
            }
            return;
        }

        if on_top {
            if is_splash {
                let old_splash = self.tile(world).and_then(|tile| {
                    tile.top_items()
                        .iter()
                        .copied()
                        .find(|other| world.item_type_of(*other).is_splash())
                });
                if let Some(old) = old_splash {
                    self.remove_thing(world, Thing::Item(old), 1);
                    self.post_remove_notification(world, Thing::Item(old), None, 0, CylinderLink::Owner);
                    world.release_item(old);
                }
            }
            let offset = self.tile(world).and_then(|tile| {
                tile.top_items()
                    .iter()
                    .position(|other| top_order <= world.item_type_of(*other).top_order)
            });
            if let Some(tile) = self.tile_mut(world) {
                let offset = offset.unwrap_or(tile.top_items().len());
                tile.insert_top_at(offset, item);
            }
            self.on_add_tile_item(world, item);
            return;
        }

        if is_field {
            let old_field = self.tile(world).and_then(|tile| {
                tile.down_items()
                    .iter()
                    .copied()
                    .find(|other| world.item_type_of(*other).is_magic_field())
            });
            if let Some(old) = old_field {
                let replaceable = world
                    .item_type_of(old)
                    .field
                    .as_ref()
                    .map_or(false, |field| field.replaceable);
                if !replaceable {
                    world.set_item_parent(item, None);
                    return;
                }
                self.remove_thing(world, Thing::Item(old), 1);
                self.post_remove_notification(world, Thing::Item(old), None, 0, CylinderLink::Owner);
                world.release_item(old);
            }
        }

        if let Some(tile) = self.tile_mut(world) {
            tile.insert_down_front(item);
        }
        self.on_add_tile_item(world, item);
    }
}

fn has_variant(world: &WorldState, item: ItemId, test: impl Fn(&ItemVariant) -> bool) -> bool {
    world.item(item).map_or(false, |entry| test(&entry.variant))
}

fn special_flags(world: &WorldState, item: ItemId) -> TileFlags {
    let mut flags = TileFlags::empty();
    if world.item_type_of(item).is_magic_field() {
        flags |= TileFlags::MAGICFIELD;
    }
    let Some(entry) = world.item(item) else {
        return flags;
    };
    match &entry.variant {
        ItemVariant::Teleport { .. } => flags |= TileFlags::TELEPORT,
        ItemVariant::Mailbox => flags |= TileFlags::MAILBOX,
        ItemVariant::TrashHolder => flags |= TileFlags::TRASHHOLDER,
        ItemVariant::Bed { .. } => flags |= TileFlags::BED,
        ItemVariant::Container(data)
            if data.kind == crate::entities::item::ContainerKind::DepotLocker =>
        {
            flags |= TileFlags::DEPOT
        }
        _ => {}
    }
    flags
}

fn can_see(world: &WorldState, viewer: Option<&Creature>, creature: CreatureId) -> bool {
    match (viewer, world.creature(creature)) {
        (Some(viewer), Some(other)) => viewer.can_see(other),
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

fn query_add_npc(tile: &Tile, npc: &Creature, flags: CylinderFlags) -> ReturnValue {
    if npc.npc.as_ref().map_or(false, |data| data.phaseable) {
        return ReturnValue::NoError;
    }
    if !tile.creatures.is_empty() && !flags.contains(CylinderFlags::IGNOREBLOCKCREATURE) {
        return ReturnValue::NotEnoughRoom;
    }
    ReturnValue::NoError
}

fn existing_tile(world: &WorldState, x: i32, y: i32, z: i32) -> Option<Position> {
    let x = u16::try_from(x).ok()?;
    let y = u16::try_from(y).ok()?;
    let z = u8::try_from(z).ok()?;
    let position = Position::new(x, y, z);
    world.map.tile(position).map(|_| position)
}

impl Cylinder for TileCylinder {
    fn query_add(
        &self,
        world: &WorldState,
        _index: i32,
        thing: Thing,
        _count: u32,
        flags: CylinderFlags,
        actor: Option<CreatureId>,
    ) -> ReturnValue {
        let Some(tile) = self.tile(world) else {
            return ReturnValue::NotPossible;
        };
        match thing {
            Thing::Creature(id) => {
                let Some(creature) = world.creature(id) else {
                    return ReturnValue::NotPossible;
                };
                if tile.is_house_tile() && !creature.is_player() {
                    return ReturnValue::NotPossible;
                }
                self.query_add_creature(world, tile, creature, flags)
            }
            Thing::Item(item) => self.query_add_item(world, tile, item, flags, actor),
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
        if actor.is_some() && world.config.only_invited_can_move_house_items {
            if let Some(house_id) = self.tile(world).and_then(|tile| tile.house_id) {
                if !world.is_invited(house_id, actor) {
                    return ReturnValue::PlayerIsNotInvited;
                }
            }
        }
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
        *dest_item = None;
        let Some(tile) = self.tile(world) else {
            return self.this();
        };

        if let Some(player) = thing
            .creature()
            .and_then(|id| world.creature(id))
            .filter(|creature| creature.is_player())
        {
            if let Some(house_id) = tile.house_id {
                if !world.is_invited(house_id, Some(player.id)) {
                    *index = -1;
                    let entry = world
                        .houses
                        .get(house_id)
                        .map(|house| house.entry)
                        .filter(|entry| world.map.tile(*entry).is_some());
                    let temple = world
                        .temple_position(player.id)
                        .filter(|temple| world.map.tile(*temple).is_some());
                    return match entry.or(temple) {
                        Some(position) => CylinderId::Tile(position),
                        None => CylinderId::Virtual,
                    };
                }
            }
        }

        let (x, y, z) = (i32::from(self.0.x), i32::from(self.0.y), i32::from(self.0.z));
        let mut destination = None;
        if tile.has_flag(TileFlags::FLOORCHANGE_DOWN) {
            let (mut dx, mut dy, dz) = (x, y, z + 1);
            let south_alt = world
                .map
                .tile_at(dx, dy - 1, dz)
                .map_or(false, |down| down.has_flag(TileFlags::FLOORCHANGE_SOUTH_ALT));
            let east_alt = world
                .map
                .tile_at(dx - 1, dy, dz)
                .map_or(false, |down| down.has_flag(TileFlags::FLOORCHANGE_EAST_ALT));
            if south_alt {
                dy -= 2;
                destination = existing_tile(world, dx, dy, dz);
            } else if east_alt {
                dx -= 2;
                destination = existing_tile(world, dx, dy, dz);
            } else if let Some(down) = world.map.tile_at(dx, dy, dz) {
                if down.has_flag(TileFlags::FLOORCHANGE_NORTH) {
                    dy += 1;
                }
                if down.has_flag(TileFlags::FLOORCHANGE_SOUTH) {
                    dy -= 1;
                }
                if down.has_flag(TileFlags::FLOORCHANGE_SOUTH_ALT) {
                    dy -= 2;
                }
                if down.has_flag(TileFlags::FLOORCHANGE_EAST) {
                    dx -= 1;
                }
                if down.has_flag(TileFlags::FLOORCHANGE_EAST_ALT) {
                    dx -= 2;
                }
                if down.has_flag(TileFlags::FLOORCHANGE_WEST) {
                    dx += 1;
                }
                destination = existing_tile(world, dx, dy, dz);
            }
        } else if tile.has_flag(TileFlags::FLOORCHANGE) {
            let (mut dx, mut dy, dz) = (x, y, z - 1);
            if tile.has_flag(TileFlags::FLOORCHANGE_NORTH) {
                dy -= 1;
            }
            if tile.has_flag(TileFlags::FLOORCHANGE_SOUTH) {
                dy += 1;
            }
            if tile.has_flag(TileFlags::FLOORCHANGE_EAST) {
                dx += 1;
            }
            if tile.has_flag(TileFlags::FLOORCHANGE_WEST) {
                dx -= 1;
            }
            if tile.has_flag(TileFlags::FLOORCHANGE_SOUTH_ALT) {
                dy += 2;
            }
            if tile.has_flag(TileFlags::FLOORCHANGE_EAST_ALT) {
                dx += 2;
            }
            destination = existing_tile(world, dx, dy, dz);
        }

        let destination = match destination {
            Some(position) => {
                *flags |= CylinderFlags::NOLIMIT;
                position
            }
            None => self.0,
        };
        *dest_item = world.map.tile(destination).and_then(Tile::top_down_item);
        CylinderId::Tile(destination)
    }

    fn add_thing(&self, world: &mut WorldState, _index: i32, thing: Thing) {
        match thing {
            Thing::Creature(creature) => self.add_creature(world, creature),
            Thing::Item(item) => self.add_item(world, item),
        }
    }

    fn update_thing(&self, world: &mut WorldState, thing: Thing, type_id: ItemTypeId, count: u32) {
        if self.thing_index(world, thing) == -1 {
            return;
        }
        let Some(item) = thing.item() else {
            return;
        };
        self.reset_tile_flags(world, item);
        world.set_item_type(item, type_id, count);
        self.set_tile_flags(world, item);
        self.on_update_tile_item(world, item, item);
    }

    fn replace_thing(&self, world: &mut WorldState, index: u32, thing: Thing) {
        let Some(item) = thing.item() else {
            return;
        };
        let Some(tile) = self.tile_mut(world) else {
            return;
        };
        let mut pos = index as usize;
        let mut old = None;
        if let Some(ground) = tile.ground {
            if pos == 0 {
                old = Some(ground);
                tile.ground = Some(item);
            } else {
                pos -= 1;
            }
        }
        if old.is_none() {
            let top_count = tile.top_items().len();
            if pos < top_count {
                let slot = tile.down_count + pos;
                old = Some(std::mem::replace(&mut tile.items[slot], item));
            } else {
                pos -= top_count;
                if pos < tile.creatures.len() {
                    return;
                }
                pos -= tile.creatures.len();
                if pos < tile.down_count {
                    old = Some(std::mem::replace(&mut tile.items[pos], item));
                }
            }
        }

        let Some(old) = old else {
            return;
        };
        world.set_item_parent(item, Some(self.this()));
        self.reset_tile_flags(world, old);
        self.set_tile_flags(world, item);
        self.on_update_tile_item(world, old, item);
        world.set_item_parent(old, None);
    }

    fn remove_thing(&self, world: &mut WorldState, thing: Thing, count: u32) {
        let item = match thing {
            Thing::Creature(creature) => {
                let removed = self
                    .tile_mut(world)
                    .map_or(false, |tile| tile.remove_creature_entry(creature));
                if removed {
                    world.map.spectators.clear_chunks();
                }
                return;
            }
            Thing::Item(item) => item,
        };
        if self.thing_index(world, thing) == -1 {
            return;
        }

        if self.tile(world).and_then(|tile| tile.ground) == Some(item) {
            world.set_item_parent(item, None);
            if let Some(tile) = self.tile_mut(world) {
                tile.ground = None;
            }
            self.on_remove_tile_item(world, item, 0);
            return;
        }

        let item_type = world.item_type_of(item);
        let stackable = item_type.stackable;
        if !item_type.always_on_top && stackable {
            let current = world.item(item).map_or(0, |entry| u32::from(entry.count));
            if count != current {
                if let Some(entry) = world.item_mut(item) {
                    entry.count = current.saturating_sub(count) as u16;
                }
                self.on_update_tile_item(world, item, item);
                return;
            }
        }

        let stack_pos = self.stack_pos_of_item(world, None, item);
        world.set_item_parent(item, None);
        if let Some(tile) = self.tile_mut(world) {
            tile.remove_item_entry(item);
        }
        self.on_remove_tile_item(world, item, stack_pos);
    }

    fn post_add_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        _old_parent: Option<CylinderId>,
        _index: i32,
        link: CylinderLink,
    ) {
        let cylinder = self.this();
        for observer in world.get_spectators(self.0, true, true, 0, 0, 0, 0) {
            world.events.push(WorldEvent::ThingAdded {
                observer,
                cylinder,
                thing,
                link: CylinderLink::Near,
            });
        }

        if link != CylinderLink::Owner {
            return;
        }
        if self.has_flag(world, TileFlags::TELEPORT) {
            if let Some(teleport) = self.teleport_item(world) {
                TeleportCylinder(teleport).add_thing(world, 0, thing);
            }
        } else if self.has_flag(world, TileFlags::TRASHHOLDER) {
            if let Some(trash) = self.trash_holder(world) {
                TrashHolderCylinder(trash).add_thing(world, 0, thing);
            }
        } else if self.has_flag(world, TileFlags::MAILBOX) {
            if let Some(mailbox) = self.mailbox(world) {
                MailboxCylinder(mailbox).add_thing(world, 0, thing);
            }
        }
    }

    fn post_remove_notification(
        &self,
        world: &mut WorldState,
        thing: Thing,
        _new_parent: Option<CylinderId>,
        _index: i32,
        _link: CylinderLink,
    ) {
        let spectators = world.get_spectators(self.0, true, true, 0, 0, 0, 0);
        if self.tile(world).map_or(0, Tile::thing_count) > TILE_REFRESH_THRESHOLD {
            world.events.push(WorldEvent::TileRefreshed {
                position: self.0,
                spectators: spectators.clone(),
            });
        }
        let cylinder = self.this();
        for observer in spectators {
            world.events.push(WorldEvent::ThingRemoved {
                observer,
                cylinder,
                thing,
                link: CylinderLink::Near,
            });
        }
    }

    fn thing_index(&self, world: &WorldState, thing: Thing) -> i32 {
        let Some(tile) = self.tile(world) else {
            return -1;
        };
        let mut n = -1;
        if let Some(ground) = tile.ground {
            if thing == Thing::Item(ground) {
                return 0;
            }
            n += 1;
        }

        let item = thing.item();
        let on_top = item.map_or(false, |id| world.item_type_of(id).always_on_top);
        if on_top {
            for entry in tile.top_items() {
                n += 1;
                if Some(*entry) == item {
                    return n;
                }
            }
        } else {
            n += tile.top_items().len() as i32;
        }

        match thing {
            Thing::Creature(creature) => {
                for entry in &tile.creatures {
                    n += 1;
                    if *entry == creature {
                        return n;
                    }
                }
            }
            Thing::Item(_) => n += tile.creatures.len() as i32,
        }

        if let (Some(item), false) = (item, on_top) {
            for entry in tile.down_items() {
                n += 1;
                if *entry == item {
                    return n;
                }
            }
        }
        -1
    }

    fn last_index(&self, world: &WorldState) -> usize {
        self.tile(world).map_or(0, Tile::thing_count)
    }

    fn thing_at(&self, world: &WorldState, index: usize) -> Option<Thing> {
        let tile = self.tile(world)?;
        let mut index = index;
        if let Some(ground) = tile.ground {
            if index == 0 {
                return Some(Thing::Item(ground));
            }
            index -= 1;
        }
        let top = tile.top_items();
        if index < top.len() {
            return Some(Thing::Item(top[index]));
        }
        index -= top.len();
        if index < tile.creatures.len() {
            return Some(Thing::Creature(tile.creatures[index]));
        }
        index -= tile.creatures.len();
        tile.down_items().get(index).copied().map(Thing::Item)
    }

    fn item_type_count(&self, world: &WorldState, type_id: ItemTypeId, sub_type: i32) -> u32 {
        self.all_items(world)
            .into_iter()
            .map(|item| world.count_by_type(item, type_id, sub_type))
            .sum()
    }

    fn internal_add_thing(&self, world: &mut WorldState, _index: u32, thing: Thing) {
        let item = match thing {
            Thing::Creature(creature) => {
                self.add_creature(world, creature);
                return;
            }
            Thing::Item(item) => item,
        };
        world.set_item_parent(item, Some(self.this()));
        self.update_house(world, item);

        let item_type = world.item_type_of(item);
        let is_ground = item_type.is_ground_tile();
        let on_top = item_type.always_on_top;
        let top_order = item_type.top_order;
        if is_ground {
            let placed = match self.tile_mut(world) {
                Some(tile) if tile.ground.is_none() => {
                    tile.ground = Some(item);
                    true
                }
                _ => false,
            };
            if placed {
                self.set_tile_flags(world, item);
            }
            return;
        }

        if self.tile(world).map_or(true, |tile| tile.items.len() >= MAX_TILE_ITEMS) {
            return;
        }
        if on_top {
            let offset = self.tile(world).and_then(|tile| {
                tile.top_items()
                    .iter()
                    .position(|other| world.item_type_of(*other).top_order > top_order)
            });
            if let Some(tile) = self.tile_mut(world) {
                let offset = offset.unwrap_or(tile.top_items().len());
                tile.insert_top_at(offset, item);
            }
        } else if let Some(tile) = self.tile_mut(world) {
            tile.insert_down_front(item);
        }
        self.set_tile_flags(world, item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::test_support::{
        fixture, spawn_monster, spawn_player, BLOOD, BORDER, COIN, FIRE_FIELD, GRASS, STAIRS,
        SWORD, WALL,
    };

    fn add(world: &mut WorldState, position: Position, item: ItemId) {
        TileCylinder(position).add_thing(world, 0, Thing::Item(item));
    }

    #[test]
    fn items_keep_ground_top_creature_down_order() {
        let mut world = fixture();
        let position = Position::new(100, 100, 7);
        let cylinder = TileCylinder(position);
        let border = world.create_item(BORDER, 1);
        let sword = world.create_item(SWORD, 1);
        let coins = world.create_item(COIN, 5);
        add(&mut world, position, border);
        add(&mut world, position, sword);
        add(&mut world, position, coins);
        let player = spawn_player(&mut world, "Ana", (100, 100, 7));

        let tile = cylinder.tile(&world).expect("tile");
        assert_eq!(tile.top_items(), &[border]);
        assert_eq!(tile.down_items(), &[coins, sword]);
        assert_eq!(tile.top_down_item(), Some(coins));

        assert_eq!(cylinder.thing_index(&world, Thing::Item(border)), 1);
        assert_eq!(cylinder.thing_index(&world, Thing::Creature(player)), 2);
        assert_eq!(cylinder.thing_index(&world, Thing::Item(coins)), 3);
        assert_eq!(cylinder.thing_at(&world, 4), Some(Thing::Item(sword)));
        assert_eq!(cylinder.last_index(&world), 5);
        assert_eq!(cylinder.stack_pos_of_item(&world, Some(player), sword), 4);
    }

    #[test]
    fn blocking_items_set_and_reset_flags() {
        let mut world = fixture();
        let position = Position::new(100, 100, 7);
        let cylinder = TileCylinder(position);
        let first = world.create_item(WALL, 1);
        let second = world.create_item(WALL, 1);
        add(&mut world, position, first);
        add(&mut world, position, second);
        assert!(cylinder.has_flag(&world, TileFlags::BLOCKSOLID | TileFlags::IMMOVABLEBLOCKSOLID));

        cylinder.remove_thing(&mut world, Thing::Item(first), 1);
        assert!(cylinder.has_flag(&world, TileFlags::BLOCKSOLID));
        cylinder.remove_thing(&mut world, Thing::Item(second), 1);
        assert!(!cylinder.has_flag(&world, TileFlags::BLOCKSOLID));
        assert!(!cylinder.has_flag(&world, TileFlags::IMMOVABLEBLOCKSOLID));
    }

    #[test]
    fn new_splash_replaces_the_old_one() {
        let mut world = fixture();
        let position = Position::new(100, 100, 7);
        let first = world.create_item(BLOOD, 1);
        let second = world.create_item(BLOOD, 1);
        add(&mut world, position, first);
        add(&mut world, position, second);
        let tile = TileCylinder(position).tile(&world).expect("tile");
        assert_eq!(tile.top_items(), &[second]);
        assert!(world.item(first).is_none());
    }

    #[test]
    fn walls_refuse_creatures_and_items() {
        let mut world = fixture();
        let position = Position::new(100, 100, 7);
        let wall = world.create_item(WALL, 1);
        add(&mut world, position, wall);
        let player = spawn_player(&mut world, "Ana", (101, 100, 7));
        let sword = world.create_item(SWORD, 1);
        let cylinder = TileCylinder(position);

        assert_eq!(
            cylinder.query_add(&world, 0, Thing::Creature(player), 1, CylinderFlags::empty(), None),
            ReturnValue::NotEnoughRoom
        );
        assert_eq!(
            cylinder.query_add(&world, 0, Thing::Item(sword), 1, CylinderFlags::empty(), None),
            ReturnValue::NotEnoughRoom
        );
    }

    #[test]
    fn monsters_avoid_fields_they_are_not_immune_to() {
        let mut world = fixture();
        let position = Position::new(100, 100, 7);
        let field = world.create_item(FIRE_FIELD, 1);
        add(&mut world, position, field);
        let rat = spawn_monster(&mut world, "rat", (101, 100, 7));
        let cylinder = TileCylinder(position);
        assert_eq!(
            cylinder.query_add(&world, 0, Thing::Creature(rat), 1, CylinderFlags::empty(), None),
            ReturnValue::NotPossible
        );
        if let Some(monster) = world.creature_mut(rat).and_then(|c| c.monster.as_mut()) {
            monster.immunities = crate::entities::creature::CombatTypes::FIRE;
        }
        assert!(cylinder
            .query_add(&world, 0, Thing::Creature(rat), 1, CylinderFlags::empty(), None)
            .is_ok());
    }

    #[test]
    fn stairs_lead_one_floor_up() {
        let mut world = fixture();
        let stairs_at = Position::new(100, 100, 7);
        let stairs = world.create_item(STAIRS, 1);
        add(&mut world, stairs_at, stairs);
        let above = Position::new(100, 99, 6);
        let ground = world.create_item(GRASS, 1);
        world.map.ensure_tile(above);
        add(&mut world, above, ground);

        let mut index = 0;
        let mut dest = None;
        let mut flags = CylinderFlags::empty();
        let sword = world.create_item(SWORD, 1);
        let target = TileCylinder(stairs_at).query_destination(
            &world,
            &mut index,
            Thing::Item(sword),
            &mut dest,
            &mut flags,
        );
        assert_eq!(target, CylinderId::Tile(above));
        assert!(flags.contains(CylinderFlags::NOLIMIT));
    }
}
