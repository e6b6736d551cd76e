use crate::config::EngineConfig;
use crate::entities::creature::{Creature, CreatureId, CreatureKind, MonsterData, NpcData, PlayerData};
use crate::entities::item::{
    ContainerData, ContainerKind, Item, ItemId, ItemTypeId, ItemVariant, MAX_STACK,
};
use crate::world::cylinder::CylinderId;
use crate::world::events::EventQueue;
use crate::world::housing::Houses;
use crate::world::item_types::{ItemGroup, ItemType, ItemTypeIndex};
use crate::world::map::Map;
use crate::world::position::Position;
use crate::world::tile::Tile;
use crate::world::towns::Towns;
use crate::world::zones::Zones;
use std::collections::HashMap;

/// Creature ids start high so they never collide with small test ids.
const FIRST_CREATURE_ID: u32 = 0x1000_0000;

#[derive(Debug)]
pub struct WorldState {
    pub config: EngineConfig,
    pub map: Map,
    pub item_types: ItemTypeIndex,
    pub houses: Houses,
    pub towns: Towns,
    pub zones: Zones,
    pub events: EventQueue,
    pub(crate) items: HashMap<ItemId, Item>,
    pub(crate) creatures: HashMap<CreatureId, Creature>,
    pub(crate) browse_fields: HashMap<Position, ItemId>,
    next_item_id: u32,
    next_creature_id: u32,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl WorldState {
    pub fn new(config: EngineConfig) -> Self {
        let map = Map::new(&config);
        Self {
            config,
            map,
            item_types: ItemTypeIndex::default(),
            houses: Houses::default(),
            towns: Towns::default(),
            zones: Zones::default(),
            events: EventQueue::default(),
            items: HashMap::new(),
            creatures: HashMap::new(),
            browse_fields: HashMap::new(),
            next_item_id: 1,
            next_creature_id: FIRST_CREATURE_ID,
        }
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn creature(&self, id: CreatureId) -> Option<&Creature> {
        self.creatures.get(&id)
    }

    pub fn creature_mut(&mut self, id: CreatureId) -> Option<&mut Creature> {
        self.creatures.get_mut(&id)
    }

    pub fn creature_count(&self) -> usize {
        self.creatures.len()
    }

    /// Type of an item; unknown items and unknown ids give the inert default.
    pub fn item_type_of(&self, item: ItemId) -> &ItemType {
        let type_id = self.items.get(&item).map_or(ItemTypeId(0), |entry| entry.type_id);
        self.item_types.get_or_default(type_id)
    }

    /// Stacks weigh per piece, containers add what they hold.
    pub fn item_weight(&self, item: ItemId) -> u32 {
        let Some(entry) = self.items.get(&item) else {
            return 0;
        };
        let item_type = self.item_types.get_or_default(entry.type_id);
        let mut weight = item_type.weight;
        if item_type.stackable {
            weight = weight.saturating_mul(u32::from(entry.count.max(1)));
        }
        if let Some(data) = entry.container() {
            weight = weight.saturating_add(data.total_weight);
        }
        weight
    }

    /// Number of `type_id` pieces in `item`, `sub_type` -1 matching any.
    pub fn count_by_type(&self, item: ItemId, type_id: ItemTypeId, sub_type: i32) -> u32 {
        match self.items.get(&item) {
            Some(entry) if entry.type_id == type_id => {
                let stackable = self.item_types.get_or_default(type_id).stackable;
                entry.count_by_type(stackable, sub_type)
            }
            _ => 0,
        }
    }

    /// Creates a detached item whose variant follows the item group.
    pub fn create_item(&mut self, type_id: ItemTypeId, count: u16) -> ItemId {
        let item_type = self.item_types.get_or_default(type_id);
        let variant = match item_type.group {
            ItemGroup::Container => ItemVariant::Container(ContainerData::new(u32::from(item_type.capacity))),
            ItemGroup::DepotLocker => ItemVariant::Container(ContainerData::with_kind(
                ContainerKind::DepotLocker,
                u32::from(item_type.capacity),
            )),
            ItemGroup::Mailbox => ItemVariant::Mailbox,
            ItemGroup::TrashHolder => ItemVariant::TrashHolder,
            ItemGroup::Teleport => ItemVariant::Teleport {
                destination: Position::new(0, 0, 0),
            },
            ItemGroup::Door => ItemVariant::Door { house_id: None },
            ItemGroup::Bed => ItemVariant::Bed { house_id: None },
            _ => ItemVariant::Plain,
        };
        let count = if item_type.stackable { count.min(MAX_STACK) } else { 1 };
        let id = self.allocate_item_id();
        self.items.insert(id, Item::new(id, type_id, count, variant));
        id
    }

    fn allocate_item_id(&mut self) -> ItemId {
        let id = ItemId(self.next_item_id);
        self.next_item_id += 1;
        id
    }

    /// Creates a detached container of a special kind, whatever the type's group.
    pub fn create_container(&mut self, type_id: ItemTypeId, kind: ContainerKind, capacity: u32) -> ItemId {
        let id = self.allocate_item_id();
        let variant = ItemVariant::Container(ContainerData::with_kind(kind, capacity));
        self.items.insert(id, Item::new(id, type_id, 1, variant));
        id
    }

    /// Drops an item and everything it holds from the arena. The caller has
    /// already taken it out of its parent.
    pub fn release_item(&mut self, item: ItemId) {
        let mut pending = vec![item];
        while let Some(id) = pending.pop() {
            let Some(entry) = self.items.remove(&id) else {
                continue;
            };
            if let ItemVariant::Container(data) = entry.variant {
                if data.kind == ContainerKind::BrowseField {
                    // Listed items belong to the tile, not to the field.
                    if let Some(position) = entry.parent.and_then(CylinderId::as_tile) {
                        if self.browse_fields.get(&position) == Some(&id) {
                            self.browse_fields.remove(&position);
                        }
                    }
                    continue;
                }
                pending.extend(data.items);
            }
        }
    }

    pub fn set_item_parent(&mut self, item: ItemId, parent: Option<CylinderId>) {
        if let Some(entry) = self.items.get_mut(&item) {
            entry.parent = parent;
        }
    }

    /// Changes the type in place. Stackables take `count` as their amount,
    /// charged items as their charges.
    pub fn set_item_type(&mut self, item: ItemId, type_id: ItemTypeId, count: u32) {
        let stackable = self.item_types.get_or_default(type_id).stackable;
        let Some(entry) = self.items.get_mut(&item) else {
            return;
        };
        entry.type_id = type_id;
        if stackable {
            entry.count = count.clamp(1, u32::from(MAX_STACK)) as u16;
        } else if entry.attributes.charges != 0 {
            entry.attributes.charges = count.min(u32::from(u16::MAX)) as u16;
        }
    }

    /// Logical parent. Depot chests and inboxes sit inside a locker but
    /// report the locker's parent.
    pub fn parent_of(&self, cylinder: CylinderId) -> Option<CylinderId> {
        match cylinder {
            CylinderId::Tile(_) | CylinderId::Virtual => None,
            CylinderId::Creature(id) => self
                .creatures
                .get(&id)
                .filter(|creature| creature.placed)
                .map(|creature| CylinderId::Tile(creature.position)),
            CylinderId::Item(id) => {
                let entry = self.items.get(&id)?;
                let parent = entry.parent?;
                match entry.container_kind() {
                    Some(ContainerKind::DepotChest | ContainerKind::Inbox) => match parent {
                        CylinderId::Item(locker) => self.items.get(&locker).and_then(|locker| locker.parent),
                        other => Some(other),
                    },
                    _ => Some(parent),
                }
            }
        }
    }

    /// The ancestor just below the root: an item lying on a tile is its own
    /// top parent, an item in a carried bag has the player.
    pub fn top_parent(&self, cylinder: CylinderId) -> CylinderId {
        let Some(mut parent) = self.parent_of(cylinder) else {
            return cylinder;
        };
        let mut current = cylinder;
        while let Some(next) = self.parent_of(parent) {
            current = parent;
            parent = next;
        }
        current
    }

    /// Map position of a cylinder, walking up through its parents.
    pub fn cylinder_position(&self, cylinder: CylinderId) -> Option<Position> {
        let mut current = cylinder;
        for _ in 0..64 {
            match current {
                CylinderId::Tile(position) => return Some(position),
                CylinderId::Virtual => return None,
                CylinderId::Creature(id) => {
                    return self
                        .creatures
                        .get(&id)
                        .filter(|creature| creature.placed)
                        .map(|creature| creature.position)
                }
                CylinderId::Item(_) => current = self.parent_of(current)?,
            }
        }
        None
    }

    pub fn tile_of(&self, cylinder: CylinderId) -> Option<&Tile> {
        self.cylinder_position(self.top_parent(cylinder))
            .and_then(|position| self.map.tile(position))
    }

    pub fn browse_field_at(&self, position: Position) -> Option<ItemId> {
        self.browse_fields.get(&position).copied()
    }

    fn add_creature(&mut self, build: impl FnOnce(CreatureId) -> Creature) -> CreatureId {
        let id = CreatureId(self.next_creature_id);
        self.next_creature_id += 1;
        self.creatures.insert(id, build(id));
        id
    }

    /// Registers a player off the map; `place_creature` puts it down.
    pub fn add_player(&mut self, name: &str, data: PlayerData) -> CreatureId {
        self.add_creature(|id| Creature::new_player(id, name, data))
    }

    pub fn add_monster(&mut self, name: &str, data: MonsterData) -> CreatureId {
        self.add_creature(|id| Creature::new_monster(id, name, data))
    }

    pub fn add_npc(&mut self, name: &str, data: NpcData) -> CreatureId {
        self.add_creature(|id| Creature::new_npc(id, name, data))
    }

    /// Takes a creature off the map and out of the world. A player's carried
    /// items, depots and inboxes go with it.
    pub fn release_creature(&mut self, creature: CreatureId) -> Option<Creature> {
        self.remove_creature(creature);
        let entry = self.creatures.remove(&creature)?;
        if let Some(player) = entry.as_player() {
            let owned = player
                .inventory
                .iter()
                .flatten()
                .copied()
                .chain(player.inbox)
                .chain(player.store_inbox)
                .chain(player.depot_chests.values().copied())
                .chain(player.depot_lockers.values().copied());
            let owned: Vec<ItemId> = owned.collect();
            for item in owned {
                self.release_item(item);
            }
        }
        log::debug!("creature {} ({}) released", entry.name, creature.0);
        Some(entry)
    }

    /// Online player by name, ignoring case.
    pub fn player_by_name(&self, name: &str) -> Option<CreatureId> {
        self.creatures
            .values()
            .filter(|creature| creature.kind == CreatureKind::Player)
            .find(|creature| creature.name.eq_ignore_ascii_case(name))
            .map(|creature| creature.id)
    }

    pub fn player_by_guid(&self, guid: u32) -> Option<CreatureId> {
        if guid == 0 {
            return None;
        }
        self.creatures
            .values()
            .find(|creature| creature.as_player().map_or(false, |data| data.guid == guid))
            .map(|creature| creature.id)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::entities::creature::CombatTypes;
    use crate::entities::inventory::SlotPositions;
    use crate::world::item_types::{
        FieldInfo, WeaponType, ITEM_BROWSEFIELD, ITEM_DEPOT, ITEM_INBOX, ITEM_LABEL, ITEM_LETTER,
        ITEM_LOCKER, ITEM_PARCEL, ITEM_STORE_INBOX,
    };
    use crate::world::tile::TileFlags;
    use crate::world::towns::Town;

    pub const GRASS: ItemTypeId = ItemTypeId(4526);
    pub const BORDER: ItemTypeId = ItemTypeId(4608);
    pub const WALL: ItemTypeId = ItemTypeId(1026);
    pub const STAIRS: ItemTypeId = ItemTypeId(1385);
    pub const BLOOD: ItemTypeId = ItemTypeId(2016);
    pub const FIRE_FIELD: ItemTypeId = ItemTypeId(1492);
    pub const COIN: ItemTypeId = ItemTypeId(2148);
    pub const BAG: ItemTypeId = ItemTypeId(1987);
    pub const BACKPACK: ItemTypeId = ItemTypeId(1988);
    pub const QUIVER: ItemTypeId = ItemTypeId(35562);
    pub const ARROW: ItemTypeId = ItemTypeId(2544);
    pub const SWORD: ItemTypeId = ItemTypeId(2376);
    pub const TWO_HANDED_SWORD: ItemTypeId = ItemTypeId(2377);
    pub const SHIELD: ItemTypeId = ItemTypeId(2509);
    pub const BED: ItemTypeId = ItemTypeId(1754);
    pub const DOOR: ItemTypeId = ItemTypeId(1209);
    pub const TRASH: ItemTypeId = ItemTypeId(1777);
    pub const TELEPORT: ItemTypeId = ItemTypeId(1387);
    pub const MAILBOX: ItemTypeId = ItemTypeId(2593);
    pub const STAMPED_PARCEL: ItemTypeId = ItemTypeId(2596);
    pub const STAMPED_LETTER: ItemTypeId = ItemTypeId(2598);

    pub const TEMPLE: Position = Position::new(95, 95, 7);

    fn kind(id: ItemTypeId, name: &str) -> ItemType {
        ItemType {
            id,
            name: name.to_string(),
            ..ItemType::default()
        }
    }

    fn fixed(id: ItemTypeId, name: &str, group: ItemGroup) -> ItemType {
        ItemType {
            group,
            moveable: false,
            ..kind(id, name)
        }
    }

    fn carried(id: ItemTypeId, name: &str, weight: u32, slots: SlotPositions) -> ItemType {
        ItemType {
            weight,
            pickupable: true,
            slot_position: slots,
            ..kind(id, name)
        }
    }

    fn bag(id: ItemTypeId, name: &str, capacity: u16, slots: SlotPositions) -> ItemType {
        ItemType {
            group: ItemGroup::Container,
            capacity,
            ..carried(id, name, 1800, slots)
        }
    }

    pub fn item_types() -> ItemTypeIndex {
        let types = vec![
            fixed(GRASS, "grass", ItemGroup::Ground),
            ItemType {
                always_on_top: true,
                top_order: 1,
                ..fixed(BORDER, "grass border", ItemGroup::Normal)
            },
            ItemType {
                block_solid: true,
                block_projectile: true,
                block_path_find: true,
                ..fixed(WALL, "stone wall", ItemGroup::Normal)
            },
            ItemType {
                always_on_top: true,
                top_order: 2,
                floor_change: TileFlags::FLOORCHANGE_NORTH,
                ..fixed(STAIRS, "stairs", ItemGroup::Normal)
            },
            ItemType {
                always_on_top: true,
                top_order: 3,
                ..fixed(BLOOD, "blood", ItemGroup::Splash)
            },
            ItemType {
                field: Some(FieldInfo {
                    combat_type: CombatTypes::FIRE,
                    damage: 20,
                    replaceable: true,
                }),
                ..fixed(FIRE_FIELD, "fire field", ItemGroup::MagicField)
            },
            ItemType {
                stackable: true,
                ..carried(COIN, "gold coin", 10, SlotPositions::AMMO)
            },
            bag(BAG, "bag", 8, SlotPositions::BACKPACK),
            bag(BACKPACK, "backpack", 20, SlotPositions::BACKPACK),
            ItemType {
                weapon_type: WeaponType::Quiver,
                ..bag(QUIVER, "quiver", 10, SlotPositions::RIGHT)
            },
            ItemType {
                stackable: true,
                weapon_type: WeaponType::Ammo,
                ..carried(ARROW, "arrow", 70, SlotPositions::AMMO)
            },
            ItemType {
                weapon_type: WeaponType::Sword,
                ..carried(SWORD, "sword", 3500, SlotPositions::HAND)
            },
            ItemType {
                weapon_type: WeaponType::Sword,
                ..carried(
                    TWO_HANDED_SWORD,
                    "two handed sword",
                    7000,
                    SlotPositions::HAND | SlotPositions::TWO_HAND,
                )
            },
            ItemType {
                weapon_type: WeaponType::Shield,
                ..carried(SHIELD, "steel shield", 6900, SlotPositions::HAND)
            },
            fixed(BED, "bed", ItemGroup::Bed),
            fixed(DOOR, "wooden door", ItemGroup::Door),
            fixed(TRASH, "dustbin", ItemGroup::TrashHolder),
            fixed(TELEPORT, "magic forcefield", ItemGroup::Teleport),
            fixed(MAILBOX, "mailbox", ItemGroup::Mailbox),
            carried(ITEM_LETTER, "letter", 50, SlotPositions::empty()),
            carried(STAMPED_LETTER, "stamped letter", 50, SlotPositions::empty()),
            carried(ITEM_LABEL, "label", 10, SlotPositions::empty()),
            bag(ITEM_PARCEL, "parcel", 10, SlotPositions::empty()),
            bag(STAMPED_PARCEL, "stamped parcel", 10, SlotPositions::empty()),
            fixed(ITEM_BROWSEFIELD, "browse field", ItemGroup::Container),
            fixed(ITEM_LOCKER, "locker", ItemGroup::DepotLocker),
            ItemType {
                capacity: 30,
                ..fixed(ITEM_DEPOT, "depot chest", ItemGroup::Container)
            },
            fixed(ITEM_INBOX, "your inbox", ItemGroup::Container),
            fixed(ITEM_STORE_INBOX, "store inbox", ItemGroup::Container),
        ];
        let mut index = ItemTypeIndex::default();
        for item_type in types {
            index.insert(item_type).expect("fixture item type");
        }
        index
    }

    /// Grass from (90, 90) to (115, 115) on floor 7 and town 1 with its
    /// temple at [`TEMPLE`].
    pub fn fixture() -> WorldState {
        let config = EngineConfig {
            rng_seed: Some(7),
            ..EngineConfig::default()
        };
        let mut world = WorldState::new(config);
        world.item_types = item_types();
        for y in 90..=115 {
            for x in 90..=115 {
                let ground = world.create_item(GRASS, 1);
                let mut tile = Tile::new(Position::new(x, y, 7));
                tile.stage_item(ground, true, false);
                world.set_tile(tile);
            }
        }
        world
            .towns
            .add(Town {
                id: 1,
                name: "Thais".to_string(),
                temple: TEMPLE,
            })
            .expect("town");
        world
    }

    /// Logs a player in at `(x, y, z)`, creating the tile when the fixture
    /// has none there.
    pub fn spawn_player(world: &mut WorldState, name: &str, (x, y, z): (u16, u16, u8)) -> CreatureId {
        let data = PlayerData {
            town_id: 1,
            capacity: 40_000,
            ..PlayerData::default()
        };
        let player = world.add_player(name, data);
        if let Some(data) = world.creature_mut(player).and_then(|c| c.as_player_mut()) {
            data.guid = player.0 - FIRST_CREATURE_ID + 1;
        }
        place(world, player, Position::new(x, y, z));
        player
    }

    pub fn spawn_monster(world: &mut WorldState, name: &str, (x, y, z): (u16, u16, u8)) -> CreatureId {
        let monster = world.add_monster(name, MonsterData::default());
        place(world, monster, Position::new(x, y, z));
        monster
    }

    fn place(world: &mut WorldState, creature: CreatureId, position: Position) {
        world.map.ensure_tile(position);
        assert!(
            world.place_creature(position, creature, false, true),
            "could not place creature at {position}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::world::container::ContainerCylinder;
    use crate::world::cylinder::{Cylinder, Thing};
    use crate::world::tile::TileCylinder;

    #[test]
    fn top_parent_stops_below_the_root() {
        let mut world = fixture();
        let position = Position::new(100, 100, 7);
        let bag = world.create_item(BAG, 1);
        let sword = world.create_item(SWORD, 1);
        ContainerCylinder(bag).add_thing(&mut world, 0, Thing::Item(sword));
        TileCylinder(position).add_thing(&mut world, 0, Thing::Item(bag));

        assert_eq!(world.top_parent(CylinderId::Item(bag)), CylinderId::Item(bag));
        assert_eq!(world.top_parent(CylinderId::Item(sword)), CylinderId::Item(bag));
        assert_eq!(world.cylinder_position(CylinderId::Item(sword)), Some(position));
        assert_eq!(world.tile_of(CylinderId::Item(sword)).map(Tile::position), Some(position));

        let player = spawn_player(&mut world, "Ana", (101, 100, 7));
        assert_eq!(
            world.parent_of(CylinderId::Creature(player)),
            Some(CylinderId::Tile(Position::new(101, 100, 7)))
        );
        let loose = world.create_item(COIN, 3);
        assert_eq!(world.top_parent(CylinderId::Item(loose)), CylinderId::Item(loose));
        assert_eq!(world.cylinder_position(CylinderId::Item(loose)), None);
    }

    #[test]
    fn weights_scale_with_count_and_contents() {
        let mut world = fixture();
        let coins = world.create_item(COIN, 25);
        assert_eq!(world.item_weight(coins), 250);
        let bag = world.create_item(BAG, 1);
        ContainerCylinder(bag).add_thing(&mut world, 0, Thing::Item(coins));
        assert_eq!(world.item_weight(bag), 1800 + 250);
        assert_eq!(world.count_by_type(coins, COIN, -1), 25);
        assert_eq!(world.count_by_type(coins, SWORD, -1), 0);
    }

    #[test]
    fn item_ids_are_numbered_per_world() {
        let mut first = WorldState::default();
        let mut second = WorldState::default();
        let a = first.create_item(COIN, 1);
        let b = first.create_container(BAG, ContainerKind::Inbox, 0);
        assert_eq!(second.create_item(SWORD, 1), a);
        assert_eq!(b, ItemId(a.0 + 1));
        assert!(a.is_assigned());
    }

    #[test]
    fn items_are_created_by_group() {
        let mut world = fixture();
        let coins = world.create_item(COIN, 250);
        assert_eq!(world.item(coins).map(|item| item.count), Some(MAX_STACK));
        let sword = world.create_item(SWORD, 7);
        assert_eq!(world.item(sword).map(|item| item.count), Some(1));
        let bag = world.create_item(BAG, 1);
        assert_eq!(world.item(bag).and_then(|item| item.container()).map(|data| data.capacity), Some(8));
        let door = world.create_item(DOOR, 1);
        assert!(matches!(world.item(door).map(|item| &item.variant), Some(ItemVariant::Door { house_id: None })));
        let teleport = world.create_item(TELEPORT, 1);
        assert!(matches!(world.item(teleport).map(|item| &item.variant), Some(ItemVariant::Teleport { .. })));
    }

    #[test]
    fn releasing_a_container_releases_its_contents() {
        let mut world = fixture();
        let outer = world.create_item(BAG, 1);
        let inner = world.create_item(BAG, 1);
        let coins = world.create_item(COIN, 5);
        ContainerCylinder(inner).add_thing(&mut world, 0, Thing::Item(coins));
        ContainerCylinder(outer).add_thing(&mut world, 0, Thing::Item(inner));
        let before = world.item_count();

        world.release_item(outer);
        assert_eq!(world.item_count(), before - 3);
        assert!(world.item(coins).is_none());
        world.release_item(outer);
    }

    #[test]
    fn players_are_found_by_name_and_guid() {
        let mut world = fixture();
        let ana = spawn_player(&mut world, "Ana", (100, 100, 7));
        spawn_monster(&mut world, "rat", (101, 100, 7));
        assert_eq!(world.player_by_name("ANA"), Some(ana));
        assert_eq!(world.player_by_name("rat"), None);
        let guid = world.creature(ana).and_then(|c| c.as_player()).map(|data| data.guid);
        assert_eq!(guid.and_then(|guid| world.player_by_guid(guid)), Some(ana));
        assert_eq!(world.player_by_guid(0), None);

        let backpack = world.create_item(BACKPACK, 1);
        if let Some(data) = world.creature_mut(ana).and_then(|c| c.as_player_mut()) {
            data.inventory[3] = Some(backpack);
        }
        assert!(world.release_creature(ana).is_some());
        assert!(world.item(backpack).is_none());
        assert_eq!(world.player_by_name("ana"), None);
        assert!(world.map.tile(Position::new(100, 100, 7)).map_or(false, |tile| tile.creatures().is_empty()));
    }
}
