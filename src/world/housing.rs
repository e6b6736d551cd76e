use crate::entities::creature::{Creature, CreatureId};
use crate::entities::item::{ItemId, ItemVariant};
use crate::error::WorldError;
use crate::world::cylinder::{CylinderFlags, CylinderId, Thing, INDEX_WHEREEVER};
use crate::world::position::Position;
use crate::world::state::WorldState;
use crate::world::tile::TileFlags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// List ids outside the door id range.
pub const GUEST_LIST: u32 = 0x100;
pub const SUBOWNER_LIST: u32 = 0x101;

const MAX_LIST_LINES: usize = 100;
const MAX_LIST_LINE_LENGTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessHouseLevel {
    NotInvited,
    Guest,
    Subowner,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRank {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub ranks: Vec<GuildRank>,
}

/// Guilds known to the world, looked up by lowercase name.
#[derive(Debug, Clone, Default)]
pub struct Guilds {
    by_name: BTreeMap<String, Guild>,
}

impl Guilds {
    pub fn insert(&mut self, guild: Guild) -> Result<(), WorldError> {
        let key = guild.name.to_lowercase();
        if self.by_name.values().any(|known| known.id == guild.id) || self.by_name.contains_key(&key) {
            return Err(WorldError::Duplicate {
                kind: "guild",
                id: guild.id,
            });
        }
        self.by_name.insert(key, guild);
        Ok(())
    }

    pub fn by_name(&self, name: &str) -> Option<&Guild> {
        self.by_name.get(&name.to_lowercase())
    }
}

/// Names, guild ranks and wildcard parsed from an access list text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessList {
    text: String,
    players: BTreeSet<String>,
    guild_ranks: BTreeSet<u32>,
    allow_everyone: bool,
}

impl AccessList {
    pub fn parse(text: &str, guilds: &Guilds) -> Self {
        let mut list = Self::default();
        list.parse_list(text, guilds);
        list
    }

    /// Replaces the list. At most 100 lines are read; blank lines, comments
    /// and overlong lines are skipped. `@guild` adds every rank of a guild,
    /// `rank@guild` a single rank and `*` lets everyone in. Names with
    /// pattern characters are ignored.
    pub fn parse_list(&mut self, text: &str, guilds: &Guilds) {
        self.players.clear();
        self.guild_ranks.clear();
        self.allow_everyone = false;
        self.text = text.to_string();

        for raw in text.lines().take(MAX_LIST_LINES - 1) {
            let line = raw.trim().trim_matches('\t').trim();
            if line.is_empty() || line.starts_with('#') || line.len() > MAX_LIST_LINE_LENGTH {
                continue;
            }
            let line = line.to_lowercase();
            if let Some(at) = line.find('@') {
                let guild_name = &line[at + 1..];
                let Some(guild) = guilds.by_name(guild_name) else {
                    continue;
                };
                if at == 0 {
                    self.guild_ranks.extend(guild.ranks.iter().map(|rank| rank.id));
                } else {
                    let rank_name = line[..at].trim();
                    if let Some(rank) = guild
                        .ranks
                        .iter()
                        .find(|rank| rank.name.eq_ignore_ascii_case(rank_name))
                    {
                        self.guild_ranks.insert(rank.id);
                    }
                }
            } else if line == "*" {
                self.allow_everyone = true;
            } else if line.contains(['!', '*', '?']) {
                continue;
            } else {
                self.players.insert(line);
            }
        }
    }

    pub fn is_in_list(&self, player: &Creature) -> bool {
        if self.allow_everyone {
            return true;
        }
        if self.players.contains(&player.name.to_lowercase()) {
            return true;
        }
        player
            .as_player()
            .map_or(false, |data| data.guild_rank_id != 0 && self.guild_ranks.contains(&data.guild_rank_id))
    }

    pub fn to_list_string(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseOwner {
    pub guid: u32,
    pub name: String,
    #[serde(default)]
    pub account_id: u32,
}

#[derive(Debug, Clone)]
pub struct House {
    pub id: u32,
    pub name: String,
    pub owner: Option<HouseOwner>,
    pub entry: Position,
    pub town_id: u32,
    pub rent: u32,
    pub tiles: BTreeSet<Position>,
    pub doors: Vec<ItemId>,
    pub beds: Vec<ItemId>,
    guests: AccessList,
    subowners: AccessList,
    door_lists: BTreeMap<u8, AccessList>,
}

impl House {
    pub fn new(id: u32, name: &str, entry: Position, town_id: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            owner: None,
            entry,
            town_id,
            rent: 0,
            tiles: BTreeSet::new(),
            doors: Vec::new(),
            beds: Vec::new(),
            guests: AccessList::default(),
            subowners: AccessList::default(),
            door_lists: BTreeMap::new(),
        }
    }

    pub fn owner_guid(&self) -> u32 {
        self.owner.as_ref().map_or(0, |owner| owner.guid)
    }

    /// Two bed items make one bed.
    pub fn bed_count(&self) -> usize {
        self.beds.len().div_ceil(2)
    }

    /// `None` stands for the server itself and always owns the house.
    pub fn access_level(&self, player: Option<&Creature>, owned_by_account: bool) -> AccessHouseLevel {
        let Some(player) = player else {
            return AccessHouseLevel::Owner;
        };
        let Some(data) = player.as_player() else {
            return AccessHouseLevel::NotInvited;
        };
        if let Some(owner) = &self.owner {
            if owned_by_account && owner.account_id != 0 && owner.account_id == data.account_id {
                return AccessHouseLevel::Owner;
            }
            if owner.guid == data.guid {
                return AccessHouseLevel::Owner;
            }
        }
        if data.can_edit_houses {
            return AccessHouseLevel::Owner;
        }
        if self.subowners.is_in_list(player) {
            return AccessHouseLevel::Subowner;
        }
        if self.guests.is_in_list(player) {
            return AccessHouseLevel::Guest;
        }
        AccessHouseLevel::NotInvited
    }

    pub fn access_list(&self, list_id: u32) -> Option<&str> {
        match list_id {
            GUEST_LIST => Some(self.guests.to_list_string()),
            SUBOWNER_LIST => Some(self.subowners.to_list_string()),
            door_id => u8::try_from(door_id)
                .ok()
                .and_then(|door_id| self.door_lists.get(&door_id))
                .map(AccessList::to_list_string),
        }
    }

    fn clear_access_lists(&mut self) {
        self.guests = AccessList::default();
        self.subowners = AccessList::default();
        for list in self.door_lists.values_mut() {
            *list = AccessList::default();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Houses {
    houses: BTreeMap<u32, House>,
    pub guilds: Guilds,
}

impl Houses {
    pub fn add(&mut self, house: House) -> Result<(), WorldError> {
        if self.houses.contains_key(&house.id) {
            return Err(WorldError::Duplicate {
                kind: "house",
                id: house.id,
            });
        }
        self.houses.insert(house.id, house);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&House> {
        self.houses.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut House> {
        self.houses.get_mut(&id)
    }

    pub fn by_owner(&self, guid: u32) -> Option<&House> {
        self.houses.values().find(|house| guid != 0 && house.owner_guid() == guid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &House> {
        self.houses.values()
    }

    pub fn len(&self) -> usize {
        self.houses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.houses.is_empty()
    }
}

impl WorldState {
    pub fn house_access_level(&self, house_id: u32, player: Option<CreatureId>) -> AccessHouseLevel {
        let Some(house) = self.houses.get(house_id) else {
            return AccessHouseLevel::NotInvited;
        };
        let creature = match player {
            Some(id) => match self.creature(id) {
                Some(creature) => Some(creature),
                None => return AccessHouseLevel::NotInvited,
            },
            None => None,
        };
        house.access_level(creature, self.config.house_owned_by_account)
    }

    pub fn is_invited(&self, house_id: u32, player: Option<CreatureId>) -> bool {
        self.house_access_level(house_id, player) != AccessHouseLevel::NotInvited
    }

    /// Whether `actor` is barred from touching items under `top_parent`
    /// because it is a house tile they are not invited to.
    pub fn denies_house_actor(&self, top_parent: CylinderId, actor: Option<CreatureId>) -> bool {
        if actor.is_none() || !self.config.only_invited_can_move_house_items {
            return false;
        }
        let position = match top_parent {
            CylinderId::Tile(position) => Some(position),
            CylinderId::Item(_) => self.cylinder_position(top_parent),
            CylinderId::Creature(_) | CylinderId::Virtual => None,
        };
        let Some(house_id) = position
            .and_then(|position| self.map.tile(position))
            .and_then(|tile| tile.house_id)
        else {
            return false;
        };
        !self.is_invited(house_id, actor)
    }

    pub fn can_edit_access_list(&self, house_id: u32, list_id: u32, player: CreatureId) -> bool {
        match self.house_access_level(house_id, Some(player)) {
            AccessHouseLevel::Owner => true,
            AccessHouseLevel::Subowner => list_id == GUEST_LIST,
            _ => false,
        }
    }

    /// Makes `position` part of a house: the tile is tagged and becomes a
    /// protection zone, and doors and beds on it register with the house.
    pub fn add_house_tile(&mut self, house_id: u32, position: Position) -> Result<(), WorldError> {
        if self.houses.get(house_id).is_none() {
            return Err(WorldError::Fixture(format!("unknown house {}", house_id)));
        }
        let tile = self
            .map
            .tile_mut(position)
            .ok_or(WorldError::MissingTile(position))?;
        tile.house_id = Some(house_id);
        tile.flags.insert(TileFlags::PROTECTIONZONE);
        let items: Vec<ItemId> = tile.ground.iter().chain(tile.items().iter()).copied().collect();
        if let Some(house) = self.houses.get_mut(house_id) {
            house.tiles.insert(position);
        }
        for item in items {
            let (door_id, is_door, is_bed) = match self.item(item) {
                Some(entry) => (
                    entry.attributes.door_id,
                    matches!(entry.variant, ItemVariant::Door { .. }),
                    matches!(entry.variant, ItemVariant::Bed { .. }),
                ),
                None => continue,
            };
            if is_door && door_id != 0 {
                self.register_house_door(house_id, item, door_id);
            } else if is_bed {
                self.register_house_bed(house_id, item);
            }
        }
        Ok(())
    }

    pub fn register_house_door(&mut self, house_id: u32, door: ItemId, door_id: u8) {
        let Some(house) = self.houses.get_mut(house_id) else {
            return;
        };
        if !house.doors.contains(&door) {
            house.doors.push(door);
        }
        house.door_lists.entry(door_id).or_default();
        if let Some(entry) = self.item_mut(door) {
            entry.attributes.door_id = door_id;
            entry.variant = ItemVariant::Door {
                house_id: Some(house_id),
            };
        }
        self.update_door_descriptions(house_id);
    }

    pub fn register_house_bed(&mut self, house_id: u32, bed: ItemId) {
        let Some(house) = self.houses.get_mut(house_id) else {
            return;
        };
        if !house.beds.contains(&bed) {
            house.beds.push(bed);
        }
        if let Some(entry) = self.item_mut(bed) {
            entry.variant = ItemVariant::Bed {
                house_id: Some(house_id),
            };
        }
    }

    pub fn house_door_by_number(&self, house_id: u32, door_id: u8) -> Option<ItemId> {
        self.houses.get(house_id)?.doors.iter().copied().find(|door| {
            self.item(*door)
                .map_or(false, |entry| entry.attributes.door_id == door_id)
        })
    }

    pub fn house_door_at(&self, house_id: u32, position: Position) -> Option<ItemId> {
        self.houses.get(house_id)?.doors.iter().copied().find(|door| {
            self.item(*door).and_then(|entry| entry.parent) == Some(CylinderId::Tile(position))
        })
    }

    /// House doors open for subowners and up, or for players on the door's
    /// own list. Doors outside houses open for everyone.
    pub fn door_can_use(&self, door: ItemId, player: CreatureId) -> bool {
        let Some(entry) = self.item(door) else {
            return false;
        };
        let ItemVariant::Door {
            house_id: Some(house_id),
        } = entry.variant
        else {
            return true;
        };
        if self.house_access_level(house_id, Some(player)) >= AccessHouseLevel::Subowner {
            return true;
        }
        let door_id = entry.attributes.door_id;
        match (self.houses.get(house_id), self.creature(player)) {
            (Some(house), Some(creature)) => house
                .door_lists
                .get(&door_id)
                .map_or(false, |list| list.is_in_list(creature)),
            _ => false,
        }
    }

    pub fn house_access_list(&self, house_id: u32, list_id: u32) -> Option<String> {
        self.houses
            .get(house_id)?
            .access_list(list_id)
            .map(str::to_string)
    }

    /// Replaces a guest, subowner or door list. Changing the guest or
    /// subowner list sends players that lost access to the entrance.
    pub fn set_house_access_list(&mut self, house_id: u32, list_id: u32, text: &str) {
        let Some(house) = self.houses.houses.get_mut(&house_id) else {
            return;
        };
        let guilds = &self.houses.guilds;
        match list_id {
            GUEST_LIST => house.guests = AccessList::parse(text, guilds),
            SUBOWNER_LIST => house.subowners = AccessList::parse(text, guilds),
            door_id => {
                if let Ok(door_id) = u8::try_from(door_id) {
                    if let Some(list) = house.door_lists.get_mut(&door_id) {
                        list.parse_list(text, guilds);
                    }
                }
                return;
            }
        }
        log::info!(target: "houses", "access list {} of house {} changed", list_id, house_id);

        for player in self.house_occupants(house_id) {
            if !self.is_invited(house_id, Some(player)) {
                self.kick_player(house_id, None, player);
            }
        }
    }

    /// Players standing on the house's tiles, last arrival first.
    fn house_occupants(&self, house_id: u32) -> Vec<CreatureId> {
        let Some(house) = self.houses.get(house_id) else {
            return Vec::new();
        };
        house
            .tiles
            .iter()
            .filter_map(|position| self.map.tile(*position))
            .flat_map(|tile| tile.creatures().iter().rev().copied())
            .filter(|id| self.creature(*id).map_or(false, Creature::is_player))
            .collect()
    }

    /// Sends `target` to the house entrance. `actor` must have at least the
    /// target's access level; `None` acts for the server.
    pub fn kick_player(&mut self, house_id: u32, actor: Option<CreatureId>, target: CreatureId) -> bool {
        let Some(entry) = self.houses.get(house_id).map(|house| house.entry) else {
            return false;
        };
        let Some(creature) = self.creature(target).filter(|creature| creature.is_player()) else {
            return false;
        };
        let on_house_tile = self
            .map
            .tile(creature.position)
            .map_or(false, |tile| tile.house_id == Some(house_id));
        if !on_house_tile {
            return false;
        }
        if creature.as_player().map_or(false, |data| data.can_edit_houses) {
            return false;
        }
        if self.house_access_level(house_id, actor) < self.house_access_level(house_id, Some(target)) {
            return false;
        }
        let ret = self.internal_teleport(Thing::Creature(target), entry, false, CylinderFlags::empty());
        if !ret.is_ok() {
            log::warn!(target: "houses", "could not kick player {} from house {}: {}", target.0, house_id, ret);
        }
        true
    }

    /// Hands the house to `owner`, or clears it with `None`. A previous owner
    /// loses the house contents to their inbox when online, every player
    /// inside is kicked, sleepers wake up and all lists are emptied.
    pub fn set_house_owner(&mut self, house_id: u32, owner: Option<HouseOwner>) {
        let Some(house) = self.houses.get(house_id) else {
            return;
        };
        if house.owner == owner {
            return;
        }
        let previous = house.owner_guid();
        let beds = house.beds.clone();

        if previous != 0 {
            self.transfer_house_items(house_id, previous);
            for player in self.house_occupants(house_id) {
                self.kick_player(house_id, None, player);
            }
            for bed in beds {
                if let Some(entry) = self.item_mut(bed) {
                    entry.attributes.sleeper_guid = 0;
                }
            }
            if let Some(house) = self.houses.get_mut(house_id) {
                house.owner = None;
                house.clear_access_lists();
            }
        }

        if let Some(house) = self.houses.get_mut(house_id) {
            house.owner = owner.filter(|owner| owner.guid != 0);
            log::info!(
                target: "houses",
                "house {} now owned by {}",
                house_id,
                house.owner.as_ref().map_or("nobody", |owner| owner.name.as_str())
            );
        }
        self.update_door_descriptions(house_id);
    }

    /// Moves pickupable items, and the contents of fixed containers, into
    /// the inbox of the owner if they are online.
    fn transfer_house_items(&mut self, house_id: u32, owner_guid: u32) -> bool {
        let Some(tiles) = self
            .houses
            .get(house_id)
            .filter(|house| house.town_id != 0)
            .map(|house| house.tiles.clone())
        else {
            return false;
        };
        let Some(owner) = self.player_by_guid(owner_guid) else {
            log::info!(target: "houses", "owner {} of house {} is offline, items stay", owner_guid, house_id);
            return false;
        };
        let Some(inbox) = self.inbox(owner) else {
            return false;
        };

        let mut moving = Vec::new();
        for position in &tiles {
            let Some(tile) = self.map.tile(*position) else {
                continue;
            };
            for item in tile.items() {
                if self.item_type_of(*item).pickupable {
                    moving.push(*item);
                } else if let Some(data) = self.item(*item).and_then(|entry| entry.container()) {
                    moving.extend(data.items.iter().copied());
                }
            }
        }
        for item in moving {
            let Some(entry) = self.item(item) else {
                continue;
            };
            let (Some(parent), count) = (entry.parent, u32::from(entry.count)) else {
                continue;
            };
            self.internal_move_item(
                parent,
                CylinderId::Item(inbox),
                INDEX_WHEREEVER,
                item,
                count,
                CylinderFlags::NOLIMIT,
                None,
            );
        }
        true
    }

    fn update_door_descriptions(&mut self, house_id: u32) {
        let Some(house) = self.houses.get(house_id) else {
            return;
        };
        let description = format!(
            "It belongs to house '{}'. {} owns this house.",
            house.name,
            house.owner.as_ref().map_or("Nobody", |owner| owner.name.as_str())
        );
        for door in house.doors.clone() {
            if let Some(entry) = self.item_mut(door) {
                entry.attributes.description = Some(description.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::cylinder::{Cylinder, ReturnValue};
    use crate::world::container::ContainerCylinder;
    use crate::world::state::test_support::{fixture, spawn_player, BAG, BED, COIN, DOOR};
    use crate::world::tile::TileCylinder;

    const HOUSE: u32 = 7;

    fn house_world() -> WorldState {
        let mut world = fixture();
        let mut house = House::new(HOUSE, "Harbour Flat", Position::new(100, 104, 7), 1);
        house.rent = 500;
        world.houses.add(house).expect("house");
        for y in 100..=103 {
            for x in 100..=103 {
                world
                    .add_house_tile(HOUSE, Position::new(x, y, 7))
                    .expect("house tile");
            }
        }
        world
    }

    fn set_guid(world: &mut WorldState, player: CreatureId, guid: u32) {
        if let Some(data) = world.creature_mut(player).and_then(|c| c.as_player_mut()) {
            data.guid = guid;
        }
    }

    #[test]
    fn access_list_parsing_follows_the_line_rules() {
        let mut guilds = Guilds::default();
        guilds
            .insert(Guild {
                id: 1,
                name: "Red Rose".to_string(),
                ranks: vec![
                    GuildRank { id: 10, name: "Leader".to_string() },
                    GuildRank { id: 11, name: "Member".to_string() },
                ],
            })
            .expect("guild");
        let text = "# comment\n  Ana \n\nbr?no\nmember@red rose\n";
        let list = AccessList::parse(text, &guilds);
        assert_eq!(list.to_list_string(), text);
        assert!(list.players.contains("ana"));
        assert_eq!(list.players.len(), 1);
        assert_eq!(list.guild_ranks.iter().copied().collect::<Vec<_>>(), vec![11]);

        let everyone = AccessList::parse("@red rose\n*", &guilds);
        assert!(everyone.allow_everyone);
        assert_eq!(everyone.guild_ranks.len(), 2);

        let long = "a".repeat(101);
        assert!(AccessList::parse(&long, &guilds).players.is_empty());
    }

    #[test]
    fn access_levels_rank_owner_subowner_guest() {
        let mut world = house_world();
        let owner = spawn_player(&mut world, "Olga", (105, 105, 7));
        let sub = spawn_player(&mut world, "Sam", (106, 105, 7));
        let guest = spawn_player(&mut world, "Gus", (107, 105, 7));
        let stranger = spawn_player(&mut world, "Stan", (108, 105, 7));
        set_guid(&mut world, owner, 42);
        world.set_house_owner(
            HOUSE,
            Some(HouseOwner { guid: 42, name: "Olga".to_string(), account_id: 9 }),
        );
        world.set_house_access_list(HOUSE, SUBOWNER_LIST, "sam");
        world.set_house_access_list(HOUSE, GUEST_LIST, "Gus");

        assert_eq!(world.house_access_level(HOUSE, Some(owner)), AccessHouseLevel::Owner);
        assert_eq!(world.house_access_level(HOUSE, Some(sub)), AccessHouseLevel::Subowner);
        assert_eq!(world.house_access_level(HOUSE, Some(guest)), AccessHouseLevel::Guest);
        assert_eq!(world.house_access_level(HOUSE, Some(stranger)), AccessHouseLevel::NotInvited);
        assert_eq!(world.house_access_level(HOUSE, None), AccessHouseLevel::Owner);

        assert!(world.can_edit_access_list(HOUSE, SUBOWNER_LIST, owner));
        assert!(world.can_edit_access_list(HOUSE, GUEST_LIST, sub));
        assert!(!world.can_edit_access_list(HOUSE, SUBOWNER_LIST, sub));
        assert!(!world.can_edit_access_list(HOUSE, GUEST_LIST, guest));
        assert_eq!(world.house_access_list(HOUSE, GUEST_LIST).as_deref(), Some("Gus"));
    }

    #[test]
    fn uninvited_players_cannot_reach_into_bags_on_house_tiles() {
        let mut world = house_world();
        let owner = spawn_player(&mut world, "Olga", (105, 105, 7));
        let stranger = spawn_player(&mut world, "Stan", (106, 105, 7));
        set_guid(&mut world, owner, 42);
        world.set_house_owner(
            HOUSE,
            Some(HouseOwner { guid: 42, name: "Olga".to_string(), account_id: 9 }),
        );

        let position = Position::new(101, 101, 7);
        let bag = world.create_item(BAG, 1);
        let coin = world.create_item(COIN, 5);
        let loose = world.create_item(COIN, 3);
        TileCylinder(position).add_thing(&mut world, 0, Thing::Item(bag));
        TileCylinder(position).add_thing(&mut world, 0, Thing::Item(loose));
        ContainerCylinder(bag).add_thing(&mut world, 0, Thing::Item(coin));
        let flags = CylinderFlags::empty();

        assert_eq!(
            TileCylinder(position).query_remove(&world, Thing::Item(loose), 3, flags, Some(stranger)),
            ReturnValue::PlayerIsNotInvited
        );
        let inside = CylinderId::Item(bag);
        assert_eq!(
            inside.query_remove(&world, Thing::Item(coin), 5, flags, Some(stranger)),
            ReturnValue::PlayerIsNotInvited
        );
        let extra = world.create_item(COIN, 1);
        assert_eq!(
            inside.query_add(&world, INDEX_WHEREEVER, Thing::Item(extra), 1, flags, Some(stranger)),
            ReturnValue::PlayerIsNotInvited
        );

        assert!(inside.query_remove(&world, Thing::Item(coin), 5, flags, Some(owner)).is_ok());
        assert!(inside
            .query_add(&world, INDEX_WHEREEVER, Thing::Item(extra), 1, flags, Some(owner))
            .is_ok());
        assert!(inside.query_remove(&world, Thing::Item(coin), 5, flags, None).is_ok());

        assert!(!world.denies_house_actor(CylinderId::Creature(stranger), Some(stranger)));
    }

    #[test]
    fn losing_the_house_opens_the_previous_owners_inbox() {
        let mut world = house_world();
        let owner = spawn_player(&mut world, "Olga", (105, 105, 7));
        set_guid(&mut world, owner, 42);
        world.set_house_owner(
            HOUSE,
            Some(HouseOwner { guid: 42, name: "Olga".to_string(), account_id: 9 }),
        );
        let coin = world.create_item(COIN, 10);
        TileCylinder(Position::new(102, 101, 7)).add_thing(&mut world, 0, Thing::Item(coin));
        assert!(world.creature(owner).and_then(|c| c.as_player()).map_or(false, |p| p.inbox.is_none()));

        world.set_house_owner(HOUSE, None);
        assert!(world.houses.get(HOUSE).map_or(false, |house| house.owner.is_none()));
        assert!(world.creature(owner).and_then(|c| c.as_player()).map_or(false, |p| p.inbox.is_some()));
    }

    #[test]
    fn house_tiles_are_protection_zones() {
        let mut world = house_world();
        let tile = world.map.tile(Position::new(101, 101, 7)).expect("tile");
        assert_eq!(tile.house_id, Some(HOUSE));
        assert!(tile.has_flag(TileFlags::PROTECTIONZONE));
        assert_eq!(world.houses.get(HOUSE).map(|house| house.tiles.len()), Some(16));
        assert!(matches!(
            world.add_house_tile(HOUSE, Position::new(3000, 3000, 7)),
            Err(WorldError::MissingTile(_))
        ));
        assert!(world.add_house_tile(99, Position::new(90, 90, 7)).is_err());
    }

    #[test]
    fn guest_list_changes_kick_uninvited_players() {
        let mut world = house_world();
        let guest = spawn_player(&mut world, "Gus", (101, 101, 7));
        world.set_house_access_list(HOUSE, GUEST_LIST, "gus");
        assert_eq!(world.creature(guest).map(|c| c.position), Some(Position::new(101, 101, 7)));

        world.set_house_access_list(HOUSE, GUEST_LIST, "");
        assert_eq!(world.creature(guest).map(|c| c.position), Some(Position::new(100, 104, 7)));
    }

    #[test]
    fn doors_check_house_access_and_their_own_list() {
        let mut world = house_world();
        let door = world.create_item(DOOR, 1);
        if let Some(entry) = world.item_mut(door) {
            entry.attributes.door_id = 3;
        }
        TileCylinder(Position::new(100, 100, 7)).add_thing(&mut world, 0, Thing::Item(door));
        assert_eq!(world.house_door_by_number(HOUSE, 3), Some(door));
        assert_eq!(world.house_door_at(HOUSE, Position::new(100, 100, 7)), Some(door));

        let visitor = spawn_player(&mut world, "Vera", (105, 105, 7));
        assert!(!world.door_can_use(door, visitor));
        world.set_house_access_list(HOUSE, 3, "vera");
        assert!(world.door_can_use(door, visitor));
        assert_eq!(world.house_access_list(HOUSE, 3).as_deref(), Some("vera"));

        let loose_door = world.create_item(DOOR, 1);
        assert!(world.door_can_use(loose_door, visitor));
    }

    #[test]
    fn house_beds_cannot_be_removed_and_pair_up() {
        let mut world = house_world();
        let head = world.create_item(BED, 1);
        let foot = world.create_item(BED, 1);
        TileCylinder(Position::new(102, 102, 7)).add_thing(&mut world, 0, Thing::Item(head));
        TileCylinder(Position::new(102, 103, 7)).add_thing(&mut world, 0, Thing::Item(foot));
        // Registration is idempotent.
        world.register_house_bed(HOUSE, head);
        let house = world.houses.get(HOUSE).expect("house");
        assert_eq!(house.beds.len(), 2);
        assert_eq!(house.bed_count(), 1);
        assert!(!world.can_remove(head));
        assert_eq!(
            world.internal_remove_item(head, -1, false, CylinderFlags::empty()),
            ReturnValue::NotPossible
        );
        let free_bed = world.create_item(BED, 1);
        assert!(world.can_remove(free_bed));
    }

    #[test]
    fn changing_owner_clears_lists_and_evicts() {
        let mut world = house_world();
        let owner = spawn_player(&mut world, "Olga", (101, 101, 7));
        set_guid(&mut world, owner, 42);
        world.set_house_owner(
            HOUSE,
            Some(HouseOwner { guid: 42, name: "Olga".to_string(), account_id: 0 }),
        );
        world.set_house_access_list(HOUSE, GUEST_LIST, "gus");
        let coins = world.create_item(COIN, 20);
        TileCylinder(Position::new(102, 101, 7)).add_thing(&mut world, 0, Thing::Item(coins));
        assert_eq!(world.houses.by_owner(42).map(|house| house.id), Some(HOUSE));

        world.set_house_owner(HOUSE, None);
        let house = world.houses.get(HOUSE).expect("house");
        assert!(house.owner.is_none());
        assert_eq!(house.access_list(GUEST_LIST), Some(""));
        assert_eq!(world.creature(owner).map(|c| c.position), Some(Position::new(100, 104, 7)));
        let inbox = world
            .creature(owner)
            .and_then(|c| c.as_player())
            .and_then(|data| data.inbox)
            .expect("inbox");
        assert_eq!(world.item(coins).and_then(|item| item.parent), Some(CylinderId::Item(inbox)));
        assert!(world.houses.by_owner(42).is_none());
    }
}
