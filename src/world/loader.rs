use crate::config::EngineConfig;
use crate::entities::item::{ItemAttributes, ItemId, ItemTypeId, ItemVariant};
use crate::error::WorldError;
use crate::world::container::ContainerCylinder;
use crate::world::housing::{Guild, House, HouseOwner, GUEST_LIST, SUBOWNER_LIST};
use crate::world::item_types::ItemType;
use crate::world::position::Position;
use crate::world::state::WorldState;
use crate::world::tile::{Tile, TileFlags};
use crate::world::towns::Town;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A rectangle of tiles covered by a single ground type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundArea {
    pub ground: ItemTypeId,
    pub from: Position,
    pub to: Position,
}

impl GroundArea {
    pub fn positions(&self) -> Vec<Position> {
        positions_between(self.from, self.to)
    }
}

/// Every position inside the box spanned by two corners, in any order.
pub fn positions_between(from: Position, to: Position) -> Vec<Position> {
    let (x1, x2) = (from.x.min(to.x), from.x.max(to.x));
    let (y1, y2) = (from.y.min(to.y), from.y.max(to.y));
    let (z1, z2) = (from.z.min(to.z), from.z.max(to.z));
    let mut positions = Vec::new();
    for z in z1..=z2 {
        for y in y1..=y2 {
            for x in x1..=x2 {
                positions.push(Position::new(x, y, z));
            }
        }
    }
    positions
}

/// An item placed by the fixture, with its container contents listed front
/// to back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSpec {
    pub id: ItemTypeId,
    #[serde(default = "default_count")]
    pub count: u16,
    #[serde(default)]
    pub attributes: ItemAttributes,
    /// Only meaningful for teleports.
    #[serde(default)]
    pub destination: Option<Position>,
    #[serde(default)]
    pub contents: Vec<ItemSpec>,
}

fn default_count() -> u16 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileSpec {
    pub position: Position,
    #[serde(default)]
    pub flags: TileFlags,
    #[serde(default)]
    pub ground: Option<ItemTypeId>,
    /// Bottom first.
    #[serde(default)]
    pub items: Vec<ItemSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseSpec {
    pub id: u32,
    pub name: String,
    pub entry: Position,
    #[serde(default)]
    pub town_id: u32,
    #[serde(default)]
    pub rent: u32,
    #[serde(default)]
    pub owner: Option<HouseOwner>,
    #[serde(default)]
    pub tiles: Vec<Position>,
    #[serde(default)]
    pub guests: String,
    #[serde(default)]
    pub subowners: String,
    /// Door number to access list text.
    #[serde(default)]
    pub door_lists: BTreeMap<u8, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub id: u16,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub areas: Vec<ZoneArea>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneArea {
    pub from: Position,
    pub to: Position,
}

/// The whole fixture document. Every section may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldFixture {
    pub item_types: Vec<ItemType>,
    pub towns: Vec<Town>,
    pub waypoints: Vec<Waypoint>,
    pub guilds: Vec<Guild>,
    pub grounds: Vec<GroundArea>,
    pub tiles: Vec<TileSpec>,
    pub houses: Vec<HouseSpec>,
    pub zones: Vec<ZoneSpec>,
}

/// Counts reported after a fixture has been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub item_types: usize,
    pub towns: usize,
    pub tiles: usize,
    pub items: usize,
    pub houses: usize,
    pub zones: usize,
}

impl WorldFixture {
    pub fn from_yaml(text: &str) -> Result<Self, WorldError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, WorldError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Loads everything into `world`. Houses come after tiles so that doors
    /// and beds already on the map register with their house. Any failure is
    /// reported as [`WorldError::Fixture`].
    pub fn apply(self, world: &mut WorldState) -> Result<LoadSummary, WorldError> {
        self.apply_sections(world).map_err(|err| match err {
            err @ WorldError::Fixture(_) => err,
            other => WorldError::Fixture(other.to_string()),
        })
    }

    fn apply_sections(self, world: &mut WorldState) -> Result<LoadSummary, WorldError> {
        let mut summary = LoadSummary::default();

        for item_type in self.item_types {
            world.item_types.insert(item_type)?;
            summary.item_types += 1;
        }
        for town in self.towns {
            world.towns.add(town)?;
            summary.towns += 1;
        }
        for waypoint in &self.waypoints {
            world.towns.add_waypoint(&waypoint.name, waypoint.position);
        }
        for guild in self.guilds {
            world.houses.guilds.insert(guild)?;
        }

        for area in &self.grounds {
            require_type(world, area.ground)?;
            for position in area.positions() {
                let ground = world.create_item(area.ground, 1);
                let mut tile = Tile::new(position);
                tile.stage_item(ground, true, false);
                world.set_tile(tile);
                summary.tiles += 1;
                summary.items += 1;
            }
        }

        for spec in &self.tiles {
            summary.items += load_tile(world, spec)?;
            summary.tiles += 1;
        }

        for spec in self.houses {
            load_house(world, spec)?;
            summary.houses += 1;
        }

        for spec in self.zones {
            let mut positions = spec.positions;
            for area in &spec.areas {
                positions.extend(positions_between(area.from, area.to));
            }
            world.zones.register(spec.id, positions)?;
            summary.zones += 1;
        }

        log::info!(
            "world fixture loaded: {} item types, {} towns, {} tiles, {} items, {} houses, {} zones",
            summary.item_types,
            summary.towns,
            summary.tiles,
            summary.items,
            summary.houses,
            summary.zones
        );
        Ok(summary)
    }
}

/// Builds a fresh world from a fixture file.
pub fn load_world(path: &Path, config: EngineConfig) -> Result<(WorldState, LoadSummary), WorldError> {
    let fixture = WorldFixture::from_file(path).map_err(|err| match err {
        WorldError::Yaml(inner) => WorldError::Fixture(format!("{}: {}", path.display(), inner)),
        other => other,
    })?;
    let mut world = WorldState::new(config);
    let summary = fixture.apply(&mut world)?;
    Ok((world, summary))
}

impl WorldState {
    pub fn from_fixture_yaml(config: EngineConfig, text: &str) -> Result<Self, WorldError> {
        let mut world = WorldState::new(config);
        WorldFixture::from_yaml(text)?.apply(&mut world)?;
        Ok(world)
    }
}

fn require_type(world: &WorldState, type_id: ItemTypeId) -> Result<(), WorldError> {
    if world.item_types.contains(type_id) {
        Ok(())
    } else {
        Err(WorldError::UnknownItemType(type_id.0))
    }
}

fn load_tile(world: &mut WorldState, spec: &TileSpec) -> Result<usize, WorldError> {
    let mut tile = Tile::new(spec.position);
    tile.flags = spec.flags;
    let mut created = 0;

    if let Some(ground) = spec.ground {
        require_type(world, ground)?;
        let item = world.create_item(ground, 1);
        tile.stage_item(item, true, false);
        created += 1;
    }
    for item_spec in &spec.items {
        let (item, count) = build_item(world, item_spec)?;
        let on_top = world.item_types.get_or_default(item_spec.id).always_on_top;
        tile.stage_item(item, false, on_top);
        created += count;
    }

    world.set_tile(tile);
    Ok(created)
}

/// Creates an item and its contents, all detached. Returns the root and the
/// number of items created.
fn build_item(world: &mut WorldState, spec: &ItemSpec) -> Result<(ItemId, usize), WorldError> {
    require_type(world, spec.id)?;
    let item = world.create_item(spec.id, spec.count);
    let is_container = world.item(item).map_or(false, |entry| entry.is_container());
    if let Some(entry) = world.item_mut(item) {
        entry.attributes = spec.attributes.clone();
        if let (Some(destination), ItemVariant::Teleport { .. }) = (spec.destination, &entry.variant) {
            entry.variant = ItemVariant::Teleport { destination };
        }
    }

    let mut created = 1;
    if !spec.contents.is_empty() && !is_container {
        return Err(WorldError::Fixture(format!(
            "item type {} is not a container but lists contents",
            spec.id.0
        )));
    }
    for child in &spec.contents {
        let (child_item, count) = build_item(world, child)?;
        ContainerCylinder(item).add_item_back(world, child_item);
        created += count;
    }
    Ok((item, created))
}

fn load_house(world: &mut WorldState, spec: HouseSpec) -> Result<(), WorldError> {
    if world.towns.get(spec.town_id).is_none() && spec.town_id != 0 {
        return Err(WorldError::Fixture(format!(
            "house {} references unknown town {}",
            spec.id, spec.town_id
        )));
    }
    let mut house = House::new(spec.id, &spec.name, spec.entry, spec.town_id);
    house.rent = spec.rent;
    house.owner = spec.owner.filter(|owner| owner.guid != 0);
    world.houses.add(house)?;

    for position in spec.tiles {
        world.add_house_tile(spec.id, position)?;
    }
    if !spec.guests.is_empty() {
        world.set_house_access_list(spec.id, GUEST_LIST, &spec.guests);
    }
    if !spec.subowners.is_empty() {
        world.set_house_access_list(spec.id, SUBOWNER_LIST, &spec.subowners);
    }
    for (door_id, text) in &spec.door_lists {
        world.set_house_access_list(spec.id, u32::from(*door_id), text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::cylinder::CylinderId;
    use crate::world::tile::TileCylinder;

    const WORLD: &str = r#"
item_types:
  - id: 4526
    name: grass
    group: ground
    moveable: false
  - id: 1987
    name: bag
    group: container
    capacity: 8
    pickupable: true
    weight: 1800
  - id: 3031
    name: gold coin
    stackable: true
    pickupable: true
    weight: 10
  - id: 1209
    name: door
    group: door
    moveable: false
  - id: 1387
    name: magic forcefield
    group: teleport
    moveable: false
    always_on_top: true
    top_order: 1
towns:
  - id: 1
    name: Thais
    temple: { x: 100, y: 100, z: 7 }
waypoints:
  - name: Thais Temple
    position: { x: 100, y: 100, z: 7 }
guilds:
  - id: 3
    name: Red Rose
    ranks:
      - { id: 1, name: Leader }
grounds:
  - ground: 4526
    from: { x: 98, y: 98, z: 7 }
    to: { x: 104, y: 104, z: 7 }
tiles:
  - position: { x: 101, y: 101, z: 7 }
    items:
      - id: 1987
        contents:
          - { id: 3031, count: 30 }
          - { id: 3031, count: 5 }
  - position: { x: 102, y: 102, z: 7 }
    items:
      - id: 1209
        attributes: { door_id: 1 }
  - position: { x: 103, y: 103, z: 7 }
    items:
      - id: 1387
        destination: { x: 100, y: 100, z: 7 }
houses:
  - id: 10
    name: Harbour Place
    entry: { x: 102, y: 103, z: 7 }
    town_id: 1
    rent: 500
    tiles:
      - { x: 102, y: 102, z: 7 }
    guests: "ana\nbruno"
    door_lists:
      1: "carla"
zones:
  - id: 4
    areas:
      - from: { x: 98, y: 98, z: 7 }
        to: { x: 99, y: 99, z: 7 }
"#;

    #[test]
    fn fixture_builds_tiles_houses_and_zones() {
        let mut world = WorldState::new(EngineConfig::default());
        let summary = WorldFixture::from_yaml(WORLD)
            .expect("parse")
            .apply(&mut world)
            .expect("apply");
        assert_eq!(summary.item_types, 5);
        assert_eq!(summary.towns, 1);
        assert_eq!(summary.houses, 1);
        assert_eq!(summary.zones, 1);
        assert_eq!(summary.items, 49 + 3 + 1 + 1);

        let bag_tile = world.map.tile(Position::new(101, 101, 7)).expect("tile");
        assert!(bag_tile.ground.is_some());
        let bag = bag_tile.down_items()[0];
        let contents = world.item(bag).and_then(|entry| entry.container()).expect("bag");
        assert_eq!(contents.size(), 2);
        let first = contents.items[0];
        assert_eq!(world.item(first).map(|coin| coin.count), Some(30));
        assert_eq!(world.item(first).and_then(|coin| coin.parent), Some(CylinderId::Item(bag)));
        assert_eq!(world.item_weight(bag), 1800 + 350);

        let house = world.houses.get(10).expect("house");
        assert_eq!(house.doors.len(), 1);
        assert!(world
            .map
            .tile(Position::new(102, 102, 7))
            .map_or(false, |tile| tile.has_flag(TileFlags::PROTECTIONZONE)));
        assert_eq!(world.house_access_list(10, GUEST_LIST).as_deref(), Some("ana\nbruno"));
        assert_eq!(world.house_access_list(10, 1).as_deref(), Some("carla"));

        let teleport = TileCylinder(Position::new(103, 103, 7))
            .teleport_item(&world)
            .expect("teleport");
        assert_eq!(
            world.item(teleport).map(|entry| entry.variant.clone()),
            Some(ItemVariant::Teleport {
                destination: Position::new(100, 100, 7)
            })
        );
        assert_eq!(world.zones.zones_at(Position::new(99, 98, 7)), vec![4]);
        assert!(world.houses.guilds.by_name("red rose").is_some());
        assert_eq!(world.towns.waypoint("thais temple"), Some(Position::new(100, 100, 7)));
    }

    #[test]
    fn unknown_item_types_are_rejected() {
        let text = "tiles:\n  - position: { x: 1, y: 1, z: 7 }\n    ground: 4526\n";
        let err = WorldState::from_fixture_yaml(EngineConfig::default(), text).unwrap_err();
        assert!(matches!(&err, WorldError::Fixture(message) if message == "unknown item type 4526"));
    }

    #[test]
    fn house_tiles_must_exist() {
        let text = "houses:\n  - id: 1\n    name: Shack\n    entry: { x: 5, y: 5, z: 7 }\n    tiles:\n      - { x: 5, y: 5, z: 7 }\n";
        let err = WorldState::from_fixture_yaml(EngineConfig::default(), text).unwrap_err();
        assert!(matches!(&err, WorldError::Fixture(message) if message.starts_with("no tile at")));
    }

    #[test]
    fn ground_areas_cover_every_corner_order() {
        let area = GroundArea {
            ground: ItemTypeId(1),
            from: Position::new(3, 3, 7),
            to: Position::new(2, 1, 7),
        };
        let positions = area.positions();
        assert_eq!(positions.len(), 6);
        assert!(positions.contains(&Position::new(2, 1, 7)));
        assert!(positions.contains(&Position::new(3, 3, 7)));
    }
}
