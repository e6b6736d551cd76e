use crate::entities::item::{ItemAttributes, ItemId, ItemTypeId, ItemVariant, MAX_STACK};
use crate::error::WorldError;
use crate::persistence::prop_stream::{PropStream, PropWriteStream};
use crate::world::cylinder::{Cylinder, CylinderId, Thing};
use crate::world::item_types::ItemGroup;
use crate::world::position::Position;
use crate::world::state::WorldState;

pub const ATTR_END: u8 = 0;
pub const ATTR_ACTION_ID: u8 = 4;
pub const ATTR_UNIQUE_ID: u8 = 5;
pub const ATTR_TEXT: u8 = 6;
pub const ATTR_DESC: u8 = 7;
pub const ATTR_HOUSEDOORID: u8 = 14;
pub const ATTR_COUNT: u8 = 15;
pub const ATTR_WRITTENBY: u8 = 19;
pub const ATTR_SLEEPERGUID: u8 = 20;
pub const ATTR_CHARGES: u8 = 22;
pub const ATTR_CONTAINER_ITEMS: u8 = 23;
pub const ATTR_WRAPID: u8 = 36;
pub const ATTR_STOREITEM: u8 = 37;

/// Deepest container nesting a saved item may have.
pub const MAX_CONTAINER_DEPTH: u32 = 32;

/// One saved tile, tagged with the house it belongs to. `data` is
/// `x:u16 y:u16 z:u8 count:u32` followed by the items; an item is its type
/// id, `tag value` attributes and a closing `0`. Containers close their
/// attributes with `ATTR_CONTAINER_ITEMS` and a child count instead, then
/// list the children back to front and a final `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HouseTileRecord {
    pub house_id: u32,
    pub data: Vec<u8>,
}

/// Packs records as `house_id:u32 len:u32 data` runs, the on-disk form of
/// the house item store.
pub fn encode_records(records: &[HouseTileRecord]) -> Vec<u8> {
    let mut stream = PropWriteStream::new();
    for record in records {
        stream.write_u32(record.house_id);
        stream.write_u32(record.data.len() as u32);
        stream.write_bytes(&record.data);
    }
    stream.into_vec()
}

pub fn decode_records(data: &[u8]) -> Result<Vec<HouseTileRecord>, WorldError> {
    let mut stream = PropStream::new(data);
    let mut records = Vec::new();
    while !stream.is_empty() {
        let house_id = stream.read_u32()?;
        let len = stream.read_u32()? as usize;
        let data = stream.read_bytes(len)?.to_vec();
        records.push(HouseTileRecord { house_id, data });
    }
    Ok(records)
}

/// Attributes read for one item before it is materialized.
#[derive(Debug, Default)]
struct ItemRecord {
    count: Option<u8>,
    attributes: ItemAttributes,
    children: Option<u32>,
}

fn read_attributes(stream: &mut PropStream<'_>) -> Result<ItemRecord, WorldError> {
    let mut record = ItemRecord::default();
    loop {
        let tag = stream.read_u8()?;
        match tag {
            ATTR_END => break,
            ATTR_COUNT => record.count = Some(stream.read_u8()?),
            ATTR_ACTION_ID => record.attributes.action_id = stream.read_u16()?,
            ATTR_UNIQUE_ID => record.attributes.unique_id = stream.read_u16()?,
            ATTR_TEXT => record.attributes.text = Some(stream.read_string()?),
            ATTR_DESC => record.attributes.description = Some(stream.read_string()?),
            ATTR_WRITTENBY => record.attributes.written_by = Some(stream.read_string()?),
            ATTR_HOUSEDOORID => record.attributes.door_id = stream.read_u8()?,
            ATTR_SLEEPERGUID => record.attributes.sleeper_guid = stream.read_u32()?,
            ATTR_CHARGES => record.attributes.charges = stream.read_u16()?,
            ATTR_WRAPID => record.attributes.wrap_id = stream.read_u16()?,
            ATTR_STOREITEM => record.attributes.store_item = stream.read_u8()? != 0,
            ATTR_CONTAINER_ITEMS => {
                record.children = Some(stream.read_u32()?);
                break;
            }
            other => return Err(WorldError::PropStream(format!("unknown attribute tag {}", other))),
        }
    }
    Ok(record)
}

impl WorldState {
    /// Writes the attributes of `item` that differ from its type's defaults.
    pub fn serialize_item_attributes(&self, item: ItemId, stream: &mut PropWriteStream) {
        let Some(entry) = self.item(item) else {
            return;
        };
        let item_type = self.item_type_of(item);
        let attributes = &entry.attributes;

        if item_type.stackable || item_type.is_splash() {
            stream.write_u8(ATTR_COUNT);
            stream.write_u8(entry.count.min(u16::from(u8::MAX)) as u8);
        }
        if attributes.charges != 0 {
            stream.write_u8(ATTR_CHARGES);
            stream.write_u16(attributes.charges);
        }
        if item_type.moveable && attributes.action_id != 0 {
            stream.write_u8(ATTR_ACTION_ID);
            stream.write_u16(attributes.action_id);
        }
        if let Some(text) = attributes.text.as_deref().filter(|text| !text.is_empty()) {
            stream.write_u8(ATTR_TEXT);
            stream.write_string(text);
        }
        if let Some(writer) = attributes.written_by.as_deref().filter(|writer| !writer.is_empty()) {
            stream.write_u8(ATTR_WRITTENBY);
            stream.write_string(writer);
        }
        if let Some(description) = attributes.description.as_deref().filter(|desc| !desc.is_empty()) {
            stream.write_u8(ATTR_DESC);
            stream.write_string(description);
        }
        match entry.variant {
            ItemVariant::Door { .. } if attributes.door_id != 0 => {
                stream.write_u8(ATTR_HOUSEDOORID);
                stream.write_u8(attributes.door_id);
            }
            ItemVariant::Bed { .. } if attributes.sleeper_guid != 0 => {
                stream.write_u8(ATTR_SLEEPERGUID);
                stream.write_u32(attributes.sleeper_guid);
            }
            _ => {}
        }
        if attributes.wrap_id != 0 {
            stream.write_u8(ATTR_WRAPID);
            stream.write_u16(attributes.wrap_id);
        }
        if attributes.store_item {
            stream.write_u8(ATTR_STOREITEM);
            stream.write_u8(1);
        }
    }

    pub fn save_item(&self, item: ItemId, stream: &mut PropWriteStream) {
        let Some(entry) = self.item(item) else {
            return;
        };
        stream.write_u16(entry.type_id.0);
        self.serialize_item_attributes(item, stream);
        if let Some(data) = entry.container() {
            stream.write_u8(ATTR_CONTAINER_ITEMS);
            stream.write_u32(data.items.len() as u32);
            for child in data.items.iter().rev() {
                self.save_item(*child, stream);
            }
        }
        stream.write_u8(ATTR_END);
    }

    /// Moveable items, doors, beds, non-empty containers and written items
    /// survive a restart.
    fn is_saved_with_tile(&self, item: ItemId) -> bool {
        let Some(entry) = self.item(item) else {
            return false;
        };
        let item_type = self.item_type_of(item);
        item_type.moveable
            || matches!(entry.variant, ItemVariant::Door { .. } | ItemVariant::Bed { .. })
            || entry.container().map_or(false, |data| !data.is_empty())
            || entry.attributes.text.as_deref().map_or(false, |text| !text.is_empty())
    }

    /// Appends one tile record. Returns false when nothing on the tile is
    /// worth saving, in which case nothing is written.
    pub fn save_tile_items(&self, position: Position, stream: &mut PropWriteStream) -> bool {
        let Some(tile) = self.map.tile(position) else {
            return false;
        };
        let items: Vec<ItemId> = tile
            .items()
            .iter()
            .rev()
            .copied()
            .filter(|item| self.is_saved_with_tile(*item))
            .collect();
        if items.is_empty() {
            return false;
        }
        stream.write_u16(position.x);
        stream.write_u16(position.y);
        stream.write_u8(position.z);
        stream.write_u32(items.len() as u32);
        for item in items {
            self.save_item(item, stream);
        }
        true
    }

    /// One record per house tile that holds something worth keeping.
    pub fn save_house_items(&self) -> Vec<HouseTileRecord> {
        let mut records = Vec::new();
        let mut stream = PropWriteStream::new();
        for house in self.houses.iter() {
            for position in &house.tiles {
                if self.save_tile_items(*position, &mut stream) {
                    records.push(HouseTileRecord {
                        house_id: house.id,
                        data: stream.as_slice().to_vec(),
                    });
                    stream.clear();
                }
            }
        }
        log::info!(target: "houses", "saved {} house tile records", records.len());
        records
    }

    /// Restores saved house tiles. Records for tiles that no longer exist
    /// are skipped; a damaged record stops at the damaged item. Returns the
    /// number of items read.
    pub fn load_house_items(&mut self, records: &[HouseTileRecord]) -> usize {
        let mut loaded = 0;
        for record in records {
            match self.load_tile_record(&record.data) {
                Ok(count) => loaded += count,
                Err(err) => {
                    log::warn!(target: "houses", "house {} tile record: {}", record.house_id, err);
                }
            }
        }
        log::info!(target: "houses", "loaded {} house items", loaded);
        loaded
    }

    fn load_tile_record(&mut self, data: &[u8]) -> Result<usize, WorldError> {
        let mut stream = PropStream::new(data);
        let position = Position::new(stream.read_u16()?, stream.read_u16()?, stream.read_u8()?);
        if self.map.tile(position).is_none() {
            log::debug!(target: "houses", "saved tile {} is gone, skipping", position);
            return Ok(0);
        }
        let count = stream.read_u32()?;
        for loaded in 0..count {
            if let Err(err) = self.load_item(&mut stream, CylinderId::Tile(position), 0) {
                log::warn!(target: "houses", "item {} of tile {}: {}", loaded, position, err);
                return Ok(loaded as usize);
            }
        }
        Ok(count as usize)
    }

    /// Reads one item into `parent`. On a tile, stationary items such as
    /// doors and beds are matched against what the map already holds and
    /// only get their attributes back.
    fn load_item(&mut self, stream: &mut PropStream<'_>, parent: CylinderId, depth: u32) -> Result<(), WorldError> {
        let type_id = ItemTypeId(stream.read_u16()?);
        let record = read_attributes(stream)?;
        let on_tile = parent.as_tile();
        let stationary = on_tile.is_some() && !self.item_types.get_or_default(type_id).moveable;

        if !stationary {
            let item = self.create_item(type_id, u16::from(record.count.unwrap_or(1)));
            self.apply_record(item, &record);
            if let Err(err) = self.load_children(stream, item, &record, depth) {
                self.release_item(item);
                return Err(err);
            }
            parent.internal_add_thing(self, 0, Thing::Item(item));
            return Ok(());
        }

        match on_tile.and_then(|position| self.stationary_match(position, type_id)) {
            Some(existing) => {
                self.apply_record(existing, &record);
                self.load_children(stream, existing, &record, depth)?;
                let door_id = record.attributes.door_id;
                let house_id = on_tile
                    .and_then(|position| self.map.tile(position))
                    .and_then(|tile| tile.house_id);
                self.transform_item(existing, type_id, -1);
                if let (Some(house_id), true) = (house_id, door_id != 0) {
                    self.register_house_door(house_id, existing, door_id);
                }
            }
            None => {
                // The map changed since the save; read the item and drop it.
                let dummy = self.create_item(type_id, 1);
                self.apply_record(dummy, &record);
                let children = self.load_children(stream, dummy, &record, depth);
                self.release_item(dummy);
                children?;
            }
        }
        Ok(())
    }

    fn load_children(
        &mut self,
        stream: &mut PropStream<'_>,
        item: ItemId,
        record: &ItemRecord,
        depth: u32,
    ) -> Result<(), WorldError> {
        let Some(children) = record.children else {
            return Ok(());
        };
        if depth >= MAX_CONTAINER_DEPTH {
            return Err(WorldError::PropStream(format!(
                "containers nested deeper than {}",
                MAX_CONTAINER_DEPTH
            )));
        }
        let is_container = self.item(item).map_or(false, |entry| entry.is_container());
        if !is_container {
            return Err(WorldError::PropStream(format!("item {} is not a container", item.0)));
        }
        for _ in 0..children {
            self.load_item(stream, CylinderId::Item(item), depth + 1)?;
        }
        match stream.read_u8()? {
            ATTR_END => Ok(()),
            other => Err(WorldError::PropStream(format!("container end expected, found {}", other))),
        }
    }

    fn apply_record(&mut self, item: ItemId, record: &ItemRecord) {
        let stackable = self.item_type_of(item).stackable;
        let Some(entry) = self.item_mut(item) else {
            return;
        };
        if let (Some(count), true) = (record.count, stackable) {
            entry.count = u16::from(count).clamp(1, MAX_STACK);
        }
        entry.attributes = record.attributes.clone();
    }

    fn stationary_match(&self, position: Position, type_id: ItemTypeId) -> Option<ItemId> {
        let tile = self.map.tile(position)?;
        let group = self.item_types.get_or_default(type_id).group;
        let wanted_door = group == ItemGroup::Door;
        let wanted_bed = group == ItemGroup::Bed;
        tile.items().iter().copied().find(|candidate| {
            let Some(entry) = self.item(*candidate) else {
                return false;
            };
            entry.type_id == type_id
                || (wanted_door && matches!(entry.variant, ItemVariant::Door { .. }))
                || (wanted_bed && matches!(entry.variant, ItemVariant::Bed { .. }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::container::ContainerCylinder;
    use crate::world::housing::House;
    use crate::world::state::test_support::{fixture, BAG, BED, COIN, DOOR, SWORD, WALL};
    use crate::world::tile::TileCylinder;

    const HOUSE_TILE: (u16, u16, u8) = (104, 100, 7);

    fn house_world() -> (WorldState, Position) {
        let mut world = fixture();
        let position = Position::new(HOUSE_TILE.0, HOUSE_TILE.1, HOUSE_TILE.2);
        world
            .houses
            .add(House::new(7, "Lakeside", position, 1))
            .expect("house");
        let door = world.create_item(DOOR, 1);
        if let Some(entry) = world.item_mut(door) {
            entry.attributes.door_id = 2;
        }
        TileCylinder(position).add_thing(&mut world, 0, Thing::Item(door));
        world.add_house_tile(7, position).expect("house tile");
        (world, position)
    }

    #[test]
    fn containers_write_children_back_to_front() {
        let mut world = fixture();
        let bag = world.create_item(BAG, 1);
        let sword = world.create_item(SWORD, 1);
        let coins = world.create_item(COIN, 25);
        ContainerCylinder(bag).add_item_back(&mut world, sword);
        ContainerCylinder(bag).add_item_back(&mut world, coins);

        let mut stream = PropWriteStream::new();
        world.save_item(bag, &mut stream);
        let parts: [&[u8]; 7] = [
            &BAG.0.to_le_bytes()[..],
            &[ATTR_CONTAINER_ITEMS, 2, 0, 0, 0],
            &COIN.0.to_le_bytes()[..],
            &[ATTR_COUNT, 25, ATTR_END],
            &SWORD.0.to_le_bytes()[..],
            &[ATTR_END],
            &[ATTR_END],
        ];
        assert_eq!(stream.as_slice(), parts.concat().as_slice());
    }

    #[test]
    fn house_items_survive_a_save_and_load() {
        let (mut world, position) = house_world();
        let bag = world.create_item(BAG, 1);
        let coins = world.create_item(COIN, 40);
        let sword = world.create_item(SWORD, 1);
        ContainerCylinder(bag).add_item_back(&mut world, coins);
        ContainerCylinder(bag).add_item_back(&mut world, sword);
        TileCylinder(position).add_thing(&mut world, 0, Thing::Item(bag));
        let wall = world.create_item(WALL, 1);
        TileCylinder(position).add_thing(&mut world, 0, Thing::Item(wall));

        let records = world.save_house_items();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].house_id, 7);

        let (mut restored, _) = house_world();
        let loaded = restored.load_house_items(&records);
        assert_eq!(loaded, 2);

        let tile = restored.map.tile(position).expect("tile");
        let door_count = tile
            .items()
            .iter()
            .filter(|item| restored.item(**item).map_or(false, |entry| entry.type_id == DOOR))
            .count();
        assert_eq!(door_count, 1);
        let bag = tile
            .items()
            .iter()
            .copied()
            .find(|item| restored.item(*item).map_or(false, |entry| entry.type_id == BAG))
            .expect("bag restored");
        let contents: Vec<ItemTypeId> = restored
            .item(bag)
            .and_then(|entry| entry.container())
            .map(|data| {
                data.items
                    .iter()
                    .filter_map(|item| restored.item(*item).map(|child| child.type_id))
                    .collect()
            })
            .unwrap_or_default();
        assert_eq!(contents, vec![COIN, SWORD]);
        let coin_count = restored
            .item(bag)
            .and_then(|entry| entry.container())
            .and_then(|data| data.item_at(0))
            .and_then(|coin| restored.item(coin))
            .map(|coin| coin.count);
        assert_eq!(coin_count, Some(40));
    }

    #[test]
    fn stationary_items_get_their_attributes_back() {
        let (mut world, position) = house_world();
        let bed = world.create_item(BED, 1);
        TileCylinder(position).add_thing(&mut world, 0, Thing::Item(bed));
        if let Some(entry) = world.item_mut(bed) {
            entry.attributes.sleeper_guid = 12;
        }
        let records = world.save_house_items();

        let (mut restored, _) = house_world();
        let fresh_bed = restored.create_item(BED, 1);
        TileCylinder(position).add_thing(&mut restored, 0, Thing::Item(fresh_bed));
        let door = restored.house_door_by_number(7, 2).expect("door");
        restored.load_house_items(&records);

        assert_eq!(restored.item(fresh_bed).map(|entry| entry.attributes.sleeper_guid), Some(12));
        assert_eq!(restored.item(door).map(|entry| entry.attributes.door_id), Some(2));
        assert_eq!(restored.map.tile(position).map(|tile| tile.item_count()), Some(2));
    }

    #[test]
    fn record_files_keep_house_ids() {
        let records = vec![
            HouseTileRecord {
                house_id: 7,
                data: vec![1, 2, 3],
            },
            HouseTileRecord {
                house_id: 9,
                data: Vec::new(),
            },
        ];
        let bytes = encode_records(&records);
        assert_eq!(bytes.len(), 8 + 3 + 8);
        assert_eq!(decode_records(&bytes).expect("decode"), records);
        assert!(decode_records(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn damaged_records_are_skipped() {
        let (mut world, _) = house_world();
        let mut stream = PropWriteStream::new();
        stream.write_u16(HOUSE_TILE.0);
        stream.write_u16(HOUSE_TILE.1);
        stream.write_u8(HOUSE_TILE.2);
        stream.write_u32(1);
        stream.write_u16(COIN.0);
        stream.write_u8(99);
        let records = vec![HouseTileRecord {
            house_id: 7,
            data: stream.into_vec(),
        }];
        assert_eq!(world.load_house_items(&records), 0);

        let mut unknown = PropWriteStream::new();
        unknown.write_u16(1);
        unknown.write_u16(1);
        unknown.write_u8(7);
        unknown.write_u32(0);
        let records = vec![HouseTileRecord {
            house_id: 7,
            data: unknown.into_vec(),
        }];
        assert_eq!(world.load_house_items(&records), 0);
    }

    fn nested_bags(depth: usize) -> Vec<HouseTileRecord> {
        let mut stream = PropWriteStream::new();
        stream.write_u16(HOUSE_TILE.0);
        stream.write_u16(HOUSE_TILE.1);
        stream.write_u8(HOUSE_TILE.2);
        stream.write_u32(1);
        for level in 0..depth {
            stream.write_u16(BAG.0);
            if level + 1 < depth {
                stream.write_u8(ATTR_CONTAINER_ITEMS);
                stream.write_u32(1);
            } else {
                stream.write_u8(ATTR_END);
            }
        }
        for _ in 1..depth {
            stream.write_u8(ATTR_END);
        }
        vec![HouseTileRecord {
            house_id: 7,
            data: stream.into_vec(),
        }]
    }

    #[test]
    fn container_nesting_is_bounded() {
        let (mut world, _) = house_world();
        let before = world.item_count();
        assert_eq!(world.load_house_items(&nested_bags(8)), 1);
        assert_eq!(world.item_count(), before + 8);

        let before = world.item_count();
        let too_deep = nested_bags(MAX_CONTAINER_DEPTH as usize + 8);
        assert_eq!(world.load_house_items(&too_deep), 0);
        assert_eq!(world.item_count(), before);
    }
}
