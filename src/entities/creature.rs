use crate::entities::inventory::SLOT_LAST;
use crate::entities::item::ItemId;
use crate::world::position::{Direction, Position};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CreatureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatureKind {
    Player,
    Npc,
    Monster,
}

bitflags! {
    /// Damage elements, used both for field items and creature immunities.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CombatTypes: u16 {
        const PHYSICAL = 1 << 0;
        const ENERGY = 1 << 1;
        const EARTH = 1 << 2;
        const FIRE = 1 << 3;
        const LIFEDRAIN = 1 << 4;
        const MANADRAIN = 1 << 5;
        const DROWN = 1 << 6;
        const ICE = 1 << 7;
        const HOLY = 1 << 8;
        const DEATH = 1 << 9;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerData {
    pub guid: u32,
    pub account_id: u32,
    pub guild_id: u32,
    pub guild_rank_id: u32,
    pub town_id: u32,
    pub access: bool,
    pub can_edit_houses: bool,
    pub infinite_capacity: bool,
    pub cannot_pickup: bool,
    pub pz_locked: bool,
    /// Carrying capacity in the same unit as item weights.
    pub capacity: u32,
    /// Indexed by slot number, entry 0 unused.
    pub inventory: [Option<ItemId>; SLOT_LAST as usize + 1],
    pub inbox: Option<ItemId>,
    pub store_inbox: Option<ItemId>,
    pub depot_chests: BTreeMap<u32, ItemId>,
    pub depot_lockers: BTreeMap<u32, ItemId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MonsterData {
    pub immunities: CombatTypes,
    pub walkable_fields: CombatTypes,
    pub can_push_items: bool,
    pub can_push_creatures: bool,
    pub pushable: bool,
    pub summon: bool,
    pub master_is_player: bool,
    pub ignoring_field_damage: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NpcData {
    pub phaseable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creature {
    pub id: CreatureId,
    pub name: String,
    pub kind: CreatureKind,
    pub position: Position,
    pub direction: Direction,
    /// Set while the creature stands on a map tile.
    pub placed: bool,
    pub ghost: bool,
    /// Damage conditions currently applied.
    pub conditions: CombatTypes,
    pub walk_queue: VecDeque<Direction>,
    pub player: Option<PlayerData>,
    pub monster: Option<MonsterData>,
    pub npc: Option<NpcData>,
}

impl Creature {
    fn base(id: CreatureId, name: &str, kind: CreatureKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            position: Position::new(0, 0, 0),
            direction: Direction::South,
            placed: false,
            ghost: false,
            conditions: CombatTypes::empty(),
            walk_queue: VecDeque::new(),
            player: None,
            monster: None,
            npc: None,
        }
    }

    pub fn new_player(id: CreatureId, name: &str, data: PlayerData) -> Self {
        let mut creature = Self::base(id, name, CreatureKind::Player);
        creature.player = Some(data);
        creature
    }

    pub fn new_monster(id: CreatureId, name: &str, data: MonsterData) -> Self {
        let mut creature = Self::base(id, name, CreatureKind::Monster);
        creature.monster = Some(data);
        creature
    }

    pub fn new_npc(id: CreatureId, name: &str, data: NpcData) -> Self {
        let mut creature = Self::base(id, name, CreatureKind::Npc);
        creature.npc = Some(data);
        creature
    }

    pub fn is_player(&self) -> bool {
        self.player.is_some()
    }

    pub fn as_player(&self) -> Option<&PlayerData> {
        self.player.as_ref()
    }

    pub fn as_player_mut(&mut self) -> Option<&mut PlayerData> {
        self.player.as_mut()
    }

    pub fn as_monster(&self) -> Option<&MonsterData> {
        self.monster.as_ref()
    }

    pub fn is_access_player(&self) -> bool {
        self.player.as_ref().map_or(false, |player| player.access)
    }

    pub fn is_immune(&self, combat: CombatTypes) -> bool {
        if combat.is_empty() {
            return false;
        }
        self.monster
            .as_ref()
            .map_or(false, |monster| monster.immunities.contains(combat))
    }

    pub fn has_condition(&self, combat: CombatTypes) -> bool {
        !combat.is_empty() && self.conditions.contains(combat)
    }

    pub fn can_walk_on_field(&self, combat: CombatTypes) -> bool {
        self.monster
            .as_ref()
            .map_or(false, |monster| monster.walkable_fields.contains(combat))
    }

    pub fn can_see(&self, other: &Creature) -> bool {
        !other.ghost || self.is_access_player()
    }

    /// Whether this player may step onto a tile occupied by `other`.
    /// `other_in_protection_zone` tells whether `other` stands on a protection zone.
    pub fn can_walk_through(&self, other: &Creature, other_in_protection_zone: bool) -> bool {
        if self.is_access_player() || other.ghost {
            return true;
        }
        if !other.is_player() {
            return false;
        }
        other_in_protection_zone
    }

    /// Slot item of a player, `None` for other creatures and empty slots.
    pub fn inventory_item(&self, slot: u8) -> Option<ItemId> {
        self.player
            .as_ref()
            .and_then(|player| player.inventory.get(usize::from(slot)).copied().flatten())
    }
}
