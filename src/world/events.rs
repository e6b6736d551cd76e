use crate::entities::creature::CreatureId;
use crate::entities::item::ItemId;
use crate::world::cylinder::{CylinderId, CylinderLink, Thing};
use crate::world::position::{Direction, Position};

/// Client-visible consequences of world mutations. The network layer drains
/// them after each tick and turns them into packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    CreatureAppeared {
        creature: CreatureId,
        position: Position,
        spectators: Vec<CreatureId>,
    },
    CreatureMoved {
        creature: CreatureId,
        from: Position,
        to: Position,
        old_stack_pos: i32,
        /// The client must redraw the whole map instead of sliding.
        teleport: bool,
        spectators: Vec<CreatureId>,
    },
    CreatureRemoved {
        creature: CreatureId,
        position: Position,
        stack_pos: i32,
        spectators: Vec<CreatureId>,
    },
    CreatureTurned {
        creature: CreatureId,
        direction: Direction,
        spectators: Vec<CreatureId>,
    },
    TileItemAdded {
        position: Position,
        item: ItemId,
        spectators: Vec<CreatureId>,
    },
    TileItemUpdated {
        position: Position,
        stack_pos: i32,
        item: ItemId,
        spectators: Vec<CreatureId>,
    },
    TileItemRemoved {
        position: Position,
        stack_pos: i32,
        item: ItemId,
        spectators: Vec<CreatureId>,
    },
    /// More things on the tile than a client stack can show.
    TileRefreshed {
        position: Position,
        spectators: Vec<CreatureId>,
    },
    ContainerItemAdded {
        container: ItemId,
        item: ItemId,
        spectators: Vec<CreatureId>,
    },
    ContainerItemUpdated {
        container: ItemId,
        slot: u32,
        item: ItemId,
        spectators: Vec<CreatureId>,
    },
    ContainerItemRemoved {
        container: ItemId,
        slot: u32,
        spectators: Vec<CreatureId>,
    },
    InventoryChanged {
        player: CreatureId,
        slot: u8,
        item: Option<ItemId>,
    },
    PlayerStats {
        player: CreatureId,
        free_capacity: u32,
    },
    ThingAdded {
        observer: CreatureId,
        cylinder: CylinderId,
        thing: Thing,
        link: CylinderLink,
    },
    ThingRemoved {
        observer: CreatureId,
        cylinder: CylinderId,
        thing: Thing,
        link: CylinderLink,
    },
}

impl WorldEvent {
    /// Whether `player` should receive this event.
    pub fn concerns(&self, player: CreatureId) -> bool {
        match self {
            WorldEvent::CreatureAppeared { spectators, .. }
            | WorldEvent::CreatureMoved { spectators, .. }
            | WorldEvent::CreatureRemoved { spectators, .. }
            | WorldEvent::CreatureTurned { spectators, .. }
            | WorldEvent::TileItemAdded { spectators, .. }
            | WorldEvent::TileItemUpdated { spectators, .. }
            | WorldEvent::TileItemRemoved { spectators, .. }
            | WorldEvent::TileRefreshed { spectators, .. }
            | WorldEvent::ContainerItemAdded { spectators, .. }
            | WorldEvent::ContainerItemUpdated { spectators, .. }
            | WorldEvent::ContainerItemRemoved { spectators, .. } => spectators.contains(&player),
            WorldEvent::InventoryChanged { player: target, .. }
            | WorldEvent::PlayerStats { player: target, .. } => *target == player,
            WorldEvent::ThingAdded { observer, .. } | WorldEvent::ThingRemoved { observer, .. } => {
                *observer == player
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Vec<WorldEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: WorldEvent) {
        self.pending.push(event);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldEvent> {
        self.pending.iter()
    }

    pub fn drain(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Removes and returns the events addressed to `player`, keeping the rest queued.
    pub fn take_for(&mut self, player: CreatureId) -> Vec<WorldEvent> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let (ready, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|event| event.concerns(player));
        self.pending = remaining;
        ready
    }
}
