use crate::entities::creature::CreatureId;
use crate::world::cylinder::{Cylinder, CylinderFlags, CylinderId, ReturnValue, Thing};
use crate::world::events::WorldEvent;
use crate::world::position::{Direction, Position};
use crate::world::qtree::MAP_MAX_LAYERS;
use crate::world::state::WorldState;
use crate::world::tile::{TileCylinder, TileFlags};

impl WorldState {
    /// Turns a creature and tells the players that can see it.
    pub fn turn_creature(&mut self, creature: CreatureId, direction: Direction) -> bool {
        let Some(entry) = self.creature_mut(creature) else {
            return false;
        };
        if entry.direction == direction {
            return false;
        }
        entry.direction = direction;
        let position = entry.position;
        let spectators: Vec<CreatureId> = self
            .get_spectators(position, true, true, 0, 0, 0, 0)
            .into_iter()
            .collect();
        self.events.push(WorldEvent::CreatureTurned {
            creature,
            direction,
            spectators,
        });
        true
    }

    /// One step in `direction`. Players walking orthogonally climb onto a
    /// floor above when standing on three height items, and step down onto
    /// a lower floor's stacked items the same way.
    pub fn internal_move_creature_dir(
        &mut self,
        creature: CreatureId,
        direction: Direction,
        mut flags: CylinderFlags,
    ) -> ReturnValue {
        let Some(entry) = self.creature(creature).filter(|entry| entry.placed) else {
            return ReturnValue::NotPossible;
        };
        let current = entry.position;
        let is_player = entry.is_player();
        let Some(mut destination) = current.step(direction) else {
            return ReturnValue::NotPossible;
        };

        if is_player && !direction.is_diagonal() {
            if current.z != 8 && current.z > 0 && TileCylinder(current).has_height(self, 3) {
                let above = Position::new(current.x, current.y, current.z - 1);
                let open_above = self.map.tile(above).map_or(true, |tile| {
                    tile.ground.is_none() && !tile.has_flag(TileFlags::BLOCKSOLID)
                });
                if open_above {
                    let target = Position::new(destination.x, destination.y, destination.z - 1);
                    let landing = self.map.tile(target).filter(|tile| {
                        tile.ground.is_some() && !tile.has_flag(TileFlags::IMMOVABLEBLOCKSOLID)
                    });
                    if let Some(landing) = landing {
                        flags |= CylinderFlags::IGNOREBLOCKITEM | CylinderFlags::IGNOREBLOCKCREATURE;
                        if !landing.has_flag(TileFlags::FLOORCHANGE) {
                            if let Some(entry) = self.creature_mut(creature) {
                                entry.direction = direction;
                            }
                            destination.z -= 1;
                        }
                    }
                }
            }

            if current.z != 7 && current.z == destination.z && destination.z + 1 < MAP_MAX_LAYERS {
                let open_here = self.map.tile(destination).map_or(true, |tile| {
                    tile.ground.is_none() && !tile.has_flag(TileFlags::BLOCKSOLID)
                });
                if open_here {
                    let below = Position::new(destination.x, destination.y, destination.z + 1);
                    let climbable = self.map.tile(below).map_or(false, |tile| {
                        !tile.has_flag(TileFlags::IMMOVABLEBLOCKSOLID)
                    }) && TileCylinder(below).has_height(self, 3);
                    if climbable {
                        flags |= CylinderFlags::IGNOREBLOCKITEM | CylinderFlags::IGNOREBLOCKCREATURE;
                        if let Some(entry) = self.creature_mut(creature) {
                            entry.direction = direction;
                        }
                        destination.z += 1;
                    }
                }
            }
        }

        if !self.map.has_tile(destination) {
            return ReturnValue::NotPossible;
        }
        self.internal_move_creature(creature, destination, flags)
    }

    /// Validates and performs a walk onto `to`, then follows floor changes
    /// and teleports from there.
    pub fn internal_move_creature(
        &mut self,
        creature: CreatureId,
        to: Position,
        flags: CylinderFlags,
    ) -> ReturnValue {
        let target = TileCylinder(to);
        let ret = target.query_add(self, 0, Thing::Creature(creature), 1, flags, None);
        if !ret.is_ok() {
            return ret;
        }

        self.move_creature(creature, to, false);
        if self.creature(creature).map(|entry| entry.position) != Some(to) {
            return ReturnValue::NoError;
        }

        let mut current = to;
        let mut previous = None;
        let mut flags = flags;
        for _ in 0..MAP_MAX_LAYERS {
            let mut index = 0;
            let mut dest_item = None;
            let next = TileCylinder(current).query_destination(
                self,
                &mut index,
                Thing::Creature(creature),
                &mut dest_item,
                &mut flags,
            );
            let Some(next) = next.as_tile().filter(|next| *next != current) else {
                break;
            };
            self.move_creature(creature, next, false);
            if self.creature(creature).map(|entry| entry.position) != Some(next) {
                previous = None;
                break;
            }
            previous = Some(current);
            current = next;
            flags = CylinderFlags::empty();
        }

        if let Some(from) = previous {
            if from.z != current.z && (from.x != current.x || from.y != current.y) {
                if let Some(direction) = from.direction_to(current).filter(|dir| !dir.is_diagonal()) {
                    self.turn_creature(creature, direction);
                }
            }
        }
        ReturnValue::NoError
    }

    /// Puts a creature or item at `to` regardless of distance. Creatures skip
    /// every tile check; items go through the regular move path.
    pub fn internal_teleport(
        &mut self,
        thing: Thing,
        to: Position,
        push_move: bool,
        flags: CylinderFlags,
    ) -> ReturnValue {
        if !self.map.has_tile(to) {
            return ReturnValue::NotPossible;
        }
        match thing {
            Thing::Creature(creature) => {
                let Some(entry) = self.creature(creature) else {
                    return ReturnValue::NotPossible;
                };
                if !entry.placed {
                    return ReturnValue::NotPossible;
                }
                if entry.position == to {
                    return ReturnValue::NoError;
                }
                let ret = TileCylinder(to).query_add(
                    self,
                    0,
                    thing,
                    1,
                    CylinderFlags::NOLIMIT,
                    None,
                );
                if !ret.is_ok() {
                    return ret;
                }
                self.move_creature(creature, to, !push_move);
                ReturnValue::NoError
            }
            Thing::Item(item) => {
                let Some(entry) = self.item(item) else {
                    return ReturnValue::NotPossible;
                };
                let Some(from) = entry.parent else {
                    return ReturnValue::NotPossible;
                };
                if from == CylinderId::Tile(to) {
                    return ReturnValue::NoError;
                }
                let count = u32::from(entry.count);
                let (ret, _) = self.internal_move_item(
                    from,
                    CylinderId::Tile(to),
                    crate::world::cylinder::INDEX_WHEREEVER,
                    item,
                    count,
                    flags,
                    None,
                );
                ret
            }
        }
    }

    /// Queues a walk. `directions` is consumed from its back, matching what
    /// pathfinding returns.
    pub fn start_auto_walk(&mut self, creature: CreatureId, directions: Vec<Direction>) -> bool {
        let Some(entry) = self.creature_mut(creature) else {
            return false;
        };
        entry.walk_queue.clear();
        entry.walk_queue.extend(directions);
        !entry.walk_queue.is_empty()
    }

    /// Takes the next queued step and performs it. A failed step drops the
    /// rest of the queue.
    pub fn next_walk_step(&mut self, creature: CreatureId) -> Option<(Direction, ReturnValue)> {
        let direction = self.creature_mut(creature)?.walk_queue.pop_back()?;
        let mut flags = CylinderFlags::empty();
        if self.creature(creature).map_or(false, |entry| !entry.is_player()) {
            flags |= CylinderFlags::IGNOREFIELDDAMAGE;
        }
        let ret = self.internal_move_creature_dir(creature, direction, flags);
        if !ret.is_ok() {
            log::trace!("walk of creature {} aborted: {}", creature.0, ret);
            if let Some(entry) = self.creature_mut(creature) {
                entry.walk_queue.clear();
            }
        }
        Some((direction, ret))
    }

    /// Walks the whole queue, returning the number of steps taken.
    pub fn walk_queue_to_end(&mut self, creature: CreatureId) -> usize {
        let mut steps = 0;
        while let Some((_, ret)) = self.next_walk_step(creature) {
            if !ret.is_ok() {
                break;
            }
            steps += 1;
        }
        steps
    }
}
