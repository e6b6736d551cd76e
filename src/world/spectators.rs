use crate::entities::creature::CreatureId;
use crate::world::position::Position;
use crate::world::qtree::{FLOOR_SIZE, MAP_MAX_LAYERS};
use crate::world::state::WorldState;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;

pub const MAX_VIEWPORT_X: i32 = 11;
pub const MAX_VIEWPORT_Y: i32 = 11;
pub const MAX_CLIENT_VIEWPORT_X: i32 = 8;
pub const MAX_CLIENT_VIEWPORT_Y: i32 = 6;

const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Normalized query shape. Ranges are signed offsets from the center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpectatorKey {
    pub center: Position,
    pub min_range_x: i32,
    pub max_range_x: i32,
    pub min_range_y: i32,
    pub max_range_y: i32,
    pub multifloor: bool,
    pub only_players: bool,
}

impl SpectatorKey {
    /// Zero ranges stand for the default viewport; non-zero minimums are
    /// given as distances and negated here.
    pub fn new(
        center: Position,
        multifloor: bool,
        only_players: bool,
        min_range_x: i32,
        max_range_x: i32,
        min_range_y: i32,
        max_range_y: i32,
    ) -> Self {
        Self {
            center,
            min_range_x: if min_range_x == 0 { -MAX_VIEWPORT_X } else { -min_range_x },
            max_range_x: if max_range_x == 0 { MAX_VIEWPORT_X } else { max_range_x },
            min_range_y: if min_range_y == 0 { -MAX_VIEWPORT_Y } else { -min_range_y },
            max_range_y: if max_range_y == 0 { MAX_VIEWPORT_Y } else { max_range_y },
            multifloor,
            only_players,
        }
    }

    pub fn is_full_viewport(&self) -> bool {
        self.multifloor
            && self.min_range_x == -MAX_VIEWPORT_X
            && self.max_range_x == MAX_VIEWPORT_X
            && self.min_range_y == -MAX_VIEWPORT_Y
            && self.max_range_y == MAX_VIEWPORT_Y
    }

    /// Inclusive floor range visible from the center.
    pub fn floor_range(&self) -> (u8, u8) {
        let z = self.center.z;
        if !self.multifloor {
            return (z, z);
        }
        if z > 7 {
            (z.saturating_sub(2), (z + 2).min(MAP_MAX_LAYERS - 1))
        } else if z == 6 {
            (0, 8)
        } else if z == 7 {
            (0, 9)
        } else {
            (0, 7)
        }
    }

    /// Whether `position` lies in the box, shifted by one tile per floor of
    /// difference to mimic the client's perspective.
    pub fn covers(&self, position: Position) -> bool {
        let (min_z, max_z) = self.floor_range();
        if position.z < min_z || position.z > max_z {
            return false;
        }
        let offset_z = i32::from(self.center.z) - i32::from(position.z);
        let (x, y) = (i32::from(position.x), i32::from(position.y));
        let (cx, cy) = (i32::from(self.center.x), i32::from(self.center.y));
        x >= cx + self.min_range_x + offset_z
            && x <= cx + self.max_range_x + offset_z
            && y >= cy + self.min_range_y + offset_z
            && y <= cy + self.max_range_y + offset_z
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64)
        }
    }
}

pub struct SpectatorCache {
    chunks: LruCache<SpectatorKey, Vec<CreatureId>>,
    viewport: HashMap<Position, Vec<CreatureId>>,
    players_viewport: HashMap<Position, Vec<CreatureId>>,
    stats: CacheStats,
}

impl std::fmt::Debug for SpectatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectatorCache")
            .field("chunks", &self.chunks.len())
            .field("viewport", &self.viewport.len())
            .field("players_viewport", &self.players_viewport.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for SpectatorCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl SpectatorCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            chunks: LruCache::new(capacity),
            viewport: HashMap::new(),
            players_viewport: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn clear_chunks(&mut self) {
        self.chunks.clear();
    }

    pub fn clear_viewport(&mut self) {
        self.viewport.clear();
    }

    pub fn clear_players_viewport(&mut self) {
        self.players_viewport.clear();
    }

    pub fn clear(&mut self) {
        self.clear_chunks();
        self.clear_viewport();
        self.clear_players_viewport();
    }

    fn lookup(&mut self, key: &SpectatorKey, world_creature_is_player: impl Fn(CreatureId) -> bool) -> Option<Vec<CreatureId>> {
        if let Some(found) = self.chunks.get(key) {
            self.stats.hits += 1;
            return Some(found.clone());
        }
        if key.is_full_viewport() {
            if key.only_players {
                if let Some(found) = self.players_viewport.get(&key.center) {
                    self.stats.hits += 1;
                    return Some(found.clone());
                }
            }
            if let Some(found) = self.viewport.get(&key.center) {
                self.stats.hits += 1;
                let found = if key.only_players {
                    found.iter().copied().filter(|id| world_creature_is_player(*id)).collect()
                } else {
                    found.clone()
                };
                return Some(found);
            }
        }
        self.stats.misses += 1;
        None
    }

    fn store(&mut self, key: SpectatorKey, spectators: &[CreatureId]) {
        if key.is_full_viewport() {
            let tier = if key.only_players {
                &mut self.players_viewport
            } else {
                &mut self.viewport
            };
            tier.insert(key.center, spectators.to_vec());
        }
        if self.chunks.push(key, spectators.to_vec()).is_some() {
            self.stats.evictions += 1;
        }
    }
}

impl WorldState {
    /// Creatures observing `center`. Zero ranges mean the default viewport.
    #[allow(clippy::too_many_arguments)]
    pub fn get_spectators(
        &mut self,
        center: Position,
        multifloor: bool,
        only_players: bool,
        min_range_x: i32,
        max_range_x: i32,
        min_range_y: i32,
        max_range_y: i32,
    ) -> Vec<CreatureId> {
        if center.z >= MAP_MAX_LAYERS {
            return Vec::new();
        }
        let key = SpectatorKey::new(
            center,
            multifloor,
            only_players,
            min_range_x,
            max_range_x,
            min_range_y,
            max_range_y,
        );
        let creatures = &self.creatures;
        let cached = self.map.spectators.lookup(&key, |id| {
            creatures.get(&id).map_or(false, |creature| creature.is_player())
        });
        if let Some(found) = cached {
            return found;
        }
        let found = self.collect_spectators(&key);
        self.map.spectators.store(key, &found);
        found
    }

    /// Same as [`WorldState::get_spectators`] without touching the caches.
    #[allow(clippy::too_many_arguments)]
    pub fn spectators_uncached(
        &self,
        center: Position,
        multifloor: bool,
        only_players: bool,
        min_range_x: i32,
        max_range_x: i32,
        min_range_y: i32,
        max_range_y: i32,
    ) -> Vec<CreatureId> {
        if center.z >= MAP_MAX_LAYERS {
            return Vec::new();
        }
        let key = SpectatorKey::new(
            center,
            multifloor,
            only_players,
            min_range_x,
            max_range_x,
            min_range_y,
            max_range_y,
        );
        self.collect_spectators(&key)
    }

    /// Walks the leaves under the widest floor's box row by row, following
    /// the east and south links and descending from the root only where a
    /// link is missing.
    fn collect_spectators(&self, key: &SpectatorKey) -> Vec<CreatureId> {
        let (min_z, max_z) = key.floor_range();
        let center = key.center;
        let min_offset = i32::from(center.z) - i32::from(max_z);
        let max_offset = i32::from(center.z) - i32::from(min_z);
        let clamp = |value: i32| value.clamp(0, i32::from(u16::MAX));
        let x1 = clamp(i32::from(center.x) + key.min_range_x + min_offset);
        let y1 = clamp(i32::from(center.y) + key.min_range_y + min_offset);
        let x2 = clamp(i32::from(center.x) + key.max_range_x + max_offset);
        let y2 = clamp(i32::from(center.y) + key.max_range_y + max_offset);

        let size = i32::from(FLOOR_SIZE);
        let start_x = x1 - x1 % size;
        let start_y = y1 - y1 % size;
        let end_x = x2 - x2 % size;
        let end_y = y2 - y2 % size;

        let qtree = &self.map.qtree;
        let mut found = Vec::new();
        let mut leaf_s = qtree.get_leaf(start_x as u32, start_y as u32);
        let mut ny = start_y;
        while ny <= end_y {
            let mut leaf_e = leaf_s;
            let mut nx = start_x;
            while nx <= end_x {
                match leaf_e {
                    Some(id) => {
                        let leaf = qtree.leaf(id);
                        let list = if key.only_players {
                            &leaf.player_list
                        } else {
                            &leaf.creature_list
                        };
                        for creature in list {
                            let covered = self
                                .creatures
                                .get(creature)
                                .map_or(false, |entry| key.covers(entry.position));
                            if covered {
                                found.push(*creature);
                            }
                        }
                        leaf_e = leaf.leaf_e;
                    }
                    None => {
                        leaf_e = qtree.get_leaf((nx + size) as u32, ny as u32);
                    }
                }
                nx += size;
            }
            leaf_s = match leaf_s {
                Some(id) => qtree.leaf(id).leaf_s,
                None => qtree.get_leaf(start_x as u32, (ny + size) as u32),
            };
            ny += size;
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::test_support::{fixture, spawn_monster, spawn_player};

    #[test]
    fn default_viewport_respects_floor_perspective() {
        let mut world = fixture();
        let center = Position::new(100, 100, 7);
        let near = spawn_player(&mut world, "Near", (110, 110, 7));
        let far = spawn_player(&mut world, "Far", (112, 100, 7));
        let below = spawn_player(&mut world, "Below", (98, 98, 8));
        let rat = spawn_monster(&mut world, "rat", (95, 100, 7));

        let all = world.get_spectators(center, true, false, 0, 0, 0, 0);
        assert!(all.contains(&near));
        assert!(!all.contains(&far));
        assert!(all.contains(&below));
        assert!(all.contains(&rat));

        let players = world.get_spectators(center, true, true, 0, 0, 0, 0);
        assert!(!players.contains(&rat));
        assert!(players.contains(&near));

        let same_floor = world.get_spectators(center, false, false, 0, 0, 0, 0);
        assert!(!same_floor.contains(&below));
    }

    #[test]
    fn every_returned_creature_is_inside_the_box() {
        let mut world = fixture();
        let center = Position::new(100, 100, 7);
        let mut spawned = Vec::new();
        for (i, (x, y, z)) in [
            (86, 86, 7),
            (89, 89, 7),
            (111, 111, 7),
            (112, 111, 7),
            (100, 120, 6),
            (87, 87, 8),
            (101, 101, 10),
        ]
        .into_iter()
        .enumerate()
        {
            spawned.push(spawn_player(&mut world, &format!("p{i}"), (x, y, z)));
        }
        let key = SpectatorKey::new(center, true, false, 0, 0, 0, 0);
        let found = world.spectators_uncached(center, true, false, 0, 0, 0, 0);
        for id in &spawned {
            let position = world.creature(*id).map(|c| c.position).expect("creature");
            assert_eq!(found.contains(id), key.covers(position), "at {position}");
        }
    }

    #[test]
    fn repeated_queries_hit_the_cache_until_cleared() {
        let mut world = fixture();
        let center = Position::new(100, 100, 7);
        let _ = spawn_player(&mut world, "Ana", (101, 100, 7));
        world.map.spectators.clear();
        let hits_before = world.map.spectators.stats().hits;

        let first = world.get_spectators(center, false, false, 2, 2, 2, 2);
        let second = world.get_spectators(center, false, false, 2, 2, 2, 2);
        assert_eq!(first, second);
        assert_eq!(world.map.spectators.stats().hits, hits_before + 1);

        let bob = spawn_player(&mut world, "Bob", (99, 99, 7));
        let third = world.get_spectators(center, false, false, 2, 2, 2, 2);
        assert!(third.contains(&bob));
    }

    #[test]
    fn custom_ranges_are_distances_from_the_center() {
        let key = SpectatorKey::new(Position::new(50, 50, 7), false, true, 1, 1, 1, 1);
        assert!(key.covers(Position::new(49, 51, 7)));
        assert!(!key.covers(Position::new(48, 50, 7)));
        assert!(!key.covers(Position::new(50, 50, 6)));
        assert!(!key.is_full_viewport());
    }
}
