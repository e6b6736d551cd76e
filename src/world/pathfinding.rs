use crate::entities::creature::CreatureId;
use crate::world::cylinder::{Cylinder, CylinderFlags, Thing};
use crate::world::position::{Direction, Position};
use crate::world::state::WorldState;
use crate::world::tile::TileCylinder;
use std::collections::HashMap;

pub const MAX_NODES: usize = 512;
pub const MAP_NORMAL_WALK_COST: i32 = 10;
pub const MAP_DIAGONAL_WALK_COST: i32 = 25;

/// Expansion stops here once no search distance bounds the walk.
const MAX_CLOSED_NODES: i32 = 100;

const ALL_NEIGHBORS: [(i32, i32); 8] = [
    (-1, 0),
    (0, 1),
    (1, 0),
    (0, -1),
    (-1, -1),
    (1, -1),
    (1, 1),
    (-1, 1),
];

// Neighbours worth trying when arriving from a given side; the first three
// are the orthogonal ones.
const FROM_NORTH: [(i32, i32); 5] = [(-1, 0), (0, 1), (1, 0), (1, 1), (-1, 1)];
const FROM_EAST: [(i32, i32); 5] = [(-1, 0), (0, 1), (0, -1), (-1, -1), (-1, 1)];
const FROM_SOUTH: [(i32, i32); 5] = [(-1, 0), (1, 0), (0, -1), (-1, -1), (1, -1)];
const FROM_WEST: [(i32, i32); 5] = [(0, 1), (1, 0), (0, -1), (1, -1), (1, 1)];
const FROM_SOUTHWEST: [(i32, i32); 5] = [(1, 0), (0, -1), (-1, -1), (1, -1), (1, 1)];
const FROM_SOUTHEAST: [(i32, i32); 5] = [(-1, 0), (0, -1), (-1, -1), (1, -1), (-1, 1)];
const FROM_NORTHWEST: [(i32, i32); 5] = [(0, 1), (1, 0), (1, -1), (1, 1), (-1, 1)];
const FROM_NORTHEAST: [(i32, i32); 5] = [(-1, 0), (0, 1), (-1, -1), (1, 1), (-1, 1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindPathParams {
    pub full_path_search: bool,
    pub clear_sight: bool,
    pub allow_diagonal: bool,
    pub keep_distance: bool,
    pub max_search_dist: i32,
    pub min_target_dist: i32,
    pub max_target_dist: i32,
}

impl Default for FindPathParams {
    fn default() -> Self {
        Self {
            full_path_search: true,
            clear_sight: true,
            allow_diagonal: true,
            keep_distance: false,
            max_search_dist: 0,
            min_target_dist: -1,
            max_target_dist: -1,
        }
    }
}

/// Decides which expanded positions end the search.
pub trait PathCondition {
    /// Whether `test` is an acceptable end. `best` carries the best distance
    /// seen so far; a value of 0 after a match stops the search.
    fn matches(
        &self,
        world: &WorldState,
        start: Position,
        test: Position,
        params: &FindPathParams,
        best: &mut i32,
    ) -> bool;

    fn is_in_range(&self, start: Position, test: Position, params: &FindPathParams) -> bool;
}

/// Matches positions around a fixed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrozenPathingCondition {
    pub target: Position,
}

impl FrozenPathingCondition {
    pub fn new(target: Position) -> Self {
        Self { target }
    }
}

impl PathCondition for FrozenPathingCondition {
    fn matches(
        &self,
        world: &WorldState,
        start: Position,
        test: Position,
        params: &FindPathParams,
        best: &mut i32,
    ) -> bool {
        if !self.is_in_range(start, test, params) {
            return false;
        }
        if params.clear_sight && !world.is_sight_clear(test, self.target, true) {
            return false;
        }

        let distance = self.target.distance(test);
        if params.max_target_dist == 1 {
            return distance >= params.min_target_dist && distance <= params.max_target_dist;
        }
        if distance > params.max_target_dist || distance < params.min_target_dist {
            return false;
        }
        if distance == params.max_target_dist {
            *best = 0;
            return true;
        }
        if distance > *best {
            *best = distance;
            return true;
        }
        false
    }

    fn is_in_range(&self, start: Position, test: Position, params: &FindPathParams) -> bool {
        let (tx, ty) = (i32::from(test.x), i32::from(test.y));
        let (gx, gy) = (i32::from(self.target.x), i32::from(self.target.y));
        let reach = params.max_target_dist;
        if params.full_path_search {
            return tx <= gx + reach && tx >= gx - reach && ty <= gy + reach && ty >= gy - reach;
        }

        // Only search on the near side of the target.
        let dx = start.offset_x(self.target);
        let dy = start.offset_y(self.target);
        let max_x = if dx >= 0 { reach } else { 0 };
        let min_x = if dx <= 0 { reach } else { 0 };
        let max_y = if dy >= 0 { reach } else { 0 };
        let min_y = if dy <= 0 { reach } else { 0 };
        tx <= gx + max_x && tx >= gx - min_x && ty <= gy + max_y && ty >= gy - min_y
    }
}

#[derive(Debug, Clone, Copy)]
struct AStarNode {
    parent: Option<usize>,
    f: i32,
    x: i32,
    y: i32,
}

/// Fixed-capacity node arena for one search.
#[derive(Debug)]
pub struct AStarNodes {
    nodes: Vec<AStarNode>,
    open: Vec<bool>,
    table: HashMap<u32, usize>,
    closed: i32,
}

fn node_key(x: i32, y: i32) -> u32 {
    ((x as u32) << 16) | (y as u32 & 0xFFFF)
}

impl AStarNodes {
    pub fn new(x: i32, y: i32) -> Self {
        let mut nodes = Vec::with_capacity(MAX_NODES);
        nodes.push(AStarNode {
            parent: None,
            f: 0,
            x,
            y,
        });
        let mut table = HashMap::new();
        table.insert(node_key(x, y), 0);
        Self {
            nodes,
            open: vec![true],
            table,
            closed: 0,
        }
    }

    fn create_open_node(&mut self, parent: usize, x: i32, y: i32, f: i32) -> Option<usize> {
        if self.nodes.len() >= MAX_NODES {
            return None;
        }
        let index = self.nodes.len();
        self.nodes.push(AStarNode {
            parent: Some(parent),
            f,
            x,
            y,
        });
        self.open.push(true);
        self.table.insert(node_key(x, y), index);
        Some(index)
    }

    /// Lowest `f` among open nodes; ties go to the oldest node.
    fn best_node(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (index, node) in self.nodes.iter().enumerate() {
            if self.open[index] && best.map_or(true, |current| node.f < self.nodes[current].f) {
                best = Some(index);
            }
        }
        best
    }

    fn close_node(&mut self, index: usize) {
        if self.open[index] {
            self.open[index] = false;
            self.closed += 1;
        }
    }

    fn open_node(&mut self, index: usize) {
        if !self.open[index] {
            self.open[index] = true;
            self.closed -= 1;
        }
    }

    fn node_at(&self, x: i32, y: i32) -> Option<usize> {
        self.table.get(&node_key(x, y)).copied()
    }

    pub fn closed_count(&self) -> i32 {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn map_walk_cost(&self, from: usize, x: i32, y: i32) -> i32 {
        let node = &self.nodes[from];
        if (node.x - x).abs() == (node.y - y).abs() {
            MAP_DIAGONAL_WALK_COST
        } else {
            MAP_NORMAL_WALK_COST
        }
    }
}

fn neighbours_from(offset_x: i32, offset_y: i32, allow_diagonal: bool) -> &'static [(i32, i32); 5] {
    if offset_y == 0 {
        if offset_x == -1 {
            &FROM_WEST
        } else {
            &FROM_EAST
        }
    } else if !allow_diagonal || offset_x == 0 {
        if offset_y == -1 {
            &FROM_NORTH
        } else {
            &FROM_SOUTH
        }
    } else if offset_y == -1 {
        if offset_x == -1 {
            &FROM_NORTHWEST
        } else {
            &FROM_NORTHEAST
        }
    } else if offset_x == -1 {
        &FROM_SOUTHWEST
    } else {
        &FROM_SOUTHEAST
    }
}

/// Direction of the step from `from` to `to`, where `from - to` is (dx, dy).
fn step_direction(dx: i32, dy: i32) -> Option<Direction> {
    match (dx, dy) {
        (1, 1) => Some(Direction::Northwest),
        (-1, 1) => Some(Direction::Northeast),
        (1, -1) => Some(Direction::Southwest),
        (-1, -1) => Some(Direction::Southeast),
        (1, _) => Some(Direction::West),
        (-1, _) => Some(Direction::East),
        (_, 1) => Some(Direction::North),
        (_, -1) => Some(Direction::South),
        _ => None,
    }
}

impl WorldState {
    /// Whether `creature` could step onto `position` while pathing. Its own
    /// tile always counts as walkable.
    pub fn can_walk_to(&self, creature: CreatureId, position: Position) -> bool {
        let Some(entry) = self.creature(creature) else {
            return false;
        };
        if !self.map.has_tile(position) {
            return false;
        }
        if entry.placed && entry.position == position {
            return true;
        }
        let mut flags = CylinderFlags::PATHFINDING;
        if !entry.is_player() {
            flags |= CylinderFlags::IGNOREFIELDDAMAGE;
        }
        TileCylinder(position)
            .query_add(self, 0, Thing::Creature(creature), 1, flags, None)
            .is_ok()
    }

    /// A diagonal step needs at least one of the two orthogonal tiles it
    /// passes between to be walkable.
    fn can_cut_corner(&self, creature: CreatureId, x: i32, y: i32, dx: i32, dy: i32, z: u8) -> bool {
        let side = |sx: i32, sy: i32| {
            u16::try_from(sx).ok().zip(u16::try_from(sy).ok()).map_or(false, |(sx, sy)| {
                self.can_walk_to(creature, Position::new(sx, sy, z))
            })
        };
        side(x + dx, y) || side(x, y + dy)
    }

    /// Extra cost of crossing `position`: visible occupants and harmful fields.
    fn tile_walk_cost(&self, creature: CreatureId, position: Position) -> i32 {
        let Some(walker) = self.creature(creature) else {
            return 0;
        };
        let Some(tile) = self.map.tile(position) else {
            return 0;
        };
        let mut cost = 0;
        let occupied = tile
            .creatures()
            .iter()
            .filter_map(|id| self.creature(*id))
            .any(|other| walker.can_see(other));
        if occupied {
            cost += MAP_NORMAL_WALK_COST * 3;
        }
        if let Some(field) = TileCylinder(position).field_item(self) {
            let combat = self.item_type_of(field).field_combat();
            if !walker.is_immune(combat)
                && !walker.has_condition(combat)
                && walker.as_monster().is_some()
                && !walker.can_walk_on_field(combat)
            {
                cost += MAP_NORMAL_WALK_COST * 18;
            }
        }
        cost
    }

    /// Searches from the creature's position for a position accepted by
    /// `condition`. The returned steps run destination first; walk them
    /// from the back.
    pub fn get_path_matching(
        &self,
        creature: CreatureId,
        condition: &dyn PathCondition,
        params: &FindPathParams,
    ) -> Option<Vec<Direction>> {
        let start = self.creature(creature).filter(|entry| entry.placed)?.position;
        let z = start.z;
        let (sx, sy) = (i32::from(start.x), i32::from(start.y));
        let mut nodes = AStarNodes::new(sx, sy);
        let mut best_match = 0;
        let mut found: Option<(usize, Position)> = None;

        while params.max_search_dist != 0 || nodes.closed_count() < MAX_CLOSED_NODES {
            let Some(current) = nodes.best_node() else {
                if found.is_some() {
                    break;
                }
                return None;
            };
            let AStarNode { parent, f, x, y } = nodes.nodes[current];
            let here = Position::new(x as u16, y as u16, z);
            if condition.matches(self, start, here, params, &mut best_match) {
                found = Some((current, here));
                if best_match == 0 {
                    break;
                }
            }

            let neighbours: &[(i32, i32)] = match parent {
                Some(parent) => {
                    let parent = nodes.nodes[parent];
                    let set = neighbours_from(parent.x - x, parent.y - y, params.allow_diagonal);
                    let count = if params.allow_diagonal { 5 } else { 3 };
                    &set[..count]
                }
                None if params.allow_diagonal => &ALL_NEIGHBORS,
                None => &ALL_NEIGHBORS[..4],
            };

            let mut arena_full = false;
            for &(dx, dy) in neighbours {
                let (nx, ny) = (x + dx, y + dy);
                if !(0..=i32::from(u16::MAX)).contains(&nx) || !(0..=i32::from(u16::MAX)).contains(&ny) {
                    continue;
                }
                let next = Position::new(nx as u16, ny as u16, z);
                if params.max_search_dist != 0
                    && (start.distance_x(next) > params.max_search_dist
                        || start.distance_y(next) > params.max_search_dist)
                {
                    continue;
                }
                if params.keep_distance && !condition.is_in_range(start, next, params) {
                    continue;
                }

                if dx != 0 && dy != 0 && !self.can_cut_corner(creature, x, y, dx, dy, z) {
                    continue;
                }

                let existing = nodes.node_at(nx, ny);
                let walkable = match existing {
                    Some(_) => self.map.has_tile(next),
                    None => self.can_walk_to(creature, next),
                };
                if !walkable {
                    continue;
                }

                let new_f = f + nodes.map_walk_cost(current, nx, ny) + self.tile_walk_cost(creature, next);
                match existing {
                    Some(index) => {
                        if nodes.nodes[index].f <= new_f {
                            continue;
                        }
                        nodes.nodes[index].f = new_f;
                        nodes.nodes[index].parent = Some(current);
                        nodes.open_node(index);
                    }
                    None => {
                        if nodes.create_open_node(current, nx, ny, new_f).is_none() {
                            arena_full = true;
                            break;
                        }
                    }
                }
            }
            if arena_full && found.is_none() {
                log::trace!("path search for creature {} ran out of nodes", creature.0);
                return None;
            }

            nodes.close_node(current);
        }

        let (end, end_position) = found?;
        let mut steps = Vec::new();
        let (mut prev_x, mut prev_y) = (i32::from(end_position.x), i32::from(end_position.y));
        let mut cursor = nodes.nodes[end].parent;
        while let Some(index) = cursor {
            let node = nodes.nodes[index];
            if let Some(direction) = step_direction(node.x - prev_x, node.y - prev_y) {
                steps.push(direction);
            }
            prev_x = node.x;
            prev_y = node.y;
            cursor = node.parent;
        }
        Some(steps)
    }

    pub fn get_path_to(
        &self,
        creature: CreatureId,
        target: Position,
        params: &FindPathParams,
    ) -> Option<Vec<Direction>> {
        self.get_path_matching(creature, &FrozenPathingCondition::new(target), params)
    }

    /// The common "walk up to it" search: stop within `max_target_dist`.
    pub fn get_path_to_within(
        &self,
        creature: CreatureId,
        target: Position,
        min_target_dist: i32,
        max_target_dist: i32,
        full_path_search: bool,
        clear_sight: bool,
        max_search_dist: i32,
    ) -> Option<Vec<Direction>> {
        let params = FindPathParams {
            full_path_search,
            clear_sight,
            min_target_dist,
            max_target_dist,
            max_search_dist,
            ..FindPathParams::default()
        };
        self.get_path_to(creature, target, &params)
    }
}
