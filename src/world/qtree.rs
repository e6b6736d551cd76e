use crate::entities::creature::CreatureId;
use crate::world::tile::Tile;

pub const FLOOR_BITS: u32 = 3;
pub const FLOOR_SIZE: u16 = 1 << FLOOR_BITS;
pub const FLOOR_MASK: u16 = FLOOR_SIZE - 1;
pub const MAP_MAX_LAYERS: u8 = 16;

const ROOT_LEVEL: u32 = 15;

/// Index into the leaf arena owned by [`QTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeafId(usize);

#[derive(Debug)]
pub struct Floor {
    tiles: Vec<Option<Tile>>,
}

impl Floor {
    fn new() -> Self {
        Self {
            tiles: (0..usize::from(FLOOR_SIZE) * usize::from(FLOOR_SIZE))
                .map(|_| None)
                .collect(),
        }
    }

    fn slot(x: u16, y: u16) -> usize {
        usize::from(y & FLOOR_MASK) * usize::from(FLOOR_SIZE) + usize::from(x & FLOOR_MASK)
    }

    pub fn tile(&self, x: u16, y: u16) -> Option<&Tile> {
        self.tiles[Self::slot(x, y)].as_ref()
    }

    pub fn tile_mut(&mut self, x: u16, y: u16) -> Option<&mut Tile> {
        self.tiles[Self::slot(x, y)].as_mut()
    }

    pub fn set(&mut self, x: u16, y: u16, tile: Option<Tile>) -> Option<Tile> {
        std::mem::replace(&mut self.tiles[Self::slot(x, y)], tile)
    }
}

#[derive(Debug, Default)]
pub struct QTreeLeafNode {
    floors: [Option<Box<Floor>>; MAP_MAX_LAYERS as usize],
    pub creature_list: Vec<CreatureId>,
    pub player_list: Vec<CreatureId>,
    /// Leaf directly south (y + 8), linked when either leaf is created.
    pub leaf_s: Option<LeafId>,
    /// Leaf directly east (x + 8).
    pub leaf_e: Option<LeafId>,
}

impl QTreeLeafNode {
    pub fn floor(&self, z: u8) -> Option<&Floor> {
        self.floors.get(usize::from(z)).and_then(|floor| floor.as_deref())
    }

    pub fn floor_mut(&mut self, z: u8) -> Option<&mut Floor> {
        self.floors
            .get_mut(usize::from(z))
            .and_then(|floor| floor.as_deref_mut())
    }

    pub fn create_floor(&mut self, z: u8) -> &mut Floor {
        self.floors[usize::from(z)].get_or_insert_with(|| Box::new(Floor::new()))
    }

    pub fn add_creature(&mut self, creature: CreatureId, is_player: bool) {
        self.creature_list.push(creature);
        if is_player {
            self.player_list.push(creature);
        }
    }

    pub fn remove_creature(&mut self, creature: CreatureId) {
        if let Some(index) = self.creature_list.iter().position(|id| *id == creature) {
            self.creature_list.remove(index);
        }
        if let Some(index) = self.player_list.iter().position(|id| *id == creature) {
            self.player_list.remove(index);
        }
    }
}

#[derive(Debug)]
enum Child {
    Node(Box<QTreeNode>),
    Leaf(LeafId),
}

#[derive(Debug, Default)]
pub struct QTreeNode {
    children: [Option<Child>; 4],
}

fn child_index(x: u32, y: u32) -> usize {
    (((x & 0x8000) >> 15) | ((y & 0x8000) >> 14)) as usize
}

#[derive(Debug, Default)]
pub struct QTree {
    root: QTreeNode,
    leaves: Vec<QTreeLeafNode>,
}

impl QTree {
    pub fn get_leaf(&self, x: u32, y: u32) -> Option<LeafId> {
        let mut node = &self.root;
        let (mut x, mut y) = (x, y);
        loop {
            match node.children[child_index(x, y)].as_ref()? {
                Child::Leaf(id) => return Some(*id),
                Child::Node(next) => node = next,
            }
            x <<= 1;
            y <<= 1;
        }
    }

    /// Returns the leaf covering (x, y), creating missing nodes on the way.
    /// The flag is true when the leaf itself was just created.
    pub fn create_leaf(&mut self, x: u32, y: u32) -> (LeafId, bool) {
        let leaves = &mut self.leaves;
        let mut node = &mut self.root;
        let (mut x, mut y) = (x, y);
        let mut level = ROOT_LEVEL;
        loop {
            let index = child_index(x, y);
            if level == FLOOR_BITS {
                if let Some(Child::Leaf(id)) = node.children[index] {
                    return (id, false);
                }
                let id = LeafId(leaves.len());
                leaves.push(QTreeLeafNode::default());
                node.children[index] = Some(Child::Leaf(id));
                return (id, true);
            }

            let slot = &mut node.children[index];
            if slot.is_none() {
                *slot = Some(Child::Node(Box::default()));
            }
            node = match slot {
                Some(Child::Node(next)) => next,
                Some(Child::Leaf(id)) => return (*id, false),
                None => return Self::detached(leaves),
            };
            x <<= 1;
            y <<= 1;
            level -= 1;
        }
    }

    fn detached(leaves: &mut Vec<QTreeLeafNode>) -> (LeafId, bool) {
        let id = LeafId(leaves.len());
        leaves.push(QTreeLeafNode::default());
        (id, true)
    }

    pub fn leaf(&self, id: LeafId) -> &QTreeLeafNode {
        &self.leaves[id.0]
    }

    pub fn leaf_mut(&mut self, id: LeafId) -> &mut QTreeLeafNode {
        &mut self.leaves[id.0]
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_of_one_leaf_share_it() {
        let mut tree = QTree::default();
        let (first, created) = tree.create_leaf(1000, 1000);
        assert!(created);
        let (again, created) = tree.create_leaf(1007, 1001);
        assert_eq!(first, again);
        assert!(!created);
        assert_eq!(tree.get_leaf(1003, 1006), Some(first));
        assert_eq!(tree.get_leaf(1008, 1000), None);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn neighbouring_regions_get_distinct_leaves() {
        let mut tree = QTree::default();
        let (a, _) = tree.create_leaf(0, 0);
        let (b, _) = tree.create_leaf(8, 0);
        let (c, _) = tree.create_leaf(0, 8);
        let (d, _) = tree.create_leaf(0xFFF8, 0xFFF8);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(tree.get_leaf(0xFFFF, 0xFFFF), Some(d));
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn leaf_tracks_players_separately() {
        let mut leaf = QTreeLeafNode::default();
        leaf.add_creature(CreatureId(1), true);
        leaf.add_creature(CreatureId(2), false);
        assert_eq!(leaf.creature_list, vec![CreatureId(1), CreatureId(2)]);
        assert_eq!(leaf.player_list, vec![CreatureId(1)]);
        leaf.remove_creature(CreatureId(1));
        assert_eq!(leaf.creature_list, vec![CreatureId(2)]);
        assert!(leaf.player_list.is_empty());
    }
}
