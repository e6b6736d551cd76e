use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
    Northeast,
    Northwest,
    Southeast,
    Southwest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionDelta {
    pub dx: i16,
    pub dy: i16,
    pub dz: i8,
}

impl Position {
    pub const fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, delta: PositionDelta) -> Option<Self> {
        let x = i32::from(self.x) + i32::from(delta.dx);
        let y = i32::from(self.y) + i32::from(delta.dy);
        let z = i16::from(self.z) + i16::from(delta.dz);

        if x < 0 || y < 0 || z < 0 {
            return None;
        }

        if x > i32::from(u16::MAX) || y > i32::from(u16::MAX) || z > i16::from(u8::MAX) {
            return None;
        }

        Some(Self {
            x: x as u16,
            y: y as u16,
            z: z as u8,
        })
    }

    pub fn step(self, direction: Direction) -> Option<Self> {
        self.offset(direction.delta())
    }

    /// Signed `self.x - other.x`.
    pub fn offset_x(self, other: Position) -> i32 {
        i32::from(self.x) - i32::from(other.x)
    }

    pub fn offset_y(self, other: Position) -> i32 {
        i32::from(self.y) - i32::from(other.y)
    }

    pub fn offset_z(self, other: Position) -> i32 {
        i32::from(self.z) - i32::from(other.z)
    }

    pub fn distance_x(self, other: Position) -> i32 {
        self.offset_x(other).abs()
    }

    pub fn distance_y(self, other: Position) -> i32 {
        self.offset_y(other).abs()
    }

    pub fn distance_z(self, other: Position) -> i32 {
        self.offset_z(other).abs()
    }

    /// Chebyshev distance on the x/y plane.
    pub fn distance(self, other: Position) -> i32 {
        self.distance_x(other).max(self.distance_y(other))
    }

    pub fn in_range(self, other: Position, range_x: i32, range_y: i32, range_z: i32) -> bool {
        self.distance_x(other) <= range_x
            && self.distance_y(other) <= range_y
            && self.distance_z(other) <= range_z
    }

    /// Facing from `self` towards `to`, ignoring floors. The dominant axis
    /// wins; equal offsets give a diagonal.
    pub fn direction_to(self, to: Position) -> Option<Direction> {
        if self.x == to.x && self.y == to.y {
            return None;
        }
        let offset_x = self.offset_x(to);
        let offset_y = self.offset_y(to);
        let east = offset_x < 0;
        let dx = offset_x.abs();
        let dy = offset_y.abs();
        let horizontal = if east { Direction::East } else { Direction::West };
        let direction = if dy > dx {
            if offset_y >= 0 {
                Direction::North
            } else {
                Direction::South
            }
        } else if dy == dx {
            match (offset_y >= 0, east) {
                (true, true) => Direction::Northeast,
                (true, false) => Direction::Northwest,
                (false, true) => Direction::Southeast,
                (false, false) => Direction::Southwest,
            }
        } else {
            horizontal
        };
        Some(direction)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Direction {
    pub fn delta(self) -> PositionDelta {
        match self {
            Direction::North => PositionDelta { dx: 0, dy: -1, dz: 0 },
            Direction::East => PositionDelta { dx: 1, dy: 0, dz: 0 },
            Direction::South => PositionDelta { dx: 0, dy: 1, dz: 0 },
            Direction::West => PositionDelta { dx: -1, dy: 0, dz: 0 },
            Direction::Northeast => PositionDelta { dx: 1, dy: -1, dz: 0 },
            Direction::Northwest => PositionDelta { dx: -1, dy: -1, dz: 0 },
            Direction::Southeast => PositionDelta { dx: 1, dy: 1, dz: 0 },
            Direction::Southwest => PositionDelta { dx: -1, dy: 1, dz: 0 },
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            Direction::Northeast
                | Direction::Northwest
                | Direction::Southeast
                | Direction::Southwest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opposite(direction: Direction) -> Direction {
        match direction {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::Northeast => Direction::Southwest,
            Direction::Northwest => Direction::Southeast,
            Direction::Southeast => Direction::Northwest,
            Direction::Southwest => Direction::Northeast,
        }
    }

    #[test]
    fn step_and_back_returns_to_origin() {
        let origin = Position::new(100, 100, 7);
        let directions = [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
            Direction::Northeast,
            Direction::Northwest,
            Direction::Southeast,
            Direction::Southwest,
        ];
        for direction in directions {
            let next = origin.step(direction).expect("step");
            assert_eq!(next.distance(origin), 1);
            let back = next.step(opposite(direction)).expect("step back");
            assert_eq!(back, origin);
        }
    }

    #[test]
    fn step_off_the_map_edge_is_rejected() {
        let corner = Position::new(0, 0, 7);
        assert!(corner.step(Direction::North).is_none());
        assert!(corner.step(Direction::West).is_none());
        assert!(corner.step(Direction::Southeast).is_some());
    }

    #[test]
    fn range_checks_each_axis() {
        let a = Position::new(100, 100, 7);
        let b = Position::new(101, 99, 8);
        assert!(a.in_range(b, 1, 1, 1));
        assert!(!a.in_range(b, 1, 1, 0));
        assert_eq!(a.offset_x(b), -1);
        assert_eq!(a.offset_y(b), 1);
        assert_eq!(a.offset_z(b), -1);
    }

    #[test]
    fn direction_follows_the_dominant_axis() {
        let origin = Position::new(100, 100, 7);
        assert_eq!(origin.direction_to(Position::new(103, 101, 7)), Some(Direction::East));
        assert_eq!(origin.direction_to(Position::new(99, 96, 7)), Some(Direction::North));
        assert_eq!(origin.direction_to(Position::new(98, 102, 7)), Some(Direction::Southwest));
        assert_eq!(origin.direction_to(Position::new(100, 100, 6)), None);
    }
}
