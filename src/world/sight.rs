use crate::world::position::Position;
use crate::world::spectators::{MAX_CLIENT_VIEWPORT_X, MAX_CLIENT_VIEWPORT_Y};
use crate::world::state::WorldState;
use crate::world::tile::{ItemProperty, TileCylinder};

impl WorldState {
    /// A missing tile never blocks. With `block_floor` any ground does.
    pub fn is_tile_clear(&self, x: i32, y: i32, z: i32, block_floor: bool) -> bool {
        let Some(tile) = self.map.tile_at(x, y, z) else {
            return true;
        };
        if block_floor && tile.ground.is_some() {
            return false;
        }
        !TileCylinder(tile.position()).has_property(self, ItemProperty::BlockProjectile)
    }

    /// Walks the straight line between two cells on floor `z`, endpoints
    /// excluded.
    pub fn check_sight_line(&self, x0: i32, y0: i32, x1: i32, y1: i32, z: i32) -> bool {
        if x0 == x1 && y0 == y1 {
            return true;
        }
        if (y1 - y0).abs() > (x1 - x0).abs() {
            // Steep: iterate over y, coordinates swapped.
            return if y1 > y0 {
                self.walk_line(y0, x0, y1, x1, z, true)
            } else {
                self.walk_line(y1, x1, y0, x0, z, true)
            };
        }
        if x0 > x1 {
            self.walk_line(x1, y1, x0, y0, z, false)
        } else {
            self.walk_line(x0, y0, x1, y1, z, false)
        }
    }

    fn walk_line(&self, a0: i32, b0: i32, a1: i32, b1: i32, z: i32, steep: bool) -> bool {
        let da = (a1 - a0) as f32;
        let slope = if da == 0.0 { 1.0 } else { (b1 - b0) as f32 / da };
        let mut bi = b0 as f32 + slope;
        for a in (a0 + 1)..a1 {
            let b = (bi + 0.1).floor() as i32;
            let clear = if steep {
                self.is_tile_clear(b, a, z, false)
            } else {
                self.is_tile_clear(a, b, z, false)
            };
            if !clear {
                return false;
            }
            bi += slope;
        }
        true
    }

    pub fn is_sight_clear(&self, from: Position, to: Position, same_floor: bool) -> bool {
        if from == to {
            return true;
        }
        let (fx, fy, fz) = (i32::from(from.x), i32::from(from.y), i32::from(from.z));
        let (tx, ty, tz) = (i32::from(to.x), i32::from(to.y), i32::from(to.z));
        let diff_z = (fz - tz).abs();
        if same_floor && diff_z != 0 {
            return false;
        }

        if diff_z == 0 {
            if (fx - tx).abs() < 2 && (fy - ty).abs() < 2 {
                return true;
            }
            let clear = self.check_sight_line(fx, fy, tx, ty, fz);
            if clear || same_floor {
                return clear;
            }
            if fz == 0 {
                return true;
            }
            // Throw over the obstacle through the floor above.
            let above = fz - 1;
            return self.is_tile_clear(fx, fy, above, true)
                && self.is_tile_clear(tx, ty, above, true)
                && self.check_sight_line(fx, fy, tx, ty, above);
        }

        if (fz < 8 && tz > 7) || (fz > 7 && tz < 8) {
            return false;
        }

        if fz > tz {
            if diff_z > 1 {
                return false;
            }
            let above = fz - 1;
            return self.is_tile_clear(fx, fy, above, true)
                && self.check_sight_line(fx, fy, tx, ty, above);
        }

        for z in fz..tz {
            if !self.is_tile_clear(tx, ty, z, true) {
                return false;
            }
        }
        self.check_sight_line(fx, fy, tx, ty, fz)
    }

    pub fn can_throw_object_to(
        &self,
        from: Position,
        to: Position,
        check_line_of_sight: bool,
        same_floor: bool,
        range_x: i32,
        range_y: i32,
    ) -> bool {
        if from.distance_x(to) > range_x || from.distance_y(to) > range_y {
            return false;
        }
        !check_line_of_sight || self.is_sight_clear(from, to, same_floor)
    }

    /// Throw check with the client viewport as range.
    pub fn can_throw_within_view(&self, from: Position, to: Position) -> bool {
        self.can_throw_object_to(
            from,
            to,
            true,
            false,
            MAX_CLIENT_VIEWPORT_X,
            MAX_CLIENT_VIEWPORT_Y,
        )
    }
}
