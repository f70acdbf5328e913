use serde::{Deserialize, Serialize};

/// Integer world coordinate of an entity's centre.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Position {
        Position { x, y }
    }

    /// Moves `distance` units along `direction`, rounding to the nearest integer cell.
    pub fn offset(&self, direction: Direction, distance: f32) -> Position {
        Position {
            x: self.x.saturating_add((direction.x * distance).round() as i32),
            y: self.y.saturating_add((direction.y * distance).round() as i32),
        }
    }

    pub fn distance_squared(&self, other: Position) -> i64 {
        let dx = other.x as i64 - self.x as i64;
        let dy = other.y as i64 - self.y as i64;
        dx * dx + dy * dy
    }
}

/// Movement or facing vector. Normalised when built from two points, zero when idle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub x: f32,
    pub y: f32,
}

impl Direction {
    pub fn zero() -> Direction {
        Direction { x: 0.0, y: 0.0 }
    }

    pub fn new(x: f32, y: f32) -> Direction {
        Direction { x, y }
    }

    pub fn toward(from: Position, to: Position) -> Direction {
        Direction::new((to.x - from.x) as f32, (to.y - from.y) as f32).normalized()
    }

    pub fn normalized(self) -> Direction {
        let length = (self.x * self.x + self.y * self.y).sqrt();
        if !length.is_finite() || length < f32::EPSILON {
            Direction::zero()
        } else {
            Direction::new(self.x / length, self.y / length)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// Closed axis-aligned rectangle. Boxes that share an edge count as intersecting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> BoundingBox {
        BoundingBox { x_min, y_min, x_max, y_max }
    }

    /// Saturates at the `i32` range instead of wrapping.
    pub fn centered(center: Position, width: i32, height: i32) -> BoundingBox {
        let (half_w, half_h) = (width / 2, height / 2);
        BoundingBox {
            x_min: center.x.saturating_sub(half_w),
            y_min: center.y.saturating_sub(half_h),
            x_max: center.x.saturating_add(half_w),
            y_max: center.y.saturating_add(half_h),
        }
    }

    pub fn contains_point(&self, point: Position) -> bool {
        self.x_min <= point.x
            && point.x <= self.x_max
            && self.y_min <= point.y
            && point.y <= self.y_max
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x_min <= other.x_max
            && other.x_min <= self.x_max
            && self.y_min <= other.y_max
            && other.y_min <= self.y_max
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x_min <= other.x_min
            && self.y_min <= other.y_min
            && other.x_max <= self.x_max
            && other.y_max <= self.y_max
    }
}
