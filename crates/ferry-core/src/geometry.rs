//! Planar coordinates for node placement

use serde::{Deserialize, Serialize};

/// A point in the simulated world, in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Coord) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Clamp into the rectangle `[0, width] x [0, height]`
    pub fn clamped(self, width: f64, height: f64) -> Coord {
        Coord {
            x: self.x.clamp(0.0, width),
            y: self.y.clamp(0.0, height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!(b.distance(&a), 5.0);
    }

    #[test]
    fn test_clamped() {
        let c = Coord::new(-2.0, 150.0).clamped(100.0, 100.0);
        assert_eq!(c, Coord::new(0.0, 100.0));
    }
}
