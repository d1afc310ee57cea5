//! Node movement
//!
//! [`Mobility`] owns the per-node movement state and returns the new
//! position of every node that moved during a tick. Positions are always
//! kept inside the world rectangle.

use ferry_core::Coord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{MobilityModel, MobilitySettings, WorldSize};

/// Where a walking node is heading
#[derive(Debug, Clone, Copy, PartialEq)]
struct Leg {
    waypoint: Coord,
    speed: f64,
}

/// Movement of all nodes of a world
#[derive(Debug, Clone)]
pub struct Mobility {
    settings: MobilitySettings,
    world: WorldSize,
    legs: Vec<Option<Leg>>,
    rng: StdRng,
}

impl Mobility {
    pub fn new(settings: MobilitySettings, world: WorldSize, nodes: usize, seed: u64) -> Self {
        Self {
            settings,
            world,
            legs: vec![None; nodes],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn model(&self) -> MobilityModel {
        self.settings.model
    }

    /// Advance every node by `dt` seconds
    ///
    /// `positions` holds the current location of each node; the result
    /// lists `(index, new_location)` for each node that moved.
    pub fn step(&mut self, positions: &[Coord], dt: f64) -> Vec<(usize, Coord)> {
        if self.settings.model == MobilityModel::Static {
            return Vec::new();
        }
        if self.legs.len() < positions.len() {
            self.legs.resize(positions.len(), None);
        }

        let mut moved = Vec::new();
        for (index, current) in positions.iter().enumerate() {
            let leg = match self.legs[index] {
                Some(leg) => leg,
                None => self.next_leg(),
            };
            let (next, arrived) = advance(*current, leg.waypoint, leg.speed * dt);
            self.legs[index] = if arrived { None } else { Some(leg) };
            let next = next.clamped(self.world.width, self.world.height);
            if next != *current {
                moved.push((index, next));
            }
        }
        moved
    }

    fn next_leg(&mut self) -> Leg {
        let waypoint = random_position(&mut self.rng, self.world);
        let speed = if self.settings.max_speed > self.settings.min_speed {
            self.rng
                .random_range(self.settings.min_speed..self.settings.max_speed)
        } else {
            self.settings.min_speed
        };
        Leg { waypoint, speed }
    }
}

/// Uniform point inside the world
pub fn random_position<R: Rng>(rng: &mut R, world: WorldSize) -> Coord {
    Coord::new(
        rng.random::<f64>() * world.width,
        rng.random::<f64>() * world.height,
    )
}

/// Move `step` meters from `from` toward `to`
///
/// Returns the new position and whether `to` was reached.
fn advance(from: Coord, to: Coord, step: f64) -> (Coord, bool) {
    let distance = from.distance(&to);
    if distance <= step {
        return (to, true);
    }
    let ratio = step / distance;
    (
        Coord::new(from.x + (to.x - from.x) * ratio, from.y + (to.y - from.y) * ratio),
        false,
    )
}
