//! Candidate-neighbor lookup
//!
//! The network asks this collaborator which interfaces could be in range
//! of a location. [`ProximityMode::AllPairs`] returns everything;
//! [`ProximityMode::Grid`] buckets interfaces into square cells and returns
//! the block of cells within `reach` of the query. With cells at least as
//! large as the radio range that block is the usual 3x3.
//!
//! Results are sorted by address so runs are reproducible.

use std::collections::BTreeMap;

use ferry_core::{Coord, InterfaceAddress};
use serde::{Deserialize, Serialize};

/// How candidate neighbors are found
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProximityMode {
    #[default]
    AllPairs,
    Grid { cell_size: f64 },
}

/// Spatial index over interface positions
#[derive(Debug, Clone, Default)]
pub struct Proximity {
    mode: ProximityMode,
    all: Vec<InterfaceAddress>,
    cells: BTreeMap<(i64, i64), Vec<InterfaceAddress>>,
}

impl Proximity {
    pub fn new(mode: ProximityMode) -> Self {
        Self {
            mode,
            all: Vec::new(),
            cells: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> ProximityMode {
        self.mode
    }

    /// Re-index all interfaces at their current locations
    pub fn rebuild(&mut self, entries: impl IntoIterator<Item = (InterfaceAddress, Coord)>) {
        self.all.clear();
        self.cells.clear();
        for (addr, location) in entries {
            self.all.push(addr);
            if let Some(cell) = self.cell_of(location) {
                self.cells.entry(cell).or_default().push(addr);
            }
        }
        self.all.sort();
    }

    /// Interfaces that may be within `reach` of `location`
    pub fn near_interfaces(&self, location: Coord, reach: f64) -> Vec<InterfaceAddress> {
        let Some((cx, cy)) = self.cell_of(location) else {
            return self.all.clone();
        };
        let span = self.cell_span(reach);
        let mut near = Vec::new();
        for dx in -span..=span {
            for dy in -span..=span {
                if let Some(addrs) = self.cells.get(&(cx + dx, cy + dy)) {
                    near.extend_from_slice(addrs);
                }
            }
        }
        near.sort();
        near
    }

    fn cell_size(&self) -> Option<f64> {
        match self.mode {
            ProximityMode::AllPairs => None,
            ProximityMode::Grid { cell_size } if cell_size > 0.0 => Some(cell_size),
            ProximityMode::Grid { .. } => Some(1.0),
        }
    }

    fn cell_of(&self, location: Coord) -> Option<(i64, i64)> {
        let size = self.cell_size()?;
        Some((
            (location.x / size).floor() as i64,
            (location.y / size).floor() as i64,
        ))
    }

    /// Cells to search on each side of the query cell
    fn cell_span(&self, reach: f64) -> i64 {
        match self.cell_size() {
            Some(size) if reach.is_finite() && reach > size => (reach / size).ceil() as i64,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<(InterfaceAddress, Coord)> {
        vec![
            (InterfaceAddress(2), Coord::new(5.0, 5.0)),
            (InterfaceAddress(0), Coord::new(12.0, 4.0)),
            (InterfaceAddress(1), Coord::new(95.0, 95.0)),
        ]
    }

    #[test]
    fn test_all_pairs_returns_everything_sorted() {
        let mut prox = Proximity::new(ProximityMode::AllPairs);
        prox.rebuild(entries());
        assert_eq!(
            prox.near_interfaces(Coord::new(0.0, 0.0), 10.0),
            vec![InterfaceAddress(0), InterfaceAddress(1), InterfaceAddress(2)]
        );
    }

    #[test]
    fn test_grid_returns_neighborhood() {
        let mut prox = Proximity::new(ProximityMode::Grid { cell_size: 10.0 });
        prox.rebuild(entries());
        assert_eq!(
            prox.near_interfaces(Coord::new(6.0, 6.0), 10.0),
            vec![InterfaceAddress(0), InterfaceAddress(2)]
        );
        assert_eq!(
            prox.near_interfaces(Coord::new(90.0, 90.0), 10.0),
            vec![InterfaceAddress(1)]
        );
    }

    #[test]
    fn test_grid_widens_search_for_long_range() {
        let mut prox = Proximity::new(ProximityMode::Grid { cell_size: 4.0 });
        prox.rebuild(vec![
            (InterfaceAddress(0), Coord::new(0.0, 0.0)),
            (InterfaceAddress(1), Coord::new(9.0, 0.0)),
            (InterfaceAddress(2), Coord::new(40.0, 0.0)),
        ]);
        assert_eq!(
            prox.near_interfaces(Coord::new(0.0, 0.0), 4.0),
            vec![InterfaceAddress(0)]
        );
        assert_eq!(
            prox.near_interfaces(Coord::new(0.0, 0.0), 10.0),
            vec![InterfaceAddress(0), InterfaceAddress(1)]
        );
    }
}
