//! Scenario configuration
//!
//! A scenario is a JSON document deserialized into [`ScenarioConfig`].
//! Every section has defaults, so a file only lists what it changes.

use std::collections::BTreeMap;
use std::path::Path;

use ferry_core::{ConfigError, Coord};
use ferry_link::{InterfaceSettings, ProximityMode};
use ferry_routing::RouterSettings;
use serde::{Deserialize, Serialize};

use crate::error::SimResult;

/// Size of the simulated area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldSize {
    pub width: f64,
    pub height: f64,
}

impl Default for WorldSize {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
        }
    }
}

/// Where nodes start
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Placement {
    /// Uniformly inside the world
    #[default]
    Random,
    /// On a horizontal line through the middle of the world
    Line { spacing: f64 },
    /// One coordinate per node
    Explicit { positions: Vec<Coord> },
}

/// How nodes move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobilityModel {
    #[default]
    Static,
    RandomWalk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobilitySettings {
    pub model: MobilityModel,
    /// Slowest walking speed in m/s
    pub min_speed: f64,
    /// Fastest walking speed in m/s
    pub max_speed: f64,
}

impl Default for MobilitySettings {
    fn default() -> Self {
        Self {
            model: MobilityModel::Static,
            min_speed: 0.5,
            max_speed: 1.5,
        }
    }
}

/// Message generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficSettings {
    /// Seconds between two messages of the same node, 0 disables generation
    pub interval: f64,
    pub min_size: u64,
    pub max_size: u64,
    /// Draw a random priority for each message instead of Normal
    pub random_priority: bool,
    /// Message id prefix
    pub prefix: String,
}

impl Default for TrafficSettings {
    fn default() -> Self {
        Self {
            interval: 0.0,
            min_size: 500,
            max_size: 1_000,
            random_priority: false,
            prefix: "M".to_string(),
        }
    }
}

/// A complete simulation scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub name: String,
    pub seed: u64,
    /// Simulated seconds to run
    pub duration: f64,
    /// Seconds per step
    pub tick: f64,
    pub world_size: WorldSize,
    /// Number of nodes
    pub nodes: usize,
    pub placement: Placement,
    /// Interface every node gets
    pub interface: InterfaceSettings,
    /// Router settings of every node without an override
    pub router: RouterSettings,
    /// Per-node router settings keyed by node index
    pub node_routers: BTreeMap<u32, RouterSettings>,
    pub mobility: MobilitySettings,
    pub traffic: TrafficSettings,
    pub connectivity: ProximityMode,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            seed: 42,
            duration: 600.0,
            tick: 0.1,
            world_size: WorldSize::default(),
            nodes: 10,
            placement: Placement::default(),
            interface: InterfaceSettings::default(),
            router: RouterSettings::default(),
            node_routers: BTreeMap::new(),
            mobility: MobilitySettings::default(),
            traffic: TrafficSettings::default(),
            connectivity: ProximityMode::default(),
        }
    }
}

impl ScenarioConfig {
    /// Parse a scenario from JSON
    pub fn from_json(json: &str) -> SimResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a scenario file
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Router settings for node `index`
    pub fn router_for(&self, index: usize) -> &RouterSettings {
        u32::try_from(index)
            .ok()
            .and_then(|i| self.node_routers.get(&i))
            .unwrap_or(&self.router)
    }

    /// Number of steps needed to cover `duration`
    pub fn steps(&self) -> u64 {
        (self.duration / self.tick).ceil() as u64
    }

    /// Check every section, failing on the first bad value
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("duration", self.duration)?;
        if self.tick <= 0.0 || self.tick.is_nan() {
            return Err(ConfigError::NonPositiveValue {
                field: "tick",
                value: self.tick,
            });
        }
        non_negative("worldSize.width", self.world_size.width)?;
        non_negative("worldSize.height", self.world_size.height)?;

        match &self.placement {
            Placement::Random => {}
            Placement::Line { spacing } => non_negative("placement.spacing", *spacing)?,
            Placement::Explicit { positions } => {
                if positions.len() < self.nodes {
                    return Err(ConfigError::MissingField("placement.positions"));
                }
            }
        }

        self.interface.validate()?;
        self.router.validate()?;
        for (index, settings) in &self.node_routers {
            if *index as usize >= self.nodes {
                return Err(ConfigError::UnknownNodeIndex {
                    index: *index,
                    nodes: self.nodes,
                });
            }
            settings.validate()?;
        }

        non_negative("mobility.minSpeed", self.mobility.min_speed)?;
        non_negative("mobility.maxSpeed", self.mobility.max_speed)?;
        if self.mobility.max_speed < self.mobility.min_speed {
            return Err(ConfigError::NegativeValue {
                field: "mobility.maxSpeed - mobility.minSpeed",
                value: self.mobility.max_speed - self.mobility.min_speed,
            });
        }

        non_negative("traffic.interval", self.traffic.interval)?;
        if self.traffic.min_size == 0 {
            return Err(ConfigError::NonPositiveValue {
                field: "traffic.minSize",
                value: 0.0,
            });
        }
        if self.traffic.max_size < self.traffic.min_size {
            return Err(ConfigError::NegativeValue {
                field: "traffic.maxSize - traffic.minSize",
                value: self.traffic.max_size as f64 - self.traffic.min_size as f64,
            });
        }

        if let ProximityMode::Grid { cell_size } = self.connectivity {
            if cell_size <= 0.0 {
                return Err(ConfigError::NonPositiveValue {
                    field: "connectivity.cellSize",
                    value: cell_size,
                });
            }
            if cell_size < self.interface.range {
                return Err(ConfigError::CellSmallerThanRange {
                    cell_size,
                    range: self.interface.range,
                });
            }
        }
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value < 0.0 || value.is_nan() {
        return Err(ConfigError::NegativeValue { field, value });
    }
    Ok(())
}
