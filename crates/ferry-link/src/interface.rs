//! Network interfaces
//!
//! An interface belongs to one host and owns the ids of its connections;
//! the connections themselves live in the network's [`ConnectionTable`].
//! Two media are supported, picked by [`InterfaceKind`]:
//!
//! - **Broadcast**: fixed transmit speed
//! - **DistanceCapacity**: speed drops in bands as the peer moves away

use ferry_core::{ConfigError, ConnectionId, InterfaceAddress, MessageId, NodeId};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bus::{BusValue, RANGE_KEY, SCAN_INTERVAL_KEY, SPEED_KEY};
use crate::connection::{Connection, ConnectionTable};
use crate::interference::{InterferenceKind, InterferenceModel};

/// Medium of an interface
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterfaceKind {
    #[default]
    Broadcast,
    /// Speed table ordered from nearest band to farthest
    DistanceCapacity { speeds: Vec<f64> },
}

/// Prototype settings an interface is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceSettings {
    /// Type tag; only interfaces with equal tags connect
    pub interface_type: String,
    pub kind: InterfaceKind,
    /// Transmit range in meters
    pub range: f64,
    /// Transmit speed in bytes per second
    pub speed: f64,
    /// Seconds between scans, 0 to scan continuously
    pub scan_interval: f64,
    pub interference: InterferenceKind,
}

impl Default for InterfaceSettings {
    fn default() -> Self {
        Self {
            interface_type: "radio".to_string(),
            kind: InterfaceKind::Broadcast,
            range: 10.0,
            speed: 250_000.0,
            scan_interval: 0.0,
            interference: InterferenceKind::Ideal,
        }
    }
}

impl InterfaceSettings {
    /// Reject negative ranges, speeds, and intervals
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("transmitRange", self.range)?;
        non_negative("transmitSpeed", self.speed)?;
        non_negative("scanInterval", self.scan_interval)?;
        if let InterfaceKind::DistanceCapacity { speeds } = &self.kind {
            if speeds.is_empty() {
                return Err(ConfigError::MissingField("transmitSpeeds"));
            }
            for speed in speeds {
                non_negative("transmitSpeeds", *speed)?;
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

/// A live network interface attached to a host
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    address: InterfaceAddress,
    host: NodeId,
    interface_type: String,
    kind: InterfaceKind,
    range: f64,
    speed: f64,
    scan_interval: f64,
    last_scan_time: f64,
    connections: Vec<ConnectionId>,
    interference: InterferenceModel,
}

impl NetworkInterface {
    /// Build an interface from validated settings
    pub fn from_settings(
        settings: &InterfaceSettings,
        address: InterfaceAddress,
        host: NodeId,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            address,
            host,
            interface_type: settings.interface_type.clone(),
            kind: settings.kind.clone(),
            range: settings.range,
            speed: settings.speed,
            scan_interval: settings.scan_interval,
            last_scan_time: 0.0,
            connections: Vec::new(),
            interference: InterferenceModel::new(settings.interference),
        })
    }

    pub fn address(&self) -> InterfaceAddress {
        self.address
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    pub fn interface_type(&self) -> &str {
        &self.interface_type
    }

    pub fn kind(&self) -> &InterfaceKind {
        &self.kind
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn scan_interval(&self) -> f64 {
        self.scan_interval
    }

    pub fn last_scan_time(&self) -> f64 {
        self.last_scan_time
    }

    pub fn set_last_scan_time(&mut self, time: f64) {
        self.last_scan_time = time;
    }

    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }

    pub(crate) fn add_connection(&mut self, id: ConnectionId) {
        self.connections.push(id);
    }

    /// Remove `id` from the list; false if it was not there
    pub(crate) fn remove_connection(&mut self, id: ConnectionId) -> bool {
        match self.connections.iter().position(|c| *c == id) {
            Some(index) => {
                self.connections.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn interference(&self) -> &InterferenceModel {
        &self.interference
    }

    pub fn interference_mut(&mut self) -> &mut InterferenceModel {
        &mut self.interference
    }

    /// Scan gating
    ///
    /// With a scan interval the interface scans only at the instant an
    /// interval boundary is crossed. Repeated calls at that same instant
    /// keep answering true so every candidate of one update is checked.
    pub fn is_scanning(&mut self, now: f64) -> bool {
        if self.scan_interval > 0.0 {
            if now < self.last_scan_time {
                return false;
            }
            if now > self.last_scan_time + self.scan_interval {
                trace!(interface = %self.address, now, "Scan window opened");
                self.last_scan_time = now;
                return true;
            }
            if now != self.last_scan_time {
                return false;
            }
        }
        true
    }

    /// Transmit speed towards a peer at `distance`
    pub fn speed_at(&self, distance: f64) -> f64 {
        match &self.kind {
            InterfaceKind::Broadcast => self.speed,
            InterfaceKind::DistanceCapacity { speeds } => {
                if speeds.is_empty() {
                    return self.speed;
                }
                if self.range <= 0.0 {
                    return speeds[0];
                }
                let band = ((distance / self.range) * speeds.len() as f64).floor();
                let index = (band.max(0.0) as usize).min(speeds.len() - 1);
                speeds[index]
            }
        }
    }

    /// Any connection is up and carrying a transfer
    pub fn is_busy(&self, table: &ConnectionTable) -> bool {
        self.live(table).any(|c| c.is_up() && !c.is_idle())
    }

    pub fn is_sending_data(&self, table: &ConnectionTable) -> bool {
        self.live(table).any(|c| c.is_sender_interface(self.address))
    }

    pub fn is_receiving_data(&self, table: &ConnectionTable) -> bool {
        self.live(table).any(|c| c.is_receiver_interface(self.address))
    }

    /// At least one connection is up and idle
    pub fn is_ready_to_begin_transfer(&self, table: &ConnectionTable) -> bool {
        self.live(table).any(|c| c.is_ready_for_transfer())
    }

    /// This interface is sending message `id` on some connection
    pub fn is_sending_message(&self, id: &MessageId, table: &ConnectionTable) -> bool {
        self.live(table)
            .any(|c| c.is_sender_interface(self.address) && c.is_transferring_message(id))
    }

    /// Apply a bus change to this interface's tunables
    pub fn module_value_changed(&mut self, key: &str, value: &BusValue) -> Result<(), ConfigError> {
        let v = value.as_f64(key)?;
        match key {
            SCAN_INTERVAL_KEY => {
                non_negative("scanInterval", v)?;
                self.scan_interval = v;
            }
            RANGE_KEY => {
                non_negative("transmitRange", v)?;
                self.range = v;
            }
            SPEED_KEY => {
                non_negative("transmitSpeed", v)?;
                self.speed = v;
            }
            _ => return Err(ConfigError::UnknownBusKey(key.to_string())),
        }
        trace!(interface = %self.address, key, value = v, "Interface setting changed");
        Ok(())
    }

    fn live<'a>(
        &'a self,
        table: &'a ConnectionTable,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter_map(|id| table.get(*id))
    }
}
