//! Per-host communication bus for live-tunable parameters
//!
//! Modules publish values under string keys; interested modules subscribe
//! to a key and are told whenever it changes. The bus only stores values
//! and subscriber lists. Delivering the change is up to the owner of the
//! subscribers (see [`Network::update_property`]).
//!
//! [`Network::update_property`]: crate::network::Network::update_property

use std::collections::BTreeMap;

use ferry_core::{ConfigError, InterfaceAddress};
use serde::{Deserialize, Serialize};

/// Key for the scan interval of a host's interfaces
pub const SCAN_INTERVAL_KEY: &str = "Network.scanInterval";
/// Key for the radio range of a host's interfaces
pub const RANGE_KEY: &str = "Network.radioRange";
/// Key for the transmit speed of a host's interfaces
pub const SPEED_KEY: &str = "Network.speed";

/// A value published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BusValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl BusValue {
    /// Numeric view of the value
    pub fn as_f64(&self, key: &str) -> Result<f64, ConfigError> {
        match self {
            BusValue::Int(v) => Ok(*v as f64),
            BusValue::Float(v) => Ok(*v),
            BusValue::Text(_) => Err(ConfigError::BusValueType {
                key: key.to_string(),
            }),
        }
    }
}

impl From<f64> for BusValue {
    fn from(v: f64) -> Self {
        BusValue::Float(v)
    }
}

impl From<i64> for BusValue {
    fn from(v: i64) -> Self {
        BusValue::Int(v)
    }
}

/// Key/value store with change subscriptions
#[derive(Debug, Clone, Default)]
pub struct ComBus {
    values: BTreeMap<String, BusValue>,
    subscribers: BTreeMap<String, Vec<InterfaceAddress>>,
}

impl ComBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `addr` for changes of `key`
    pub fn subscribe(&mut self, key: &str, addr: InterfaceAddress) {
        let subs = self.subscribers.entry(key.to_string()).or_default();
        if !subs.contains(&addr) {
            subs.push(addr);
        }
    }

    pub fn unsubscribe(&mut self, key: &str, addr: InterfaceAddress) {
        if let Some(subs) = self.subscribers.get_mut(key) {
            subs.retain(|a| *a != addr);
        }
    }

    /// Store a new value and return the subscribers to notify
    pub fn update_property(&mut self, key: &str, value: BusValue) -> Vec<InterfaceAddress> {
        self.values.insert(key.to_string(), value);
        self.subscribers.get(key).cloned().unwrap_or_default()
    }

    pub fn property(&self, key: &str) -> Option<&BusValue> {
        self.values.get(key)
    }

    pub fn subscribers(&self, key: &str) -> &[InterfaceAddress] {
        self.subscribers.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}
