//! Error types for Ferry
//!
//! Two classes of failure abort a simulation run: configuration errors
//! raised while building the world, and invariant violations that point at
//! a logic bug. Expected negative outcomes (denied sends, interfered
//! receptions, probabilistic rejections) are plain values and never show
//! up here.

use thiserror::Error;

/// Top-level error type for Ferry
#[derive(Debug, Error)]
pub enum FerryError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantError),
}

/// Errors detected while reading or validating configuration
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must not be negative (got {value})")]
    NegativeValue { field: &'static str, value: f64 },

    #[error("{field} must be positive (got {value})")]
    NonPositiveValue { field: &'static str, value: f64 },

    #[error("{field} value {value} in the settings is out of range")]
    ModeOutOfRange { field: &'static str, value: i64 },

    #[error("{field} must be within [0, 1] (got {value})")]
    ProbabilityOutOfRange { field: &'static str, value: f64 },

    #[error("Malformed subscription list '{spec}': {reason}")]
    MalformedSubscriptions { spec: String, reason: String },

    #[error("Unexpected combus ID {0}")]
    UnknownBusKey(String),

    #[error("Bus value for {key} has the wrong type")]
    BusValueType { key: String },

    #[error("Missing required setting: {0}")]
    MissingField(&'static str),

    #[error("Grid cell size {cell_size} is smaller than the radio range {range}")]
    CellSmallerThanRange { cell_size: f64, range: f64 },

    #[error("Settings refer to node {index} but the scenario has {nodes} nodes")]
    UnknownNodeIndex { index: u32, nodes: usize },
}

/// Violations of internal invariants; always fatal
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvariantError {
    #[error("Connection {connection} not found in the connection list of interface {peer}")]
    ConnectionNotInPeerList { connection: String, peer: String },

    #[error("Impossible to find message {0} among tracked message ids")]
    MissingTrackedMessage(String),

    #[error("Message {0} refused despite FLEXIBLE dissemination mode")]
    FlexibleModeRejected(String),

    #[error("Unknown interface {0}")]
    UnknownInterface(String),

    #[error("Unknown connection {0}")]
    UnknownConnection(String),

    #[error("Unknown node {0}")]
    UnknownNode(String),

    #[error("Failed to send HELLO message via interface {0}")]
    HelloBroadcastFailed(String),

    #[error("Connection {0} has no ongoing transfer")]
    NoOngoingTransfer(String),
}

/// Result type for Ferry operations
pub type FerryResult<T> = Result<T, FerryError>;
