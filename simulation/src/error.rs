//! Simulation error types

use ferry_core::{ConfigError, FerryError, InvariantError};
use ferry_link::LinkError;
use ferry_routing::RoutingError;
use thiserror::Error;

/// Errors that stop a simulation run
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantError),

    #[error("Scenario file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FerryError> for SimError {
    fn from(err: FerryError) -> Self {
        match err {
            FerryError::Config(e) => SimError::Config(e),
            FerryError::Invariant(e) => SimError::Invariant(e),
        }
    }
}

impl From<LinkError> for SimError {
    fn from(err: LinkError) -> Self {
        FerryError::from(err).into()
    }
}

impl From<RoutingError> for SimError {
    fn from(err: RoutingError) -> Self {
        FerryError::from(err).into()
    }
}

impl SimError {
    /// Whether the run failed on bad settings rather than a logic bug
    pub fn is_config(&self) -> bool {
        matches!(self, SimError::Config(_) | SimError::Json(_))
    }
}

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;
