//! Routing error types

use ferry_core::{ConfigError, FerryError, InvariantError};
use ferry_link::LinkError;
use thiserror::Error;

/// Errors that abort a router update
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),
}

impl From<RoutingError> for FerryError {
    fn from(err: RoutingError) -> Self {
        match err {
            RoutingError::Config(e) => FerryError::Config(e),
            RoutingError::Invariant(e) => FerryError::Invariant(e),
            RoutingError::Link(e) => e.into(),
        }
    }
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
