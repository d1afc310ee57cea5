//! Link layer error types

use ferry_core::{ConfigError, FerryError, InvariantError};
use thiserror::Error;

/// Errors raised by the link layer
///
/// Both variants are fatal for a run. Denied or failed sends are reported
/// through return codes instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantError),
}

impl From<LinkError> for FerryError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Config(e) => FerryError::Config(e),
            LinkError::Invariant(e) => FerryError::Invariant(e),
        }
    }
}

/// Result type for link layer operations
pub type LinkResult<T> = Result<T, LinkError>;
