//! # Ferry Link
//!
//! The link layer of the Ferry simulator: network interfaces that discover
//! peers within radio range, bidirectional connections carrying at most one
//! transfer each, and the interference models that decide whether
//! overlapping receptions arrive intact.
//!
//! All interfaces and connections of a run live in one [`Network`], which
//! keeps both endpoints of every connection in sync. Connectivity changes
//! are reported as [`LinkEvent`]s so the caller can notify routers.

pub mod bus;
pub mod connection;
pub mod error;
pub mod interface;
pub mod interference;
pub mod network;
pub mod proximity;

pub use bus::*;
pub use connection::*;
pub use error::*;
pub use interface::*;
pub use interference::*;
pub use network::*;
pub use proximity::*;
