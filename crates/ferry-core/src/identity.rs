//! Identities of simulated entities
//!
//! Nodes are indexed densely from zero so a world can store them in a
//! `Vec`. Interface addresses come from an [`AddressAllocator`] owned by the
//! simulation context, never from ambient global state.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Identifier of a simulated node (host)
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("n{_0}")]
pub struct NodeId(pub u32);

impl NodeId {
    /// Index of this node in dense per-node storage
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index as u32)
    }
}

/// Address of a network interface, unique within one simulation run
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("if{_0}")]
pub struct InterfaceAddress(pub u32);

/// Identifier of a connection between two interfaces
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("c{_0}")]
pub struct ConnectionId(pub u64);

/// Monotonic allocator for interface addresses and connection ids
///
/// One allocator lives in each simulation context. Calling [`reset`]
/// between runs restarts numbering so independent runs are reproducible.
///
/// [`reset`]: AddressAllocator::reset
#[derive(Debug, Clone, Default)]
pub struct AddressAllocator {
    next_address: u32,
    next_connection: u64,
}

impl AddressAllocator {
    /// Create an allocator starting at address 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next interface address
    pub fn next_address(&mut self) -> InterfaceAddress {
        let addr = InterfaceAddress(self.next_address);
        self.next_address += 1;
        addr
    }

    /// Hand out the next connection id
    pub fn next_connection(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        id
    }

    /// Restart numbering from zero
    pub fn reset(&mut self) {
        self.next_address = 0;
        self.next_connection = 0;
    }
}
