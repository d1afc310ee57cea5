//! # Ferry Core
//!
//! Core types, events, and errors shared by the Ferry delay-tolerant
//! network simulator.
//!
//! ## Key Types
//!
//! - [`NodeId`], [`InterfaceAddress`], [`ConnectionId`]: identities of the
//!   simulated entities
//! - [`AddressAllocator`]: resettable counter handing out interface addresses
//! - [`Message`]: a simulated message with its mutable routing metadata
//! - [`SubscriptionList`]: the set of topics a node is interested in
//! - [`SimEvent`] and [`EventSink`]: listener notifications
//! - [`SimClock`]: the discrete simulated clock

pub mod clock;
pub mod error;
pub mod event;
pub mod geometry;
pub mod identity;
pub mod message;
pub mod subscription;

// Re-export main types
pub use clock::*;
pub use error::*;
pub use event::*;
pub use geometry::*;
pub use identity::*;
pub use message::*;
pub use subscription::*;
