//! # Ferry Routing
//!
//! Store-and-forward routers for the Ferry simulator.
//!
//! ## Components
//!
//! - [`ForwardingOrder`]: which buffered message to try first
//! - [`MessageBuffer`]: byte-bounded message storage with eviction
//! - [`DisseminationMode`]: FLEXIBLE, STRICT and SEMI_POROUS offer/accept rules
//! - [`KnowledgeOfSurroundings`]: neighbor digests learned from HELLO messages
//! - [`Router`]: per-node router running either the subscription-gated
//!   epidemic policy or the HELLO-driven neighbor-aware policy
//!
//! Routers never own the network. Each update borrows it through a
//! [`RouterContext`] together with read access to every other router.

pub mod buffer;
pub mod dissemination;
pub mod epidemic;
pub mod error;
pub mod hello;
pub mod knowledge;
pub mod order;
pub mod router;

pub use buffer::*;
pub use dissemination::*;
pub use epidemic::*;
pub use error::*;
pub use hello::*;
pub use knowledge::*;
pub use order::*;
pub use router::*;
