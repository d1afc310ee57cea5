//! # Ferry Simulation
//!
//! Scenario runner for the Ferry delay-tolerant network simulator.
//!
//! ## Overview
//!
//! A [`World`] places nodes in a rectangle, attaches one network interface
//! and one router to each, and advances everything in fixed ticks:
//!
//! - **Mobility** (`mobility.rs`): static placement or a seeded random walk
//! - **Traffic** (`traffic.rs`): periodic messages tagged with one of the
//!   creator's subscriptions
//! - **World** (`world.rs`): the step loop tying links and routers together
//! - **Reports** (`report.rs`): CSV drop report and plain text event log
//! - **Scenarios** (`scenarios.rs`): pre-built runs used by the CLI
//!
//! ## Example
//!
//! ```rust,ignore
//! use ferry_simulation::*;
//!
//! let config = ScenarioConfig::from_json(r#"{ "nodes": 5, "duration": 60.0 }"#)?;
//! let mut world = World::new(config)?;
//! world.run()?;
//! println!("delivery ratio {:.2}", world.stats().delivery_ratio());
//! ```

pub mod config;
pub mod error;
pub mod mobility;
pub mod report;
pub mod scenarios;
pub mod stats;
pub mod traffic;
pub mod world;

pub use config::*;
pub use error::*;
pub use mobility::Mobility;
pub use report::*;
pub use stats::SimStats;
pub use traffic::Traffic;
pub use world::*;
