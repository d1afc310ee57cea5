//! Pre-defined simulation scenarios
//!
//! Each scenario has a `*_config` builder, usable from tests, and a
//! `run_*_scenario` function that drives it and prints a summary.

use ferry_core::{Message, NodeId, SubscriptionId};
use ferry_link::ProximityMode;
use ferry_routing::{PolicyKind, RouterSettings};
use tracing::info;

use crate::config::{MobilityModel, MobilitySettings, Placement, ScenarioConfig, TrafficSettings, WorldSize};
use crate::error::SimResult;
use crate::world::World;

/// Scenarios selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BuiltinScenario {
    /// Two static neighbors exchanging a few messages
    Pair,
    /// A relay that rarely keeps foreign messages
    SemiPorous,
    /// HELLO-driven forwarding along a line
    Hello,
    /// A strict relay that isolates a subscriber
    Strict,
    /// Walking nodes with periodic traffic
    RandomWalk,
}

impl BuiltinScenario {
    pub fn config(self) -> ScenarioConfig {
        match self {
            BuiltinScenario::Pair => pair_config(),
            BuiltinScenario::SemiPorous => semi_porous_config(),
            BuiltinScenario::Hello => hello_config(),
            BuiltinScenario::Strict => strict_config(),
            BuiltinScenario::RandomWalk => random_walk_config(),
        }
    }

    pub fn run(self) -> SimResult<World> {
        match self {
            BuiltinScenario::Pair => run_pair_scenario(),
            BuiltinScenario::SemiPorous => run_semi_porous_scenario(),
            BuiltinScenario::Hello => run_hello_scenario(),
            BuiltinScenario::Strict => run_strict_scenario(),
            BuiltinScenario::RandomWalk => run_random_walk_scenario(),
        }
    }
}

fn router(mode: i64, subscriptions: &str) -> RouterSettings {
    RouterSettings {
        mode,
        subscriptions: subscriptions.to_string(),
        ..Default::default()
    }
}

fn line(name: &str, nodes: usize, spacing: f64, duration: f64) -> ScenarioConfig {
    ScenarioConfig {
        name: name.to_string(),
        nodes,
        duration,
        placement: Placement::Line { spacing },
        ..Default::default()
    }
}

/// Create `count` messages on `topic` at `node`
fn publish(world: &mut World, node: u32, topic: u32, count: usize) -> SimResult<usize> {
    let mut created = 0;
    for i in 0..count {
        let message = Message::new(format!("M{node}_{i}"), NodeId(node), 1_000, world.now())
            .with_topic(SubscriptionId(topic));
        if world.create_message(message)? {
            created += 1;
        }
    }
    Ok(created)
}

/// Print the statistics block shared by every scenario
pub fn print_final_statistics(world: &World) {
    let stats = world.stats();
    println!("\n=== Final Statistics ===");
    println!("  Simulated time: {:.1}s", world.now());
    println!("  Messages created: {}", stats.messages_created);
    println!("  Transfers started: {}", stats.transfers_started);
    println!("  Deliveries: {}", stats.messages_delivered);
    println!("  Relayed copies: {}", stats.messages_relayed);
    println!("  Aborted: {}", stats.transfers_aborted);
    println!("  Interfered: {}", stats.receptions_interfered);
    println!("  Dropped: {}", stats.messages_dropped);
    println!("  Discarded: {}", stats.messages_discarded);
    println!("  Expired: {}", stats.messages_expired);
    println!("  Delivery ratio: {:.1}%", stats.delivery_ratio() * 100.0);
    if stats.messages_delivered > 0 {
        println!("  Average latency: {:.3}s", stats.average_latency());
        println!("  Average hops: {:.2}", stats.average_hops());
    }
}

// ============================================================================
// Pair
// ============================================================================

pub fn pair_config() -> ScenarioConfig {
    line("pair", 2, 5.0, 10.0)
}

/// Two nodes 5 m apart; node 0 publishes three messages its peer wants
pub fn run_pair_scenario() -> SimResult<World> {
    info!("=== Running Pair Scenario ===");
    let mut world = World::new(pair_config())?;

    println!("\n--- n0 publishes 3 messages on topic 1 ---");
    publish(&mut world, 0, 1, 3)?;
    world.run()?;

    print_final_statistics(&world);
    Ok(world)
}

// ============================================================================
// Semi-porous relay
// ============================================================================

/// n0 (topic 1) - n1 (relay, topic 2, keeps 20%) - n2 (topic 1)
pub fn semi_porous_config() -> ScenarioConfig {
    let mut config = line("semi-porous", 3, 8.0, 60.0);
    config.router = router(0, "1");
    config.node_routers.insert(
        1,
        RouterSettings {
            msg_diss_probability: Some(1.0),
            msg_accept_probability: Some(0.2),
            ..router(2, "2")
        },
    );
    config
}

pub fn run_semi_porous_scenario() -> SimResult<World> {
    info!("=== Running Semi-Porous Scenario ===");
    let mut world = World::new(semi_porous_config())?;

    println!("\n--- n0 publishes 20 messages; the relay keeps about one in five ---");
    publish(&mut world, 0, 1, 20)?;
    world.run()?;

    print_final_statistics(&world);
    Ok(world)
}

// ============================================================================
// HELLO
// ============================================================================

/// Five neighbor-aware nodes on a line with periodic traffic
pub fn hello_config() -> ScenarioConfig {
    let mut config = line("hello", 5, 8.0, 120.0);
    config.router = RouterSettings {
        policy: PolicyKind::NeighborAware,
        ping_interval: 1.0,
        subscriptions: "1-3".to_string(),
        ..Default::default()
    };
    config.traffic = TrafficSettings {
        interval: 10.0,
        ..Default::default()
    };
    config
}

pub fn run_hello_scenario() -> SimResult<World> {
    info!("=== Running HELLO Scenario ===");
    let mut world = World::new(hello_config())?;
    world.run()?;

    println!("\n--- Knowledge of surroundings ---");
    for router in world.routers() {
        let known = router.knowledge().map_or(0, |k| k.len());
        println!("  {} knows {} neighbor(s)", router.host(), known);
    }

    print_final_statistics(&world);
    Ok(world)
}

// ============================================================================
// Strict relay
// ============================================================================

/// n0 (topic 1) - n1 (strict, topic 2) - n2 (topic 1)
pub fn strict_config() -> ScenarioConfig {
    let mut config = line("strict", 3, 8.0, 30.0);
    config.router = router(0, "1");
    config.node_routers.insert(1, router(1, "2"));
    config
}

pub fn run_strict_scenario() -> SimResult<World> {
    info!("=== Running Strict Scenario ===");
    let mut world = World::new(strict_config())?;

    println!("\n--- n0 publishes 5 messages; n2 is reachable only through n1 ---");
    publish(&mut world, 0, 1, 5)?;
    world.run()?;

    let isolated = world.router(NodeId(2)).is_some_and(|r| r.delivered().is_empty());
    println!("  n2 isolated: {isolated}");

    print_final_statistics(&world);
    Ok(world)
}

// ============================================================================
// Random walk
// ============================================================================

pub fn random_walk_config() -> ScenarioConfig {
    ScenarioConfig {
        name: "random-walk".to_string(),
        nodes: 20,
        duration: 600.0,
        world_size: WorldSize {
            width: 200.0,
            height: 200.0,
        },
        router: RouterSettings {
            subscriptions: "1-4".to_string(),
            buffer_size: Some(50_000),
            msg_ttl: Some(300.0),
            ..Default::default()
        },
        mobility: MobilitySettings {
            model: MobilityModel::RandomWalk,
            min_speed: 0.5,
            max_speed: 1.5,
        },
        traffic: TrafficSettings {
            interval: 30.0,
            random_priority: true,
            ..Default::default()
        },
        connectivity: ProximityMode::Grid { cell_size: 10.0 },
        ..Default::default()
    }
}

pub fn run_random_walk_scenario() -> SimResult<World> {
    info!("=== Running Random Walk Scenario ===");
    let mut world = World::new(random_walk_config())?;
    world.run()?;

    print_final_statistics(&world);
    Ok(world)
}
