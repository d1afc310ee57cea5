//! Simulation world
//!
//! [`World`] owns the network, one router per node, mobility and traffic,
//! and advances them together one fixed tick at a time. Link layer events
//! are translated into router notifications and [`SimEvent`]s here.

use ferry_core::{
    Clock, ConfigError, Coord, EventLog, EventSink, InterfaceAddress, InvariantError, Message,
    NodeId, SimClock, SimEvent,
};
use ferry_link::{BusValue, CompletedTransfer, Interrupted, LinkEvent, Network};
use ferry_routing::{PeerRouters, Router, RouterContext};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, trace, warn};

use crate::config::{Placement, ScenarioConfig};
use crate::error::SimResult;
use crate::mobility::{Mobility, random_position};
use crate::stats::SimStats;
use crate::traffic::Traffic;

/// Seed offsets so each random stream of a world is independent
const PLACEMENT_STREAM: u64 = 0x5eed_0001;
const MOBILITY_STREAM: u64 = 0x5eed_0002;
const TRAFFIC_STREAM: u64 = 0x5eed_0003;
const ROUTER_STREAM: u64 = 0x5eed_1000;

/// A running simulation
#[derive(Debug)]
pub struct World {
    config: ScenarioConfig,
    clock: SimClock,
    steps: u64,
    network: Network,
    routers: Vec<Router>,
    interfaces: Vec<InterfaceAddress>,
    mobility: Mobility,
    traffic: Traffic,
    events: EventLog,
}

impl World {
    /// Build a world from a validated scenario
    pub fn new(config: ScenarioConfig) -> SimResult<Self> {
        config.validate()?;

        let mut placement_rng = StdRng::seed_from_u64(config.seed ^ PLACEMENT_STREAM);
        let mut network = Network::new(config.seed, config.connectivity);
        let mut routers = Vec::with_capacity(config.nodes);
        let mut interfaces = Vec::with_capacity(config.nodes);

        for index in 0..config.nodes {
            let location = match &config.placement {
                Placement::Random => random_position(&mut placement_rng, config.world_size),
                Placement::Line { spacing } => {
                    Coord::new(index as f64 * spacing, config.world_size.height / 2.0)
                }
                Placement::Explicit { positions } => positions
                    .get(index)
                    .copied()
                    .ok_or(ConfigError::MissingField("placement.positions"))?,
            };
            let host = network.add_host(location);
            interfaces.push(network.attach_interface(host, &config.interface)?);
            let seed = config.seed.wrapping_add(ROUTER_STREAM + index as u64);
            routers.push(Router::from_settings(host, config.router_for(index), seed)?);
        }

        let mobility = Mobility::new(
            config.mobility.clone(),
            config.world_size,
            config.nodes,
            config.seed ^ MOBILITY_STREAM,
        );
        let traffic = Traffic::new(config.traffic.clone(), config.nodes, config.seed ^ TRAFFIC_STREAM);

        info!(
            scenario = %config.name,
            nodes = config.nodes,
            seed = config.seed,
            "World created"
        );

        Ok(Self {
            config,
            clock: SimClock::new(),
            steps: 0,
            network,
            routers,
            interfaces,
            mobility,
            traffic,
            events: EventLog::new(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    pub fn router(&self, node: NodeId) -> Option<&Router> {
        self.routers.get(node.index())
    }

    /// Address of the interface attached to `node`
    pub fn interface_of(&self, node: NodeId) -> Option<InterfaceAddress> {
        self.interfaces.get(node.index()).copied()
    }

    pub fn events(&self) -> &[SimEvent] {
        self.events.events()
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    /// Counters over everything recorded so far
    pub fn stats(&self) -> SimStats {
        SimStats::from_events(self.events.events())
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Run until the configured duration is covered
    pub fn run(&mut self) -> SimResult<()> {
        let remaining = self.config.steps().saturating_sub(self.steps);
        self.run_ticks(remaining)?;
        let stats = self.stats();
        info!(
            time = self.now(),
            delivered = stats.messages_delivered,
            created = stats.messages_created,
            "Simulation complete"
        );
        Ok(())
    }

    /// Run for a specific number of ticks
    pub fn run_ticks(&mut self, ticks: u64) -> SimResult<()> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    /// Create a message at its source node right now
    ///
    /// Returns `false` if the source buffer has no room for it.
    pub fn create_message(&mut self, message: Message) -> SimResult<bool> {
        let now = self.now();
        let router = router_at(&mut self.routers, message.from)?;
        Ok(router.create_new_message(message, &self.network, now, &mut self.events)?)
    }

    /// Teleport a node; links are re-evaluated on the next tick
    pub fn move_node(&mut self, node: NodeId, location: Coord) -> SimResult<()> {
        let location = location.clamped(self.config.world_size.width, self.config.world_size.height);
        self.network.set_location(node, location)?;
        Ok(())
    }

    /// Switch the radio of a node on or off
    pub fn set_radio_active(&mut self, node: NodeId, active: bool) -> SimResult<()> {
        self.network.set_radio_active(node, active)?;
        Ok(())
    }

    /// Publish a live setting change on a node's bus
    pub fn update_property(&mut self, node: NodeId, key: &str, value: BusValue) -> SimResult<()> {
        self.network.update_property(node, key, value)?;
        Ok(())
    }

    /// Advance the world by one tick
    pub fn step(&mut self) -> SimResult<()> {
        let now = self.clock.advance(self.config.tick);
        self.steps += 1;
        trace!("=== Tick {} ({now:.2}s) ===", self.steps);

        // 1. Move nodes
        self.apply_mobility()?;

        // 2. Refresh links, notifying routers of every change
        for iface in self.interfaces.clone() {
            for event in self.network.update(iface, now)? {
                self.handle_link_event(event, now)?;
            }
        }

        // 3. Hand over finished transfers
        for con in self.network.completed_transfers(now) {
            let done = self.network.complete_transfer(con, now)?;
            self.dispatch_completed(done, now)?;
        }

        // 4. Generate traffic
        for message in self.traffic.generate(now, &mut self.routers) {
            let router = router_at(&mut self.routers, message.from)?;
            router.create_new_message(message, &self.network, now, &mut self.events)?;
        }

        // 5. Let every router act
        for index in 0..self.routers.len() {
            let Some((current, peers)) = PeerRouters::split(&mut self.routers, index) else {
                continue;
            };
            let mut ctx = RouterContext::new(now, &mut self.network, peers, &mut self.events);
            current.update(&mut ctx)?;
        }

        debug_assert!(self.network.is_symmetric());
        Ok(())
    }

    fn apply_mobility(&mut self) -> SimResult<()> {
        let positions: Vec<Coord> = self.network.hosts().iter().map(|h| h.location).collect();
        for (index, location) in self.mobility.step(&positions, self.config.tick) {
            self.network.set_location(NodeId(index as u32), location)?;
        }
        Ok(())
    }

    fn handle_link_event(&mut self, event: LinkEvent, now: f64) -> SimResult<()> {
        match event {
            LinkEvent::Up(link) => {
                self.events.emit(SimEvent::HostsConnected {
                    time: now,
                    a: link.local.node,
                    b: link.peer.node,
                });
                router_at(&mut self.routers, link.local.node)?.connection_up(&link);
                router_at(&mut self.routers, link.peer.node)?.connection_up(&link.reversed());
            }
            LinkEvent::Down { link, interrupted } => {
                self.events.emit(SimEvent::HostsDisconnected {
                    time: now,
                    a: link.local.node,
                    b: link.peer.node,
                });
                router_at(&mut self.routers, link.local.node)?.changed_connection(
                    &link,
                    interrupted.as_ref(),
                    now,
                    &mut self.events,
                );
                match interrupted {
                    Some(Interrupted::Aborted { message, from, to }) => {
                        warn!(message = %message.id, from = %from.node, to = %to.node, "Transfer aborted");
                    }
                    Some(Interrupted::Completed(done)) => self.dispatch_completed(done, now)?,
                    None => {}
                }
                router_at(&mut self.routers, link.local.node)?.connection_down(&link);
                router_at(&mut self.routers, link.peer.node)?.connection_down(&link.reversed());
            }
        }
        Ok(())
    }

    fn dispatch_completed(&mut self, done: CompletedTransfer, now: f64) -> SimResult<()> {
        let intact = done.received.is_some();
        match done.received {
            Some(received) => {
                let receiver = router_at(&mut self.routers, done.to.node)?;
                let outcome = receiver.message_transferred(
                    received,
                    done.from.node,
                    done.to.interface,
                    &self.network,
                    now,
                    &mut self.events,
                )?;
                debug!(
                    message = %done.message.id,
                    from = %done.from.node,
                    to = %done.to.node,
                    ?outcome,
                    "Transfer finished"
                );
            }
            None => {
                self.events.emit(SimEvent::TransmissionInterfered {
                    time: now,
                    message: done.message.clone(),
                    from: done.from.node,
                    to: done.to.node,
                });
            }
        }
        router_at(&mut self.routers, done.from.node)?.transfer_done(
            &done.message,
            done.to.node,
            intact,
            now,
            &mut self.events,
        )?;
        Ok(())
    }
}

fn router_at(routers: &mut [Router], node: NodeId) -> SimResult<&mut Router> {
    routers
        .get_mut(node.index())
        .ok_or_else(|| InvariantError::UnknownNode(node.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{MessageId, SubscriptionId};
    use ferry_link::RANGE_KEY;

    fn line_config(nodes: usize, spacing: f64) -> ScenarioConfig {
        ScenarioConfig {
            nodes,
            placement: Placement::Line { spacing },
            duration: 5.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_world_builds_one_router_per_node() {
        let world = World::new(line_config(4, 5.0)).unwrap();
        assert_eq!(world.routers().len(), 4);
        assert_eq!(world.network().host_count(), 4);
        assert_eq!(world.router(NodeId(2)).unwrap().host(), NodeId(2));
        assert_eq!(world.network().location(NodeId(1)), Some(Coord::new(5.0, 50.0)));
        assert!(world.interface_of(NodeId(3)).is_some());
        assert!(world.interface_of(NodeId(4)).is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ScenarioConfig {
            tick: -1.0,
            ..Default::default()
        };
        assert!(World::new(config).unwrap_err().is_config());
    }

    #[test]
    fn test_run_covers_duration() {
        let mut world = World::new(line_config(2, 5.0)).unwrap();
        world.run().unwrap();
        assert_eq!(world.steps(), 50);
        assert!((world.now() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_neighbors_connect_on_first_tick() {
        let mut world = World::new(line_config(2, 5.0)).unwrap();
        world.step().unwrap();
        assert_eq!(world.stats().connections_up, 1);
        assert!(world.network().is_symmetric());
    }

    #[test]
    fn test_created_message_is_delivered() {
        let mut world = World::new(line_config(2, 5.0)).unwrap();
        let message = Message::new("M1", NodeId(0), 1_000, 0.0).with_topic(SubscriptionId(1));
        assert!(world.create_message(message).unwrap());
        world.run_ticks(10).unwrap();

        let id = MessageId::from("M1");
        assert!(world.router(NodeId(1)).unwrap().delivered().contains(&id));
        assert_eq!(world.stats().messages_delivered, 1);
    }

    #[test]
    fn test_moving_away_disconnects() {
        let mut world = World::new(line_config(2, 5.0)).unwrap();
        world.step().unwrap();
        world.move_node(NodeId(1), Coord::new(90.0, 50.0)).unwrap();
        world.step().unwrap();
        assert_eq!(world.stats().connections_down, 1);
        assert!(world.network().connections().is_empty());
    }

    #[test]
    fn test_radio_off_drops_links() {
        let mut world = World::new(line_config(2, 5.0)).unwrap();
        world.step().unwrap();
        world.set_radio_active(NodeId(0), false).unwrap();
        world.step().unwrap();
        assert_eq!(world.stats().connections_down, 1);
        world.step().unwrap();
        assert_eq!(world.stats().connections_up, 1);
    }

    #[test]
    fn test_bus_range_change_applies() {
        let mut world = World::new(line_config(2, 15.0)).unwrap();
        world.step().unwrap();
        assert!(world.network().connections().is_empty());

        for node in [NodeId(0), NodeId(1)] {
            world.update_property(node, RANGE_KEY, BusValue::Float(20.0)).unwrap();
        }
        world.step().unwrap();
        assert_eq!(world.network().connections().len(), 1);
    }

    #[test]
    fn test_unknown_source_is_invariant_error() {
        let mut world = World::new(line_config(2, 5.0)).unwrap();
        let message = Message::new("M1", NodeId(9), 10, 0.0);
        assert!(!world.create_message(message).unwrap_err().is_config());
    }
}
