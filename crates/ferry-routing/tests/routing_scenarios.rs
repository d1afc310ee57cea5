//! Routing scenario tests
//!
//! Runs routers on top of a real [`Network`] with a minimal step loop:
//! - Dissemination mode bounds (FLEXIBLE, STRICT, SEMI_POROUS)
//! - Direct delivery to subscribers
//! - HELLO exchange and neighbor knowledge

use ferry_core::{
    Coord, DropMode, EventLog, InterfaceAddress, Message, MessageId, NodeId, SimEvent,
    SubscriptionId,
};
use ferry_link::{InterfaceSettings, Interrupted, LinkEvent, Network, ProximityMode};
use ferry_routing::{PeerRouters, PolicyKind, Router, RouterContext, RouterSettings};

// ============================================================================
// Harness
// ============================================================================

const TICK: f64 = 0.1;

struct Harness {
    network: Network,
    routers: Vec<Router>,
    interfaces: Vec<InterfaceAddress>,
    events: EventLog,
    now: f64,
}

impl Harness {
    /// One host per x position, each with its own router settings
    fn new(xs: &[f64], settings: &[RouterSettings]) -> Self {
        let mut network = Network::new(3, ProximityMode::AllPairs);
        let iface = InterfaceSettings::default();
        let mut interfaces = Vec::new();
        let mut routers = Vec::new();
        for (i, (x, s)) in xs.iter().zip(settings).enumerate() {
            let host = network.add_host(Coord::new(*x, 0.0));
            interfaces.push(network.attach_interface(host, &iface).unwrap());
            routers.push(Router::from_settings(host, s, 100 + i as u64).unwrap());
        }
        Self {
            network,
            routers,
            interfaces,
            events: EventLog::new(),
            now: 0.0,
        }
    }

    fn create(&mut self, node: u32, message: Message) {
        let created = self.routers[node as usize]
            .create_new_message(message, &self.network, self.now, &mut self.events)
            .unwrap();
        assert!(created);
    }

    fn step(&mut self) {
        self.now += TICK;

        for iface in self.interfaces.clone() {
            for event in self.network.update(iface, self.now).unwrap() {
                self.handle_link_event(event);
            }
        }

        for con in self.network.completed_transfers(self.now) {
            let done = self.network.complete_transfer(con, self.now).unwrap();
            self.deliver(done);
        }

        for i in 0..self.routers.len() {
            let (current, peers) = PeerRouters::split(&mut self.routers, i).unwrap();
            let mut ctx = RouterContext::new(self.now, &mut self.network, peers, &mut self.events);
            current.update(&mut ctx).unwrap();
        }
    }

    fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.step();
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Up(link) => {
                self.routers[link.local.node.index()].connection_up(&link);
                self.routers[link.peer.node.index()].connection_up(&link.reversed());
            }
            LinkEvent::Down { link, interrupted } => {
                self.routers[link.local.node.index()].changed_connection(
                    &link,
                    interrupted.as_ref(),
                    self.now,
                    &mut self.events,
                );
                if let Some(Interrupted::Completed(done)) = interrupted {
                    self.deliver(done);
                }
                self.routers[link.local.node.index()].connection_down(&link);
                self.routers[link.peer.node.index()].connection_down(&link.reversed());
            }
        }
    }

    fn deliver(&mut self, done: ferry_link::CompletedTransfer) {
        self.routers[done.from.node.index()]
            .transfer_done(
                &done.message,
                done.to.node,
                done.received.is_some(),
                self.now,
                &mut self.events,
            )
            .unwrap();
        if let Some(received) = done.received {
            self.routers[done.to.node.index()]
                .message_transferred(
                    received,
                    done.from.node,
                    done.to.interface,
                    &self.network,
                    self.now,
                    &mut self.events,
                )
                .unwrap();
        }
    }

    fn router(&self, node: u32) -> &Router {
        &self.routers[node as usize]
    }

    fn started_to(&self, node: u32) -> usize {
        self.events
            .events()
            .iter()
            .filter(|e| matches!(e, SimEvent::TransferStarted { to, .. } if *to == NodeId(node)))
            .count()
    }

    fn discards_at(&self, node: u32) -> Vec<String> {
        self.events
            .deletions(DropMode::Discarded)
            .filter_map(|e| match e {
                SimEvent::MessageDeleted { node: n, cause, .. } if *n == NodeId(node) => {
                    Some(cause.clone())
                }
                _ => None,
            })
            .collect()
    }
}

fn epidemic(mode: i64, subscriptions: &str) -> RouterSettings {
    RouterSettings {
        mode,
        subscriptions: subscriptions.to_string(),
        ..Default::default()
    }
}

fn neighbor_aware(subscriptions: &str) -> RouterSettings {
    RouterSettings {
        policy: PolicyKind::NeighborAware,
        ping_interval: 1.0,
        subscriptions: subscriptions.to_string(),
        ..Default::default()
    }
}

fn topic_msg(id: &str, from: u32, topic: u32) -> Message {
    Message::new(id, NodeId(from), 1_000, 0.0).with_topic(SubscriptionId(topic))
}

// ============================================================================
// Dissemination modes
// ============================================================================

#[test]
fn test_semi_porous_receiver_rejects_everything() {
    let sender = RouterSettings {
        msg_diss_probability: Some(1.0),
        msg_accept_probability: Some(1.0),
        ..epidemic(2, "1")
    };
    let receiver = RouterSettings {
        msg_diss_probability: Some(1.0),
        msg_accept_probability: Some(0.0),
        ..epidemic(2, "2")
    };
    let mut h = Harness::new(&[0.0, 5.0], &[sender, receiver]);
    h.create(0, topic_msg("M1", 0, 1));

    for _ in 0..40 {
        h.step();
        assert!(h.router(1).buffer().is_empty());
    }

    let started = h.started_to(1);
    let discards = h.discards_at(1);
    assert!(started > 5, "sender should keep offering, started {started}");
    assert!(started - discards.len() <= 1, "one discard per completed offer");
    assert!(discards.iter().all(|c| c.contains("semi-porous") && c.ends_with('1')));
}

#[test]
fn test_strict_rejects_foreign_topics() {
    let mut h = Harness::new(&[0.0, 5.0], &[epidemic(0, "1"), epidemic(1, "3")]);
    h.create(0, topic_msg("M1", 0, 1));
    h.create(0, topic_msg("M2", 0, 2));
    h.run(30);

    assert!(h.router(1).buffer().is_empty());
    let discards = h.discards_at(1);
    assert!(!discards.is_empty());
    assert!(discards.iter().all(|c| c == "strict dissemination mode"));
}

#[test]
fn test_strict_still_delivers_to_subscribers() {
    let mut h = Harness::new(
        &[0.0, 5.0, 14.0],
        &[epidemic(1, "9"), epidemic(1, "1"), epidemic(1, "7")],
    );
    h.create(0, topic_msg("M1", 0, 1));
    h.run(30);

    let id = MessageId::from("M1");
    assert!(h.router(1).delivered().contains(&id));
    assert!(!h.router(2).has_received(&id));
    assert!(h.discards_at(1).is_empty());
}

#[test]
fn test_flexible_never_rejects_and_relays() {
    let mut h = Harness::new(
        &[0.0, 8.0, 16.0],
        &[epidemic(0, "4"), epidemic(0, "5"), epidemic(0, "1")],
    );
    h.create(0, topic_msg("M1", 0, 1));
    h.run(40);

    let id = MessageId::from("M1");
    assert!(h.router(1).has_message(&id), "relay keeps a copy");
    assert!(h.router(2).delivered().contains(&id));
    assert_eq!(h.events.deletions(DropMode::Discarded).count(), 0);

    let relayed = h.router(2).buffer().get(&id).unwrap();
    assert_eq!(relayed.hop_count, 2);
}

#[test]
fn test_no_duplicate_deliveries() {
    let mut h = Harness::new(&[0.0, 5.0], &[epidemic(0, "1"), epidemic(0, "1")]);
    h.create(0, topic_msg("M1", 0, 1));
    h.run(40);

    let arrivals = h
        .events
        .events()
        .iter()
        .filter(|e| matches!(e, SimEvent::MessageTransferred { to, .. } if *to == NodeId(1)))
        .count();
    assert_eq!(arrivals, 1);
}

// ============================================================================
// HELLO protocol
// ============================================================================

#[test]
fn test_hello_exchange_fills_knowledge() {
    let mut h = Harness::new(&[0.0, 5.0], &[neighbor_aware("3"), neighbor_aware("1,2")]);
    h.create(0, topic_msg("M1", 0, 1));
    h.create(0, topic_msg("M2", 0, 5));
    h.run(30);

    let a = h.router(0);
    let b = h.router(1);
    let info = b
        .knowledge()
        .unwrap()
        .neighbor(h.interfaces[1], NodeId(0))
        .expect("B heard A's HELLO");
    assert_eq!(info.message_ids, a.hello_policy().unwrap().received_ids());
    assert_eq!(info.subscriptions, *a.subscriptions());

    assert!(b.buffer().iter().all(|m| !m.is_hello()));
    assert!(!h.events.events().iter().any(|e| matches!(
        e,
        SimEvent::MessageTransferred { message, .. } if message.is_hello()
    )));
}

#[test]
fn test_hello_targets_interested_neighbor() {
    let mut h = Harness::new(&[0.0, 5.0], &[neighbor_aware("3"), neighbor_aware("1")]);
    h.create(0, topic_msg("M1", 0, 1));
    h.run(40);

    let id = MessageId::from("M1");
    assert!(h.router(1).delivered().contains(&id));
    assert_eq!(h.router(1).hello_policy().unwrap().received_ids(), &[id]);
}

#[test]
fn test_hello_needs_known_neighbor_before_forwarding() {
    let mut h = Harness::new(&[0.0, 5.0], &[neighbor_aware("3"), neighbor_aware("1")]);
    h.create(0, topic_msg("M1", 0, 1));
    h.run(5);

    assert!(h.router(1).buffer().is_empty());
    assert!(h.router(1).knowledge().unwrap().is_empty());
}

#[test]
fn test_knowledge_forgotten_on_disconnect() {
    let mut h = Harness::new(&[0.0, 5.0], &[neighbor_aware("3"), neighbor_aware("1")]);
    h.run(30);
    assert!(h.router(1).knowledge().unwrap().neighbor(h.interfaces[1], NodeId(0)).is_some());

    h.network.set_location(NodeId(1), Coord::new(50.0, 0.0)).unwrap();
    h.step();
    assert!(h.router(1).knowledge().unwrap().is_empty());
}
