//! Per-node routers
//!
//! A [`Router`] owns what one node carries: its buffer, the ids of
//! messages delivered to it, its subscriptions and its seeded random
//! source. The routing policy on top is a closed set of variants, either
//! subscription-gated epidemic flooding or HELLO-driven neighbor-aware
//! forwarding.
//!
//! Routers do not own the network. A round borrows it through a
//! [`RouterContext`], together with read access to every other router so
//! the sender can ask receivers whether they take a message.

use std::collections::BTreeSet;

use ferry_core::{
    ConfigError, DropMode, EventSink, InterfaceAddress, Message, MessageId, NodeId, SimEvent,
    SubscriptionId, SubscriptionList,
};
use ferry_link::{Interrupted, LinkInfo, Network, ReceiveGate, ReceiveVerdict};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::buffer::MessageBuffer;
use crate::dissemination::DisseminationMode;
use crate::epidemic::EpidemicPolicy;
use crate::error::RoutingResult;
use crate::hello::{DEFAULT_PING_INTERVAL, HelloPolicy};
use crate::knowledge::KnowledgeOfSurroundings;
use crate::order::ForwardingOrder;

/// Cause attached to evictions
pub const BUFFER_FULL_CAUSE: &str = "buffer full";
/// Cause attached to TTL expirations
pub const TTL_EXPIRED_CAUSE: &str = "ttl expired";
/// Cause attached to copies removed once their destination has them
pub const DELIVERED_CAUSE: &str = "delivered to destination";
/// Cause recorded when a link loss cuts a transfer short
pub const CONNECTION_LOST_CAUSE: &str = "connection lost";

/// Which routing policy a router runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Epidemic,
    NeighborAware,
}

/// Router settings as read from a scenario file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub policy: PolicyKind,
    /// Dissemination mode code: 0 FLEXIBLE, 1 STRICT, 2 SEMI_POROUS
    pub mode: i64,
    /// SEMI_POROUS send probability
    pub msg_diss_probability: Option<f64>,
    /// SEMI_POROUS receive probability
    pub msg_accept_probability: Option<f64>,
    /// Seconds between HELLOs (neighbor-aware only)
    pub ping_interval: f64,
    /// Subscription spec such as `"1,2,5-8"`
    pub subscriptions: String,
    /// Buffer capacity in bytes, unbounded if absent
    pub buffer_size: Option<u64>,
    /// TTL in seconds given to created messages that have none
    pub msg_ttl: Option<f64>,
    pub forwarding_order: ForwardingOrder,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Epidemic,
            mode: 0,
            msg_diss_probability: None,
            msg_accept_probability: None,
            ping_interval: DEFAULT_PING_INTERVAL,
            subscriptions: "1".to_string(),
            buffer_size: None,
            msg_ttl: None,
            forwarding_order: ForwardingOrder::default(),
        }
    }
}

impl RouterSettings {
    /// Check every value, failing on the first bad one
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dissemination_mode()?;
        self.subscription_list()?;
        if self.ping_interval < 0.0 {
            return Err(ConfigError::NegativeValue {
                field: "pingInterval",
                value: self.ping_interval,
            });
        }
        if let Some(ttl) = self.msg_ttl.filter(|ttl| *ttl < 0.0) {
            return Err(ConfigError::NegativeValue {
                field: "msgTtl",
                value: ttl,
            });
        }
        Ok(())
    }

    pub fn dissemination_mode(&self) -> Result<DisseminationMode, ConfigError> {
        DisseminationMode::from_setting(
            self.mode,
            self.msg_diss_probability,
            self.msg_accept_probability,
        )
    }

    pub fn subscription_list(&self) -> Result<SubscriptionList, ConfigError> {
        SubscriptionList::parse(&self.subscriptions)
    }
}

/// What happened to a message handed to the receiving router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceptionOutcome {
    /// Control traffic, folded into neighbor knowledge
    Hello,
    /// Stored
    Accepted {
        first_delivery: bool,
        final_target: bool,
    },
    /// Refused by the dissemination mode
    Discarded,
    /// No room left in the buffer
    Dropped,
}

/// State shared by every routing policy
#[derive(Debug, Clone)]
pub struct RouterCore {
    pub(crate) host: NodeId,
    pub(crate) buffer: MessageBuffer,
    pub(crate) delivered: BTreeSet<MessageId>,
    /// Copies dropped after reaching their destination; never taken back
    pub(crate) retired: BTreeSet<MessageId>,
    pub(crate) subscriptions: SubscriptionList,
    pub(crate) order: ForwardingOrder,
    pub(crate) rng: StdRng,
    pub(crate) default_ttl: Option<f64>,
}

impl RouterCore {
    /// This node subscribes to the message's topic or is its explicit destination
    pub(crate) fn is_destination(&self, message: &Message) -> bool {
        self.subscriptions.contains_topic(message.topic()) || message.to == Some(self.host)
    }

    pub(crate) fn has_received(&self, id: &MessageId) -> bool {
        self.buffer.contains(id) || self.delivered.contains(id) || self.retired.contains(id)
    }

    fn check_receiving(&self, message: &Message) -> ReceiveVerdict {
        if message.is_hello() {
            return ReceiveVerdict::Ok;
        }
        if self.has_received(&message.id) {
            return ReceiveVerdict::DeniedOld;
        }
        if !self.buffer.fits(message.size) {
            return ReceiveVerdict::DeniedNoSpace;
        }
        ReceiveVerdict::Ok
    }

    /// Buffer `message`, evicting worst-first if needed
    ///
    /// Messages in `protected` are never evicted. Returns the ids of the
    /// evicted messages, or `None` when the message could not be stored.
    fn store(
        &mut self,
        message: Message,
        protected: &BTreeSet<MessageId>,
        now: f64,
        events: &mut dyn EventSink,
    ) -> Option<Vec<MessageId>> {
        let evicted = self
            .buffer
            .make_room(message.size, self.order, |id| protected.contains(id))?;
        let mut ids = Vec::with_capacity(evicted.len());
        for victim in evicted {
            debug!(host = %self.host, message = %victim.id, "Evicted");
            ids.push(victim.id.clone());
            events.emit(SimEvent::MessageDeleted {
                time: now,
                message: victim,
                node: self.host,
                mode: DropMode::Dropped,
                cause: BUFFER_FULL_CAUSE.to_string(),
            });
        }
        self.buffer.insert(message).then_some(ids)
    }

    /// Remove every expired message and return them
    fn drop_expired(&mut self, now: f64, events: &mut dyn EventSink) -> Vec<Message> {
        let expired: Vec<MessageId> = self
            .buffer
            .iter()
            .filter(|m| m.is_expired(now))
            .map(|m| m.id.clone())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(message) = self.buffer.remove(&id) {
                trace!(host = %self.host, message = %message.id, "TTL expired");
                events.emit(SimEvent::MessageDeleted {
                    time: now,
                    message: message.clone(),
                    node: self.host,
                    mode: DropMode::TtlExpiration,
                    cause: TTL_EXPIRED_CAUSE.to_string(),
                });
                removed.push(message);
            }
        }
        removed
    }
}

/// The routing policy a router runs
#[derive(Debug, Clone)]
pub enum RoutingPolicy {
    Epidemic(EpidemicPolicy),
    NeighborAware(HelloPolicy),
}

/// The router of one node
#[derive(Debug, Clone)]
pub struct Router {
    core: RouterCore,
    policy: RoutingPolicy,
}

/// Everything a router may touch during one round
pub struct RouterContext<'a> {
    pub now: f64,
    pub network: &'a mut Network,
    pub peers: PeerRouters<'a>,
    pub events: &'a mut dyn EventSink,
}

impl<'a> RouterContext<'a> {
    pub fn new(
        now: f64,
        network: &'a mut Network,
        peers: PeerRouters<'a>,
        events: &'a mut dyn EventSink,
    ) -> Self {
        Self {
            now,
            network,
            peers,
            events,
        }
    }
}

/// Read access to every router except the one being updated
///
/// Routers are stored by node index, so node `n` is found at position `n`.
#[derive(Debug, Clone, Copy)]
pub struct PeerRouters<'a> {
    before: &'a [Router],
    after: &'a [Router],
}

impl<'a> PeerRouters<'a> {
    /// Split `routers` into the one at `index` and everyone else
    pub fn split(routers: &'a mut [Router], index: usize) -> Option<(&'a mut Router, PeerRouters<'a>)> {
        if index >= routers.len() {
            return None;
        }
        let (before, rest) = routers.split_at_mut(index);
        let (current, after) = rest.split_first_mut()?;
        Some((current, PeerRouters { before, after }))
    }

    pub fn get(&self, node: NodeId) -> Option<&'a Router> {
        let i = node.index();
        let index = self.before.len();
        let router = match i.cmp(&index) {
            std::cmp::Ordering::Less => self.before.get(i),
            std::cmp::Ordering::Greater => self.after.get(i - index - 1),
            std::cmp::Ordering::Equal => None,
        };
        router.filter(|r| r.host() == node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Router> {
        self.before.iter().chain(self.after.iter())
    }
}

impl ReceiveGate for PeerRouters<'_> {
    fn check_receiving(&self, node: NodeId, message: &Message) -> ReceiveVerdict {
        self.get(node)
            .map(|router| router.check_receiving(message))
            .unwrap_or(ReceiveVerdict::DeniedOld)
    }
}

/// Ids of messages `host` is currently sending on any interface
pub fn messages_in_flight(network: &Network, host: NodeId) -> BTreeSet<MessageId> {
    network
        .interfaces_of(host)
        .iter()
        .flat_map(|&iface| {
            network
                .neighbors(iface)
                .into_iter()
                .filter_map(move |(con, _)| {
                    let connection = network.connection(con)?;
                    if connection.is_sender_interface(iface) {
                        connection.message().map(|m| m.id.clone())
                    } else {
                        None
                    }
                })
        })
        .collect()
}

impl Router {
    /// Build a router for `host` from validated settings
    ///
    /// `seed` feeds the router's own random source.
    pub fn from_settings(host: NodeId, settings: &RouterSettings, seed: u64) -> RoutingResult<Self> {
        settings.validate()?;
        let core = RouterCore {
            host,
            buffer: MessageBuffer::new(settings.buffer_size),
            delivered: BTreeSet::new(),
            retired: BTreeSet::new(),
            subscriptions: settings.subscription_list()?,
            order: settings.forwarding_order,
            rng: StdRng::seed_from_u64(seed),
            default_ttl: settings.msg_ttl,
        };
        let policy = match settings.policy {
            PolicyKind::Epidemic => {
                RoutingPolicy::Epidemic(EpidemicPolicy::new(settings.dissemination_mode()?))
            }
            PolicyKind::NeighborAware => {
                RoutingPolicy::NeighborAware(HelloPolicy::new(host, settings.ping_interval))
            }
        };
        debug!(host = %host, policy = ?settings.policy, subscriptions = core.subscriptions.len(), "Router created");
        Ok(Self { core, policy })
    }

    pub fn host(&self) -> NodeId {
        self.core.host
    }

    pub fn subscriptions(&self) -> &SubscriptionList {
        &self.core.subscriptions
    }

    pub fn buffer(&self) -> &MessageBuffer {
        &self.core.buffer
    }

    pub fn delivered(&self) -> &BTreeSet<MessageId> {
        &self.core.delivered
    }

    pub fn order(&self) -> ForwardingOrder {
        self.core.order
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Dissemination mode, for epidemic routers
    pub fn mode(&self) -> Option<DisseminationMode> {
        match &self.policy {
            RoutingPolicy::Epidemic(p) => Some(p.mode()),
            RoutingPolicy::NeighborAware(_) => None,
        }
    }

    /// Neighbor table, for neighbor-aware routers
    pub fn knowledge(&self) -> Option<&KnowledgeOfSurroundings> {
        match &self.policy {
            RoutingPolicy::NeighborAware(p) => Some(p.knowledge()),
            RoutingPolicy::Epidemic(_) => None,
        }
    }

    pub fn hello_policy(&self) -> Option<&HelloPolicy> {
        match &self.policy {
            RoutingPolicy::NeighborAware(p) => Some(p),
            RoutingPolicy::Epidemic(_) => None,
        }
    }

    pub fn is_destination(&self, message: &Message) -> bool {
        self.core.is_destination(message)
    }

    pub fn has_message(&self, id: &MessageId) -> bool {
        self.core.buffer.contains(id)
    }

    /// Carries the message, had it delivered or retired its copy
    pub fn has_received(&self, id: &MessageId) -> bool {
        self.core.has_received(id)
    }

    /// Admission check run before a transfer to this router starts
    pub fn check_receiving(&self, message: &Message) -> ReceiveVerdict {
        self.core.check_receiving(message)
    }

    /// Uniformly pick one of this node's topics
    pub fn random_subscription(&mut self) -> Option<SubscriptionId> {
        self.core.subscriptions.random_pick(&mut self.core.rng)
    }

    /// Take a message created at this node into the buffer
    ///
    /// Returns `false` if it does not fit or its id is already held.
    pub fn create_new_message(
        &mut self,
        mut message: Message,
        network: &Network,
        now: f64,
        events: &mut dyn EventSink,
    ) -> RoutingResult<bool> {
        if message.ttl.is_none() {
            message.ttl = self.core.default_ttl;
        }
        let id = message.id.clone();
        if self.core.buffer.contains(&id) {
            debug!(host = %self.core.host, message = %id, "Message already held");
            return Ok(false);
        }
        let protected = messages_in_flight(network, self.core.host);
        let Some(evicted) = self.core.store(message.clone(), &protected, now, events) else {
            debug!(host = %self.core.host, message = %id, "No room for new message");
            return Ok(false);
        };

        debug!(host = %self.core.host, message = %id, topic = ?message.topic(), "Message created");
        events.emit(SimEvent::MessageCreated { time: now, message });
        self.retrack(&evicted, id)?;
        Ok(true)
    }

    /// Keep the advertised ids in step with the buffer after a store
    fn retrack(&mut self, evicted: &[MessageId], stored: MessageId) -> RoutingResult<()> {
        if let RoutingPolicy::NeighborAware(p) = &mut self.policy {
            for id in evicted {
                p.untrack(id)?;
            }
            p.track(stored);
        }
        Ok(())
    }

    /// Handle a message that finished arriving over `iface` from `from`
    pub fn message_transferred(
        &mut self,
        mut message: Message,
        from: NodeId,
        iface: InterfaceAddress,
        network: &Network,
        now: f64,
        events: &mut dyn EventSink,
    ) -> RoutingResult<ReceptionOutcome> {
        if message.is_hello() {
            if let RoutingPolicy::NeighborAware(p) = &mut self.policy {
                p.process_hello(iface, &message, now);
            }
            return Ok(ReceptionOutcome::Hello);
        }

        if let RoutingPolicy::Epidemic(p) = &self.policy {
            if let Some(cause) = p.screen_reception(&mut self.core, &message)? {
                debug!(host = %self.core.host, message = %message.id, cause = %cause, "Discarded");
                events.emit(SimEvent::MessageDeleted {
                    time: now,
                    message,
                    node: self.core.host,
                    mode: DropMode::Discarded,
                    cause,
                });
                return Ok(ReceptionOutcome::Discarded);
            }
        }

        message.receive_time = now;
        message.hop_count += 1;
        message.forward_count = 0;

        let first_delivery = !self.core.has_received(&message.id);
        let final_target = self.core.is_destination(&message);
        if first_delivery && final_target {
            self.core.delivered.insert(message.id.clone());
        }
        events.emit(SimEvent::MessageTransferred {
            time: now,
            message: message.clone(),
            from,
            to: self.core.host,
            first_delivery,
            final_target,
        });

        if self.core.buffer.contains(&message.id) {
            return Ok(ReceptionOutcome::Accepted {
                first_delivery,
                final_target,
            });
        }
        let protected = messages_in_flight(network, self.core.host);
        let Some(evicted) = self.core.store(message.clone(), &protected, now, events) else {
            debug!(host = %self.core.host, message = %message.id, "No room for received message");
            events.emit(SimEvent::MessageDeleted {
                time: now,
                message,
                node: self.core.host,
                mode: DropMode::Dropped,
                cause: BUFFER_FULL_CAUSE.to_string(),
            });
            return Ok(ReceptionOutcome::Dropped);
        };
        self.retrack(&evicted, message.id)?;
        Ok(ReceptionOutcome::Accepted {
            first_delivery,
            final_target,
        })
    }

    /// The sender side of a transfer of `message` to `to` finished
    ///
    /// `intact` is false when interference corrupted the reception. A copy
    /// that reached its explicit destination intact has done its job and
    /// leaves the buffer.
    pub fn transfer_done(
        &mut self,
        message: &Message,
        to: NodeId,
        intact: bool,
        now: f64,
        events: &mut dyn EventSink,
    ) -> RoutingResult<()> {
        if let Some(held) = self.core.buffer.get_mut(&message.id) {
            held.forward_count += 1;
        }
        if !intact || message.to != Some(to) {
            return Ok(());
        }
        let Some(removed) = self.core.buffer.remove(&message.id) else {
            return Ok(());
        };
        self.core.retired.insert(removed.id.clone());
        if let RoutingPolicy::NeighborAware(p) = &mut self.policy {
            p.untrack(&removed.id)?;
        }
        debug!(host = %self.core.host, message = %removed.id, to = %to, "Delivered copy removed");
        events.emit(SimEvent::MessageDeleted {
            time: now,
            message: removed,
            node: self.core.host,
            mode: DropMode::Removed,
            cause: DELIVERED_CAUSE.to_string(),
        });
        Ok(())
    }

    pub fn connection_up(&mut self, link: &LinkInfo) {
        trace!(host = %self.core.host, peer = %link.peer.node, connection = %link.connection, "Link up");
    }

    pub fn connection_down(&mut self, link: &LinkInfo) {
        trace!(host = %self.core.host, peer = %link.peer.node, connection = %link.connection, "Link down");
        if let RoutingPolicy::NeighborAware(p) = &mut self.policy {
            p.forget(link.local.interface, link.peer.node);
        }
    }

    /// Called on the initiating side before a link is torn down
    ///
    /// A transfer the link loss cut short is reported as aborted. The
    /// sender keeps its copy and its forward count, so the message is
    /// offered again once a link to a peer without it comes up.
    pub fn changed_connection(
        &mut self,
        link: &LinkInfo,
        interrupted: Option<&Interrupted>,
        now: f64,
        events: &mut dyn EventSink,
    ) {
        let Some(Interrupted::Aborted { message, from, to }) = interrupted else {
            trace!(host = %self.core.host, peer = %link.peer.node, connection = %link.connection, "Link changing");
            return;
        };
        debug!(
            host = %self.core.host,
            message = %message.id,
            from = %from.node,
            to = %to.node,
            "Transfer cut short"
        );
        events.emit(SimEvent::TransferAborted {
            time: now,
            message: message.clone(),
            from: from.node,
            to: to.node,
            cause: CONNECTION_LOST_CAUSE.to_string(),
        });
    }

    /// One routing round: expire old messages, then run the policy
    pub fn update(&mut self, ctx: &mut RouterContext<'_>) -> RoutingResult<()> {
        let expired = self.core.drop_expired(ctx.now, ctx.events);
        if let RoutingPolicy::NeighborAware(p) = &mut self.policy {
            for message in &expired {
                p.untrack(&message.id)?;
            }
        }

        match &mut self.policy {
            RoutingPolicy::Epidemic(p) => p.update(&mut self.core, ctx),
            RoutingPolicy::NeighborAware(p) => p.update(&mut self.core, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::{EventLog, Priority};
    use ferry_link::ProximityMode;

    fn settings(subscriptions: &str) -> RouterSettings {
        RouterSettings {
            subscriptions: subscriptions.to_string(),
            ..Default::default()
        }
    }

    fn router(host: u32, settings: &RouterSettings) -> Router {
        Router::from_settings(NodeId(host), settings, 7).unwrap()
    }

    fn topic_msg(id: &str, topic: u32, size: u64) -> Message {
        Message::new(id, NodeId(9), size, 0.0).with_topic(SubscriptionId(topic))
    }

    #[test]
    fn test_settings_default_validates() {
        assert!(RouterSettings::default().validate().is_ok());
    }

    #[test]
    fn test_settings_reject_bad_values() {
        let bad_mode = RouterSettings {
            mode: 5,
            ..Default::default()
        };
        assert!(matches!(
            Router::from_settings(NodeId(0), &bad_mode, 1),
            Err(crate::RoutingError::Config(ConfigError::ModeOutOfRange { .. }))
        ));

        let bad_subs = settings("1,x");
        assert!(matches!(
            bad_subs.validate(),
            Err(ConfigError::MalformedSubscriptions { .. })
        ));

        let bad_ping = RouterSettings {
            ping_interval: -1.0,
            ..Default::default()
        };
        assert!(bad_ping.validate().is_err());
    }

    #[test]
    fn test_settings_from_json() {
        let json = r#"{"policy":"neighbor_aware","subscriptions":"2-4","ping_interval":3.0}"#;
        let parsed: RouterSettings = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.policy, PolicyKind::NeighborAware);
        assert_eq!(parsed.mode, 0);
        assert_eq!(parsed.forwarding_order, ForwardingOrder::PrioritizedFifo);
        let r = router(0, &parsed);
        assert_eq!(r.subscriptions().len(), 3);
        assert!(r.knowledge().is_some());
        assert!(r.mode().is_none());
    }

    #[test]
    fn test_is_destination() {
        let r = router(0, &settings("1,2"));
        assert!(r.is_destination(&topic_msg("a", 2, 10)));
        assert!(!r.is_destination(&topic_msg("b", 3, 10)));
        assert!(r.is_destination(&Message::new("c", NodeId(5), 10, 0.0).with_destination(NodeId(0))));
        assert!(!r.is_destination(&Message::new("d", NodeId(5), 10, 0.0)));
    }

    #[test]
    fn test_check_receiving_codes() {
        let mut r = router(
            0,
            &RouterSettings {
                buffer_size: Some(100),
                ..settings("1")
            },
        );
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();
        r.create_new_message(topic_msg("held", 1, 50), &network, 0.0, &mut events)
            .unwrap();

        assert_eq!(r.check_receiving(&topic_msg("held", 1, 50)), ReceiveVerdict::DeniedOld);
        assert_eq!(r.check_receiving(&topic_msg("big", 1, 500)), ReceiveVerdict::DeniedNoSpace);
        assert_eq!(r.check_receiving(&topic_msg("new", 1, 80)), ReceiveVerdict::Ok);
    }

    #[test]
    fn test_create_applies_default_ttl() {
        let mut r = router(
            0,
            &RouterSettings {
                msg_ttl: Some(30.0),
                ..settings("1")
            },
        );
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();
        assert!(r
            .create_new_message(topic_msg("m", 1, 10), &network, 0.0, &mut events)
            .unwrap());
        let held = r.buffer().get(&MessageId::from("m")).unwrap();
        assert_eq!(held.ttl, Some(30.0));
        assert!(matches!(events.events()[0], SimEvent::MessageCreated { .. }));
    }

    #[test]
    fn test_receive_marks_delivery() {
        let mut r = router(1, &settings("1"));
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();

        let outcome = r
            .message_transferred(topic_msg("m", 1, 10), NodeId(0), InterfaceAddress(1), &network, 4.0, &mut events)
            .unwrap();
        assert_eq!(
            outcome,
            ReceptionOutcome::Accepted {
                first_delivery: true,
                final_target: true
            }
        );
        assert!(r.delivered().contains(&MessageId::from("m")));
        let held = r.buffer().get(&MessageId::from("m")).unwrap();
        assert_eq!(held.receive_time, 4.0);
        assert_eq!(held.hop_count, 1);
    }

    #[test]
    fn test_strict_discards_foreign_topic() {
        let strict = RouterSettings {
            mode: 1,
            ..settings("1")
        };
        let mut r = router(1, &strict);
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();

        let outcome = r
            .message_transferred(topic_msg("m", 2, 10), NodeId(0), InterfaceAddress(1), &network, 1.0, &mut events)
            .unwrap();
        assert_eq!(outcome, ReceptionOutcome::Discarded);
        assert!(r.buffer().is_empty());
        let discards: Vec<_> = events.deletions(DropMode::Discarded).collect();
        assert_eq!(discards.len(), 1);
        match discards[0] {
            SimEvent::MessageDeleted { cause, .. } => assert_eq!(cause, "strict dissemination mode"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_flexible_keeps_foreign_topic() {
        let mut r = router(1, &settings("1"));
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();
        let outcome = r
            .message_transferred(topic_msg("m", 2, 10), NodeId(0), InterfaceAddress(1), &network, 1.0, &mut events)
            .unwrap();
        assert_eq!(
            outcome,
            ReceptionOutcome::Accepted {
                first_delivery: true,
                final_target: false
            }
        );
        assert!(r.has_message(&MessageId::from("m")));
        assert!(r.delivered().is_empty());
    }

    #[test]
    fn test_full_buffer_evicts_lowest_priority() {
        let mut r = router(
            1,
            &RouterSettings {
                buffer_size: Some(200),
                ..settings("1")
            },
        );
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();
        r.create_new_message(
            topic_msg("low", 1, 100).with_priority(Priority::Low),
            &network,
            0.0,
            &mut events,
        )
        .unwrap();
        r.create_new_message(
            topic_msg("high", 1, 100).with_priority(Priority::High),
            &network,
            0.0,
            &mut events,
        )
        .unwrap();
        r.create_new_message(topic_msg("new", 1, 100), &network, 1.0, &mut events)
            .unwrap();

        assert!(!r.has_message(&MessageId::from("low")));
        assert!(r.has_message(&MessageId::from("high")));
        assert!(r.has_message(&MessageId::from("new")));
        assert_eq!(events.deletions(DropMode::Dropped).count(), 1);
    }

    #[test]
    fn test_ttl_sweep_untracks() {
        let aware = RouterSettings {
            policy: PolicyKind::NeighborAware,
            msg_ttl: Some(5.0),
            ..settings("1")
        };
        let mut routers = vec![router(0, &aware)];
        let mut network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();
        routers[0]
            .create_new_message(topic_msg("m", 1, 10), &network, 0.0, &mut events)
            .unwrap();
        assert_eq!(routers[0].hello_policy().unwrap().received_ids().len(), 1);

        let (current, peers) = PeerRouters::split(&mut routers, 0).unwrap();
        let mut ctx = RouterContext::new(6.0, &mut network, peers, &mut events);
        current.update(&mut ctx).unwrap();

        assert!(routers[0].buffer().is_empty());
        assert!(routers[0].hello_policy().unwrap().received_ids().is_empty());
        assert_eq!(events.deletions(DropMode::TtlExpiration).count(), 1);
    }

    #[test]
    fn test_transfer_done_counts_forwards() {
        let mut r = router(0, &settings("1"));
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();
        r.create_new_message(topic_msg("m", 1, 10), &network, 0.0, &mut events)
            .unwrap();
        let sent = topic_msg("m", 1, 10);
        r.transfer_done(&sent, NodeId(1), true, 1.0, &mut events).unwrap();
        r.transfer_done(&sent, NodeId(2), false, 2.0, &mut events).unwrap();
        assert_eq!(r.buffer().get(&MessageId::from("m")).unwrap().forward_count, 2);
        assert_eq!(events.deletions(DropMode::Removed).count(), 0);
    }

    #[test]
    fn test_copy_removed_once_destination_has_it() {
        let aware = RouterSettings {
            policy: PolicyKind::NeighborAware,
            ..settings("1")
        };
        let mut r = router(0, &aware);
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();
        let unicast = Message::new("u", NodeId(0), 10, 0.0).with_destination(NodeId(3));
        r.create_new_message(unicast.clone(), &network, 0.0, &mut events)
            .unwrap();

        // Corrupted at the destination, or delivered to a relay: kept
        r.transfer_done(&unicast, NodeId(3), false, 1.0, &mut events).unwrap();
        r.transfer_done(&unicast, NodeId(2), true, 2.0, &mut events).unwrap();
        assert!(r.has_message(&MessageId::from("u")));

        r.transfer_done(&unicast, NodeId(3), true, 3.0, &mut events).unwrap();
        assert!(!r.has_message(&MessageId::from("u")));
        assert!(r.has_received(&MessageId::from("u")));
        assert_eq!(r.check_receiving(&unicast), ReceiveVerdict::DeniedOld);
        assert!(r.hello_policy().unwrap().received_ids().is_empty());
        let removed: Vec<_> = events.deletions(DropMode::Removed).collect();
        assert_eq!(removed.len(), 1);
        match removed[0] {
            SimEvent::MessageDeleted { cause, node, time, .. } => {
                assert_eq!(cause, DELIVERED_CAUSE);
                assert_eq!(*node, NodeId(0));
                assert_eq!(*time, 3.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_eviction_stops_advertising_and_allows_reception() {
        let aware = RouterSettings {
            policy: PolicyKind::NeighborAware,
            buffer_size: Some(200),
            ..settings("1")
        };
        let mut r = router(1, &aware);
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();
        let receive = |r: &mut Router, m: Message, at: f64, events: &mut EventLog| {
            r.message_transferred(m, NodeId(0), InterfaceAddress(1), &network, at, events)
                .unwrap()
        };

        receive(&mut r, topic_msg("a", 2, 100).with_priority(Priority::Low), 1.0, &mut events);
        receive(&mut r, topic_msg("b", 2, 100).with_priority(Priority::High), 2.0, &mut events);
        receive(&mut r, topic_msg("c", 2, 100).with_priority(Priority::High), 3.0, &mut events);

        let advertised = |r: &Router| r.hello_policy().unwrap().received_ids().to_vec();
        assert!(!r.has_message(&MessageId::from("a")));
        assert_eq!(advertised(&r), vec![MessageId::from("b"), MessageId::from("c")]);
        assert_eq!(r.check_receiving(&topic_msg("a", 2, 100)), ReceiveVerdict::Ok);

        // Re-reception evicts again and is advertised exactly once
        receive(&mut r, topic_msg("a", 2, 100).with_priority(Priority::Critical), 4.0, &mut events);
        let ids = advertised(&r);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.iter().filter(|id| id.as_str() == "a").count(), 1);
        for id in &ids {
            assert!(r.has_message(id), "{id}");
        }
    }

    #[test]
    fn test_changed_connection_reports_cut_transfer() {
        let mut r = router(0, &settings("1"));
        let network = Network::new(1, ProximityMode::AllPairs);
        let mut events = EventLog::new();
        let sent = topic_msg("m", 1, 10);
        r.create_new_message(sent.clone(), &network, 0.0, &mut events)
            .unwrap();

        let local = ferry_link::Endpoint::new(NodeId(0), InterfaceAddress(0));
        let peer = ferry_link::Endpoint::new(NodeId(1), InterfaceAddress(1));
        let link = LinkInfo {
            connection: ferry_core::ConnectionId(4),
            local,
            peer,
        };
        r.changed_connection(&link, None, 1.0, &mut events);
        assert_eq!(events.len(), 1);

        let cut = Interrupted::Aborted {
            message: sent,
            from: local,
            to: peer,
        };
        r.changed_connection(&link, Some(&cut), 2.0, &mut events);
        match events.events().last() {
            Some(SimEvent::TransferAborted { from, to, cause, time, .. }) => {
                assert_eq!((*from, *to), (NodeId(0), NodeId(1)));
                assert_eq!(cause, CONNECTION_LOST_CAUSE);
                assert_eq!(*time, 2.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        let held = r.buffer().get(&MessageId::from("m")).unwrap();
        assert_eq!(held.forward_count, 0);
        assert_eq!(r.check_receiving(&topic_msg("m", 1, 10)), ReceiveVerdict::DeniedOld);
    }

    #[test]
    fn test_peer_routers_split() {
        let s = settings("1");
        let mut routers: Vec<Router> = (0..4).map(|i| router(i, &s)).collect();
        let (current, peers) = PeerRouters::split(&mut routers, 2).unwrap();
        assert_eq!(current.host(), NodeId(2));
        assert!(peers.get(NodeId(2)).is_none());
        assert_eq!(peers.get(NodeId(0)).map(Router::host), Some(NodeId(0)));
        assert_eq!(peers.get(NodeId(3)).map(Router::host), Some(NodeId(3)));
        assert!(peers.get(NodeId(7)).is_none());
        assert_eq!(peers.iter().count(), 3);
        assert!(PeerRouters::split(&mut routers, 4).is_none());
    }
}
