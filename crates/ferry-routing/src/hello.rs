//! HELLO protocol and neighbor-aware forwarding
//!
//! Every interface periodically broadcasts a HELLO carrying the ids of the
//! messages its router tracks and the router's subscriptions. Receivers
//! keep the latest digest per neighbor in a [`KnowledgeOfSurroundings`]
//! and use it to pick messages that a linked neighbor wants but does not
//! have yet.

use ferry_core::{HelloPayload, InterfaceAddress, InvariantError, Message, MessageId, NodeId, SubscriptionList};
use ferry_link::BroadcastOutcome;
use tracing::{debug, trace};

use crate::error::RoutingResult;
use crate::knowledge::KnowledgeOfSurroundings;
use crate::router::{RouterContext, RouterCore};

/// Seconds between two HELLOs on the same interface
pub const DEFAULT_PING_INTERVAL: f64 = 5.0;

/// Builds HELLO messages for one node
#[derive(Debug, Clone)]
pub struct HelloGenerator {
    node: NodeId,
    counter: u32,
}

impl HelloGenerator {
    /// Source and id fields
    pub const HEADER_SIZE: u64 = 8;
    /// Message length field
    pub const LENGTH_FIELD_SIZE: u64 = 2;
    /// Bytes per advertised message id or subscription
    pub const ENTRY_SIZE: u64 = 4;

    pub fn new(node: NodeId) -> Self {
        Self { node, counter: 0 }
    }

    /// Simulated size of a HELLO listing `ids` message ids and `subscriptions` topics
    pub fn size(ids: usize, subscriptions: usize) -> u64 {
        Self::HEADER_SIZE
            + Self::ENTRY_SIZE * subscriptions as u64
            + Self::ENTRY_SIZE * ids as u64
            + Self::LENGTH_FIELD_SIZE
    }

    /// Build the next HELLO
    pub fn build(&mut self, ids: &[MessageId], subscriptions: &SubscriptionList, now: f64) -> Message {
        let id = format!("HM_{}_{:04}", self.node, self.counter);
        self.counter += 1;
        let payload = HelloPayload {
            message_ids: ids.to_vec(),
            subscriptions: subscriptions.ids(),
        };
        Message::hello(id, self.node, Self::size(ids.len(), subscriptions.len()), now, payload)
    }
}

/// Neighbor-aware routing state
#[derive(Debug, Clone)]
pub struct HelloPolicy {
    ping_interval: f64,
    /// Last HELLO time per interface index of the host
    last_ping_sent: Vec<f64>,
    /// Built but not yet broadcast
    pending_hello: Option<Message>,
    generator: HelloGenerator,
    /// Data messages created or received, advertised in HELLOs
    received_ids: Vec<MessageId>,
    knowledge: KnowledgeOfSurroundings,
}

impl HelloPolicy {
    pub fn new(node: NodeId, ping_interval: f64) -> Self {
        Self {
            ping_interval,
            last_ping_sent: Vec::new(),
            pending_hello: None,
            generator: HelloGenerator::new(node),
            received_ids: Vec::new(),
            knowledge: KnowledgeOfSurroundings::new(),
        }
    }

    pub fn ping_interval(&self) -> f64 {
        self.ping_interval
    }

    /// Time of the last HELLO sent on the host's `index`-th interface
    pub fn last_ping_sent(&self, index: usize) -> f64 {
        self.last_ping_sent.get(index).copied().unwrap_or(0.0)
    }

    pub fn pending_hello(&self) -> Option<&Message> {
        self.pending_hello.as_ref()
    }

    pub fn knowledge(&self) -> &KnowledgeOfSurroundings {
        &self.knowledge
    }

    pub fn received_ids(&self) -> &[MessageId] {
        &self.received_ids
    }

    /// Start advertising `id`; already tracked ids are kept once
    pub(crate) fn track(&mut self, id: MessageId) {
        if !self.received_ids.contains(&id) {
            self.received_ids.push(id);
        }
    }

    /// Stop advertising `id`; it must have been tracked
    pub(crate) fn untrack(&mut self, id: &MessageId) -> Result<(), InvariantError> {
        let pos = self
            .received_ids
            .iter()
            .position(|tracked| tracked == id)
            .ok_or_else(|| InvariantError::MissingTrackedMessage(id.to_string()))?;
        self.received_ids.remove(pos);
        Ok(())
    }

    /// Fold a received HELLO into the neighbor table
    pub(crate) fn process_hello(&mut self, iface: InterfaceAddress, hello: &Message, now: f64) {
        if let Some(payload) = hello.hello_payload() {
            trace!(
                interface = %iface,
                from = %hello.from,
                ids = payload.message_ids.len(),
                subscriptions = payload.subscriptions.len(),
                "HELLO received"
            );
            self.knowledge.process_hello(iface, hello.from, payload, now);
        }
    }

    pub(crate) fn forget(&mut self, iface: InterfaceAddress, node: NodeId) {
        self.knowledge.forget(iface, node);
    }

    /// One routing round: HELLOs first, then data
    pub(crate) fn update(&mut self, core: &mut RouterCore, ctx: &mut RouterContext<'_>) -> RoutingResult<()> {
        self.broadcast_hellos(core, ctx)?;
        self.forward_data(core, ctx)
    }

    fn broadcast_hellos(&mut self, core: &RouterCore, ctx: &mut RouterContext<'_>) -> RoutingResult<()> {
        let interfaces = ctx.network.interfaces_of(core.host).to_vec();
        if self.last_ping_sent.len() < interfaces.len() {
            self.last_ping_sent.resize(interfaces.len(), 0.0);
        }

        for (index, iface) in interfaces.into_iter().enumerate() {
            if !ctx.network.is_ready_to_begin_transfer(iface) {
                continue;
            }
            if ctx.now - self.last_ping_sent[index] < self.ping_interval {
                continue;
            }
            match self.broadcast_hello(core, iface, ctx)? {
                BroadcastOutcome::Ok => self.last_ping_sent[index] = ctx.now,
                BroadcastOutcome::Denied => {
                    return Err(InvariantError::HelloBroadcastFailed(iface.to_string()).into());
                }
            }
        }
        Ok(())
    }

    /// Try to put the cached HELLO on the air
    ///
    /// Denied only when the interface has no links. A HELLO no neighbor
    /// took stays cached for the next round.
    fn broadcast_hello(
        &mut self,
        core: &RouterCore,
        iface: InterfaceAddress,
        ctx: &mut RouterContext<'_>,
    ) -> RoutingResult<BroadcastOutcome> {
        let has_links = ctx
            .network
            .interface(iface)
            .is_some_and(|ni| !ni.connections().is_empty());
        if !has_links {
            return Ok(BroadcastOutcome::Denied);
        }

        let hello = match self.pending_hello.take() {
            Some(hello) => hello,
            None => self
                .generator
                .build(&self.received_ids, &core.subscriptions, ctx.now),
        };
        match ctx
            .network
            .send_broadcast_message(&ctx.peers, iface, &hello, ctx.now, ctx.events)?
        {
            BroadcastOutcome::Ok => {
                debug!(interface = %iface, hello = %hello.id, size = hello.size, "HELLO sent");
            }
            BroadcastOutcome::Denied => {
                trace!(interface = %iface, hello = %hello.id, "HELLO kept for later");
                self.pending_hello = Some(hello);
            }
        }
        Ok(BroadcastOutcome::Ok)
    }

    fn forward_data(&mut self, core: &RouterCore, ctx: &mut RouterContext<'_>) -> RoutingResult<()> {
        let interfaces = ctx.network.interfaces_of(core.host).to_vec();
        for iface in interfaces {
            if !ctx.network.is_ready_to_begin_transfer(iface) {
                continue;
            }

            let sorted = core.order.sorted(core.buffer.messages());
            let connected: Vec<NodeId> = ctx
                .network
                .neighbors(iface)
                .into_iter()
                .map(|(_, peer)| peer.node)
                .collect();
            let nearby = self.knowledge.active_neighbors(iface, &connected);
            if nearby.is_empty() || sorted.is_empty() {
                trace!(interface = %iface, neighbors = nearby.len(), messages = sorted.len(), "Nothing to forward");
                continue;
            }

            let wanted: Vec<&Message> = sorted
                .iter()
                .filter(|m| {
                    nearby
                        .iter()
                        .any(|n| n.is_interested_in(m.topic()) && !n.has_message(&m.id))
                })
                .collect();

            let mut sent = false;
            for message in wanted {
                if ctx
                    .network
                    .send_broadcast_message(&ctx.peers, iface, message, ctx.now, ctx.events)?
                    == BroadcastOutcome::Ok
                {
                    debug!(interface = %iface, message = %message.id, "Forwarded to interested neighbor");
                    sent = true;
                    break;
                }
            }
            if sent {
                continue;
            }

            let fallback = &sorted[0];
            match ctx
                .network
                .send_broadcast_message(&ctx.peers, iface, fallback, ctx.now, ctx.events)?
            {
                BroadcastOutcome::Ok => {
                    debug!(interface = %iface, message = %fallback.id, "Forwarded in queue order");
                }
                BroadcastOutcome::Denied => {
                    trace!(interface = %iface, message = %fallback.id, "No neighbor took the message");
                }
            }
        }
        Ok(())
    }
}
