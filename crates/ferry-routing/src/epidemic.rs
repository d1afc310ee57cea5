//! Subscription-gated epidemic routing
//!
//! Each round first hands messages to directly linked subscribers, then
//! floods the rest over idle interfaces. The [`DisseminationMode`] gates
//! both the flooding (send side) and keeping messages received on foreign
//! topics (receive side). Direct deliveries are never gated.

use ferry_core::{ConnectionId, InterfaceAddress, Message};
use ferry_link::{BroadcastOutcome, UnicastOutcome};
use rand::seq::SliceRandom;
use tracing::{debug, trace};

use crate::dissemination::DisseminationMode;
use crate::error::RoutingResult;
use crate::router::{RouterContext, RouterCore, messages_in_flight};

/// Epidemic routing state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EpidemicPolicy {
    mode: DisseminationMode,
}

impl EpidemicPolicy {
    pub fn new(mode: DisseminationMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> DisseminationMode {
        self.mode
    }

    /// Decide whether a message received on a foreign topic is kept
    ///
    /// Returns the discard cause when it is not.
    pub(crate) fn screen_reception(
        &self,
        core: &mut RouterCore,
        message: &Message,
    ) -> RoutingResult<Option<String>> {
        if core.is_destination(message) || self.mode.should_accept(&mut core.rng) {
            return Ok(None);
        }
        Ok(Some(self.mode.rejection_cause(message)?))
    }

    /// One routing round
    pub(crate) fn update(&self, core: &mut RouterCore, ctx: &mut RouterContext<'_>) -> RoutingResult<()> {
        if self.is_transferring(core, ctx) || !self.can_begin_transfer(core, ctx) {
            return Ok(());
        }

        while let Some(con) = self.exchange_deliverable_messages(core, ctx)? {
            trace!(host = %core.host, connection = %con, "Direct delivery started");
        }

        let mut idle: Vec<InterfaceAddress> = ctx
            .network
            .interfaces_of(core.host)
            .iter()
            .copied()
            .filter(|iface| ctx.network.is_ready_to_begin_transfer(*iface))
            .collect();
        idle.shuffle(&mut core.rng);

        for iface in idle {
            if !ctx.network.is_ready_to_begin_transfer(iface) {
                continue;
            }

            let in_flight = messages_in_flight(ctx.network, core.host);
            let mut candidates = Vec::new();
            for message in core.buffer.iter() {
                if in_flight.contains(&message.id) {
                    continue;
                }
                if !self.should_deliver_to_neighbors(message, iface, ctx) {
                    continue;
                }
                if !self.mode.should_offer(&mut core.rng) {
                    trace!(host = %core.host, message = %message.id, mode = self.mode.name(), "Not offered");
                    continue;
                }
                candidates.push(message.clone());
            }
            core.order.sort(&mut candidates);

            for message in &candidates {
                let outcome = ctx
                    .network
                    .send_broadcast_message(&ctx.peers, iface, message, ctx.now, ctx.events)?;
                if outcome == BroadcastOutcome::Ok {
                    debug!(host = %core.host, interface = %iface, message = %message.id, "Flooded");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Any interface of the host is carrying a transfer
    fn is_transferring(&self, core: &RouterCore, ctx: &RouterContext<'_>) -> bool {
        ctx.network
            .interfaces_of(core.host)
            .iter()
            .any(|iface| ctx.network.is_busy(*iface))
    }

    /// Something to send and someone to send it to
    fn can_begin_transfer(&self, core: &RouterCore, ctx: &RouterContext<'_>) -> bool {
        !core.buffer.is_empty()
            && ctx
                .network
                .interfaces_of(core.host)
                .iter()
                .any(|iface| !ctx.network.neighbors(*iface).is_empty())
    }

    /// Some neighbor on `iface` does not have `message` yet
    fn should_deliver_to_neighbors(
        &self,
        message: &Message,
        iface: InterfaceAddress,
        ctx: &RouterContext<'_>,
    ) -> bool {
        ctx.network.neighbors(iface).into_iter().any(|(_, peer)| {
            ctx.peers
                .get(peer.node)
                .is_some_and(|router| !router.has_received(&message.id))
        })
    }

    /// Start one transfer of a held message to a linked subscriber
    ///
    /// Returns the connection used, or `None` once nothing more can be
    /// delivered this round.
    fn exchange_deliverable_messages(
        &self,
        core: &RouterCore,
        ctx: &mut RouterContext<'_>,
    ) -> RoutingResult<Option<ConnectionId>> {
        if core.buffer.is_empty() {
            return Ok(None);
        }
        let sorted = core.order.sorted(core.buffer.messages());
        let in_flight = messages_in_flight(ctx.network, core.host);
        let interfaces = ctx.network.interfaces_of(core.host).to_vec();

        for iface in interfaces {
            if !ctx.network.is_ready_to_begin_transfer(iface) || ctx.network.is_sending_data(iface) {
                continue;
            }
            for (con, peer) in ctx.network.neighbors(iface) {
                let ready = ctx
                    .network
                    .connection(con)
                    .is_some_and(|c| c.is_ready_for_transfer());
                let Some(receiver) = ctx.peers.get(peer.node) else {
                    continue;
                };
                if !ready {
                    continue;
                }
                for message in &sorted {
                    if in_flight.contains(&message.id)
                        || !receiver.is_destination(message)
                        || receiver.has_received(&message.id)
                    {
                        continue;
                    }
                    let outcome = ctx.network.send_unicast_message_via_connection(
                        &ctx.peers, iface, con, message, ctx.now, ctx.events,
                    )?;
                    if outcome == UnicastOutcome::Ok {
                        debug!(
                            host = %core.host,
                            to = %peer.node,
                            message = %message.id,
                            "Delivering to subscriber"
                        );
                        return Ok(Some(con));
                    }
                }
            }
        }
        Ok(None)
    }
}
