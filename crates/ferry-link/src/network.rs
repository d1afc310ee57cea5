//! The network: owner of all hosts' interfaces and connections
//!
//! Every connection is stored once in a [`ConnectionTable`] and referenced
//! by id from the lists of both of its interfaces. Only [`Network::connect`]
//! and the teardown paths touch those lists, and they always update both
//! sides within one call, so the lists of two peers never disagree between
//! operations.
//!
//! Connectivity changes come back as [`LinkEvent`]s. The caller owns the
//! routers and listeners and dispatches the events to them.

use std::collections::BTreeMap;

use ferry_core::{
    AddressAllocator, ConnectionId, Coord, EventSink, InterfaceAddress, InvariantError, Message,
    MessageId, NodeId, SimEvent,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use crate::bus::{BusValue, ComBus, RANGE_KEY, SCAN_INTERVAL_KEY, SPEED_KEY};
use crate::connection::{Connection, ConnectionTable, Endpoint};
use crate::error::LinkResult;
use crate::interface::{InterfaceKind, InterfaceSettings, NetworkInterface};
use crate::interference::{ReceptionStart, TransferStatus};
use crate::proximity::{Proximity, ProximityMode};

/// Admission verdict of a receiving router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveVerdict {
    Ok,
    /// Busy with the same message, retry later
    TryLaterBusy,
    /// Already has or had the message
    DeniedOld,
    /// Message does not fit in the buffer
    DeniedNoSpace,
}

/// Lets the network ask the receiving side whether it takes a message
pub trait ReceiveGate {
    fn check_receiving(&self, node: NodeId, message: &Message) -> ReceiveVerdict;
}

/// Gate that admits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ReceiveGate for AcceptAll {
    fn check_receiving(&self, _node: NodeId, _message: &Message) -> ReceiveVerdict {
        ReceiveVerdict::Ok
    }
}

/// Result of a unicast send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnicastOutcome {
    Ok,
    /// No usable connection to the target
    Denied,
    /// Tried, but the receiver or the medium refused
    Failed,
}

/// Result of a broadcast send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Ok,
    Denied,
}

/// A simulated host as seen by the link layer
#[derive(Debug, Clone)]
pub struct Host {
    pub id: NodeId,
    pub location: Coord,
    pub interfaces: Vec<InterfaceAddress>,
    pub bus: ComBus,
    pub radio_active: bool,
}

/// The two ends of a link, `local` being the side that acted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInfo {
    pub connection: ConnectionId,
    pub local: Endpoint,
    pub peer: Endpoint,
}

impl LinkInfo {
    /// The same link seen from the peer's side
    pub fn reversed(&self) -> LinkInfo {
        LinkInfo {
            connection: self.connection,
            local: self.peer,
            peer: self.local,
        }
    }
}

/// A transfer that delivered all of its bytes
#[derive(Debug, Clone)]
pub struct CompletedTransfer {
    pub connection: ConnectionId,
    pub from: Endpoint,
    pub to: Endpoint,
    /// Sender's copy
    pub message: Message,
    /// Receiver's copy, `None` if interference corrupted it
    pub received: Option<Message>,
}

/// What happened to a transfer caught by a teardown
#[derive(Debug, Clone)]
pub enum Interrupted {
    /// Still had bytes to go and was dropped
    Aborted {
        message: Message,
        from: Endpoint,
        to: Endpoint,
    },
    /// Had finished and was finalized before the link went away
    Completed(CompletedTransfer),
}

/// Connectivity change reported to the caller
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Up(LinkInfo),
    Down {
        link: LinkInfo,
        interrupted: Option<Interrupted>,
    },
}

/// All interfaces and connections of one simulation run
#[derive(Debug)]
pub struct Network {
    hosts: Vec<Host>,
    interfaces: BTreeMap<InterfaceAddress, NetworkInterface>,
    connections: ConnectionTable,
    allocator: AddressAllocator,
    proximity: Proximity,
    proximity_dirty: bool,
    rng: StdRng,
}

impl Network {
    /// Create an empty network. `seed` drives scan phase randomization.
    pub fn new(seed: u64, mode: ProximityMode) -> Self {
        Self {
            hosts: Vec::new(),
            interfaces: BTreeMap::new(),
            connections: ConnectionTable::new(),
            allocator: AddressAllocator::new(),
            proximity: Proximity::new(mode),
            proximity_dirty: true,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    // ========================================================================
    // Topology
    // ========================================================================

    /// Add a host at `location` with no interfaces
    pub fn add_host(&mut self, location: Coord) -> NodeId {
        let id = NodeId::from(self.hosts.len());
        self.hosts.push(Host {
            id,
            location,
            interfaces: Vec::new(),
            bus: ComBus::new(),
            radio_active: true,
        });
        self.proximity_dirty = true;
        id
    }

    /// Build an interface from `settings` and attach it to `host`
    ///
    /// The interface gets the next address, a random scan phase within its
    /// scan interval, and subscribes to its host's bus.
    pub fn attach_interface(
        &mut self,
        host: NodeId,
        settings: &InterfaceSettings,
    ) -> LinkResult<InterfaceAddress> {
        settings.validate()?;
        if host.index() >= self.hosts.len() {
            return Err(InvariantError::UnknownNode(host.to_string()).into());
        }
        let address = self.allocator.next_address();
        let mut iface = NetworkInterface::from_settings(settings, address, host)?;
        if iface.scan_interval() > 0.0 {
            let phase = self.rng.random::<f64>() * iface.scan_interval();
            iface.set_last_scan_time(phase);
        }

        let entry = &mut self.hosts[host.index()];
        for key in [SCAN_INTERVAL_KEY, RANGE_KEY, SPEED_KEY] {
            entry.bus.subscribe(key, address);
        }
        entry.interfaces.push(address);
        self.interfaces.insert(address, iface);
        self.proximity_dirty = true;

        debug!(host = %host, interface = %address, "Interface attached");
        Ok(address)
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host(&self, id: NodeId) -> Option<&Host> {
        self.hosts.get(id.index())
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn location(&self, id: NodeId) -> Option<Coord> {
        self.host(id).map(|h| h.location)
    }

    pub fn set_location(&mut self, id: NodeId, location: Coord) -> LinkResult<()> {
        self.host_mut(id)?.location = location;
        self.proximity_dirty = true;
        Ok(())
    }

    pub fn set_radio_active(&mut self, id: NodeId, active: bool) -> LinkResult<()> {
        self.host_mut(id)?.radio_active = active;
        Ok(())
    }

    /// Interfaces of `host` in attachment order
    pub fn interfaces_of(&self, host: NodeId) -> &[InterfaceAddress] {
        self.host(host).map(|h| h.interfaces.as_slice()).unwrap_or(&[])
    }

    pub fn interface(&self, addr: InterfaceAddress) -> Option<&NetworkInterface> {
        self.interfaces.get(&addr)
    }

    pub fn interface_mut(&mut self, addr: InterfaceAddress) -> Option<&mut NetworkInterface> {
        self.interfaces.get_mut(&addr)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Publish a value on `host`'s bus and notify subscribed interfaces
    pub fn update_property(&mut self, host: NodeId, key: &str, value: BusValue) -> LinkResult<()> {
        let subscribers = self.host_mut(host)?.bus.update_property(key, value.clone());
        for addr in subscribers {
            self.iface_mut(addr)?.module_value_changed(key, &value)?;
        }
        Ok(())
    }

    /// Re-index interface positions if anything moved
    pub fn rebuild_proximity(&mut self) {
        let hosts = &self.hosts;
        self.proximity.rebuild(
            self.interfaces
                .values()
                .map(|iface| (iface.address(), hosts[iface.host().index()].location)),
        );
        self.proximity_dirty = false;
    }

    // ========================================================================
    // Connectivity
    // ========================================================================

    /// True iff the hosts are no farther apart than the smaller range
    pub fn is_within_range(&self, a: InterfaceAddress, b: InterfaceAddress) -> LinkResult<bool> {
        let (ia, ib) = (self.iface(a)?, self.iface(b)?);
        let distance = self.distance_between(ia.host(), ib.host())?;
        Ok(distance <= ia.range().min(ib.range()))
    }

    /// True if `a` already has a connection to `b`
    pub fn is_connected(&self, a: InterfaceAddress, b: InterfaceAddress) -> bool {
        self.interfaces.get(&a).is_some_and(|iface| {
            iface.connections().iter().any(|id| {
                self.connections
                    .get(*id)
                    .and_then(|c| c.other(a))
                    .is_some_and(|other| other.interface == b)
            })
        })
    }

    /// Try to link `from` with `to`
    ///
    /// Succeeds only if `from` is scanning, both radios are on, the peers
    /// are within range, share an interface type and are not yet linked.
    /// Otherwise nothing changes and `None` is returned.
    pub fn connect(
        &mut self,
        from: InterfaceAddress,
        to: InterfaceAddress,
        now: f64,
    ) -> LinkResult<Option<LinkInfo>> {
        if from == to {
            return Ok(None);
        }
        if !self.iface_mut(from)?.is_scanning(now) {
            return Ok(None);
        }
        let (from_host, to_host) = (self.iface(from)?.host(), self.iface(to)?.host());
        let radios_on = self.host_ref(from_host)?.radio_active && self.host_ref(to_host)?.radio_active;
        if !radios_on
            || self.iface(from)?.interface_type() != self.iface(to)?.interface_type()
            || !self.is_within_range(from, to)?
            || self.is_connected(from, to)
        {
            return Ok(None);
        }

        let speed = self.connection_speed(from, to)?;
        let id = self.allocator.next_connection();
        let local = Endpoint::new(from_host, from);
        let peer = Endpoint::new(to_host, to);
        self.connections.insert(Connection::new(id, local, peer, speed));
        self.iface_mut(from)?.add_connection(id);
        self.iface_mut(to)?.add_connection(id);

        debug!(connection = %id, a = %from_host, b = %to_host, speed, "Link up");
        Ok(Some(LinkInfo {
            connection: id,
            local,
            peer,
        }))
    }

    /// Tear down every connection between `from` and `to`
    pub fn destroy_connection(
        &mut self,
        from: InterfaceAddress,
        to: InterfaceAddress,
        now: f64,
    ) -> LinkResult<Vec<LinkEvent>> {
        let ids: Vec<ConnectionId> = self
            .iface(from)?
            .connections()
            .iter()
            .copied()
            .filter(|id| {
                self.connections
                    .get(*id)
                    .and_then(|c| c.other(from))
                    .is_some_and(|other| other.interface == to)
            })
            .collect();

        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            events.push(self.disconnect(id, from, now)?);
        }
        Ok(events)
    }

    /// Per-tick connectivity maintenance for one interface
    ///
    /// Drops links whose peer left range (or whose host radio is off),
    /// refreshes distance-dependent speeds, then links up with every
    /// candidate neighbor that qualifies.
    pub fn update(&mut self, addr: InterfaceAddress, now: f64) -> LinkResult<Vec<LinkEvent>> {
        if self.proximity_dirty {
            self.rebuild_proximity();
        }
        let host = self.iface(addr)?.host();
        let radio_active = self.host_ref(host)?.radio_active;
        let mut events = Vec::new();

        for id in self.iface(addr)?.connections().to_vec() {
            let other = self
                .connections
                .get(id)
                .and_then(|c| c.other(addr))
                .ok_or_else(|| InvariantError::UnknownConnection(id.to_string()))?;
            if !radio_active || !self.is_within_range(addr, other.interface)? {
                events.push(self.disconnect(id, addr, now)?);
            } else if self.has_distance_capacity(addr, other.interface) {
                let speed = self.connection_speed(addr, other.interface)?;
                if let Some(con) = self.connections.get_mut(id) {
                    con.set_speed(speed, now);
                }
            }
        }

        if !radio_active {
            return Ok(events);
        }
        let location = self.host_ref(host)?.location;
        let reach = self.iface(addr)?.range();
        for candidate in self.proximity.near_interfaces(location, reach) {
            if candidate == addr || !self.interfaces.contains_key(&candidate) {
                continue;
            }
            if let Some(info) = self.connect(addr, candidate, now)? {
                events.push(LinkEvent::Up(info));
            }
        }
        Ok(events)
    }

    /// Take down connection `id` on behalf of interface `local`
    pub fn disconnect(
        &mut self,
        id: ConnectionId,
        local: InterfaceAddress,
        now: f64,
    ) -> LinkResult<LinkEvent> {
        let con = self.con_mut(id)?;
        let (local_end, peer_end) = match (con.endpoint(local), con.other(local)) {
            (Some(l), Some(p)) => (l, p),
            _ => return Err(InvariantError::UnknownConnection(id.to_string()).into()),
        };
        con.set_up_state(false);

        let interrupted = self.finalize_before_disconnection(id, now)?;

        if !self.iface_mut(peer_end.interface)?.remove_connection(id) {
            return Err(InvariantError::ConnectionNotInPeerList {
                connection: id.to_string(),
                peer: peer_end.interface.to_string(),
            }
            .into());
        }
        self.iface_mut(local)?.remove_connection(id);
        self.connections.remove(id);

        debug!(connection = %id, a = %local_end.node, b = %peer_end.node, "Link down");
        Ok(LinkEvent::Down {
            link: LinkInfo {
                connection: id,
                local: local_end,
                peer: peer_end,
            },
            interrupted,
        })
    }

    fn finalize_before_disconnection(
        &mut self,
        id: ConnectionId,
        now: f64,
    ) -> LinkResult<Option<Interrupted>> {
        let con = self.con(id)?;
        if con.is_transfer_ongoing(now) {
            let (from, to) = Self::transfer_ends(con)?;
            self.iface_mut(to.interface)?
                .interference_mut()
                .abort_message_reception(id);
            let transfer = self
                .con_mut(id)?
                .abort_transfer()
                .ok_or_else(|| InvariantError::NoOngoingTransfer(id.to_string()))?;
            warn!(connection = %id, message = %transfer.message.id, "Transfer aborted by link loss");
            Ok(Some(Interrupted::Aborted {
                message: transfer.message,
                from,
                to,
            }))
        } else if !con.is_idle() {
            Ok(Some(Interrupted::Completed(self.complete_transfer(id, now)?)))
        } else {
            Ok(None)
        }
    }

    /// Check that every listed connection is listed by its peer too
    pub fn is_symmetric(&self) -> bool {
        self.interfaces.values().all(|iface| {
            iface.connections().iter().all(|id| {
                self.connections
                    .get(*id)
                    .and_then(|c| c.other(iface.address()))
                    .and_then(|other| self.interfaces.get(&other.interface))
                    .is_some_and(|peer| peer.connections().contains(id))
            })
        })
    }

    // ========================================================================
    // Interface state
    // ========================================================================

    pub fn is_busy(&self, addr: InterfaceAddress) -> bool {
        self.interfaces
            .get(&addr)
            .is_some_and(|i| i.is_busy(&self.connections))
    }

    pub fn is_sending_data(&self, addr: InterfaceAddress) -> bool {
        self.interfaces
            .get(&addr)
            .is_some_and(|i| i.is_sending_data(&self.connections))
    }

    pub fn is_receiving_data(&self, addr: InterfaceAddress) -> bool {
        self.interfaces
            .get(&addr)
            .is_some_and(|i| i.is_receiving_data(&self.connections))
    }

    pub fn is_ready_to_begin_transfer(&self, addr: InterfaceAddress) -> bool {
        self.interfaces
            .get(&addr)
            .is_some_and(|i| i.is_ready_to_begin_transfer(&self.connections))
    }

    pub fn is_sending_message(&self, addr: InterfaceAddress, id: &MessageId) -> bool {
        self.interfaces
            .get(&addr)
            .is_some_and(|i| i.is_sending_message(id, &self.connections))
    }

    /// Up connections of `addr` with the endpoint across each
    pub fn neighbors(&self, addr: InterfaceAddress) -> Vec<(ConnectionId, Endpoint)> {
        let Some(iface) = self.interfaces.get(&addr) else {
            return Vec::new();
        };
        iface
            .connections()
            .iter()
            .filter_map(|id| self.connections.get(*id))
            .filter(|c| c.is_up())
            .filter_map(|c| c.other(addr).map(|other| (c.id(), other)))
            .collect()
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Start sending `message` over connection `con`
    pub fn send_unicast_message_via_connection<G: ReceiveGate + ?Sized>(
        &mut self,
        gate: &G,
        from: InterfaceAddress,
        con: ConnectionId,
        message: &Message,
        now: f64,
        events: &mut dyn EventSink,
    ) -> LinkResult<UnicastOutcome> {
        if !self.iface(from)?.connections().contains(&con) {
            return Ok(UnicastOutcome::Denied);
        }
        if !self.con(con)?.is_ready_for_transfer() {
            return Ok(UnicastOutcome::Denied);
        }
        if self.start_transfer_on(gate, from, con, message, now, events)? {
            Ok(UnicastOutcome::Ok)
        } else {
            Ok(UnicastOutcome::Failed)
        }
    }

    /// Start sending `message` to whichever ready connection reaches `to`
    pub fn send_unicast_message_to_host<G: ReceiveGate + ?Sized>(
        &mut self,
        gate: &G,
        from: InterfaceAddress,
        to: NodeId,
        message: &Message,
        now: f64,
        events: &mut dyn EventSink,
    ) -> LinkResult<UnicastOutcome> {
        let target = self
            .neighbors(from)
            .into_iter()
            .find(|(id, other)| {
                other.node == to && self.connections.get(*id).is_some_and(|c| c.is_idle())
            })
            .map(|(id, _)| id);
        match target {
            Some(con) => self.send_unicast_message_via_connection(gate, from, con, message, now, events),
            None => Ok(UnicastOutcome::Denied),
        }
    }

    /// Put `message` on the air for every idle neighbor of `from`
    ///
    /// Denied when the interface has no links, is already transmitting,
    /// or no neighbor took the message.
    pub fn send_broadcast_message<G: ReceiveGate + ?Sized>(
        &mut self,
        gate: &G,
        from: InterfaceAddress,
        message: &Message,
        now: f64,
        events: &mut dyn EventSink,
    ) -> LinkResult<BroadcastOutcome> {
        let neighbors = self.neighbors(from);
        if neighbors.is_empty() || self.is_sending_data(from) {
            return Ok(BroadcastOutcome::Denied);
        }

        let mut started = 0;
        for (con, _) in neighbors {
            if self.con(con)?.is_idle() && self.start_transfer_on(gate, from, con, message, now, events)? {
                started += 1;
            }
        }
        if started == 0 {
            return Ok(BroadcastOutcome::Denied);
        }

        let source = self.iface(from)?.host();
        trace!(interface = %from, message = %message.id, receivers = started, "Broadcast");
        events.emit(SimEvent::TransmissionPerformed {
            time: now,
            message: message.clone(),
            source,
        });
        Ok(BroadcastOutcome::Ok)
    }

    fn start_transfer_on<G: ReceiveGate + ?Sized>(
        &mut self,
        gate: &G,
        from: InterfaceAddress,
        con: ConnectionId,
        message: &Message,
        now: f64,
        events: &mut dyn EventSink,
    ) -> LinkResult<bool> {
        let (local, peer) = {
            let c = self.con(con)?;
            match (c.endpoint(from), c.other(from)) {
                (Some(l), Some(p)) => (l, p),
                _ => return Err(InvariantError::UnknownConnection(con.to_string()).into()),
            }
        };
        if !self.con(con)?.can_carry(message) {
            trace!(message = %message.id, to = %peer.node, "Link speed is zero");
            return Ok(false);
        }

        let verdict = if self
            .iface(peer.interface)?
            .interference()
            .is_receiving_message(&message.id)
        {
            ReceiveVerdict::TryLaterBusy
        } else {
            gate.check_receiving(peer.node, message)
        };
        if verdict != ReceiveVerdict::Ok {
            trace!(message = %message.id, to = %peer.node, ?verdict, "Receiver refused");
            return Ok(false);
        }

        self.con_mut(con)?.start_transfer(from, message.clone(), now);
        match self.begin_new_reception(peer.interface, con, now)? {
            ReceptionStart::DeniedDueToSend => {
                self.con_mut(con)?.abort_transfer();
                trace!(message = %message.id, to = %peer.node, "Receiver is sending");
                return Ok(false);
            }
            ReceptionStart::Interference => {
                trace!(message = %message.id, to = %peer.node, "Reception overlaps another");
            }
            ReceptionStart::Ok => {}
        }

        debug!(message = %message.id, from = %local.node, to = %peer.node, "Transfer started");
        events.emit(SimEvent::TransferStarted {
            time: now,
            message: message.clone(),
            from: local.node,
            to: peer.node,
        });
        Ok(true)
    }

    // ========================================================================
    // Receiving
    // ========================================================================

    /// Register the transfer on `con` as a reception at `receiver`
    ///
    /// Denied while the receiver is itself sending; otherwise the
    /// receiver's interference model decides.
    pub fn begin_new_reception(
        &mut self,
        receiver: InterfaceAddress,
        con: ConnectionId,
        now: f64,
    ) -> LinkResult<ReceptionStart> {
        let connection = self
            .connections
            .get(con)
            .ok_or_else(|| InvariantError::UnknownConnection(con.to_string()))?;
        if connection.is_idle() {
            return Err(InvariantError::NoOngoingTransfer(con.to_string()).into());
        }
        let iface = self
            .interfaces
            .get_mut(&receiver)
            .ok_or_else(|| InvariantError::UnknownInterface(receiver.to_string()))?;
        if iface.is_sending_data(&self.connections) {
            return Ok(ReceptionStart::DeniedDueToSend);
        }
        Ok(iface
            .interference_mut()
            .begin_new_reception(connection, &self.connections, now))
    }

    pub fn is_message_transferred_correctly(
        &self,
        receiver: InterfaceAddress,
        id: &MessageId,
        con: ConnectionId,
        now: f64,
    ) -> LinkResult<TransferStatus> {
        let connection = self.con(con)?;
        Ok(self
            .iface(receiver)?
            .interference()
            .is_message_transferred_correctly(id, connection, now))
    }

    pub fn retrieve_transferred_message(
        &mut self,
        receiver: InterfaceAddress,
        id: &MessageId,
        con: ConnectionId,
        now: f64,
    ) -> LinkResult<Option<Message>> {
        let connection = self
            .connections
            .get(con)
            .ok_or_else(|| InvariantError::UnknownConnection(con.to_string()))?;
        let iface = self
            .interfaces
            .get_mut(&receiver)
            .ok_or_else(|| InvariantError::UnknownInterface(receiver.to_string()))?;
        Ok(iface
            .interference_mut()
            .retrieve_transferred_message(id, connection, now))
    }

    /// Discard the reception in progress over `con` at `receiver`
    pub fn abort_message_reception(
        &mut self,
        receiver: InterfaceAddress,
        con: ConnectionId,
    ) -> LinkResult<()> {
        if !self.con(con)?.is_receiver_interface(receiver) {
            return Err(InvariantError::NoOngoingTransfer(con.to_string()).into());
        }
        self.iface_mut(receiver)?
            .interference_mut()
            .abort_message_reception(con);
        Ok(())
    }

    /// Connections whose transfer has delivered all of its bytes
    pub fn completed_transfers(&self, now: f64) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|c| c.is_up() && c.is_message_transferred(now))
            .map(|c| c.id())
            .collect()
    }

    /// Finalize the finished transfer on `con`
    ///
    /// The receiver's copy is taken out of its interference model; it is
    /// `None` if the reception was corrupted.
    pub fn complete_transfer(&mut self, con: ConnectionId, now: f64) -> LinkResult<CompletedTransfer> {
        let connection = self.con(con)?;
        if !connection.is_message_transferred(now) {
            return Err(InvariantError::NoOngoingTransfer(con.to_string()).into());
        }
        let (from, to) = Self::transfer_ends(connection)?;
        let id = connection
            .message()
            .map(|m| m.id.clone())
            .ok_or_else(|| InvariantError::NoOngoingTransfer(con.to_string()))?;

        let received = self.retrieve_transferred_message(to.interface, &id, con, now)?;
        let transfer = self
            .con_mut(con)?
            .finalize_transfer()
            .ok_or_else(|| InvariantError::NoOngoingTransfer(con.to_string()))?;
        if received.is_none() {
            warn!(connection = %con, message = %id, "Reception interfered");
        }
        Ok(CompletedTransfer {
            connection: con,
            from,
            to,
            message: transfer.message,
            received,
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn transfer_ends(con: &Connection) -> LinkResult<(Endpoint, Endpoint)> {
        match (con.sender(), con.receiver()) {
            (Some(from), Some(to)) => Ok((from, to)),
            _ => Err(InvariantError::NoOngoingTransfer(con.id().to_string()).into()),
        }
    }

    fn connection_speed(&self, a: InterfaceAddress, b: InterfaceAddress) -> LinkResult<f64> {
        let (ia, ib) = (self.iface(a)?, self.iface(b)?);
        let distance = self.distance_between(ia.host(), ib.host())?;
        Ok(ia.speed_at(distance).min(ib.speed_at(distance)))
    }

    fn has_distance_capacity(&self, a: InterfaceAddress, b: InterfaceAddress) -> bool {
        [a, b].iter().any(|addr| {
            self.interfaces
                .get(addr)
                .is_some_and(|i| matches!(i.kind(), InterfaceKind::DistanceCapacity { .. }))
        })
    }

    fn distance_between(&self, a: NodeId, b: NodeId) -> LinkResult<f64> {
        Ok(self.host_ref(a)?.location.distance(&self.host_ref(b)?.location))
    }

    fn host_ref(&self, id: NodeId) -> LinkResult<&Host> {
        self.hosts
            .get(id.index())
            .ok_or_else(|| InvariantError::UnknownNode(id.to_string()).into())
    }

    fn host_mut(&mut self, id: NodeId) -> LinkResult<&mut Host> {
        self.hosts
            .get_mut(id.index())
            .ok_or_else(|| InvariantError::UnknownNode(id.to_string()).into())
    }

    fn iface(&self, addr: InterfaceAddress) -> LinkResult<&NetworkInterface> {
        self.interfaces
            .get(&addr)
            .ok_or_else(|| InvariantError::UnknownInterface(addr.to_string()).into())
    }

    fn iface_mut(&mut self, addr: InterfaceAddress) -> LinkResult<&mut NetworkInterface> {
        self.interfaces
            .get_mut(&addr)
            .ok_or_else(|| InvariantError::UnknownInterface(addr.to_string()).into())
    }

    fn con(&self, id: ConnectionId) -> LinkResult<&Connection> {
        self.connections
            .get(id)
            .ok_or_else(|| InvariantError::UnknownConnection(id.to_string()).into())
    }

    fn con_mut(&mut self, id: ConnectionId) -> LinkResult<&mut Connection> {
        self.connections
            .get_mut(id)
            .ok_or_else(|| InvariantError::UnknownConnection(id.to_string()).into())
    }
}
