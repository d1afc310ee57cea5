//! Bidirectional connections between two interfaces
//!
//! A [`Connection`] carries at most one transfer at a time. Transfer
//! progress is tracked as a byte checkpoint plus the time it was taken, so
//! a speed change mid-transfer only affects the bytes sent afterwards.

use std::collections::BTreeMap;

use ferry_core::{ConnectionId, InterfaceAddress, Message, MessageId, NodeId};

/// Slack when comparing transferred bytes against a message size
const BYTE_EPSILON: f64 = 1e-6;

/// One side of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub node: NodeId,
    pub interface: InterfaceAddress,
}

impl Endpoint {
    pub fn new(node: NodeId, interface: InterfaceAddress) -> Self {
        Self { node, interface }
    }
}

/// A message in flight over a connection
#[derive(Debug, Clone)]
pub struct Transfer {
    pub message: Message,
    /// Interface that is sending
    pub sender: InterfaceAddress,
    bytes_done: f64,
    checkpoint: f64,
}

impl Transfer {
    fn bytes_at(&self, now: f64, speed: f64) -> f64 {
        self.bytes_done + (now - self.checkpoint).max(0.0) * speed
    }
}

/// A link between two interfaces
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    a: Endpoint,
    b: Endpoint,
    speed: f64,
    up: bool,
    transfer: Option<Transfer>,
}

impl Connection {
    /// Create an up connection between `a` (initiator) and `b`
    pub fn new(id: ConnectionId, a: Endpoint, b: Endpoint, speed: f64) -> Self {
        Self {
            id,
            a,
            b,
            speed,
            up: true,
            transfer: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Both endpoints, initiator first
    pub fn endpoints(&self) -> (Endpoint, Endpoint) {
        (self.a, self.b)
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn set_up_state(&mut self, up: bool) {
        self.up = up;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Change the link speed, keeping bytes already sent
    ///
    /// A link may drop to speed 0. A transfer already attached then stalls
    /// until the speed rises again or the link goes down.
    pub fn set_speed(&mut self, speed: f64, now: f64) {
        if let Some(transfer) = self.transfer.as_mut() {
            transfer.bytes_done = transfer.bytes_at(now, self.speed);
            transfer.checkpoint = now;
        }
        self.speed = speed;
    }

    pub fn contains(&self, addr: InterfaceAddress) -> bool {
        self.a.interface == addr || self.b.interface == addr
    }

    /// The endpoint across from `addr`
    pub fn other(&self, addr: InterfaceAddress) -> Option<Endpoint> {
        if self.a.interface == addr {
            Some(self.b)
        } else if self.b.interface == addr {
            Some(self.a)
        } else {
            None
        }
    }

    /// The endpoint owned by `addr`
    pub fn endpoint(&self, addr: InterfaceAddress) -> Option<Endpoint> {
        self.other(addr).and_then(|other| self.other(other.interface))
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        self.transfer.as_ref()
    }

    /// Message being transferred, if any
    pub fn message(&self) -> Option<&Message> {
        self.transfer.as_ref().map(|t| &t.message)
    }

    /// True if no transfer is attached (ongoing or awaiting finalization)
    pub fn is_idle(&self) -> bool {
        self.transfer.is_none()
    }

    /// Up and idle
    pub fn is_ready_for_transfer(&self) -> bool {
        self.up && self.is_idle()
    }

    pub fn is_sender_interface(&self, addr: InterfaceAddress) -> bool {
        self.transfer.as_ref().is_some_and(|t| t.sender == addr)
    }

    pub fn is_receiver_interface(&self, addr: InterfaceAddress) -> bool {
        self.contains(addr) && self.transfer.as_ref().is_some_and(|t| t.sender != addr)
    }

    /// Endpoint receiving the current transfer
    pub fn receiver(&self) -> Option<Endpoint> {
        self.transfer.as_ref().and_then(|t| self.other(t.sender))
    }

    /// Endpoint sending the current transfer
    pub fn sender(&self) -> Option<Endpoint> {
        self.transfer.as_ref().and_then(|t| self.endpoint(t.sender))
    }

    /// True if the transfer carries the message `id`
    pub fn is_transferring_message(&self, id: &MessageId) -> bool {
        self.message().is_some_and(|m| &m.id == id)
    }

    /// True if a transfer of `message` could ever finish at the current speed
    pub fn can_carry(&self, message: &Message) -> bool {
        message.size == 0 || self.speed > 0.0
    }

    /// Attach a new transfer. Returns false if one is already attached,
    /// `sender` is not an endpoint or the link is too slow to carry it.
    pub fn start_transfer(&mut self, sender: InterfaceAddress, message: Message, now: f64) -> bool {
        if self.transfer.is_some() || !self.contains(sender) || !self.can_carry(&message) {
            return false;
        }
        self.transfer = Some(Transfer {
            message,
            sender,
            bytes_done: 0.0,
            checkpoint: now,
        });
        true
    }

    /// Bytes of the current transfer delivered by `now`
    pub fn transferred_bytes(&self, now: f64) -> f64 {
        self.transfer
            .as_ref()
            .map(|t| t.bytes_at(now, self.speed).min(t.message.size as f64))
            .unwrap_or(0.0)
    }

    /// Bytes still to go at `now`
    pub fn remaining_bytes(&self, now: f64) -> f64 {
        self.transfer
            .as_ref()
            .map(|t| (t.message.size as f64 - t.bytes_at(now, self.speed)).max(0.0))
            .unwrap_or(0.0)
    }

    /// The attached transfer has delivered all of its bytes
    pub fn is_message_transferred(&self, now: f64) -> bool {
        self.transfer.as_ref().is_some_and(|t| {
            t.bytes_at(now, self.speed) + BYTE_EPSILON >= t.message.size as f64
        })
    }

    /// A transfer is attached and still has bytes to go
    pub fn is_transfer_ongoing(&self, now: f64) -> bool {
        self.transfer.is_some() && !self.is_message_transferred(now)
    }

    /// Drop the current transfer without completing it
    pub fn abort_transfer(&mut self) -> Option<Transfer> {
        self.transfer.take()
    }

    /// Detach a completed transfer
    pub fn finalize_transfer(&mut self) -> Option<Transfer> {
        self.transfer.take()
    }
}

/// Owner of all live connections of a network
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    connections: BTreeMap<ConnectionId, Connection>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.id(), connection);
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(speed: f64) -> Connection {
        Connection::new(
            ConnectionId(0),
            Endpoint::new(NodeId(0), InterfaceAddress(0)),
            Endpoint::new(NodeId(1), InterfaceAddress(1)),
            speed,
        )
    }

    fn make_message(size: u64) -> Message {
        Message::new("M1", NodeId(0), size, 0.0)
    }

    #[test]
    fn test_single_transfer_at_a_time() {
        let mut con = make_connection(10.0);
        assert!(con.start_transfer(InterfaceAddress(0), make_message(100), 0.0));
        assert!(!con.start_transfer(InterfaceAddress(1), make_message(100), 0.0));
        assert!(!con.is_idle());
        assert!(!con.is_ready_for_transfer());
    }

    #[test]
    fn test_transfer_progress() {
        let mut con = make_connection(10.0);
        con.start_transfer(InterfaceAddress(0), make_message(100), 0.0);
        assert!(con.is_transfer_ongoing(5.0));
        assert_eq!(con.transferred_bytes(5.0), 50.0);
        assert_eq!(con.remaining_bytes(5.0), 50.0);
        assert!(con.is_message_transferred(10.0));
        assert!(!con.is_transfer_ongoing(10.0));
        assert!(con.finalize_transfer().is_some());
        assert!(con.is_idle());
    }

    #[test]
    fn test_speed_change_keeps_progress() {
        let mut con = make_connection(10.0);
        con.start_transfer(InterfaceAddress(0), make_message(100), 0.0);
        con.set_speed(20.0, 4.0);
        assert_eq!(con.transferred_bytes(4.0), 40.0);
        assert!(!con.is_message_transferred(6.9));
        assert!(con.is_message_transferred(7.0));
    }

    #[test]
    fn test_roles() {
        let mut con = make_connection(10.0);
        assert!(!con.is_sender_interface(InterfaceAddress(0)));
        con.start_transfer(InterfaceAddress(1), make_message(10), 0.0);
        assert!(con.is_sender_interface(InterfaceAddress(1)));
        assert!(con.is_receiver_interface(InterfaceAddress(0)));
        assert!(!con.is_receiver_interface(InterfaceAddress(7)));
        assert_eq!(con.receiver().map(|e| e.node), Some(NodeId(0)));
        assert_eq!(con.sender().map(|e| e.node), Some(NodeId(1)));
        assert!(con.is_transferring_message(&MessageId::from("M1")));
    }

    #[test]
    fn test_other_endpoint() {
        let con = make_connection(1.0);
        assert_eq!(con.other(InterfaceAddress(0)).map(|e| e.node), Some(NodeId(1)));
        assert_eq!(con.other(InterfaceAddress(1)).map(|e| e.node), Some(NodeId(0)));
        assert_eq!(con.other(InterfaceAddress(5)), None);
        assert_eq!(con.endpoint(InterfaceAddress(1)).map(|e| e.node), Some(NodeId(1)));
    }

    #[test]
    fn test_zero_size_completes_immediately() {
        let mut con = make_connection(0.0);
        con.start_transfer(InterfaceAddress(0), make_message(0), 3.0);
        assert!(con.is_message_transferred(3.0));
    }

    #[test]
    fn test_zero_speed_refuses_payload() {
        let mut con = make_connection(0.0);
        assert!(!con.can_carry(&make_message(10)));
        assert!(!con.start_transfer(InterfaceAddress(0), make_message(10), 0.0));
        assert!(con.is_idle());
    }
}
