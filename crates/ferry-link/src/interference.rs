//! Interference models
//!
//! Each interface owns one model that tracks the receptions currently
//! arriving on it. The model decides whether a new reception starts
//! cleanly and whether a finished transfer arrived intact. Receptions on
//! different interfaces never affect each other.

use ferry_core::{ConnectionId, Message, MessageId};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::connection::{Connection, ConnectionTable};

/// Which arbitration rule an interface applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterferenceKind {
    /// Receptions never disturb each other
    #[default]
    Ideal,
    /// Overlapping receptions corrupt each other
    Collision,
}

/// Outcome of starting a reception
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceptionStart {
    Ok,
    /// The reception overlaps another one and will arrive corrupted
    Interference,
    /// The interface is sending and cannot listen (half duplex)
    DeniedDueToSend,
}

/// State of a tracked reception
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Fully received without interference
    Ok,
    /// Still receiving
    Incomplete,
    /// Corrupted, or not tracked at all
    Interference,
}

#[derive(Debug, Clone)]
struct Reception {
    message: Message,
    connection: ConnectionId,
    interfered: bool,
}

/// Per-interface reception arbiter
#[derive(Debug, Clone, Default)]
pub struct InterferenceModel {
    kind: InterferenceKind,
    receptions: Vec<Reception>,
}

impl InterferenceModel {
    pub fn new(kind: InterferenceKind) -> Self {
        Self {
            kind,
            receptions: Vec::new(),
        }
    }

    pub fn kind(&self) -> InterferenceKind {
        self.kind
    }

    /// Number of receptions currently tracked
    pub fn active_receptions(&self) -> usize {
        self.receptions.len()
    }

    /// True if a reception of `id` is tracked
    pub fn is_receiving_message(&self, id: &MessageId) -> bool {
        self.receptions.iter().any(|r| &r.message.id == id)
    }

    /// Register the transfer currently on `con` as a new reception
    pub fn begin_new_reception(
        &mut self,
        con: &Connection,
        connections: &ConnectionTable,
        now: f64,
    ) -> ReceptionStart {
        let Some(message) = con.message().cloned() else {
            return ReceptionStart::Ok;
        };
        self.receptions.retain(|r| r.connection != con.id());

        let interfered = match self.kind {
            InterferenceKind::Ideal => false,
            InterferenceKind::Collision => {
                let mut overlap = false;
                for reception in self.receptions.iter_mut() {
                    let ongoing = connections
                        .get(reception.connection)
                        .is_some_and(|c| c.is_transfer_ongoing(now));
                    if ongoing {
                        reception.interfered = true;
                        overlap = true;
                    }
                }
                overlap
            }
        };

        trace!(message = %message.id, connection = %con.id(), interfered, "Reception started");
        self.receptions.push(Reception {
            message,
            connection: con.id(),
            interfered,
        });

        if interfered {
            ReceptionStart::Interference
        } else {
            ReceptionStart::Ok
        }
    }

    /// Outcome of the reception of `id` over `con`
    pub fn is_message_transferred_correctly(
        &self,
        id: &MessageId,
        con: &Connection,
        now: f64,
    ) -> TransferStatus {
        let Some(reception) = self
            .receptions
            .iter()
            .find(|r| &r.message.id == id && r.connection == con.id())
        else {
            return TransferStatus::Interference;
        };
        if reception.interfered {
            TransferStatus::Interference
        } else if !con.is_message_transferred(now) {
            TransferStatus::Incomplete
        } else {
            TransferStatus::Ok
        }
    }

    /// Take a finished reception out of the model
    ///
    /// Returns the received copy if it arrived intact. Interfered
    /// receptions are dropped and yield `None`; incomplete ones stay.
    pub fn retrieve_transferred_message(
        &mut self,
        id: &MessageId,
        con: &Connection,
        now: f64,
    ) -> Option<Message> {
        match self.is_message_transferred_correctly(id, con, now) {
            TransferStatus::Incomplete => None,
            TransferStatus::Interference => {
                self.remove(id, con.id());
                None
            }
            TransferStatus::Ok => self.remove(id, con.id()),
        }
    }

    /// Discard whatever is being received over `con`
    pub fn abort_message_reception(&mut self, con: ConnectionId) -> Option<Message> {
        let index = self.receptions.iter().position(|r| r.connection == con)?;
        Some(self.receptions.remove(index).message)
    }

    fn remove(&mut self, id: &MessageId, con: ConnectionId) -> Option<Message> {
        let index = self
            .receptions
            .iter()
            .position(|r| &r.message.id == id && r.connection == con)?;
        Some(self.receptions.remove(index).message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Endpoint;
    use ferry_core::{InterfaceAddress, NodeId};

    /// Connection from `sender` (iface 10+n) into the receiver (iface 0)
    fn make_transfer(id: u64, msg: &str, size: u64, now: f64) -> Connection {
        let sender = InterfaceAddress(10 + id as u32);
        let mut con = Connection::new(
            ConnectionId(id),
            Endpoint::new(NodeId(id as u32 + 1), sender),
            Endpoint::new(NodeId(0), InterfaceAddress(0)),
            10.0,
        );
        con.start_transfer(sender, Message::new(msg, NodeId(id as u32 + 1), size, 0.0), now);
        con
    }

    #[test]
    fn test_ideal_never_interferes() {
        let mut table = ConnectionTable::new();
        let mut model = InterferenceModel::new(InterferenceKind::Ideal);
        let c1 = make_transfer(1, "M1", 100, 0.0);
        let c2 = make_transfer(2, "M2", 100, 1.0);
        table.insert(c1.clone());
        table.insert(c2.clone());

        assert_eq!(model.begin_new_reception(&c1, &table, 0.0), ReceptionStart::Ok);
        assert_eq!(model.begin_new_reception(&c2, &table, 1.0), ReceptionStart::Ok);
        assert_eq!(
            model.is_message_transferred_correctly(&"M1".into(), &c1, 5.0),
            TransferStatus::Incomplete
        );
        assert_eq!(
            model.is_message_transferred_correctly(&"M1".into(), &c1, 10.0),
            TransferStatus::Ok
        );
    }

    #[test]
    fn test_collision_corrupts_both() {
        let mut table = ConnectionTable::new();
        let mut model = InterferenceModel::new(InterferenceKind::Collision);
        let c1 = make_transfer(1, "M1", 100, 0.0);
        let c2 = make_transfer(2, "M2", 100, 1.0);
        table.insert(c1.clone());
        table.insert(c2.clone());

        assert_eq!(model.begin_new_reception(&c1, &table, 0.0), ReceptionStart::Ok);
        assert_eq!(
            model.begin_new_reception(&c2, &table, 1.0),
            ReceptionStart::Interference
        );
        assert_eq!(
            model.is_message_transferred_correctly(&"M1".into(), &c1, 20.0),
            TransferStatus::Interference
        );
        assert_eq!(model.retrieve_transferred_message(&"M1".into(), &c1, 20.0), None);
        assert_eq!(model.active_receptions(), 1);
    }

    #[test]
    fn test_collision_after_completion_is_clean() {
        let mut table = ConnectionTable::new();
        let mut model = InterferenceModel::new(InterferenceKind::Collision);
        let c1 = make_transfer(1, "M1", 10, 0.0);
        let c2 = make_transfer(2, "M2", 10, 5.0);
        table.insert(c1.clone());
        table.insert(c2.clone());

        model.begin_new_reception(&c1, &table, 0.0);
        // c1 finished at t=1
        assert_eq!(model.begin_new_reception(&c2, &table, 5.0), ReceptionStart::Ok);
        let received = model.retrieve_transferred_message(&"M1".into(), &c1, 5.0);
        assert_eq!(received.map(|m| m.id), Some(MessageId::from("M1")));
    }

    #[test]
    fn test_unknown_reception_reports_interference() {
        let model = InterferenceModel::new(InterferenceKind::Ideal);
        let c1 = make_transfer(1, "M1", 10, 0.0);
        assert_eq!(
            model.is_message_transferred_correctly(&"M9".into(), &c1, 100.0),
            TransferStatus::Interference
        );
    }

    #[test]
    fn test_incomplete_retrieval_keeps_reception() {
        let mut table = ConnectionTable::new();
        let mut model = InterferenceModel::new(InterferenceKind::Ideal);
        let c1 = make_transfer(1, "M1", 100, 0.0);
        table.insert(c1.clone());
        model.begin_new_reception(&c1, &table, 0.0);
        assert_eq!(model.retrieve_transferred_message(&"M1".into(), &c1, 1.0), None);
        assert!(model.is_receiving_message(&"M1".into()));
    }

    #[test]
    fn test_abort_reception() {
        let mut table = ConnectionTable::new();
        let mut model = InterferenceModel::new(InterferenceKind::Collision);
        let c1 = make_transfer(1, "M1", 100, 0.0);
        table.insert(c1.clone());
        model.begin_new_reception(&c1, &table, 0.0);
        assert_eq!(model.kind(), InterferenceKind::Collision);

        assert!(model.abort_message_reception(ConnectionId(1)).is_some());
        assert_eq!(model.active_receptions(), 0);
        assert!(model.abort_message_reception(ConnectionId(1)).is_none());
    }
}
