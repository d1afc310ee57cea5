//! Simulation events and listener sinks
//!
//! Link and routing code never writes reports directly. It emits
//! [`SimEvent`]s into an [`EventSink`]; reports and statistics are built
//! from the recorded stream afterwards.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::identity::NodeId;
use crate::message::Message;

/// Why a message copy left a node's buffer
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropMode {
    /// Removed after it was no longer needed
    #[display("REMOVED")]
    Removed,
    /// Dropped to make room in a full buffer
    #[display("DROPPED")]
    Dropped,
    /// Discarded on arrival by the dissemination policy
    #[display("DISCARDED")]
    Discarded,
    /// Time to live ran out
    #[display("TTL_EXPIRATION")]
    TtlExpiration,
}

/// Events that occur during a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// Two hosts formed a link
    HostsConnected { time: f64, a: NodeId, b: NodeId },

    /// Two hosts lost their link
    HostsDisconnected { time: f64, a: NodeId, b: NodeId },

    /// A node created a new message
    MessageCreated { time: f64, message: Message },

    /// A broadcast transmission went on the air
    TransmissionPerformed {
        time: f64,
        message: Message,
        source: NodeId,
    },

    /// A transfer over one connection started
    TransferStarted {
        time: f64,
        message: Message,
        from: NodeId,
        to: NodeId,
    },

    /// A transfer was cut short
    TransferAborted {
        time: f64,
        message: Message,
        from: NodeId,
        to: NodeId,
        cause: String,
    },

    /// A reception was corrupted by interference
    TransmissionInterfered {
        time: f64,
        message: Message,
        from: NodeId,
        to: NodeId,
    },

    /// A message arrived at the next hop
    MessageTransferred {
        time: f64,
        message: Message,
        from: NodeId,
        to: NodeId,
        first_delivery: bool,
        final_target: bool,
    },

    /// A message copy was deleted from a node
    MessageDeleted {
        time: f64,
        message: Message,
        node: NodeId,
        mode: DropMode,
        cause: String,
    },
}

impl SimEvent {
    /// Simulated time the event happened at
    pub fn time(&self) -> f64 {
        match self {
            SimEvent::HostsConnected { time, .. }
            | SimEvent::HostsDisconnected { time, .. }
            | SimEvent::MessageCreated { time, .. }
            | SimEvent::TransmissionPerformed { time, .. }
            | SimEvent::TransferStarted { time, .. }
            | SimEvent::TransferAborted { time, .. }
            | SimEvent::TransmissionInterfered { time, .. }
            | SimEvent::MessageTransferred { time, .. }
            | SimEvent::MessageDeleted { time, .. } => *time,
        }
    }

    /// The message involved, if any
    pub fn message(&self) -> Option<&Message> {
        match self {
            SimEvent::HostsConnected { .. } | SimEvent::HostsDisconnected { .. } => None,
            SimEvent::MessageCreated { message, .. }
            | SimEvent::TransmissionPerformed { message, .. }
            | SimEvent::TransferStarted { message, .. }
            | SimEvent::TransferAborted { message, .. }
            | SimEvent::TransmissionInterfered { message, .. }
            | SimEvent::MessageTransferred { message, .. }
            | SimEvent::MessageDeleted { message, .. } => Some(message),
        }
    }
}

/// Receiver of simulation events
pub trait EventSink {
    fn emit(&mut self, event: SimEvent);
}

impl EventSink for Vec<SimEvent> {
    fn emit(&mut self, event: SimEvent) {
        self.push(event);
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: SimEvent) {}
}

/// Ordered record of all events of a run
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<SimEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Deletion events of the given mode
    pub fn deletions(&self, mode: DropMode) -> impl Iterator<Item = &SimEvent> {
        self.events
            .iter()
            .filter(move |e| matches!(e, SimEvent::MessageDeleted { mode: m, .. } if *m == mode))
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: SimEvent) {
        self.events.push(event);
    }
}
