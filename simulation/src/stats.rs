//! Run statistics derived from the event stream

use std::collections::BTreeSet;

use ferry_core::{DropMode, MessageId, SimEvent};
use serde::Serialize;

/// Statistics collected during a simulation run
///
/// Transfer counters cover data messages only; HELLO control traffic is
/// left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimStats {
    pub messages_created: u64,
    pub transfers_started: u64,
    /// Arrivals at a subscriber that had not seen the message before
    pub messages_delivered: u64,
    /// Distinct messages that reached at least one subscriber
    pub unique_delivered: u64,
    /// First arrivals at nodes that only carry the message
    pub messages_relayed: u64,
    pub transfers_aborted: u64,
    pub receptions_interfered: u64,
    pub messages_dropped: u64,
    pub messages_discarded: u64,
    pub messages_expired: u64,
    pub messages_removed: u64,
    pub connections_up: u64,
    pub connections_down: u64,
    /// Sum of creation-to-delivery delays over all deliveries
    pub total_delivery_latency: f64,
    /// Sum of hop counts over all deliveries
    pub total_hops: u64,
}

impl SimStats {
    /// Tally a recorded event stream
    pub fn from_events(events: &[SimEvent]) -> Self {
        let mut stats = Self::default();
        let mut delivered: BTreeSet<&MessageId> = BTreeSet::new();
        for event in events {
            match event {
                SimEvent::HostsConnected { .. } => stats.connections_up += 1,
                SimEvent::HostsDisconnected { .. } => stats.connections_down += 1,
                SimEvent::MessageCreated { .. } => stats.messages_created += 1,
                SimEvent::TransmissionPerformed { .. } => {}
                SimEvent::TransferStarted { message, .. } if !message.is_hello() => {
                    stats.transfers_started += 1
                }
                SimEvent::TransferAborted { message, .. } if !message.is_hello() => {
                    stats.transfers_aborted += 1
                }
                SimEvent::TransmissionInterfered { message, .. } if !message.is_hello() => {
                    stats.receptions_interfered += 1
                }
                SimEvent::TransferStarted { .. }
                | SimEvent::TransferAborted { .. }
                | SimEvent::TransmissionInterfered { .. } => {}
                SimEvent::MessageTransferred {
                    time,
                    message,
                    first_delivery,
                    final_target,
                    ..
                } => match (*first_delivery, *final_target) {
                    (true, true) => {
                        stats.messages_delivered += 1;
                        stats.total_delivery_latency += time - message.creation_time;
                        stats.total_hops += u64::from(message.hop_count);
                        delivered.insert(&message.id);
                    }
                    (true, false) => stats.messages_relayed += 1,
                    _ => {}
                },
                SimEvent::MessageDeleted { mode, .. } => match mode {
                    DropMode::Dropped => stats.messages_dropped += 1,
                    DropMode::Discarded => stats.messages_discarded += 1,
                    DropMode::TtlExpiration => stats.messages_expired += 1,
                    DropMode::Removed => stats.messages_removed += 1,
                },
            }
        }
        stats.unique_delivered = delivered.len() as u64;
        stats
    }

    /// Share of created messages that reached at least one subscriber
    pub fn delivery_ratio(&self) -> f64 {
        if self.messages_created == 0 {
            0.0
        } else {
            self.unique_delivered as f64 / self.messages_created as f64
        }
    }

    pub fn average_latency(&self) -> f64 {
        if self.messages_delivered == 0 {
            0.0
        } else {
            self.total_delivery_latency / self.messages_delivered as f64
        }
    }

    pub fn average_hops(&self) -> f64 {
        if self.messages_delivered == 0 {
            0.0
        } else {
            self.total_hops as f64 / self.messages_delivered as f64
        }
    }
}
