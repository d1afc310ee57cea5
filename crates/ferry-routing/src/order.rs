//! Forwarding order strategies
//!
//! A forwarding order decides which buffered message a router tries first
//! when several compete for the same interface. Sorting is always stable,
//! so equal candidates keep their input order and runs stay reproducible.

use std::cmp::Ordering;

use ferry_core::Message;
use serde::{Deserialize, Serialize};

/// Ordering applied to forwarding candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardingOrder {
    /// Keep the input order
    Fifo,
    /// Highest priority first, earliest received first within a priority
    #[default]
    PrioritizedFifo,
}

/// Anything that can be ordered by the message it carries
///
/// Paired candidates such as `(Message, ConnectionId)` compare on the
/// message only.
pub trait ForwardingCandidate {
    fn candidate_message(&self) -> &Message;
}

impl ForwardingCandidate for Message {
    fn candidate_message(&self) -> &Message {
        self
    }
}

impl ForwardingCandidate for &Message {
    fn candidate_message(&self) -> &Message {
        self
    }
}

impl<C> ForwardingCandidate for (Message, C) {
    fn candidate_message(&self) -> &Message {
        &self.0
    }
}

impl ForwardingOrder {
    /// Compare two candidates, best first
    pub fn compare(&self, a: &Message, b: &Message) -> Ordering {
        match self {
            ForwardingOrder::Fifo => Ordering::Equal,
            ForwardingOrder::PrioritizedFifo => b
                .priority
                .cmp(&a.priority)
                .then_with(|| a.receive_time.total_cmp(&b.receive_time)),
        }
    }

    /// Compare two candidates, worst first
    pub fn compare_reverse(&self, a: &Message, b: &Message) -> Ordering {
        match self {
            ForwardingOrder::Fifo => Ordering::Equal,
            ForwardingOrder::PrioritizedFifo => a
                .priority
                .cmp(&b.priority)
                .then_with(|| b.receive_time.total_cmp(&a.receive_time)),
        }
    }

    /// Sort candidates in place, best first
    pub fn sort<C: ForwardingCandidate>(&self, candidates: &mut [C]) {
        candidates.sort_by(|a, b| self.compare(a.candidate_message(), b.candidate_message()));
    }

    /// Sort candidates in place, worst first
    pub fn sort_reverse<C: ForwardingCandidate>(&self, candidates: &mut [C]) {
        candidates
            .sort_by(|a, b| self.compare_reverse(a.candidate_message(), b.candidate_message()));
    }

    /// Sorted copy of `candidates`, best first
    pub fn sorted<C: ForwardingCandidate + Clone>(&self, candidates: &[C]) -> Vec<C> {
        let mut out = candidates.to_vec();
        self.sort(&mut out);
        out
    }
}
