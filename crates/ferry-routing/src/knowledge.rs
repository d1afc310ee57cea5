//! Knowledge of surroundings
//!
//! Each router keeps, per interface, what its neighbors last advertised in
//! a HELLO: the ids of the messages they hold and the topics they
//! subscribe to. A new HELLO replaces the previous entry for that
//! neighbor.

use std::collections::BTreeMap;

use ferry_core::{HelloPayload, InterfaceAddress, MessageId, NodeId, SubscriptionId, SubscriptionList};

/// What a neighbor last told us about itself
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborInfo {
    pub node: NodeId,
    pub subscriptions: SubscriptionList,
    pub message_ids: Vec<MessageId>,
    /// Time the HELLO was processed
    pub last_seen: f64,
}

impl NeighborInfo {
    /// Whether the neighbor subscribes to `topic`
    pub fn is_interested_in(&self, topic: Option<SubscriptionId>) -> bool {
        self.subscriptions.contains_topic(topic)
    }

    /// Whether the neighbor advertised holding `id`
    pub fn has_message(&self, id: &MessageId) -> bool {
        self.message_ids.contains(id)
    }
}

/// Per-interface table of neighbor digests
#[derive(Debug, Clone, Default)]
pub struct KnowledgeOfSurroundings {
    entries: BTreeMap<InterfaceAddress, BTreeMap<NodeId, NeighborInfo>>,
}

impl KnowledgeOfSurroundings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a HELLO from `from` heard on `iface`, replacing any older entry
    pub fn process_hello(
        &mut self,
        iface: InterfaceAddress,
        from: NodeId,
        payload: &HelloPayload,
        now: f64,
    ) {
        let info = NeighborInfo {
            node: from,
            subscriptions: payload.subscriptions.iter().copied().collect(),
            message_ids: payload.message_ids.clone(),
            last_seen: now,
        };
        self.entries.entry(iface).or_default().insert(from, info);
    }

    pub fn neighbor(&self, iface: InterfaceAddress, node: NodeId) -> Option<&NeighborInfo> {
        self.entries.get(&iface)?.get(&node)
    }

    /// Known neighbors on `iface` that are currently linked
    pub fn active_neighbors(&self, iface: InterfaceAddress, connected: &[NodeId]) -> Vec<&NeighborInfo> {
        self.entries
            .get(&iface)
            .map(|table| {
                table
                    .values()
                    .filter(|info| connected.contains(&info.node))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop what we know about `node` on `iface`
    pub fn forget(&mut self, iface: InterfaceAddress, node: NodeId) -> Option<NeighborInfo> {
        let table = self.entries.get_mut(&iface)?;
        let removed = table.remove(&node);
        if table.is_empty() {
            self.entries.remove(&iface);
        }
        removed
    }

    /// Number of neighbor entries over all interfaces
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(ids: &[&str], subs: &[u32]) -> HelloPayload {
        HelloPayload {
            message_ids: ids.iter().map(|id| MessageId::from(*id)).collect(),
            subscriptions: subs.iter().map(|s| SubscriptionId(*s)).collect(),
        }
    }

    #[test]
    fn test_process_hello_records_digest() {
        let mut kos = KnowledgeOfSurroundings::new();
        kos.process_hello(InterfaceAddress(1), NodeId(4), &payload(&["M1", "M2"], &[3, 5]), 10.0);

        let info = kos.neighbor(InterfaceAddress(1), NodeId(4)).unwrap();
        assert_eq!(info.message_ids, vec![MessageId::from("M1"), MessageId::from("M2")]);
        assert!(info.is_interested_in(Some(SubscriptionId(5))));
        assert!(!info.is_interested_in(Some(SubscriptionId(4))));
        assert!(!info.is_interested_in(None));
        assert!(info.has_message(&MessageId::from("M2")));
        assert_eq!(info.last_seen, 10.0);
    }

    #[test]
    fn test_process_hello_replaces() {
        let mut kos = KnowledgeOfSurroundings::new();
        kos.process_hello(InterfaceAddress(1), NodeId(4), &payload(&["M1"], &[1, 2]), 1.0);
        kos.process_hello(InterfaceAddress(1), NodeId(4), &payload(&["M9"], &[7]), 2.0);

        let info = kos.neighbor(InterfaceAddress(1), NodeId(4)).unwrap();
        assert_eq!(info.message_ids, vec![MessageId::from("M9")]);
        assert_eq!(info.subscriptions.ids(), vec![SubscriptionId(7)]);
        assert_eq!(kos.len(), 1);
    }

    #[test]
    fn test_entries_are_per_interface() {
        let mut kos = KnowledgeOfSurroundings::new();
        kos.process_hello(InterfaceAddress(1), NodeId(4), &payload(&[], &[1]), 1.0);
        assert!(kos.neighbor(InterfaceAddress(2), NodeId(4)).is_none());
    }

    #[test]
    fn test_active_neighbors_filters_connected() {
        let mut kos = KnowledgeOfSurroundings::new();
        kos.process_hello(InterfaceAddress(1), NodeId(2), &payload(&[], &[1]), 1.0);
        kos.process_hello(InterfaceAddress(1), NodeId(3), &payload(&[], &[1]), 1.0);

        let active = kos.active_neighbors(InterfaceAddress(1), &[NodeId(3)]);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].node, NodeId(3));
        assert!(kos.active_neighbors(InterfaceAddress(9), &[NodeId(3)]).is_empty());
    }

    #[test]
    fn test_forget() {
        let mut kos = KnowledgeOfSurroundings::new();
        kos.process_hello(InterfaceAddress(1), NodeId(2), &payload(&[], &[1]), 1.0);
        assert!(kos.forget(InterfaceAddress(1), NodeId(2)).is_some());
        assert!(kos.forget(InterfaceAddress(1), NodeId(2)).is_none());
        assert!(kos.is_empty());
    }
}
