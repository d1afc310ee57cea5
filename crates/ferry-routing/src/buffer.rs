//! Message buffer
//!
//! Byte-bounded storage for the messages a router carries. When a new
//! message does not fit, the buffer plans evictions worst-first using the
//! reverse forwarding order.

use ferry_core::{Message, MessageId};

use crate::order::ForwardingOrder;

/// Messages held by one router
#[derive(Debug, Clone, Default)]
pub struct MessageBuffer {
    messages: Vec<Message>,
    capacity: Option<u64>,
    used: u64,
}

impl MessageBuffer {
    /// Create a buffer holding at most `capacity` bytes, `None` for unbounded
    pub fn new(capacity: Option<u64>) -> Self {
        Self {
            messages: Vec::new(),
            capacity,
            used: 0,
        }
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    /// Bytes currently occupied
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Bytes still free, `None` for an unbounded buffer
    pub fn free_space(&self) -> Option<u64> {
        self.capacity.map(|c| c.saturating_sub(self.used))
    }

    /// Whether a message of `size` bytes could ever fit
    pub fn fits(&self, size: u64) -> bool {
        self.capacity.is_none_or(|c| size <= c)
    }

    /// Add a message. Returns `false` if one with the same id is already held.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.used += message.size;
        self.messages.push(message);
        true
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let pos = self.messages.iter().position(|m| &m.id == id)?;
        let message = self.messages.remove(pos);
        self.used -= message.size;
        Some(message)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| &m.id == id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    /// Messages in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|m| m.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Evict until `needed` bytes are free
    ///
    /// Candidates are taken worst-first; those for which `protected`
    /// returns true are skipped. If the space cannot be freed nothing is
    /// evicted and `None` is returned.
    pub fn make_room(
        &mut self,
        needed: u64,
        order: ForwardingOrder,
        protected: impl Fn(&MessageId) -> bool,
    ) -> Option<Vec<Message>> {
        let Some(capacity) = self.capacity else {
            return Some(Vec::new());
        };
        if needed > capacity {
            return None;
        }

        let mut candidates: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| !protected(&m.id))
            .collect();
        order.sort_reverse(&mut candidates);

        let mut free = capacity.saturating_sub(self.used);
        let mut victims = Vec::new();
        for m in candidates {
            if free >= needed {
                break;
            }
            free += m.size;
            victims.push(m.id.clone());
        }
        if free < needed {
            return None;
        }

        Some(victims.iter().filter_map(|id| self.remove(id)).collect())
    }
}
