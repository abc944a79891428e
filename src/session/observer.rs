//! Ordered message subscribers.

use std::fmt;

/// Callback invoked with each completed message.
pub type MessageCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Get the raw handle value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber:{}", self.0)
    }
}

/// Subscribers in registration order.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<(SubscriberId, MessageCallback)>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self, callback: MessageCallback) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(sid, _)| *sid != id);
        self.entries.len() != before
    }

    pub(crate) fn deliver(&mut self, message: &[u8]) {
        for (_, callback) in self.entries.iter_mut() {
            callback(message);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.entries.len())
            .finish()
    }
}
