//! Pending movement updates waiting for the next broadcast tick

use serde_json::Value;

/// One movement report that has not been broadcast yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub session_id: u64,
    /// Client-supplied batch timestamp in milliseconds
    pub timestamp: u64,
    /// The full move payload as sent by the client
    pub payload: Value,
}

/// Insertion-ordered queue holding at most one update per session
///
/// The newest timestamp wins. A move whose timestamp is equal to or newer
/// than the pending one replaces it and goes to the back of the queue; an
/// older move is discarded. The queue is drained wholesale on every tick.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    pending: Vec<PendingUpdate>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Queues an update, returning false if it was superseded already
    pub fn push(&mut self, update: PendingUpdate) -> bool {
        if let Some(index) = self
            .pending
            .iter()
            .position(|queued| queued.session_id == update.session_id)
        {
            if self.pending[index].timestamp > update.timestamp {
                return false;
            }
            self.pending.remove(index);
        }

        self.pending.push(update);
        true
    }

    /// Removes and returns every pending update in queue order
    pub fn drain(&mut self) -> Vec<PendingUpdate> {
        std::mem::take(&mut self.pending)
    }

    #[cfg(test)]
    pub fn get(&self, session_id: u64) -> Option<&PendingUpdate> {
        self.pending
            .iter()
            .find(|queued| queued.session_id == session_id)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &PendingUpdate> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
