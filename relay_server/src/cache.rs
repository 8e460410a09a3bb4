//! Latest message received on the subscribed topic.
//!
use std::sync::Arc;

use tokio::sync::watch;

/// Single-slot, last-write-wins cache of the most recent inbound payload.
///
/// The broker event loop is the only writer. Readers clone the current value
/// out of the slot, so a read always sees one complete payload.
pub struct InboundCache {
    slot: watch::Sender<Option<Arc<str>>>,
}

impl InboundCache {
    pub fn new() -> Self {
        let (slot, _rx) = watch::channel(None);
        Self { slot }
    }

    /// Replace the cached payload.
    pub fn store(&self, payload: impl Into<Arc<str>>) {
        // `send_replace` also succeeds while no receiver is alive.
        self.slot.send_replace(Some(payload.into()));
    }

    /// Latest payload, `None` before the first message.
    pub fn latest(&self) -> Option<Arc<str>> {
        self.slot.borrow().clone()
    }

    /// Receiver notified on every store.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<str>>> {
        self.slot.subscribe()
    }
}

impl Default for InboundCache {
    fn default() -> Self {
        Self::new()
    }
}
