//! Slot table: the server's only shared state.
//!
//! A slot names a two-party rendezvous. The table holds slots that are
//! waiting for their second peer; a successful join removes the entry, so
//! a slot can never hold more than one pair and a third connection
//! observes "no such slot". All state is in memory and evaporates with
//! the sockets.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

/// What one rendezvous socket forwards to its counterpart.
#[derive(Debug)]
pub enum PeerEvent {
    /// An opaque text frame, relayed without parsing or modification.
    Frame(String),
    /// The counterpart's socket closed with the given code.
    Close(Option<u16>),
}

/// A first peer parked on a slot, waiting to be joined.
pub struct Waiting {
    /// Delivers frames to the waiting peer.
    pub to_first: mpsc::UnboundedSender<PeerEvent>,
    /// Completed by the joiner to hand over its own inbox sender.
    pub join: oneshot::Sender<Joined>,
}

/// The joiner's half of a fresh pairing.
pub struct Joined {
    /// Delivers frames to the second peer.
    pub to_second: mpsc::UnboundedSender<PeerEvent>,
}

struct Inner {
    entries: HashMap<u64, Waiting>,
    cursor: u64,
}

/// Mapping from slot id to pairing state. Operations are point-wise and
/// take the lock briefly.
pub struct SlotTable {
    inner: Mutex<Inner>,
    capacity: u64,
}

impl SlotTable {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                cursor: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Allocate a free slot for a waiting peer.
    ///
    /// Ids are small integers starting at 1, assigned by a rolling cursor
    /// so released ids are not handed out again until the cursor wraps.
    /// Returns `None` when every slot is taken.
    pub fn allocate(&self, waiting: Waiting) -> Option<u64> {
        let mut inner = self.inner.lock().expect("slot table lock");
        let free = (0..self.capacity)
            .map(|off| {
                let step = (inner.cursor + off) % self.capacity;
                (step, 1 + step)
            })
            .find(|(_, id)| !inner.entries.contains_key(id));
        let (step, id) = free?;
        inner.cursor = (step + 1) % self.capacity;
        inner.entries.insert(id, waiting);
        Some(id)
    }

    /// Take the waiting peer off a slot, pairing it. The entry is removed,
    /// so subsequent joins on the same slot fail.
    pub fn claim(&self, slot: u64) -> Option<Waiting> {
        self.inner.lock().expect("slot table lock").entries.remove(&slot)
    }

    /// Drop a slot that never got its second peer.
    pub fn release(&self, slot: u64) {
        self.inner.lock().expect("slot table lock").entries.remove(&slot);
    }

    /// Number of slots currently awaiting a peer.
    pub fn waiting(&self) -> usize {
        self.inner.lock().expect("slot table lock").entries.len()
    }
}
