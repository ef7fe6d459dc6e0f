//! Ack hand-off between the receive role and the send role
//!
//! The receive role posts the latest cumulative ack per peer; the send role
//! takes it once per poll. A one-slot channel wakes an idle sender as soon as
//! something is posted.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use gbn_protocol::{PeerId, SeqNo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Last observed cumulative ack per peer
#[derive(Debug)]
pub struct AckTable {
    acks: Mutex<HashMap<PeerId, SeqNo>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl AckTable {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = channel::bounded(1);
        AckTable {
            acks: Mutex::new(HashMap::new()),
            wake_tx,
            wake_rx,
        }
    }

    /// Record `ack` from `peer`, replacing any ack not yet taken
    pub fn post(&self, peer: PeerId, ack: SeqNo) {
        self.acks.lock().insert(peer, ack);
        // Full means a wakeup is already pending
        let _ = self.wake_tx.try_send(());
    }

    /// Remove and return the pending ack from `peer`
    pub fn take(&self, peer: &PeerId) -> Option<SeqNo> {
        self.acks.lock().remove(peer)
    }

    /// Forget all pending acks and wakeups
    pub fn clear(&self) {
        self.acks.lock().clear();
        while self.wake_rx.try_recv().is_ok() {}
    }

    /// Block until something is posted or `timeout` elapses
    ///
    /// Returns whether a post woke the caller.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.wake_rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

impl Default for AckTable {
    fn default() -> Self {
        Self::new()
    }
}
