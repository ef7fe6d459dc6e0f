//! In-memory transport
//!
//! A connected pair of [`Transport`]s backed by crossbeam channels. Delivery
//! is lossless and FIFO; impairment is layered on top by the engine.

use crate::socket::{SocketError, Transport};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

/// One end of an in-memory datagram pipe
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Create two connected ends
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let (a_tx, b_rx) = channel::unbounded();
        let (b_tx, a_rx) = channel::unbounded();
        (
            MemoryTransport { tx: a_tx, rx: a_rx },
            MemoryTransport { tx: b_tx, rx: b_rx },
        )
    }

    /// Datagrams waiting to be received on this end
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, datagram: &[u8]) -> Result<(), SocketError> {
        // A vanished peer behaves like an unbound UDP port
        let _ = self.tx.send(datagram.to_vec());
        Ok(())
    }

    fn try_recv(&self, buf: &mut [u8]) -> Result<Option<usize>, SocketError> {
        match self.rx.try_recv() {
            Ok(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(Some(n))
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }
}
