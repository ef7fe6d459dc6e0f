//! Transport plus channel impairment
//!
//! Data and ack frames go through [`Link::send_impaired`]; the sync datagram
//! goes through [`Link::send_clean`] and is never corrupted or dropped.

use bytes::BytesMut;
use gbn_io::{SocketError, Transport};
use gbn_protocol::channel::{Fate, Impairment};
use parking_lot::Mutex;
use std::fmt;

/// Shared datagram path used by both endpoint roles
pub struct Link {
    transport: Box<dyn Transport>,
    impairment: Mutex<Box<dyn Impairment>>,
}

impl Link {
    pub fn new<T, I>(transport: T, impairment: I) -> Self
    where
        T: Transport + 'static,
        I: Impairment + 'static,
    {
        Link {
            transport: Box::new(transport),
            impairment: Mutex::new(Box::new(impairment)),
        }
    }

    /// Run `frame` through the impairment and send whatever survives
    pub fn send_impaired(&self, frame: &[u8]) -> Result<Fate, SocketError> {
        let mut wire = BytesMut::from(frame);
        let fate = self.impairment.lock().apply(&mut wire);
        if fate == Fate::Deliver {
            self.transport.send(&wire)?;
        }
        Ok(fate)
    }

    /// Send bytes exactly as given
    pub fn send_clean(&self, datagram: &[u8]) -> Result<(), SocketError> {
        self.transport.send(datagram)
    }

    pub fn try_recv(&self, buf: &mut [u8]) -> Result<Option<usize>, SocketError> {
        self.transport.try_recv(buf)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}
