//! UDP transport for GBN
//!
//! Each endpoint exchanges datagrams with exactly one remote UDP address.
//! Receives never block; "nothing pending" is reported as `Ok(None)`.

use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use thiserror::Error;
use tracing::{debug, trace};

/// Socket configuration and I/O errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A datagram pipe to one fixed peer
///
/// Both engine roles hold the same transport, so all methods take `&self`.
pub trait Transport: Send + Sync {
    /// Send one datagram to the peer
    fn send(&self, datagram: &[u8]) -> Result<(), SocketError>;

    /// Receive one datagram into `buf` without blocking
    ///
    /// Returns `Ok(None)` when nothing is pending. Datagrams longer than `buf`
    /// are truncated.
    fn try_recv(&self, buf: &mut [u8]) -> Result<Option<usize>, SocketError>;
}

/// Non-blocking UDP socket with a fixed destination
#[derive(Debug)]
pub struct GbnSocket {
    inner: UdpSocket,
    peer: SocketAddr,
}

impl GbnSocket {
    /// Bind to `local` and address every send to `peer`
    pub fn bind(local: SocketAddr, peer: SocketAddr) -> Result<Self, SocketError> {
        let domain = if local.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&local.into())?;
        socket.set_nonblocking(true)?;

        let inner: UdpSocket = socket.into();
        debug!(local = %inner.local_addr()?, peer = %peer, "UDP socket bound");
        Ok(GbnSocket { inner, peer })
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.inner.local_addr()?)
    }

    /// Remote address every datagram is sent to
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Set the send and receive buffer sizes
    pub fn set_buffer_sizes(&self, size: usize) -> Result<(), SocketError> {
        let socket = socket2::SockRef::from(&self.inner);
        socket.set_send_buffer_size(size)?;
        socket.set_recv_buffer_size(size)?;
        Ok(())
    }
}

impl Transport for GbnSocket {
    fn send(&self, datagram: &[u8]) -> Result<(), SocketError> {
        match self.inner.send_to(datagram, self.peer) {
            Ok(_) => Ok(()),
            // A full send buffer is indistinguishable from loss on the wire
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                trace!("send buffer full, datagram dropped");
                Ok(())
            }
            Err(e) => Err(SocketError::Io(e)),
        }
    }

    fn try_recv(&self, buf: &mut [u8]) -> Result<Option<usize>, SocketError> {
        match self.inner.recv_from(buf) {
            Ok((n, _from)) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            // ICMP port unreachable from an earlier send, reported on some platforms
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
                ) =>
            {
                trace!(error = %e, "peer not listening");
                Ok(None)
            }
            Err(e) => Err(SocketError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn any_local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn pair() -> (GbnSocket, GbnSocket) {
        let a = GbnSocket::bind(any_local(), any_local()).unwrap();
        let b = GbnSocket::bind(any_local(), a.local_addr().unwrap()).unwrap();
        let a = GbnSocket {
            peer: b.local_addr().unwrap(),
            ..a
        };
        (a, b)
    }

    #[test]
    fn test_socket_creation() {
        let socket = GbnSocket::bind(any_local(), any_local()).unwrap();
        let addr = socket.local_addr().unwrap();
        assert!(addr.port() > 0);
    }

    #[test]
    fn test_empty_receive_does_not_block() {
        let socket = GbnSocket::bind(any_local(), any_local()).unwrap();
        let mut buf = [0u8; 64];
        assert!(socket.try_recv(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_socket_send_recv() {
        let (a, b) = pair();

        a.send(b"Hello, GBN!").unwrap();

        // Receive data (may need to retry due to non-blocking)
        let mut buf = [0u8; 1024];
        for _ in 0..50 {
            if let Some(n) = b.try_recv(&mut buf).unwrap() {
                assert_eq!(&buf[..n], b"Hello, GBN!");
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("Failed to receive data");
    }

    #[test]
    fn test_socket_buffer_sizes() {
        let socket = GbnSocket::bind(any_local(), any_local()).unwrap();
        socket.set_buffer_sizes(262144).unwrap();
    }

    #[test]
    fn test_socket_ipv6() {
        // May fail on systems without IPv6
        if let Ok(socket) = GbnSocket::bind("[::1]:0".parse().unwrap(), "[::1]:9".parse().unwrap()) {
            let addr = socket.local_addr().unwrap();
            assert!(addr.is_ipv6());
        }
    }
}
