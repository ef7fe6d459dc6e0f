//! Logical peer identifiers
//!
//! Peers are addressed by a 6-byte identifier rendered like a MAC address
//! (`00:16:3e:2a:01:ff`). The identifiers are purely logical: frames are routed
//! over UDP and never touch a real link layer.

use rand::Rng;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a peer identifier in bytes
pub const PEER_ID_LEN: usize = 6;

/// Prefix used for generated identifiers
const GENERATED_PREFIX: [u8; 3] = [0x00, 0x16, 0x3e];

/// Errors parsing a peer identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerIdError {
    #[error("Invalid peer id '{0}': expected six colon-separated hex octets")]
    InvalidFormat(String),

    #[error("Invalid peer id length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// 6-byte logical peer identifier
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PeerId([u8; PEER_ID_LEN]);

impl PeerId {
    /// Create a peer id from raw bytes
    pub const fn new(bytes: [u8; PEER_ID_LEN]) -> Self {
        PeerId(bytes)
    }

    /// Create a peer id from a slice, which must be exactly 6 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PeerIdError> {
        let raw: [u8; PEER_ID_LEN] = bytes.try_into().map_err(|_| PeerIdError::InvalidLength {
            expected: PEER_ID_LEN,
            actual: bytes.len(),
        })?;
        Ok(PeerId(raw))
    }

    /// Generate a random identifier in the `00:16:3e` block
    ///
    /// The fourth octet is kept below `0x80`.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        PeerId([
            GENERATED_PREFIX[0],
            GENERATED_PREFIX[1],
            GENERATED_PREFIX[2],
            rng.random_range(0x00..=0x7f),
            rng.random(),
            rng.random(),
        ])
    }

    /// Raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; PEER_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PeerIdError::InvalidFormat(s.to_string());

        let mut bytes = [0u8; PEER_ID_LEN];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(PeerId(bytes))
    }
}

impl From<[u8; PEER_ID_LEN]> for PeerId {
    fn from(bytes: [u8; PEER_ID_LEN]) -> Self {
        PeerId(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id: PeerId = "00:16:3E:2a:01:ff".parse().unwrap();
        assert_eq!(id.as_bytes(), &[0x00, 0x16, 0x3e, 0x2a, 0x01, 0xff]);
        assert_eq!(id.to_string(), "00:16:3e:2a:01:ff");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "",
            "00:16:3e:2a:01",
            "00:16:3e:2a:01:ff:00",
            "00-16-3e-2a-01-ff",
            "0:16:3e:2a:01:ff",
            "00:16:3e:2a:01:fg",
            "+0:16:3e:2a:01:ff",
        ] {
            assert!(bad.parse::<PeerId>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_from_slice_length() {
        assert!(PeerId::from_slice(&[1, 2, 3, 4, 5, 6]).is_ok());
        assert_eq!(
            PeerId::from_slice(&[1, 2, 3]),
            Err(PeerIdError::InvalidLength {
                expected: 6,
                actual: 3
            })
        );
    }

    #[test]
    fn test_random_prefix() {
        let id = PeerId::random();
        assert_eq!(&id.as_bytes()[..3], &GENERATED_PREFIX);
        assert!(id.as_bytes()[3] <= 0x7f);
    }

    #[test]
    fn test_equality_by_bytes() {
        let a = PeerId::new([1, 2, 3, 4, 5, 6]);
        let b: PeerId = "01:02:03:04:05:06".parse().unwrap();
        assert_eq!(a, b);
    }
}
