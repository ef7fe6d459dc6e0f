//! GBN Frame Structures and Serialization
//!
//! Every frame on the wire has the same layout; Data and Ack frames differ
//! only in their flag byte and in whether a payload follows the sequence field.
//!
//! ```text
//! +------+----------+----------+-----------------+-------------------+---------+
//! | flag | src (6)  | dst (6)  | seq/ack (N)     | payload (0..MAX)  | CRC (2) |
//! +------+----------+----------+-----------------+-------------------+---------+
//! ```
//!
//! `N` is [`SeqSpace::seq_bytes`] for the configured window. All multi-byte
//! integers are big-endian. The CRC is CRC-16/CCITT-FALSE over every byte that
//! precedes it, flag included.
//!
//! A third datagram kind, the sync control datagram, is `flag | src | dst`
//! with no sequence field and no CRC.

use crate::config::ProtocolConfig;
use crate::peer::{PeerId, PEER_ID_LEN};
use crate::sequence::{SeqNo, SeqSpace};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_IBM_3740};
use std::fmt;
use thiserror::Error;

/// Flag byte values
pub mod flags {
    /// Data frame
    pub const DATA: u8 = 0xAB;
    /// Cumulative acknowledgement frame
    pub const ACK: u8 = 0xD4;
    /// Sync control datagram (resets the receiver's expected sequence)
    pub const SYNC: u8 = 0x96;
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, unreflected)
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Size of the trailing checksum
pub const CRC_LEN: usize = 2;

/// Size of a sync datagram
pub const SYNC_LEN: usize = 1 + 2 * PEER_ID_LEN;

const OFF_SRC: usize = 1;
const OFF_DST: usize = OFF_SRC + PEER_ID_LEN;
const OFF_SEQ: usize = OFF_DST + PEER_ID_LEN;

/// Compute the frame checksum over `data`
#[inline]
pub fn checksum(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Caller guarantees `bytes` holds at least `offset + PEER_ID_LEN` bytes
fn read_peer(bytes: &[u8], offset: usize) -> PeerId {
    let mut raw = [0u8; PEER_ID_LEN];
    raw.copy_from_slice(&bytes[offset..offset + PEER_ID_LEN]);
    PeerId::new(raw)
}

/// Frame construction and parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unrecognized frame flag: {0:#04x}")]
    Format(u8),

    #[error("CRC mismatch: computed {computed:#06x}, embedded {embedded:#06x}")]
    Integrity { computed: u16, embedded: u16 },

    #[error("Source and destination peer are both {0}")]
    PeerIdentityCollision(PeerId),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Sequence number {seq} outside [0, {window}]")]
    SequenceOutOfRange { seq: SeqNo, window: u32 },

    #[error("Ack frame carries {0} payload bytes")]
    AckWithPayload(usize),
}

/// Addressing shared by every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    pub src: PeerId,
    pub dst: PeerId,
}

impl FrameHeader {
    /// Create a header, rejecting identical endpoints
    pub fn new(src: PeerId, dst: PeerId) -> Result<Self, FrameError> {
        if src == dst {
            return Err(FrameError::PeerIdentityCollision(src));
        }
        Ok(FrameHeader { src, dst })
    }
}

/// Frame-specific content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// Sequenced payload chunk
    Data { seq: SeqNo, payload: Bytes },
    /// Cumulative ack: everything up to and including `ack` was accepted
    Ack { ack: SeqNo },
}

/// A decoded Data or Ack frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: FrameBody,
}

impl Frame {
    /// Create a data frame
    pub fn data(src: PeerId, dst: PeerId, seq: SeqNo, payload: Bytes) -> Result<Self, FrameError> {
        Ok(Frame {
            header: FrameHeader::new(src, dst)?,
            body: FrameBody::Data { seq, payload },
        })
    }

    /// Create an ack frame
    pub fn ack(src: PeerId, dst: PeerId, ack: SeqNo) -> Result<Self, FrameError> {
        Ok(Frame {
            header: FrameHeader::new(src, dst)?,
            body: FrameBody::Ack { ack },
        })
    }

    pub fn src(&self) -> PeerId {
        self.header.src
    }

    pub fn dst(&self) -> PeerId {
        self.header.dst
    }

    /// Check if this is a data frame
    pub fn is_data(&self) -> bool {
        matches!(self.body, FrameBody::Data { .. })
    }

    /// Flag byte written on the wire
    pub fn flag(&self) -> u8 {
        match self.body {
            FrameBody::Data { .. } => flags::DATA,
            FrameBody::Ack { .. } => flags::ACK,
        }
    }

    /// Value carried in the sequence field
    pub fn seq_or_ack(&self) -> SeqNo {
        match self.body {
            FrameBody::Data { seq, .. } => seq,
            FrameBody::Ack { ack } => ack,
        }
    }

    /// Payload bytes (empty for acks)
    pub fn payload(&self) -> &[u8] {
        match &self.body {
            FrameBody::Data { payload, .. } => payload,
            FrameBody::Ack { .. } => &[],
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            FrameBody::Data { seq, payload } => write!(
                f,
                "Data({} -> {}, seq={}, {} bytes)",
                self.header.src,
                self.header.dst,
                seq,
                payload.len()
            ),
            FrameBody::Ack { ack } => {
                write!(f, "Ack({} -> {}, ack={})", self.header.src, self.header.dst, ack)
            }
        }
    }
}

/// Anything that can arrive on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    Frame(Frame),
    Sync { src: PeerId, dst: PeerId },
}

/// Encoder/decoder bound to one sequence-field width
///
/// The width is derived from the window size, so both ends must run with the
/// same window.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    space: SeqSpace,
    seq_bytes: usize,
    max_payload: usize,
}

impl FrameCodec {
    /// Create a codec for the given configuration
    pub fn new(config: &ProtocolConfig) -> Self {
        FrameCodec {
            space: config.space(),
            seq_bytes: config.seq_bytes(),
            max_payload: config.max_payload(),
        }
    }

    /// Width of the sequence field
    pub fn seq_bytes(&self) -> usize {
        self.seq_bytes
    }

    /// Size of a frame with an empty payload
    pub fn min_frame_len(&self) -> usize {
        OFF_SEQ + self.seq_bytes + CRC_LEN
    }

    /// Size of a frame with a full payload
    pub fn max_frame_len(&self) -> usize {
        self.min_frame_len() + self.max_payload
    }

    /// Serialize a frame to bytes
    pub fn encode(&self, frame: &Frame) -> Result<BytesMut, FrameError> {
        let seq = frame.seq_or_ack();
        if !self.space.contains(seq) {
            return Err(FrameError::SequenceOutOfRange {
                seq,
                window: self.space.window(),
            });
        }
        let payload = frame.payload();
        if payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        let mut buf = BytesMut::with_capacity(self.min_frame_len() + payload.len());
        buf.put_u8(frame.flag());
        buf.put_slice(frame.header.src.as_bytes());
        buf.put_slice(frame.header.dst.as_bytes());
        buf.put_uint(u64::from(seq.as_raw()), self.seq_bytes);
        buf.put_slice(payload);

        let crc = checksum(&buf);
        buf.put_u16(crc);
        Ok(buf)
    }

    /// Parse a data or ack frame from bytes
    pub fn decode(&self, bytes: &[u8]) -> Result<Frame, FrameError> {
        let flag = *bytes.first().ok_or(FrameError::Truncated {
            expected: self.min_frame_len(),
            actual: 0,
        })?;
        if flag != flags::DATA && flag != flags::ACK {
            return Err(FrameError::Format(flag));
        }
        if bytes.len() < self.min_frame_len() {
            return Err(FrameError::Truncated {
                expected: self.min_frame_len(),
                actual: bytes.len(),
            });
        }

        let (body, mut crc_bytes) = bytes.split_at(bytes.len() - CRC_LEN);
        let embedded = crc_bytes.get_u16();
        let computed = checksum(body);
        if computed != embedded {
            return Err(FrameError::Integrity { computed, embedded });
        }

        let src = read_peer(body, OFF_SRC);
        let dst = read_peer(body, OFF_DST);
        let mut seq_field = &body[OFF_SEQ..OFF_SEQ + self.seq_bytes];
        let seq = SeqNo::new(seq_field.get_uint(self.seq_bytes) as u32);
        if !self.space.contains(seq) {
            return Err(FrameError::SequenceOutOfRange {
                seq,
                window: self.space.window(),
            });
        }

        let payload = &body[OFF_SEQ + self.seq_bytes..];
        if flag == flags::DATA {
            if payload.len() > self.max_payload {
                return Err(FrameError::PayloadTooLarge {
                    size: payload.len(),
                    max: self.max_payload,
                });
            }
            Frame::data(src, dst, seq, Bytes::copy_from_slice(payload))
        } else {
            if !payload.is_empty() {
                return Err(FrameError::AckWithPayload(payload.len()));
            }
            Frame::ack(src, dst, seq)
        }
    }

    /// Serialize a sync control datagram
    pub fn encode_sync(src: PeerId, dst: PeerId) -> BytesMut {
        let mut buf = BytesMut::with_capacity(SYNC_LEN);
        buf.put_u8(flags::SYNC);
        buf.put_slice(src.as_bytes());
        buf.put_slice(dst.as_bytes());
        buf
    }

    /// Parse any datagram (sync, data or ack)
    pub fn decode_datagram(&self, bytes: &[u8]) -> Result<Datagram, FrameError> {
        if bytes.first() == Some(&flags::SYNC) {
            if bytes.len() < SYNC_LEN {
                return Err(FrameError::Truncated {
                    expected: SYNC_LEN,
                    actual: bytes.len(),
                });
            }
            let src = read_peer(bytes, OFF_SRC);
            let dst = read_peer(bytes, OFF_DST);
            return Ok(Datagram::Sync { src, dst });
        }
        self.decode(bytes).map(Datagram::Frame)
    }
}
