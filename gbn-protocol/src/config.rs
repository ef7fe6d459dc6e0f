//! Protocol configuration
//!
//! A single validated [`ProtocolConfig`] is built once at startup and passed by
//! value into every component that needs it.

use crate::sequence::{SeqNo, SeqSpace};
use std::time::Duration;
use thiserror::Error;

/// Largest payload a frame may carry
pub const MAX_PAYLOAD_LIMIT: usize = 4096;

/// Largest initial sequence number
pub const MAX_INIT_SEQ: u32 = 254;

/// Largest window; the sender allocates one slot per sequence number up front
pub const MAX_WINDOW_SIZE: u32 = 65_535;

/// Configuration errors (fatal at startup)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Max payload size must be in [1, 4096], got {0}")]
    InvalidPayloadSize(usize),

    #[error("Window size must be in [1, 65535], got {0}")]
    InvalidWindowSize(u32),

    #[error("Initial sequence number must be in [0, 254] and not exceed the window size {window}, got {init_seq}")]
    InvalidInitSeq { init_seq: u32, window: u32 },

    #[error("Timeout must be positive")]
    InvalidTimeout,
}

/// Validated GBN protocol parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    max_payload: usize,
    space: SeqSpace,
    init_seq: SeqNo,
    timeout: Duration,
}

impl ProtocolConfig {
    /// Validate and build a protocol configuration
    pub fn new(
        max_payload: usize,
        window_size: u32,
        init_seq: u32,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if !(1..=MAX_PAYLOAD_LIMIT).contains(&max_payload) {
            return Err(ConfigError::InvalidPayloadSize(max_payload));
        }
        if !(1..=MAX_WINDOW_SIZE).contains(&window_size) {
            return Err(ConfigError::InvalidWindowSize(window_size));
        }
        if init_seq > MAX_INIT_SEQ || init_seq > window_size {
            return Err(ConfigError::InvalidInitSeq {
                init_seq,
                window: window_size,
            });
        }
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(ProtocolConfig {
            max_payload,
            space: SeqSpace::new(window_size),
            init_seq: SeqNo::new(init_seq),
            timeout,
        })
    }

    /// Maximum payload bytes per data frame
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Window size `W`
    pub fn window_size(&self) -> u32 {
        self.space.window()
    }

    /// Sequence space of size `W + 1`
    pub fn space(&self) -> SeqSpace {
        self.space
    }

    /// First sequence number of every transfer
    pub fn init_seq(&self) -> SeqNo {
        self.init_seq
    }

    /// Retransmission timeout for the oldest unacknowledged frame
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Width of the sequence field on the wire
    pub fn seq_bytes(&self) -> usize {
        self.space.seq_bytes()
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            max_payload: 1024,
            space: SeqSpace::new(4),
            init_seq: SeqNo::new(0),
            timeout: Duration::from_millis(200),
        }
    }
}
