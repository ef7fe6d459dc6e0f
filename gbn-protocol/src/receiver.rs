//! Receiver ordering state
//!
//! A GBN receiver buffers nothing: it accepts exactly the next expected
//! sequence number from each source and answers everything else with the
//! cumulative ack for what it already has.

use crate::config::ProtocolConfig;
use crate::peer::PeerId;
use crate::sequence::{SeqNo, SeqSpace};
use std::collections::HashMap;

/// Outcome of a data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// In order: deliver the payload and ack `ack` (the frame's own sequence number)
    Accept { ack: SeqNo },
    /// Out of order: discard the payload and repeat the cumulative ack
    Reject { expected: SeqNo, ack: SeqNo },
}

impl Decision {
    /// Ack to send back either way
    pub fn ack(&self) -> SeqNo {
        match *self {
            Decision::Accept { ack } | Decision::Reject { ack, .. } => ack,
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept { .. })
    }
}

/// Per-source expected sequence numbers
#[derive(Debug, Clone)]
pub struct ReceiverState {
    space: SeqSpace,
    init_seq: SeqNo,
    expected: HashMap<PeerId, SeqNo>,
}

impl ReceiverState {
    pub fn new(config: &ProtocolConfig) -> Self {
        ReceiverState {
            space: config.space(),
            init_seq: config.init_seq(),
            expected: HashMap::new(),
        }
    }

    /// Sequence number the next in-order frame from `src` must carry
    pub fn expected(&self, src: &PeerId) -> SeqNo {
        self.expected.get(src).copied().unwrap_or(self.init_seq)
    }

    /// Classify a data frame from `src` and update state
    pub fn on_data(&mut self, src: PeerId, seq: SeqNo) -> Decision {
        let expected = self.expected.entry(src).or_insert(self.init_seq);
        if seq == *expected {
            *expected = self.space.next(seq);
            Decision::Accept { ack: seq }
        } else {
            Decision::Reject {
                expected: *expected,
                ack: self.space.prev(*expected),
            }
        }
    }

    /// Forget `src`, so its next transfer starts from the initial sequence number
    ///
    /// Returns whether the source was known.
    pub fn reset(&mut self, src: &PeerId) -> bool {
        self.expected.remove(src).is_some()
    }

    /// Number of sources seen since their last reset
    pub fn peer_count(&self) -> usize {
        self.expected.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const A: PeerId = PeerId::new([0, 0x16, 0x3e, 0, 0, 1]);
    const B: PeerId = PeerId::new([0, 0x16, 0x3e, 0, 0, 2]);

    fn state(window: u32, init: u32) -> ReceiverState {
        ReceiverState::new(&ProtocolConfig::new(16, window, init, Duration::from_millis(100)).unwrap())
    }

    #[test]
    fn test_in_order_accepts_and_wraps() {
        let mut rx = state(4, 3);
        assert_eq!(rx.on_data(A, SeqNo::new(3)), Decision::Accept { ack: SeqNo::new(3) });
        assert_eq!(rx.on_data(A, SeqNo::new(4)), Decision::Accept { ack: SeqNo::new(4) });
        assert_eq!(rx.on_data(A, SeqNo::new(0)), Decision::Accept { ack: SeqNo::new(0) });
        assert_eq!(rx.expected(&A), SeqNo::new(1));
    }

    #[test]
    fn test_out_of_order_repeats_cumulative_ack() {
        let mut rx = state(4, 0);
        rx.on_data(A, SeqNo::new(0));
        let decision = rx.on_data(A, SeqNo::new(2));
        assert_eq!(
            decision,
            Decision::Reject {
                expected: SeqNo::new(1),
                ack: SeqNo::new(0)
            }
        );
        assert_eq!(rx.expected(&A), SeqNo::new(1));
    }

    #[test]
    fn test_first_frame_out_of_order_acks_before_init() {
        let mut rx = state(4, 0);
        assert_eq!(rx.on_data(A, SeqNo::new(1)).ack(), SeqNo::new(4));
    }

    #[test]
    fn test_sources_are_independent() {
        let mut rx = state(4, 0);
        rx.on_data(A, SeqNo::new(0));
        rx.on_data(A, SeqNo::new(1));
        assert!(rx.on_data(B, SeqNo::new(0)).is_accept());
        assert_eq!(rx.expected(&A), SeqNo::new(2));
        assert_eq!(rx.expected(&B), SeqNo::new(1));
        assert_eq!(rx.peer_count(), 2);
    }

    #[test]
    fn test_reset_restarts_at_init() {
        let mut rx = state(4, 2);
        rx.on_data(A, SeqNo::new(2));
        assert!(rx.reset(&A));
        assert!(!rx.reset(&A));
        assert_eq!(rx.expected(&A), SeqNo::new(2));
        assert!(rx.on_data(A, SeqNo::new(2)).is_accept());
    }
}
