//! Channel impairment
//!
//! Frames leaving an endpoint pass through an [`Impairment`] that may corrupt
//! them in place and may decide they never reach the wire. The production
//! simulator runs two independent Bernoulli trials per frame.

use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// What happens to a frame after impairment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Deliver,
    Drop,
}

/// Per-frame channel behavior
pub trait Impairment: Send {
    /// Possibly mutate `frame`, then decide whether it is sent
    fn apply(&mut self, frame: &mut BytesMut) -> Fate;
}

/// Perfect channel
#[derive(Debug, Clone, Copy, Default)]
pub struct Lossless;

impl Impairment for Lossless {
    fn apply(&mut self, _frame: &mut BytesMut) -> Fate {
        Fate::Deliver
    }
}

/// Impairment counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub frames: u64,
    pub corrupted: u64,
    pub dropped: u64,
}

/// Random bit-corruption and loss
///
/// Rates are "one in N": a rate of 10 hits on average one frame in ten, and a
/// rate of 0 disables that trial.
#[derive(Debug)]
pub struct ChannelSimulator {
    error_rate: u32,
    loss_rate: u32,
    rng: StdRng,
    stats: ChannelStats,
}

impl ChannelSimulator {
    /// Create a simulator seeded from the operating system
    pub fn new(error_rate: u32, loss_rate: u32) -> Self {
        Self::with_rng(error_rate, loss_rate, StdRng::from_os_rng())
    }

    /// Create a reproducible simulator
    pub fn seeded(error_rate: u32, loss_rate: u32, seed: u64) -> Self {
        Self::with_rng(error_rate, loss_rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(error_rate: u32, loss_rate: u32, rng: StdRng) -> Self {
        ChannelSimulator {
            error_rate,
            loss_rate,
            rng,
            stats: ChannelStats::default(),
        }
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    fn trial(&mut self, one_in: u32) -> bool {
        one_in != 0 && self.rng.random_ratio(1, one_in)
    }

    /// Flip one random bit of one random byte
    fn corrupt(&mut self, frame: &mut BytesMut) {
        if frame.is_empty() {
            return;
        }
        let index = self.rng.random_range(0..frame.len());
        let bit = self.rng.random_range(0..8u32);
        frame[index] ^= 1 << bit;
        trace!(index, bit, "corrupted frame");
    }
}

impl Impairment for ChannelSimulator {
    fn apply(&mut self, frame: &mut BytesMut) -> Fate {
        self.stats.frames += 1;

        if self.trial(self.error_rate) {
            self.corrupt(frame);
            self.stats.corrupted += 1;
        }
        if self.trial(self.loss_rate) {
            self.stats.dropped += 1;
            return Fate::Drop;
        }
        Fate::Deliver
    }
}
