//! Sequence Number Handling
//!
//! GBN numbers frames modulo `W + 1`, where `W` is the configured window size.
//! The sequence space is one larger than the window so that a cumulative ack
//! for a full window can be told apart from an ack for an empty one.

use std::fmt;

/// Sequence (or ack) number inside a [`SeqSpace`]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SeqNo(u32);

impl SeqNo {
    /// Create a sequence number from its raw value
    ///
    /// The value is not checked against any space; use [`SeqSpace::contains`].
    #[inline]
    pub const fn new(value: u32) -> Self {
        SeqNo(value)
    }

    /// Get the raw sequence number value
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNo({})", self.0)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SeqNo {
    fn from(value: u32) -> Self {
        SeqNo(value)
    }
}

impl From<SeqNo> for u32 {
    fn from(seq: SeqNo) -> u32 {
        seq.0
    }
}

/// Modular arithmetic over `[0, W]`
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SeqSpace {
    window: u32,
}

impl SeqSpace {
    /// Create the sequence space for window size `window`
    ///
    /// # Panics
    /// Panics if `window` is zero or `u32::MAX` (the modulus must fit in a u32)
    pub fn new(window: u32) -> Self {
        assert!(
            window >= 1 && window < u32::MAX,
            "window size {} out of range",
            window
        );
        SeqSpace { window }
    }

    /// Window size `W`
    #[inline]
    pub fn window(self) -> u32 {
        self.window
    }

    /// Number of distinct sequence numbers (`W + 1`)
    #[inline]
    pub fn modulus(self) -> u32 {
        self.window + 1
    }

    /// Whether `seq` is a legal member of this space
    #[inline]
    pub fn contains(self, seq: SeqNo) -> bool {
        seq.0 <= self.window
    }

    /// `(seq + 1) mod (W + 1)`
    #[inline]
    pub fn next(self, seq: SeqNo) -> SeqNo {
        self.add(seq, 1)
    }

    /// `(seq + W) mod (W + 1)`, i.e. the predecessor of `seq`
    ///
    /// This is also the "nothing new received" cumulative ack for a receiver
    /// expecting `seq`.
    #[inline]
    pub fn prev(self, seq: SeqNo) -> SeqNo {
        self.add(seq, self.window)
    }

    /// `(seq + n) mod (W + 1)`
    pub fn add(self, seq: SeqNo, n: u32) -> SeqNo {
        let m = u64::from(self.modulus());
        SeqNo(((u64::from(seq.0) + u64::from(n)) % m) as u32)
    }

    /// Cyclic distance travelled going forward from `from` to `to`
    pub fn distance(self, from: SeqNo, to: SeqNo) -> u32 {
        let m = u64::from(self.modulus());
        ((u64::from(to.0) + m - u64::from(from.0)) % m) as u32
    }

    /// Iterate forward from `from` (inclusive) to `to` (exclusive)
    pub fn range(self, from: SeqNo, to: SeqNo) -> impl Iterator<Item = SeqNo> {
        let len = self.distance(from, to);
        (0..len).map(move |i| self.add(from, i))
    }

    /// Number of bytes the sequence field occupies on the wire
    ///
    /// `ceil(log2(W + 1) / 8)`. `W = 7` needs one byte, `W = 260` needs two.
    pub fn seq_bytes(self) -> usize {
        let bits = 32 - self.window.leading_zeros();
        ((bits + 7) / 8) as usize
    }
}
