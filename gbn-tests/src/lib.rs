//! Shared fixtures for the cross-crate tests
//!
//! Scripted channels, a reordering transport and endpoint pairs wired over
//! in-memory transports.

use bytes::{Bytes, BytesMut};
use gbn::{Endpoint, EndpointConfig, Link, MemorySink, PeerId, ProtocolConfig};
use gbn_io::{MemoryTransport, SocketError, Transport};
use gbn_protocol::frame::{flags, SYNC_LEN};
use gbn_protocol::{Fate, Impairment};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ALICE: PeerId = PeerId::new([0x00, 0x16, 0x3e, 0x00, 0x00, 0x01]);
pub const BOB: PeerId = PeerId::new([0x00, 0x16, 0x3e, 0x00, 0x00, 0x02]);

pub fn protocol(window: u32, timeout: Duration) -> ProtocolConfig {
    ProtocolConfig::new(64, window, 0, timeout).unwrap()
}

/// `n` distinct chunks tagged with their index
pub fn chunks(n: usize) -> VecDeque<Bytes> {
    (0..n).map(|i| Bytes::from(format!("chunk-{i:04}"))).collect()
}

/// Deterministic channel that drops the frames at the given indices
///
/// Indices count every frame offered to the channel, starting at 0. The
/// counter is shared so tests can read it after the channel moves into a link.
#[derive(Debug, Clone)]
pub struct ScriptedChannel {
    drop_at: Vec<u64>,
    seen: Arc<AtomicU64>,
}

impl ScriptedChannel {
    pub fn lossless() -> Self {
        Self::dropping(&[])
    }

    pub fn dropping(indices: &[u64]) -> Self {
        ScriptedChannel {
            drop_at: indices.to_vec(),
            seen: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frames offered so far
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Acquire)
    }
}

impl Impairment for ScriptedChannel {
    fn apply(&mut self, _frame: &mut BytesMut) -> Fate {
        let index = self.seen.fetch_add(1, Ordering::AcqRel);
        if self.drop_at.contains(&index) {
            Fate::Drop
        } else {
            Fate::Deliver
        }
    }
}

/// Transport that occasionally holds a datagram back until the next send
///
/// A held datagram is released right after the following one, so two
/// consecutive frames swap places. Sync datagrams are never held.
///
/// Wrap only a data-sending end. The sender assumes acks arrive in order, so
/// reordering the ack stream is outside what the protocol tolerates.
pub struct SwapTransport<T> {
    inner: T,
    held: Mutex<Option<Vec<u8>>>,
    rng: Mutex<StdRng>,
    one_in: u32,
}

impl<T: Transport> SwapTransport<T> {
    pub fn new(inner: T, one_in: u32, seed: u64) -> Self {
        SwapTransport {
            inner,
            held: Mutex::new(None),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            one_in,
        }
    }
}

impl<T: Transport> Transport for SwapTransport<T> {
    fn send(&self, datagram: &[u8]) -> Result<(), SocketError> {
        let is_sync = datagram.len() == SYNC_LEN && datagram[0] == flags::SYNC;
        let mut held = self.held.lock();
        if let Some(previous) = held.take() {
            self.inner.send(datagram)?;
            return self.inner.send(&previous);
        }
        if !is_sync && self.rng.lock().random_ratio(1, self.one_in) {
            *held = Some(datagram.to_vec());
            return Ok(());
        }
        self.inner.send(datagram)
    }

    fn try_recv(&self, buf: &mut [u8]) -> Result<Option<usize>, SocketError> {
        self.inner.try_recv(buf)
    }
}

/// Two running endpoints and what each has received
pub struct Pair {
    pub alice: Endpoint,
    pub bob: Endpoint,
    pub at_alice: MemorySink,
    pub at_bob: MemorySink,
}

/// Wire ALICE and BOB together over memory transports with the given channels
pub fn pair<A, B>(protocol: ProtocolConfig, alice_channel: A, bob_channel: B) -> Pair
where
    A: Impairment + 'static,
    B: Impairment + 'static,
{
    let (ta, tb) = MemoryTransport::pair();
    pair_over(protocol, Link::new(ta, alice_channel), Link::new(tb, bob_channel))
}

pub fn pair_over(protocol: ProtocolConfig, alice_link: Link, bob_link: Link) -> Pair {
    let at_alice = MemorySink::new();
    let at_bob = MemorySink::new();
    let alice = Endpoint::start(
        EndpointConfig::new(protocol, ALICE),
        alice_link,
        at_alice.clone(),
    )
    .unwrap();
    let bob = Endpoint::start(EndpointConfig::new(protocol, BOB), bob_link, at_bob.clone()).unwrap();
    Pair {
        alice,
        bob,
        at_alice,
        at_bob,
    }
}

/// Fresh empty directory under the system temp dir
pub fn scratch_dir(tag: &str) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let dir = std::env::temp_dir().join(format!(
        "gbn-tests-{}-{}-{}",
        tag,
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
