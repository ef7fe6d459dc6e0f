//! Sender/receiver state machines driven on a virtual clock
//!
//! No threads and no sockets: every data frame goes through a seeded lossy
//! channel into a [`ReceiverState`], and acks come back after a fixed delay.

use bytes::Bytes;
use gbn_protocol::{
    FrameBody, FrameCodec, GbnSender, PeerId, ProtocolConfig, ReceiverState, SenderStats, SeqNo,
    Step,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const ALICE: PeerId = PeerId::new([0x00, 0x16, 0x3e, 0x00, 0x00, 0x01]);
const BOB: PeerId = PeerId::new([0x00, 0x16, 0x3e, 0x00, 0x00, 0x02]);

const TIMEOUT: Duration = Duration::from_millis(200);
const SEND_GAP: Duration = Duration::from_millis(1);
const ACK_DELAY: Duration = Duration::from_millis(5);
const MAX_POLLS: usize = 200_000;

/// Data-path loss that never drops two transmissions of the same sequence
/// number in a row
struct FlakyChannel {
    rng: StdRng,
    one_in: u32,
    dropped_last: Vec<bool>,
}

impl FlakyChannel {
    fn new(config: &ProtocolConfig, one_in: u32, seed: u64) -> Self {
        FlakyChannel {
            rng: StdRng::seed_from_u64(seed),
            one_in,
            dropped_last: vec![false; config.space().modulus() as usize],
        }
    }

    fn drops(&mut self, seq: SeqNo) -> bool {
        let slot = &mut self.dropped_last[seq.as_raw() as usize];
        let drop = self.one_in > 0 && !*slot && self.rng.random_ratio(1, self.one_in);
        *slot = drop;
        drop
    }
}

struct Outcome {
    delivered: Vec<Bytes>,
    stats: SenderStats,
    acks_sent: usize,
    max_outstanding: usize,
}

fn simulate(config: ProtocolConfig, source: VecDeque<Bytes>, loss_one_in: u32, seed: u64) -> Outcome {
    let codec = FrameCodec::new(&config);
    let mut sender = GbnSender::new(&config, ALICE, BOB, source).unwrap();
    let mut receiver = ReceiverState::new(&config);
    let mut channel = FlakyChannel::new(&config, loss_one_in, seed);

    let mut now = Instant::now();
    let mut in_flight: VecDeque<(Instant, SeqNo)> = VecDeque::new();
    let mut delivered = Vec::new();
    let mut acks_sent = 0;
    let mut max_outstanding = 0;

    for _ in 0..MAX_POLLS {
        // Latest arrived ack wins, as in the engine's ack table
        let mut ack = None;
        while let Some(&(at, seq)) = in_flight.front() {
            if at > now {
                break;
            }
            ack = Some(seq);
            in_flight.pop_front();
        }

        match sender.poll(ack, now).unwrap() {
            Step::Transmit(tx) => {
                max_outstanding = max_outstanding.max(sender.window().outstanding());
                if !channel.drops(tx.seq) {
                    let frame = codec.decode(&tx.frame).unwrap();
                    let FrameBody::Data { seq, payload } = frame.body else {
                        panic!("sender emitted a non-data frame");
                    };
                    let decision = receiver.on_data(frame.header.src, seq);
                    if decision.is_accept() {
                        delivered.push(payload);
                    }
                    in_flight.push_back((now + ACK_DELAY, decision.ack()));
                    acks_sent += 1;
                }
                now += SEND_GAP;
            }
            Step::Idle { deadline } => {
                let retry = deadline.map(|d| d + SEND_GAP);
                let next_ack = in_flight.front().map(|&(at, _)| at);
                now = match (retry, next_ack) {
                    (Some(a), Some(b)) => a.min(b),
                    (Some(a), None) | (None, Some(a)) => a,
                    (None, None) => panic!("sender idle with nothing outstanding"),
                };
            }
            Step::Done => {
                return Outcome {
                    delivered,
                    stats: sender.stats(),
                    acks_sent,
                    max_outstanding,
                };
            }
        }
    }
    panic!("transfer did not finish within {MAX_POLLS} polls");
}

fn source(n: usize) -> VecDeque<Bytes> {
    (0..n).map(|i| Bytes::from(format!("chunk-{i}"))).collect()
}

#[test]
fn test_lossless_window_of_four() {
    let config = ProtocolConfig::new(64, 4, 0, TIMEOUT).unwrap();
    let outcome = simulate(config, source(10), 0, 0);

    assert_eq!(outcome.stats.frames_sent, 10);
    assert_eq!(outcome.acks_sent, 10);
    assert_eq!(outcome.stats.retransmit_sweeps, 0);
    assert_eq!(outcome.stats.last_ack, Some(SeqNo::new(4)));
    assert_eq!(outcome.delivered, Vec::from(source(10)));
    assert!(outcome.max_outstanding <= 4);
}

#[test]
fn test_nonzero_initial_sequence() {
    let config = ProtocolConfig::new(64, 4, 3, TIMEOUT).unwrap();
    let outcome = simulate(config, source(7), 0, 0);

    assert_eq!(outcome.stats.frames_sent, 7);
    // 3, 4, 0, 1, 2, 3, 4
    assert_eq!(outcome.stats.last_ack, Some(SeqNo::new(4)));
    assert_eq!(outcome.delivered, Vec::from(source(7)));
}

#[test]
fn test_stop_and_wait() {
    let config = ProtocolConfig::new(64, 1, 0, TIMEOUT).unwrap();
    let outcome = simulate(config, source(5), 3, 11);

    assert_eq!(outcome.delivered, Vec::from(source(5)));
    assert_eq!(outcome.max_outstanding, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_outstanding_never_exceeds_window(
        window in 1u32..=8,
        chunks in 0usize..40,
        loss in 0u32..6,
        seed in any::<u64>(),
    ) {
        let config = ProtocolConfig::new(64, window, 0, TIMEOUT).unwrap();
        let outcome = simulate(config, source(chunks), loss, seed);
        prop_assert!(outcome.max_outstanding <= window as usize);
    }

    #[test]
    fn prop_delivery_in_order_without_duplicates(
        window in 1u32..=8,
        init in 0u32..=8,
        chunks in 0usize..40,
        loss in 0u32..6,
        seed in any::<u64>(),
    ) {
        let config = ProtocolConfig::new(64, window, init.min(window), TIMEOUT).unwrap();
        let outcome = simulate(config, source(chunks), loss, seed);
        prop_assert_eq!(outcome.delivered, Vec::from(source(chunks)));
        prop_assert_eq!(outcome.stats.chunks, chunks as u64);
    }

    #[test]
    fn prop_sweeps_bounded_by_chunks(
        window in 1u32..=8,
        chunks in 1usize..40,
        loss in 2u32..6,
        seed in any::<u64>(),
    ) {
        let config = ProtocolConfig::new(64, window, 0, TIMEOUT).unwrap();
        let outcome = simulate(config, source(chunks), loss, seed);
        prop_assert!(
            outcome.stats.retransmit_sweeps <= chunks as u64,
            "{} sweeps for {} chunks",
            outcome.stats.retransmit_sweeps,
            chunks
        );
    }
}
