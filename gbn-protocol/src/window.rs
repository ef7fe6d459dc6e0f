//! Go-Back-N sender
//!
//! [`SenderWindow`] is a ring of `W + 1` slots indexed directly by sequence
//! number. The slot at the unused point is always empty; the `W` slots after it
//! hold the frames currently in flight or waiting to be sent, oldest first.
//!
//! [`GbnSender`] drives the window with a transmit cursor. Each call to
//! [`GbnSender::poll`] consumes at most one cumulative ack, handles a timeout
//! of the oldest frame, and transmits at most one frame.

use crate::config::ProtocolConfig;
use crate::frame::{Frame, FrameCodec, FrameError, FrameHeader};
use crate::peer::PeerId;
use crate::sequence::{SeqNo, SeqSpace};
use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

/// Sender errors
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Payload source failed: {0}")]
    Source(#[from] io::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Supplies payload chunks to a sender, in order
pub trait PayloadSource {
    /// Next chunk, or `None` once the stream is exhausted
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;
}

impl<S: PayloadSource + ?Sized> PayloadSource for &mut S {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        (**self).next_chunk()
    }
}

impl<S: PayloadSource + ?Sized> PayloadSource for Box<S> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        (**self).next_chunk()
    }
}

impl PayloadSource for VecDeque<Bytes> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.pop_front())
    }
}

/// Transmission history of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotStatus {
    /// Never transmitted since it was filled
    #[default]
    New,
    /// Transmitted at least once
    TimedOut,
    /// Queued behind a timed-out frame and due for resend
    Retransmit,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotStatus::New => "New",
            SlotStatus::TimedOut => "TO",
            SlotStatus::Retransmit => "RT",
        };
        f.write_str(s)
    }
}

/// One sequence number's buffered state
#[derive(Debug, Clone, Default)]
pub struct WindowSlot {
    pub sent_at: Option<Instant>,
    pub frame: Bytes,
    pub status: SlotStatus,
}

impl WindowSlot {
    fn clear(&mut self) {
        self.sent_at = None;
        self.frame = Bytes::new();
    }
}

/// Ring of `W + 1` frame slots
#[derive(Debug)]
pub struct SenderWindow {
    space: SeqSpace,
    slots: Vec<WindowSlot>,
    unused: SeqNo,
    end_point: Option<SeqNo>,
}

impl SenderWindow {
    /// Create an empty window positioned just before `init_seq`
    pub fn new(space: SeqSpace, init_seq: SeqNo) -> Self {
        SenderWindow {
            space,
            slots: vec![WindowSlot::default(); space.modulus() as usize],
            unused: space.prev(init_seq),
            end_point: None,
        }
    }

    /// The always-empty slot; equals the last accepted cumulative ack
    pub fn unused_point(&self) -> SeqNo {
        self.unused
    }

    /// Oldest unacknowledged sequence number
    pub fn begin_point(&self) -> SeqNo {
        self.space.next(self.unused)
    }

    /// Placeholder slot one past the last real frame, once the source is exhausted
    pub fn end_point(&self) -> Option<SeqNo> {
        self.end_point
    }

    pub fn is_exhausted(&self) -> bool {
        self.end_point.is_some()
    }

    pub fn slot(&self, seq: SeqNo) -> &WindowSlot {
        &self.slots[seq.index()]
    }

    fn slot_mut(&mut self, seq: SeqNo) -> &mut WindowSlot {
        &mut self.slots[seq.index()]
    }

    /// Number of slots transmitted and not yet acknowledged
    pub fn outstanding(&self) -> usize {
        self.slots.iter().filter(|s| s.sent_at.is_some()).count()
    }

    /// Fill every slot from `init_seq` up to the unused point
    pub fn bind<F>(&mut self, init_seq: SeqNo, mut pull: F) -> Result<(), SenderError>
    where
        F: FnMut(SeqNo) -> Result<Option<Bytes>, SenderError>,
    {
        for seq in self.space.range(init_seq, self.unused) {
            match pull(seq)? {
                Some(frame) => {
                    let slot = &mut self.slots[seq.index()];
                    slot.frame = frame;
                    slot.status = SlotStatus::New;
                }
                None => {
                    self.end_point = Some(seq);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Whether `ack` acknowledges something this window has transmitted
    ///
    /// A repeat of the current cumulative ack is accepted as a no-op.
    ///
    /// Assumes acks arrive in the order they were sent. With only `W + 1`
    /// sequence numbers, a late ack for a slot that has since been refilled
    /// and sent again looks current, and accepting it slides the window past
    /// frames that were never acknowledged.
    pub fn is_acceptable(&self, ack: SeqNo) -> bool {
        self.space.contains(ack) && (ack == self.unused || self.slot(ack).sent_at.is_some())
    }

    /// Advance the unused point to `ack`, refilling the freed slots
    pub fn slide<F>(&mut self, ack: SeqNo, mut pull: F) -> Result<(), SenderError>
    where
        F: FnMut(SeqNo) -> Result<Option<Bytes>, SenderError>,
    {
        for seq in self.space.range(self.unused, ack) {
            let slot = &mut self.slots[seq.index()];
            slot.clear();
            if self.end_point.is_some() {
                continue;
            }
            match pull(seq)? {
                Some(frame) => {
                    slot.frame = frame;
                    slot.status = SlotStatus::New;
                }
                None => self.end_point = Some(seq),
            }
        }
        self.slot_mut(ack).clear();
        self.unused = ack;
        Ok(())
    }

    /// Whether the oldest unacknowledged frame has waited strictly longer than `timeout`
    pub fn timed_out(&self, now: Instant, timeout: Duration) -> bool {
        self.slot(self.begin_point())
            .sent_at
            .map_or(false, |t| now.saturating_duration_since(t) > timeout)
    }

    /// When the oldest unacknowledged frame expires
    pub fn deadline(&self, timeout: Duration) -> Option<Instant> {
        self.slot(self.begin_point()).sent_at.map(|t| t + timeout)
    }

    fn mark(&mut self, seq: SeqNo, status: SlotStatus) {
        self.slot_mut(seq).status = status;
    }
}

/// Counters for one transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Data frames handed to the link, including ones the channel dropped
    pub frames_sent: u64,
    /// Wire bytes of those frames
    pub bytes_sent: u64,
    /// Chunks pulled from the source
    pub chunks: u64,
    /// Timeout-triggered rewinds
    pub retransmit_sweeps: u64,
    /// Last cumulative ack accepted
    pub last_ack: Option<SeqNo>,
}

/// A frame the sender wants on the wire
#[derive(Debug, Clone)]
pub struct Transmission {
    pub seq: SeqNo,
    pub frame: Bytes,
    /// Status before this send
    pub status: SlotStatus,
    /// Running send counter, starting at 1
    pub send_count: u64,
    /// Unused point (last accepted ack) at send time
    pub acked: SeqNo,
}

/// Result of one sender poll
#[derive(Debug, Clone)]
pub enum Step {
    Transmit(Transmission),
    /// Nothing to send until an ack arrives or `deadline` passes
    Idle { deadline: Option<Instant> },
    Done,
}

/// Go-Back-N sender state machine for one transfer
pub struct GbnSender<S> {
    space: SeqSpace,
    timeout: Duration,
    codec: FrameCodec,
    header: FrameHeader,
    window: SenderWindow,
    source: S,
    cursor: SeqNo,
    stats: SenderStats,
}

fn next_frame<S: PayloadSource>(
    source: &mut S,
    codec: &FrameCodec,
    header: FrameHeader,
    seq: SeqNo,
    chunks: &mut u64,
) -> Result<Option<Bytes>, SenderError> {
    let Some(payload) = source.next_chunk()? else {
        return Ok(None);
    };
    *chunks += 1;
    let frame = Frame::data(header.src, header.dst, seq, payload)?;
    Ok(Some(codec.encode(&frame)?.freeze()))
}

impl<S: PayloadSource> GbnSender<S> {
    /// Create a sender and fill its first window from `source`
    pub fn new(
        config: &ProtocolConfig,
        src: PeerId,
        dst: PeerId,
        mut source: S,
    ) -> Result<Self, SenderError> {
        let header = FrameHeader::new(src, dst)?;
        let codec = FrameCodec::new(config);
        let mut window = SenderWindow::new(config.space(), config.init_seq());
        let mut stats = SenderStats::default();

        window.bind(config.init_seq(), |seq| {
            next_frame(&mut source, &codec, header, seq, &mut stats.chunks)
        })?;

        Ok(GbnSender {
            space: config.space(),
            timeout: config.timeout(),
            codec,
            header,
            window,
            source,
            cursor: config.init_seq(),
            stats,
        })
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    pub fn window(&self) -> &SenderWindow {
        &self.window
    }

    /// Peer every frame is addressed to
    pub fn destination(&self) -> PeerId {
        self.header.dst
    }

    /// Next slot the cursor will transmit
    pub fn cursor(&self) -> SeqNo {
        self.cursor
    }

    /// Every real frame has been acknowledged
    pub fn is_done(&self) -> bool {
        self.window
            .end_point()
            .map_or(false, |end| self.window.unused_point() == self.space.prev(end))
    }

    /// Advance the state machine by one step
    pub fn poll(&mut self, ack: Option<SeqNo>, now: Instant) -> Result<Step, SenderError> {
        if self.is_done() {
            return Ok(Step::Done);
        }
        if let Some(ack) = ack {
            self.on_ack(ack, now)?;
            if self.is_done() {
                return Ok(Step::Done);
            }
        }

        if self.window.timed_out(now, self.timeout) {
            let begin = self.window.begin_point();
            if self.cursor != begin {
                for seq in self.space.range(self.space.next(begin), self.cursor) {
                    self.window.mark(seq, SlotStatus::Retransmit);
                }
            }
            debug!(begin = %begin, cursor = %self.cursor, "timeout, going back");
            self.cursor = begin;
            self.stats.retransmit_sweeps += 1;
        }

        if self.cursor == self.window.unused_point() || Some(self.cursor) == self.window.end_point()
        {
            return Ok(Step::Idle {
                deadline: self.window.deadline(self.timeout),
            });
        }

        let seq = self.cursor;
        let slot = self.window.slot_mut(seq);
        let status = slot.status;
        let frame = slot.frame.clone();
        slot.status = SlotStatus::TimedOut;
        slot.sent_at = Some(now);

        self.cursor = self.space.next(seq);
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;

        Ok(Step::Transmit(Transmission {
            seq,
            frame,
            status,
            send_count: self.stats.frames_sent,
            acked: self.window.unused_point(),
        }))
    }

    fn on_ack(&mut self, ack: SeqNo, now: Instant) -> Result<(), SenderError> {
        if !self.window.is_acceptable(ack) {
            trace!(ack = %ack, unused = %self.window.unused_point(), "ignoring stale ack");
            return Ok(());
        }

        let old_unused = self.window.unused_point();
        let cursor_distance = self.space.distance(old_unused, self.cursor);
        let ack_distance = self.space.distance(old_unused, ack);

        let Self {
            window,
            source,
            codec,
            header,
            stats,
            ..
        } = self;
        window.slide(ack, |seq| {
            next_frame(source, codec, *header, seq, &mut stats.chunks)
        })?;
        stats.last_ack = Some(ack);

        let timed_out = self.window.timed_out(now, self.timeout);
        // A cursor left inside the acknowledged run would send refilled slots
        // ahead of the new begin point, which then never times out
        let stale_cursor = cursor_distance != 0 && cursor_distance <= ack_distance;
        if (timed_out && cursor_distance <= ack_distance) || stale_cursor {
            self.cursor = self.window.begin_point();
        }
        Ok(())
    }
}

impl<S> fmt::Debug for GbnSender<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GbnSender")
            .field("header", &self.header)
            .field("cursor", &self.cursor)
            .field("window", &self.window)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PeerId = PeerId::new([0, 0x16, 0x3e, 0, 0, 1]);
    const B: PeerId = PeerId::new([0, 0x16, 0x3e, 0, 0, 2]);

    fn config(window: u32) -> ProtocolConfig {
        ProtocolConfig::new(16, window, 0, Duration::from_millis(200)).unwrap()
    }

    fn chunks(n: usize) -> VecDeque<Bytes> {
        (0..n).map(|i| Bytes::from(format!("chunk-{i}"))).collect()
    }

    fn expect_transmit(step: Step) -> Transmission {
        match step {
            Step::Transmit(t) => t,
            other => panic!("expected transmit, got {:?}", other),
        }
    }

    #[test]
    fn test_initial_window() {
        let sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        assert_eq!(sender.destination(), B);
        assert_eq!(sender.window().unused_point(), SeqNo::new(4));
        assert_eq!(sender.window().begin_point(), SeqNo::new(0));
        assert_eq!(sender.stats().chunks, 4);
        assert!(!sender.window().is_exhausted());
    }

    #[test]
    fn test_lossless_transfer() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        let now = Instant::now();
        let mut sent = Vec::new();
        let mut ack = None;

        loop {
            match sender.poll(ack.take(), now).unwrap() {
                Step::Transmit(t) => {
                    sent.push(t.seq.as_raw());
                    ack = Some(t.seq);
                }
                Step::Idle { .. } => panic!("idle with acks flowing"),
                Step::Done => break,
            }
        }

        assert_eq!(sent, vec![0, 1, 2, 3, 4, 0, 1, 2, 3, 4]);
        let stats = sender.stats();
        assert_eq!(stats.frames_sent, 10);
        assert_eq!(stats.chunks, 10);
        assert_eq!(stats.last_ack, Some(SeqNo::new(4)));
        assert_eq!(stats.retransmit_sweeps, 0);
    }

    #[test]
    fn test_late_ack_for_refilled_slot_looks_current() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        let now = Instant::now();
        for _ in 0..4 {
            expect_transmit(sender.poll(None, now).unwrap());
        }

        // ack 1 frees slots 4 and 0, which are refilled and sent
        let t = expect_transmit(sender.poll(Some(SeqNo::new(1)), now).unwrap());
        assert_eq!(t.seq, SeqNo::new(4));
        let t = expect_transmit(sender.poll(None, now).unwrap());
        assert_eq!(t.seq, SeqNo::new(0));

        // an ack 0 sent before ack 1 but arriving after it cannot be told
        // apart from an ack for the new frame in slot 0
        assert!(sender.window().is_acceptable(SeqNo::new(0)));
        sender.poll(Some(SeqNo::new(0)), now).unwrap();
        assert_eq!(sender.window().unused_point(), SeqNo::new(0));
    }

    #[test]
    fn test_fills_window_then_idles() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        let now = Instant::now();
        for expected in 0..4 {
            let t = expect_transmit(sender.poll(None, now).unwrap());
            assert_eq!(t.seq, SeqNo::new(expected));
            assert_eq!(t.status, SlotStatus::New);
        }
        match sender.poll(None, now).unwrap() {
            Step::Idle { deadline } => {
                assert_eq!(deadline, Some(now + Duration::from_millis(200)))
            }
            other => panic!("expected idle, got {:?}", other),
        }
        assert_eq!(sender.window().outstanding(), 4);
    }

    #[test]
    fn test_timeout_is_strict() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        let start = Instant::now();
        for _ in 0..4 {
            sender.poll(None, start).unwrap();
        }
        let at_deadline = start + Duration::from_millis(200);
        assert!(matches!(
            sender.poll(None, at_deadline).unwrap(),
            Step::Idle { .. }
        ));
        assert_eq!(sender.stats().retransmit_sweeps, 0);
    }

    #[test]
    fn test_timeout_goes_back_to_oldest() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        let start = Instant::now();
        for _ in 0..4 {
            sender.poll(None, start).unwrap();
        }

        let later = start + Duration::from_millis(201);
        let first = expect_transmit(sender.poll(None, later).unwrap());
        assert_eq!(first.seq, SeqNo::new(0));
        assert_eq!(first.status, SlotStatus::TimedOut);
        assert_eq!(sender.stats().retransmit_sweeps, 1);

        let second = expect_transmit(sender.poll(None, later).unwrap());
        assert_eq!(second.seq, SeqNo::new(1));
        assert_eq!(second.status, SlotStatus::Retransmit);
        assert_eq!(sender.stats().frames_sent, 6);
    }

    #[test]
    fn test_partial_ack_refills() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        let now = Instant::now();
        for _ in 0..4 {
            sender.poll(None, now).unwrap();
        }
        let t = expect_transmit(sender.poll(Some(SeqNo::new(1)), now).unwrap());
        assert_eq!(t.seq, SeqNo::new(4));
        assert_eq!(t.acked, SeqNo::new(1));
        assert_eq!(sender.window().begin_point(), SeqNo::new(2));
        assert_eq!(sender.stats().chunks, 6);
        assert!(sender.window().outstanding() <= 4);
    }

    #[test]
    fn test_stale_ack_ignored() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        let now = Instant::now();
        sender.poll(None, now).unwrap();
        // seq 2 was never transmitted
        sender.poll(Some(SeqNo::new(2)), now).unwrap();
        assert_eq!(sender.window().unused_point(), SeqNo::new(4));
        assert_eq!(sender.stats().last_ack, None);
        // outside the sequence space
        sender.poll(Some(SeqNo::new(9)), now).unwrap();
        assert_eq!(sender.window().unused_point(), SeqNo::new(4));
    }

    #[test]
    fn test_ack_past_rewound_cursor() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            sender.poll(None, start).unwrap();
        }

        // 0..=2 were received but every ack was lost
        let later = start + Duration::from_millis(201);
        let resent = expect_transmit(sender.poll(None, later).unwrap());
        assert_eq!(resent.seq, SeqNo::new(0));
        assert_eq!(sender.cursor(), SeqNo::new(1));

        // the receiver answers the duplicate with its cumulative ack
        let t = expect_transmit(sender.poll(Some(SeqNo::new(2)), later).unwrap());
        assert_eq!(t.seq, SeqNo::new(3));
        assert_eq!(t.status, SlotStatus::New);
        assert_eq!(sender.window().begin_point(), SeqNo::new(3));
    }

    #[test]
    fn test_idle_cursor_continues_after_slide() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(10)).unwrap();
        let now = Instant::now();
        for _ in 0..4 {
            sender.poll(None, now).unwrap();
        }
        assert_eq!(sender.cursor(), sender.window().unused_point());

        // the slot at the old unused point now holds the next chunk
        let t = expect_transmit(sender.poll(Some(SeqNo::new(0)), now).unwrap());
        assert_eq!(t.seq, SeqNo::new(4));
    }

    #[test]
    fn test_empty_source_done_immediately() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(0)).unwrap();
        assert!(sender.is_done());
        assert!(matches!(
            sender.poll(None, Instant::now()).unwrap(),
            Step::Done
        ));
        assert_eq!(sender.stats().frames_sent, 0);
    }

    #[test]
    fn test_final_ack_during_fill() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(4)).unwrap();
        let now = Instant::now();
        for _ in 0..4 {
            sender.poll(None, now).unwrap();
        }
        assert!(!sender.window().is_exhausted());
        assert!(matches!(
            sender.poll(Some(SeqNo::new(3)), now).unwrap(),
            Step::Done
        ));
        assert_eq!(sender.window().end_point(), Some(SeqNo::new(4)));
    }

    #[test]
    fn test_never_transmits_end_placeholder() {
        let mut sender = GbnSender::new(&config(4), A, B, chunks(2)).unwrap();
        let now = Instant::now();
        assert_eq!(sender.window().end_point(), Some(SeqNo::new(2)));
        expect_transmit(sender.poll(None, now).unwrap());
        expect_transmit(sender.poll(None, now).unwrap());
        assert!(matches!(
            sender.poll(None, now).unwrap(),
            Step::Idle { .. }
        ));
        assert!(matches!(
            sender.poll(Some(SeqNo::new(1)), now).unwrap(),
            Step::Done
        ));
    }

    #[test]
    fn test_same_peer_rejected() {
        assert!(matches!(
            GbnSender::new(&config(4), A, A, chunks(1)),
            Err(SenderError::Frame(FrameError::PeerIdentityCollision(_)))
        ));
    }

    #[test]
    fn test_slot_status_display() {
        assert_eq!(SlotStatus::New.to_string(), "New");
        assert_eq!(SlotStatus::TimedOut.to_string(), "TO");
        assert_eq!(SlotStatus::Retransmit.to_string(), "RT");
    }
}
