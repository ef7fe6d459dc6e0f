//! Send role
//!
//! Runs one transfer on the caller's thread: resets the peer with a sync
//! datagram, then drives a [`GbnSender`] until the last frame is acknowledged.
//! Between polls the role sleeps on the ack table until an ack is posted or
//! the oldest frame's timeout expires.

use crate::ack_table::AckTable;
use crate::error::TransferError;
use crate::link::Link;
use crate::TIMELINE_TARGET;
use gbn_io::{time_until, Timer};
use gbn_protocol::{
    Fate, FrameCodec, GbnSender, PayloadSource, PeerId, ProtocolConfig, SeqNo, Step,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Longest single wait, so a stop request is noticed promptly
const MAX_IDLE_WAIT: Duration = Duration::from_millis(50);

/// Interval between progress reports
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub destination: PeerId,
    /// Data frames sent, counting ones the channel dropped
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Payload chunks taken from the source
    pub chunks: u64,
    pub retransmit_sweeps: u64,
    /// Last cumulative ack observed; `None` for an empty source
    pub final_ack: Option<SeqNo>,
    pub elapsed: Duration,
}

impl TransferReport {
    /// Frames sent per chunk delivered (1.0 on a perfect channel)
    pub fn overhead(&self) -> f64 {
        if self.chunks == 0 {
            return 0.0;
        }
        self.frames_sent as f64 / self.chunks as f64
    }
}

pub(crate) struct TransferContext<'a> {
    pub config: &'a ProtocolConfig,
    pub local_id: PeerId,
    pub link: &'a Link,
    pub acks: &'a AckTable,
    pub stop: &'a AtomicBool,
}

pub(crate) fn run<P: PayloadSource>(
    ctx: &TransferContext<'_>,
    destination: PeerId,
    source: P,
) -> Result<TransferReport, TransferError> {
    let started = Instant::now();
    ctx.acks.clear();

    let mut sender = GbnSender::new(ctx.config, ctx.local_id, destination, source)?;
    ctx.link
        .send_clean(&FrameCodec::encode_sync(ctx.local_id, destination))?;
    info!(destination = %destination, "transfer started");

    let mut progress = Timer::new(PROGRESS_INTERVAL, started);
    loop {
        if ctx.stop.load(Ordering::Acquire) {
            return Err(TransferError::Stopped);
        }

        let ack = ctx.acks.take(&destination);
        let now = Instant::now();
        match sender.poll(ack, now)? {
            Step::Transmit(tx) => {
                let fate = ctx.link.send_impaired(&tx.frame)?;
                info!(
                    target: TIMELINE_TARGET,
                    send = tx.send_count,
                    seq = %tx.seq,
                    status = %tx.status,
                    acked = %tx.acked,
                    dropped = fate == Fate::Drop,
                    "send"
                );
            }
            Step::Idle { deadline } => {
                ctx.acks.wait(time_until(deadline, now, MAX_IDLE_WAIT));
            }
            Step::Done => break,
        }

        if progress.try_fire(now) {
            let stats = sender.stats();
            info!(
                destination = %sender.destination(),
                frames = stats.frames_sent,
                chunks = stats.chunks,
                sweeps = stats.retransmit_sweeps,
                "transfer in progress"
            );
        }
    }

    let stats = sender.stats();
    let report = TransferReport {
        destination,
        frames_sent: stats.frames_sent,
        bytes_sent: stats.bytes_sent,
        chunks: stats.chunks,
        retransmit_sweeps: stats.retransmit_sweeps,
        final_ack: stats.last_ack,
        elapsed: started.elapsed(),
    };
    info!(
        destination = %destination,
        frames = report.frames_sent,
        chunks = report.chunks,
        sweeps = report.retransmit_sweeps,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "transfer finished"
    );
    Ok(report)
}
