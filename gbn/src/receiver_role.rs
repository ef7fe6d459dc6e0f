//! Receive role
//!
//! A dedicated thread that owns the receiver state and the payload sink. It
//! polls the link without blocking, answers data frames with acks, posts
//! incoming acks to the [`AckTable`] and handles sync datagrams.

use crate::ack_table::AckTable;
use crate::link::Link;
use crate::sink::PayloadSink;
use crate::TIMELINE_TARGET;
use gbn_protocol::{
    Datagram, Decision, Frame, FrameBody, FrameCodec, FrameError, PeerId, ProtocolConfig,
    ReceiverState,
};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Extra receive buffer space beyond the largest legal frame
const RECV_SLACK: usize = 64;

/// Everything the receive thread owns or shares
pub(crate) struct ReceiveContext<S> {
    pub config: ProtocolConfig,
    pub local_id: PeerId,
    pub link: Arc<Link>,
    pub acks: Arc<AckTable>,
    pub sink: S,
    pub idle_backoff: Duration,
    pub stop: Arc<AtomicBool>,
}

/// Handle to the running receive thread
#[derive(Debug)]
pub(crate) struct ReceiveRole {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl ReceiveRole {
    pub fn spawn<S>(ctx: ReceiveContext<S>) -> io::Result<Self>
    where
        S: PayloadSink + Send + 'static,
    {
        let stop = Arc::clone(&ctx.stop);
        let handle = thread::Builder::new()
            .name(format!("gbn-recv-{}", ctx.local_id))
            .spawn(move || Receiver::new(ctx).run())?;
        Ok(ReceiveRole {
            handle: Some(handle),
            stop,
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("receive thread panicked");
            }
        }
    }
}

struct Receiver<S> {
    ctx: ReceiveContext<S>,
    codec: FrameCodec,
    state: ReceiverState,
    received: u64,
    delivered: u64,
}

impl<S: PayloadSink> Receiver<S> {
    fn new(ctx: ReceiveContext<S>) -> Self {
        Receiver {
            codec: FrameCodec::new(&ctx.config),
            state: ReceiverState::new(&ctx.config),
            ctx,
            received: 0,
            delivered: 0,
        }
    }

    fn run(mut self) {
        info!(local = %self.ctx.local_id, "receive role listening");
        let mut buf = vec![0u8; self.codec.max_frame_len() + RECV_SLACK];

        while !self.ctx.stop.load(Ordering::Acquire) {
            match self.ctx.link.try_recv(&mut buf) {
                Ok(Some(n)) => self.handle_datagram(&buf[..n]),
                Ok(None) => thread::sleep(self.ctx.idle_backoff),
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    thread::sleep(self.ctx.idle_backoff);
                }
            }
        }
        info!(local = %self.ctx.local_id, "receive role stopped");
    }

    fn handle_datagram(&mut self, bytes: &[u8]) {
        let frame = match self.codec.decode_datagram(bytes) {
            Ok(Datagram::Sync { src, dst }) => {
                self.handle_sync(src, dst);
                return;
            }
            Ok(Datagram::Frame(frame)) => frame,
            Err(e @ FrameError::Integrity { .. }) => {
                self.received += 1;
                warn!(
                    target: TIMELINE_TARGET,
                    receive = self.received,
                    error = %e,
                    status = "DataErr",
                    "frame dropped"
                );
                return;
            }
            Err(e) => {
                self.received += 1;
                debug!(receive = self.received, error = %e, "undecodable datagram dropped");
                return;
            }
        };

        self.received += 1;
        if frame.dst() != self.ctx.local_id {
            warn!(
                target: TIMELINE_TARGET,
                receive = self.received,
                dst = %frame.dst(),
                status = "AddrErr",
                "frame for another peer dropped"
            );
            return;
        }

        match frame.body {
            FrameBody::Data { seq, ref payload } => {
                let src = frame.src();
                let expected = self.state.expected(&src);
                let decision = self.state.on_data(src, seq);
                match decision {
                    Decision::Accept { .. } => {
                        self.delivered += 1;
                        info!(
                            target: TIMELINE_TARGET,
                            receive = self.received,
                            expected = %expected,
                            received = %seq,
                            status = "OK",
                            chunks = self.delivered,
                            "data accepted"
                        );
                        self.deliver(src, payload);
                    }
                    Decision::Reject { .. } => {
                        info!(
                            target: TIMELINE_TARGET,
                            receive = self.received,
                            expected = %expected,
                            received = %seq,
                            status = "NoErr",
                            "out of order, discarded"
                        );
                    }
                }
                self.send_ack(src, decision);
            }
            FrameBody::Ack { ack } => {
                trace!(receive = self.received, ack = %ack, from = %frame.src(), "ack received");
                self.ctx.acks.post(frame.src(), ack);
            }
        }
    }

    fn handle_sync(&mut self, src: PeerId, dst: PeerId) {
        if dst != self.ctx.local_id {
            return;
        }
        self.ctx.sink.reset(src);
        if self.state.reset(&src) {
            info!(peer = %src, "peer restarted, sequence cleared");
        }
    }

    fn deliver(&mut self, src: PeerId, payload: &[u8]) {
        match self.ctx.sink.accept(src, payload) {
            Ok(Some(done)) => {
                info!(
                    peer = %src,
                    name = %done.name,
                    chunks = done.chunks,
                    "receive complete"
                );
            }
            Ok(None) => {}
            Err(e) => error!(peer = %src, error = %e, "sink rejected chunk"),
        }
    }

    fn send_ack(&self, dst: PeerId, decision: Decision) {
        let encoded = Frame::ack(self.ctx.local_id, dst, decision.ack())
            .and_then(|frame| self.codec.encode(&frame));
        match encoded {
            Ok(bytes) => {
                if let Err(e) = self.ctx.link.send_impaired(&bytes) {
                    warn!(error = %e, "ack not sent");
                }
            }
            Err(e) => warn!(error = %e, "cannot build ack"),
        }
    }
}
