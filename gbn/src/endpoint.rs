//! Endpoint
//!
//! An [`Endpoint`] owns one link and runs the receive role for its whole
//! lifetime. Transfers run on the caller's thread, one at a time.

use crate::ack_table::AckTable;
use crate::error::TransferError;
use crate::file::FileSource;
use crate::link::Link;
use crate::receiver_role::{ReceiveContext, ReceiveRole};
use crate::sink::PayloadSink;
use crate::transfer::{self, TransferContext, TransferReport};
use gbn_protocol::{PayloadSource, PeerId, ProtocolConfig};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default sleep of the receive role when nothing is pending
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Endpoint parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    pub protocol: ProtocolConfig,
    pub local_id: PeerId,
    pub idle_backoff: Duration,
}

impl EndpointConfig {
    pub fn new(protocol: ProtocolConfig, local_id: PeerId) -> Self {
        EndpointConfig {
            protocol,
            local_id,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }

    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }
}

/// Requests an endpoint stop from another thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
}

impl StopHandle {
    /// Abort any running transfer and stop the receive role
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// A GBN peer: receive role plus on-demand transfers
#[derive(Debug)]
pub struct Endpoint {
    config: EndpointConfig,
    link: Arc<Link>,
    acks: Arc<AckTable>,
    stop: Arc<AtomicBool>,
    receiver: ReceiveRole,
}

impl Endpoint {
    /// Start the receive role, delivering in-order payloads to `sink`
    pub fn start<S>(config: EndpointConfig, link: Link, sink: S) -> Result<Self, TransferError>
    where
        S: PayloadSink + Send + 'static,
    {
        let link = Arc::new(link);
        let acks = Arc::new(AckTable::new());
        let stop = Arc::new(AtomicBool::new(false));

        let receiver = ReceiveRole::spawn(ReceiveContext {
            config: config.protocol,
            local_id: config.local_id,
            link: Arc::clone(&link),
            acks: Arc::clone(&acks),
            sink,
            idle_backoff: config.idle_backoff,
            stop: Arc::clone(&stop),
        })?;

        info!(local = %config.local_id, "endpoint started");
        Ok(Endpoint {
            config,
            link,
            acks,
            stop,
            receiver,
        })
    }

    pub fn local_id(&self) -> PeerId {
        self.config.local_id
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Whether the receive role is still running
    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Acquire) && self.receiver.is_running()
    }

    /// Send everything `source` yields to `destination` and wait for the final ack
    pub fn start_transfer<P: PayloadSource>(
        &mut self,
        destination: PeerId,
        source: P,
    ) -> Result<TransferReport, TransferError> {
        if !self.is_running() {
            return Err(TransferError::Stopped);
        }
        let ctx = TransferContext {
            config: &self.config.protocol,
            local_id: self.config.local_id,
            link: &self.link,
            acks: &self.acks,
            stop: &self.stop,
        };
        transfer::run(&ctx, destination, source)
    }

    /// Send a file using the name/data/end chunk convention
    pub fn send_file(
        &mut self,
        destination: PeerId,
        path: impl AsRef<Path>,
    ) -> Result<TransferReport, TransferError> {
        let source = FileSource::open(path, self.config.protocol.max_payload())?;
        info!(
            file = source.name(),
            bytes = source.size(),
            chunks = source.chunk_count(),
            "sending file"
        );
        self.start_transfer(destination, source)
    }

    /// Stop the receive role and wait for it to exit
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.receiver.shutdown();
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}
