//! Payload delivery
//!
//! The receive role hands every in-order payload to a [`PayloadSink`].

use bytes::Bytes;
use gbn_protocol::PeerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("Unknown chunk marker: {0:#04x}")]
    UnknownMarker(u8),

    #[error("Empty chunk")]
    EmptyChunk,
}

/// A finished delivery unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub name: String,
    /// Chunks that made up the unit, the terminating one included
    pub chunks: u64,
}

/// Consumer of in-order payloads
pub trait PayloadSink {
    /// Accept the next in-order chunk from `source`
    ///
    /// The frame carrying `chunk` is acknowledged whatever this returns, so
    /// the sender never resends a chunk the sink failed on. An error loses
    /// that chunk; the receive role only logs it.
    fn accept(&mut self, source: PeerId, chunk: &[u8]) -> Result<Option<Completed>, SinkError>;

    /// `source` restarted its stream; discard anything partial from it
    fn reset(&mut self, _source: PeerId) {}
}

impl<S: PayloadSink + ?Sized> PayloadSink for Box<S> {
    fn accept(&mut self, source: PeerId, chunk: &[u8]) -> Result<Option<Completed>, SinkError> {
        (**self).accept(source, chunk)
    }

    fn reset(&mut self, source: PeerId) {
        (**self).reset(source)
    }
}

/// Collects raw chunks per source; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    chunks: Arc<Mutex<HashMap<PeerId, Vec<Bytes>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks received from `source`, in delivery order
    pub fn chunks(&self, source: &PeerId) -> Vec<Bytes> {
        self.chunks.lock().get(source).cloned().unwrap_or_default()
    }

    /// Total chunks received from all sources
    pub fn len(&self) -> usize {
        self.chunks.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PayloadSink for MemorySink {
    fn accept(&mut self, source: PeerId, chunk: &[u8]) -> Result<Option<Completed>, SinkError> {
        self.chunks
            .lock()
            .entry(source)
            .or_default()
            .push(Bytes::copy_from_slice(chunk));
        Ok(None)
    }
}
