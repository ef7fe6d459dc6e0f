//! Engine error types

use gbn_io::SocketError;
use gbn_protocol::SenderError;
use std::io;
use thiserror::Error;

/// Errors that end a transfer or prevent an endpoint from starting
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Sender error: {0}")]
    Sender(#[from] SenderError),

    #[error("Transport error: {0}")]
    Transport(#[from] SocketError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Endpoint stopped")]
    Stopped,
}
