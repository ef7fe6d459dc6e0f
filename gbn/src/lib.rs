//! GBN - Go-Back-N reliable transfer over UDP
//!
//! High-level engine built on [`gbn_protocol`] and [`gbn_io`]: an
//! [`Endpoint`] runs a receive thread for its whole lifetime and performs
//! transfers on demand from the caller's thread.

pub use gbn_io as io;
pub use gbn_protocol as protocol;

pub mod ack_table;
pub mod endpoint;
pub mod error;
pub mod file;
pub mod link;
mod receiver_role;
pub mod sink;
mod transfer;

/// Log target of the per-frame send and receive records
///
/// Every data frame sent and every receive decision is emitted at `info`
/// under this target, so the full exchange can be reconstructed from a log.
pub const TIMELINE_TARGET: &str = "gbn::timeline";

pub use ack_table::AckTable;
pub use endpoint::{Endpoint, EndpointConfig, StopHandle, DEFAULT_IDLE_BACKOFF};
pub use error::TransferError;
pub use file::{FileSink, FileSource};
pub use link::Link;
pub use sink::{Completed, MemorySink, PayloadSink, SinkError};
pub use transfer::TransferReport;

// Re-export commonly used types
pub use protocol::{PayloadSource, PeerId, ProtocolConfig, SeqNo};
