//! GBN I/O and Platform Abstraction
//!
//! This crate provides the datagram transports the protocol engine runs
//! over: a non-blocking UDP socket and an in-memory pair for tests, plus
//! small timing helpers.

pub mod memory;
pub mod socket;
pub mod time;

pub use memory::MemoryTransport;
pub use socket::{GbnSocket, SocketError, Transport};
pub use time::{time_until, Timer};
