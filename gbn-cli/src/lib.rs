//! GBN CLI Library
//!
//! Shared functionality for the GBN peer binary.

pub mod config;
pub mod stats;

pub use config::{
    ChannelSection, CliConfigError, Config, LogSection, ProtocolSection, TransportSection,
};
pub use stats::{display_report, format_bandwidth, format_bytes, format_duration, format_report};
