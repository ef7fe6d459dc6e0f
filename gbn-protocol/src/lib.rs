//! GBN Protocol Core Implementation
//!
//! This crate implements the Go-Back-N ARQ protocol without any I/O:
//! peer identifiers, modular sequence numbers, the binary frame codec,
//! the channel impairment model, the sliding-window sender and the
//! receiver's ordering state.

pub mod channel;
pub mod config;
pub mod frame;
pub mod peer;
pub mod receiver;
pub mod sequence;
pub mod window;

pub use channel::{ChannelSimulator, ChannelStats, Fate, Impairment, Lossless};
pub use config::{ConfigError, ProtocolConfig};
pub use frame::{Datagram, Frame, FrameBody, FrameCodec, FrameError, FrameHeader};
pub use peer::{PeerId, PeerIdError};
pub use receiver::{Decision, ReceiverState};
pub use sequence::{SeqNo, SeqSpace};
pub use window::{
    GbnSender, PayloadSource, SenderError, SenderStats, SenderWindow, SlotStatus, Step,
    Transmission,
};
