//! Length-prefixed relay protocol between a sensor node and its receiver.
//!
//! ```text
//! +----------------+-------+------------------+
//! | length: u32 BE | tag   | payload (length) |
//! +----------------+-------+------------------+
//! ```
//!
//! The length counts payload bytes only. Tag `0x01` carries a JSON-encoded
//! frequency/power matrix, tag `0x02` a UTF-8 status notice. Every message
//! travels on its own connection.

pub mod frame;
pub mod server;
pub mod transport;

pub use frame::{Message, MessageKind, Payload, HEADER_LEN, MAX_FRAME_LEN};
pub use server::{DistributionServer, ReceiverState, ServerConfig, ServerHandle, SharedMatrix};
pub use transport::{Distributor, OneShotTcp, Transport};

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("connection closed after {received} of {expected} bytes")]
    ConnectionTruncated { expected: usize, received: usize },
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),
    #[error("frame of {0} bytes exceeds the 64 MiB limit")]
    FrameTooLarge(usize),
    #[error("payload does not decode: {0}")]
    Payload(String),
    #[error("send to {target} failed: {source}")]
    SendFailure {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
