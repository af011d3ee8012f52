//! GDB Remote Serial Protocol codec.
//!
//! Covers the subset needed to drive a debuggee remotely: packet framing and
//! checksums, the `?`/`g`/`s`/`c`/`k`/`m` commands, and their replies.
//!
//! # Example
//!
//! ```
//! use rspdiff_proto::{Command, Reply, packet};
//!
//! assert_eq!(packet::encode(b"?"), b"$?#3f");
//! assert_eq!(Command::parse(b"m10,4").unwrap(), Command::ReadMemory { addr: 0x10, len: 4 });
//! assert_eq!(Reply::stopped().to_packet(), b"$S05#b8");
//! ```

mod command;
pub mod hex;
pub mod packet;
mod reply;

pub use command::Command;
pub use packet::{Frame, Received, checksum, decode_stream, encode};
pub use reply::{ERR_INVALID_ARGS, ERR_TOO_LARGE, Reply, SIGTRAP};

use thiserror::Error;

/// Protocol decoding errors.
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Packet truncated after {0} bytes")]
    Truncated(usize),
    #[error("Expected '$' to start packet, got 0x{0:02x}")]
    MissingStart(u8),
    #[error("Packet has no '#' before its checksum")]
    MissingEnd,
    #[error("Invalid checksum digits: {0:?}")]
    InvalidChecksumDigits(String),
    #[error("Invalid hex: {0:?}")]
    InvalidHex(String),
    #[error("Odd hex length: {0}")]
    OddHexLength(usize),
    #[error("Invalid memory read arguments: {0:?}")]
    InvalidMemoryArgs(String),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
