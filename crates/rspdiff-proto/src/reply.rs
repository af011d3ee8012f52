//! Server replies, serialized to ASCII payloads at the boundary.

use crate::{hex, packet};

/// Signal reported for every stop (`SIGTRAP`).
pub const SIGTRAP: u8 = 5;

/// Error code for malformed request arguments.
pub const ERR_INVALID_ARGS: u8 = 0x01;
/// Error code for a memory read larger than the server allows.
pub const ERR_TOO_LARGE: u8 = 0x02;

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `S<hh>` - stopped with the given signal.
    Status(u8),
    /// Register image, sent as hex.
    Registers(Vec<u8>),
    /// Memory contents, sent as hex.
    Memory(Vec<u8>),
    /// `E<hh>` - request rejected.
    Error(u8),
    /// Empty payload; the conventional answer to an unsupported command.
    Empty,
}

impl Reply {
    /// Stop reply for a halted target.
    pub const fn stopped() -> Self {
        Self::Status(SIGTRAP)
    }

    /// Payload bytes (without framing).
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::Status(signal) => tagged(b'S', *signal),
            Self::Registers(bytes) | Self::Memory(bytes) => hex::encode(bytes),
            Self::Error(code) => tagged(b'E', *code),
            Self::Empty => Vec::new(),
        }
    }

    /// Framed `$<payload>#<hh>` bytes.
    pub fn to_packet(&self) -> Vec<u8> {
        packet::encode(&self.payload())
    }
}

fn tagged(tag: u8, value: u8) -> Vec<u8> {
    let digits = hex::byte_to_hex(value);
    vec![tag, digits[0], digits[1]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reply() {
        assert_eq!(Reply::stopped().payload(), b"S05");
        assert_eq!(Reply::stopped().to_packet(), b"$S05#b8");
    }

    #[test]
    fn test_blob_replies_are_hex() {
        let reply = Reply::Memory(vec![0x12, 0xab]);
        assert_eq!(reply.payload(), b"12ab");
        assert_eq!(Reply::Registers(vec![0; 4]).payload().len(), 8);
    }

    #[test]
    fn test_error_and_empty() {
        assert_eq!(Reply::Error(ERR_INVALID_ARGS).payload(), b"E01");
        assert_eq!(Reply::Empty.to_packet(), b"$#00");
    }
}
