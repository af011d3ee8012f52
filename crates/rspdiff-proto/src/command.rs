//! Commands understood by the server.

use std::fmt;
use std::str::FromStr;

use crate::packet::{self, ACK};
use crate::{ProtoError, hex};

/// A request decoded from a packet payload.
///
/// Dispatch looks only at the first payload byte; trailing bytes after
/// `?`, `g`, `s`, `c` and `k` are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `?` - report why the target halted.
    QueryStatus,
    /// `g` - read the full register image.
    ReadRegisters,
    /// `s` - execute one instruction.
    SingleStep,
    /// `c` - resume until the target stops.
    Continue,
    /// `k` - end the session.
    Kill,
    /// `m<addr>,<len>` - read `len` bytes at `addr`.
    ReadMemory { addr: u64, len: u64 },
    /// Any other payload, kept verbatim.
    Unsupported(Vec<u8>),
}

impl Command {
    /// Decode a payload (the bytes between `$` and `#`).
    pub fn parse(payload: &[u8]) -> Result<Self, ProtoError> {
        let Some((&opcode, args)) = payload.split_first() else {
            return Ok(Self::Unsupported(Vec::new()));
        };

        Ok(match opcode {
            b'?' => Self::QueryStatus,
            b'g' => Self::ReadRegisters,
            b's' => Self::SingleStep,
            b'c' => Self::Continue,
            b'k' => Self::Kill,
            b'm' => parse_read_memory(args)?,
            _ => Self::Unsupported(payload.to_vec()),
        })
    }

    /// Payload bytes for this command.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::QueryStatus => b"?".to_vec(),
            Self::ReadRegisters => b"g".to_vec(),
            Self::SingleStep => b"s".to_vec(),
            Self::Continue => b"c".to_vec(),
            Self::Kill => b"k".to_vec(),
            Self::ReadMemory { addr, len } => format!("m{addr:x},{len:x}").into_bytes(),
            Self::Unsupported(raw) => raw.clone(),
        }
    }

    /// Wire form a client sends: an ack followed by the framed payload,
    /// e.g. `+$?#3f`.
    pub fn to_wire(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut out = Vec::with_capacity(payload.len() + 5);
        out.push(ACK);
        packet::encode_into(&payload, &mut out);
        out
    }

    /// Short stable name, used as a metrics label.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::QueryStatus => "status",
            Self::ReadRegisters => "read_registers",
            Self::SingleStep => "step",
            Self::Continue => "continue",
            Self::Kill => "kill",
            Self::ReadMemory { .. } => "read_memory",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

fn parse_read_memory(args: &[u8]) -> Result<Command, ProtoError> {
    let invalid = || ProtoError::InvalidMemoryArgs(String::from_utf8_lossy(args).into_owned());

    let comma = args.iter().position(|&b| b == b',').ok_or_else(invalid)?;
    let addr = hex::parse_u64(&args[..comma]).map_err(|_| invalid())?;
    let len = hex::parse_u64(&args[comma + 1..]).map_err(|_| invalid())?;
    Ok(Command::ReadMemory { addr, len })
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.payload()))
    }
}

impl FromStr for Command {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.trim().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_opcodes() {
        assert_eq!(Command::parse(b"?").unwrap(), Command::QueryStatus);
        assert_eq!(Command::parse(b"g").unwrap(), Command::ReadRegisters);
        assert_eq!(Command::parse(b"s").unwrap(), Command::SingleStep);
        assert_eq!(Command::parse(b"c").unwrap(), Command::Continue);
        assert_eq!(Command::parse(b"k").unwrap(), Command::Kill);
    }

    #[test]
    fn test_parse_ignores_trailing_arguments() {
        assert_eq!(Command::parse(b"s1000").unwrap(), Command::SingleStep);
        assert_eq!(Command::parse(b"c1000").unwrap(), Command::Continue);
    }

    #[test]
    fn test_parse_read_memory() {
        assert_eq!(
            Command::parse(b"m7c00,1A").unwrap(),
            Command::ReadMemory { addr: 0x7c00, len: 0x1a }
        );
    }

    #[test]
    fn test_parse_read_memory_malformed() {
        assert!(matches!(
            Command::parse(b"m7c00"),
            Err(ProtoError::InvalidMemoryArgs(_))
        ));
        assert!(matches!(
            Command::parse(b"mzz,4"),
            Err(ProtoError::InvalidMemoryArgs(_))
        ));
        assert!(matches!(
            Command::parse(b"m10,"),
            Err(ProtoError::InvalidMemoryArgs(_))
        ));
    }

    #[test]
    fn test_parse_unsupported() {
        assert_eq!(
            Command::parse(b"qSupported").unwrap(),
            Command::Unsupported(b"qSupported".to_vec())
        );
        assert_eq!(Command::parse(b"").unwrap(), Command::Unsupported(Vec::new()));
    }

    #[test]
    fn test_wire_forms() {
        assert_eq!(Command::QueryStatus.to_wire(), b"+$?#3f");
        assert_eq!(Command::ReadRegisters.to_wire(), b"+$g#67");
        assert_eq!(Command::SingleStep.to_wire(), b"+$s#73");
        assert_eq!(Command::Kill.to_wire(), b"+$k#6b");
    }

    #[test]
    fn test_from_str() {
        let cmd: Command = " m10,4 ".parse().unwrap();
        assert_eq!(cmd, Command::ReadMemory { addr: 0x10, len: 4 });
        assert_eq!(cmd.to_string(), "m10,4");
    }
}
