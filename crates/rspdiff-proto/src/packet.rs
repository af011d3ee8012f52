//! Packet framing and checksums.
//!
//! A framed packet is `$<payload>#<hh>` where `<hh>` is the modulo-256 sum of
//! the payload bytes as two lowercase hex digits. Acknowledgments are a bare
//! `+` (or `-` to request retransmission).

use std::io::{self, BufRead};

use crate::ProtoError;
use crate::hex;

/// Positive acknowledgment.
pub const ACK: u8 = b'+';
/// Negative acknowledgment (retransmission request).
pub const NACK: u8 = b'-';
/// Start of a framed packet.
pub const PACKET_START: u8 = b'$';
/// End of a framed packet's payload; two checksum digits follow.
pub const PACKET_END: u8 = b'#';

/// Modulo-256 sum of the payload bytes.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Checksum rendered as two lowercase hex digits.
pub fn checksum_hex(payload: &[u8]) -> [u8; 2] {
    hex::byte_to_hex(checksum(payload))
}

/// Frame a payload as `$<payload>#<hh>`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    encode_into(payload, &mut out);
    out
}

/// Append the framed form of `payload` to `out`.
pub fn encode_into(payload: &[u8], out: &mut Vec<u8>) {
    out.push(PACKET_START);
    out.extend_from_slice(payload);
    out.push(PACKET_END);
    out.extend_from_slice(&checksum_hex(payload));
}

/// True once a `#` is followed by exactly two trailing bytes.
///
/// The rule is positional: the checksum digits are not inspected.
pub fn is_complete(accumulated: &[u8]) -> bool {
    accumulated.len() >= 3 && accumulated[accumulated.len() - 3] == PACKET_END
}

/// Outcome of reading one packet from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A complete packet, including any ack bytes that preceded the frame.
    Packet(Vec<u8>),
    /// The stream closed first; holds whatever had been accumulated.
    Closed(Vec<u8>),
}

impl Received {
    /// Raw bytes received, complete or not.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Packet(bytes) | Self::Closed(bytes) => bytes,
        }
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// I/O errors that mean the peer went away.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

/// Accumulate bytes from `reader` until a packet is complete.
///
/// Only the bytes up to and including the second checksum digit are consumed,
/// so chunked and byte-at-a-time delivery produce the same packet and any
/// bytes that follow stay buffered for the next call. A reset or abort
/// counts as a close and keeps the bytes accumulated so far.
pub fn decode_stream<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<Received> {
    let mut packet = Vec::new();
    loop {
        let available = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_disconnect(&e) => return Ok(Received::Closed(packet)),
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok(Received::Closed(packet));
        }

        let mut used = 0;
        let mut complete = false;
        for &byte in available {
            packet.push(byte);
            used += 1;
            if is_complete(&packet) {
                complete = true;
                break;
            }
        }
        reader.consume(used);

        if complete {
            return Ok(Received::Packet(packet));
        }
    }
}

/// A framed packet split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Number of `+` bytes preceding the `$`.
    pub acks: usize,
    /// Bytes between `$` and `#`.
    pub payload: Vec<u8>,
    /// Checksum as transmitted.
    pub checksum: u8,
}

impl Frame {
    /// Split raw packet bytes such as `+$S05#b8`.
    pub fn parse(raw: &[u8]) -> Result<Self, ProtoError> {
        let acks = raw.iter().take_while(|&&b| b == ACK).count();
        let rest = &raw[acks..];

        match rest.first() {
            Some(&PACKET_START) => {}
            Some(&other) => return Err(ProtoError::MissingStart(other)),
            None => return Err(ProtoError::Truncated(raw.len())),
        }
        if rest.len() < 4 {
            return Err(ProtoError::Truncated(raw.len()));
        }

        let end = rest.len() - 3;
        if rest[end] != PACKET_END {
            return Err(ProtoError::MissingEnd);
        }

        let digits = &rest[end + 1..];
        let checksum = match (hex::digit_value(digits[0]), hex::digit_value(digits[1])) {
            (Some(hi), Some(lo)) => (hi << 4) | lo,
            _ => {
                return Err(ProtoError::InvalidChecksumDigits(
                    String::from_utf8_lossy(digits).into_owned(),
                ));
            }
        };

        Ok(Self {
            acks,
            payload: rest[1..end].to_vec(),
            checksum,
        })
    }

    /// Whether the transmitted checksum matches the payload.
    pub fn is_valid(&self) -> bool {
        checksum(&self.payload) == self.checksum
    }

    /// Recomputed checksum of the payload.
    pub fn expected_checksum(&self) -> u8 {
        checksum(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Read};

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Reader that hands out `data` and then fails with `error`.
    struct FailAfter {
        data: Vec<u8>,
        error: io::ErrorKind,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.is_empty() {
                return Err(self.error.into());
            }
            let n = buf.len().min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data.drain(..n);
            Ok(n)
        }
    }

    #[test]
    fn test_checksum_status_query() {
        assert_eq!(checksum(b"?"), 0x3f);
        assert_eq!(&checksum_hex(b"?"), b"3f");
        assert_eq!(encode(b"?"), b"$?#3f");
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(encode(b"S05"), b"$S05#b8");
        assert_eq!(checksum(&[0xff, 0x02]), 0x01);
        assert_eq!(encode(b""), b"$#00");
    }

    #[test]
    fn test_decode_bulk() {
        let mut reader = Cursor::new(b"+$S05#b8".to_vec());
        let received = decode_stream(&mut reader).unwrap();
        assert_eq!(received, Received::Packet(b"+$S05#b8".to_vec()));
    }

    #[test]
    fn test_decode_single_byte_matches_bulk() {
        let wire = b"+$0011223344#aa";
        let bulk = decode_stream(&mut Cursor::new(wire.to_vec())).unwrap();
        for chunk in 1..wire.len() {
            let mut reader = BufReader::with_capacity(chunk, Trickle { data: wire, chunk });
            assert_eq!(decode_stream(&mut reader).unwrap(), bulk, "chunk size {chunk}");
        }
    }

    #[test]
    fn test_decode_leaves_following_bytes() {
        let mut reader = Cursor::new(b"$g#67$s#73".to_vec());
        assert_eq!(
            decode_stream(&mut reader).unwrap(),
            Received::Packet(b"$g#67".to_vec())
        );
        assert_eq!(
            decode_stream(&mut reader).unwrap(),
            Received::Packet(b"$s#73".to_vec())
        );
        assert_eq!(decode_stream(&mut reader).unwrap(), Received::Closed(Vec::new()));
    }

    #[test]
    fn test_decode_closed_before_complete() {
        let mut reader = Cursor::new(b"+$S05#b".to_vec());
        let received = decode_stream(&mut reader).unwrap();
        assert!(received.is_closed());
        assert_eq!(received.bytes(), b"+$S05#b");
    }

    #[test]
    fn test_decode_ack_only_then_close() {
        let mut reader = Cursor::new(b"+".to_vec());
        assert_eq!(decode_stream(&mut reader).unwrap(), Received::Closed(b"+".to_vec()));
    }

    #[test]
    fn test_decode_reset_keeps_partial() {
        let mut reader = BufReader::new(FailAfter {
            data: b"+".to_vec(),
            error: io::ErrorKind::ConnectionReset,
        });
        assert_eq!(decode_stream(&mut reader).unwrap(), Received::Closed(b"+".to_vec()));

        let mut reader = BufReader::new(FailAfter {
            data: b"+$S0".to_vec(),
            error: io::ErrorKind::ConnectionAborted,
        });
        assert_eq!(decode_stream(&mut reader).unwrap(), Received::Closed(b"+$S0".to_vec()));
    }

    #[test]
    fn test_decode_other_errors_propagate() {
        let mut reader = BufReader::new(FailAfter {
            data: b"+$".to_vec(),
            error: io::ErrorKind::TimedOut,
        });
        let err = decode_stream(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_frame_parse() {
        let frame = Frame::parse(b"+$S05#b8").unwrap();
        assert_eq!(frame.acks, 1);
        assert_eq!(frame.payload, b"S05");
        assert_eq!(frame.checksum, 0xb8);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_detects_corruption() {
        let frame = Frame::parse(b"$S06#b8").unwrap();
        assert!(!frame.is_valid());
        assert_eq!(frame.expected_checksum(), 0xb9);
    }

    #[test]
    fn test_frame_round_trip() {
        for payload in [&b""[..], b"?", b"m1000,4", b"S05"] {
            let frame = Frame::parse(&encode(payload)).unwrap();
            assert_eq!(frame.payload, payload);
            assert!(frame.is_valid());
        }
    }

    #[test]
    fn test_frame_errors() {
        assert!(matches!(Frame::parse(b"+"), Err(ProtoError::Truncated(1))));
        assert!(matches!(Frame::parse(b"x$?#3f"), Err(ProtoError::MissingStart(b'x'))));
        assert!(matches!(Frame::parse(b"$?3f0"), Err(ProtoError::MissingEnd)));
        assert!(matches!(
            Frame::parse(b"$?#zz"),
            Err(ProtoError::InvalidChecksumDigits(_))
        ));
    }
}
