//! ASCII hex helpers used by replies and command arguments.

use crate::ProtoError;

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Value of a single ASCII hex digit (either case).
pub const fn digit_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Two lowercase hex digits for one byte.
pub const fn byte_to_hex(byte: u8) -> [u8; 2] {
    [DIGITS[(byte >> 4) as usize], DIGITS[(byte & 0x0f) as usize]]
}

/// Encode bytes as lowercase ASCII hex, two characters per byte.
pub fn encode(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.extend_from_slice(&byte_to_hex(b));
    }
    out
}

/// Decode ASCII hex into bytes. The input length must be even.
pub fn decode(text: &[u8]) -> Result<Vec<u8>, ProtoError> {
    if text.len() % 2 != 0 {
        return Err(ProtoError::OddHexLength(text.len()));
    }
    text.chunks_exact(2)
        .map(|pair| match (digit_value(pair[0]), digit_value(pair[1])) {
            (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
            _ => Err(ProtoError::InvalidHex(
                String::from_utf8_lossy(pair).into_owned(),
            )),
        })
        .collect()
}

/// Parse a hex integer without prefix (`"1a2b"`).
pub fn parse_u64(text: &[u8]) -> Result<u64, ProtoError> {
    if text.is_empty() || text.len() > 16 {
        return Err(ProtoError::InvalidHex(
            String::from_utf8_lossy(text).into_owned(),
        ));
    }
    text.iter().try_fold(0u64, |acc, &c| {
        digit_value(c)
            .map(|d| (acc << 4) | u64::from(d))
            .ok_or_else(|| ProtoError::InvalidHex(String::from_utf8_lossy(text).into_owned()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_lowercase() {
        assert_eq!(encode(&[0x00, 0xab, 0x7f]), b"00ab7f");
    }

    #[test]
    fn test_decode_mixed_case() {
        assert_eq!(decode(b"00AbFf").unwrap(), vec![0x00, 0xab, 0xff]);
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        assert!(matches!(decode(b"abc"), Err(ProtoError::OddHexLength(3))));
    }

    #[test]
    fn test_decode_rejects_non_hex() {
        assert!(matches!(decode(b"zz"), Err(ProtoError::InvalidHex(_))));
    }

    #[test]
    fn test_parse_u64() {
        assert_eq!(parse_u64(b"1000").unwrap(), 0x1000);
        assert_eq!(parse_u64(b"FfFf").unwrap(), 0xffff);
        assert!(parse_u64(b"").is_err());
        assert!(parse_u64(b"12g4").is_err());
        assert!(parse_u64(b"11112222333344445").is_err());
    }
}
