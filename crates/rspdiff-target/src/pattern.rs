//! Deterministic in-process target.

use crate::{Debuggee, REGISTER_IMAGE_SIZE};

/// Byte offset of the instruction pointer inside the register image.
///
/// The image holds sixteen 4-byte slots (16-bit value, little endian, then
/// two zero bytes) in the order AX CX DX BX SP BP SI DI IP FL CS SS DS ES FS GS,
/// followed by zero padding.
const IP_OFFSET: usize = 8 * 4;

/// A target with no program behind it.
///
/// Registers start zeroed and the IP slot counts executed steps. Every byte of
/// a memory read equals `(addr % 10) * 0x11`, so the hex reply is the digit
/// `addr % 10` repeated.
#[derive(Debug, Clone)]
pub struct PatternDebuggee {
    image: Vec<u8>,
    steps: u64,
}

impl PatternDebuggee {
    pub fn new() -> Self {
        Self {
            image: vec![0; REGISTER_IMAGE_SIZE],
            steps: 0,
        }
    }

    /// Override one byte of the register image.
    ///
    /// Offsets at or past `REGISTER_IMAGE_SIZE` are ignored.
    #[must_use]
    pub fn with_image_byte(mut self, offset: usize, value: u8) -> Self {
        if let Some(byte) = self.image.get_mut(offset) {
            *byte = value;
        }
        self
    }

    /// Number of `step` calls so far.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    fn ip(&self) -> u16 {
        u16::from_le_bytes([self.image[IP_OFFSET], self.image[IP_OFFSET + 1]])
    }

    fn set_ip(&mut self, ip: u16) {
        self.image[IP_OFFSET..IP_OFFSET + 2].copy_from_slice(&ip.to_le_bytes());
    }
}

impl Default for PatternDebuggee {
    fn default() -> Self {
        Self::new()
    }
}

impl Debuggee for PatternDebuggee {
    fn step(&mut self) -> i32 {
        self.steps += 1;
        self.set_ip(self.ip().wrapping_add(1));
        0
    }

    fn resume(&mut self) -> i32 {
        // Nothing to run: the target halts immediately.
        0
    }

    fn read_registers(&mut self, buf: &mut [u8]) -> i32 {
        let len = buf.len().min(self.image.len());
        buf[..len].copy_from_slice(&self.image[..len]);
        buf[len..].fill(0);
        0
    }

    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> i32 {
        let digit = u8::try_from(addr % 10).unwrap_or_default();
        buf.fill(digit * 0x11);
        0
    }
}
