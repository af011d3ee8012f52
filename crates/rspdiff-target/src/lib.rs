//! Debuggee contract.
//!
//! The protocol server never looks inside the target it controls; it only
//! needs the operations below. Construction of a `Debuggee` plays the role of
//! initialization, and the value is owned by exactly one session.
//!
//! Two backends are provided:
//! - [`PatternDebuggee`]: deterministic in-process target for tests and demos.
//! - [`NativeDebuggee`]: a shared library loaded at runtime.

mod native;
mod pattern;

pub use native::{DEFAULT_SYMBOL_PREFIX, NativeDebuggee};
pub use pattern::PatternDebuggee;

use thiserror::Error;

/// Number of hex characters in a register reply (`8 * 16 + 560`).
pub const REGISTER_IMAGE_HEX_LEN: usize = 8 * 16 + 560;

/// Size of the raw register image in bytes.
pub const REGISTER_IMAGE_SIZE: usize = REGISTER_IMAGE_HEX_LEN / 2;

/// Operations a target must support to be served.
///
/// Result codes are opaque to the protocol layer and only logged.
pub trait Debuggee {
    /// Execute one instruction.
    fn step(&mut self) -> i32;

    /// Run until the target stops on its own.
    fn resume(&mut self) -> i32;

    /// Fill `buf` (`REGISTER_IMAGE_SIZE` bytes) with the register image.
    fn read_registers(&mut self, buf: &mut [u8]) -> i32;

    /// Fill `buf` with memory starting at `addr`.
    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> i32;
}

impl<T: Debuggee + ?Sized> Debuggee for Box<T> {
    fn step(&mut self) -> i32 {
        (**self).step()
    }

    fn resume(&mut self) -> i32 {
        (**self).resume()
    }

    fn read_registers(&mut self, buf: &mut [u8]) -> i32 {
        (**self).read_registers(buf)
    }

    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> i32 {
        (**self).read_memory(addr, buf)
    }
}

/// Target loading errors.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("failed to load library: {0}")]
    LoadError(#[from] libloading::Error),

    #[error("shared library not found: {0}")]
    LibraryNotFound(String),

    #[error("failed to find symbol '{0}': {1}")]
    SymbolNotFound(String, libloading::Error),

    #[error("target initialization returned null ({0})")]
    InitFailed(String),
}
