//! rspdiff - remote serial protocol endpoint and differential tester
//!
//! Serves a [`Debuggee`] over a minimal GDB remote serial protocol subset
//! (`?`, `g`, `s`, `c`, `k`, `m`) and drives two such servers in lockstep to
//! find the first command where their replies differ.
//!
//! # Example
//!
//! ```no_run
//! use rspdiff::{Harness, HarnessConfig, Script};
//!
//! let mut harness = Harness::connect(":1234", ":1235", HarnessConfig::default(), None)?;
//! let report = harness.run(&Script::default())?;
//! for divergence in &report.divergences {
//!     println!("{divergence}");
//! }
//! # Ok::<(), rspdiff::Error>(())
//! ```

// Re-export from sub-crates
pub use rspdiff_proto::{Command, Frame, ProtoError, Received, Reply, packet};
pub use rspdiff_target::{
    DEFAULT_SYMBOL_PREFIX, Debuggee, NativeDebuggee, PatternDebuggee, REGISTER_IMAGE_HEX_LEN,
    REGISTER_IMAGE_SIZE, TargetError,
};

mod client;
mod error;
mod harness;
pub mod metrics;
mod script;
mod server;

pub use client::Client;
pub use error::{Error, Result};
pub use harness::{
    DEFAULT_COMPARE_PREFIX, Divergence, Exchange, Harness, HarnessConfig, RunReport,
    first_difference,
};
pub use script::{Script, Step};
pub use server::{DEFAULT_MAX_MEMORY_READ, ProtocolServer, ServerConfig, SessionEnd};
