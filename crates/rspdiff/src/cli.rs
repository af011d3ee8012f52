//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rspdiff::{DEFAULT_COMPARE_PREFIX, DEFAULT_MAX_MEMORY_READ, DEFAULT_SYMBOL_PREFIX};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when the differential run found divergences.
pub const EXIT_DIVERGED: i32 = 2;

#[derive(Parser)]
#[command(name = "rspdiff")]
#[command(about = "Remote serial protocol server and differential tester")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve a debuggee to one client
    Serve {
        /// Listen address (host:port, or :port for localhost)
        #[arg(short, long, default_value = ":1234")]
        listen: String,

        /// Debuggee backend
        #[arg(long, value_enum, default_value = "pattern")]
        target: TargetArg,

        /// Shared library implementing the native debuggee API
        #[arg(long, required_if_eq("target", "native"))]
        library: Option<PathBuf>,

        /// Symbol prefix of the native debuggee API
        #[arg(long, default_value = DEFAULT_SYMBOL_PREFIX)]
        symbol_prefix: String,

        /// Reject packets with a bad checksum
        #[arg(long)]
        verify_checksums: bool,

        /// Read timeout in milliseconds (0 = none)
        #[arg(long, default_value = "0")]
        read_timeout_ms: u64,

        /// Largest memory read served, in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_MEMORY_READ)]
        max_memory_read: u64,
    },

    /// Send commands to one server and print the replies
    Send {
        /// Server address (host:port, or :port for localhost)
        #[arg(short, long, default_value = ":1234")]
        connect: String,

        /// Script file to send instead of COMMANDs
        #[arg(long, conflicts_with = "commands")]
        script: Option<PathBuf>,

        /// Iterations for repeat blocks without a count
        #[arg(long, default_value = "1")]
        repeat: usize,

        /// Read timeout in milliseconds (0 = none)
        #[arg(long, default_value = "0")]
        read_timeout_ms: u64,

        /// Commands to send (e.g. '?', g, s, m7c00,10, k)
        #[arg(value_name = "COMMAND")]
        commands: Vec<String>,
    },

    /// Run a script against two servers and report divergent replies
    Diff {
        /// Reference server address
        #[arg(long)]
        reference: String,

        /// Candidate server address
        #[arg(long)]
        candidate: String,

        /// Script file (default: '?', then g/s until divergence, then k)
        #[arg(long)]
        script: Option<PathBuf>,

        /// Number of leading reply bytes that must match
        #[arg(long, default_value_t = DEFAULT_COMPARE_PREFIX)]
        compare_prefix: usize,

        /// Bound for repeat blocks without a count
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Read timeout in milliseconds (0 = none)
        #[arg(long, default_value = "0")]
        read_timeout_ms: u64,
    },
}

/// Debuggee backend.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum TargetArg {
    /// Built-in deterministic target
    #[default]
    Pattern,
    /// Shared library loaded at runtime
    Native,
}
