//! Command implementations.
//!
//! Each submodule handles a specific CLI command.

mod diff;
mod send;
mod serve;

use std::time::Duration;

use crate::cli::{Cli, Commands};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Serve { .. } => handle_serve(cli),
        Commands::Send { .. } => handle_send(cli),
        Commands::Diff { .. } => handle_diff(cli),
    }
}

fn handle_serve(cli: &Cli) -> i32 {
    let Commands::Serve {
        listen,
        target,
        library,
        symbol_prefix,
        verify_checksums,
        read_timeout_ms,
        max_memory_read,
    } = &cli.command
    else {
        unreachable!("serve command variant mismatch");
    };

    let config = rspdiff::ServerConfig::default()
        .with_verify_checksums(*verify_checksums)
        .with_read_timeout(timeout(*read_timeout_ms))
        .with_max_memory_read(*max_memory_read);

    serve::cmd_serve(listen, *target, library.as_deref(), symbol_prefix, config)
}

fn handle_send(cli: &Cli) -> i32 {
    let Commands::Send {
        connect,
        script,
        repeat,
        read_timeout_ms,
        commands,
    } = &cli.command
    else {
        unreachable!("send command variant mismatch");
    };

    send::cmd_send(
        connect,
        script.as_deref(),
        *repeat,
        commands,
        timeout(*read_timeout_ms),
    )
}

fn handle_diff(cli: &Cli) -> i32 {
    let Commands::Diff {
        reference,
        candidate,
        script,
        compare_prefix,
        max_iterations,
        read_timeout_ms,
    } = &cli.command
    else {
        unreachable!("diff command variant mismatch");
    };

    let config = rspdiff::HarnessConfig::default()
        .with_compare_prefix(*compare_prefix)
        .with_max_iterations(*max_iterations);

    diff::cmd_diff(
        reference,
        candidate,
        script.as_deref(),
        config,
        timeout(*read_timeout_ms),
    )
}

/// Convert a millisecond flag into an optional timeout (0 = none).
const fn timeout(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
