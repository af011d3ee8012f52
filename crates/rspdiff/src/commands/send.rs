//! Send command.

use std::path::Path;
use std::time::Duration;

use rspdiff::{Client, Command, Script};
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal;

/// Sequence sent when neither commands nor a script are given.
const DEFAULT_SEQUENCE: [Command; 5] = [
    Command::QueryStatus,
    Command::ReadRegisters,
    Command::SingleStep,
    Command::ReadRegisters,
    Command::Kill,
];

/// Handle the `send` command.
pub fn cmd_send(
    addr: &str,
    script: Option<&Path>,
    repeat: usize,
    commands: &[String],
    read_timeout: Option<Duration>,
) -> i32 {
    let commands = match collect_commands(script, repeat, commands) {
        Ok(commands) => commands,
        Err(message) => {
            terminal::error(&message);
            return EXIT_FAILURE;
        }
    };

    let mut client = match Client::connect(addr, read_timeout) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, addr, "failed to connect");
            return EXIT_FAILURE;
        }
    };
    terminal::info(&format!("connected to {addr}"));

    for command in &commands {
        let received = match client.transact(command) {
            Ok(received) => received,
            Err(e) => {
                error!(error = %e, command = %command, "exchange failed");
                return EXIT_FAILURE;
            }
        };

        println!("{}", String::from_utf8_lossy(received.bytes()));
        if received.is_closed() {
            terminal::dim("connection closed");
            break;
        }
    }

    EXIT_SUCCESS
}

fn collect_commands(
    script: Option<&Path>,
    repeat: usize,
    commands: &[String],
) -> Result<Vec<Command>, String> {
    if let Some(path) = script {
        let script = Script::load(path).map_err(|e| format!("{}: {e}", path.display()))?;
        return Ok(script.commands(repeat));
    }
    if commands.is_empty() {
        return Ok(DEFAULT_SEQUENCE.to_vec());
    }
    commands
        .iter()
        .map(|text| {
            text.parse::<Command>()
                .map_err(|e| format!("invalid command '{text}': {e}"))
        })
        .collect()
}
