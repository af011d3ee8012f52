//! Serve command.

use std::path::Path;

use rspdiff::{Debuggee, NativeDebuggee, PatternDebuggee, ProtocolServer, ServerConfig, SessionEnd};
use tracing::{error, info, warn};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS, TargetArg};

/// Handle the `serve` command.
pub fn cmd_serve(
    listen: &str,
    target: TargetArg,
    library: Option<&Path>,
    symbol_prefix: &str,
    config: ServerConfig,
) -> i32 {
    let debuggee: Box<dyn Debuggee> = match target {
        TargetArg::Pattern => Box::new(PatternDebuggee::new()),
        TargetArg::Native => {
            let Some(path) = library else {
                error!("--target native requires --library");
                return EXIT_FAILURE;
            };
            match NativeDebuggee::load(path, symbol_prefix) {
                Ok(native) => Box::new(native),
                Err(e) => {
                    error!(error = %e, path = %path.display(), "failed to load debuggee");
                    return EXIT_FAILURE;
                }
            }
        }
    };

    let mut server = ProtocolServer::with_config(debuggee, config);
    match server.listen(listen) {
        Ok(SessionEnd::Killed) => {
            info!("session killed by client");
            EXIT_SUCCESS
        }
        Ok(SessionEnd::Closed) => {
            info!("client disconnected");
            EXIT_SUCCESS
        }
        Ok(SessionEnd::UnexpectedByte(byte)) => {
            warn!(byte = %format!("{byte:#04x}"), "session ended on unexpected byte");
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, addr = listen, "server failed");
            EXIT_FAILURE
        }
    }
}
