//! Diff command.

use std::path::Path;
use std::time::Duration;

use rspdiff::{Exchange, Harness, HarnessConfig, Script};
use tracing::error;

use crate::cli::{EXIT_DIVERGED, EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal::{self, Spinner};

/// Handle the `diff` command.
pub fn cmd_diff(
    reference: &str,
    candidate: &str,
    script_path: Option<&Path>,
    config: HarnessConfig,
    read_timeout: Option<Duration>,
) -> i32 {
    let script = match script_path {
        Some(path) => match Script::load(path) {
            Ok(script) => script,
            Err(e) => {
                terminal::error(&format!("{}: {e}", path.display()));
                return EXIT_FAILURE;
            }
        },
        None => Script::default(),
    };

    let mut harness = match Harness::connect(reference, candidate, config, read_timeout) {
        Ok(harness) => harness,
        Err(e) => {
            error!(error = %e, reference, candidate, "failed to connect");
            return EXIT_FAILURE;
        }
    };
    terminal::info(&format!("reference {reference}, candidate {candidate}"));

    let spinner = Spinner::new("Comparing replies...");
    let mut count = 0usize;
    let result = harness.run_with(&script, |command, exchange| {
        count += 1;
        spinner.set_message(format!("[{count}] {command}"));
        if let Exchange::Diverged(divergence) = exchange {
            spinner.suspend(|| {
                terminal::warning(&format!(
                    "'{}' diverged at byte {}",
                    divergence.command, divergence.offset
                ));
                terminal::dim(&format!(
                    "reference: {}",
                    String::from_utf8_lossy(&divergence.reference)
                ));
                terminal::dim(&format!(
                    "candidate: {}",
                    String::from_utf8_lossy(&divergence.candidate)
                ));
            });
        }
    });

    match result {
        Ok(report) if report.is_clean() => {
            spinner.finish_with_success(&format!(
                "{} exchanges, no divergence",
                report.exchanges
            ));
            EXIT_SUCCESS
        }
        Ok(report) => {
            spinner.finish_with_failure(&format!(
                "{} exchanges, {} divergence(s)",
                report.exchanges,
                report.divergences.len()
            ));
            EXIT_DIVERGED
        }
        Err(e) => {
            spinner.finish_with_failure("comparison aborted");
            error!(error = %e, "harness failed");
            EXIT_FAILURE
        }
    }
}
