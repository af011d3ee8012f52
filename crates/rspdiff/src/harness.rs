//! Differential harness.
//!
//! Drives two servers in lockstep with the same command sequence and compares
//! the leading bytes of each pair of replies.

use std::fmt;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use rspdiff_proto::{Command, Received};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::Result;
use crate::metrics;
use crate::script::{Script, Step};

/// Reply bytes compared per exchange unless configured otherwise.
pub const DEFAULT_COMPARE_PREFIX: usize = 96;

/// Harness configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Number of leading reply bytes that must match.
    pub compare_prefix: usize,
    /// Iteration bound for repeat blocks without their own limit.
    pub max_iterations: Option<usize>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            compare_prefix: DEFAULT_COMPARE_PREFIX,
            max_iterations: None,
        }
    }
}

impl HarnessConfig {
    #[must_use]
    pub const fn with_compare_prefix(mut self, prefix: usize) -> Self {
        self.compare_prefix = prefix;
        self
    }

    #[must_use]
    pub const fn with_max_iterations(mut self, max: Option<usize>) -> Self {
        self.max_iterations = max;
        self
    }
}

/// A pair of replies whose compared prefixes differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    /// Command text as sent (payload only).
    pub command: String,
    /// First differing byte offset within the compared prefixes.
    pub offset: usize,
    /// Reference reply, truncated to the compared prefix.
    pub reference: Vec<u8>,
    /// Candidate reply, truncated to the compared prefix.
    pub candidate: Vec<u8>,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "command '{}' diverged at byte {}",
            self.command, self.offset
        )?;
        writeln!(
            f,
            "  reference: {}",
            String::from_utf8_lossy(&self.reference)
        )?;
        write!(
            f,
            "  candidate: {}",
            String::from_utf8_lossy(&self.candidate)
        )
    }
}

/// Outcome of sending one command to both servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// Prefixes matched; holds the reference reply.
    Matched { reply: Received },
    /// Prefixes matched and a connection closed.
    Closed { reply: Received },
    Diverged(Divergence),
}

impl Exchange {
    pub const fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged(_))
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }
}

/// Summary of a script run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Commands sent to both servers.
    pub exchanges: usize,
    pub divergences: Vec<Divergence>,
    /// Whether the run stopped because a connection closed.
    pub closed: bool,
}

impl RunReport {
    pub const fn is_clean(&self) -> bool {
        self.divergences.is_empty()
    }
}

/// Offset of the first byte at which `a` and `b` differ within `prefix`.
///
/// A prefix that ends early on one side differs at its length.
pub fn first_difference(a: &[u8], b: &[u8], prefix: usize) -> Option<usize> {
    let a = &a[..a.len().min(prefix)];
    let b = &b[..b.len().min(prefix)];
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then_some(a.len().min(b.len())))
}

/// Lockstep driver for a reference and a candidate server.
pub struct Harness<S: Read + Write> {
    reference: Client<S>,
    candidate: Client<S>,
    config: HarnessConfig,
}

impl Harness<TcpStream> {
    /// Connect to both servers.
    pub fn connect(
        reference: &str,
        candidate: &str,
        config: HarnessConfig,
        read_timeout: Option<Duration>,
    ) -> Result<Self> {
        let reference = Client::connect(reference, read_timeout)?;
        let candidate = Client::connect(candidate, read_timeout)?;
        Ok(Self::new(reference, candidate, config))
    }
}

impl<S: Read + Write> Harness<S> {
    pub const fn new(reference: Client<S>, candidate: Client<S>, config: HarnessConfig) -> Self {
        Self {
            reference,
            candidate,
            config,
        }
    }

    /// Send `wire` to the reference, then the candidate, and compare replies.
    pub fn send_and_receive_pair(&mut self, wire: &[u8]) -> Result<Exchange> {
        let reference = self.reference.send_and_receive(wire)?;
        let candidate = self.candidate.send_and_receive(wire)?;

        let prefix = self.config.compare_prefix;
        let exchange = match first_difference(reference.bytes(), candidate.bytes(), prefix) {
            Some(offset) => {
                let truncate = |bytes: &[u8]| bytes[..bytes.len().min(prefix)].to_vec();
                Exchange::Diverged(Divergence {
                    command: describe(wire),
                    offset,
                    reference: truncate(reference.bytes()),
                    candidate: truncate(candidate.bytes()),
                })
            }
            None if reference.is_closed() || candidate.is_closed() => {
                Exchange::Closed { reply: reference }
            }
            None => Exchange::Matched { reply: reference },
        };

        metrics::record_exchange(exchange.is_diverged());
        if let Exchange::Diverged(divergence) = &exchange {
            warn!(
                command = %divergence.command,
                offset = divergence.offset,
                reference = %String::from_utf8_lossy(&divergence.reference),
                candidate = %String::from_utf8_lossy(&divergence.candidate),
                "replies diverged"
            );
        }
        Ok(exchange)
    }

    /// Send a command in its canonical wire form to both servers.
    pub fn exchange(&mut self, command: &Command) -> Result<Exchange> {
        self.send_and_receive_pair(&command.to_wire())
    }

    /// Run a script to completion.
    pub fn run(&mut self, script: &Script) -> Result<RunReport> {
        self.run_with(script, |_, _| {})
    }

    /// Run a script, calling `observe` after every exchange.
    ///
    /// A divergence inside a repeat block ends that block; a divergence at
    /// the top level is recorded and the run continues. A closed connection
    /// ends the run.
    pub fn run_with<F>(&mut self, script: &Script, mut observe: F) -> Result<RunReport>
    where
        F: FnMut(&Command, &Exchange),
    {
        let mut report = RunReport::default();

        for step in script.steps() {
            if report.closed {
                break;
            }
            match step {
                Step::Send(command) => {
                    self.step(command, &mut report, &mut observe)?;
                }
                Step::Repeat { body, limit } => {
                    let limit = limit.or(self.config.max_iterations);
                    let mut iteration = 0usize;
                    'repeat: while limit.is_none_or(|limit| iteration < limit) {
                        for command in body {
                            if self.step(command, &mut report, &mut observe)? {
                                break 'repeat;
                            }
                        }
                        iteration += 1;
                    }
                    debug!(iterations = iteration, "repeat block finished");
                }
            }
        }

        info!(
            exchanges = report.exchanges,
            divergences = report.divergences.len(),
            closed = report.closed,
            "script finished"
        );
        Ok(report)
    }

    /// Perform one exchange and fold it into `report`.
    ///
    /// Returns true when the enclosing repeat block must stop.
    fn step<F>(
        &mut self,
        command: &Command,
        report: &mut RunReport,
        observe: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(&Command, &Exchange),
    {
        let exchange = self.exchange(command)?;
        report.exchanges += 1;
        observe(command, &exchange);

        Ok(match exchange {
            Exchange::Matched { .. } => false,
            Exchange::Closed { .. } => {
                report.closed = true;
                true
            }
            Exchange::Diverged(divergence) => {
                report.divergences.push(divergence);
                true
            }
        })
    }
}

/// Payload text of a framed request, for reports.
fn describe(wire: &[u8]) -> String {
    let start = wire.iter().position(|&b| b == b'$').map_or(0, |i| i + 1);
    let end = wire.iter().rposition(|&b| b == b'#').unwrap_or(wire.len());
    if start <= end {
        String::from_utf8_lossy(&wire[start..end]).into_owned()
    } else {
        String::from_utf8_lossy(wire).into_owned()
    }
}
