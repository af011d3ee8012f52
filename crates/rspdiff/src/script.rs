//! Command scripts for the differential harness.
//!
//! Text format, one entry per line:
//!
//! ```text
//! # comments start with '#'
//! ?
//! repeat 100      # or just `repeat` for "until divergence"
//!   g
//!   s
//! end
//! m7c00,10
//! k
//! ```

use std::path::Path;

use rspdiff_proto::Command;

use crate::error::{Error, Result};

/// One entry of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send a single command.
    Send(Command),
    /// Send `body` repeatedly, at most `limit` times when given.
    Repeat {
        body: Vec<Command>,
        limit: Option<usize>,
    },
}

/// An ordered command sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    steps: Vec<Step>,
}

impl Script {
    pub const fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// A straight-line script with no repeats.
    pub fn from_commands(commands: impl IntoIterator<Item = Command>) -> Self {
        Self::new(commands.into_iter().map(Step::Send).collect())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Read a script file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse the text format described in the module docs.
    pub fn parse(text: &str) -> Result<Self> {
        let mut steps = Vec::new();
        // (line number, body, limit) of the open repeat block
        let mut open: Option<(usize, Vec<Command>, Option<usize>)> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let mut words = line.split_whitespace();
            match words.next() {
                Some("repeat") => {
                    if open.is_some() {
                        return Err(script_error(line_no, "nested repeat blocks are not supported"));
                    }
                    let limit = match words.next() {
                        None => None,
                        Some(n) => Some(n.parse::<usize>().map_err(|_| {
                            script_error(line_no, &format!("invalid repeat count {n:?}"))
                        })?),
                    };
                    if words.next().is_some() {
                        return Err(script_error(line_no, "unexpected text after repeat count"));
                    }
                    open = Some((line_no, Vec::new(), limit));
                }
                Some("end") => match open.take() {
                    Some((start, body, limit)) => {
                        if body.is_empty() {
                            return Err(script_error(start, "empty repeat block"));
                        }
                        steps.push(Step::Repeat { body, limit });
                    }
                    None => return Err(script_error(line_no, "'end' without 'repeat'")),
                },
                _ => {
                    let command = line
                        .parse::<Command>()
                        .map_err(|e| script_error(line_no, &e.to_string()))?;
                    match open.as_mut() {
                        Some((_, body, _)) => body.push(command),
                        None => steps.push(Step::Send(command)),
                    }
                }
            }
        }

        if let Some((start, _, _)) = open {
            return Err(script_error(start, "repeat block is never closed"));
        }
        Ok(Self::new(steps))
    }

    /// Flatten into a command list, running each repeat `limit` times or
    /// `default_limit` times when it has none.
    pub fn commands(&self, default_limit: usize) -> Vec<Command> {
        let mut out = Vec::new();
        for step in &self.steps {
            match step {
                Step::Send(command) => out.push(command.clone()),
                Step::Repeat { body, limit } => {
                    for _ in 0..limit.unwrap_or(default_limit) {
                        out.extend(body.iter().cloned());
                    }
                }
            }
        }
        out
    }
}

impl Default for Script {
    /// Status query, then `g`/`s` pairs until the targets diverge, then kill.
    fn default() -> Self {
        Self::new(vec![
            Step::Send(Command::QueryStatus),
            Step::Repeat {
                body: vec![Command::ReadRegisters, Command::SingleStep],
                limit: None,
            },
            Step::Send(Command::Kill),
        ])
    }
}

fn script_error(line: usize, message: &str) -> Error {
    Error::Script {
        line,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_default_equivalent() {
        let script = Script::parse("?\nrepeat\n  g\n  s\nend\nk\n").unwrap();
        assert_eq!(script, Script::default());
    }

    #[test]
    fn test_parse_comments_and_limits() {
        let text = "# probe\n?   # status\nrepeat 3\ng\nend\nm10,4\n";
        let script = Script::parse(text).unwrap();
        assert_eq!(
            script.steps(),
            &[
                Step::Send(Command::QueryStatus),
                Step::Repeat {
                    body: vec![Command::ReadRegisters],
                    limit: Some(3),
                },
                Step::Send(Command::ReadMemory { addr: 0x10, len: 4 }),
            ]
        );
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = Script::parse("?\nend\n").unwrap_err();
        assert!(matches!(err, Error::Script { line: 2, .. }));

        let err = Script::parse("repeat\ng\n").unwrap_err();
        assert!(matches!(err, Error::Script { line: 1, .. }));

        let err = Script::parse("repeat x\ng\nend\n").unwrap_err();
        assert!(matches!(err, Error::Script { line: 1, .. }));

        let err = Script::parse("?\nm12\n").unwrap_err();
        assert!(matches!(err, Error::Script { line: 2, .. }));

        let err = Script::parse("repeat\nrepeat\n").unwrap_err();
        assert!(matches!(err, Error::Script { line: 2, .. }));
    }

    #[test]
    fn test_commands_expands_repeats() {
        let script = Script::default();
        let commands = script.commands(2);
        assert_eq!(
            commands,
            vec![
                Command::QueryStatus,
                Command::ReadRegisters,
                Command::SingleStep,
                Command::ReadRegisters,
                Command::SingleStep,
                Command::Kill,
            ]
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "?\ng\nk").unwrap();
        let script = Script::load(file.path()).unwrap();
        assert_eq!(
            script,
            Script::from_commands([Command::QueryStatus, Command::ReadRegisters, Command::Kill])
        );
    }
}
