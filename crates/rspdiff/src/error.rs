use std::io;

use thiserror::Error;

/// Errors surfaced by servers, clients and the harness.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Protocol error: {0}")]
    Proto(#[from] rspdiff_proto::ProtoError),
    #[error("Target error: {0}")]
    Target(#[from] rspdiff_target::TargetError),
    #[error("Script line {line}: {message}")]
    Script { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) use rspdiff_proto::packet::is_disconnect;
