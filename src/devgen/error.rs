//! Generation-time errors. Any of these aborts the whole build.

use std::io;
use std::path::PathBuf;

pub type GenResult<T> = std::result::Result<T, GenError>;

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("{device}::{operation}: unsupported type '{ty}' ({reason})")]
    UnsupportedType {
        device: String,
        operation: String,
        ty: String,
        reason: String,
    },

    #[error("{device}::{operation} (line {line}): {reason}")]
    InvalidIsFailed {
        device: String,
        operation: String,
        line: usize,
        reason: String,
    },

    #[error("{device}::{operation} (line {line}): unknown pragma directive '{directive}'")]
    UnknownDirective {
        device: String,
        operation: String,
        line: usize,
        directive: String,
    },

    #[error("{device}::{operation} (line {line}): malformed {directive} annotation: {reason}")]
    MalformedDirective {
        device: String,
        operation: String,
        line: usize,
        directive: &'static str,
        reason: String,
    },

    #[error("{device}::{operation}: pointer argument '{argument}' requires a write_array annotation")]
    PointerArgument {
        device: String,
        operation: String,
        argument: String,
    },

    #[error("{device}::{operation}: {reason}")]
    Operation {
        device: String,
        operation: String,
        reason: String,
    },

    #[error("{origin}:{line}: {reason}")]
    Parse {
        origin: String,
        line: usize,
        reason: String,
    },

    #[error("device {0} declared more than once")]
    DuplicateDevice(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot render catalogue: {0}")]
    Catalogue(String),
}

impl GenError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GenError::Io {
            path: path.into(),
            source,
        }
    }
}
