//! The typed error hierarchy shared by every decoder and format driver.
//!
//! Every failure mode a driver can produce is represented here rather than via panics or
//! untyped `io::Error`s, so that callers can decide whether to skip a frame, open a new output
//! stream, or abort entirely.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::io;

/// Failure modes produced by the decoding pipeline.
#[derive(Debug)]
pub enum Error {
    /// Ran out of input while reading a fixed structure.
    UnexpectedEof,
    /// A magic value did not match at a position where one was required.
    BadMagic {
        expected: String,
        found: String,
    },
    /// A frame or record was internally inconsistent (bad size, unknown opcode, terminator
    /// reached early).
    CorruptFrame(String),
    /// The segment expander observed an absolute position earlier than the current output
    /// cursor.
    OutOfSync { expected: u64, found: u64 },
    /// The underlying source or sink failed.
    Io(io::Error),
    /// Non-fatal: name too long, file exists, magic of a well-known extension did not match,
    /// unrecognized block type. Drivers log these and continue.
    PolicyWarning(String),
}

impl StdError for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedEof => f.write_str("unexpected end of input"),
            Error::BadMagic { expected, found } => {
                write!(f, "bad magic: expected {expected}, found {found}")
            }
            Error::CorruptFrame(msg) => write!(f, "corrupt frame: {msg}"),
            Error::OutOfSync { expected, found } => write!(
                f,
                "out of sync: expected absolute position >= {expected}, found {found}"
            ),
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::PolicyWarning(msg) => write!(f, "warning: {msg}"),
        }
    }
}

impl Error {
    /// True for failures that a driver should treat as non-fatal and simply log.
    pub fn is_warning(&self) -> bool {
        matches!(self, Error::PolicyWarning(_))
    }

    /// True for failures that should abandon only the current frame, not the whole input.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Error::CorruptFrame(_) | Error::PolicyWarning(_))
    }

    pub fn corrupt(msg: impl Into<String>) -> Error {
        Error::CorruptFrame(msg.into())
    }

    pub fn bad_magic(expected: impl Into<String>, found: impl Into<String>) -> Error {
        Error::BadMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn warning(msg: impl Into<String>) -> Error {
        Error::PolicyWarning(msg.into())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(err),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, err.to_string()),
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

/// Result type for tapehoard-core.
pub type Result<T> = std::result::Result<T, Error>;
