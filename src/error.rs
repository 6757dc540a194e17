//! The error type returned by this crate.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// The kind of error encountered while building an unwind table.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A `STACK CFI` line did not match any of the four known grammars, or one
    /// of its hexadecimal fields could not be parsed.
    MalformedLine {
        /// The offending line, verbatim.
        line: String,
    },

    /// A non-`INIT` record was seen before any `INIT` record, or a function
    /// record was assembled with no address CFI at all.
    StructuralError {
        /// A short description of what was expected instead.
        detail: &'static str,
    },

    /// A byte value fell outside `[0, 255]`, a negative value was given to the
    /// ULEB128 encoder, or an SP offset was outside `[-0x204, +inf)` or not a
    /// multiple of 4.
    EncodingRange {
        /// A short description of the value and the bound it violated.
        detail: String,
    },

    /// A register pop referenced a register outside `[4, 15]`, or the pop set
    /// was empty.
    RegisterDomain {
        /// The offending register, if the problem was a specific register
        /// rather than an empty set.
        register: Option<u8>,
    },

    /// An internal invariant (§3 of the specification) was violated.
    Invariant {
        /// A short description of the invariant that was violated.
        detail: &'static str,
    },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLine { line } => {
                write!(f, "malformed CFI line: {line}")
            }
            Self::StructuralError { detail } => write!(f, "structural error: {detail}"),
            Self::EncodingRange { detail } => write!(f, "value out of encodable range: {detail}"),
            Self::RegisterDomain { register: Some(r) } => {
                write!(f, "register r{r} is outside the poppable range [4, 15]")
            }
            Self::RegisterDomain { register: None } => write!(f, "empty register pop set"),
            Self::Invariant { detail } => write!(f, "invariant violated: {detail}"),
        }
    }
}

/// An error returned while translating CFI records into an unwind table.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    pub(crate) fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }
}

/// A convenience alias for results returned by this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
