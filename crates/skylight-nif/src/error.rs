//! Error types for the bridge

use std::os::raw::c_int;

use crate::loader::LoadError;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Hard failures surfaced to the immediate caller.
///
/// Soft failures (a native start/stop/setter returning nonzero) are not
/// errors; they come back as [`Status::Error`].
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The function table has not been populated by a successful load
    #[error("libskylight not loaded")]
    NotLoaded,

    /// An input had the wrong type or shape; detected before any native call
    #[error("Argument error: {0}")]
    InvalidArgument(String),

    /// `instrumenter_new` was handed 256 or more env entries
    #[error("env array has {count} elements, at most {max} are allowed")]
    TooManyEnvPairs {
        /// Number of entries supplied
        count: usize,
        /// Largest accepted count
        max: usize,
    },

    /// A native function returned a nonzero status where one was not allowed
    #[error("call to native function {function} failed with status {code}")]
    NativeCallFailed {
        /// libskylight symbol that failed
        function: &'static str,
        /// Raw status returned
        code: c_int,
    },

    /// `sky_lex_sql` returned a negative status
    #[error("lex_sql failed with status {0}")]
    LexFailed(c_int),

    /// The trace was already handed to an instrumenter
    #[error("trace has already been submitted")]
    TraceSubmitted,

    /// Opening the library or resolving a symbol failed
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl BridgeError {
    /// Shape mismatch on a positional argument
    pub(crate) fn bad_arg(index: usize, msg: impl std::fmt::Display) -> Self {
        BridgeError::InvalidArgument(format!("argument {}: {}", index, msg))
    }

    /// True for errors that mean "load the library and retry"
    pub fn is_not_loaded(&self) -> bool {
        matches!(self, BridgeError::NotLoaded)
    }
}

/// Map a status from a native call that must succeed.
#[inline]
pub(crate) fn check(function: &'static str, code: c_int) -> BridgeResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(BridgeError::NativeCallFailed { function, code })
    }
}

/// Outcome of a native call whose failure is an ordinary result.
///
/// Callers have to branch on it; it maps onto the host's `ok`/`error`
/// atoms.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Native status 0
    Ok,
    /// Any other native status
    Error,
}

impl Status {
    /// Interpret a native status code
    #[inline]
    pub fn from_code(code: c_int) -> Self {
        if code == 0 {
            Status::Ok
        } else {
            Status::Error
        }
    }

    /// Check for success
    #[inline]
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}
