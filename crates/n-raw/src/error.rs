// SPDX-License-Identifier: MIT
//
// Error types for terminal sessions.
//
// Timeouts are not errors anywhere in this crate: a poll that sees no
// byte returns `Ok(None)`. Everything below is a real failure.

use std::io;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The terminal mode could not be read or applied.
    ///
    /// Typically stdin is not a terminal (`n-tilde < file`). Fatal: raw
    /// mode means nothing without a real terminal.
    #[error("terminal unavailable ({op}): {source}")]
    IoUnavailable {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// A read or write on the terminal device failed for a reason other
    /// than a poll timeout. Also covers a size probe that produced no
    /// usable answer.
    #[error("terminal I/O failed ({op}): {source}")]
    IoFailure {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The frame buffer could not grow to hold an append.
    #[error("frame buffer could not grow by {requested} bytes")]
    AllocationExhausted { requested: usize },

    /// Another terminal driver already owns the controlling terminal.
    #[error("controlling terminal is already claimed by this process")]
    TerminalClaimed,
}

impl Error {
    pub(crate) const fn unavailable(op: &'static str, source: io::Error) -> Self {
        Self::IoUnavailable { op, source }
    }

    pub(crate) const fn failure(op: &'static str, source: io::Error) -> Self {
        Self::IoFailure { op, source }
    }

    /// An `IoFailure` for data that arrived but made no sense.
    pub(crate) fn invalid_data(op: &'static str, msg: impl Into<String>) -> Self {
        Self::IoFailure {
            op,
            source: io::Error::new(io::ErrorKind::InvalidData, msg.into()),
        }
    }
}
