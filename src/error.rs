//! Error taxonomy for xisort.
//!
//! Every error is fatal to the current sort invocation: nothing here is
//! recovered locally, only propagated to the driver, which is responsible
//! for scratch-file cleanup before returning it to the caller.

/// An error produced by a sort invocation.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Bad configuration: zero `mem_limit` in external mode, zero
    /// `buffer_elems`, or an input length that isn't a multiple of 8.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A failed open/read/write/unlink, including a short read not at EOF.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Allocation failure for records, the auxiliary buffer, or a run buffer.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// An invariant that should be unreachable was violated. Indicates a bug.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
