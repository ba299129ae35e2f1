//! Error types shared by allocators behind a reference.
//!
//! References never produce errors of their own. Whatever a concrete
//! allocator returns is handed back to the caller untouched, so this enum is
//! simply the vocabulary allocators agree to report in.

use core::fmt::Display;

/// [`core::result::Result`] with [`Error`] as the error type.
pub type Result<T> = core::result::Result<T, Error>;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
/// An error returned by an allocator.
pub enum Error {
    /// The allocator has no space left to satisfy the request.
    OutOfMemory,
    /// The requested alignment was not a power of two, or is larger than the
    /// allocator can provide.
    InvalidAlignment,
    /// Attempted to allocate a zero-sized block from an allocator that does
    /// not support it.
    ZeroSize,
    /// The allocator does not support the requested operation, for example a
    /// stream-ordered allocation on an allocator that only emulates it.
    Unsupported,
    /// Unknown error, reported by the allocator.
    Other(&'static str),
}
impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidAlignment => write!(f, "the requested alignment is not supported"),
            Self::ZeroSize => write!(f, "attempted to allocate a zero-sized block"),
            Self::Unsupported => write!(f, "the operation is not supported by this allocator"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
