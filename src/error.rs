//! Errors surfaced by fallible [`Indirect`][crate::Indirect] operations.
//!
//! Only allocation and construction failures are reported through `Result`.
//! Failures raised by payload code itself (a panicking `Clone` or `Drop`)
//! unwind through the wrapper, which releases any storage it was holding on
//! the way out.
use core::convert::Infallible;

use thiserror::Error;

/// The allocation strategy could not provide storage for a payload.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[error("memory allocation failed")]
pub struct AllocError;

/// Failure to build a payload with a fallible initializer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error<E> {
    /// No storage was available; the initializer never ran.
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// The initializer failed. The storage reserved for it has already been
    /// released.
    #[error("payload construction failed: {0}")]
    Construct(E),
}

impl<E> Error<E> {
    /// Returns the initializer's error, if that is what failed.
    pub fn into_construct(self) -> Option<E> {
        match self {
            Error::Alloc(_) => None,
            Error::Construct(e) => Some(e),
        }
    }
}

impl From<Error<Infallible>> for AllocError {
    fn from(err: Error<Infallible>) -> Self {
        match err {
            Error::Alloc(e) => e,
            Error::Construct(never) => match never {},
        }
    }
}
