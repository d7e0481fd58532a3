//! Errors produced by log operations.

use core::fmt;

/// Errors surfaced by the log, generic over the flash driver error `E`.
///
/// Driver failures are wrapped with the operation that hit them so callers
/// keep the driver's own diagnostic detail. [`Error::InvalidCursor`] is
/// expected control flow ("no more entries") rather than a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error<E> {
    /// No partition of the log type (with the requested label) exists.
    RegionNotFound,
    /// The payload size plus slot metadata is not a power of two that fits
    /// inside one erase unit.
    InvalidSlotSize(usize),
    /// The flash driver failed a read.
    Read(E),
    /// The flash driver failed a program operation.
    Write(E),
    /// The flash driver failed an erase.
    Erase(E),
    /// The entry buffer could not be allocated.
    OutOfMemory,
    /// Navigation or read attempted with no valid target entry.
    InvalidCursor,
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RegionNotFound => write!(f, "no log partition found"),
            Error::InvalidSlotSize(size) => write!(
                f,
                "invalid payload size {size}: payload plus metadata must be a power of two within the erase unit"
            ),
            Error::Read(err) => write!(f, "flash read failed: {err:?}"),
            Error::Write(err) => write!(f, "flash write failed: {err:?}"),
            Error::Erase(err) => write!(f, "flash erase failed: {err:?}"),
            Error::OutOfMemory => write!(f, "entry buffer allocation failed"),
            Error::InvalidCursor => write!(f, "no log entry at the requested position"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}
