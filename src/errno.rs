//! Process-wide error indicator.
//!
//! Both the arena and the allocator funnel their failures through a
//! single shared integer, mirroring the conventional C `errno` pattern
//! the source (`armalloc`) uses. `get_errno`/`set_errno` are the raw,
//! ABI-shaped accessors; [`MmErrno`]/[`MmError`] are the typed layer built
//! on top for the safe Rust wrapper ([`crate::AllocatorHandle`]).

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// The error taxonomy, with discriminants matching the wire values of
/// `armalloc`'s own `mm_errno.h`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmErrno {
    /// No error occurred; operation was successful.
    None = 0,
    /// The arena could not be extended to satisfy a request.
    NoMem = 1,
    /// Caller contract violation (zero size, break underflow, ...).
    Inval = 2,
    /// A detected alignment violation.
    Align = 3,
    /// Detected header/footer mismatch, double free, or list corruption.
    Corrupt = 4,
    /// An operation was used in the wrong lifecycle state.
    Internal = 5,
}

impl MmErrno {
    fn from_raw(value: i32) -> Self {
        match value {
            0 => MmErrno::None,
            1 => MmErrno::NoMem,
            2 => MmErrno::Inval,
            3 => MmErrno::Align,
            4 => MmErrno::Corrupt,
            // An out-of-range raw value can only reach here via a stray
            // direct `set_errno` call; treat it as an internal error
            // rather than panicking.
            _ => MmErrno::Internal,
        }
    }
}

static MM_ERRNO: AtomicI32 = AtomicI32::new(MmErrno::None as i32);

/// Returns the raw value of the process-wide error indicator.
pub fn get_errno() -> i32 {
    MM_ERRNO.load(Ordering::SeqCst)
}

/// Sets the raw value of the process-wide error indicator.
pub fn set_errno(value: i32) {
    MM_ERRNO.store(value, Ordering::SeqCst);
}

/// Typed convenience accessor over [`get_errno`].
pub fn get_errno_kind() -> MmErrno {
    MmErrno::from_raw(get_errno())
}

/// Typed convenience accessor over [`set_errno`].
pub fn set_errno_kind(kind: MmErrno) {
    set_errno(kind as i32);
}

/// A typed error wrapping the kind last raised by the arena or allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmError(pub MmErrno);

impl fmt::Display for MmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self.0 {
            MmErrno::None => "no error",
            MmErrno::NoMem => "arena cannot be extended: out of memory",
            MmErrno::Inval => "invalid argument",
            MmErrno::Align => "alignment violation detected",
            MmErrno::Corrupt => "heap corruption detected",
            MmErrno::Internal => "operation used in the wrong lifecycle state",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for MmError {}

impl From<MmErrno> for MmError {
    fn from(kind: MmErrno) -> Self {
        MmError(kind)
    }
}
