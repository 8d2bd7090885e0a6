//! A user-space dynamic memory allocator running over an emulated
//! process break.
//!
//! The crate is split into two subsystems:
//!
//! - [`mem`] emulates a process break (`sbrk`) over a single, fixed-size
//!   arena reserved up front with `mmap`. It knows nothing about
//!   allocation; it only ever grows or shrinks a break pointer within
//!   that fixed region.
//! - [`mm`] is the allocator proper: a segregated-free-list,
//!   boundary-tagged, immediate-coalescing design built entirely on top
//!   of [`mem`]'s break.
//!
//! Both subsystems are process-wide singletons guarded by their own
//! mutex: at most one arena and one allocator are ever active at a
//! time. [`AllocatorHandle`] wraps that lifecycle in an RAII type so a
//! caller doesn't have to remember to pair `init` with `deinit`.
//!
//! ## Crate structure
//!
//! ```text
//!   rallocator
//!   ├── mem      - emulated sbrk over a fixed mmap'd arena
//!   ├── mm       - segregated-fit, coalescing allocator
//!   ├── block    - boundary-tagged block layout (internal)
//!   ├── seglist  - size-classed free lists (internal)
//!   ├── align    - alignment helpers
//!   ├── errno    - process-wide error indicator
//!   ├── config   - AllocatorConfig
//!   └── diag     - injectable diagnostic sink
//! ```
//!
//! ## Quick start
//!
//! ```
//! use rallocator::{AllocatorConfig, AllocatorHandle};
//!
//! let allocator = AllocatorHandle::new(AllocatorConfig::new(1 << 16))
//!     .expect("arena large enough to host one block");
//! let block = allocator.alloc(128).expect("allocation should succeed");
//! unsafe { allocator.dealloc(block).expect("free should succeed") };
//! ```
//!
//! Lower-level callers who want the raw, C-shaped surface (for example
//! to port `armalloc`'s own test suite) can call [`mm::init`],
//! [`mm::malloc`], [`mm::free`], and [`mm::deinit`] directly; the
//! process-wide error indicator they set is readable through
//! [`errno::get_errno`]/[`errno::get_errno_kind`].

pub mod align;
mod block;
pub mod config;
pub mod diag;
pub mod errno;
pub mod mem;
pub mod mm;
pub mod seglist;

pub use config::AllocatorConfig;
pub use diag::{set_sink, DiagnosticSink};
pub use errno::{MmErrno, MmError};

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

static HANDLE_ACTIVE: AtomicBool = AtomicBool::new(false);

/// An RAII handle over the process-wide allocator.
///
/// Only one handle may be live at a time — it wraps the same singleton
/// [`mm`] state every caller shares, so a second concurrent
/// [`AllocatorHandle::new`] fails rather than silently tearing down the
/// first handle's arena out from under it. Dropping the handle tears
/// down the allocator and releases the arena.
pub struct AllocatorHandle {
    _private: (),
}

impl AllocatorHandle {
    /// Initializes the allocator over a fresh arena sized per `config`.
    pub fn new(config: AllocatorConfig) -> Result<Self, MmError> {
        if HANDLE_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(MmError(MmErrno::Internal));
        }
        match mm::init(config) {
            Ok(()) => Ok(Self { _private: () }),
            Err(err) => {
                HANDLE_ACTIVE.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Allocates at least `size` bytes.
    pub fn alloc(&self, size: usize) -> Result<NonNull<u8>, MmError> {
        let addr = mm::malloc(size)?;
        // SAFETY: `mm::malloc` only ever returns nonzero payload
        // addresses inside the committed arena.
        Ok(unsafe { NonNull::new_unchecked(addr as *mut u8) })
    }

    /// Releases a payload previously returned by [`AllocatorHandle::alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must be a payload address previously returned by this same
    /// handle's `alloc`, not yet passed to `dealloc`.
    pub unsafe fn dealloc(&self, ptr: NonNull<u8>) -> Result<(), MmError> {
        mm::free(ptr.as_ptr() as usize)
    }
}

impl Drop for AllocatorHandle {
    fn drop(&mut self) {
        let _ = mm::deinit();
        HANDLE_ACTIVE.store(false, Ordering::SeqCst);
    }
}
