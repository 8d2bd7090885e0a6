//! Emulated process break over a fixed-size, page-backed arena.
//!
//! This mirrors the `sbrk`-style interface `armalloc`'s own `mem.h`
//! wraps around the real process break, except the region backing it is
//! a single anonymous `mmap` reservation sized once at
//! [`init`] rather than the process's actual data segment. That keeps the
//! emulated heap's bounds fixed and inspectable, which is what lets
//! [`crate::mm`] run its segregated allocator against it without ever
//! touching the real heap.

use std::sync::Mutex;

use crate::align::align_up;
use crate::errno::{set_errno_kind, MmErrno};

/// Sentinel returned by [`sbrk`] on failure, matching the POSIX `sbrk(2)`
/// convention of `(void *) -1`.
pub const SBRK_FAILED: *mut u8 = usize::MAX as *mut u8;

struct ArenaState {
    /// Base address of the mmap'd region, or `0` while uninitialized.
    base: usize,
    /// Length of the mmap'd region in bytes (a multiple of the page size).
    capacity: usize,
    /// Current break, always in `[base, base + capacity]`.
    brk: usize,
}

impl ArenaState {
    const fn new() -> Self {
        Self { base: 0, capacity: 0, brk: 0 }
    }

    fn is_active(&self) -> bool {
        self.base != 0
    }
}

static ARENA: Mutex<ArenaState> = Mutex::new(ArenaState::new());

fn page_size() -> usize {
    // SAFETY: `_SC_PAGESIZE` is always a valid `sysconf` argument.
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n > 0 {
        n as usize
    } else {
        4096
    }
}

/// Reserves a new arena of at least `size` bytes, rounded up to a whole
/// number of pages.
///
/// Returns `0` on success, `-1` on failure (with the process-wide error
/// indicator set). Calling `init` while an arena is already active is
/// itself an error — the caller must `deinit` first.
pub fn init(size: usize) -> i32 {
    if size == 0 {
        crate::diag::emit("arena size must be > 0");
        set_errno_kind(MmErrno::Inval);
        return -1;
    }

    let mut state = ARENA.lock().unwrap();
    if state.is_active() {
        set_errno_kind(MmErrno::Internal);
        return -1;
    }

    let mapped_len = align_up(size, page_size());
    // SAFETY: a fixed-size anonymous, private mapping with no file
    // backing; `mapped_len` is nonzero.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            mapped_len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        set_errno_kind(MmErrno::NoMem);
        return -1;
    }

    let base = ptr as usize;
    state.base = base;
    state.capacity = mapped_len;
    state.brk = base;
    set_errno_kind(MmErrno::None);
    0
}

fn release(state: &mut ArenaState) {
    if state.is_active() {
        // SAFETY: `base`/`capacity` describe the region `mmap`'d in
        // `init`, unmodified since.
        unsafe {
            libc::munmap(state.base as *mut libc::c_void, state.capacity);
        }
    }
    state.base = 0;
    state.capacity = 0;
    state.brk = 0;
}

/// Tears down the active arena, releasing its backing pages.
///
/// Idempotent: calling `deinit` while no arena is active is a no-op
/// success rather than an error, so callers never need to track whether
/// they've already torn down the arena.
pub fn deinit() -> i32 {
    let mut state = ARENA.lock().unwrap();
    if !state.is_active() {
        return 0;
    }
    release(&mut state);
    set_errno_kind(MmErrno::None);
    0
}

/// Moves the break by `increment` bytes (negative to shrink) and returns
/// the break's address *before* the move, matching `sbrk(2)`.
///
/// Fails with [`SBRK_FAILED`] if no arena is active, if the move would
/// take the break below the heap's start, or if it would reach or pass
/// the heap's fixed upper bound — the upper bound is exclusive, so a
/// move landing exactly on it still fails.
pub fn sbrk(increment: isize) -> *mut u8 {
    let mut state = ARENA.lock().unwrap();
    if !state.is_active() {
        set_errno_kind(MmErrno::Internal);
        return SBRK_FAILED;
    }

    let heap_start = state.base as isize;
    let heap_end = (state.base + state.capacity) as isize;
    let brk = state.brk as isize;

    let candidate = match brk.checked_add(increment) {
        Some(c) => c,
        None => {
            set_errno_kind(MmErrno::Inval);
            return SBRK_FAILED;
        }
    };

    if candidate < heap_start {
        set_errno_kind(MmErrno::Inval);
        return SBRK_FAILED;
    }
    if candidate >= heap_end {
        set_errno_kind(MmErrno::NoMem);
        return SBRK_FAILED;
    }

    let old_brk = state.brk;
    state.brk = candidate as usize;
    set_errno_kind(MmErrno::None);
    old_brk as *mut u8
}

/// The active arena's starting address, or `None` if no arena is active.
pub fn heap_start() -> Option<usize> {
    let state = ARENA.lock().unwrap();
    state.is_active().then_some(state.base)
}

/// The active arena's current break, or `None` if no arena is active.
pub fn brk() -> Option<usize> {
    let state = ARENA.lock().unwrap();
    state.is_active().then_some(state.brk)
}

/// The active arena's fixed, exclusive upper bound, or `None` if no
/// arena is active.
pub fn heap_end() -> Option<usize> {
    let state = ARENA.lock().unwrap();
    state.is_active().then_some(state.base + state.capacity)
}
