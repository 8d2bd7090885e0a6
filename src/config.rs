//! Allocator configuration.

/// The default minimum growth per heap extension: one page on most
/// hosts. See [`AllocatorConfig::chunk`].
pub const DEFAULT_CHUNK: usize = 4096;

/// Parameters for [`crate::AllocatorHandle::new`] / [`crate::mm::init`].
///
/// There is deliberately no `Default` impl: the arena size is a required
/// choice for every caller, not a sensible default this crate should
/// guess at. `chunk` does have a sensible default ([`DEFAULT_CHUNK`]),
/// so [`AllocatorConfig::new`] fills it in; use
/// [`AllocatorConfig::with_chunk`] to override it.
#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    /// Total arena size in bytes, rounded up to a whole number of pages
    /// by [`crate::mem::init`]. Must be large enough to host the
    /// prologue, epilogue, and at least one minimum-sized block.
    pub arena_size: usize,
    /// Minimum number of bytes to request from the arena each time
    /// [`crate::mm::malloc`] has to extend the heap, even if the
    /// pending allocation itself is smaller. Amortizes the cost of
    /// repeated `sbrk` calls the same way growing a `Vec` by more than
    /// one element at a time does; any surplus becomes a free block
    /// available to later requests rather than being wasted.
    pub chunk: usize,
}

impl AllocatorConfig {
    /// Builds a configuration requesting an arena of `arena_size` bytes,
    /// growing the heap by at least [`DEFAULT_CHUNK`] bytes at a time.
    pub fn new(arena_size: usize) -> Self {
        Self { arena_size, chunk: DEFAULT_CHUNK }
    }

    /// Overrides the minimum per-extension growth.
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }
}
