//! Boundary-tagged block layout.
//!
//! Every block in the arena looks like this on disk:
//!
//! ```text
//!   ┌──────────┬──────────────────────────────┬──────────┐
//!   │  header  │           payload             │  footer  │
//!   │ (1 word) │  (size bytes, a multiple of   │ (1 word) │
//!   │          │   ALIGNMENT, bit 0 of header/ │          │
//!   │          │   footer = allocated flag)    │          │
//!   └──────────┴──────────────────────────────┴──────────┘
//!   ▲          ▲
//!   │          └── BlockView::payload()
//!   └── BlockView::header_addr()
//! ```
//!
//! Free blocks additionally store two pointer-sized fields at the head of
//! their payload (`next_free`, `prev_free`), forming the doubly linked
//! list a [`crate::seglist::SegList`] threads through. A [`BlockView`] is
//! a thin, `Copy`-able cursor over a payload address — it owns nothing and
//! outlives nothing; once a block is freed or merged away any `BlockView`
//! pointing at its old boundaries is stale, by construction.
//!
//! The epilogue sentinel is the one exception to this layout: it is a
//! single allocated, zero-size header word with no payload and no
//! footer. It is written and probed through the free functions at the
//! bottom of this module rather than through `BlockView`.

use std::mem;

/// Machine word width; one header or footer occupies exactly this many
/// bytes.
pub const WORD: usize = mem::size_of::<usize>();

/// Payload alignment `A`: double the pointer width (16 bytes on 64-bit
/// hosts), per the data model.
pub const ALIGNMENT: usize = WORD * 2;

/// Smallest legal payload size: enough to hold `prev_free` and
/// `next_free`. Always equal to `ALIGNMENT` (two pointer-sized fields).
pub const MIN_PAYLOAD: usize = ALIGNMENT;

/// Smallest legal total block size (header + minimum payload + footer).
pub const MIN_BLOCK: usize = MIN_PAYLOAD + 2 * WORD;

const ALLOCATED_BIT: usize = 1;
const SIZE_MASK: usize = !(ALIGNMENT - 1);

/// A non-owning cursor over one block's payload address.
///
/// Reading/writing through a `BlockView` is unsafe in spirit — every
/// accessor dereferences raw memory inside the arena — but the unsafety
/// is confined to this module's small set of primitives so that `mm` and
/// `seglist` can operate on blocks without scattering raw pointer
/// arithmetic through the allocation algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockView {
    payload: usize,
}

impl BlockView {
    /// Builds a view over the block whose payload starts at `payload`.
    pub fn from_payload(payload: usize) -> Self {
        Self { payload }
    }

    /// The payload address this view was built from.
    pub fn payload(&self) -> usize {
        self.payload
    }

    /// Address of this block's header word.
    pub fn header_addr(&self) -> usize {
        self.payload - WORD
    }

    fn header_ptr(&self) -> *mut usize {
        self.header_addr() as *mut usize
    }

    /// Address of this block's footer word.
    ///
    /// Only meaningful once the header has been written (the footer
    /// location depends on the payload size encoded there).
    pub fn footer_addr(&self) -> usize {
        self.payload + self.size()
    }

    fn footer_ptr(&self) -> *mut usize {
        self.footer_addr() as *mut usize
    }

    /// Reads this block's payload size in bytes (header word, masked).
    pub fn size(&self) -> usize {
        // SAFETY: `header_addr` is always within the committed arena
        // region for any `BlockView` constructed from a block boundary.
        let tag = unsafe { self.header_ptr().read() };
        tag & SIZE_MASK
    }

    /// Whether this block is currently marked allocated.
    pub fn is_allocated(&self) -> bool {
        // SAFETY: see `size`.
        let tag = unsafe { self.header_ptr().read() };
        tag & ALLOCATED_BIT != 0
    }

    /// Writes matching header and footer tags encoding `size` and
    /// `allocated`. `size` must already be a multiple of [`ALIGNMENT`].
    pub fn set_tag(&self, size: usize, allocated: bool) {
        debug_assert_eq!(size & (ALIGNMENT - 1), 0, "block size must be alignment-sized");
        let tag = size | (allocated as usize);
        // Footer address depends on `size`, so compute it before writing
        // the header rather than going through `footer_addr` (which reads
        // the header back).
        let footer = (self.payload + size) as *mut usize;
        // SAFETY: `header_addr` and `payload + size` both fall within the
        // block's own extent, which the caller owns.
        unsafe {
            self.header_ptr().write(tag);
            footer.write(tag);
        }
    }

    /// Address of the header word immediately following this block
    /// (either the next real block's header, or the epilogue marker).
    pub fn next_header_addr(&self) -> usize {
        self.footer_addr() + WORD
    }

    /// Reads the `next_free` link. Only valid while this block is free.
    pub fn next_free(&self) -> usize {
        // SAFETY: free blocks reserve their first payload word for this
        // link; the caller guarantees the block is free.
        unsafe { (self.payload as *mut usize).read() }
    }

    /// Writes the `next_free` link. Only valid while this block is free.
    pub fn set_next_free(&self, addr: usize) {
        // SAFETY: see `next_free`.
        unsafe { (self.payload as *mut usize).write(addr) };
    }

    /// Reads the `prev_free` link. Only valid while this block is free.
    pub fn prev_free(&self) -> usize {
        // SAFETY: free blocks reserve their second payload word for this
        // link; the caller guarantees the block is free.
        unsafe { ((self.payload + WORD) as *mut usize).read() }
    }

    /// Writes the `prev_free` link. Only valid while this block is free.
    pub fn set_prev_free(&self, addr: usize) {
        // SAFETY: see `prev_free`.
        unsafe { ((self.payload + WORD) as *mut usize).write(addr) };
    }
}

/// Reads the footer tag word located at `footer_addr`, returning
/// `(payload_size, allocated)`. Used to peek at a neighbor without first
/// constructing a `BlockView` for it.
pub fn read_tag(addr: usize) -> (usize, bool) {
    // SAFETY: caller guarantees `addr` is a valid header or footer word
    // within the committed arena region.
    let tag = unsafe { (addr as *const usize).read() };
    (tag & SIZE_MASK, tag & ALLOCATED_BIT != 0)
}

/// Writes the zero-payload, allocated epilogue marker at `header_addr`.
///
/// The epilogue is a single word, unlike a real block's header — it has
/// no payload and no footer, so it must never be addressed through
/// `BlockView`.
pub fn write_epilogue_header(header_addr: usize) {
    // SAFETY: caller guarantees `header_addr` is the last committed word
    // in the arena (i.e. `brk - WORD`).
    unsafe { (header_addr as *mut usize).write(ALLOCATED_BIT) };
}

/// Writes the zero-payload, allocated prologue sentinel whose header sits
/// at `header_addr`. Unlike the epilogue, the prologue is a full
/// (header, footer) pair, so it is addressable as an ordinary
/// zero-payload `BlockView`.
pub fn write_prologue(header_addr: usize) -> BlockView {
    let view = BlockView::from_payload(header_addr + WORD);
    view.set_tag(0, true);
    view
}

#[cfg(test)]
mod tests {
    use super::*;

    // Backing buffer large enough to host a handful of synthetic blocks
    // for unit tests that don't need a real arena.
    fn scratch(len: usize) -> (Vec<u8>, usize) {
        let buf = vec![0u8; len];
        let base = buf.as_ptr() as usize;
        (buf, base)
    }

    #[test]
    fn set_tag_round_trips_size_and_allocated() {
        let (_buf, base) = scratch(256);
        let view = BlockView::from_payload(base + WORD);
        view.set_tag(64, false);
        assert_eq!(view.size(), 64);
        assert!(!view.is_allocated());

        view.set_tag(64, true);
        assert_eq!(view.size(), 64);
        assert!(view.is_allocated());
    }

    #[test]
    fn header_and_footer_agree() {
        let (_buf, base) = scratch(256);
        let view = BlockView::from_payload(base + WORD);
        view.set_tag(ALIGNMENT * 2, false);

        let (footer_size, footer_allocated) = read_tag(view.footer_addr());
        assert_eq!(footer_size, ALIGNMENT * 2);
        assert!(!footer_allocated);
    }

    #[test]
    fn free_list_links_round_trip() {
        let (_buf, base) = scratch(256);
        let view = BlockView::from_payload(base + WORD);
        view.set_tag(ALIGNMENT, false);
        view.set_next_free(0xdead);
        view.set_prev_free(0xbeef);
        assert_eq!(view.next_free(), 0xdead);
        assert_eq!(view.prev_free(), 0xbeef);
    }

    #[test]
    fn epilogue_marker_is_not_a_real_block() {
        let (_buf, base) = scratch(256);
        write_epilogue_header(base);
        let (size, allocated) = read_tag(base);
        assert_eq!(size, 0);
        assert!(allocated);
    }
}
