//! Block Layout Layer: pure arithmetic over the packed header/footer word
//! and neighbour navigation. This is the leaf of the engine — it reads and
//! writes bytes and derives addresses from them; it has no notion of a free
//! list or of the heap as a whole.
//!
//! All functions here take a *payload pointer* `p`: the address immediately
//! after a block's header word, matching spec.md's `header(p)`/`footer(p)`
//! contract. A free block stores its list links in the first two payload
//! words (see [`FreeBlockLinks`]); an allocated block's payload is opaque to
//! this module.
//!
//! ```text
//! allocated block                      free block
//! +--------+------------------+        +--------+------+------+--------+
//! | header |     payload      |        | header | prev | next | footer |
//! +--------+------------------+        +--------+------+------+--------+
//!          ^ p                                  ^ p
//! ```
//!
//! Every read and write here is a single 32-bit-aligned word access; the
//! unsafety is confined to this file and to [`crate::extend`]'s one call
//! site into the address provider.

use crate::align::WORD;

const ALLOC_BIT: u32 = 1 << 0;
const PREV_ALLOC_BIT: u32 = 1 << 1;
const SIZE_MASK: u32 = !0x7;

/// Packs a boundary-tag word. `size` must already be a multiple of 8.
#[inline]
fn pack(size: u32, alloc: bool, prev_alloc: bool) -> u32 {
    debug_assert_eq!(size & 0x7, 0, "block size {size} is not a multiple of 8");
    size | if prev_alloc { PREV_ALLOC_BIT } else { 0 } | if alloc { ALLOC_BIT } else { 0 }
}

#[inline]
unsafe fn read_word(addr: usize) -> u32 {
    debug_assert_eq!(addr & (WORD - 1), 0, "misaligned word access at {addr:#x}");
    unsafe { (addr as *const u32).read() }
}

#[inline]
unsafe fn write_word(addr: usize, value: u32) {
    debug_assert_eq!(addr & (WORD - 1), 0, "misaligned word access at {addr:#x}");
    unsafe { (addr as *mut u32).write(value) }
}

/// Reads the header word for the block whose payload starts at `p`.
///
/// # Safety
/// `p - WORD` must be a valid, initialized header word.
#[inline]
pub unsafe fn header(p: usize) -> u32 {
    unsafe { read_word(p - WORD) }
}

/// Reads the footer word for a block of the given `size` whose payload
/// starts at `p`. Only meaningful for free blocks (allocated blocks do not
/// maintain a footer). The footer is the block's last word: `header_addr +
/// size - WORD`, i.e. `p + size - 2*WORD`.
///
/// # Safety
/// `p + size - 2*WORD` must be a valid, initialized footer word.
#[inline]
pub unsafe fn footer(p: usize, size: u32) -> u32 {
    unsafe { read_word(p + size as usize - 2 * WORD) }
}

/// Extracts the size field (always a multiple of 8) from `p`'s header.
///
/// # Safety
/// Same as [`header`].
#[inline]
pub unsafe fn size_of(p: usize) -> u32 {
    unsafe { header(p) & SIZE_MASK }
}

/// Whether `p`'s block is allocated.
///
/// # Safety
/// Same as [`header`].
#[inline]
pub unsafe fn alloc_of(p: usize) -> bool {
    unsafe { header(p) & ALLOC_BIT != 0 }
}

/// Whether the block immediately preceding `p`'s block is allocated.
///
/// # Safety
/// Same as [`header`].
#[inline]
pub unsafe fn prev_alloc_of(p: usize) -> bool {
    unsafe { header(p) & PREV_ALLOC_BIT != 0 }
}

/// Payload address of the block immediately following `p`'s block.
///
/// # Safety
/// Same as [`header`]; the result may be the epilogue's payload address,
/// which is never itself a live payload pointer.
#[inline]
pub unsafe fn next_block(p: usize) -> usize {
    unsafe { p + size_of(p) as usize }
}

/// Payload address of the block immediately preceding `p`'s block.
///
/// Only well-defined when `prev_alloc_of(p)` is `false`: the previous
/// block's footer is only guaranteed valid when that block is free. Calling
/// this when the predecessor is allocated reads what may be live payload
/// bytes.
///
/// # Safety
/// Same as [`header`], plus the caller must have checked `!prev_alloc_of(p)`.
#[inline]
pub unsafe fn prev_block(p: usize) -> usize {
    unsafe {
        let prev_size = (read_word(p - 2 * WORD) & SIZE_MASK) as usize;
        p - prev_size
    }
}

/// Overwrites `p`'s header, preserving the existing `PREV_ALLOC` bit.
///
/// # Safety
/// `p - WORD` must be a valid header word.
#[inline]
pub unsafe fn set_header(p: usize, size: u32, alloc: bool) {
    unsafe {
        let prev_alloc = prev_alloc_of(p);
        write_word(p - WORD, pack(size, alloc, prev_alloc));
    }
}

/// Overwrites `p`'s header with an explicit `PREV_ALLOC` bit, for the cases
/// (splitting, coalescing) where the caller already knows the correct value
/// and the old header may belong to a different-sized block entirely.
///
/// # Safety
/// `p - WORD` must be a valid header word.
#[inline]
pub unsafe fn set_header_full(p: usize, size: u32, alloc: bool, prev_alloc: bool) {
    unsafe { write_word(p - WORD, pack(size, alloc, prev_alloc)) }
}

/// Copies `p`'s current header word into its footer slot for a free block
/// of size `size` (invariant: a free block's footer equals its header).
///
/// # Safety
/// `p + size - WORD` must be a valid footer word, and `p`'s header must
/// already hold `size`'s value with `ALLOC` clear.
#[inline]
pub unsafe fn set_footer(p: usize, size: u32) {
    unsafe {
        let word = read_word(p - WORD);
        write_word(p + size as usize - 2 * WORD, word);
    }
}

/// Sets or clears the `PREV_ALLOC` bit of `p`'s header in place, preserving
/// every other bit (size, `ALLOC`).
///
/// # Safety
/// Same as [`header`].
#[inline]
pub unsafe fn set_prev_alloc(p: usize, prev_alloc: bool) {
    unsafe {
        let word = read_word(p - WORD);
        let word = if prev_alloc {
            word | PREV_ALLOC_BIT
        } else {
            word & !PREV_ALLOC_BIT
        };
        write_word(p - WORD, word);
    }
}

/// A free block's first two payload words, projected as a `(prev, next)`
/// pair of heap-relative offsets (0 means null). Allocated blocks do not
/// have meaningful link words; this view must only be used on blocks known
/// to be free.
pub struct FreeBlockLinks;

impl FreeBlockLinks {
    /// Reads the `prev_free` offset stored at `p`.
    ///
    /// # Safety
    /// `p`'s block must be free, and `p` a valid payload address.
    #[inline]
    pub unsafe fn prev(p: usize) -> u32 {
        unsafe { read_word(p) }
    }

    /// Reads the `next_free` offset stored at `p + WORD`.
    ///
    /// # Safety
    /// Same as [`FreeBlockLinks::prev`].
    #[inline]
    pub unsafe fn next(p: usize) -> u32 {
        unsafe { read_word(p + WORD) }
    }

    /// Writes the `prev_free` offset at `p`.
    ///
    /// # Safety
    /// Same as [`FreeBlockLinks::prev`].
    #[inline]
    pub unsafe fn set_prev(p: usize, offset: u32) {
        unsafe { write_word(p, offset) }
    }

    /// Writes the `next_free` offset at `p + WORD`.
    ///
    /// # Safety
    /// Same as [`FreeBlockLinks::prev`].
    #[inline]
    pub unsafe fn set_next(p: usize, offset: u32) {
        unsafe { write_word(p + WORD, offset) }
    }
}
