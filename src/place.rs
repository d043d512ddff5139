//! Placement Engine: bounded best-fit search over the Free List Index, plus
//! the splitting policy applied once a block has been chosen.
//!
//! The bound exists for the same reason the reference allocator has one —
//! an unbounded best-fit degrades to a linear scan of the whole free list on
//! every allocation. `MAX_FIT` is a tuning knob, not a correctness
//! requirement, and is kept as a named constant rather than buried in the
//! loop per spec.md §9.

use crate::align::MIN_BLOCK;
use crate::block;
use crate::coalesce::coalesce;
use crate::freelist::{FreeListIndex, LARGEST_CLASS, class_of};

/// Number of fitting blocks examined (across all classes) before the search
/// gives up and returns the best fit seen so far. Spec.md §4.4 names this
/// `MAX_FIT`; the single-list variant uses a larger bound (42) since it has
/// no class pre-filtering to rely on — this crate implements the segregated
/// variant, so that larger bound is not wired in here.
pub const MAX_FIT: usize = 6;

/// Searches size classes `class_of(s)..=LARGEST_CLASS` for the
/// smallest-fitting free block, examining at most `MAX_FIT` fitting blocks
/// in total and never descending past a class in which a fit was found.
///
/// # Safety
/// Every block reachable through `freelist`'s chains must be a live,
/// correctly-linked free block.
pub unsafe fn find_fit(freelist: &FreeListIndex, s: u32) -> Option<usize> {
    let start_cls = class_of(s);
    let mut best: Option<usize> = None;
    let mut best_size = u32::MAX;
    let mut examined = 0usize;

    for cls in start_cls..=LARGEST_CLASS {
        let mut cur = freelist.head_addr(cls);
        let mut found_in_class = false;

        while let Some(addr) = cur {
            let size = unsafe { block::size_of(addr) };
            if size >= s {
                found_in_class = true;
                if size < best_size {
                    best = Some(addr);
                    best_size = size;
                }
                examined += 1;
                if examined >= MAX_FIT {
                    return best;
                }
            }
            cur = unsafe { freelist.next_in_class(addr) };
        }

        if found_in_class {
            return best;
        }
    }

    best
}

/// Removes `b` from the free list and commits it to an allocation of size
/// `s`, splitting off and coalescing the remainder if it is large enough to
/// be worth keeping as its own free block.
///
/// # Safety
/// `b` must be a free block of size `>= s` currently linked into `freelist`.
pub unsafe fn build(freelist: &mut FreeListIndex, b: usize, s: u32) {
    unsafe {
        let blksize = block::size_of(b);
        freelist.remove(b, blksize);
        let prev_alloc = block::prev_alloc_of(b);

        if blksize - s > MIN_BLOCK as u32 {
            block::set_header_full(b, s, true, prev_alloc);
            let remainder = b + s as usize;
            let remainder_size = blksize - s;
            block::set_header_full(remainder, remainder_size, false, true);
            block::set_footer(remainder, remainder_size);
            coalesce(freelist, remainder);
        } else {
            block::set_header_full(b, blksize, true, prev_alloc);
            let next = block::next_block(b);
            block::set_prev_alloc(next, true);
        }
    }
}
