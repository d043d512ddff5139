//! Heap Extender: grows the managed region by one call into the address
//! provider, frames the new space as a single free block, and hands it to
//! the Coalescer so it can merge with whatever free tail the heap already
//! had.
//!
//! This is the one place in the engine that talks to the outside world
//! (`AddressProvider`); everything else operates purely on bytes already
//! inside the managed region.

use crate::align::{WORD, round_up_word};
use crate::block;
use crate::coalesce::coalesce;
use crate::freelist::FreeListIndex;
use crate::provider::AddressProvider;

/// Default extension size for a placement miss, matching the reference
/// allocator's tuning constant. A request larger than this still gets
/// exactly as much space as it needs (see `extend_words_for_request`).
pub const CHUNKSIZE: usize = 4096;

/// Extends the heap by at least `words` 32-bit words (rounded up to an even
/// count so the byte length stays a multiple of 8), reframes the previous
/// epilogue as the new block's header, and coalesces it with the heap's
/// previous tail.
///
/// Returns the payload address of the (possibly merged) resulting free
/// block, already linked into `freelist`, or `None` if the provider refused
/// to grow the region.
///
/// # Safety
/// `old_epilogue` must be the payload-style address of the heap's current
/// epilogue (`old_epilogue - WORD` holds the epilogue word), and the
/// provider must hand back memory immediately following it.
pub unsafe fn extend<P: AddressProvider>(
    provider: &mut P,
    freelist: &mut FreeListIndex,
    old_epilogue: usize,
    words: usize,
) -> Option<usize> {
    let words = if !words.is_multiple_of(2) { words + 1 } else { words };
    let bytes = words * WORD;

    log::trace!("extend: requesting {bytes} bytes from the address provider");
    let raw = provider.extend(bytes)?;

    unsafe {
        // `raw` is the address right after the previous epilogue word, so
        // `raw - WORD` is exactly where that epilogue lived (and where the
        // new block's header now goes).
        let header_addr = raw - WORD;
        debug_assert_eq!(header_addr, old_epilogue - WORD);

        let prev_alloc = block::prev_alloc_of(old_epilogue);
        let size = bytes as u32;

        let new_block = header_addr + WORD;
        block::set_header_full(new_block, size, false, prev_alloc);
        block::set_footer(new_block, size);

        // next_block's payload-style address is exactly where the new
        // epilogue's header (one word behind it) must be written.
        let new_epilogue = block::next_block(new_block);
        block::set_header_full(new_epilogue, 0, true, false);

        log::debug!("extend: heap grew by {size} bytes, new epilogue at {new_epilogue:#x}");
        Some(coalesce(freelist, new_block))
    }
}

/// The word count to request from the provider when placement misses for a
/// request of `s` bytes: enough to satisfy the request even if it exceeds
/// the default chunk size, rounded to a whole number of words.
#[inline]
pub fn extend_words_for_request(s: u32) -> usize {
    round_up_word(s.max(CHUNKSIZE as u32) as usize) / WORD
}
