//! Top-level entry points (`allocate`, `deallocate`, `reallocate`,
//! `zero_allocate`) and initialization, wired up over the five lower
//! components. This is the module a caller actually touches; everything
//! below it is an implementation detail reachable only through
//! `HeapContext`'s methods.
//!
//! ```text
//! allocate(n)   -> Placement Engine -> (on miss) Heap Extender -> Block Layout writeback
//! deallocate(p) -> Block Layout flip -> Coalescer -> Free List Index
//! reallocate(p, n) -> allocate(n) + copy + deallocate(p)
//! ```

use std::ptr;

use crate::align::{MIN_BLOCK, WORD, round_up_dword};
use crate::block;
use crate::coalesce::coalesce;
use crate::error::AllocError;
use crate::extend::{self, CHUNKSIZE};
use crate::freelist::FreeListIndex;
use crate::place;
use crate::provider::AddressProvider;

/// Tunables a caller may reasonably want to override; everything else
/// (`MAX_FIT`, the segregated thresholds) is a correctness-adjacent
/// constant and stays where spec.md's component it belongs to defines it.
#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    /// Minimum bytes requested from the provider on a placement miss.
    pub chunk_size: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNKSIZE,
        }
    }
}

/// All mutable state for one heap: the provider, the segregated free-list
/// index, and the fixed offset anchor. Grouping these into one opaque
/// context (rather than a handful of process-global statics, as the
/// reference allocator uses) is what lets tests run several independent
/// heaps side by side, each over its own `AddressProvider`.
pub struct HeapContext<P: AddressProvider> {
    provider: P,
    freelist: FreeListIndex,
    config: HeapConfig,
    /// Fixed anchor for free-list offset encoding, set once at `init`.
    base: usize,
    /// Current epilogue payload address; moves forward on every extension.
    epilogue: usize,
    initialized: bool,
}

impl<P: AddressProvider> HeapContext<P> {
    /// Creates a context over `provider`, not yet initialized.
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, HeapConfig::default())
    }

    /// Creates a context with a non-default chunk size.
    pub fn with_config(provider: P, config: HeapConfig) -> Self {
        Self {
            provider,
            freelist: FreeListIndex::new(),
            config,
            base: 0,
            epilogue: 0,
            initialized: false,
        }
    }

    /// Reserves the prologue/epilogue sentinels and clears the free-list
    /// index. Idempotent per spec.md §6: a second call is a no-op that
    /// returns `Ok(())` without touching the already-initialized heap.
    pub fn init(&mut self) -> Result<(), AllocError> {
        if self.initialized {
            return Ok(());
        }

        let six_words = 6 * WORD;
        let lo = self
            .provider
            .extend(six_words)
            .ok_or(AllocError::ProviderExhausted)?;

        unsafe {
            // word 0: alignment pad.
            (lo as *mut u32).write(0);

            // words 1..4: the prologue, a permanently-allocated M-byte
            // sentinel. Its link slots are never read (it is never free),
            // so they are left zeroed.
            let prologue = lo + 2 * WORD;
            block::set_header_full(prologue, MIN_BLOCK as u32, true, true);
            block::set_footer(prologue, MIN_BLOCK as u32);

            // word 5: the epilogue, a zero-size allocated sentinel.
            let epilogue = lo + 5 * WORD + WORD;
            block::set_header_full(epilogue, 0, true, true);

            // The free-list offset anchor must not coincide with any
            // address a real free block can ever occupy, or that block's
            // offset would be 0 and collide with the "null" link sentinel.
            // The prologue is never free and sits at the lowest possible
            // address, so anchoring there keeps every real offset > 0.
            self.base = prologue;
            self.epilogue = epilogue;
        }

        self.freelist = FreeListIndex::new();
        self.freelist.set_base(self.base);
        self.initialized = true;
        Ok(())
    }

    /// Allocates at least `n` bytes, returning a payload pointer aligned to
    /// [`crate::align::ALIGNMENT`], or null if the address space is
    /// exhausted. `allocate(0)` always returns null.
    ///
    /// # Safety
    /// The context must be initialized.
    pub unsafe fn allocate(&mut self, n: usize) -> *mut u8 {
        if n == 0 {
            return ptr::null_mut();
        }
        debug_assert!(self.initialized, "allocate called before init");

        // The block-size header field is 32 bits wide (spec.md §3): a
        // request that, once padded and rounded, doesn't fit a u32 can
        // never be satisfied, and must be refused the same way an
        // address-space exhaustion is (spec.md §7), not silently truncated
        // into a far smaller allocation.
        let Some(s) = n
            .checked_add(WORD)
            .map(round_up_dword)
            .map(|s| s.max(MIN_BLOCK))
            .and_then(|s| u32::try_from(s).ok())
        else {
            return ptr::null_mut();
        };

        unsafe {
            if let Some(b) = place::find_fit(&self.freelist, s) {
                place::build(&mut self.freelist, b, s);
                return b as *mut u8;
            }

            let words = extend::extend_words_for_request(s).max(s as usize / WORD);
            let words = words.max(
                round_up_dword(self.config.chunk_size.max(s as usize)) / WORD,
            );
            let b = extend::extend(&mut self.provider, &mut self.freelist, self.epilogue, words);
            let Some(b) = b else {
                return ptr::null_mut();
            };
            self.epilogue = block::next_block(b);
            place::build(&mut self.freelist, b, s);
            b as *mut u8
        }
    }

    /// Frees a block previously returned by `allocate`/`reallocate`/
    /// `zero_allocate`. A null pointer is a no-op.
    ///
    /// # Safety
    /// `p` must be null or a still-live payload pointer this context
    /// issued and has not already freed.
    pub unsafe fn deallocate(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        let addr = p as usize;
        unsafe {
            let size = block::size_of(addr);
            let prev_alloc = block::prev_alloc_of(addr);
            block::set_header_full(addr, size, false, prev_alloc);
            block::set_footer(addr, size);
            coalesce(&mut self.freelist, addr);
        }
    }

    /// Resizes the allocation at `p` to `n` bytes, preserving
    /// `min(old_payload_bytes, n)` bytes of content. `n == 0` is equivalent
    /// to `deallocate(p)`; `p` null is equivalent to `allocate(n)`.
    ///
    /// # Safety
    /// Same as [`Self::allocate`] and [`Self::deallocate`] combined.
    pub unsafe fn reallocate(&mut self, p: *mut u8, n: usize) -> *mut u8 {
        unsafe {
            if n == 0 {
                self.deallocate(p);
                return ptr::null_mut();
            }
            if p.is_null() {
                return self.allocate(n);
            }

            let old_addr = p as usize;
            let old_payload_bytes = block::size_of(old_addr) as usize - WORD;

            let q = self.allocate(n);
            if q.is_null() {
                return ptr::null_mut();
            }

            let copy_len = old_payload_bytes.min(n);
            ptr::copy_nonoverlapping(p, q, copy_len);
            self.deallocate(p);
            q
        }
    }

    /// Allocates space for `count` elements of `size` bytes each, zeroed.
    /// Returns null (without writing anything) if the underlying
    /// allocation fails — unlike the reference C `calloc`, which is not
    /// null-checked before the fill (spec.md §9 flags this and requires the
    /// check).
    ///
    /// # Safety
    /// Same as [`Self::allocate`].
    pub unsafe fn zero_allocate(&mut self, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size) else {
            return ptr::null_mut();
        };
        unsafe {
            let p = self.allocate(total);
            if !p.is_null() {
                ptr::write_bytes(p, 0, total);
            }
            p
        }
    }

    /// Walks the heap from the prologue to the epilogue, checking
    /// invariants P1–P7 from spec.md §8. Returns the first violation found,
    /// if any. Always safe to call; `verbose` additionally logs every block
    /// visited at `trace` level. Callers that only need the "tolerate a
    /// no-op" contract from spec.md §6 can ignore the result.
    ///
    /// # Safety
    /// The context must be initialized.
    pub unsafe fn check_heap(&self, verbose: bool) -> Result<(), String> {
        unsafe {
            // Skip the prologue itself: its bytes are already accounted for
            // in the 6-word sentinel reservation below.
            let mut cur = block::next_block(self.prologue_payload());
            let mut prev_alloc_expected = true; // prologue is allocated
            let mut total = 0usize;

            loop {
                let size = block::size_of(cur);
                let alloc = block::alloc_of(cur);
                if verbose {
                    log::trace!("check_heap: block at {cur:#x} size={size} alloc={alloc}");
                }

                if size == 0 {
                    break; // epilogue
                }
                if !size.is_multiple_of(8) || (size as usize) < MIN_BLOCK {
                    return Err(format!(
                        "block at {cur:#x} has invalid size {size} (must be a multiple of 8 and >= {MIN_BLOCK})"
                    ));
                }
                if block::prev_alloc_of(cur) != prev_alloc_expected {
                    return Err(format!(
                        "block at {cur:#x} PREV_ALLOC={} but predecessor ALLOC={prev_alloc_expected}",
                        block::prev_alloc_of(cur)
                    ));
                }
                if !alloc && !prev_alloc_expected {
                    return Err(format!(
                        "block at {cur:#x} and its predecessor are both free: coalescing missed a merge"
                    ));
                }
                if !alloc {
                    let footer = block::footer(cur, size);
                    if footer != block::header(cur) {
                        return Err(format!("free block at {cur:#x} footer != header"));
                    }
                }

                total += size as usize;
                prev_alloc_expected = alloc;
                cur = block::next_block(cur);
            }

            let (lo, hi) = self.provider.heap_bounds();
            let expected = hi - lo;
            if total + 6 * WORD != expected {
                return Err(format!(
                    "heap walk covered {} bytes of real blocks + {} sentinel bytes, expected {expected}",
                    total,
                    6 * WORD
                ));
            }
            Ok(())
        }
    }

    fn prologue_payload(&self) -> usize {
        self.base
    }

    #[cfg(test)]
    fn freelist_head_addr(&self, cls: usize) -> Option<usize> {
        self.freelist.head_addr(cls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;

    fn fresh() -> HeapContext<MemoryProvider> {
        let mut ctx = HeapContext::new(MemoryProvider::new(1 << 20));
        ctx.init().unwrap();
        ctx
    }

    /// Scenario 1: init + one alloc.
    #[test]
    fn init_then_single_allocation() {
        let mut ctx = fresh();
        unsafe {
            let p = ctx.allocate(1);
            assert!(!p.is_null());
            assert_eq!(p as usize % 8, 0);
            assert_eq!(block::size_of(p as usize), 16); // 4(hdr)+1 rounded to dword + word
            ctx.check_heap(false).unwrap();
        }
    }

    #[test]
    fn allocate_zero_returns_null() {
        let mut ctx = fresh();
        unsafe {
            assert!(ctx.allocate(0).is_null());
        }
    }

    /// A request whose padded/rounded size doesn't fit the 32-bit header
    /// size field must be refused as a (very real) address-space
    /// exhaustion, never silently truncated into a small allocation.
    #[test]
    fn allocate_request_too_large_for_size_field_returns_null() {
        let mut ctx = fresh();
        unsafe {
            assert!(ctx.allocate(u32::MAX as usize).is_null());
            assert!(ctx.allocate(usize::MAX).is_null());
            ctx.check_heap(false).unwrap();
        }
    }

    #[test]
    fn deallocate_null_is_noop() {
        let mut ctx = fresh();
        unsafe {
            ctx.deallocate(ptr::null_mut());
            ctx.check_heap(false).unwrap();
        }
    }

    /// P4: `check_heap` must reject two adjacent free blocks even when
    /// their `PREV_ALLOC`/`ALLOC` bits are mutually consistent (i.e. even
    /// when P3 alone would pass) — this is what a coalescing bug that
    /// simply forgot to merge would look like.
    #[test]
    fn check_heap_rejects_two_adjacent_free_blocks() {
        let mut ctx = fresh();
        unsafe {
            let a = ctx.allocate(32);
            let b = ctx.allocate(32);
            let c = ctx.allocate(32);
            ctx.deallocate(c);

            // Free `a` and `b` by hand, bypassing `deallocate`'s coalescer
            // call, to simulate a coalescer that failed to merge them.
            let a_size = block::size_of(a as usize);
            let a_prev_alloc = block::prev_alloc_of(a as usize);
            block::set_header_full(a as usize, a_size, false, a_prev_alloc);
            block::set_footer(a as usize, a_size);

            let b_size = block::size_of(b as usize);
            block::set_header_full(b as usize, b_size, false, false);
            block::set_footer(b as usize, b_size);
            block::set_prev_alloc(block::next_block(b as usize), false);

            assert!(
                ctx.check_heap(false).is_err(),
                "two adjacent free blocks must be flagged, not accepted as consistent"
            );
        }
    }

    /// Scenario 2: split and coalesce.
    #[test]
    fn split_then_coalesce_middle_and_outer() {
        let mut ctx = fresh();
        unsafe {
            let a = ctx.allocate(32);
            let b = ctx.allocate(32);
            let c = ctx.allocate(32);
            assert!(!a.is_null() && !b.is_null() && !c.is_null());

            ctx.deallocate(b);
            assert_eq!(block::size_of(b as usize), 40); // 4-byte header + 32 payload rounded to a dword
            assert!(!block::alloc_of(b as usize));
            ctx.check_heap(false).unwrap();

            ctx.deallocate(a);
            ctx.deallocate(c);
            ctx.check_heap(false).unwrap();
            // a, b, and c's blocks (plus any extension tail) must now be
            // one contiguous free block starting at a.
            assert!(!block::alloc_of(a as usize));
            let merged_size = block::size_of(a as usize);
            assert!(merged_size as usize >= 40 + 40 + 40);
        }
    }

    /// Scenario 5: realloc grows and preserves content.
    #[test]
    fn reallocate_grows_and_preserves_prefix() {
        let mut ctx = fresh();
        unsafe {
            let p = ctx.allocate(24);
            assert!(!p.is_null());
            ptr::write_bytes(p, 0xAB, 24);

            let q = ctx.reallocate(p, 1024);
            assert!(!q.is_null());
            for i in 0..24 {
                assert_eq!(*q.add(i), 0xAB);
            }
            ctx.check_heap(false).unwrap();
        }
    }

    #[test]
    fn reallocate_null_is_allocate() {
        let mut ctx = fresh();
        unsafe {
            let p = ctx.reallocate(ptr::null_mut(), 64);
            assert!(!p.is_null());
        }
    }

    #[test]
    fn reallocate_zero_frees_and_returns_null() {
        let mut ctx = fresh();
        unsafe {
            let p = ctx.allocate(64);
            let q = ctx.reallocate(p, 0);
            assert!(q.is_null());
            ctx.check_heap(false).unwrap();
        }
    }

    #[test]
    fn zero_allocate_zeroes_payload() {
        let mut ctx = fresh();
        unsafe {
            let p = ctx.allocate(64);
            ptr::write_bytes(p, 0xFF, 64); // dirty it while still live
            ctx.deallocate(p);
            let q = ctx.zero_allocate(8, 8);
            assert!(!q.is_null());
            for i in 0..64 {
                assert_eq!(*q.add(i), 0);
            }
        }
    }

    /// Scenario 3: segregated class routing.
    #[test]
    fn allocation_sizes_route_through_expected_classes() {
        use crate::freelist::class_of;
        assert_eq!(class_of(crate::align::round_up_dword(100 + WORD) as u32), 3); // 128 class
        assert_eq!(class_of(crate::align::round_up_dword(5000 + WORD) as u32), 9); // 8192 class
    }

    /// Scenario 6: OOM path leaves the heap consistent and prior pointers
    /// freeable.
    #[test]
    fn oom_path_is_consistent_and_reversible() {
        let mut ctx = HeapContext::new(MemoryProvider::new(64 * 1024));
        ctx.init().unwrap();
        unsafe {
            let mut ptrs = Vec::new();
            loop {
                let p = ctx.allocate(512);
                if p.is_null() {
                    break;
                }
                ptrs.push(p);
            }
            assert!(ctx.allocate(512).is_null(), "must keep refusing once exhausted");
            for p in ptrs {
                ctx.deallocate(p);
            }
            ctx.check_heap(false).unwrap();
        }
    }

    #[test]
    fn init_twice_is_a_noop() {
        let mut ctx = HeapContext::new(MemoryProvider::new(1 << 16));
        ctx.init().unwrap();
        unsafe {
            let p = ctx.allocate(32);
            assert_eq!(ctx.init(), Ok(()), "a second init() must not error per spec.md §6");
            // the already-initialized heap, including the live allocation
            // above, must be untouched by the no-op second call.
            assert!(block::alloc_of(p as usize));
            ctx.check_heap(false).unwrap();
        }
    }

    /// Regression: the free-list offset anchor (`base`) must not alias any
    /// address a real free block can occupy. The first block the heap ever
    /// hands out sits immediately after the prologue; if `base` were
    /// anchored there (rather than at the prologue itself), that block's
    /// offset would be 0 and collide with the "empty class" sentinel
    /// `head_addr` uses, silently dropping it from its free list.
    #[test]
    fn freed_block_right_after_the_prologue_stays_in_its_free_list() {
        let mut ctx = fresh();
        unsafe {
            let a = ctx.allocate(32);
            let b = ctx.allocate(32);
            let c = ctx.allocate(32);

            ctx.deallocate(b);
            ctx.deallocate(a); // merges into the block starting at `a`

            let cls = crate::freelist::class_of(block::size_of(a as usize));
            assert_eq!(
                ctx.freelist_head_addr(cls),
                Some(a as usize),
                "a merged free block right after the prologue must still be reachable from its class head"
            );

            ctx.deallocate(c);
            ctx.check_heap(false).unwrap();
        }
    }

    #[test]
    fn payload_pointers_are_eight_byte_aligned() {
        let mut ctx = fresh();
        unsafe {
            for n in [1usize, 7, 8, 9, 63, 1000, 1 << 16] {
                let p = ctx.allocate(n);
                assert!(!p.is_null());
                assert_eq!(p as usize % 8, 0, "allocate({n}) must be 8-byte aligned");
            }
        }
    }
}
