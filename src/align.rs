//! Fixed word-size constants and the rounding arithmetic built on them.
//!
//! Every size in this crate is expressed in one of two fixed units: a
//! 4-byte header/link word (`WORD`) or an 8-byte aligned pair of words
//! (`DWORD`). These are *not* `mem::size_of::<usize>()` — they are fixed
//! regardless of host word size, because the free-list links are stored as
//! 32-bit heap-relative offsets (see `freelist`) and must fit a block's
//! minimum payload no matter what machine this runs on.

/// One header/footer/link word.
pub const WORD: usize = 4;

/// Payload alignment: a pair of words.
pub const DWORD: usize = 8;

/// Minimum block size: header + two link slots + footer.
pub const MIN_BLOCK: usize = 2 * DWORD;

/// Alignment guaranteed for payload addresses returned to callers.
pub const ALIGNMENT: usize = 8;

/// Rounds `n` up to the next multiple of [`DWORD`].
#[inline]
pub const fn round_up_dword(n: usize) -> usize {
    (n + DWORD - 1) & !(DWORD - 1)
}

/// Rounds `n` up to the next multiple of [`WORD`].
#[inline]
pub const fn round_up_word(n: usize) -> usize {
    (n + WORD - 1) & !(WORD - 1)
}
