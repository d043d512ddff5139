//! # allocore - A segregated free-list heap allocator
//!
//! A `malloc`/`free`/`realloc`/`calloc`-shaped memory manager over a
//! monotonically growing, contiguous region of address space. Grounded in
//! the classic boundary-tag design: packed header/footer words, segregated
//! free lists keyed by size class, immediate coalescing, and bounded
//! best-fit placement.
//!
//! ## Crate structure
//!
//! ```text
//!   allocore
//!   ├── align     - fixed word/alignment constants and rounding
//!   ├── block     - boundary-tag layout: header/footer packing, neighbour navigation
//!   ├── freelist  - segregated size-class index over in-band free-block links
//!   ├── coalesce  - merges a freed block with free neighbours
//!   ├── place     - bounded best-fit search and splitting
//!   ├── extend    - grows the managed region by one system call
//!   ├── provider  - the `AddressProvider` abstraction (sbrk or in-memory)
//!   ├── error     - error types outside the null-on-failure ABI
//!   └── heap      - `HeapContext`: wires the above into allocate/deallocate/reallocate
//! ```
//!
//! ## Quick start
//!
//! ```
//! use allocore::{HeapContext, provider::MemoryProvider};
//!
//! let mut heap = HeapContext::new(MemoryProvider::new(1 << 20));
//! heap.init().unwrap();
//!
//! unsafe {
//!     let p = heap.allocate(64);
//!     assert!(!p.is_null());
//!     heap.deallocate(p);
//! }
//! ```
//!
//! ## Safety
//!
//! This crate manages raw memory directly: every operation on a
//! [`heap::HeapContext`] past `init` is `unsafe`, and correctness depends on
//! callers not presenting stale or foreign pointers to `deallocate`/
//! `reallocate`.
//!
//! ## Non-goals
//!
//! Single-threaded and non-reentrant by design: no locks, no per-thread
//! arenas, no return-to-OS shrinking. A `HeapContext` is not `Send`/`Sync`
//! and is not made so artificially.

pub mod align;
pub mod block;
pub mod coalesce;
pub mod error;
pub mod extend;
pub mod freelist;
pub mod heap;
pub mod place;
pub mod provider;

pub use error::AllocError;
pub use heap::{HeapConfig, HeapContext};
