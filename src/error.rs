//! Errors for the surface that sits outside the malloc-style ABI (spec.md
//! §7 keeps `allocate`/`deallocate`/`reallocate`/`zero_allocate` on a
//! null-on-failure contract deliberately; `init` and the address provider
//! are not part of that contract and get a real error type instead). No
//! `thiserror`/`anyhow` dependency is pulled in for one small enum — none
//! of the example repos in this corpus reach for one either.

use std::fmt;

/// Failure modes for [`crate::heap::HeapContext::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The address provider refused the initial sentinel reservation.
    ProviderExhausted,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderExhausted => {
                write!(f, "address provider refused the initial heap reservation")
            }
        }
    }
}

impl std::error::Error for AllocError {}
