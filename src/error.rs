//! Error kinds surfaced by the public allocator API.
//!
//! Heap corruption is deliberately not a variant here: it is fatal and
//! unrecoverable, surfaced via an assertion that aborts the program, not a
//! `Result`.

/// Recoverable failure kinds from the allocator's public operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// The segment could not be grown to satisfy a request.
    #[error("out of memory: segment cannot grow to satisfy the request")]
    OutOfMemory,
    /// `count * elem_size` overflowed in `allocate_zeroed`.
    #[error("allocate_zeroed: count * elem_size overflowed")]
    Overflow,
}
