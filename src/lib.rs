//! # `sbrk-alloc`
//!
//! A general-purpose dynamic memory allocator over a contiguous,
//! monotonically growable heap segment — the kind of allocator a libc
//! builds on top of `sbrk`/`brk`, minus the OS plumbing.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  Allocator<S>                  │
//! │   allocate · release · reallocate · getfree    │
//! └───────────────┬─────────────────┬──────────────┘
//!                 │                 │
//! ┌───────────────▼───────┐ ┌───────▼─────────────┐
//! │       free_list        │ │        block        │
//! │  circular doubly linked│ │ header/footer,       │
//! │  list, O(1) link/unlink│ │ boundary tags,       │
//! │                        │ │ neighbour probes     │
//! └────────────────────────┘ └──────────────────────┘
//!                 │
//! ┌───────────────▼─────────────────┐
//! │             segment              │
//! │  Segment trait (external) +      │
//! │  VecSegment reference impl       │
//! └───────────────────────────────────┘
//! ```
//!
//! ## Core algorithm
//!
//! Every block is a run of `UNIT`-sized allocation units: a header, a
//! footer, and payload in between. Both boundary tags carry the block's
//! total unit count, so given any block's address the release path can find
//! its physical neighbours in O(1) and decide whether to coalesce. Free
//! blocks additionally form a circular doubly linked list — `next` lives in
//! the header, `prev` lives in the footer — with a roving head (`freep`)
//! that migrates on every operation. Allocation is first-fit with
//! upper-end splitting; release immediately coalesces with both physical
//! neighbours before reinserting.
//!
//! ## Concurrency
//!
//! None. The allocator is single-threaded and non-reentrant; it holds no
//! locks. Callers serialize their own access (see [`Allocator`]'s docs).
//!
//! ## Usage
//!
//! ```
//! use sbrk_alloc::Allocator;
//!
//! let mut a = Allocator::with_defaults();
//! a.init();
//!
//! let p = a.allocate(128);
//! assert!(!p.is_null());
//! unsafe { a.release(p) };
//!
//! a.deinit();
//! ```

pub mod block;
pub mod error;
pub mod free_list;
pub mod segment;

mod engine;

pub use engine::Allocator;
pub use error::AllocError;
pub use segment::{Segment, VecSegment};

#[allow(clippy::too_long_first_doc_paragraph)]
pub mod global {
    //! Process-wide convenience API.
    //!
    //! Mirrors the bare operation names of the allocator contract (`init`,
    //! `allocate`, `release`, …), the way `kernel-alloc`'s `static_heap`
    //! module wraps a `FreeListAllocator` behind free functions for callers
    //! that don't want to thread a handle through.
    //!
    //! Unlike that module's `SpinLock`, there is no internal locking here:
    //! this allocator never takes locks. The global instance is a bare
    //! `UnsafeCell`; calling any function here
    //! from more than one thread, or reentrantly from within a `log`
    //! sink invoked by one of these functions, is undefined. Prefer
    //! [`crate::Allocator`] directly when that matters.

    use crate::{AllocError, Allocator, VecSegment};
    use std::cell::UnsafeCell;
    use std::sync::LazyLock;

    struct GlobalCell(UnsafeCell<Allocator<VecSegment>>);

    // SAFETY: see the module-level safety note — callers serialize access themselves.
    unsafe impl Sync for GlobalCell {}
    // SAFETY: required for `LazyLock<GlobalCell>`; no thread actually shares this cell (see above).
    #[allow(clippy::non_send_fields_in_send_ty)]
    unsafe impl Send for GlobalCell {}

    static GLOBAL: LazyLock<GlobalCell> =
        LazyLock::new(|| GlobalCell(UnsafeCell::new(Allocator::with_defaults())));

    /// # Safety
    /// The caller must not call any `global` function concurrently with
    /// this one, and must not call it reentrantly (e.g. from a `log` sink).
    unsafe fn handle() -> &'static mut Allocator<VecSegment> {
        // SAFETY: forwarded from the caller via this function's own contract.
        unsafe { &mut *GLOBAL.0.get() }
    }

    /// Initialise the default segment; free list starts empty.
    pub fn init() {
        // SAFETY: single-threaded use per module safety note.
        unsafe { handle() }.init();
    }

    /// Reset the default segment; free list starts empty.
    pub fn reset() {
        // SAFETY: single-threaded use per module safety note.
        unsafe { handle() }.reset();
    }

    /// Tear down the default segment.
    pub fn deinit() {
        // SAFETY: single-threaded use per module safety note.
        unsafe { handle() }.deinit();
    }

    /// Sum of payload+metadata bytes currently on the free list.
    #[must_use]
    pub fn getfree() -> usize {
        // SAFETY: single-threaded use per module safety note.
        unsafe { handle() }.getfree()
    }

    /// See [`Allocator::allocate`].
    #[must_use]
    pub fn allocate(nbytes: usize) -> *mut u8 {
        // SAFETY: single-threaded use per module safety note.
        unsafe { handle() }.allocate(nbytes)
    }

    /// See [`Allocator::release`].
    ///
    /// # Safety
    /// Same contract as [`Allocator::release`], plus the module-level safety
    /// note (no concurrent or reentrant calls into this module).
    pub unsafe fn release(payload: *mut u8) {
        // SAFETY: forwarded from this function's own contract.
        unsafe { handle().release(payload) };
    }

    /// See [`Allocator::reallocate`].
    ///
    /// # Safety
    /// Same contract as [`Allocator::reallocate`], plus the module-level
    /// safety note (no concurrent or reentrant calls into this module).
    #[must_use]
    pub unsafe fn reallocate(payload: *mut u8, nbytes: usize) -> *mut u8 {
        // SAFETY: forwarded from this function's own contract.
        unsafe { handle().reallocate(payload, nbytes) }
    }

    /// See [`Allocator::allocate_zeroed`].
    #[must_use]
    pub fn allocate_zeroed(count: usize, elem_size: usize) -> *mut u8 {
        // SAFETY: single-threaded use per module safety note.
        unsafe { handle() }.allocate_zeroed(count, elem_size)
    }

    /// The most recent failure, if any; see [`Allocator::last_error`].
    #[must_use]
    pub fn last_error() -> Option<AllocError> {
        // SAFETY: single-threaded use per module safety note.
        unsafe { handle() }.last_error()
    }
}
