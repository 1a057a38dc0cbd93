//! The allocation engine, release & coalescing logic, and growth protocol,
//! combined into one [`Allocator`] the way `kernel-alloc`'s
//! `FreeListAllocator` combines find/add/coalesce under a single type.

use crate::block::{self, BlockPtr};
use crate::error::AllocError;
use crate::free_list::FreeList;
use crate::segment::{Segment, VecSegment};

/// A single-threaded, non-reentrant first-fit allocator over a segment `S`.
///
/// Lifecycle: `init` → any mix of `allocate`/`release`/`reallocate`/
/// `allocate_zeroed`/`reset` → `deinit`. `reset` discards every outstanding
/// block; pointers obtained before it are no longer valid. There is no
/// internal locking: callers must serialize their own access.
pub struct Allocator<S> {
    segment: S,
    free_list: FreeList,
    last_error: Option<AllocError>,
}

impl<S: Segment> Allocator<S> {
    /// Wrap a not-yet-initialized segment. Call [`Allocator::init`] before
    /// any other operation.
    pub const fn new(segment: S) -> Self {
        Self {
            segment,
            free_list: FreeList::new(),
            last_error: None,
        }
    }

    /// Acquire the segment; the free list starts empty.
    pub fn init(&mut self) {
        self.segment.init();
        self.free_list = FreeList::new();
        self.last_error = None;
    }

    /// Roll the segment back to empty. Every pointer handed out before this
    /// call is no longer valid.
    pub fn reset(&mut self) {
        self.segment.reset();
        self.free_list = FreeList::new();
        self.last_error = None;
    }

    /// Tear down the segment; the free list is empty afterwards.
    pub fn deinit(&mut self) {
        self.segment.deinit();
        self.free_list = FreeList::new();
        self.last_error = None;
    }

    /// The most recent failure from `allocate`/`reallocate`/`allocate_zeroed`.
    /// Cleared at the start of each of those calls.
    pub const fn last_error(&self) -> Option<AllocError> {
        self.last_error
    }

    /// Sum of payload+metadata bytes currently on the free list.
    ///
    /// # Panics
    /// Panics if the free list is found to not be circular — a sign of a bug
    /// in this allocator, never of caller misuse.
    pub fn getfree(&self) -> usize {
        let Some(freep) = self.free_list.freep else {
            return 0;
        };
        let mut total = block::size(freep);
        let mut p = block::next(freep).expect("free list is circular");
        while p != freep {
            total += block::size(p);
            p = block::next(p).expect("free list is circular");
        }
        total * block::UNIT
    }

    fn heap_start_block(&self) -> BlockPtr {
        // SAFETY: `heap_lo()` is fixed and unit-aligned once the segment is initialized.
        unsafe { BlockPtr::new(self.segment.heap_lo().cast()) }
    }

    fn heap_end_block(&self) -> BlockPtr {
        // SAFETY: `heap_hi() + 1` is unit-aligned whenever a block already exists
        // there to probe, since growth always extends by whole units.
        unsafe { BlockPtr::new(self.segment.heap_hi().add(1).cast()) }
    }

    /// Request `n` bytes; returns a max-aligned pointer, or null with
    /// [`Allocator::last_error`] set to [`AllocError::OutOfMemory`].
    ///
    /// # Panics
    /// Panics if the free list or segment bookkeeping is found inconsistent —
    /// this should never happen in correct usage and indicates a bug in this
    /// allocator rather than caller misuse.
    pub fn allocate(&mut self, nbytes: usize) -> *mut u8 {
        self.last_error = None;
        let units = block::units_for(nbytes);

        if self.free_list.freep.is_none() {
            log::trace!("free list empty, growing to seed {units} units");
            if self.grow(units).is_none() {
                self.last_error = Some(AllocError::OutOfMemory);
                return core::ptr::null_mut();
            }
        }

        let mut freep = self.free_list.freep.expect("grow always seeds the free list");
        let mut candidate = block::next(freep).expect("freep is always linked");
        loop {
            if block::size(candidate) >= units {
                return self.take(candidate, units);
            }
            if candidate == freep {
                log::trace!("first-fit wrapped without a fit, growing for {units} units");
                let Some(grown) = self.grow(units) else {
                    self.last_error = Some(AllocError::OutOfMemory);
                    return core::ptr::null_mut();
                };
                self.free_list.freep = block::prev(grown);
                freep = self.free_list.freep.expect("grow always seeds the free list");
                candidate = block::next(freep).expect("freep is always linked");
                continue;
            }
            candidate = block::next(candidate).expect("free list is circular");
        }
    }

    /// Take (whole or split) a free block already known to fit `units`.
    fn take(&mut self, candidate: BlockPtr, units: usize) -> *mut u8 {
        let csize = block::size(candidate);
        // Near-fit collapses into whole-take: a 1-unit residual can't hold header+footer.
        if csize == units || csize == units + 1 {
            if self.free_list.freep == Some(candidate) {
                self.free_list.freep = block::prev(candidate);
            }
            self.free_list.unlink(candidate);
            return block::payload_ptr(candidate);
        }

        // Split: shrink `candidate` in place, carve the allocated block from the upper end
        // so `candidate`'s header address (and its existing free-list links) stay valid.
        let remaining = csize - units;
        let prev_link = block::prev(candidate);
        // SAFETY: `remaining >= 2` since `csize >= units + 2` here.
        unsafe {
            block::set_size(candidate, remaining);
            block::set_prev(candidate, prev_link);
        }
        // SAFETY: `remaining` units into `candidate` is still within the original block.
        let allocated = unsafe { BlockPtr::new(candidate.as_ptr().add(remaining)) };
        // SAFETY: `allocated` spans the top `units` units of the original block.
        unsafe {
            block::set_size(allocated, units);
            block::set_next(allocated, None);
        }
        self.free_list.freep = block::prev(candidate);
        block::payload_ptr(allocated)
    }

    /// Return a block to the pool. A null payload is a no-op.
    ///
    /// # Safety
    /// `payload` must be null, or a pointer previously returned by
    /// [`Allocator::allocate`]/[`Allocator::allocate_zeroed`]/[`Allocator::reallocate`]
    /// on this allocator and not yet released.
    ///
    /// # Panics
    /// Panics if `payload`'s boundary tag is corrupt: a zero size, or a size
    /// larger than the current segment. This is the one sanity check this
    /// allocator performs on a released block; any other form of corruption
    /// is undetected, by design (see DESIGN.md).
    pub unsafe fn release(&mut self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }
        // SAFETY: caller guarantees `payload` was returned by this allocator and not yet released.
        let mut b = unsafe { block::block_from_payload(payload) };
        let declared_size = block::size(b);
        assert!(declared_size > 0, "corrupt block: size field is zero");
        assert!(
            declared_size * block::UNIT <= self.segment.heapsize(),
            "corrupt block: size exceeds current heap"
        );

        if self.free_list.freep.is_none() {
            self.free_list.link(b, None);
            return;
        }

        let heap_end = self.heap_end_block();
        // SAFETY: `b` and `heap_end` both lie within the current segment.
        if let Some(upper) = unsafe { block::after(b, heap_end) }
            && block::is_free(upper)
        {
            log::trace!("coalescing with upper neighbour");
            if self.free_list.freep == Some(upper) {
                self.free_list.freep = block::prev(upper);
            }
            self.free_list.unlink(upper);
            let merged = block::size(b) + block::size(upper);
            // SAFETY: `b` and `upper` are physically adjacent; the merged region is in range.
            unsafe { block::set_size(b, merged) };
        }

        let heap_start = self.heap_start_block();
        // SAFETY: `b` and `heap_start` both lie within the current segment.
        if let Some(lower) = unsafe { block::before(b, heap_start) }
            && block::is_free(lower)
        {
            log::trace!("coalescing with lower neighbour");
            if self.free_list.freep == Some(lower) {
                self.free_list.freep = block::prev(lower);
            }
            self.free_list.unlink(lower);
            let merged = block::size(lower) + block::size(b);
            // SAFETY: `lower` and `b` are physically adjacent; the merged region is in range.
            unsafe { block::set_size(lower, merged) };
            b = lower;
        }

        let anchor = self.free_list.freep;
        self.free_list.link(b, anchor);
        self.free_list.freep = block::prev(b);
    }

    /// Grow the segment and fold the new region into the free list by
    /// routing it through [`Allocator::release`] — the only code path that
    /// installs blocks onto the free list, so all coalescing logic is
    /// exercised uniformly. Returns the resulting `freep`, or `None` if the
    /// segment cannot grow.
    fn grow(&mut self, units: usize) -> Option<BlockPtr> {
        let page_units = self.segment.pagesize() / block::UNIT;
        let n = units.max(page_units);
        let bytes = n * block::UNIT;
        log::debug!("growing segment by {n} units ({bytes} bytes)");
        let Some(region) = self.segment.sbrk(bytes) else {
            log::warn!("sbrk failed to extend segment by {bytes} bytes");
            return None;
        };
        // SAFETY: `sbrk` just committed `bytes` fresh, unit-aligned bytes at `region`.
        let block = unsafe { BlockPtr::new(region.cast()) };
        // SAFETY: `block` spans exactly `n` units of freshly committed storage.
        unsafe { block::set_size(block, n) };
        // SAFETY: `block` was just carved from freshly committed, never-before-released storage.
        unsafe { self.release(block::payload_ptr(block)) };
        self.free_list.freep
    }

    /// If `p` is null, behaves as `allocate(n)`. Otherwise, if the existing
    /// block already has room for `n` bytes, returns `p` unchanged;
    /// otherwise allocates fresh, copies the old payload, and releases `p`.
    ///
    /// # Safety
    /// `p` must be null, or a pointer previously returned by this allocator
    /// and not yet released.
    pub unsafe fn reallocate(&mut self, p: *mut u8, n: usize) -> *mut u8 {
        if p.is_null() {
            return self.allocate(n);
        }
        // SAFETY: caller guarantees `p` was returned by this allocator and not yet released.
        let b = unsafe { block::block_from_payload(p) };
        if block::size(b) >= block::units_for(n) {
            return p;
        }
        let new_ptr = self.allocate(n);
        if new_ptr.is_null() {
            return new_ptr;
        }
        let old_capacity_bytes = (block::size(b) - 2) * block::UNIT;
        let copy_len = old_capacity_bytes.min(n);
        // SAFETY: both pointers reference at least `copy_len` live, non-overlapping bytes.
        unsafe { core::ptr::copy_nonoverlapping(p, new_ptr, copy_len) };
        // SAFETY: caller's contract on `p` forwarded from this function's own contract.
        unsafe { self.release(p) };
        new_ptr
    }

    /// `count * elem_size` bytes, zeroed. Fails with [`AllocError::Overflow`]
    /// (without touching the segment) if the multiplication overflows.
    pub fn allocate_zeroed(&mut self, count: usize, elem_size: usize) -> *mut u8 {
        self.last_error = None;
        let Some(total) = count.checked_mul(elem_size) else {
            self.last_error = Some(AllocError::Overflow);
            return core::ptr::null_mut();
        };
        let p = self.allocate(total);
        if !p.is_null() {
            // SAFETY: `allocate(total)` guarantees at least `total` usable bytes at `p`.
            unsafe { core::ptr::write_bytes(p, 0, total) };
        }
        p
    }
}

impl Allocator<VecSegment> {
    /// Convenience constructor: a 64 MiB segment grown in 4 KiB pages.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(VecSegment::with_defaults())
    }
}

impl<S> core::fmt::Debug for Allocator<S> {
    /// Minimal diagnostic summary: the roving free-list head and the last
    /// recorded failure. Deliberately not a full free-list dump — walking
    /// and pretty-printing every block is a separate concern this crate
    /// leaves to callers (or a future tool) to build on top of [`getfree`](Allocator::getfree).
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Allocator")
            .field("freep", &self.free_list.freep.map(BlockPtr::addr))
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A segment whose page size exactly matches one growth round's unit
    /// count, so `grow()` seeds a free list with a single block of exactly
    /// `units` units — letting each `take()` branch be driven on purpose.
    fn seeded_with(units: usize) -> Allocator<VecSegment> {
        let mut a = Allocator::new(VecSegment::new(1 << 20, units * block::UNIT));
        a.init();
        a
    }

    #[test]
    fn exact_fit_whole_take_empties_the_free_list() {
        let nbytes = 8;
        let units = block::units_for(nbytes);
        let mut a = seeded_with(units);

        let p = a.allocate(nbytes);
        assert!(!p.is_null());
        assert!(a.free_list.freep.is_none(), "exact-fit take must consume the whole block");
    }

    #[test]
    fn near_fit_whole_take_absorbs_a_one_unit_remainder() {
        let nbytes = 8;
        let units = block::units_for(nbytes);
        let mut a = seeded_with(units + 1);

        let p = a.allocate(nbytes);
        assert!(!p.is_null());
        assert!(
            a.free_list.freep.is_none(),
            "a one-unit residual can't host header+footer, so near-fit must take the whole block"
        );
    }

    #[test]
    fn split_leaves_a_free_remainder_sized_to_the_leftover_units() {
        let nbytes = 8;
        let units = block::units_for(nbytes);
        let extra = 5;
        let mut a = seeded_with(units + extra);

        let p = a.allocate(nbytes);
        assert!(!p.is_null());
        let freep = a.free_list.freep.expect("split must leave a free remainder");
        assert_eq!(block::size(freep), extra);
    }
}
