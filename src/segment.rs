//! The segment provider contract and a reference implementation.
//!
//! [`Segment`] is an external collaborator: the interesting part of this
//! crate is the allocator that *consumes* this trait, not the segment
//! itself. A concrete implementation is still required to have a runnable,
//! testable crate, so [`VecSegment`] provides one: a
//! capacity-bounded, once-reserved byte buffer that plays the role a real
//! `sbrk`-backed OS region would. The capacity is reserved exactly once, at
//! [`Segment::init`] time, so (unlike a plain growable `Vec<u8>`) growing the
//! committed region can never relocate bytes already handed out as block
//! storage.

use crate::block::UNIT;

/// The `sbrk`-style segment contract the allocation engine consumes.
///
/// Implementors provide a contiguous, monotonically growable byte region:
/// `heap_lo()` never changes once `init` succeeds, and `heap_hi()` only ever
/// moves upward (via [`Segment::sbrk`]) until [`Segment::reset`] or
/// [`Segment::deinit`].
pub trait Segment {
    /// Acquire the segment. Fixes the low watermark; high starts equal to low.
    fn init(&mut self);
    /// Roll the high watermark back to the low watermark. All block pointers
    /// obtained before this call are no longer valid.
    fn reset(&mut self);
    /// Release the segment entirely.
    fn deinit(&mut self);
    /// Inclusive low watermark.
    fn heap_lo(&self) -> *mut u8;
    /// Inclusive high watermark (the last valid byte).
    fn heap_hi(&self) -> *mut u8;
    /// `heap_hi() - heap_lo() + 1`, in bytes.
    fn heapsize(&self) -> usize;
    /// Growth granularity hint, in bytes.
    fn pagesize(&self) -> usize;
    /// Extend the high watermark by `n` bytes. Returns a pointer to the start
    /// of the newly added region, or `None` if the segment cannot grow.
    fn sbrk(&mut self, n: usize) -> Option<*mut u8>;
}

/// One storage element, sized and aligned identically to a header/footer
/// [`crate::block::Header`] unit, so the backing buffer is unit-aligned for
/// free with no extra bookkeeping.
#[repr(align(16))]
#[derive(Clone, Copy)]
struct StorageUnit(#[allow(dead_code)] [u8; UNIT]);

/// Reference [`Segment`] implementation: a fixed-capacity byte buffer
/// reserved up front, with a monotonic commit cursor standing in for a real
/// OS-level `sbrk`.
pub struct VecSegment {
    storage: Box<[StorageUnit]>,
    capacity: usize,
    committed: usize,
    page_size: usize,
    initialized: bool,
}

impl VecSegment {
    /// Construct a segment with room for up to `capacity` bytes, grown in
    /// `page_size`-byte increments. Does not reserve memory until [`Segment::init`].
    #[must_use]
    pub fn new(capacity: usize, page_size: usize) -> Self {
        Self {
            storage: Box::new([]),
            capacity,
            committed: 0,
            page_size,
            initialized: false,
        }
    }

    /// Construct a segment with a 64 MiB capacity and 4 KiB pages — a
    /// reasonable default for a standalone process heap.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(64 * 1024 * 1024, 4096)
    }
}

impl Segment for VecSegment {
    fn init(&mut self) {
        let units = self.capacity.div_ceil(UNIT);
        self.storage = vec![StorageUnit([0; UNIT]); units].into_boxed_slice();
        self.committed = 0;
        self.initialized = true;
    }

    fn reset(&mut self) {
        self.committed = 0;
    }

    fn deinit(&mut self) {
        self.storage = Box::new([]);
        self.committed = 0;
        self.initialized = false;
    }

    fn heap_lo(&self) -> *mut u8 {
        debug_assert!(self.initialized, "segment used before init()");
        self.storage.as_ptr().cast_mut().cast()
    }

    fn heap_hi(&self) -> *mut u8 {
        // SAFETY: offset stays within (or one past, at `committed == 0`) the
        // reserved storage, matching the "high == low at init" convention.
        unsafe { self.heap_lo().add(self.heapsize() - 1) }
    }

    fn heapsize(&self) -> usize {
        self.committed.max(1)
    }

    fn pagesize(&self) -> usize {
        self.page_size
    }

    fn sbrk(&mut self, n: usize) -> Option<*mut u8> {
        if !self.initialized || self.committed + n > self.storage.len() * UNIT {
            return None;
        }
        // SAFETY: `committed + n` was just checked against the reserved capacity.
        let ptr = unsafe { self.heap_lo().add(self.committed) };
        self.committed += n;
        Some(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_fixes_low_watermark_with_high_equal_to_low() {
        let mut seg = VecSegment::new(4096, 4096);
        seg.init();
        assert_eq!(seg.heap_lo(), seg.heap_hi());
        assert_eq!(seg.heapsize(), 1);
    }

    #[test]
    fn sbrk_extends_monotonically_and_keeps_addresses_stable() {
        let mut seg = VecSegment::new(4096, 4096);
        seg.init();
        let lo = seg.heap_lo();
        let first = seg.sbrk(1024).expect("room for first growth");
        assert_eq!(first, lo);
        assert_eq!(seg.heap_lo(), lo, "growth must not relocate the low watermark");
        let second = seg.sbrk(1024).expect("room for second growth");
        assert_eq!(second, unsafe { lo.add(1024) });
        assert_eq!(seg.heapsize(), 2048);
    }

    #[test]
    fn sbrk_fails_past_capacity() {
        let mut seg = VecSegment::new(1024, 1024);
        seg.init();
        assert!(seg.sbrk(2048).is_none());
        assert!(seg.sbrk(1024).is_some());
        assert!(seg.sbrk(1).is_none());
    }

    #[test]
    fn reset_rolls_high_back_to_low_without_touching_capacity() {
        let mut seg = VecSegment::new(4096, 4096);
        seg.init();
        seg.sbrk(2048).unwrap();
        seg.reset();
        assert_eq!(seg.heapsize(), 1);
        assert!(seg.sbrk(4096).is_some());
    }
}
