//! Block layout and boundary tags.
//!
//! A block is a contiguous run of [`Header`]-sized *units*. Its first unit is
//! the header, its last unit is the footer; both mirror the block's `size`
//! (total units, header+footer included). The same [`Header`] record type is
//! used at both positions: when a block is free, the header's link slot
//! holds `next` and the footer's link slot holds `prev` (the two halves of
//! one circular doubly linked list entry, split across the block's own
//! boundary tags). When a block is allocated, the header's link slot is
//! forced to `None` — that is the sole discriminator coalescing relies on
//! (invariant 3). Do not repurpose it for payload bookkeeping.
//!
//! This module is the narrow, unsafe-pointer-arithmetic facade; everything
//! above it (`free_list`, `engine`) operates on [`BlockPtr`] handles and
//! never reaches for raw `Header` fields directly.

use core::ptr::NonNull;

/// One allocation unit: header and footer records share this layout.
///
/// Sized and aligned to the platform's strictest common scalar alignment so
/// that `payload_ptr` satisfies invariant 6 (maximal alignment) regardless
/// of what the caller stores there.
#[repr(C, align(16))]
pub(crate) struct Header {
    /// `next` when this record is a free block's header, `prev` when it is a
    /// free block's footer, unspecified (never read) when allocated.
    link: Option<BlockPtr>,
    /// Total units in the block, duplicated identically in header and footer.
    size: usize,
}

/// One unit, in bytes. Also the required alignment of any block's first unit.
pub(crate) const UNIT: usize = size_of::<Header>();

/// Handle to a block's header unit. Never null; free functions in this
/// module are the only code that dereferences it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct BlockPtr(NonNull<Header>);

impl BlockPtr {
    /// # Safety
    /// `ptr` must point to a live, unit-aligned [`Header`] within the segment.
    pub(crate) unsafe fn new(ptr: *mut Header) -> Self {
        debug_assert!(ptr.is_aligned());
        // SAFETY: caller guarantees `ptr` is non-null and points at a valid header.
        Self(unsafe { NonNull::new_unchecked(ptr) })
    }

    pub(crate) const fn as_ptr(self) -> *mut Header {
        self.0.as_ptr()
    }

    pub(crate) fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// Units needed for a `bytes`-byte payload request: header + footer + payload,
/// rounded so the minimum block is always 2 units.
///
/// `units = ceil((bytes + 2*UNIT - 1) / UNIT) + 1` (see DESIGN.md for why the
/// `+1` is kept rather than tightened).
pub(crate) const fn units_for(bytes: usize) -> usize {
    (bytes + 2 * UNIT - 1).div_ceil(UNIT) + 1
}

/// Total units in `block` (mirrored in header and footer).
pub(crate) fn size(block: BlockPtr) -> usize {
    // SAFETY: `block` is a live header unit (invariant upheld by callers).
    unsafe { (*block.as_ptr()).size }
}

/// Set `block`'s unit count in BOTH header and footer.
///
/// # Safety
/// `units` must be >= 2 and the footer unit (`block + units - 1`) must lie
/// within the segment.
pub(crate) unsafe fn set_size(block: BlockPtr, units: usize) {
    debug_assert!(units >= 2);
    unsafe {
        (*block.as_ptr()).size = units;
        (*footer(block, units).as_ptr()).size = units;
    }
}

/// Footer unit of a block whose size is already known to be `units`.
fn footer(block: BlockPtr, units: usize) -> BlockPtr {
    // SAFETY: footer lies at `block + units - 1`, within the block itself.
    unsafe { BlockPtr::new(block.as_ptr().add(units - 1)) }
}

/// Footer unit of `block`, reading its current size from the header.
pub(crate) fn footer_of(block: BlockPtr) -> BlockPtr {
    footer(block, size(block))
}

/// Payload pointer for an allocated `block`: one unit past the header.
pub(crate) const fn payload_ptr(block: BlockPtr) -> *mut u8 {
    // SAFETY: `block + 1` unit stays within the block (minimum size is 2 units).
    unsafe { block.as_ptr().add(1).cast::<u8>() }
}

/// Recover the owning block's header from a payload pointer previously
/// handed out by [`payload_ptr`].
///
/// # Safety
/// `payload` must have been returned by this allocator's `allocate`/
/// `allocate_zeroed` and not yet released.
pub(crate) unsafe fn block_from_payload(payload: *mut u8) -> BlockPtr {
    // SAFETY: caller guarantees `payload` is max-aligned, one unit past a live header.
    #[allow(clippy::cast_ptr_alignment)]
    unsafe {
        BlockPtr::new(payload.cast::<Header>().sub(1))
    }
}

/// `true` iff `block` is currently on the free list (header link is set).
pub(crate) fn is_free(block: BlockPtr) -> bool {
    // SAFETY: `block` is a live header unit.
    unsafe { (*block.as_ptr()).link.is_some() }
}

/// Header-side link: `next` while free, must be `None` while allocated.
pub(crate) fn next(block: BlockPtr) -> Option<BlockPtr> {
    // SAFETY: `block` is a live header unit.
    unsafe { (*block.as_ptr()).link }
}

/// # Safety
/// `block` must be a live header unit.
pub(crate) unsafe fn set_next(block: BlockPtr, value: Option<BlockPtr>) {
    unsafe {
        (*block.as_ptr()).link = value;
    }
}

/// Footer-side link: `prev` while free, meaningless while allocated.
pub(crate) fn prev(block: BlockPtr) -> Option<BlockPtr> {
    // SAFETY: `block`'s footer is a live unit whenever `block` is on the list.
    unsafe { (*footer_of(block).as_ptr()).link }
}

/// # Safety
/// `block` must be a live header unit whose footer is in range.
pub(crate) unsafe fn set_prev(block: BlockPtr, value: Option<BlockPtr>) {
    unsafe {
        (*footer_of(block).as_ptr()).link = value;
    }
}

/// The block physically after `block`, or `None` if that would be at or past
/// `heap_end` (the exclusive top-of-heap header-unit address).
///
/// # Safety
/// `heap_end` must be the current exclusive end of the segment, in header units.
pub(crate) unsafe fn after(block: BlockPtr, heap_end: BlockPtr) -> Option<BlockPtr> {
    let candidate = unsafe { block.as_ptr().add(size(block)) };
    if candidate == heap_end.as_ptr() {
        None
    } else {
        // SAFETY: candidate is a unit-aligned header within `[heap_lo, heap_end)`.
        Some(unsafe { BlockPtr::new(candidate) })
    }
}

/// The block physically before `block`, or `None` if `block` is already at
/// `heap_start` (the header-unit address of the segment's low watermark).
///
/// # Safety
/// `heap_start` must be the segment's current low watermark, in header units.
pub(crate) unsafe fn before(block: BlockPtr, heap_start: BlockPtr) -> Option<BlockPtr> {
    if block == heap_start {
        return None;
    }
    // The unit immediately before `block` is the footer of the prior block.
    let prior_footer = unsafe { block.as_ptr().sub(1) };
    let prior_size = unsafe { (*prior_footer).size };
    let prior_header = unsafe { prior_footer.sub(prior_size - 1) };
    // SAFETY: `prior_header` is the header of the block whose footer we just read.
    Some(unsafe { BlockPtr::new(prior_header) })
}

#[cfg(test)]
#[allow(clippy::cast_ptr_alignment)] // raw_region's Layout is aligned to UNIT
mod tests {
    use super::*;
    use std::alloc::{alloc_zeroed, Layout};

    fn raw_region(units: usize) -> (*mut u8, Layout) {
        let layout = Layout::from_size_align(units * UNIT, UNIT).unwrap();
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        (ptr, layout)
    }

    #[test]
    fn unit_is_max_aligned_and_nonzero() {
        assert_eq!(UNIT, core::mem::size_of::<Header>());
        assert_eq!(UNIT % 16, 0);
    }

    #[test]
    fn units_for_never_produces_sub_minimum_blocks() {
        for bytes in [0usize, 1, 7, 16, 1000] {
            assert!(units_for(bytes) >= 2);
        }
    }

    #[test]
    fn size_roundtrips_through_header_and_footer() {
        let (raw, layout) = raw_region(4);
        unsafe {
            let b = BlockPtr::new(raw.cast::<Header>());
            set_size(b, 4);
            assert_eq!(size(b), 4);
            assert_eq!((*footer_of(b).as_ptr()).size, 4);
            std::alloc::dealloc(raw, layout);
        }
    }

    #[test]
    fn payload_pointer_is_one_unit_past_header() {
        let (raw, layout) = raw_region(3);
        unsafe {
            let b = BlockPtr::new(raw.cast::<Header>());
            set_size(b, 3);
            assert_eq!(payload_ptr(b), raw.add(UNIT));
            assert_eq!(block_from_payload(payload_ptr(b)), b);
            std::alloc::dealloc(raw, layout);
        }
    }

    #[test]
    fn free_discriminator_tracks_header_link() {
        let (raw, layout) = raw_region(2);
        unsafe {
            let b = BlockPtr::new(raw.cast::<Header>());
            set_size(b, 2);
            set_next(b, None);
            assert!(!is_free(b));
            set_next(b, Some(b));
            assert!(is_free(b));
            std::alloc::dealloc(raw, layout);
        }
    }

    #[test]
    fn neighbour_probes_respect_heap_bounds() {
        let (raw, layout) = raw_region(6);
        unsafe {
            let start = BlockPtr::new(raw.cast::<Header>());
            set_size(start, 3);
            let mid = BlockPtr::new(raw.add(3 * UNIT).cast::<Header>());
            set_size(mid, 3);
            let end = BlockPtr::new(raw.add(6 * UNIT).cast::<Header>());

            assert_eq!(after(start, end), Some(mid));
            assert_eq!(after(mid, end), None);
            assert_eq!(before(mid, start), Some(start));
            assert_eq!(before(start, start), None);
            std::alloc::dealloc(raw, layout);
        }
    }
}
