//! The circular, doubly linked free list of free blocks.
//!
//! Membership is the discriminator: a block is free iff its header's `next`
//! is set (see [`crate::block::is_free`]). The list is not address-ordered —
//! traversal order is whatever history of insertions and splits produced it.
//! `freep`, the roving head, references some member or is `None` iff the
//! list is empty.

use crate::block::{self, BlockPtr};

#[derive(Default)]
pub(crate) struct FreeList {
    pub(crate) freep: Option<BlockPtr>,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { freep: None }
    }

    /// Insert `block` immediately before `anchor` in the cycle, or start a
    /// fresh singleton cycle if `anchor` is `None`.
    ///
    /// O(1): touches at most four link fields.
    pub(crate) fn link(&mut self, block: BlockPtr, anchor: Option<BlockPtr>) {
        match anchor {
            None => {
                // SAFETY: `block` is a live header/footer pair handed to us by the engine.
                unsafe {
                    block::set_next(block, Some(block));
                    block::set_prev(block, Some(block));
                }
                self.freep = Some(block);
            }
            Some(anchor) => {
                let anchor_prev = block::prev(anchor).expect("anchor is on the free list");
                // SAFETY: all four blocks touched are live free-list members.
                unsafe {
                    block::set_prev(block, Some(anchor_prev));
                    block::set_next(block, Some(anchor));
                    block::set_next(anchor_prev, Some(block));
                    block::set_prev(anchor, Some(block));
                }
            }
        }
    }

    /// Remove `block` from the cycle it belongs to.
    ///
    /// Nulls `block`'s own links unconditionally — this is what lets
    /// [`crate::block::is_free`] tell allocated and free blocks apart
    /// (invariant 3), not mere bookkeeping hygiene.
    ///
    /// Does not touch `self.freep` except when `block` was the list's sole
    /// member; the engine is responsible for reassigning `freep` away from
    /// `block` *before* calling this when `block` may be the current head.
    pub(crate) fn unlink(&mut self, block: BlockPtr) {
        if block::next(block) == Some(block) {
            // SAFETY: `block` is free (being unlinked) and its own links are live.
            unsafe {
                block::set_next(block, None);
                block::set_prev(block, None);
            }
            self.freep = None;
            return;
        }
        let p = block::prev(block).expect("block is on the free list");
        let n = block::next(block).expect("block is on the free list");
        // SAFETY: `p` and `n` are live free-list neighbours of `block`.
        unsafe {
            block::set_next(p, Some(n));
            block::set_prev(n, Some(p));
            block::set_next(block, None);
            block::set_prev(block, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::{alloc_zeroed, dealloc, Layout};

    /// A tiny fixture: a handful of 2-unit blocks carved out of one raw
    /// allocation, none of them linked to anything yet. Good enough to
    /// exercise `link`/`unlink` in isolation without a whole `Allocator`.
    struct Fixture {
        raw: *mut u8,
        layout: Layout,
        blocks: Vec<BlockPtr>,
    }

    impl Fixture {
        fn new(count: usize) -> Self {
            let layout = Layout::from_size_align(count * 2 * block::UNIT, block::UNIT).unwrap();
            let raw = unsafe { alloc_zeroed(layout) };
            assert!(!raw.is_null());
            let mut blocks = Vec::new();
            for i in 0..count {
                unsafe {
                    let b = BlockPtr::new(raw.add(i * 2 * block::UNIT).cast());
                    block::set_size(b, 2);
                    blocks.push(b);
                }
            }
            Self { raw, layout, blocks }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            unsafe { dealloc(self.raw, self.layout) };
        }
    }

    #[test]
    fn singleton_link_forms_self_cycle() {
        let fx = Fixture::new(1);
        let mut list = FreeList::new();
        list.link(fx.blocks[0], None);
        assert_eq!(list.freep, Some(fx.blocks[0]));
        assert_eq!(block::next(fx.blocks[0]), Some(fx.blocks[0]));
        assert_eq!(block::prev(fx.blocks[0]), Some(fx.blocks[0]));
    }

    #[test]
    fn linking_three_preserves_cycle_invariants() {
        let fx = Fixture::new(3);
        let mut list = FreeList::new();
        list.link(fx.blocks[0], None);
        list.link(fx.blocks[1], Some(fx.blocks[0]));
        list.link(fx.blocks[2], Some(fx.blocks[0]));

        // Every member's next(prev(b)) == b and prev(next(b)) == b.
        for &b in &fx.blocks {
            let n = block::next(b).unwrap();
            let p = block::prev(b).unwrap();
            assert_eq!(block::prev(n).unwrap(), b);
            assert_eq!(block::next(p).unwrap(), b);
        }
    }

    #[test]
    fn unlink_singleton_empties_list() {
        let fx = Fixture::new(1);
        let mut list = FreeList::new();
        list.link(fx.blocks[0], None);
        list.unlink(fx.blocks[0]);
        assert_eq!(list.freep, None);
        assert_eq!(block::next(fx.blocks[0]), None);
        assert_eq!(block::prev(fx.blocks[0]), None);
    }

    #[test]
    fn unlink_middle_member_splices_neighbours() {
        let fx = Fixture::new(3);
        let mut list = FreeList::new();
        list.link(fx.blocks[0], None);
        list.link(fx.blocks[1], Some(fx.blocks[0]));
        list.link(fx.blocks[2], Some(fx.blocks[0]));
        // cycle is now: 0 -> 2 -> 1 -> 0 order depends on insert-before semantics

        let victim = fx.blocks[2];
        let before_next = block::next(victim).unwrap();
        let before_prev = block::prev(victim).unwrap();
        list.unlink(victim);

        assert_eq!(block::next(before_prev), Some(before_next));
        assert_eq!(block::prev(before_next), Some(before_prev));
        assert_eq!(block::next(victim), None);
        assert_eq!(block::prev(victim), None);
    }
}
