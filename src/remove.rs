use core::ptr::{self, NonNull};

use crate::blk_alloc::dealloc_blk;
use crate::iter::Cursor;
use crate::layout::BlkHdr;
use crate::{Comparator, KslMap};

impl<K: Clone, V, C: Comparator<K>> KslMap<K, V, C> {
    /// Remove the entry whose key is comparator-equal to `key` and return
    /// its value, or `None` when no such entry exists.
    ///
    /// Minimum-occupancy blocks on the search path are topped up from a
    /// sibling or merged before the descent enters them, so the removal
    /// itself never has to walk back up.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        unsafe { self.remove_raw(key).map(|(value, _, _)| value) }
    }

    /// Remove and return the value together with a cursor at the removed
    /// entry's successor (`end` when it was the last).
    pub fn remove_iter(&mut self, key: &K) -> Option<(V, Cursor<'_, K, V, C>)> {
        let (value, blk, i) = unsafe { self.remove_raw(key)? };
        Some((value, Cursor::new(self, blk, i)))
    }

    unsafe fn remove_raw(&mut self, key: &K) -> Option<(V, NonNull<u8>, usize)> {
        let min = self.layout.min as usize;
        let mut blk = self.head;

        // the only place the tree loses height: a two-child root whose
        // children both sit at minimum occupancy collapses before descent
        if !self.blk_is_leaf(blk)
            && self.blk_n(blk) == 2
            && self.blk_n(self.child_at(blk, 0)) == min
            && self.blk_n(self.child_at(blk, 1)) == min
        {
            blk = self.merge_node(self.head, 0);
        }

        let (blk, i) = loop {
            let i = self.bsearch(blk, key);
            let n = self.blk_n(blk);
            if self.blk_is_leaf(blk) {
                if i == n || self.less(key, &*self.parts(blk).key_ptr(i)) {
                    return None;
                }
                break (blk, i);
            }
            if i == n {
                return None;
            }
            let child = self.child_at(blk, i);
            if self.blk_n(child) > min {
                blk = child;
                continue;
            }
            if i > 0 && self.blk_n(self.child_at(blk, i - 1)) > min {
                self.shift_from_left(blk, i);
                blk = child;
            } else if i + 1 < n && self.blk_n(self.child_at(blk, i + 1)) > min {
                self.shift_from_right(blk, i);
                blk = child;
            } else if i > 0 {
                blk = self.merge_node(blk, i - 1);
            } else {
                blk = self.merge_node(blk, i);
            }
        };

        let parts = self.parts(blk);
        let n = parts.n();
        ptr::drop_in_place(parts.key_ptr(i));
        let value = ptr::read(parts.data_ptr(i));
        parts.move_slots(i + 1, i, n - i - 1);
        (*parts.hdr).n = (n - 1) as u16;
        self.len_count -= 1;

        // successor of the removed entry; hop when the leaf's tail is gone
        let next = (*parts.hdr).next;
        if i + 1 == n && !next.is_null() {
            Some((value, NonNull::new_unchecked(next), 0))
        } else {
            Some((value, blk, i))
        }
    }

    /// Move the last node of the left sibling onto the front of the child
    /// at parent slot `i`.
    unsafe fn shift_from_left(&mut self, blk: NonNull<u8>, i: usize) {
        let parts = self.parts(blk);
        let lblk = self.child_at(blk, i - 1);
        let cblk = self.child_at(blk, i);
        let lparts = self.parts(lblk);
        let cparts = self.parts(cblk);
        let ln = lparts.n();
        let cn = cparts.n();

        cparts.move_slots(0, 1, cn);
        lparts.copy_slots_to(ln - 1, &cparts, 0, 1);
        (*cparts.hdr).n = (cn + 1) as u16;
        (*lparts.hdr).n = (ln - 1) as u16;

        // the left sibling lost its maximum
        let lmax = (*lparts.key_ptr(ln - 2)).clone();
        let kp = parts.key_ptr(i - 1);
        ptr::drop_in_place(kp);
        ptr::write(kp, lmax);
    }

    /// Move the first node of the right sibling onto the tail of the child
    /// at parent slot `i`.
    unsafe fn shift_from_right(&mut self, blk: NonNull<u8>, i: usize) {
        let parts = self.parts(blk);
        let cblk = self.child_at(blk, i);
        let rblk = self.child_at(blk, i + 1);
        let cparts = self.parts(cblk);
        let rparts = self.parts(rblk);
        let cn = cparts.n();
        let rn = rparts.n();

        rparts.copy_slots_to(0, &cparts, cn, 1);
        rparts.move_slots(1, 0, rn - 1);
        (*cparts.hdr).n = (cn + 1) as u16;
        (*rparts.hdr).n = (rn - 1) as u16;

        // the child's maximum is now the node it took over
        let cmax = (*cparts.key_ptr(cn)).clone();
        let kp = parts.key_ptr(i);
        ptr::drop_in_place(kp);
        ptr::write(kp, cmax);
    }

    /// Merge the children at parent slots `i` and `i + 1` into the left
    /// one. When the parent is a two-node root the merged child becomes the
    /// new root; otherwise slot `i + 1` collapses into slot `i`.
    pub(crate) unsafe fn merge_node(&mut self, blk: NonNull<u8>, i: usize) -> NonNull<u8> {
        let parts = self.parts(blk);
        let lblk = self.child_at(blk, i);
        let rblk = self.child_at(blk, i + 1);
        let lparts = self.parts(lblk);
        let rparts = self.parts(rblk);
        let ln = lparts.n();
        let rn = rparts.n();
        debug_assert!(ln + rn <= self.layout.cap as usize);

        rparts.copy_slots_to(0, &lparts, ln, rn);
        (*lparts.hdr).n = (ln + rn) as u16;

        let rnext = (*rparts.hdr).next;
        (*lparts.hdr).next = rnext;
        if !rnext.is_null() {
            (*(rnext as *mut BlkHdr)).prev = lblk.as_ptr();
        } else if self.back == rblk {
            self.back = lblk;
        }
        dealloc_blk(rblk, &self.layout);

        let n = parts.n();
        if blk == self.head && n == 2 {
            // root collapse
            ptr::drop_in_place(parts.key_ptr(0));
            ptr::drop_in_place(parts.key_ptr(1));
            dealloc_blk(blk, &self.layout);
            self.head = lblk;
        } else {
            // slot i + 1 slides into slot i, keeping the merged maximum
            ptr::drop_in_place(parts.key_ptr(i));
            parts.move_slots(i + 1, i, n - i - 1);
            (*parts.hdr).n = (n - 1) as u16;
            ptr::write(parts.child_ptr(i), lblk.as_ptr());
        }
        lblk
    }
}
