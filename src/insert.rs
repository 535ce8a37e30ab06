use core::ptr::{self, NonNull};

use crate::blk_alloc::{alloc_blk, dealloc_blk};
use crate::iter::Cursor;
use crate::layout::{BlkHdr, BlkTag};
use crate::{Comparator, KslError, KslMap};

impl<K: Clone, V, C: Comparator<K>> KslMap<K, V, C> {
    /// Insert an entry. Inserting a comparator-equal key replaces the
    /// stored value in place and returns the previous one.
    ///
    /// Splits happen on the way down and allocate before mutating, so an
    /// out-of-memory failure leaves the map exactly as it was.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, KslError> {
        let (_, _, old) = unsafe { self.insert_raw(key, value)? };
        Ok(old)
    }

    /// Insert and return a cursor at the entry, along with the replaced
    /// value when the key was already present.
    pub fn insert_iter(
        &mut self,
        key: K,
        value: V,
    ) -> Result<(Cursor<'_, K, V, C>, Option<V>), KslError> {
        let (blk, i, old) = unsafe { self.insert_raw(key, value)? };
        Ok((Cursor::new(self, blk, i), old))
    }

    unsafe fn insert_raw(
        &mut self,
        key: K,
        value: V,
    ) -> Result<(NonNull<u8>, usize, Option<V>), KslError> {
        let cap = self.layout.cap as usize;
        if self.blk_n(self.head) == cap {
            self.split_head()?;
        }

        let mut blk = self.head;
        while !self.blk_is_leaf(blk) {
            let parts = self.parts(blk);
            let n = parts.n();
            let mut i = self.bsearch(blk, &key);
            if i == n {
                // the new key extends this subtree's maximum: follow the
                // right spine, splitting ahead and raising separators
                i = n - 1;
                if self.blk_n(self.child_at(blk, i)) == cap {
                    self.split_node(blk, i)?;
                    i += 1;
                }
                let raised = key.clone();
                let kp = parts.key_ptr(i);
                ptr::drop_in_place(kp);
                ptr::write(kp, raised);
            } else if self.blk_n(self.child_at(blk, i)) == cap {
                self.split_node(blk, i)?;
                if self.less(&*parts.key_ptr(i), &key) {
                    i += 1;
                    if self.less(&*parts.key_ptr(i), &key) {
                        // the probe outruns the split-off half's separator
                        let raised = key.clone();
                        let kp = parts.key_ptr(i);
                        ptr::drop_in_place(kp);
                        ptr::write(kp, raised);
                    }
                }
            }
            blk = self.child_at(blk, i);
        }

        let parts = self.parts(blk);
        let n = parts.n();
        let i = self.bsearch(blk, &key);
        if i < n && !self.less(&key, &*parts.key_ptr(i)) {
            let dp = parts.data_ptr(i);
            let old = ptr::read(dp);
            ptr::write(dp, value);
            return Ok((blk, i, Some(old)));
        }
        parts.move_slots(i, i + 1, n - i);
        ptr::write(parts.key_ptr(i), key);
        ptr::write(parts.data_ptr(i), value);
        (*parts.hdr).n = (n + 1) as u16;
        self.len_count += 1;
        Ok((blk, i, None))
    }

    /// Split `blk`, moving its upper half into a freshly allocated right
    /// sibling spliced into the chain. Returns the new sibling.
    unsafe fn split_blk(&mut self, blk: NonNull<u8>) -> Result<NonNull<u8>, KslError> {
        let parts = self.parts(blk);
        let tag = if parts.is_leaf() {
            BlkTag::Leaf
        } else {
            BlkTag::Internal
        };
        let rblk = alloc_blk(&self.layout, tag).ok_or(KslError::OutOfMemory)?;
        let rparts = self.parts(rblk);

        let n = parts.n();
        let move_n = n / 2;
        parts.copy_slots_to(n - move_n, &rparts, 0, move_n);
        (*rparts.hdr).n = move_n as u16;
        (*parts.hdr).n = (n - move_n) as u16;

        let old_next = (*parts.hdr).next;
        (*rparts.hdr).next = old_next;
        (*rparts.hdr).prev = blk.as_ptr();
        (*parts.hdr).next = rblk.as_ptr();
        if !old_next.is_null() {
            (*(old_next as *mut BlkHdr)).prev = rblk.as_ptr();
        } else if self.back == blk {
            self.back = rblk;
        }
        Ok(rblk)
    }

    /// Split the full child at parent slot `i` in two, opening a new parent
    /// slot at `i + 1` for the right half.
    unsafe fn split_node(&mut self, blk: NonNull<u8>, i: usize) -> Result<(), KslError> {
        let child = self.child_at(blk, i);
        let rblk = self.split_blk(child)?;

        let parts = self.parts(blk);
        let n = parts.n();
        debug_assert!(n < self.layout.cap as usize);
        parts.move_slots(i + 1, i + 2, n - (i + 1));

        let rparts = self.parts(rblk);
        ptr::write(parts.child_ptr(i + 1), rblk.as_ptr());
        ptr::write(parts.key_ptr(i + 1), (*rparts.key_ptr(rparts.n() - 1)).clone());

        let lparts = self.parts(child);
        let lmax = (*lparts.key_ptr(lparts.n() - 1)).clone();
        let kp = parts.key_ptr(i);
        ptr::drop_in_place(kp);
        ptr::write(kp, lmax);

        (*parts.hdr).n = (n + 1) as u16;
        Ok(())
    }

    /// Grow the tree by one level: the root splits and a fresh internal
    /// root takes over the two halves. The new root is allocated before the
    /// split, so a failure mutates nothing.
    unsafe fn split_head(&mut self) -> Result<(), KslError> {
        let new_head =
            alloc_blk(&self.layout, BlkTag::Internal).ok_or(KslError::OutOfMemory)?;
        let rblk = match self.split_blk(self.head) {
            Ok(rblk) => rblk,
            Err(e) => {
                dealloc_blk(new_head, &self.layout);
                return Err(e);
            }
        };

        let parts = self.parts(new_head);
        let lparts = self.parts(self.head);
        let rparts = self.parts(rblk);
        ptr::write(parts.child_ptr(0), self.head.as_ptr());
        ptr::write(parts.key_ptr(0), (*lparts.key_ptr(lparts.n() - 1)).clone());
        ptr::write(parts.child_ptr(1), rblk.as_ptr());
        ptr::write(parts.key_ptr(1), (*rparts.key_ptr(rparts.n() - 1)).clone());
        (*parts.hdr).n = 2;
        self.head = new_head;
        Ok(())
    }
}
