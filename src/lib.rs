#![no_std]

extern crate alloc;

use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

mod blk_alloc;
mod compar;
mod insert;
mod iter;
mod layout;
mod remove;

pub use blk_alloc::{alloc_blk, alloc_raw, dealloc_blk, dealloc_raw, init_blk};
pub use compar::{
    Comparator, KeyRange, OrdComparator, RangeComparator, RangeExclusiveComparator,
};
pub use iter::{Cursor, Iter, Keys, Values};
pub use layout::{align_up, BlkHdr, BlkLayout, BlkTag, SLOT_ALIGN};

use alloc::format;
use alloc::string::String;
use layout::{carve, BlkParts};

/// Default node slots per block.
pub const DEFAULT_MAX_NBLK: usize = 16;

/// Keyed skip list map: comparator-ordered entries stored in fixed-capacity
/// raw-memory blocks.
///
/// Every entry lives in a leaf block; leaves are doubly chained for O(1)
/// in-order stepping, and each node of an internal block holds a separator
/// key bounding the keys of its child subtree from above. Rebalancing is
/// done on the way down: `insert` splits full blocks before entering them
/// and `remove` tops up minimum-occupancy blocks before entering them, so
/// neither operation needs a second, upward pass.
///
/// The map is single-threaded; callers serialize access. Values are owned
/// by the map and handed back on removal or replacement.
pub struct KslMap<K, V, C: Comparator<K>> {
    /// Root block. Always present, even when empty.
    head: NonNull<u8>,
    /// Leftmost leaf.
    front: NonNull<u8>,
    /// Rightmost leaf.
    back: NonNull<u8>,

    /// Fixed block layout computed from the key/value types.
    layout: BlkLayout,
    compar: C,

    // Total number of entries across all leaves
    len_count: usize,
    _marker: PhantomData<(K, V)>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KslError {
    /// Block allocation failed.
    OutOfMemory,
    /// Requested block capacity cannot satisfy the occupancy bounds.
    InvalidCapacity,
}

impl fmt::Display for KslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KslError::OutOfMemory => write!(f, "OutOfMemory"),
            KslError::InvalidCapacity => write!(f, "InvalidCapacity"),
        }
    }
}

impl core::error::Error for KslError {}

impl<K, V, C: Comparator<K>> KslMap<K, V, C> {
    /// Construct with the default block capacity.
    pub fn new(compar: C) -> Result<Self, KslError> {
        Self::with_block_capacity(compar, DEFAULT_MAX_NBLK)
    }

    /// Construct with an explicit node-slot capacity per block.
    ///
    /// Capacities below 4 cannot keep two half-full blocks mergeable and
    /// are rejected.
    pub fn with_block_capacity(compar: C, cap: usize) -> Result<Self, KslError> {
        if cap < 4 || cap > u16::MAX as usize {
            return Err(KslError::InvalidCapacity);
        }
        let layout = BlkLayout::compute_for_cap::<K, V>(cap as u16);
        let head = unsafe { alloc_blk(&layout, BlkTag::Leaf).ok_or(KslError::OutOfMemory)? };
        Ok(Self {
            head,
            front: head,
            back: head,
            layout,
            compar,
            len_count: 0,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.len_count
    }

    pub fn is_empty(&self) -> bool {
        self.len_count == 0
    }

    /// Returns the configured block layout.
    pub fn block_layout(&self) -> &BlkLayout {
        &self.layout
    }

    /// Drop every entry and reset to a single empty leaf root. The root
    /// allocation is reused, so this cannot fail.
    pub fn clear(&mut self) {
        unsafe {
            let parts = self.parts(self.head);
            if parts.is_leaf() {
                for i in 0..parts.n() {
                    core::ptr::drop_in_place(parts.key_ptr(i));
                    core::ptr::drop_in_place(parts.data_ptr(i));
                }
            } else {
                for i in 0..parts.n() {
                    let child = self.child_at(self.head, i);
                    self.free_blk(child);
                    core::ptr::drop_in_place(parts.key_ptr(i));
                }
            }
            init_blk(self.head, BlkTag::Leaf);
        }
        self.front = self.head;
        self.back = self.head;
        self.len_count = 0;
    }

    pub fn is_leaf_root(&self) -> bool {
        unsafe { self.blk_is_leaf(self.head) }
    }

    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        unsafe {
            let mut cur = self.front.as_ptr();
            while !cur.is_null() {
                count += 1;
                cur = (*(cur as *const BlkHdr)).next;
            }
        }
        count
    }

    // =============
    // Internal helpers
    // =============

    #[inline(always)]
    pub(crate) unsafe fn parts(&self, blk: NonNull<u8>) -> BlkParts<K, V> {
        carve::<K, V>(blk, &self.layout)
    }

    #[inline(always)]
    pub(crate) unsafe fn blk_n(&self, blk: NonNull<u8>) -> usize {
        (*(blk.as_ptr() as *const BlkHdr)).n as usize
    }

    #[inline(always)]
    pub(crate) unsafe fn blk_is_leaf(&self, blk: NonNull<u8>) -> bool {
        (*(blk.as_ptr() as *const BlkHdr)).tag == BlkTag::Leaf
    }

    #[inline(always)]
    pub(crate) unsafe fn child_at(&self, blk: NonNull<u8>, i: usize) -> NonNull<u8> {
        NonNull::new_unchecked(*self.parts(blk).child_ptr(i))
    }

    #[inline]
    pub(crate) fn key_equal(&self, a: &K, b: &K) -> bool {
        !self.compar.less(a, b) && !self.compar.less(b, a)
    }

    #[inline]
    pub(crate) fn less(&self, a: &K, b: &K) -> bool {
        self.compar.less(a, b)
    }

    /// First index in `[0, n]` of `blk` whose key is not less than `key`
    /// under `less`; `n` means every key is smaller.
    #[inline]
    pub(crate) unsafe fn bsearch_by<F>(&self, blk: NonNull<u8>, key: &K, less: &F) -> usize
    where
        F: Fn(&K, &K) -> bool,
    {
        let parts = self.parts(blk);
        let mut left = 0usize;
        let mut right = parts.n();
        while left < right {
            let mid = left + (right - left) / 2;
            if less(&*parts.key_ptr(mid), key) {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        left
    }

    #[inline]
    pub(crate) unsafe fn bsearch(&self, blk: NonNull<u8>, key: &K) -> usize {
        self.bsearch_by(blk, key, &|a, b| self.compar.less(a, b))
    }

    /// Locate the leaf slot holding a key comparator-equal to `key`.
    pub(crate) unsafe fn find_raw(&self, key: &K) -> Option<(NonNull<u8>, usize)> {
        let mut blk = self.head;
        loop {
            let i = self.bsearch(blk, key);
            if self.blk_is_leaf(blk) {
                if i == self.blk_n(blk) || self.compar.less(key, &*self.parts(blk).key_ptr(i)) {
                    return None;
                }
                return Some((blk, i));
            }
            if i == self.blk_n(blk) {
                return None;
            }
            blk = self.child_at(blk, i);
        }
    }

    // =============
    // Lookup
    // =============

    pub fn get(&self, key: &K) -> Option<&V> {
        unsafe {
            let (blk, i) = self.find_raw(key)?;
            Some(&*self.parts(blk).data_ptr(i))
        }
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        unsafe {
            let (blk, i) = self.find_raw(key)?;
            Some(&mut *self.parts(blk).data_ptr(i))
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        unsafe { self.find_raw(key).is_some() }
    }

    /// Cursor at the first entry whose key is not less than `key`, or at
    /// `end` when every key is smaller.
    pub fn lower_bound(&self, key: &K) -> Cursor<'_, K, V, C> {
        unsafe { self.lower_bound_raw(key, &|a, b| self.compar.less(a, b)) }
    }

    /// Like [`KslMap::lower_bound`], but ordered by a caller-supplied
    /// predicate instead of the map's comparator. Useful when entries are
    /// keyed by ranges and the probe is a point.
    pub fn lower_bound_with<F>(&self, key: &K, less: F) -> Cursor<'_, K, V, C>
    where
        F: Fn(&K, &K) -> bool,
    {
        unsafe { self.lower_bound_raw(key, &less) }
    }

    unsafe fn lower_bound_raw<F>(&self, key: &K, less: &F) -> Cursor<'_, K, V, C>
    where
        F: Fn(&K, &K) -> bool,
    {
        let mut blk = self.head;
        loop {
            let i = self.bsearch_by(blk, key, less);
            if self.blk_is_leaf(blk) {
                // a separator may outlive the keys below it; an exhausted
                // leaf position resolves to the next leaf's first entry
                if i == self.blk_n(blk) {
                    let next = (*(blk.as_ptr() as *const BlkHdr)).next;
                    if !next.is_null() {
                        return Cursor::new(self, NonNull::new_unchecked(next), 0);
                    }
                }
                return Cursor::new(self, blk, i);
            }
            if i == self.blk_n(blk) {
                // key is beyond every separator
                return self.end();
            }
            blk = self.child_at(blk, i);
        }
    }

    // =============
    // Key update
    // =============

    /// Replace the key of the entry currently stored under `old` with
    /// `new`, rewriting the separators on the path where needed.
    ///
    /// The caller guarantees `old` is present and that `new` preserves the
    /// entry's position relative to its neighbors. Panics when `old` cannot
    /// be found.
    pub fn update_key(&mut self, old: &K, new: K)
    where
        K: Clone,
    {
        unsafe {
            let mut blk = self.head;
            loop {
                let i = self.bsearch(blk, old);
                assert!(i < self.blk_n(blk), "update_key: key not found");
                let parts = self.parts(blk);
                let kp = parts.key_ptr(i);
                if self.blk_is_leaf(blk) {
                    assert!(self.key_equal(&*kp, old), "update_key: key not found");
                    core::ptr::drop_in_place(kp);
                    core::ptr::write(kp, new);
                    return;
                }
                // rewrite the separator when it carried the old key, or
                // when the new key extends the subtree's upper bound
                if self.key_equal(&*kp, old) || self.compar.less(&*kp, &new) {
                    let sep = new.clone();
                    core::ptr::drop_in_place(kp);
                    core::ptr::write(kp, sep);
                }
                blk = self.child_at(blk, i);
            }
        }
    }

    // =============
    // Teardown
    // =============

    /// Recursively drop a subtree's entries and separator keys, then free
    /// its blocks.
    pub(crate) unsafe fn free_blk(&mut self, blk: NonNull<u8>) {
        let parts = self.parts(blk);
        let n = parts.n();
        if parts.is_leaf() {
            for i in 0..n {
                core::ptr::drop_in_place(parts.key_ptr(i));
                core::ptr::drop_in_place(parts.data_ptr(i));
            }
        } else {
            for i in 0..n {
                self.free_blk(NonNull::new_unchecked(*parts.child_ptr(i)));
                core::ptr::drop_in_place(parts.key_ptr(i));
            }
        }
        dealloc_blk(blk, &self.layout);
    }
}

impl<K, V, C: Comparator<K>> Drop for KslMap<K, V, C> {
    fn drop(&mut self) {
        unsafe { self.free_blk(self.head) };
    }
}

// =============================
// Invariant validation
// =============================

struct ValidationState<K> {
    total_items: usize,
    prev_leaf: Option<NonNull<u8>>,
    prev_key: Option<*const K>,
    leaf_depth: Option<usize>,
}

impl<K, V, C: Comparator<K>> KslMap<K, V, C> {
    pub fn check_invariants(&self) -> bool {
        self.check_invariants_detailed().is_ok()
    }

    /// Walk the whole structure and report the first violated invariant:
    /// occupancy bounds, in-block and global key order, separator bounds,
    /// uniform leaf depth, sibling chain integrity, and the entry count.
    pub fn check_invariants_detailed(&self) -> Result<(), String> {
        let mut state = ValidationState {
            total_items: 0,
            prev_leaf: None,
            prev_key: None,
            leaf_depth: None,
        };

        unsafe {
            self.validate_blk(self.head, None, true, 0, &mut state)?;

            if self.len_count != state.total_items {
                return Err(format!(
                    "len mismatch: recorded {}, counted {}",
                    self.len_count, state.total_items
                ));
            }
            match state.prev_leaf {
                Some(last) => {
                    if last != self.back {
                        return Err("back does not point at the last leaf".into());
                    }
                    if !(*(last.as_ptr() as *const BlkHdr)).next.is_null() {
                        return Err("tail leaf next pointer should be null".into());
                    }
                }
                None => return Err("tree has no leaves".into()),
            }
        }
        Ok(())
    }

    unsafe fn validate_blk(
        &self,
        blk: NonNull<u8>,
        upper: Option<&K>,
        is_root: bool,
        depth: usize,
        state: &mut ValidationState<K>,
    ) -> Result<(), String> {
        let parts = self.parts(blk);
        let n = parts.n();
        let cap = self.layout.cap as usize;
        let min = self.layout.min as usize;

        if n > cap {
            return Err(format!("block holds {} nodes, capacity is {}", n, cap));
        }
        if !is_root && n < min {
            return Err(format!("block underfull: {} nodes, minimum is {}", n, min));
        }

        for i in 1..n {
            if !self.compar.less(&*parts.key_ptr(i - 1), &*parts.key_ptr(i)) {
                return Err("block keys not strictly increasing".into());
            }
        }
        if let Some(up) = upper {
            if n > 0 && self.compar.less(up, &*parts.key_ptr(n - 1)) {
                return Err("block keys exceed the parent separator".into());
            }
        }

        if parts.is_leaf() {
            if n == 0 && !is_root {
                return Err("non-root leaf is empty".into());
            }
            match state.leaf_depth {
                None => state.leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    return Err(format!("leaf depth mismatch: {} vs {}", depth, d))
                }
                _ => {}
            }
            match state.prev_leaf {
                None => {
                    if blk != self.front {
                        return Err("front does not point at the first leaf".into());
                    }
                    if !(*parts.hdr).prev.is_null() {
                        return Err("first leaf prev pointer should be null".into());
                    }
                }
                Some(prev) => {
                    if (*(prev.as_ptr() as *const BlkHdr)).next != blk.as_ptr() {
                        return Err("leaf next pointer mismatch".into());
                    }
                    if (*parts.hdr).prev != prev.as_ptr() {
                        return Err("leaf prev pointer mismatch".into());
                    }
                    if n > 0 {
                        if let Some(pk) = state.prev_key {
                            if !self.compar.less(&*pk, &*parts.key_ptr(0)) {
                                return Err("leaf keys not globally increasing".into());
                            }
                        }
                    }
                }
            }
            state.prev_leaf = Some(blk);
            if n > 0 {
                state.prev_key = Some(parts.key_ptr(n - 1) as *const K);
            }
            state.total_items += n;
            return Ok(());
        }

        if n < 2 {
            return Err("internal block needs at least two children".into());
        }
        for i in 0..n {
            let child = NonNull::new(*parts.child_ptr(i))
                .ok_or_else(|| String::from("internal node child pointer is null"))?;
            self.validate_blk(child, Some(&*parts.key_ptr(i)), false, depth + 1, state)?;
        }
        Ok(())
    }
}
