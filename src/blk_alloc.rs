extern crate alloc;

use alloc::alloc::{alloc, dealloc, Layout};
use core::ptr::{self, NonNull};

use crate::layout::{BlkHdr, BlkLayout, BlkTag};

#[inline]
fn layout_for(bytes: usize, align: usize) -> Layout {
    // `align` is BlkLayout::max_align: a max over align_of results and
    // SLOT_ALIGN, so it is a nonzero power of two and the block size is
    // already rounded to it. from_size_align cannot fail on these inputs.
    match Layout::from_size_align(bytes, align) {
        Ok(layout) => layout,
        Err(_) => unreachable!("block layout rejected"),
    }
}

#[inline]
pub unsafe fn alloc_raw(bytes: usize, align: usize) -> Option<NonNull<u8>> {
    let layout = layout_for(bytes, align);
    NonNull::new(alloc(layout))
}

#[inline]
pub unsafe fn dealloc_raw(ptr: NonNull<u8>, bytes: usize, align: usize) {
    let layout = layout_for(bytes, align);
    dealloc(ptr.as_ptr(), layout);
}

/// Allocate one block and initialize its header.
#[inline]
pub unsafe fn alloc_blk(layout: &BlkLayout, tag: BlkTag) -> Option<NonNull<u8>> {
    let p = alloc_raw(layout.bytes, layout.max_align)?;
    init_blk(p, tag);
    Some(p)
}

/// Reset an existing block's header to an empty, unchained state.
#[inline]
pub unsafe fn init_blk(base: NonNull<u8>, tag: BlkTag) {
    ptr::write(
        base.as_ptr() as *mut BlkHdr,
        BlkHdr {
            tag,
            n: 0,
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        },
    );
}

#[inline]
pub unsafe fn dealloc_blk(base: NonNull<u8>, layout: &BlkLayout) {
    dealloc_raw(base, layout.bytes, layout.max_align);
}
