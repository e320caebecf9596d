//! Per-page metadata: descriptors, free blocks, and the directory slot
//! encoding.

use core::mem::size_of;
use core::ptr::NonNull;

use crate::arena::PAGE_BYTES;

/// An unallocated block, linked intrusively through its first word.
#[repr(C)]
pub(crate) struct FreeBlock {
    pub next: Option<NonNull<FreeBlock>>,
}

/// Metadata record for one active page.
///
/// `block_size` and `free_count` are `u32` so the whole record packs
/// into four machine words on 64-bit targets; that size is what decides
/// which classes can keep their descriptor in the page they describe.
/// On the large path `block_size` doubles as the page-group length
/// (`block_size / PAGE_BYTES` pages) and the other fields stay inert.
#[repr(C)]
pub(crate) struct PageDescriptor {
    pub block_size: u32,
    pub free_count: u32,
    pub free_head: Option<NonNull<FreeBlock>>,
    pub next: Option<NonNull<PageDescriptor>>,
    pub prev: Option<NonNull<PageDescriptor>>,
}

const SLOT_FREE: usize = 0;
const SLOT_BUSY: usize = 1;

/// Decoded directory slot.
///
/// Stored as one machine word per page: 0 for free, 1 for busy, any
/// other value is the address of the governing descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum PageSlot {
    /// The page is unused.
    Free,
    /// Reserved without a descriptor: page 0, the followers of a large
    /// run, and transient reservations during construction.
    Busy,
    /// Governed by the referenced descriptor.
    Desc(NonNull<PageDescriptor>),
}

impl PageSlot {
    pub fn encode(self) -> usize {
        match self {
            PageSlot::Free => SLOT_FREE,
            PageSlot::Busy => SLOT_BUSY,
            PageSlot::Desc(desc) => desc.as_ptr() as usize,
        }
    }

    pub fn decode(word: usize) -> Self {
        match word {
            SLOT_FREE => PageSlot::Free,
            SLOT_BUSY => PageSlot::Busy,
            // any other word is a descriptor address; the arena never
            // hands out address 1
            desc => PageSlot::Desc(unsafe { NonNull::new_unchecked(desc as *mut PageDescriptor) }),
        }
    }
}

/// True when a page of `block_size` keeps its descriptor in its own
/// first block. Blocks outside `[size_of::<PageDescriptor>(),
/// 3 * size_of::<PageDescriptor>()]` get a remote descriptor instead.
#[inline]
pub(crate) const fn is_inline(block_size: usize) -> bool {
    block_size >= size_of::<PageDescriptor>() && block_size <= 3 * size_of::<PageDescriptor>()
}

/// Usable blocks on a page of `block_size`: the raw per-page count,
/// minus one when the descriptor occupies the first block, zero for
/// large leaders.
#[inline]
pub(crate) const fn usable_blocks(block_size: usize) -> usize {
    if block_size >= PAGE_BYTES {
        0
    } else if is_inline(block_size) {
        PAGE_BYTES / block_size - 1
    } else {
        PAGE_BYTES / block_size
    }
}
