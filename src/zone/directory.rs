//! The page directory and free-list table, overlaid on page 0.
//!
//! Page 0 never serves blocks; its first `PAGE_COUNT` words are the
//! directory (one [`PageSlot`] per page) and the next
//! `NUM_SIZE_CLASSES` words are the free-list table (one descriptor
//! head per size class). Neither ever moves.

use core::ptr::NonNull;

use crate::arena::{Arena, PAGE_COUNT};
use crate::zone::descriptor::{PageDescriptor, PageSlot};
use crate::zone::size_class::NUM_SIZE_CLASSES;

const WORD: usize = core::mem::size_of::<usize>();
const DIRECTORY_OFFSET: usize = 0;
const FREE_TABLE_OFFSET: usize = DIRECTORY_OFFSET + PAGE_COUNT * WORD;

pub(crate) fn slot(arena: &Arena, page: usize) -> PageSlot {
    debug_assert!(page < PAGE_COUNT);
    PageSlot::decode(arena.read_word(DIRECTORY_OFFSET + page * WORD))
}

pub(crate) fn set_slot(arena: &mut Arena, page: usize, slot: PageSlot) {
    debug_assert!(page < PAGE_COUNT);
    arena.write_word(DIRECTORY_OFFSET + page * WORD, slot.encode());
}

pub(crate) fn class_head(arena: &Arena, class: usize) -> Option<NonNull<PageDescriptor>> {
    debug_assert!(class < NUM_SIZE_CLASSES);
    NonNull::new(arena.read_word(FREE_TABLE_OFFSET + class * WORD) as *mut PageDescriptor)
}

pub(crate) fn set_class_head(
    arena: &mut Arena,
    class: usize,
    head: Option<NonNull<PageDescriptor>>,
) {
    debug_assert!(class < NUM_SIZE_CLASSES);
    let word = head.map_or(0, |desc| desc.as_ptr() as usize);
    arena.write_word(FREE_TABLE_OFFSET + class * WORD, word);
}

/// Resets both tables to their post-init state: page 0 busy, every other
/// page free, every class head cleared.
pub(crate) fn reset(arena: &mut Arena) {
    for page in 0..PAGE_COUNT {
        set_slot(arena, page, PageSlot::Free);
    }
    set_slot(arena, 0, PageSlot::Busy);
    for class in 0..NUM_SIZE_CLASSES {
        set_class_head(arena, class, None);
    }
}
