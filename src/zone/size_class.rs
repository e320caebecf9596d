//! Size rounding and class mapping.
//!
//! Requests are rounded up to the next power of two and indexed by
//! `log2(block_size)`, so the free-list table needs one slot per power of
//! two up to the largest small block (`PAGE_BYTES / 2`). The low slots
//! below the minimum block size stay permanently empty; paying a few
//! unused words keeps the index a plain shift count.

use core::mem::size_of;

use crate::arena::PAGE_BYTES;
use crate::zone::descriptor::PageDescriptor;

/// Number of slots in the free-list table: one per power of two up to
/// `PAGE_BYTES / 2`.
pub const NUM_SIZE_CLASSES: usize = (PAGE_BYTES / 2).ilog2() as usize + 1;

/// Largest block size served by the small path.
pub(crate) const MAX_SMALL_BLOCK: usize = PAGE_BYTES / 2;

/// Smallest admissible block size: a block must be able to hold a page
/// descriptor. Requests whose rounded size falls below this are
/// rejected; a request just under it still rounds up into the smallest
/// class and succeeds.
pub const MIN_BLOCK_SIZE: usize = size_of::<PageDescriptor>();

/// Rounds a request up to the next power of two.
#[inline]
pub(crate) const fn round_size(size: usize) -> usize {
    size.next_power_of_two()
}

/// Free-table index of a rounded (power-of-two) block size.
#[inline]
pub(crate) const fn class_of(rounded: usize) -> usize {
    debug_assert!(rounded.is_power_of_two());
    rounded.trailing_zeros() as usize
}

/// Pages needed to hold `size` bytes on the large path.
#[inline]
pub(crate) const fn pages_needed(size: usize) -> usize {
    size.div_ceil(PAGE_BYTES)
}
