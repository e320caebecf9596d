//! # `zonal` - fixed-arena, size-segregated block allocation
//!
//! A block allocator that serves every request out of one fixed,
//! contiguous byte region. Small requests are rounded to a power of two
//! and drawn from per-class pools of equal-sized blocks; requests larger
//! than half a page claim a contiguous run of whole pages. All metadata
//! (the page directory, the free-list table and every page descriptor)
//! lives inside the region itself, so the allocator consumes no memory
//! beyond the arena it owns.
//!
//! ## Key properties
//!
//! - **Self-contained**: one region, acquired once; no request ever
//!   escapes to a host allocator
//! - **Size-segregated**: power-of-two classes with intrusive in-block
//!   free lists and O(1) pops
//! - **Reclaiming**: a page whose last block comes back is returned to
//!   the pool, remote descriptors included
//! - **Observable**: a one-line-per-page debug dump of the directory
//!
//! ## Example
//!
//! ```rust
//! use zonal::ZoneAlloc;
//!
//! let mut zone = ZoneAlloc::new().expect("arena");
//!
//! let small = zone.alloc(100).expect("rounds up to 128");
//! let large = zone.alloc(8192).expect("claims four pages");
//!
//! unsafe {
//!     zone.free(small);
//!     zone.free(large);
//! }
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
// block sizes fit in u32; the const assertions below pin this
#![allow(clippy::cast_possible_truncation)]

pub mod arena;
pub mod zone;

pub use arena::{Arena, ARENA_BYTES, PAGE_BYTES, PAGE_COUNT};
pub use zone::{ZoneAlloc, MIN_BLOCK_SIZE, NUM_SIZE_CLASSES};

// Compile-time checks for the layout the allocator is built on.
const _: () = {
    use core::mem::size_of;

    use crate::zone::descriptor::{FreeBlock, PageDescriptor};

    // Pages tile the arena exactly.
    assert!(ARENA_BYTES.is_power_of_two());
    assert!(PAGE_BYTES.is_power_of_two());
    assert!(ARENA_BYTES % PAGE_BYTES == 0);

    // The intrusive link is one machine word at the block head, and the
    // smallest admissible block can hold a whole descriptor.
    assert!(size_of::<FreeBlock>() == size_of::<usize>());
    assert!(size_of::<PageDescriptor>() >= size_of::<FreeBlock>());

    // Remote descriptors must land in a small size class.
    assert!(PAGE_BYTES >= 4 * size_of::<PageDescriptor>());

    // The page directory and the free-list table share page 0.
    assert!((PAGE_COUNT + NUM_SIZE_CLASSES) * size_of::<usize>() <= PAGE_BYTES);

    // `block_size` is stored in 32 bits, including large page groups.
    assert!(ARENA_BYTES <= u32::MAX as usize);
};
