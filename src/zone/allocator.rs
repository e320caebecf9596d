//! The request router: small and large allocation, free with page
//! reclamation, realloc, and the debug dump.

use core::fmt;
use core::mem::size_of;
use core::ptr::{self, NonNull};

use crate::arena::{Arena, ARENA_BYTES, PAGE_BYTES, PAGE_COUNT};
use crate::zone::descriptor::{is_inline, usable_blocks, FreeBlock, PageDescriptor, PageSlot};
use crate::zone::directory;
use crate::zone::size_class::{class_of, pages_needed, round_size, MAX_SMALL_BLOCK, MIN_BLOCK_SIZE};

#[cfg(feature = "tracing")]
use tracing::trace;

/// A fixed-arena, size-segregated block allocator.
///
/// All state, including the page directory, the free-list table and
/// every page descriptor, lives inside one contiguous region owned by
/// this handle. Requests up to half a page are served from per-class
/// block pools; anything larger claims a contiguous run of whole pages.
///
/// The allocator is defined for a single agent of control; the handle is
/// `Send` but not `Sync`, and every operation takes `&mut self`.
///
/// # Example
///
/// ```
/// use zonal::ZoneAlloc;
///
/// let mut zone = ZoneAlloc::new().unwrap();
/// let block = zone.alloc(100).unwrap();
/// unsafe {
///     block.as_ptr().write_bytes(0xAB, 100);
///     zone.free(block);
/// }
/// ```
pub struct ZoneAlloc {
    arena: Arena,
}

impl ZoneAlloc {
    /// Creates an allocator over a freshly acquired arena.
    ///
    /// Returns `None` when the backing region cannot be acquired.
    pub fn new() -> Option<Self> {
        let arena = Arena::new()?;
        let mut zone = Self { arena };
        zone.reset();
        Some(zone)
    }

    /// Reinitializes the arena: every page becomes free and every class
    /// list empty. Idempotent. Outstanding references are invalidated,
    /// not tracked.
    pub fn reset(&mut self) {
        directory::reset(&mut self.arena);
    }

    /// Total arena capacity in bytes.
    pub fn capacity(&self) -> usize {
        ARENA_BYTES
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        PAGE_BYTES
    }

    /// First byte of the arena.
    pub fn base(&self) -> NonNull<u8> {
        self.arena.base()
    }

    /// Whether `addr` points into the arena.
    pub fn contains(&self, addr: *const u8) -> bool {
        self.arena.contains(addr)
    }

    /// Allocates `size` bytes, rounded up to the owning block size.
    ///
    /// The returned block is aligned to its power-of-two block size and
    /// never lies in page 0. Returns `None` when the rounded size falls
    /// below the minimum block size or the arena cannot satisfy the
    /// request; the arena is unchanged on failure.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        let rounded = round_size(size);
        if rounded < MIN_BLOCK_SIZE {
            return None;
        }
        if rounded > MAX_SMALL_BLOCK {
            return self.alloc_big(size);
        }

        let class = class_of(rounded);
        let desc = match directory::class_head(&self.arena, class) {
            Some(head) => head,
            None => {
                let head = self.create_page(rounded)?;
                directory::set_class_head(&mut self.arena, class, Some(head));
                head
            }
        };

        unsafe {
            let d = desc.as_ptr();
            debug_assert!((*d).free_head.is_some());
            let block = (*d).free_head?;
            (*d).free_head = block.as_ref().next;
            (*d).free_count -= 1;

            if (*d).free_count == 0 {
                // exhausted: the page leaves its class list until a
                // block comes back
                self.unlink_from_class(class, desc);
            }

            Some(block.cast())
        }
    }

    /// Returns `addr` to its owning page, reclaiming the page once its
    /// last block comes back.
    ///
    /// # Safety
    ///
    /// `addr` must have been returned by [`Self::alloc`] or
    /// [`Self::realloc`] on this allocator and not freed since.
    pub unsafe fn free(&mut self, addr: NonNull<u8>) {
        let page = self.arena.page_index(addr);
        let PageSlot::Desc(desc) = directory::slot(&self.arena, page) else {
            debug_assert!(false, "free of an address without a descriptor");
            return;
        };

        let d = desc.as_ptr();
        let block_size = (*d).block_size as usize;
        if block_size >= PAGE_BYTES {
            return self.free_big(page, desc);
        }

        // Append at the tail: when the page finally empties, its whole
        // chain is on-page and no stale class-list reference survives
        // the reclamation.
        let block = addr.cast::<FreeBlock>();
        (*block.as_ptr()).next = None;
        match (*d).free_head {
            None => (*d).free_head = Some(block),
            Some(mut tail) => {
                while let Some(next) = tail.as_ref().next {
                    tail = next;
                }
                (*tail.as_ptr()).next = Some(block);
            }
        }
        (*d).free_count += 1;

        let class = class_of(block_size);
        let count = (*d).free_count as usize;
        if count == usable_blocks(block_size) {
            // fully empty: give the page back
            if count > 1 {
                self.unlink_from_class(class, desc);
            }
            directory::set_slot(&mut self.arena, page, PageSlot::Free);
            if !is_inline(block_size) {
                self.free(desc.cast());
            }
            #[cfg(feature = "tracing")]
            trace!(page, block_size, "reclaimed page");
        } else if count == 1 {
            // first block back: the page rejoins its class list
            self.append_to_class(class, desc);
        }
    }

    /// Moves the allocation at `addr` to a block of `new_size` bytes,
    /// preserving the leading `min(old_block_size, new_size)` bytes.
    ///
    /// On failure returns `None` and leaves the old allocation intact.
    ///
    /// # Safety
    ///
    /// `addr` must have been returned by [`Self::alloc`] or
    /// [`Self::realloc`] on this allocator and not freed since.
    pub unsafe fn realloc(&mut self, addr: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        let page = self.arena.page_index(addr);
        let PageSlot::Desc(desc) = directory::slot(&self.arena, page) else {
            debug_assert!(false, "realloc of an address without a descriptor");
            return None;
        };
        let old_size = (*desc.as_ptr()).block_size as usize;

        let new_addr = self.alloc(new_size)?;
        ptr::copy_nonoverlapping(addr.as_ptr(), new_addr.as_ptr(), old_size.min(new_size));
        self.free(addr);
        Some(new_addr)
    }

    /// Writes the per-page status report to `out`.
    ///
    /// One line per page (`# free #`, `##`, or
    /// `# <block_size> | <free_count>(<max_blocks>) #`), followed by one
    /// blank line.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        for page in 0..PAGE_COUNT {
            write!(out, "[{page}]\t")?;
            match directory::slot(&self.arena, page) {
                PageSlot::Free => writeln!(out, "# free #")?,
                PageSlot::Busy => writeln!(out, "##")?,
                PageSlot::Desc(desc) => {
                    let (block_size, free_count) = unsafe {
                        let d = desc.as_ptr();
                        ((*d).block_size as usize, (*d).free_count)
                    };
                    writeln!(
                        out,
                        "# {block_size} | {free_count}({}) #",
                        usable_blocks(block_size)
                    )?;
                }
            }
        }
        writeln!(out)
    }

    /// Large path: claims `ceil(size / PAGE_BYTES)` contiguous pages.
    fn alloc_big(&mut self, size: usize) -> Option<NonNull<u8>> {
        let pages = pages_needed(size);
        if pages >= PAGE_COUNT {
            return None;
        }

        let leader = self.find_free_run(pages)?;
        for i in 0..pages {
            directory::set_slot(&mut self.arena, leader + i, PageSlot::Busy);
        }

        // The run is reserved, so the nested allocation cannot take it.
        let Some(raw) = self.alloc(size_of::<PageDescriptor>()) else {
            for i in 0..pages {
                directory::set_slot(&mut self.arena, leader + i, PageSlot::Free);
            }
            return None;
        };
        let desc = raw.cast::<PageDescriptor>();

        unsafe {
            desc.as_ptr().write(PageDescriptor {
                block_size: (pages * PAGE_BYTES) as u32,
                free_count: 0,
                free_head: None,
                next: None,
                prev: None,
            });
        }
        directory::set_slot(&mut self.arena, leader, PageSlot::Desc(desc));

        #[cfg(feature = "tracing")]
        trace!(leader, pages, "claimed page run");

        Some(self.arena.page_base(leader))
    }

    /// First-fit scan for `pages` contiguous free slots.
    fn find_free_run(&self, pages: usize) -> Option<usize> {
        let mut run = 0;
        for page in 1..PAGE_COUNT {
            if directory::slot(&self.arena, page) == PageSlot::Free {
                run += 1;
                if run == pages {
                    return Some(page + 1 - pages);
                }
            } else {
                run = 0;
            }
        }
        None
    }

    /// Releases a large page run and its descriptor.
    unsafe fn free_big(&mut self, leader: usize, desc: NonNull<PageDescriptor>) {
        let pages = (*desc.as_ptr()).block_size as usize / PAGE_BYTES;
        for i in 0..pages {
            directory::set_slot(&mut self.arena, leader + i, PageSlot::Free);
        }
        self.free(desc.cast());

        #[cfg(feature = "tracing")]
        trace!(leader, pages, "released page run");
    }

    /// Constructs a fresh page of `block_size` and returns its
    /// descriptor: unlinked, with every usable block chained and free.
    fn create_page(&mut self, block_size: usize) -> Option<NonNull<PageDescriptor>> {
        let page = (0..PAGE_COUNT).find(|&p| directory::slot(&self.arena, p) == PageSlot::Free)?;
        directory::set_slot(&mut self.arena, page, PageSlot::Busy);

        let base = self.arena.page_base(page);
        let count = usable_blocks(block_size);

        let (desc, first_block) = if is_inline(block_size) {
            // the descriptor takes the first block; usable blocks start
            // right after it
            let first = unsafe { NonNull::new_unchecked(base.as_ptr().add(block_size)) };
            (base.cast::<PageDescriptor>(), first)
        } else {
            let Some(raw) = self.alloc(size_of::<PageDescriptor>()) else {
                directory::set_slot(&mut self.arena, page, PageSlot::Free);
                return None;
            };
            (raw.cast::<PageDescriptor>(), base)
        };

        unsafe {
            // thread the intrusive chain through the page
            let mut block = first_block.as_ptr();
            for _ in 1..count {
                let next = block.add(block_size);
                (*block.cast::<FreeBlock>()).next = Some(NonNull::new_unchecked(next.cast()));
                block = next;
            }
            (*block.cast::<FreeBlock>()).next = None;

            desc.as_ptr().write(PageDescriptor {
                block_size: block_size as u32,
                free_count: count as u32,
                free_head: Some(first_block.cast()),
                next: None,
                prev: None,
            });
        }
        directory::set_slot(&mut self.arena, page, PageSlot::Desc(desc));

        #[cfg(feature = "tracing")]
        trace!(page, block_size, "constructed page");

        Some(desc)
    }

    /// Unlinks `desc` from class list `class` in O(1) via its sibling
    /// links.
    unsafe fn unlink_from_class(&mut self, class: usize, desc: NonNull<PageDescriptor>) {
        let d = desc.as_ptr();
        let prev = (*d).prev.take();
        let next = (*d).next.take();
        match prev {
            Some(p) => (*p.as_ptr()).next = next,
            None => directory::set_class_head(&mut self.arena, class, next),
        }
        if let Some(n) = next {
            (*n.as_ptr()).prev = prev;
        }
    }

    /// Appends `desc` at the tail of class list `class`.
    unsafe fn append_to_class(&mut self, class: usize, desc: NonNull<PageDescriptor>) {
        debug_assert!((*desc.as_ptr()).next.is_none() && (*desc.as_ptr()).prev.is_none());
        match directory::class_head(&self.arena, class) {
            None => directory::set_class_head(&mut self.arena, class, Some(desc)),
            Some(mut tail) => {
                while let Some(next) = tail.as_ref().next {
                    tail = next;
                }
                (*tail.as_ptr()).next = Some(desc);
                (*desc.as_ptr()).prev = Some(tail);
            }
        }
    }
}
