//! # Arena Allocator
//!
//! The store's only outbound memory contract: pools ask an arena for a
//! chunk-sized block before growing, and hand the block back on teardown.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::MemoryBudget;
use crate::error::{StoreError, StoreResult};

/// Which subsystem an allocation is made for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocationTag {
    /// Entity table chunks.
    Entities,
    /// Component pool chunks.
    Components,
    /// Event subsystem buffers.
    Events,
    /// System subsystem buffers.
    Systems,
}

impl AllocationTag {
    /// All tags, in accounting order.
    pub const ALL: [Self; 4] = [Self::Entities, Self::Components, Self::Events, Self::Systems];

    #[inline]
    const fn slot(self) -> usize {
        match self {
            Self::Entities => 0,
            Self::Components => 1,
            Self::Events => 2,
            Self::Systems => 3,
        }
    }
}

/// A byte grant made by an arena.
///
/// Not `Clone`: a grant is returned exactly once through [`MemoryArena::free`].
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    id: u64,
    size: usize,
    tag: AllocationTag,
}

impl Allocation {
    /// Creates an allocation record. Intended for [`MemoryArena`] implementors.
    #[inline]
    #[must_use]
    pub const fn new(id: u64, size: usize, tag: AllocationTag) -> Self {
        Self { id, size, tag }
    }

    /// Arena-assigned identifier.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// The subsystem this block was requested for.
    #[inline]
    #[must_use]
    pub const fn tag(&self) -> AllocationTag {
        self.tag
    }
}

/// Budget authority the store requests chunk memory from.
///
/// A granted [`Allocation`] is permission to use `size` bytes, not storage:
/// the pool still obtains the chunk itself from the global allocator, and
/// hands the grant back when the chunk is dropped. An implementation decides
/// how much may be live at once, per [`AllocationTag`].
///
/// Implementations must be thread-safe: pools of different component types
/// grow concurrently.
pub trait MemoryArena: Send + Sync {
    /// Requests a grant of `size` bytes for `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`] if the request cannot be served.
    fn allocate(&self, size: usize, tag: AllocationTag) -> StoreResult<Allocation>;

    /// Returns a grant previously made by [`MemoryArena::allocate`].
    fn free(&self, allocation: Allocation);
}

#[derive(Default)]
struct ArenaUsage {
    total: usize,
    by_tag: [usize; 4],
    live: usize,
}

/// Budgeted heap arena.
///
/// Tracks bytes granted overall and per [`AllocationTag`], and refuses any
/// request that would exceed the configured [`MemoryBudget`]. It only does
/// the accounting; chunk storage itself lives on the global heap.
///
/// # Example
///
/// ```rust,ignore
/// let arena = HeapArena::new(MemoryBudget::default());
/// let block = arena.allocate(4096, AllocationTag::Components)?;
/// assert_eq!(arena.used(), 4096);
/// arena.free(block);
/// ```
pub struct HeapArena {
    budget: MemoryBudget,
    usage: Mutex<ArenaUsage>,
    next_id: AtomicU64,
}

impl HeapArena {
    /// Creates an arena enforcing `budget`.
    #[must_use]
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            budget,
            usage: Mutex::new(ArenaUsage::default()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Creates an arena with no total limit (tag limits still apply).
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(MemoryBudget {
            total_bytes: None,
            ..MemoryBudget::default()
        })
    }

    /// Returns the budget this arena enforces.
    #[inline]
    #[must_use]
    pub const fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    /// Returns the bytes currently granted.
    #[must_use]
    pub fn used(&self) -> usize {
        self.usage.lock().total
    }

    /// Returns the bytes currently granted for `tag`.
    #[must_use]
    pub fn used_by(&self, tag: AllocationTag) -> usize {
        self.usage.lock().by_tag[tag.slot()]
    }

    /// Returns the bytes still available, or `None` without a total limit.
    #[must_use]
    pub fn remaining(&self) -> Option<usize> {
        let used = self.used();
        self.budget
            .total_bytes
            .map(|cap| cap.saturating_sub(used))
    }

    /// Returns the number of blocks not yet freed.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.usage.lock().live
    }
}

impl Default for HeapArena {
    fn default() -> Self {
        Self::new(MemoryBudget::default())
    }
}

impl MemoryArena for HeapArena {
    fn allocate(&self, size: usize, tag: AllocationTag) -> StoreResult<Allocation> {
        let mut usage = self.usage.lock();

        let total = usage.total.checked_add(size);
        let tagged = usage.by_tag[tag.slot()].checked_add(size);

        let within_total = total.is_some_and(|t| self.budget.total_bytes.map_or(true, |cap| t <= cap));
        let within_tag = tagged.is_some_and(|t| self.budget.limit_for(tag).map_or(true, |cap| t <= cap));

        match (total, tagged) {
            (Some(total), Some(tagged)) if within_total && within_tag => {
                usage.total = total;
                usage.by_tag[tag.slot()] = tagged;
                usage.live += 1;
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                Ok(Allocation::new(id, size, tag))
            }
            _ => {
                tracing::error!(
                    target: "tessera::arena",
                    requested = size,
                    ?tag,
                    used = usage.total,
                    "arena refused allocation"
                );
                Err(StoreError::OutOfMemory { requested: size, tag })
            }
        }
    }

    fn free(&self, allocation: Allocation) {
        let mut usage = self.usage.lock();
        usage.total = usage.total.saturating_sub(allocation.size);
        let slot = &mut usage.by_tag[allocation.tag.slot()];
        *slot = slot.saturating_sub(allocation.size);
        usage.live = usage.live.saturating_sub(1);
    }
}
