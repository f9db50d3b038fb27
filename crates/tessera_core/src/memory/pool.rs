//! # Chunked Slot Pool
//!
//! Growable slot allocator for objects that are frequently allocated and freed.
//!
//! ```text
//! chunks: [ Chunk 0 ][ Chunk 1 ][ Chunk 2 ] ...     (append-only)
//!            │
//!            ▼
//!         [gen|val][gen|val][gen|   ][gen|val] ...   (chunk_slots slots)
//!
//! free_list: [5, 3, ...]  ──► pop() for the next allocation
//! ```
//!
//! Chunks are boxed slices that are never moved or resized once created, so
//! a reference obtained from the pool stays at the same address while the
//! pool grows. Freeing a slot bumps its generation, which turns every
//! outstanding [`Handle`] to it into a detectably stale one.

use std::mem;
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::error::{StoreError, StoreResult};

use super::arena::{Allocation, AllocationTag, MemoryArena};
use super::handle::Handle;

/// Maximum number of slots in one pool. Index `u32::MAX` is reserved for
/// [`Handle::INVALID`].
pub const MAX_SLOTS: usize = u32::MAX as usize;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

struct Chunk<T> {
    slots: Box<[Slot<T>]>,
    allocation: Allocation,
}

/// Occupancy counters of a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Occupied slots.
    pub len: usize,
    /// Total slots across all chunks.
    pub capacity: usize,
    /// Slots waiting on the free list.
    pub free: usize,
    /// Number of chunks.
    pub chunks: usize,
}

/// A growable pool of generation-tagged slots.
///
/// # Thread Safety
///
/// This pool is NOT internally synchronized. The store wraps every pool in a
/// `parking_lot::RwLock`, which also serializes the pop-or-grow decision in
/// [`ChunkedPool::allocate`].
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: ChunkedPool<Particle> =
///     ChunkedPool::new(PoolConfig::default(), AllocationTag::Components, arena)?;
///
/// let handle = pool.allocate(Particle::default())?;
/// pool.free(handle)?;
/// assert!(pool.get(handle).is_err()); // stale
/// ```
pub struct ChunkedPool<T> {
    chunks: Vec<Chunk<T>>,
    free_list: Vec<u32>,
    config: PoolConfig,
    len: usize,
    tag: AllocationTag,
    arena: Arc<dyn MemoryArena>,
}

impl<T> ChunkedPool<T> {
    /// Creates a pool and reserves `config.initial_slots` worth of chunks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`] if the arena refuses the initial chunks.
    pub fn new(config: PoolConfig, tag: AllocationTag, arena: Arc<dyn MemoryArena>) -> StoreResult<Self> {
        let mut pool = Self {
            chunks: Vec::new(),
            free_list: Vec::new(),
            config,
            len: 0,
            tag,
            arena,
        };

        let initial = config.initial_chunks();
        if initial > 0 {
            pool.append_chunks(initial)?;
        }

        Ok(pool)
    }

    /// Returns the number of occupied slots.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot is occupied.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the total number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.config.chunk_slots
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Returns the number of chunks.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the number of slots per chunk.
    #[inline]
    #[must_use]
    pub const fn chunk_slots(&self) -> usize {
        self.config.chunk_slots
    }

    /// Returns occupancy counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            len: self.len,
            capacity: self.capacity(),
            free: self.free_count(),
            chunks: self.chunk_count(),
        }
    }

    /// Stores `value` in a free slot.
    ///
    /// Reuses a freed slot if there is one, otherwise appends chunks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`] if growth was needed and refused.
    /// No slot is taken in that case.
    #[inline]
    pub fn allocate(&mut self, value: T) -> StoreResult<Handle> {
        self.allocate_with(|_| value)
    }

    /// Stores the value built by `init`, which receives the slot's handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`] if growth was needed and refused.
    pub fn allocate_with(&mut self, init: impl FnOnce(Handle) -> T) -> StoreResult<Handle> {
        if self.free_list.is_empty() {
            self.append_chunks(self.config.grow_chunks())?;
        }

        let Some(index) = self.free_list.pop() else {
            return Err(StoreError::Fatal(format!("{:?} pool grew without free slots", self.tag)));
        };

        let (chunk, offset) = self.locate(index);
        let slot = &mut self.chunks[chunk].slots[offset];
        debug_assert!(slot.value.is_none(), "free list held occupied slot {index}");

        let handle = Handle::new(index, slot.generation);
        slot.value = Some(init(handle));
        self.len += 1;

        Ok(handle)
    }

    /// Frees an occupied slot and returns its value.
    ///
    /// The slot's generation is bumped (wrapping), so `handle` and every copy
    /// of it become stale.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] for the sentinel, an out-of-range
    /// index, a generation mismatch, or an already-free slot. Nothing changes.
    pub fn free(&mut self, handle: Handle) -> StoreResult<T> {
        if !handle.is_valid() {
            return Err(StoreError::InvalidHandle(handle));
        }

        let slot = self
            .slot_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .ok_or(StoreError::InvalidHandle(handle))?;

        let value = slot.value.take().ok_or(StoreError::InvalidHandle(handle))?;
        slot.generation = slot.generation.wrapping_add(1);

        self.free_list.push(handle.index());
        self.len -= 1;

        Ok(value)
    }

    /// Resolves a handle to its value.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidHandle`] for the sentinel or an out-of-range index
    /// - [`StoreError::StaleHandle`] if the slot's generation has moved on
    /// - [`StoreError::NotFound`] if the slot was never occupied
    #[inline]
    pub fn get(&self, handle: Handle) -> StoreResult<&T> {
        if !handle.is_valid() {
            return Err(StoreError::InvalidHandle(handle));
        }

        let slot = self
            .slot(handle.index())
            .ok_or(StoreError::InvalidHandle(handle))?;

        if slot.generation != handle.generation() {
            return Err(StoreError::StaleHandle(handle));
        }

        slot.value.as_ref().ok_or(StoreError::NotFound)
    }

    /// Resolves a handle to its value, mutably.
    ///
    /// # Errors
    ///
    /// Same as [`ChunkedPool::get`].
    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> StoreResult<&mut T> {
        if !handle.is_valid() {
            return Err(StoreError::InvalidHandle(handle));
        }

        let slot = self
            .slot_mut(handle.index())
            .ok_or(StoreError::InvalidHandle(handle))?;

        if slot.generation != handle.generation() {
            return Err(StoreError::StaleHandle(handle));
        }

        slot.value.as_mut().ok_or(StoreError::NotFound)
    }

    /// Checks whether `handle` currently resolves.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_ok()
    }

    /// Returns the handle of the occupant at `index`, if any.
    #[must_use]
    pub fn handle_at(&self, index: usize) -> Option<Handle> {
        let index = u32::try_from(index).ok()?;
        let slot = self.slot(index)?;
        slot.value.as_ref().map(|_| Handle::new(index, slot.generation))
    }

    /// Iterates over all occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        let chunk_slots = self.config.chunk_slots;
        self.chunks.iter().enumerate().flat_map(move |(c, chunk)| {
            chunk.slots.iter().enumerate().filter_map(move |(o, slot)| {
                let index = (c * chunk_slots + o) as u32;
                slot.value
                    .as_ref()
                    .map(|value| (Handle::new(index, slot.generation), value))
            })
        })
    }

    /// Iterates mutably over all occupied slots.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        let chunk_slots = self.config.chunk_slots;
        self.chunks.iter_mut().enumerate().flat_map(move |(c, chunk)| {
            chunk.slots.iter_mut().enumerate().filter_map(move |(o, slot)| {
                let index = (c * chunk_slots + o) as u32;
                let generation = slot.generation;
                slot.value
                    .as_mut()
                    .map(move |value| (Handle::new(index, generation), value))
            })
        })
    }

    /// Drops every value and returns all slots to the free list.
    ///
    /// Chunks are kept. Occupied slots have their generation bumped, so
    /// handles issued before the clear are stale afterwards.
    pub fn clear(&mut self) {
        for chunk in &mut self.chunks {
            for slot in chunk.slots.iter_mut() {
                if slot.value.take().is_some() {
                    slot.generation = slot.generation.wrapping_add(1);
                }
            }
        }

        let capacity = self.capacity();
        self.free_list.clear();
        self.free_list.extend((0..capacity).rev().map(|i| i as u32));
        self.len = 0;
    }

    #[inline]
    fn locate(&self, index: u32) -> (usize, usize) {
        let index = index as usize;
        (index / self.config.chunk_slots, index % self.config.chunk_slots)
    }

    #[inline]
    fn slot(&self, index: u32) -> Option<&Slot<T>> {
        let (chunk, offset) = self.locate(index);
        self.chunks.get(chunk)?.slots.get(offset)
    }

    #[inline]
    fn slot_mut(&mut self, index: u32) -> Option<&mut Slot<T>> {
        let (chunk, offset) = self.locate(index);
        self.chunks.get_mut(chunk)?.slots.get_mut(offset)
    }

    /// Appends up to `count` chunks and pushes their slots onto the free list.
    ///
    /// Succeeds if at least one chunk was added.
    fn append_chunks(&mut self, count: usize) -> StoreResult<()> {
        let chunk_slots = self.config.chunk_slots;
        let bytes = chunk_slots.saturating_mul(mem::size_of::<Slot<T>>());
        let base = self.capacity();
        let mut failure = None;

        for _ in 0..count {
            if self.capacity() + chunk_slots > MAX_SLOTS {
                tracing::error!(target: "tessera::pool", tag = ?self.tag, "pool reached maximum slot count");
                failure = Some(StoreError::OutOfMemory {
                    requested: bytes,
                    tag: self.tag,
                });
                break;
            }

            match self.arena.allocate(bytes, self.tag) {
                Ok(allocation) => {
                    let slots = (0..chunk_slots)
                        .map(|_| Slot {
                            generation: 0,
                            value: None,
                        })
                        .collect::<Vec<_>>()
                        .into_boxed_slice();
                    self.chunks.push(Chunk { slots, allocation });
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let end = self.capacity();
        // Lowest index is popped first.
        self.free_list.extend((base..end).rev().map(|i| i as u32));

        if end == base {
            if let Some(err) = failure {
                return Err(err);
            }
        }

        tracing::debug!(
            target: "tessera::pool",
            tag = ?self.tag,
            capacity = end,
            chunks = self.chunks.len(),
            "pool grew"
        );
        Ok(())
    }
}

impl<T> Drop for ChunkedPool<T> {
    fn drop(&mut self) {
        for chunk in self.chunks.drain(..) {
            let Chunk { slots, allocation } = chunk;
            drop(slots);
            self.arena.free(allocation);
        }
    }
}
