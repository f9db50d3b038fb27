//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into the entity table
//! - A generation counter for safe reuse

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::PoolConfig;
use crate::error::{StoreError, StoreResult};
use crate::memory::{AllocationTag, ChunkedPool, Handle, MemoryArena, PoolStats};
use crate::sync::EntityGuard;

/// Unique identifier for an entity.
///
/// A thin wrapper over the [`Handle`] of the entity's table slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(Handle);

impl EntityId {
    /// Null/invalid entity ID.
    pub const NULL: Self = Self(Handle::INVALID);

    /// Creates an entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(Handle::new(index, generation))
    }

    /// Wraps a table handle.
    #[inline]
    #[must_use]
    pub const fn from_handle(handle: Handle) -> Self {
        Self(handle)
    }

    /// Returns the underlying table handle.
    #[inline]
    #[must_use]
    pub const fn handle(self) -> Handle {
        self.0
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0.index()
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.0.generation()
    }

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        !self.0.is_valid()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity {}", self.0)
    }
}

/// One slot of the entity table.
#[derive(Debug)]
pub struct EntityRecord {
    id: EntityId,
    active: AtomicBool,
    guard: EntityGuard,
}

impl EntityRecord {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            active: AtomicBool::new(true),
            guard: EntityGuard::new(),
        }
    }

    /// The entity's own ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Whether schedulers should update this entity.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The entity's reader/writer guard, which also holds its component index.
    #[inline]
    #[must_use]
    pub const fn guard(&self) -> &EntityGuard {
        &self.guard
    }
}

/// Owner of every entity record.
///
/// Outside the crate the table is read-only; entities are created and
/// destroyed through [`crate::World`].
///
/// Creation and destruction take the table lock exclusively; lookups take
/// it shared and only long enough to clone what they need.
pub struct EntityTable {
    pool: RwLock<ChunkedPool<EntityRecord>>,
}

impl EntityTable {
    /// Creates a table sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`] if the initial chunks are refused.
    pub fn new(config: PoolConfig, arena: Arc<dyn MemoryArena>) -> StoreResult<Self> {
        let pool = ChunkedPool::new(config, AllocationTag::Entities, arena)?;
        Ok(Self {
            pool: RwLock::new(pool),
        })
    }

    /// Creates a new active entity with no components.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`] if the table could not grow.
    pub(crate) fn create(&self) -> StoreResult<EntityId> {
        self.pool
            .write()
            .allocate_with(|handle| EntityRecord::new(EntityId(handle)))
            .map(EntityId)
    }

    /// Frees the entity's slot. Its generation is bumped, so `id` goes stale.
    ///
    /// Components are NOT removed here; see [`crate::World::destroy_entity`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] if `id` is not live.
    pub(crate) fn free(&self, id: EntityId) -> StoreResult<()> {
        let record = self.pool.write().free(id.0)?;
        drop(record);
        Ok(())
    }

    /// Checks whether `id` refers to a live entity.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        self.pool.read_recursive().contains(id.0)
    }

    /// Returns the entity's guard.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] or [`StoreError::StaleHandle`].
    pub fn guard(&self, id: EntityId) -> StoreResult<EntityGuard> {
        self.with_record(id, |record| record.guard.clone())
    }

    /// Sets the active flag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] or [`StoreError::StaleHandle`].
    pub fn set_active(&self, id: EntityId, active: bool) -> StoreResult<()> {
        self.with_record(id, |record| record.active.store(active, Ordering::Release))
    }

    /// Reads the active flag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] or [`StoreError::StaleHandle`].
    pub fn is_active(&self, id: EntityId) -> StoreResult<bool> {
        self.with_record(id, EntityRecord::is_active)
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.read_recursive().len()
    }

    /// Returns `true` if there are no live entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of entity slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.read_recursive().capacity()
    }

    /// Returns the table's occupancy counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.read_recursive().stats()
    }

    /// Lazily iterates over live entities.
    #[must_use]
    pub fn iter(&self) -> EntityIter<'_> {
        EntityIter {
            table: self,
            cursor: 0,
            active_only: false,
        }
    }

    /// Lazily iterates over live, active entities.
    #[must_use]
    pub fn iter_active(&self) -> EntityIter<'_> {
        EntityIter {
            table: self,
            cursor: 0,
            active_only: true,
        }
    }

    fn with_record<R>(&self, id: EntityId, f: impl FnOnce(&EntityRecord) -> R) -> StoreResult<R> {
        let pool = self.pool.read_recursive();
        match pool.get(id.0) {
            Ok(record) => Ok(f(record)),
            Err(err) => {
                if let StoreError::StaleHandle(handle) = &err {
                    tracing::warn!(target: "tessera::entity", %handle, "access through stale entity id");
                }
                Err(err)
            }
        }
    }
}

/// Lazy, restartable walk over the entity table.
///
/// The table lock is taken per step, not for the whole walk, so entities
/// may be created or destroyed while iterating. Each yielded ID was live
/// when it was reached.
#[derive(Clone)]
pub struct EntityIter<'a> {
    table: &'a EntityTable,
    cursor: usize,
    active_only: bool,
}

impl EntityIter<'_> {
    /// Restarts the walk from the first slot.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl Iterator for EntityIter<'_> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        let pool = self.table.pool.read_recursive();
        while self.cursor < pool.capacity() {
            let index = self.cursor;
            self.cursor += 1;

            let Some(handle) = pool.handle_at(index) else {
                continue;
            };
            if self.active_only && !pool.get(handle).is_ok_and(EntityRecord::is_active) {
                continue;
            }
            return Some(EntityId(handle));
        }
        None
    }
}
