//! # Per-Entity Guards
//!
//! Every entity owns one reader/writer lock over its component index.
//!
//! ```text
//! add / remove / remove_all / destroy   ──► exclusive (one writer, no readers)
//! get / get_mut / deliver / iterate     ──► shared    (many readers)
//! ```
//!
//! Guards are owned (`Arc`-backed) so a [`ComponentRef`] can outlive the
//! lookup that produced it. Release happens on drop, on every exit path.
//!
//! ## Lock Order
//!
//! Entity guard first, then the component's own cell. A component pool is
//! only locked for the moment it takes to find a cell, never for the life of
//! a borrow, so a borrow on one entity never blocks another entity.
//!
//! A thread must not request structural access to an entity while it still
//! holds a [`ComponentRef`] or [`ComponentMut`] into that entity.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::ecs::ComponentIndex;
use crate::error::StoreResult;
use crate::memory::{ChunkedPool, Handle};

/// Shared (reader) access to one entity's component index.
pub type SharedAccess = ArcRwLockReadGuard<RawRwLock, ComponentIndex>;

/// Exclusive (writer) access to one entity's component index.
pub type ExclusiveAccess = ArcRwLockWriteGuard<RawRwLock, ComponentIndex>;

/// One stored component, lockable on its own.
pub type ComponentCell<T> = Arc<RwLock<T>>;

/// A component pool as shared between the store and its type-erased view.
pub type SharedPool<T> = Arc<RwLock<ChunkedPool<ComponentCell<T>>>>;

/// The reader/writer lock of one entity.
///
/// Cloning shares the same lock.
#[derive(Clone)]
pub struct EntityGuard {
    index: Arc<RwLock<ComponentIndex>>,
}

impl EntityGuard {
    /// Creates a guard over an empty, live index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: Arc::new(RwLock::new(ComponentIndex::live())),
        }
    }

    /// Acquires shared access. Recursive: a thread already reading this
    /// entity never deadlocks against a queued writer.
    #[inline]
    #[must_use]
    pub fn read(&self) -> SharedAccess {
        self.index.read_arc_recursive()
    }

    /// Acquires exclusive access.
    #[inline]
    #[must_use]
    pub fn write(&self) -> ExclusiveAccess {
        self.index.write_arc()
    }

    /// Returns whether a writer currently holds this guard.
    #[inline]
    #[must_use]
    pub fn is_locked_exclusive(&self) -> bool {
        self.index.is_locked_exclusive()
    }
}

impl Default for EntityGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityGuard")
            .field("locked_exclusive", &self.is_locked_exclusive())
            .finish()
    }
}

/// Finds the cell behind `handle`, holding the pool lock only for the lookup.
fn cell_of<T>(pool: &SharedPool<T>, handle: Handle) -> StoreResult<ComponentCell<T>> {
    pool.read_recursive().get(handle).map(Arc::clone)
}

/// Shared borrow of a component.
///
/// Holds the owning entity's guard in shared mode and the component's cell
/// in shared mode, so the component cannot be removed or mutated while this
/// exists. Other components of the same type stay fully accessible.
pub struct ComponentRef<T: 'static> {
    // Field order is drop order: cell before entity.
    value: ArcRwLockReadGuard<RawRwLock, T>,
    handle: Handle,
    _entity: SharedAccess,
}

impl<T: 'static> ComponentRef<T> {
    pub(crate) fn new(entity: SharedAccess, pool: &SharedPool<T>, handle: Handle) -> StoreResult<Self> {
        let value = cell_of(pool, handle)?.read_arc_recursive();
        Ok(Self {
            value,
            handle,
            _entity: entity,
        })
    }

    /// Returns the pool handle of this component.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl<T: 'static> Deref for ComponentRef<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ComponentRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Exclusive borrow of a component.
///
/// Holds the owning entity's guard in shared mode (the entity's component
/// set cannot change) and the component's cell in exclusive mode (the
/// payload cannot be observed mid-write).
pub struct ComponentMut<T: 'static> {
    value: ArcRwLockWriteGuard<RawRwLock, T>,
    handle: Handle,
    _entity: SharedAccess,
}

impl<T: 'static> ComponentMut<T> {
    pub(crate) fn new(entity: SharedAccess, pool: &SharedPool<T>, handle: Handle) -> StoreResult<Self> {
        let value = cell_of(pool, handle)?.write_arc();
        Ok(Self {
            value,
            handle,
            _entity: entity,
        })
    }

    /// Returns the pool handle of this component.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl<T: 'static> Deref for ComponentMut<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: 'static> DerefMut for ComponentMut<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ComponentMut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
