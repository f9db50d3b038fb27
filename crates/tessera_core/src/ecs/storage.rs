//! # Component Storage
//!
//! One [`ChunkedPool`] of component cells per type, plus the per-entity index that
//! maps a component type to the pool slot holding that entity's instance.
//!
//! The store itself never locks an entity. Every operation that touches a
//! [`ComponentIndex`] expects the caller to hold that entity's guard in the
//! right mode; [`crate::World`] does this for all public entry points.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::PoolConfig;
use crate::error::{StoreError, StoreResult};
use crate::memory::{AllocationTag, ChunkedPool, Handle, MemoryArena};
use crate::sync::{ComponentCell, ComponentMut, ComponentRef, SharedAccess, SharedPool};

use super::component::{Component, ComponentTypeId};
use super::entity::EntityId;

/// Component types attached to one entity, and where each instance lives.
///
/// Holds at most one entry per component type.
#[derive(Debug, Default)]
pub struct ComponentIndex {
    alive: bool,
    entries: HashMap<ComponentTypeId, Handle>,
}

impl ComponentIndex {
    pub(crate) fn live() -> Self {
        Self {
            alive: true,
            entries: HashMap::new(),
        }
    }

    /// Returns `false` once the owning entity has been destroyed.
    #[inline]
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    /// Returns the number of attached components.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no component is attached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the slot of the attached component of type `component`.
    #[inline]
    #[must_use]
    pub fn get(&self, component: ComponentTypeId) -> Option<Handle> {
        self.entries.get(&component).copied()
    }

    /// Checks whether a component of type `component` is attached.
    #[inline]
    #[must_use]
    pub fn contains(&self, component: ComponentTypeId) -> bool {
        self.entries.contains_key(&component)
    }

    /// Returns the attached component types, in ascending id order.
    #[must_use]
    pub fn types(&self) -> Vec<ComponentTypeId> {
        let mut types: Vec<_> = self.entries.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub(crate) fn mark_dead(&mut self) {
        self.alive = false;
    }
}

/// Type-erased view of a pool, used where the component type is only
/// known by its [`ComponentTypeId`].
trait ErasedPool: Send + Sync {
    fn name(&self) -> &'static str;
    fn free_slot(&self, handle: Handle) -> StoreResult<()>;
    fn deliver(&self, handle: Handle, event: &dyn Any) -> StoreResult<()>;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
}

struct TypedPool<T> {
    name: &'static str,
    pool: SharedPool<T>,
}

impl<T: Component> ErasedPool for TypedPool<T> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn free_slot(&self, handle: Handle) -> StoreResult<()> {
        let cell = self.pool.write().free(handle)?;
        // Dropped outside the pool lock.
        drop(cell);
        Ok(())
    }

    fn deliver(&self, handle: Handle, event: &dyn Any) -> StoreResult<()> {
        let cell = self.pool.read_recursive().get(handle).map(Arc::clone)?;
        cell.write().receive(event);
        Ok(())
    }

    fn len(&self) -> usize {
        self.pool.read().len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct Registry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    pools: Vec<Arc<dyn ErasedPool>>,
}

/// Typed component pools and their registry.
///
/// Pools are created lazily the first time a type is attached, and live
/// until the store is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let guard = EntityGuard::new();
/// let mut access = guard.write();
/// store.insert(&mut access, entity, Health(100))?;
/// assert!(store.has::<Health>(&access));
/// ```
pub struct ComponentStore {
    registry: RwLock<Registry>,
    config: PoolConfig,
    arena: Arc<dyn MemoryArena>,
}

impl ComponentStore {
    /// Creates an empty store whose pools are sized by `config`.
    #[must_use]
    pub fn new(config: PoolConfig, arena: Arc<dyn MemoryArena>) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            config,
            arena,
        }
    }

    /// Returns the id of `T` if it has been registered.
    #[must_use]
    pub fn type_id_of<T: Component>(&self) -> Option<ComponentTypeId> {
        self.registry.read().by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Returns the id of `T`, registering it and creating its pool if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`] if the pool's initial chunks are refused.
    pub fn register<T: Component>(&self) -> StoreResult<ComponentTypeId> {
        if let Some(id) = self.type_id_of::<T>() {
            return Ok(id);
        }

        let mut registry = self.registry.write();
        if let Some(&id) = registry.by_type.get(&TypeId::of::<T>()) {
            return Ok(id);
        }

        let id = u32::try_from(registry.pools.len())
            .map(ComponentTypeId::new)
            .map_err(|_| StoreError::Fatal("component type ids exhausted".into()))?;
        let pool = ChunkedPool::new(self.config, AllocationTag::Components, Arc::clone(&self.arena))?;

        registry.pools.push(Arc::new(TypedPool::<T> {
            name: type_name::<T>(),
            pool: Arc::new(RwLock::new(pool)),
        }));
        registry.by_type.insert(TypeId::of::<T>(), id);

        tracing::debug!(
            target: "tessera::component",
            component = type_name::<T>(),
            id = id.get(),
            "registered component type"
        );
        Ok(id)
    }

    /// Returns the type name registered under `id`.
    #[must_use]
    pub fn component_name(&self, id: ComponentTypeId) -> Option<&'static str> {
        self.registry.read().pools.get(id.slot()).map(|pool| pool.name())
    }

    /// Returns every registered type with its name, in id order.
    #[must_use]
    pub fn registered_types(&self) -> Vec<(ComponentTypeId, &'static str)> {
        self.registry
            .read()
            .pools
            .iter()
            .enumerate()
            .map(|(slot, pool)| (ComponentTypeId::new(slot as u32), pool.name()))
            .collect()
    }

    /// Returns the number of live `T` instances across all entities.
    #[must_use]
    pub fn instance_count<T: Component>(&self) -> usize {
        self.type_id_of::<T>()
            .and_then(|id| self.erased_pool(id).ok())
            .map_or(0, |pool| pool.len())
    }

    /// Attaches `value` to the entity whose index is `index`.
    ///
    /// The caller must hold the entity's guard exclusively.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateComponent`] if a `T` is already attached; the
    ///   existing component is left untouched
    /// - [`StoreError::OutOfMemory`] if the pool could not grow
    pub fn insert<T: Component>(&self, index: &mut ComponentIndex, owner: EntityId, value: T) -> StoreResult<Handle> {
        let type_id = self.register::<T>()?;
        if index.contains(type_id) {
            return Err(StoreError::DuplicateComponent {
                entity: owner.handle(),
                component: type_name::<T>(),
            });
        }

        let pool = self.typed_pool::<T>(type_id)?;
        let handle = pool.write().allocate(Arc::new(RwLock::new(value)))?;
        index.entries.insert(type_id, handle);

        Ok(handle)
    }

    /// Checks whether a `T` is attached.
    #[must_use]
    pub fn has<T: Component>(&self, index: &ComponentIndex) -> bool {
        self.type_id_of::<T>().is_some_and(|id| index.contains(id))
    }

    /// Borrows the attached `T`, keeping `access` alive inside the borrow.
    ///
    /// Returns `Ok(None)` if no `T` is attached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the index disagrees with the pool
    /// (release builds; debug builds panic).
    pub fn get<T: Component>(&self, access: SharedAccess) -> StoreResult<Option<ComponentRef<T>>> {
        let Some((type_id, handle)) = self.lookup::<T>(&access) else {
            return Ok(None);
        };

        let pool = self.typed_pool::<T>(type_id)?;
        ComponentRef::new(access, &pool, handle)
            .map(Some)
            .map_err(|err| index_inconsistency(type_name::<T>(), handle, &err))
    }

    /// Mutably borrows the attached `T`, keeping `access` alive inside the borrow.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentStore::get`].
    pub fn get_mut<T: Component>(&self, access: SharedAccess) -> StoreResult<Option<ComponentMut<T>>> {
        let Some((type_id, handle)) = self.lookup::<T>(&access) else {
            return Ok(None);
        };

        let pool = self.typed_pool::<T>(type_id)?;
        ComponentMut::new(access, &pool, handle)
            .map(Some)
            .map_err(|err| index_inconsistency(type_name::<T>(), handle, &err))
    }

    /// Detaches and returns the attached `T`, or `Ok(None)` if there is none.
    ///
    /// The caller must hold the entity's guard exclusively.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentStore::get`].
    pub fn remove<T: Component>(&self, index: &mut ComponentIndex) -> StoreResult<Option<T>> {
        let Some(type_id) = self.type_id_of::<T>() else {
            return Ok(None);
        };
        let Some(handle) = index.entries.remove(&type_id) else {
            return Ok(None);
        };

        let pool = self.typed_pool::<T>(type_id)?;
        let freed = pool.write().free(handle);
        let cell = freed.map_err(|err| index_inconsistency(type_name::<T>(), handle, &err))?;
        into_value(cell).map(Some)
    }

    /// Detaches and drops every attached component. Returns how many were removed.
    ///
    /// The caller must hold the entity's guard exclusively. Every entry is
    /// processed even if one of them is inconsistent.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found (release builds; debug builds panic).
    pub fn remove_all(&self, index: &mut ComponentIndex) -> StoreResult<usize> {
        let mut removed = 0;
        let mut first_error = None;

        for (type_id, handle) in index.entries.drain() {
            let result = self
                .erased_pool(type_id)
                .and_then(|pool| pool.free_slot(handle).map_err(|err| index_inconsistency(pool.name(), handle, &err)));

            match result {
                Ok(()) => removed += 1,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Hands `event` to every attached component. Returns how many received it.
    ///
    /// The caller must hold the entity's guard (shared is enough).
    ///
    /// # Errors
    ///
    /// Same as [`ComponentStore::get`].
    pub fn deliver_all(&self, index: &ComponentIndex, event: &dyn Any) -> StoreResult<usize> {
        let mut delivered = 0;
        for type_id in index.types() {
            let Some(handle) = index.get(type_id) else {
                continue;
            };
            let pool = self.erased_pool(type_id)?;
            pool.deliver(handle, event)
                .map_err(|err| index_inconsistency(pool.name(), handle, &err))?;
            delivered += 1;
        }
        Ok(delivered)
    }

    fn lookup<T: Component>(&self, index: &ComponentIndex) -> Option<(ComponentTypeId, Handle)> {
        let type_id = self.type_id_of::<T>()?;
        index.get(type_id).map(|handle| (type_id, handle))
    }

    fn erased_pool(&self, id: ComponentTypeId) -> StoreResult<Arc<dyn ErasedPool>> {
        self.registry
            .read()
            .pools
            .get(id.slot())
            .cloned()
            .ok_or_else(|| StoreError::Fatal(format!("no pool registered for {id}")))
    }

    fn typed_pool<T: Component>(&self, id: ComponentTypeId) -> StoreResult<SharedPool<T>> {
        self.registry
            .read()
            .pools
            .get(id.slot())
            .and_then(|pool| pool.as_any().downcast_ref::<TypedPool<T>>())
            .map(|typed| Arc::clone(&typed.pool))
            .ok_or_else(|| StoreError::Fatal(format!("{id} is not a {} pool", type_name::<T>())))
    }
}

/// Unwraps a freed cell. Every borrow of it holds the entity guard that the
/// caller now holds exclusively, so the cell is unshared.
fn into_value<T>(cell: ComponentCell<T>) -> StoreResult<T> {
    Arc::try_unwrap(cell)
        .map(RwLock::into_inner)
        .map_err(|_| StoreError::Fatal(format!("{} freed while still borrowed", type_name::<T>())))
}

/// An index entry points at a slot that does not hold it.
fn index_inconsistency(component: &'static str, handle: Handle, cause: &StoreError) -> StoreError {
    tracing::error!(
        target: "tessera::component",
        component,
        %handle,
        %cause,
        "component index points at a dead slot"
    );
    if cfg!(debug_assertions) {
        panic!("component index for {component} points at dead slot {handle}: {cause}");
    }
    StoreError::NotFound
}
