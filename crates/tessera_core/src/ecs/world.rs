//! # ECS World
//!
//! The central container for all entities and components. Binds the entity
//! table, the component store and the arena together, and applies the
//! per-entity locking discipline to every operation.

use std::any::Any;
use std::sync::Arc;

use parking_lot::lock_api::ArcRwLockWriteGuard;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::memory::{HeapArena, MemoryArena};
use crate::sync::{ComponentMut, ComponentRef, ExclusiveAccess, SharedAccess};

use super::component::{Component, ComponentTypeId};
use super::entity::{EntityId, EntityIter, EntityTable};
use super::storage::ComponentStore;

/// The ECS World - container for all entity and component state.
///
/// Every method takes `&self`; share the world between worker threads with
/// an `Arc`.
///
/// # Locking
///
/// - `add_component`, `remove_component`, `remove_all_components` and
///   `destroy_entity` hold the entity's guard exclusively.
/// - `get_component`, `get_component_mut` and
///   `pass_data_to_all_components` hold it shared.
/// - A borrow additionally locks only the borrowed component's own cell.
///   Different entities never block each other, even when they share a
///   component type.
///
/// Do not request structural changes to an entity while holding a
/// [`ComponentRef`] or [`ComponentMut`] into it on the same thread.
///
/// # Example
///
/// ```rust,ignore
/// let world = World::new(StoreConfig::default())?;
///
/// let entity = world.create_entity()?;
/// world.add_component(entity, Position { x: 1.0, y: 2.0 })?;
/// assert_eq!(world.get_component::<Position>(entity)?.unwrap().x, 1.0);
///
/// world.destroy_entity(entity)?;
/// assert!(world.get_component::<Position>(entity).is_err());
/// ```
pub struct World {
    entities: EntityTable,
    components: ComponentStore,
    arena: Arc<dyn MemoryArena>,
    config: StoreConfig,
}

impl World {
    /// Creates a world backed by a [`HeapArena`] enforcing `config.memory`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] or [`StoreError::OutOfMemory`].
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let arena: Arc<dyn MemoryArena> = Arc::new(HeapArena::new(config.memory));
        Self::with_arena(config, arena)
    }

    /// Creates a world whose pools request chunks from `arena`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] or [`StoreError::OutOfMemory`].
    pub fn with_arena(config: StoreConfig, arena: Arc<dyn MemoryArena>) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            entities: EntityTable::new(config.entities, Arc::clone(&arena))?,
            components: ComponentStore::new(config.components, Arc::clone(&arena)),
            arena,
            config,
        })
    }

    /// Returns the configuration this world was built with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the arena backing every pool.
    #[inline]
    #[must_use]
    pub fn arena(&self) -> &Arc<dyn MemoryArena> {
        &self.arena
    }

    /// Returns the entity table.
    ///
    /// Entities are created and destroyed only through the world, so that
    /// destruction always removes the entity's components first.
    #[inline]
    #[must_use]
    pub const fn entity_table(&self) -> &EntityTable {
        &self.entities
    }

    /// Returns the component store.
    #[inline]
    #[must_use]
    pub const fn components(&self) -> &ComponentStore {
        &self.components
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    /// Creates a new active entity with no components.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OutOfMemory`] if the entity table could not grow.
    pub fn create_entity(&self) -> StoreResult<EntityId> {
        self.entities.create()
    }

    /// Creates an entity and returns a handle bound to this world.
    ///
    /// # Errors
    ///
    /// Same as [`World::create_entity`].
    pub fn spawn(&self) -> StoreResult<EntityRef<'_>> {
        let id = self.create_entity()?;
        Ok(EntityRef { world: self, id })
    }

    /// Binds a live entity to this world.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] or [`StoreError::StaleHandle`].
    pub fn entity(&self, id: EntityId) -> StoreResult<EntityRef<'_>> {
        self.entities.guard(id)?;
        Ok(EntityRef { world: self, id })
    }

    /// Destroys an entity: removes every component, then frees its slot.
    ///
    /// Returns the number of components removed. Every copy of `id` is stale
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] for the null id and
    /// [`StoreError::StaleHandle`] for an already destroyed one; nothing
    /// changes in either case.
    pub fn destroy_entity(&self, id: EntityId) -> StoreResult<usize> {
        let mut access = self.exclusive(id)?;

        let removed = self.components.remove_all(&mut access);
        access.mark_dead();
        self.entities.free(id)?;
        drop(access);

        removed
    }

    /// Checks whether `id` refers to a live entity.
    #[must_use]
    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.exists(id)
    }

    /// Sets the entity's active flag. The store does not interpret it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] or [`StoreError::StaleHandle`].
    pub fn set_active(&self, id: EntityId, active: bool) -> StoreResult<()> {
        self.entities.set_active(id, active)
    }

    /// Reads the entity's active flag.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] or [`StoreError::StaleHandle`].
    pub fn is_active(&self, id: EntityId) -> StoreResult<bool> {
        self.entities.is_active(id)
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Lazily iterates over live entities.
    #[must_use]
    pub fn entities(&self) -> EntityIter<'_> {
        self.entities.iter()
    }

    /// Lazily iterates over live, active entities.
    #[must_use]
    pub fn active_entities(&self) -> EntityIter<'_> {
        self.entities.iter_active()
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Attaches `value` to the entity and returns it, mutably borrowed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidHandle`] / [`StoreError::StaleHandle`] for a dead entity
    /// - [`StoreError::DuplicateComponent`] if a `T` is already attached
    /// - [`StoreError::OutOfMemory`] if the pool could not grow
    pub fn add_component<T: Component>(&self, id: EntityId, value: T) -> StoreResult<ComponentMut<T>> {
        let mut access = self.exclusive(id)?;
        self.components.insert(&mut access, id, value)?;

        // Nobody can detach the component between insert and borrow.
        let shared = ArcRwLockWriteGuard::downgrade(access);
        self.components
            .get_mut::<T>(shared)?
            .ok_or(StoreError::NotFound)
    }

    /// Borrows the entity's `T`, or `Ok(None)` if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHandle`] or [`StoreError::StaleHandle`]
    /// for a dead entity.
    pub fn get_component<T: Component>(&self, id: EntityId) -> StoreResult<Option<ComponentRef<T>>> {
        let access = self.shared(id)?;
        self.components.get::<T>(access)
    }

    /// Mutably borrows the entity's `T`, or `Ok(None)` if it has none.
    ///
    /// # Errors
    ///
    /// Same as [`World::get_component`].
    pub fn get_component_mut<T: Component>(&self, id: EntityId) -> StoreResult<Option<ComponentMut<T>>> {
        let access = self.shared(id)?;
        self.components.get_mut::<T>(access)
    }

    /// Checks whether the entity has a `T`.
    ///
    /// # Errors
    ///
    /// Same as [`World::get_component`].
    pub fn has_component<T: Component>(&self, id: EntityId) -> StoreResult<bool> {
        let access = self.shared(id)?;
        Ok(self.components.has::<T>(&access))
    }

    /// Detaches and returns the entity's `T`, or `Ok(None)` if it has none.
    ///
    /// # Errors
    ///
    /// Same as [`World::get_component`].
    pub fn remove_component<T: Component>(&self, id: EntityId) -> StoreResult<Option<T>> {
        let mut access = self.exclusive(id)?;
        self.components.remove::<T>(&mut access)
    }

    /// Detaches every component. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Same as [`World::get_component`].
    pub fn remove_all_components(&self, id: EntityId) -> StoreResult<usize> {
        let mut access = self.exclusive(id)?;
        self.components.remove_all(&mut access)
    }

    /// Returns the component types attached to the entity.
    ///
    /// # Errors
    ///
    /// Same as [`World::get_component`].
    pub fn component_types(&self, id: EntityId) -> StoreResult<Vec<ComponentTypeId>> {
        Ok(self.shared(id)?.types())
    }

    /// Hands `event` to every component of the entity through
    /// [`Component::receive`]. Returns how many components received it.
    ///
    /// # Errors
    ///
    /// Same as [`World::get_component`].
    pub fn pass_data_to_all_components<E: Any>(&self, id: EntityId, event: &E) -> StoreResult<usize> {
        let access = self.shared(id)?;
        self.components.deliver_all(&access, event)
    }

    fn shared(&self, id: EntityId) -> StoreResult<SharedAccess> {
        let access = self.entities.guard(id)?.read();
        if access.is_alive() {
            Ok(access)
        } else {
            Err(StoreError::StaleHandle(id.handle()))
        }
    }

    fn exclusive(&self, id: EntityId) -> StoreResult<ExclusiveAccess> {
        let access = self.entities.guard(id)?.write();
        if access.is_alive() {
            Ok(access)
        } else {
            Err(StoreError::StaleHandle(id.handle()))
        }
    }
}

/// An entity bound to the world it lives in.
///
/// Every method forwards to the matching [`World`] method.
#[derive(Clone, Copy)]
pub struct EntityRef<'w> {
    world: &'w World,
    id: EntityId,
}

impl<'w> EntityRef<'w> {
    /// The entity's ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// The world this entity is bound to.
    #[inline]
    #[must_use]
    pub const fn world(&self) -> &'w World {
        self.world
    }

    /// See [`World::add_component`].
    ///
    /// # Errors
    ///
    /// Same as [`World::add_component`].
    pub fn add_component<T: Component>(&self, value: T) -> StoreResult<ComponentMut<T>> {
        self.world.add_component(self.id, value)
    }

    /// See [`World::get_component`].
    ///
    /// # Errors
    ///
    /// Same as [`World::get_component`].
    pub fn get_component<T: Component>(&self) -> StoreResult<Option<ComponentRef<T>>> {
        self.world.get_component(self.id)
    }

    /// See [`World::get_component_mut`].
    ///
    /// # Errors
    ///
    /// Same as [`World::get_component_mut`].
    pub fn get_component_mut<T: Component>(&self) -> StoreResult<Option<ComponentMut<T>>> {
        self.world.get_component_mut(self.id)
    }

    /// See [`World::has_component`].
    ///
    /// # Errors
    ///
    /// Same as [`World::has_component`].
    pub fn has_component<T: Component>(&self) -> StoreResult<bool> {
        self.world.has_component::<T>(self.id)
    }

    /// See [`World::remove_component`].
    ///
    /// # Errors
    ///
    /// Same as [`World::remove_component`].
    pub fn remove_component<T: Component>(&self) -> StoreResult<Option<T>> {
        self.world.remove_component(self.id)
    }

    /// See [`World::remove_all_components`].
    ///
    /// # Errors
    ///
    /// Same as [`World::remove_all_components`].
    pub fn remove_all_components(&self) -> StoreResult<usize> {
        self.world.remove_all_components(self.id)
    }

    /// See [`World::pass_data_to_all_components`].
    ///
    /// # Errors
    ///
    /// Same as [`World::pass_data_to_all_components`].
    pub fn pass_data<E: Any>(&self, event: &E) -> StoreResult<usize> {
        self.world.pass_data_to_all_components(self.id, event)
    }

    /// See [`World::set_active`].
    ///
    /// # Errors
    ///
    /// Same as [`World::set_active`].
    pub fn set_active(&self, active: bool) -> StoreResult<()> {
        self.world.set_active(self.id, active)
    }

    /// See [`World::is_active`].
    ///
    /// # Errors
    ///
    /// Same as [`World::is_active`].
    pub fn is_active(&self) -> StoreResult<bool> {
        self.world.is_active(self.id)
    }

    /// See [`World::destroy_entity`].
    ///
    /// # Errors
    ///
    /// Same as [`World::destroy_entity`].
    pub fn destroy(self) -> StoreResult<usize> {
        self.world.destroy_entity(self.id)
    }
}
