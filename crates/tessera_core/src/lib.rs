//! # Tessera Core
//!
//! Thread-safe storage core for an Entity Component System:
//! - Generation-checked handles that detect use-after-free
//! - Chunked slot pools with stable addresses and O(1) allocate/free
//! - Per-entity reader/writer guards, so unrelated entities never contend
//!
//! ## Architecture Rules
//!
//! 1. **Handles, not pointers** - every reference is validated on use
//! 2. **Budgeted memory** - pools grow in whole chunks drawn from a [`MemoryArena`]
//! 3. **Entity guard first, component cell second** - the only lock order
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_core::{Component, StoreConfig, World};
//!
//! struct Health(u32);
//! impl Component for Health {}
//!
//! let world = World::new(StoreConfig::default())?;
//! let player = world.spawn()?;
//! player.add_component(Health(100))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;
pub mod sync;

pub use config::{MemoryBudget, PoolConfig, StoreConfig};
pub use ecs::{
    Component, ComponentIndex, ComponentStore, ComponentTypeId, EntityId, EntityIter, EntityRecord,
    EntityRef, EntityTable, World,
};
pub use error::{StoreError, StoreResult};
pub use memory::{Allocation, AllocationTag, ChunkedPool, Handle, HeapArena, MemoryArena, PoolStats, MAX_SLOTS};
pub use sync::{ComponentCell, ComponentMut, ComponentRef, EntityGuard, ExclusiveAccess, SharedAccess, SharedPool};
