//! # Entity Component System
//!
//! Storage core for entities and their components.
//!
//! ## Design Philosophy
//!
//! - Entity IDs are table handles: an index plus a generation counter
//! - Each component type lives in its own chunked pool
//! - Each entity carries its own reader/writer guard and component index
//! - No global state: component type ids are scoped to one store

mod component;
mod entity;
mod storage;
mod world;

pub use component::{Component, ComponentTypeId};
pub use entity::{EntityId, EntityIter, EntityRecord, EntityTable};
pub use storage::{ComponentIndex, ComponentStore};
pub use world::{EntityRef, World};
