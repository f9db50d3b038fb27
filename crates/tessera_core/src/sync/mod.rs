//! # Synchronization Primitives
//!
//! Reader/writer coordination for concurrent access to the store.
//!
//! ## The Problem
//!
//! ```text
//! Worker 1:  add_component(e, Health)      (structural write)
//! Worker 2:  get_component::<Health>(e)    (read)
//!
//! Unsynchronized: reader observes a half-attached component
//! ```
//!
//! ## The Solution: Per-Entity Guards
//!
//! Each entity carries its own reader/writer lock. Structural changes take
//! it exclusively, lookups take it shared. Different entities never contend
//! on each other's guards.

mod guard;

pub use guard::{
    ComponentCell,
    ComponentMut,
    ComponentRef,
    EntityGuard,
    ExclusiveAccess,
    SharedAccess,
    SharedPool,
};
