//! # Memory Management
//!
//! Generation-checked handles, chunked slot pools, and the arena boundary
//! the pools request their chunks from.
//!
//! ## Design Philosophy
//!
//! - Chunks are appended, never relocated
//! - Freed slots are reused before the pool grows
//! - Every reuse bumps the slot generation

mod arena;
mod handle;
mod pool;

pub use arena::{Allocation, AllocationTag, HeapArena, MemoryArena};
pub use handle::Handle;
pub use pool::{ChunkedPool, PoolStats, MAX_SLOTS};
