//! # Store Error Types
//!
//! All errors that can occur in the entity and component store.

use thiserror::Error;

use crate::memory::{AllocationTag, Handle};

/// Errors that can occur in the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Malformed or sentinel handle, or an index outside the pool.
    #[error("invalid handle: {0}")]
    InvalidHandle(Handle),

    /// Well-formed handle whose generation no longer matches its slot.
    #[error("stale handle: {0}")]
    StaleHandle(Handle),

    /// The entity is alive but the requested record does not exist.
    #[error("not found")]
    NotFound,

    /// A component of this type is already attached to the entity.
    #[error("entity {entity} already has a {component} component")]
    DuplicateComponent {
        /// The entity the attach was attempted on.
        entity: Handle,
        /// Name of the component type.
        component: &'static str,
    },

    /// The arena refused a chunk allocation.
    #[error("out of memory: {requested} bytes requested for {tag:?}")]
    OutOfMemory {
        /// Size of the refused request in bytes.
        requested: usize,
        /// The subsystem the request was made for.
        tag: AllocationTag,
    },

    /// The store's own bookkeeping disagrees with itself.
    #[error("internal consistency violation: {0}")]
    Fatal(String),

    /// Invalid configuration file or values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Returns `true` for errors caused by a dead or malformed handle.
    #[inline]
    #[must_use]
    pub const fn is_handle_error(&self) -> bool {
        matches!(self, Self::InvalidHandle(_) | Self::StaleHandle(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
