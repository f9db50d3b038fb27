//! # Store Configuration
//!
//! Capacity hints for the entity table and component pools, and memory
//! budgets for the arena. None of these affect correctness.
//!
//! ```toml
//! [entities]
//! chunk_slots = 512
//! initial_slots = 512
//! grow_slots = 1024
//!
//! [memory]
//! event_bytes = 4194304
//! system_bytes = 8388608
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::memory::AllocationTag;

/// Largest chunk a 32-bit handle index can address comfortably.
const MAX_CHUNK_SLOTS: usize = 1 << 24;

/// Sizing of one chunked pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Slots per chunk.
    pub chunk_slots: usize,
    /// Slots reserved at creation, rounded up to whole chunks.
    pub initial_slots: usize,
    /// Slots appended per growth step, rounded up to whole chunks.
    pub grow_slots: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            chunk_slots: 512,
            initial_slots: 512,
            grow_slots: 1024,
        }
    }
}

impl PoolConfig {
    /// Chunks reserved at creation.
    #[inline]
    #[must_use]
    pub const fn initial_chunks(&self) -> usize {
        self.initial_slots.div_ceil(self.chunk_slots)
    }

    /// Chunks appended per growth step (at least one).
    #[inline]
    #[must_use]
    pub const fn grow_chunks(&self) -> usize {
        let chunks = self.grow_slots.div_ceil(self.chunk_slots);
        if chunks == 0 {
            1
        } else {
            chunks
        }
    }

    fn validate(&self, name: &str) -> StoreResult<()> {
        if self.chunk_slots == 0 {
            return Err(StoreError::InvalidConfig(format!("{name}.chunk_slots must be non-zero")));
        }
        if self.chunk_slots > MAX_CHUNK_SLOTS {
            return Err(StoreError::InvalidConfig(format!(
                "{name}.chunk_slots must not exceed {MAX_CHUNK_SLOTS}"
            )));
        }
        if self.grow_slots == 0 {
            return Err(StoreError::InvalidConfig(format!("{name}.grow_slots must be non-zero")));
        }
        Ok(())
    }
}

/// Byte budgets enforced by [`crate::memory::HeapArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBudget {
    /// Overall limit, or `None` for no limit.
    pub total_bytes: Option<usize>,
    /// Limit for [`AllocationTag::Events`].
    pub event_bytes: usize,
    /// Limit for [`AllocationTag::Systems`].
    pub system_bytes: usize,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self {
            total_bytes: None,
            event_bytes: 4 * 1024 * 1024,
            system_bytes: 8 * 1024 * 1024,
        }
    }
}

impl MemoryBudget {
    /// Per-tag limit, if the tag has one.
    #[inline]
    #[must_use]
    pub const fn limit_for(&self, tag: AllocationTag) -> Option<usize> {
        match tag {
            AllocationTag::Events => Some(self.event_bytes),
            AllocationTag::Systems => Some(self.system_bytes),
            AllocationTag::Entities | AllocationTag::Components => None,
        }
    }
}

/// Configuration for a [`crate::World`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Entity table sizing.
    pub entities: PoolConfig,
    /// Sizing applied to every component pool.
    pub components: PoolConfig,
    /// Arena budgets.
    pub memory: MemoryBudget,
}

impl StoreConfig {
    /// Small chunks for tests and tools.
    #[must_use]
    pub const fn compact() -> Self {
        let pool = PoolConfig {
            chunk_slots: 16,
            initial_slots: 16,
            grow_slots: 16,
        };
        Self {
            entities: pool,
            components: pool,
            memory: MemoryBudget {
                total_bytes: None,
                event_bytes: 4 * 1024 * 1024,
                system_bytes: 8 * 1024 * 1024,
            },
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] on malformed TOML or bad values.
    pub fn from_toml_str(source: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| StoreError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks every value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> StoreResult<()> {
        self.entities.validate("entities")?;
        self.components.validate("components")
    }
}
