//! # Handles
//!
//! A handle names one slot in a pool. It is split into two parts:
//! - An index locating the slot
//! - A generation counter for detecting stale references

use std::fmt;

/// Generation-checked identity of a pool slot.
///
/// Packed into a single `u64`:
/// - Lower 32 bits: slot index
/// - Upper 32 bits: generation of the slot when the handle was issued
///
/// Handles carry no ownership. Equality and ordering compare the packed bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Handle(u64);

impl Handle {
    /// The invalid handle. Never produced by allocation.
    pub const INVALID: Self = Self(u64::MAX);

    /// Encodes a handle from index and generation.
    ///
    /// # Arguments
    ///
    /// * `index` - The slot index (0 to 2^32-2; 2^32-1 is reserved)
    /// * `generation` - The slot generation (0 to 2^32-1)
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the handle.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Decodes the handle into `(index, generation)`.
    #[inline]
    #[must_use]
    pub const fn decode(self) -> (u32, u32) {
        (self.index(), self.generation())
    }

    /// Checks that this is not the invalid sentinel.
    ///
    /// A valid handle may still be stale; only the owning pool can tell.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u64::MAX
    }

    /// Returns the packed representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuilds a handle from its packed representation.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}#{}", self.index(), self.generation())
        } else {
            f.write_str("invalid")
        }
    }
}
