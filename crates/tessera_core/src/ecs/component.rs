//! # Component System
//!
//! Components are plain data owned by exactly one entity. The store is
//! agnostic to what they contain.

use std::any::Any;
use std::fmt;

/// Marker trait for storable components.
///
/// Components must be:
/// - `Send + Sync`: pools are shared between worker threads
/// - `'static`: the type is its own lookup key
///
/// # Example
///
/// ```rust,ignore
/// struct Health(u32);
///
/// impl Component for Health {
///     fn receive(&mut self, event: &dyn Any) {
///         if let Some(Damage(amount)) = event.downcast_ref::<Damage>() {
///             self.0 = self.0.saturating_sub(*amount);
///         }
///     }
/// }
/// ```
pub trait Component: Send + Sync + 'static {
    /// Receives a payload fanned out by
    /// [`crate::World::pass_data_to_all_components`].
    ///
    /// The default ignores every payload.
    fn receive(&mut self, _event: &dyn Any) {}
}

/// Stable per-type key, assigned on first use by a
/// [`crate::ecs::ComponentStore`] and never reused for another type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ComponentTypeId(u32);

impl ComponentTypeId {
    #[inline]
    pub(crate) const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component#{}", self.0)
    }
}
