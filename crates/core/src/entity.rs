//! Entity trait: identity that survives quantity and status changes.

use crate::error::EntityKind;

/// A ledger record addressed by a stable identifier.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Which kind of record this is (used for `NotFound` reporting and audit).
    const KIND: EntityKind;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
