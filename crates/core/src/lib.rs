//! Domain foundation for the lot ledger: ids, actors and the error taxonomy.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the acting identity, and the ledger's error taxonomy.

pub mod actor;
pub mod entity;
pub mod error;
pub mod id;

pub use actor::{Actor, Role};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, EntityKind};
pub use id::{
    AllocationId, CustomerId, LotId, OrderId, OrderItemId, PickId, ProductId, ProductionRunId,
    UserId,
};
