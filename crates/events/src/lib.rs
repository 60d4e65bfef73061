//! Ledger events and the audit boundary.
//!
//! Domain crates describe what happened with typed events (`Event`). The
//! ledger turns each committed event into an `AuditEvent` and hands it to an
//! `AuditEmitter`; persistence of the audit trail is someone else's job.

pub mod audit;
pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use audit::{AuditEmitter, AuditError, AuditEvent, NoopAuditEmitter, TracingAuditEmitter};
pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
