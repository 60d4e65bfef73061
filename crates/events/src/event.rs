use chrono::{DateTime, Utc};
use serde::Serialize;

use lotledger_core::EntityKind;

/// A typed ledger event.
///
/// Events are facts: they are produced after a mutation has been decided and
/// are never edited afterwards. The serialized form becomes the `details` of
/// the audit record, so field names are part of the audit contract.
pub trait Event: Clone + core::fmt::Debug + Serialize + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.lot.quantity_changed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// The record this event is about.
    fn subject(&self) -> (EntityKind, String);
}
