//! Audit emission boundary.
//!
//! The ledger reports every committed mutation as an `AuditEvent`. Emission is
//! fire-and-forget from the ledger's point of view: a failing emitter is logged
//! and the already-committed operation still succeeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use uuid::Uuid;

use lotledger_core::{Actor, EntityKind, UserId};

use crate::event::Event;

/// Structured audit record: who did what to which record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub actor_id: UserId,
    pub action: String,
    pub entity_type: EntityKind,
    pub entity_id: String,
    pub details: Map<String, JsonValue>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit payload serialization failed: {0}")]
    Serialize(String),

    #[error("audit sink rejected event: {0}")]
    Sink(String),
}

impl AuditEvent {
    /// Build an audit record from a typed event.
    ///
    /// The event's serialized fields become `details`; event schema version is
    /// added under `event_version`.
    pub fn from_event<E: Event>(actor: &Actor, event: &E) -> Result<Self, AuditError> {
        let details = match serde_json::to_value(event)
            .map_err(|e| AuditError::Serialize(e.to_string()))?
        {
            JsonValue::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let (entity_type, entity_id) = event.subject();

        let mut audit = Self {
            event_id: Uuid::now_v7(),
            actor_id: actor.user_id,
            action: event.event_type().to_string(),
            entity_type,
            entity_id,
            details,
            occurred_at: event.occurred_at(),
        };
        audit
            .details
            .insert("event_version".to_string(), JsonValue::from(event.version()));
        Ok(audit)
    }

    /// Fetch a detail field by name.
    pub fn detail(&self, key: &str) -> Option<&JsonValue> {
        self.details.get(key)
    }
}

/// Receiver of audit records (`record(actor, action, entityType, entityId, details)`).
pub trait AuditEmitter: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

impl<A> AuditEmitter for Arc<A>
where
    A: AuditEmitter + ?Sized,
{
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        (**self).record(event)
    }
}

/// Writes audit records to the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditEmitter;

impl AuditEmitter for TracingAuditEmitter {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let details = serde_json::to_string(&event.details)
            .map_err(|e| AuditError::Serialize(e.to_string()))?;
        tracing::info!(
            target: "audit",
            actor_id = %event.actor_id,
            action = %event.action,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            details = %details,
            "audit"
        );
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditEmitter;

impl AuditEmitter for NoopAuditEmitter {
    fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotledger_core::{LotId, Role};

    #[derive(Debug, Clone, Serialize)]
    struct Counted {
        lot_id: LotId,
        old_qty: i64,
        new_qty: i64,
        at: DateTime<Utc>,
    }

    impl Event for Counted {
        fn event_type(&self) -> &'static str {
            "test.counted"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }

        fn subject(&self) -> (EntityKind, String) {
            (EntityKind::Lot, self.lot_id.to_string())
        }
    }

    #[test]
    fn from_event_copies_fields_into_details() {
        let actor = Actor::new(UserId::new(), Role::Manager);
        let lot_id = LotId::new();
        let ev = Counted {
            lot_id,
            old_qty: 10,
            new_qty: 7,
            at: Utc::now(),
        };

        let audit = AuditEvent::from_event(&actor, &ev).unwrap();

        assert_eq!(audit.actor_id, actor.user_id);
        assert_eq!(audit.action, "test.counted");
        assert_eq!(audit.entity_type, EntityKind::Lot);
        assert_eq!(audit.entity_id, lot_id.to_string());
        assert_eq!(audit.detail("old_qty"), Some(&JsonValue::from(10)));
        assert_eq!(audit.detail("new_qty"), Some(&JsonValue::from(7)));
        assert_eq!(audit.occurred_at, ev.at);
    }
}
