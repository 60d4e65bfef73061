//! The lot ledger service.
//!
//! `LotLedger` executes every mutating ledger operation as one store
//! transaction:
//!
//! ```text
//! begin tx
//!   ↓
//! 1. Load and lock the rows the operation depends on
//!   ↓
//! 2. Validate preconditions against the locked state (pure domain calls)
//!   ↓
//! 3. Write the effects through the tx, collecting audit events
//!   ↓
//! commit
//!   ↓
//! 4. Hand the audit events to the emitter
//! ```
//!
//! Any error before `commit` drops the tx and rolls back every write of the
//! call. Audit emission happens only after a successful commit and its
//! failures are logged, never returned.
//!
//! ## Lock order
//!
//! Pick and revert lock the order row, then the lot row. Conversions lock
//! only lot rows, in ascending id order. Adjustments lock a single lot.
//!
//! ## Errors
//!
//! Business-rule rejections come back as `LedgerError::Domain` and are
//! deterministic. `LedgerError::Store` is the only retryable class.

mod adjustment;
mod conversion;
mod picking;
mod queries;
mod setup;

pub use conversion::ConversionOutcome;
pub use picking::{PickOutcome, RevertOutcome};
pub use queries::{ItemSummary, LotLineage, OrderSummary};
pub use setup::{LotReceipt, PlacedOrder};

use thiserror::Error;
use tracing::{debug, warn};

use lotledger_core::{Actor, DomainError, EntityKind};
use lotledger_events::{AuditEmitter, AuditEvent, Event};

use crate::config::LotNumberFormat;
use crate::store::{LedgerStore, StoreError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Only storage faults are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Store(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Domain(e) => e.code(),
            LedgerError::Store(StoreError::Conflict(_)) => "STORE_CONFLICT",
            LedgerError::Store(_) => "STORE_ERROR",
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            LedgerError::Domain(e) => Some(e),
            LedgerError::Store(_) => None,
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Lot ledger over a store `S`, reporting to audit emitter `A`.
#[derive(Debug, Clone)]
pub struct LotLedger<S, A> {
    store: S,
    audit: A,
    lot_numbers: LotNumberFormat,
}

impl<S, A> LotLedger<S, A> {
    pub fn new(store: S, audit: A) -> Self {
        Self {
            store,
            audit,
            lot_numbers: LotNumberFormat::default(),
        }
    }

    pub fn with_lot_numbers(mut self, format: LotNumberFormat) -> Self {
        self.lot_numbers = format;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }
}

impl<S, A> LotLedger<S, A>
where
    S: LedgerStore,
    A: AuditEmitter,
{
    /// Publish a committed operation's audit trail, or log why it failed.
    fn finish<T>(
        &self,
        operation: &'static str,
        result: LedgerResult<(T, AuditTrail)>,
    ) -> LedgerResult<T> {
        match result {
            Ok((value, trail)) => {
                self.publish(trail);
                Ok(value)
            }
            Err(err) => {
                log_rejection(operation, &err);
                Err(err)
            }
        }
    }

    fn publish(&self, trail: AuditTrail) {
        for event in trail.events {
            let action = event.action.clone();
            if let Err(err) = self.audit.record(event) {
                warn!(action = %action, error = %err, "audit emission failed");
            }
        }
    }
}

/// Audit events gathered while a transaction runs.
#[derive(Debug)]
pub(crate) struct AuditTrail {
    actor: Actor,
    events: Vec<AuditEvent>,
}

impl AuditTrail {
    pub(crate) fn new(actor: &Actor) -> Self {
        Self {
            actor: *actor,
            events: Vec::new(),
        }
    }

    pub(crate) fn push<E: Event>(&mut self, event: E) {
        match AuditEvent::from_event(&self.actor, &event) {
            Ok(audit) => self.events.push(audit),
            Err(err) => warn!(
                event_type = event.event_type(),
                error = %err,
                "dropping unserializable audit event"
            ),
        }
    }
}

fn log_rejection(operation: &'static str, err: &LedgerError) {
    match err {
        LedgerError::Domain(e) => {
            debug!(operation, code = e.code(), error = %e, "ledger operation rejected")
        }
        LedgerError::Store(e) => warn!(operation, error = %e, "ledger operation failed"),
    }
}

/// Turn a missing row into `NotFound`.
pub(crate) fn found<T>(
    row: Option<T>,
    kind: EntityKind,
    id: impl core::fmt::Display,
) -> LedgerResult<T> {
    row.ok_or_else(|| DomainError::not_found(kind, id).into())
}
