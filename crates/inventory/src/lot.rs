use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotledger_core::{DomainError, Entity, EntityKind, LotId, ProductId};
use lotledger_events::Event;

use crate::status::{LotStatus, derive_status};

/// Attributes of a lot at the moment it enters the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLot {
    pub id: LotId,
    pub lot_number: String,
    pub product_id: ProductId,
    pub parent_lot_id: Option<LotId>,
    pub quantity: i64,
    pub received_on: NaiveDate,
    pub expires_on: NaiveDate,
    pub origin_country: Option<String>,
    pub grower_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A physically traceable batch of one product.
///
/// `quantity_current` and `status` are private: they change only through
/// `set_quantity`, `adjust_by`, `set_status` and `expire`, each of which
/// returns a record of what changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLot {
    pub id: LotId,
    pub lot_number: String,
    pub product_id: ProductId,
    pub parent_lot_id: Option<LotId>,
    pub quantity_original: i64,
    pub quantity_received: i64,
    quantity_current: i64,
    pub received_on: NaiveDate,
    pub expires_on: NaiveDate,
    pub origin_country: Option<String>,
    pub grower_id: Option<String>,
    status: LotStatus,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a Lot Store quantity mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityChange {
    pub lot_id: LotId,
    pub lot_number: String,
    pub product_id: ProductId,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub old_status: LotStatus,
    pub new_status: LotStatus,
}

impl QuantityChange {
    pub fn status_changed(&self) -> bool {
        self.old_status != self.new_status
    }

    pub fn diff(&self) -> i64 {
        self.new_quantity - self.old_quantity
    }
}

impl InventoryLot {
    /// Create a lot in `RECEIVED`. Original, received and current quantity all
    /// start at `quantity`.
    pub fn receive(new: NewLot) -> Result<Self, DomainError> {
        if new.quantity < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "lot quantity cannot be negative (got {})",
                new.quantity
            )));
        }
        if new.lot_number.trim().is_empty() {
            return Err(DomainError::validation("lot number cannot be empty"));
        }

        Ok(Self {
            id: new.id,
            lot_number: new.lot_number,
            product_id: new.product_id,
            parent_lot_id: new.parent_lot_id,
            quantity_original: new.quantity,
            quantity_received: new.quantity,
            quantity_current: new.quantity,
            received_on: new.received_on,
            expires_on: new.expires_on,
            origin_country: new.origin_country,
            grower_id: new.grower_id,
            status: LotStatus::Received,
            created_at: new.created_at,
        })
    }

    /// Rebuild a lot from persisted columns. Storage adapters only.
    #[allow(clippy::too_many_arguments)]
    pub fn from_storage(
        id: LotId,
        lot_number: String,
        product_id: ProductId,
        parent_lot_id: Option<LotId>,
        quantity_original: i64,
        quantity_received: i64,
        quantity_current: i64,
        received_on: NaiveDate,
        expires_on: NaiveDate,
        origin_country: Option<String>,
        grower_id: Option<String>,
        status: LotStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            lot_number,
            product_id,
            parent_lot_id,
            quantity_original,
            quantity_received,
            quantity_current,
            received_on,
            expires_on,
            origin_country,
            grower_id,
            status,
            created_at,
        }
    }

    pub fn quantity_current(&self) -> i64 {
        self.quantity_current
    }

    pub fn status(&self) -> LotStatus {
        self.status
    }

    pub fn is_expired_on(&self, as_of: NaiveDate) -> bool {
        self.expires_on < as_of
    }

    /// Set the current quantity outright (`setQuantity`).
    ///
    /// Keeps `0 ≤ quantity_current ≤ quantity_received` and re-derives status.
    pub fn set_quantity(&mut self, new_quantity: i64) -> Result<QuantityChange, DomainError> {
        if new_quantity < 0 {
            return Err(DomainError::invalid_quantity(format!(
                "lot {} cannot go negative (requested {new_quantity})",
                self.lot_number
            )));
        }
        if new_quantity > self.quantity_received {
            return Err(DomainError::invalid_quantity(format!(
                "lot {} cannot exceed its received quantity {} (requested {new_quantity})",
                self.lot_number, self.quantity_received
            )));
        }

        let old_quantity = self.quantity_current;
        let old_status = self.status;
        self.quantity_current = new_quantity;
        self.status = derive_status(old_status, old_quantity, new_quantity);

        Ok(QuantityChange {
            lot_id: self.id,
            lot_number: self.lot_number.clone(),
            product_id: self.product_id,
            old_quantity,
            new_quantity,
            old_status,
            new_status: self.status,
        })
    }

    /// Move the current quantity by `delta` (`adjustBy`).
    pub fn adjust_by(&mut self, delta: i64) -> Result<QuantityChange, DomainError> {
        let target = self
            .quantity_current
            .checked_add(delta)
            .ok_or_else(|| DomainError::invalid_quantity("quantity overflow"))?;
        self.set_quantity(target)
    }

    /// Manual status move (QC workflow, manual expiry).
    pub fn set_status(&mut self, to: LotStatus) -> Result<LotStatus, DomainError> {
        if self.status == to {
            return Err(DomainError::validation(format!(
                "lot {} is already {to}",
                self.lot_number
            )));
        }
        if !self.status.allows_manual_transition(to) {
            return Err(DomainError::validation(format!(
                "lot {} cannot move from {} to {to}",
                self.lot_number, self.status
            )));
        }
        let from = self.status;
        self.status = to;
        Ok(from)
    }

    /// Mark the lot `EXPIRED` if its expiry date has passed and it still holds stock.
    ///
    /// Returns the prior status when a change was made.
    pub fn expire(&mut self, as_of: NaiveDate) -> Option<LotStatus> {
        if !self.is_expired_on(as_of) || self.quantity_current == 0 {
            return None;
        }
        if matches!(self.status, LotStatus::Expired | LotStatus::Depleted) {
            return None;
        }
        let from = self.status;
        self.status = LotStatus::Expired;
        Some(from)
    }
}

impl Entity for InventoryLot {
    type Id = LotId;
    const KIND: EntityKind = EntityKind::Lot;

    fn id(&self) -> LotId {
        self.id
    }
}

/// Event: LotReceived (direct receipt or conversion output).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotReceived {
    pub lot_id: LotId,
    pub lot_number: String,
    pub product_id: ProductId,
    pub parent_lot_id: Option<LotId>,
    pub quantity: i64,
    pub expires_on: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuantityChanged (pick, revert, conversion draw).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityChanged {
    pub lot_id: LotId,
    pub lot_number: String,
    pub product_id: ProductId,
    pub old_qty: i64,
    pub new_qty: i64,
    pub old_status: LotStatus,
    pub new_status: LotStatus,
    pub cause: String,
    pub occurred_at: DateTime<Utc>,
}

impl QuantityChanged {
    pub fn from_change(
        change: &QuantityChange,
        cause: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lot_id: change.lot_id,
            lot_number: change.lot_number.clone(),
            product_id: change.product_id,
            old_qty: change.old_quantity,
            new_qty: change.new_quantity,
            old_status: change.old_status,
            new_status: change.new_status,
            cause: cause.into(),
            occurred_at,
        }
    }
}

/// Event: QuantityAdjusted (manual count correction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityAdjusted {
    pub lot_id: LotId,
    pub lot_number: String,
    pub product_id: ProductId,
    pub old_qty: i64,
    pub new_qty: i64,
    pub diff: i64,
    pub reason: String,
    pub new_status: LotStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotStatusChanged (QC workflow).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotStatusChanged {
    pub lot_id: LotId,
    pub lot_number: String,
    pub from: LotStatus,
    pub to: LotStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotExpired (expiry sweep).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotExpired {
    pub lot_id: LotId,
    pub lot_number: String,
    pub product_id: ProductId,
    pub previous_status: LotStatus,
    pub expires_on: NaiveDate,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LotEvent {
    LotReceived(LotReceived),
    QuantityChanged(QuantityChanged),
    QuantityAdjusted(QuantityAdjusted),
    LotStatusChanged(LotStatusChanged),
    LotExpired(LotExpired),
}

impl Event for LotEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LotEvent::LotReceived(_) => "inventory.lot.received",
            LotEvent::QuantityChanged(_) => "inventory.lot.quantity_changed",
            LotEvent::QuantityAdjusted(_) => "inventory.lot.quantity_adjusted",
            LotEvent::LotStatusChanged(_) => "inventory.lot.status_changed",
            LotEvent::LotExpired(_) => "inventory.lot.expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LotEvent::LotReceived(e) => e.occurred_at,
            LotEvent::QuantityChanged(e) => e.occurred_at,
            LotEvent::QuantityAdjusted(e) => e.occurred_at,
            LotEvent::LotStatusChanged(e) => e.occurred_at,
            LotEvent::LotExpired(e) => e.occurred_at,
        }
    }

    fn subject(&self) -> (EntityKind, String) {
        let id = match self {
            LotEvent::LotReceived(e) => e.lot_id,
            LotEvent::QuantityChanged(e) => e.lot_id,
            LotEvent::QuantityAdjusted(e) => e.lot_id,
            LotEvent::LotStatusChanged(e) => e.lot_id,
            LotEvent::LotExpired(e) => e.lot_id,
        };
        (EntityKind::Lot, id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lot(quantity: i64) -> InventoryLot {
        InventoryLot::receive(NewLot {
            id: LotId::new(),
            lot_number: "L000001".to_string(),
            product_id: ProductId::new(),
            parent_lot_id: None,
            quantity,
            received_on: date(2026, 3, 1),
            expires_on: date(2026, 3, 15),
            origin_country: Some("MX".to_string()),
            grower_id: None,
            created_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn received_lot_starts_full_and_received() {
        let l = lot(40);
        assert_eq!(l.quantity_original, 40);
        assert_eq!(l.quantity_received, 40);
        assert_eq!(l.quantity_current(), 40);
        assert_eq!(l.status(), LotStatus::Received);
    }

    #[test]
    fn draining_to_zero_depletes() {
        let mut l = lot(10);
        let change = l.adjust_by(-10).unwrap();
        assert_eq!(change.old_quantity, 10);
        assert_eq!(change.new_quantity, 0);
        assert!(change.status_changed());
        assert_eq!(l.status(), LotStatus::Depleted);
    }

    #[test]
    fn restoring_a_depleted_lot_makes_it_available() {
        let mut l = lot(10);
        l.adjust_by(-10).unwrap();
        let change = l.adjust_by(4).unwrap();
        assert_eq!(change.new_status, LotStatus::Available);
        assert_eq!(l.quantity_current(), 4);
    }

    #[test]
    fn expired_lot_stays_expired_while_drawn_down() {
        let mut l = lot(10);
        l.expire(date(2026, 3, 16)).unwrap();
        let change = l.adjust_by(-4).unwrap();
        assert_eq!(change.new_status, LotStatus::Expired);
        let change = l.adjust_by(2).unwrap();
        assert_eq!(change.new_status, LotStatus::Available);
    }

    #[test]
    fn negative_result_is_rejected_and_lot_untouched() {
        let mut l = lot(10);
        let err = l.adjust_by(-11).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
        assert_eq!(l.quantity_current(), 10);
        assert_eq!(l.status(), LotStatus::Received);
    }

    #[test]
    fn cannot_exceed_received_quantity() {
        let mut l = lot(10);
        assert!(matches!(
            l.set_quantity(11),
            Err(DomainError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn partial_draw_keeps_status() {
        let mut l = lot(10);
        let change = l.adjust_by(-3).unwrap();
        assert!(!change.status_changed());
        assert_eq!(change.diff(), -3);
    }

    #[test]
    fn qc_workflow_moves_forward_but_never_to_depleted() {
        let mut l = lot(10);
        assert_eq!(l.set_status(LotStatus::QcPending), Ok(LotStatus::Received));
        assert_eq!(l.set_status(LotStatus::Available), Ok(LotStatus::QcPending));
        assert!(l.set_status(LotStatus::Depleted).is_err());
        assert!(l.set_status(LotStatus::Available).is_err());
    }

    #[test]
    fn expire_only_touches_past_dated_stocked_lots() {
        let mut l = lot(10);
        assert_eq!(l.expire(date(2026, 3, 15)), None);
        assert_eq!(l.expire(date(2026, 3, 16)), Some(LotStatus::Received));
        assert_eq!(l.status(), LotStatus::Expired);
        assert_eq!(l.expire(date(2026, 3, 17)), None);

        let mut empty = lot(10);
        empty.adjust_by(-10).unwrap();
        assert_eq!(empty.expire(date(2026, 4, 1)), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of deltas keeps 0 ≤ current ≤ received, and
        /// a zero balance always reads DEPLETED.
        #[test]
        fn bounds_hold_under_any_delta_sequence(
            deltas in prop::collection::vec(-30i64..30, 1..40)
        ) {
            let mut l = lot(50);
            for delta in deltas {
                let _ = l.adjust_by(delta);
                prop_assert!(l.quantity_current() >= 0);
                prop_assert!(l.quantity_current() <= l.quantity_received);
                if l.quantity_current() == 0 {
                    prop_assert_eq!(l.status(), LotStatus::Depleted);
                }
            }
        }
    }
}
