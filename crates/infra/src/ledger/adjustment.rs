use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};

use lotledger_core::{Actor, DomainError, EntityKind, LotId};
use lotledger_events::AuditEmitter;
use lotledger_inventory::{
    InventoryLot, LotEvent, LotExpired, LotStatus, LotStatusChanged, QuantityAdjusted,
    QuantityChange,
};

use super::{AuditTrail, LedgerResult, LotLedger, found};
use crate::store::{LedgerStore, LedgerTx};

impl<S, A> LotLedger<S, A>
where
    S: LedgerStore,
    A: AuditEmitter,
{
    /// Manual count correction: set `quantity_current` outright.
    ///
    /// Independent of picks. The audit record carries old and new quantity,
    /// the difference and the reason.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn adjust_quantity(
        &self,
        actor: &Actor,
        lot_id: LotId,
        new_quantity: i64,
        reason: &str,
    ) -> LedgerResult<QuantityChange> {
        let result = self
            .adjust_quantity_tx(actor, lot_id, new_quantity, reason)
            .await;
        self.finish("adjust_quantity", result)
    }

    async fn adjust_quantity_tx(
        &self,
        actor: &Actor,
        lot_id: LotId,
        new_quantity: i64,
        reason: &str,
    ) -> LedgerResult<(QuantityChange, AuditTrail)> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("an adjustment needs a reason").into());
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut lot = found(tx.lot_for_update(lot_id).await?, EntityKind::Lot, lot_id)?;
        let change = lot.set_quantity(new_quantity)?;
        tx.update_lot(&lot).await?;
        tx.commit().await?;

        info!(
            lot_number = %lot.lot_number,
            old_qty = change.old_quantity,
            new_qty = change.new_quantity,
            reason,
            "lot quantity adjusted"
        );

        let mut trail = AuditTrail::new(actor);
        trail.push(LotEvent::QuantityAdjusted(QuantityAdjusted {
            lot_id: change.lot_id,
            lot_number: change.lot_number.clone(),
            product_id: change.product_id,
            old_qty: change.old_quantity,
            new_qty: change.new_quantity,
            diff: change.diff(),
            reason: reason.to_string(),
            new_status: change.new_status,
            occurred_at: now,
        }));
        Ok((change, trail))
    }

    /// QC workflow status move. `DEPLETED` is never set by hand.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn set_lot_status(
        &self,
        actor: &Actor,
        lot_id: LotId,
        status: LotStatus,
    ) -> LedgerResult<InventoryLot> {
        let result = self.set_lot_status_tx(actor, lot_id, status).await;
        self.finish("set_lot_status", result)
    }

    async fn set_lot_status_tx(
        &self,
        actor: &Actor,
        lot_id: LotId,
        status: LotStatus,
    ) -> LedgerResult<(InventoryLot, AuditTrail)> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut lot = found(tx.lot_for_update(lot_id).await?, EntityKind::Lot, lot_id)?;
        let from = lot.set_status(status)?;
        tx.update_lot(&lot).await?;
        tx.commit().await?;

        info!(lot_number = %lot.lot_number, from = %from, to = %status, "lot status changed");

        let mut trail = AuditTrail::new(actor);
        trail.push(LotEvent::LotStatusChanged(LotStatusChanged {
            lot_id: lot.id,
            lot_number: lot.lot_number.clone(),
            from,
            to: status,
            occurred_at: now,
        }));
        Ok((lot, trail))
    }

    /// Mark every lot whose expiry date is before `as_of` and that still
    /// holds stock as `EXPIRED`. Returns the lots that changed.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn expire_lots(
        &self,
        actor: &Actor,
        as_of: NaiveDate,
    ) -> LedgerResult<Vec<InventoryLot>> {
        let result = self.expire_lots_tx(actor, as_of).await;
        self.finish("expire_lots", result)
    }

    async fn expire_lots_tx(
        &self,
        actor: &Actor,
        as_of: NaiveDate,
    ) -> LedgerResult<(Vec<InventoryLot>, AuditTrail)> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let mut trail = AuditTrail::new(actor);
        let mut expired = Vec::new();

        for mut lot in tx.expiring_lots_for_update(as_of).await? {
            let Some(previous_status) = lot.expire(as_of) else {
                continue;
            };
            tx.update_lot(&lot).await?;
            trail.push(LotEvent::LotExpired(LotExpired {
                lot_id: lot.id,
                lot_number: lot.lot_number.clone(),
                product_id: lot.product_id,
                previous_status,
                expires_on: lot.expires_on,
                quantity: lot.quantity_current(),
                occurred_at: now,
            }));
            expired.push(lot);
        }

        tx.commit().await?;
        info!(%as_of, expired = expired.len(), "expiry sweep finished");
        Ok((expired, trail))
    }
}
