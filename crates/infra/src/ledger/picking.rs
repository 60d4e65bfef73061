use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use lotledger_core::{Actor, DomainError, EntityKind, LotId, OrderId, OrderItemId, PickId};
use lotledger_events::AuditEmitter;
use lotledger_inventory::{LotEvent, LotStatus, QuantityChanged};
use lotledger_orders::{
    ItemProgress, Order, OrderEvent, OrderPick, OrderProgress, OrderShipped, OrderStatus,
    PickReverted, PickSubmitted, SelectionPolicy, remaining_quantity,
};

use super::{AuditTrail, LedgerResult, LotLedger, found};
use crate::store::{LedgerRead, LedgerStore, LedgerTx};

/// Result of `submit_pick`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickOutcome {
    pub pick: OrderPick,
    pub order_status: OrderStatus,
    pub all_items_fully_picked: bool,
    pub lot_quantity: i64,
    pub lot_status: LotStatus,
}

/// Result of `revert_pick`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertOutcome {
    pub pick_id: PickId,
    pub order_status: OrderStatus,
    pub lot_quantity: i64,
    pub lot_status: LotStatus,
}

impl<S, A> LotLedger<S, A>
where
    S: LedgerStore,
    A: AuditEmitter,
{
    /// Commit `quantity` of `lot_id` to an order line.
    ///
    /// Checked in order, against rows locked for the rest of the call: the
    /// order accepts picks, the quantity is positive, the lot holds the
    /// line's product, the lot is selectable for the line, the pick does not
    /// exceed the line's outstanding quantity, and it does not exceed the
    /// lot's remaining quantity.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn submit_pick(
        &self,
        actor: &Actor,
        item_id: OrderItemId,
        lot_id: LotId,
        quantity: i64,
    ) -> LedgerResult<PickOutcome> {
        let result = self.submit_pick_tx(actor, item_id, lot_id, quantity).await;
        self.finish("submit_pick", result)
    }

    async fn submit_pick_tx(
        &self,
        actor: &Actor,
        item_id: OrderItemId,
        lot_id: LotId,
        quantity: i64,
    ) -> LedgerResult<(PickOutcome, AuditTrail)> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let item = found(tx.order_item(item_id).await?, EntityKind::OrderItem, item_id)?;
        let mut order = found(
            tx.order_for_update(item.order_id).await?,
            EntityKind::Order,
            item.order_id,
        )?;
        order.ensure_pickable()?;

        if quantity <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "pick quantity must be positive (got {quantity})"
            ))
            .into());
        }

        let mut lot = found(tx.lot_for_update(lot_id).await?, EntityKind::Lot, lot_id)?;
        if lot.product_id != item.product_id {
            return Err(DomainError::ProductMismatch {
                expected: item.product_id,
                lot_product: lot.product_id,
            }
            .into());
        }

        let allocations = tx.allocations_for_item(item.id).await?;
        SelectionPolicy::for_item(item.id, &allocations).ensure_selectable(&lot)?;

        let items = tx.order_items(order.id).await?;
        let mut picks = tx.picks_for_order(order.id).await?;
        let outstanding = OrderProgress::compute(&items, &picks)
            .item(item.id)
            .map(ItemProgress::outstanding)
            .unwrap_or(item.quantity_ordered);
        if quantity > outstanding {
            return Err(DomainError::OverPick {
                requested: quantity,
                outstanding,
            }
            .into());
        }

        let committed = tx.committed_quantity(lot.id).await?;
        let remaining = remaining_quantity(&lot, committed);
        if quantity > remaining {
            return Err(DomainError::InsufficientLotQuantity {
                lot_id: lot.id,
                requested: quantity,
                remaining,
            }
            .into());
        }

        let change = lot.adjust_by(-quantity)?;
        tx.update_lot(&lot).await?;

        let pick = OrderPick {
            id: PickId::new(),
            order_id: order.id,
            order_item_id: item.id,
            lot_id: lot.id,
            quantity,
            picked_by: actor.user_id,
            picked_at: now,
            order_status_before: order.status(),
        };
        tx.insert_pick(&pick).await?;

        let picks_before = picks.len();
        picks.push(pick.clone());
        let progress = OrderProgress::compute(&items, &picks);
        let transition = order.apply_pick(&progress, picks_before);
        if transition.changed() {
            tx.update_order(&order).await?;
        }

        tx.commit().await?;
        info!(
            pick_id = %pick.id,
            order_id = %order.id,
            lot_number = %lot.lot_number,
            quantity,
            status_from = %transition.from,
            status_to = %transition.to,
            "pick submitted"
        );

        let mut trail = AuditTrail::new(actor);
        trail.push(OrderEvent::PickSubmitted(PickSubmitted {
            pick_id: pick.id,
            order_id: order.id,
            order_item_id: item.id,
            customer_id: order.customer_id,
            po_number: order.po_number.clone(),
            product_id: item.product_id,
            lot_id: lot.id,
            lot_number: lot.lot_number.clone(),
            quantity,
            status_from: transition.from,
            status_to: transition.to,
            occurred_at: now,
        }));
        trail.push(LotEvent::QuantityChanged(QuantityChanged::from_change(
            &change, "pick", now,
        )));

        let outcome = PickOutcome {
            pick,
            order_status: order.status(),
            all_items_fully_picked: progress.all_fully_picked(),
            lot_quantity: lot.quantity_current(),
            lot_status: lot.status(),
        };
        Ok((outcome, trail))
    }

    /// Delete a pick and give its quantity back to the lot.
    ///
    /// Reverting the order's latest pick restores the status the order had
    /// before that pick. Otherwise the status steps back only as far as the
    /// remaining picks require.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn revert_pick(&self, actor: &Actor, pick_id: PickId) -> LedgerResult<RevertOutcome> {
        let result = self.revert_pick_tx(actor, pick_id).await;
        self.finish("revert_pick", result)
    }

    async fn revert_pick_tx(
        &self,
        actor: &Actor,
        pick_id: PickId,
    ) -> LedgerResult<(RevertOutcome, AuditTrail)> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let pick = found(tx.pick(pick_id).await?, EntityKind::Pick, pick_id)?;
        let mut order = found(
            tx.order_for_update(pick.order_id).await?,
            EntityKind::Order,
            pick.order_id,
        )?;
        order.ensure_revertible()?;

        let mut lot = found(
            tx.lot_for_update(pick.lot_id).await?,
            EntityKind::Lot,
            pick.lot_id,
        )?;
        let change = lot.adjust_by(pick.quantity)?;
        tx.update_lot(&lot).await?;

        let items = tx.order_items(order.id).await?;
        let picks = tx.picks_for_order(order.id).await?;
        let was_latest = picks.last().map(|p| p.id) == Some(pick.id);
        let remaining: Vec<OrderPick> = picks.into_iter().filter(|p| p.id != pick.id).collect();
        tx.delete_pick(pick.id).await?;

        let progress = OrderProgress::compute(&items, &remaining);
        let restore = was_latest.then_some(pick.order_status_before);
        let transition = order.apply_revert(&progress, restore)?;
        if transition.changed() {
            tx.update_order(&order).await?;
        }

        tx.commit().await?;
        info!(
            pick_id = %pick.id,
            order_id = %order.id,
            lot_number = %lot.lot_number,
            quantity = pick.quantity,
            status_from = %transition.from,
            status_to = %transition.to,
            "pick reverted"
        );

        let product_id = items
            .iter()
            .find(|i| i.id == pick.order_item_id)
            .map(|i| i.product_id)
            .unwrap_or(lot.product_id);
        let mut trail = AuditTrail::new(actor);
        trail.push(OrderEvent::PickReverted(PickReverted {
            pick_id: pick.id,
            order_id: order.id,
            order_item_id: pick.order_item_id,
            customer_id: order.customer_id,
            po_number: order.po_number.clone(),
            product_id,
            lot_id: lot.id,
            lot_number: lot.lot_number.clone(),
            quantity: pick.quantity,
            status_from: transition.from,
            status_to: transition.to,
            occurred_at: now,
        }));
        trail.push(LotEvent::QuantityChanged(QuantityChanged::from_change(
            &change,
            "pick_reverted",
            now,
        )));

        let outcome = RevertOutcome {
            pick_id: pick.id,
            order_status: order.status(),
            lot_quantity: lot.quantity_current(),
            lot_status: lot.status(),
        };
        Ok((outcome, trail))
    }

    /// Terminal `READY_TO_SHIP -> SHIPPED`.
    ///
    /// Completeness is re-checked from the pick records rather than trusted
    /// from the stored status.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn finalize_order(&self, actor: &Actor, order_id: OrderId) -> LedgerResult<Order> {
        let result = self.finalize_order_tx(actor, order_id).await;
        self.finish("finalize_order", result)
    }

    async fn finalize_order_tx(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> LedgerResult<(Order, AuditTrail)> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut order = found(
            tx.order_for_update(order_id).await?,
            EntityKind::Order,
            order_id,
        )?;
        let items = tx.order_items(order.id).await?;
        let picks = tx.picks_for_order(order.id).await?;
        let progress = OrderProgress::compute(&items, &picks);
        order.ship(&progress, now)?;
        tx.update_order(&order).await?;

        tx.commit().await?;
        info!(order_id = %order.id, picked = progress.total_picked(), "order shipped");

        let mut trail = AuditTrail::new(actor);
        trail.push(OrderEvent::OrderShipped(OrderShipped {
            order_id: order.id,
            customer_id: order.customer_id,
            po_number: order.po_number.clone(),
            occurred_at: now,
        }));
        Ok((order, trail))
    }
}
