//! Read-only views. Served from the store's reader, never blocking writers,
//! and advisory only: every mutation re-checks its own preconditions.

use std::collections::HashMap;

use serde::Serialize;
use tracing::instrument;

use lotledger_core::{EntityKind, LotId, OrderId, OrderItemId, ProductId};
use lotledger_events::AuditEmitter;
use lotledger_inventory::{InventoryLot, trace_lineage};
use lotledger_orders::{
    FillPlan, LotCandidate, OrderPick, OrderProgress, OrderStatus, SelectionPolicy, select_lots,
    suggest_fill,
};
use lotledger_production::ProductionRun;

use super::{LedgerResult, LotLedger, found};
use crate::store::{LedgerRead, LedgerStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub order_item_id: OrderItemId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub ordered: i64,
    pub picked: i64,
    pub outstanding: i64,
    pub fully_picked: bool,
}

/// Picking progress of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub items: Vec<ItemSummary>,
    pub all_items_fully_picked: bool,
    pub any_item_partially_picked: bool,
    pub total_picked: i64,
}

/// A lot and its conversion ancestors, nearest first. The last entry is the
/// originally received lot, unless the chain is broken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotLineage {
    pub chain: Vec<InventoryLot>,
}

impl LotLineage {
    pub fn origin(&self) -> Option<&InventoryLot> {
        self.chain.last()
    }
}

impl<S, A> LotLedger<S, A>
where
    S: LedgerStore,
    A: AuditEmitter,
{
    /// Lots of `product_id` selectable for `item_id`, oldest expiry first,
    /// each with its remaining quantity.
    #[instrument(skip(self))]
    pub async fn selectable_lots(
        &self,
        product_id: ProductId,
        item_id: OrderItemId,
    ) -> LedgerResult<Vec<LotCandidate>> {
        let mut reader = self.store.reader().await?;
        found(reader.order_item(item_id).await?, EntityKind::OrderItem, item_id)?;
        candidates_for(&mut reader, product_id, item_id).await
    }

    /// Default fill for an order line: one pick per candidate lot, FIFO,
    /// until the outstanding quantity is covered. Never mutates.
    #[instrument(skip(self))]
    pub async fn suggest_fill(&self, item_id: OrderItemId) -> LedgerResult<FillPlan> {
        let mut reader = self.store.reader().await?;
        let item = found(reader.order_item(item_id).await?, EntityKind::OrderItem, item_id)?;
        let items = reader.order_items(item.order_id).await?;
        let picks = reader.picks_for_order(item.order_id).await?;
        let outstanding = OrderProgress::compute(&items, &picks)
            .item(item.id)
            .map(|p| p.outstanding())
            .unwrap_or(item.quantity_ordered);

        let candidates = candidates_for(&mut reader, item.product_id, item.id).await?;
        Ok(suggest_fill(&candidates, outstanding))
    }

    #[instrument(skip(self))]
    pub async fn order_progress(&self, order_id: OrderId) -> LedgerResult<OrderSummary> {
        let mut reader = self.store.reader().await?;
        let order = found(reader.order(order_id).await?, EntityKind::Order, order_id)?;
        let items = reader.order_items(order.id).await?;
        let picks = reader.picks_for_order(order.id).await?;
        let progress = OrderProgress::compute(&items, &picks);

        let summaries = items
            .iter()
            .filter_map(|item| {
                let p = progress.item(item.id)?;
                Some(ItemSummary {
                    order_item_id: item.id,
                    line_no: item.line_no,
                    product_id: item.product_id,
                    ordered: p.ordered,
                    picked: p.picked,
                    outstanding: p.outstanding(),
                    fully_picked: p.fully_picked(),
                })
            })
            .collect();

        Ok(OrderSummary {
            order_id: order.id,
            status: order.status(),
            items: summaries,
            all_items_fully_picked: progress.all_fully_picked(),
            any_item_partially_picked: progress.any_partially_picked(),
            total_picked: progress.total_picked(),
        })
    }

    /// Picks of an order, oldest first.
    #[instrument(skip(self))]
    pub async fn pick_history(&self, order_id: OrderId) -> LedgerResult<Vec<OrderPick>> {
        let mut reader = self.store.reader().await?;
        found(reader.order(order_id).await?, EntityKind::Order, order_id)?;
        Ok(reader.picks_for_order(order_id).await?)
    }

    /// Runs where the lot was consumed or produced.
    #[instrument(skip(self))]
    pub async fn production_runs_for_lot(&self, lot_id: LotId) -> LedgerResult<Vec<ProductionRun>> {
        let mut reader = self.store.reader().await?;
        found(reader.lot(lot_id).await?, EntityKind::Lot, lot_id)?;
        Ok(reader.runs_for_lot(lot_id).await?)
    }

    #[instrument(skip(self))]
    pub async fn lot_lineage(&self, lot_id: LotId) -> LedgerResult<LotLineage> {
        let mut reader = self.store.reader().await?;
        let start = found(reader.lot(lot_id).await?, EntityKind::Lot, lot_id)?;

        let mut ancestors: HashMap<LotId, InventoryLot> = HashMap::new();
        let mut cursor = start.parent_lot_id;
        while let Some(parent_id) = cursor {
            if parent_id == start.id || ancestors.contains_key(&parent_id) {
                break;
            }
            let Some(parent) = reader.lot(parent_id).await? else {
                break;
            };
            cursor = parent.parent_lot_id;
            ancestors.insert(parent_id, parent);
        }

        let chain = trace_lineage(&start, |id| ancestors.get(&id))
            .into_iter()
            .cloned()
            .collect();
        Ok(LotLineage { chain })
    }
}

async fn candidates_for<R: LedgerRead>(
    reader: &mut R,
    product_id: ProductId,
    item_id: OrderItemId,
) -> LedgerResult<Vec<LotCandidate>> {
    let allocations = reader.allocations_for_item(item_id).await?;
    let policy = SelectionPolicy::for_item(item_id, &allocations);
    let lots = reader.lots_for_product(product_id).await?;

    let mut committed: HashMap<LotId, i64> = HashMap::new();
    for lot in lots.iter().filter(|l| l.quantity_current() > 0) {
        committed.insert(lot.id, reader.committed_quantity(lot.id).await?);
    }

    Ok(select_lots(product_id, &lots, &policy, |id| {
        committed.get(&id).copied().unwrap_or(0)
    }))
}
