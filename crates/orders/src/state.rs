//! Order fulfillment state machine.
//!
//! Status after `CONFIRMED` is derived from pick progress. These functions are
//! pure; `Order::apply_pick` / `Order::apply_revert` feed them the progress
//! recomputed inside the enclosing transaction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use lotledger_core::{OrderItemId, ProductId};

use crate::order::{OrderItem, OrderPick, OrderStatus};

/// Picking progress of one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProgress {
    pub order_item_id: OrderItemId,
    pub product_id: ProductId,
    pub ordered: i64,
    pub picked: i64,
    pub pick_count: usize,
}

impl ItemProgress {
    pub fn outstanding(&self) -> i64 {
        (self.ordered - self.picked).max(0)
    }

    pub fn fully_picked(&self) -> bool {
        self.picked >= self.ordered
    }

    pub fn partially_picked(&self) -> bool {
        self.picked > 0 && !self.fully_picked()
    }
}

/// Picking progress of a whole order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProgress {
    pub items: Vec<ItemProgress>,
}

impl OrderProgress {
    /// Aggregate `picks` onto `items`. Picks for unknown items are ignored.
    pub fn compute(items: &[OrderItem], picks: &[OrderPick]) -> Self {
        let mut totals: HashMap<OrderItemId, (i64, usize)> = HashMap::new();
        for pick in picks {
            let entry = totals.entry(pick.order_item_id).or_insert((0, 0));
            entry.0 += pick.quantity;
            entry.1 += 1;
        }

        let items = items
            .iter()
            .map(|item| {
                let (picked, pick_count) = totals.get(&item.id).copied().unwrap_or((0, 0));
                ItemProgress {
                    order_item_id: item.id,
                    product_id: item.product_id,
                    ordered: item.quantity_ordered,
                    picked,
                    pick_count,
                }
            })
            .collect();

        Self { items }
    }

    pub fn item(&self, id: OrderItemId) -> Option<&ItemProgress> {
        self.items.iter().find(|p| p.order_item_id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn all_fully_picked(&self) -> bool {
        self.items.iter().all(ItemProgress::fully_picked)
    }

    pub fn any_partially_picked(&self) -> bool {
        self.items.iter().any(ItemProgress::partially_picked)
    }

    pub fn pick_count(&self) -> usize {
        self.items.iter().map(|p| p.pick_count).sum()
    }

    pub fn total_picked(&self) -> i64 {
        self.items.iter().map(|p| p.picked).sum()
    }
}

/// Status after a forward pick. Never moves backwards.
pub fn next_status_after_pick(
    current: OrderStatus,
    progress: &OrderProgress,
    picks_before: usize,
) -> OrderStatus {
    if !progress.is_empty() && progress.all_fully_picked() {
        return OrderStatus::ReadyToShip;
    }
    match current {
        OrderStatus::Confirmed if picks_before == 0 => OrderStatus::Picking,
        OrderStatus::Picking if progress.any_partially_picked() => OrderStatus::PartialPick,
        other => other,
    }
}

/// Status after a pick was removed.
///
/// When the reverted pick was the latest on the order its recorded prior
/// status is passed as `restore`, so pick-then-revert is an exact inverse.
/// `restore` is only taken when it still agrees with the remaining picks;
/// an earlier revert may have changed them. Otherwise the reverse rules apply.
pub fn next_status_after_revert(
    current: OrderStatus,
    progress: &OrderProgress,
    restore: Option<OrderStatus>,
) -> OrderStatus {
    if progress.pick_count() == 0 {
        return OrderStatus::Confirmed;
    }
    if let Some(prior) = restore.filter(|s| matches_progress(*s, progress)) {
        return prior;
    }
    match current {
        OrderStatus::ReadyToShip if !progress.all_fully_picked() => {
            if progress.any_partially_picked() {
                OrderStatus::PartialPick
            } else {
                OrderStatus::Picking
            }
        }
        OrderStatus::PartialPick if !progress.any_partially_picked() => OrderStatus::Picking,
        other => other,
    }
}

/// Whether `status` describes an order with the given picks on record.
fn matches_progress(status: OrderStatus, progress: &OrderProgress) -> bool {
    match status {
        OrderStatus::Picking => !progress.all_fully_picked(),
        OrderStatus::PartialPick => progress.any_partially_picked(),
        OrderStatus::ReadyToShip => progress.all_fully_picked(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lotledger_core::{LotId, OrderId, PickId, UserId};
    use proptest::prelude::*;

    fn items(quantities: &[i64]) -> Vec<OrderItem> {
        let order_id = OrderId::new();
        quantities
            .iter()
            .enumerate()
            .map(|(i, q)| OrderItem {
                id: OrderItemId::new(),
                order_id,
                line_no: i as u32 + 1,
                product_id: ProductId::new(),
                quantity_ordered: *q,
            })
            .collect()
    }

    fn pick(item: &OrderItem, quantity: i64) -> OrderPick {
        OrderPick {
            id: PickId::new(),
            order_id: item.order_id,
            order_item_id: item.id,
            lot_id: LotId::new(),
            quantity,
            picked_by: UserId::new(),
            picked_at: Utc::now(),
            order_status_before: OrderStatus::Confirmed,
        }
    }

    #[test]
    fn first_partial_pick_moves_confirmed_to_picking() {
        let lines = items(&[10, 5]);
        let progress = OrderProgress::compute(&lines, &[pick(&lines[0], 4)]);
        assert_eq!(
            next_status_after_pick(OrderStatus::Confirmed, &progress, 0),
            OrderStatus::Picking
        );
    }

    #[test]
    fn partial_pick_while_picking_moves_to_partial_pick() {
        let lines = items(&[10, 5]);
        let picks = vec![pick(&lines[0], 4), pick(&lines[0], 2)];
        let progress = OrderProgress::compute(&lines, &picks);
        assert_eq!(
            next_status_after_pick(OrderStatus::Picking, &progress, 1),
            OrderStatus::PartialPick
        );
    }

    #[test]
    fn picking_with_only_whole_items_stays_picking() {
        let lines = items(&[10, 5]);
        let picks = vec![pick(&lines[1], 5)];
        let progress = OrderProgress::compute(&lines, &picks);
        assert_eq!(
            next_status_after_pick(OrderStatus::Picking, &progress, 0),
            OrderStatus::Picking
        );
    }

    #[test]
    fn completing_every_item_is_ready_to_ship() {
        let lines = items(&[10, 5]);
        let picks = vec![pick(&lines[0], 10), pick(&lines[1], 5)];
        let progress = OrderProgress::compute(&lines, &picks);
        assert_eq!(
            next_status_after_pick(OrderStatus::PartialPick, &progress, 1),
            OrderStatus::ReadyToShip
        );
        assert_eq!(
            next_status_after_pick(OrderStatus::Confirmed, &progress, 0),
            OrderStatus::ReadyToShip
        );
    }

    #[test]
    fn reverting_the_only_pick_returns_to_confirmed() {
        let lines = items(&[10]);
        let progress = OrderProgress::compute(&lines, &[]);
        assert_eq!(
            next_status_after_revert(OrderStatus::ReadyToShip, &progress, None),
            OrderStatus::Confirmed
        );
    }

    #[test]
    fn ready_to_ship_steps_back_to_partial_pick() {
        let lines = items(&[10, 5]);
        let picks = vec![pick(&lines[0], 6), pick(&lines[1], 5)];
        let progress = OrderProgress::compute(&lines, &picks);
        assert_eq!(
            next_status_after_revert(OrderStatus::ReadyToShip, &progress, None),
            OrderStatus::PartialPick
        );
    }

    #[test]
    fn ready_to_ship_steps_back_to_picking_when_reverted_item_is_empty() {
        let lines = items(&[10, 5]);
        let picks = vec![pick(&lines[1], 5)];
        let progress = OrderProgress::compute(&lines, &picks);
        assert_eq!(
            next_status_after_revert(OrderStatus::ReadyToShip, &progress, None),
            OrderStatus::Picking
        );
    }

    #[test]
    fn recorded_prior_status_wins_on_revert() {
        let lines = items(&[10, 5]);
        let picks = vec![pick(&lines[0], 4)];
        let progress = OrderProgress::compute(&lines, &picks);
        assert_eq!(
            next_status_after_revert(
                OrderStatus::PartialPick,
                &progress,
                Some(OrderStatus::Picking)
            ),
            OrderStatus::Picking
        );
    }

    #[test]
    fn prior_status_that_no_longer_fits_is_ignored() {
        let lines = items(&[10, 5]);
        let picks = vec![pick(&lines[1], 5)];
        let progress = OrderProgress::compute(&lines, &picks);
        assert_eq!(
            next_status_after_revert(
                OrderStatus::PartialPick,
                &progress,
                Some(OrderStatus::PartialPick)
            ),
            OrderStatus::Picking
        );

        let all = vec![pick(&lines[0], 10), pick(&lines[1], 5)];
        let full = OrderProgress::compute(&lines, &all);
        assert_eq!(
            next_status_after_revert(OrderStatus::ReadyToShip, &full, Some(OrderStatus::Picking)),
            OrderStatus::ReadyToShip
        );
    }

    #[test]
    fn progress_reports_outstanding_per_item() {
        let lines = items(&[10, 5]);
        let picks = vec![pick(&lines[0], 3), pick(&lines[0], 4)];
        let progress = OrderProgress::compute(&lines, &picks);
        let first = progress.item(lines[0].id).unwrap();
        assert_eq!(first.picked, 7);
        assert_eq!(first.outstanding(), 3);
        assert_eq!(first.pick_count, 2);
        assert_eq!(progress.item(lines[1].id).unwrap().outstanding(), 5);
        assert_eq!(progress.pick_count(), 2);
        assert_eq!(progress.total_picked(), 7);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: under forward picks only, status rank never decreases.
        #[test]
        fn forward_picks_never_regress_status(
            ordered in prop::collection::vec(1i64..20, 1..4),
            draws in prop::collection::vec((0usize..4, 1i64..8), 1..30),
        ) {
            let lines = items(&ordered);
            let mut picks: Vec<OrderPick> = Vec::new();
            let mut status = OrderStatus::Confirmed;

            for (which, qty) in draws {
                let line = &lines[which % lines.len()];
                let progress = OrderProgress::compute(&lines, &picks);
                let outstanding = progress.item(line.id).map(|p| p.outstanding()).unwrap_or(0);
                let qty = qty.min(outstanding);
                if qty == 0 {
                    continue;
                }
                let before = picks.len();
                picks.push(pick(line, qty));
                let after = OrderProgress::compute(&lines, &picks);
                let next = next_status_after_pick(status, &after, before);
                prop_assert!(next.rank() >= status.rank());
                status = next;
            }

            let final_progress = OrderProgress::compute(&lines, &picks);
            if final_progress.all_fully_picked() {
                prop_assert_eq!(status, OrderStatus::ReadyToShip);
            }
        }
    }
}
