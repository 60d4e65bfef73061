//! Lot selection policy for order lines.
//!
//! A lot is selectable for a line through one of two branches: its status is
//! still usable, or it was explicitly allocated to that line. Candidates are
//! offered oldest expiry first; the order is advisory and a pick may name any
//! selectable lot.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lotledger_core::{DomainError, LotId, OrderId, OrderItemId, ProductId};
use lotledger_inventory::InventoryLot;

use crate::order::{OrderAllocation, OrderPick, OrderStatus};

/// Which branch admitted a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// `RECEIVED`, `QC_PENDING` or `AVAILABLE`.
    UsableStatus,
    /// Reserved for the line, whatever its status now.
    Allocated,
}

/// Selectable-lot predicate for one order line.
#[derive(Debug, Clone, Default)]
pub struct SelectionPolicy {
    allocated: HashSet<LotId>,
}

impl SelectionPolicy {
    pub fn for_item<'a>(
        item_id: OrderItemId,
        allocations: impl IntoIterator<Item = &'a OrderAllocation>,
    ) -> Self {
        let allocated = allocations
            .into_iter()
            .filter(|a| a.order_item_id == item_id)
            .map(|a| a.lot_id)
            .collect();
        Self { allocated }
    }

    pub fn admit(&self, lot: &InventoryLot) -> Option<Admission> {
        if lot.status().is_usable() {
            Some(Admission::UsableStatus)
        } else if self.allocated.contains(&lot.id) {
            Some(Admission::Allocated)
        } else {
            None
        }
    }

    pub fn ensure_selectable(&self, lot: &InventoryLot) -> Result<Admission, DomainError> {
        self.admit(lot).ok_or_else(|| DomainError::LotNotAvailable {
            lot_id: lot.id,
            status: lot.status().to_string(),
        })
    }
}

/// Quantity of `lot_id` held by picks on orders that have not shipped.
///
/// Picks whose order status is unknown count as committed.
pub fn committed_quantity<'a, F>(
    lot_id: LotId,
    picks: impl IntoIterator<Item = &'a OrderPick>,
    status_of: F,
) -> i64
where
    F: Fn(OrderId) -> Option<OrderStatus>,
{
    picks
        .into_iter()
        .filter(|p| p.lot_id == lot_id)
        .filter(|p| status_of(p.order_id) != Some(OrderStatus::Shipped))
        .map(|p| p.quantity)
        .sum()
}

/// `max(0, quantity_current - committed)`.
pub fn remaining_quantity(lot: &InventoryLot, committed: i64) -> i64 {
    (lot.quantity_current() - committed).max(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotCandidate {
    pub lot: InventoryLot,
    pub remaining: i64,
    pub admission: Admission,
}

/// Selectable lots of `product_id` with stock, oldest expiry first.
///
/// Equal expiry dates keep lot creation order.
pub fn select_lots<'a, F>(
    product_id: ProductId,
    lots: impl IntoIterator<Item = &'a InventoryLot>,
    policy: &SelectionPolicy,
    committed_of: F,
) -> Vec<LotCandidate>
where
    F: Fn(LotId) -> i64,
{
    let mut candidates: Vec<LotCandidate> = lots
        .into_iter()
        .filter(|lot| lot.product_id == product_id && lot.quantity_current() > 0)
        .filter_map(|lot| {
            let admission = policy.admit(lot)?;
            Some(LotCandidate {
                remaining: remaining_quantity(lot, committed_of(lot.id)),
                lot: lot.clone(),
                admission,
            })
        })
        .collect();

    candidates.sort_by_key(|c| (c.lot.expires_on, c.lot.created_at));
    candidates
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedPick {
    pub lot_id: LotId,
    pub lot_number: String,
    pub expires_on: NaiveDate,
    pub quantity: i64,
}

/// Default fill for an order line. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FillPlan {
    pub picks: Vec<SuggestedPick>,
    /// Quantity that no candidate could cover.
    pub shortfall: i64,
}

impl FillPlan {
    pub fn planned_quantity(&self) -> i64 {
        self.picks.iter().map(|p| p.quantity).sum()
    }
}

/// Walk `candidates` in order, proposing one pick per lot until
/// `outstanding` is covered.
pub fn suggest_fill(candidates: &[LotCandidate], outstanding: i64) -> FillPlan {
    let mut left = outstanding.max(0);
    let mut plan = FillPlan::default();

    for candidate in candidates {
        if left == 0 {
            break;
        }
        let take = candidate.remaining.min(left);
        if take <= 0 {
            continue;
        }
        plan.picks.push(SuggestedPick {
            lot_id: candidate.lot.id,
            lot_number: candidate.lot.lot_number.clone(),
            expires_on: candidate.lot.expires_on,
            quantity: take,
        });
        left -= take;
    }

    plan.shortfall = left;
    plan
}
