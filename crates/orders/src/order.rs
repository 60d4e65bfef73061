use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotledger_core::{
    AllocationId, CustomerId, DomainError, Entity, EntityKind, LotId, OrderId, OrderItemId, PickId,
    ProductId, UserId,
};
use lotledger_events::Event;

use crate::state::{self, OrderProgress};

/// Order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Confirmed,
    Picking,
    PartialPick,
    ReadyToShip,
    Shipped,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Draft,
        OrderStatus::Confirmed,
        OrderStatus::Picking,
        OrderStatus::PartialPick,
        OrderStatus::ReadyToShip,
        OrderStatus::Shipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Picking => "PICKING",
            OrderStatus::PartialPick => "PARTIAL_PICK",
            OrderStatus::ReadyToShip => "READY_TO_SHIP",
            OrderStatus::Shipped => "SHIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Position along the forward lifecycle.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Draft => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Picking => 2,
            OrderStatus::PartialPick => 3,
            OrderStatus::ReadyToShip => 4,
            OrderStatus::Shipped => 5,
        }
    }

    /// Statuses in which a pick may be submitted.
    pub fn accepts_picks(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed
                | OrderStatus::Picking
                | OrderStatus::PartialPick
                | OrderStatus::ReadyToShip
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `from -> to` pair produced by a status recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl StatusTransition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Customer order header. Items, allocations and picks are separate records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub delivery_date: NaiveDate,
    pub po_number: Option<String>,
    status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn place(
        id: OrderId,
        customer_id: CustomerId,
        delivery_date: NaiveDate,
        po_number: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let po_number = po_number
            .map(|po| po.trim().to_string())
            .filter(|po| !po.is_empty());
        Self {
            id,
            customer_id,
            delivery_date,
            po_number,
            status: OrderStatus::Draft,
            created_at,
            shipped_at: None,
        }
    }

    pub fn from_storage(
        id: OrderId,
        customer_id: CustomerId,
        delivery_date: NaiveDate,
        po_number: Option<String>,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        shipped_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            customer_id,
            delivery_date,
            po_number,
            status,
            created_at,
            shipped_at,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// External `DRAFT -> CONFIRMED` step.
    pub fn confirm(&mut self, item_count: usize) -> Result<StatusTransition, DomainError> {
        if self.status != OrderStatus::Draft {
            return Err(DomainError::invalid_order_state(self.status, "confirm"));
        }
        if item_count == 0 {
            return Err(DomainError::validation("cannot confirm an order without items"));
        }
        Ok(self.move_to(OrderStatus::Confirmed))
    }

    pub fn ensure_pickable(&self) -> Result<(), DomainError> {
        if self.status.accepts_picks() {
            Ok(())
        } else {
            Err(DomainError::invalid_order_state(self.status, "pick against"))
        }
    }

    pub fn ensure_revertible(&self) -> Result<(), DomainError> {
        match self.status {
            OrderStatus::Shipped | OrderStatus::Draft => Err(DomainError::invalid_order_state(
                self.status,
                "revert a pick on",
            )),
            _ => Ok(()),
        }
    }

    /// Recompute status after a pick was recorded.
    ///
    /// `progress` already includes the new pick; `picks_before` is the number
    /// of picks the order had before it.
    pub fn apply_pick(&mut self, progress: &OrderProgress, picks_before: usize) -> StatusTransition {
        let next = state::next_status_after_pick(self.status, progress, picks_before);
        self.move_to(next)
    }

    /// Recompute status after a pick was removed.
    ///
    /// `restore` is the status the order had before the reverted pick, when
    /// that pick was the most recent one on the order.
    pub fn apply_revert(
        &mut self,
        progress: &OrderProgress,
        restore: Option<OrderStatus>,
    ) -> Result<StatusTransition, DomainError> {
        self.ensure_revertible()?;
        let next = state::next_status_after_revert(self.status, progress, restore);
        Ok(self.move_to(next))
    }

    /// Terminal `READY_TO_SHIP -> SHIPPED`. Pick completeness is re-validated
    /// from `progress`, not trusted from the stored status.
    pub fn ship(
        &mut self,
        progress: &OrderProgress,
        at: DateTime<Utc>,
    ) -> Result<StatusTransition, DomainError> {
        if self.status != OrderStatus::ReadyToShip {
            return Err(DomainError::invalid_order_state(self.status, "finalize"));
        }
        if progress.is_empty() {
            return Err(DomainError::validation("order has no items"));
        }
        if !progress.all_fully_picked() {
            return Err(DomainError::invalid_order_state(
                self.status,
                "finalize (items not fully picked)",
            ));
        }
        self.shipped_at = Some(at);
        Ok(self.move_to(OrderStatus::Shipped))
    }

    fn move_to(&mut self, next: OrderStatus) -> StatusTransition {
        let from = self.status;
        self.status = next;
        StatusTransition { from, to: next }
    }
}

impl Entity for Order {
    type Id = OrderId;
    const KIND: EntityKind = EntityKind::Order;

    fn id(&self) -> OrderId {
        self.id
    }
}

/// Requested line when placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// One product line on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
}

impl OrderItem {
    pub fn new(
        id: OrderItemId,
        order_id: OrderId,
        line_no: u32,
        line: &NewOrderLine,
    ) -> Result<Self, DomainError> {
        if line.quantity <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "line {line_no}: ordered quantity must be positive (got {})",
                line.quantity
            )));
        }
        Ok(Self {
            id,
            order_id,
            line_no,
            product_id: line.product_id,
            quantity_ordered: line.quantity,
        })
    }
}

impl Entity for OrderItem {
    type Id = OrderItemId;
    const KIND: EntityKind = EntityKind::OrderItem;

    fn id(&self) -> OrderItemId {
        self.id
    }
}

/// Soft reservation of a lot for an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAllocation {
    pub id: AllocationId,
    pub order_item_id: OrderItemId,
    pub lot_id: LotId,
    pub allocated_by: UserId,
    pub allocated_at: DateTime<Utc>,
}

impl Entity for OrderAllocation {
    type Id = AllocationId;
    const KIND: EntityKind = EntityKind::Allocation;

    fn id(&self) -> AllocationId {
        self.id
    }
}

/// Committed consumption: this line took this quantity from this lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPick {
    pub id: PickId,
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub lot_id: LotId,
    pub quantity: i64,
    pub picked_by: UserId,
    pub picked_at: DateTime<Utc>,
    /// Order status just before this pick was applied.
    pub order_status_before: OrderStatus,
}

impl Entity for OrderPick {
    type Id = PickId;
    const KIND: EntityKind = EntityKind::Pick;

    fn id(&self) -> PickId {
        self.id
    }
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub po_number: Option<String>,
    pub delivery_date: NaiveDate,
    pub lines: Vec<NewOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotAllocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAllocated {
    pub allocation_id: AllocationId,
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub lot_id: LotId,
    pub lot_number: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickSubmitted {
    pub pick_id: PickId,
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub customer_id: CustomerId,
    pub po_number: Option<String>,
    pub product_id: ProductId,
    pub lot_id: LotId,
    pub lot_number: String,
    pub quantity: i64,
    pub status_from: OrderStatus,
    pub status_to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickReverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickReverted {
    pub pick_id: PickId,
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub customer_id: CustomerId,
    pub po_number: Option<String>,
    pub product_id: ProductId,
    pub lot_id: LotId,
    pub lot_number: String,
    pub quantity: i64,
    pub status_from: OrderStatus,
    pub status_to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub po_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderConfirmed(OrderConfirmed),
    LotAllocated(LotAllocated),
    PickSubmitted(PickSubmitted),
    PickReverted(PickReverted),
    OrderShipped(OrderShipped),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderConfirmed(_) => "orders.order.confirmed",
            OrderEvent::LotAllocated(_) => "orders.item.lot_allocated",
            OrderEvent::PickSubmitted(_) => "orders.pick.submitted",
            OrderEvent::PickReverted(_) => "orders.pick.reverted",
            OrderEvent::OrderShipped(_) => "orders.order.shipped",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderConfirmed(e) => e.occurred_at,
            OrderEvent::LotAllocated(e) => e.occurred_at,
            OrderEvent::PickSubmitted(e) => e.occurred_at,
            OrderEvent::PickReverted(e) => e.occurred_at,
            OrderEvent::OrderShipped(e) => e.occurred_at,
        }
    }

    fn subject(&self) -> (EntityKind, String) {
        match self {
            OrderEvent::OrderPlaced(e) => (EntityKind::Order, e.order_id.to_string()),
            OrderEvent::OrderConfirmed(e) => (EntityKind::Order, e.order_id.to_string()),
            OrderEvent::LotAllocated(e) => (EntityKind::Allocation, e.allocation_id.to_string()),
            OrderEvent::PickSubmitted(e) => (EntityKind::Pick, e.pick_id.to_string()),
            OrderEvent::PickReverted(e) => (EntityKind::Pick, e.pick_id.to_string()),
            OrderEvent::OrderShipped(e) => (EntityKind::Order, e.order_id.to_string()),
        }
    }
}
