//! Transactional persistence boundary for the ledger.
//!
//! Every mutating ledger operation runs inside one `LedgerTx`: it reads, locks
//! and writes through the tx and publishes everything with `commit()`.
//! Dropping a tx without committing discards all of its writes.
//!
//! Read-only queries use `LedgerStore::reader()`, which never blocks writers
//! and may lag behind in-flight transactions.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use lotledger_core::{LotId, OrderId, OrderItemId, PickId, ProductId};
use lotledger_inventory::InventoryLot;
use lotledger_orders::{Order, OrderAllocation, OrderItem, OrderPick};
use lotledger_production::ProductionRun;
use lotledger_products::Product;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Storage failure. Unlike domain rejections these may succeed on retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Serialization failure, deadlock or uniqueness race.
    #[error("conflicting concurrent write: {0}")]
    Conflict(String),

    #[error("store lock poisoned")]
    Poisoned,

    /// A persisted row could not be mapped back to a domain record.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Reads shared by transactions and snapshot readers.
#[async_trait]
pub trait LedgerRead: Send {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError>;

    async fn lot(&mut self, id: LotId) -> Result<Option<InventoryLot>, StoreError>;

    /// All lots of a product in creation order.
    async fn lots_for_product(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryLot>, StoreError>;

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn order_item(&mut self, id: OrderItemId) -> Result<Option<OrderItem>, StoreError>;

    /// Items of an order by line number.
    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    async fn allocations_for_item(
        &mut self,
        item_id: OrderItemId,
    ) -> Result<Vec<OrderAllocation>, StoreError>;

    async fn pick(&mut self, id: PickId) -> Result<Option<OrderPick>, StoreError>;

    /// Picks of an order, oldest first.
    async fn picks_for_order(&mut self, order_id: OrderId) -> Result<Vec<OrderPick>, StoreError>;

    /// Sum of pick quantities on `lot_id` whose order has not shipped.
    async fn committed_quantity(&mut self, lot_id: LotId) -> Result<i64, StoreError>;

    /// Runs where the lot is the source or the destination, oldest first.
    async fn runs_for_lot(&mut self, lot_id: LotId) -> Result<Vec<ProductionRun>, StoreError>;
}

/// One atomic unit of ledger work.
#[async_trait]
pub trait LedgerTx: LedgerRead {
    /// Read a lot and hold its row lock until the tx ends.
    async fn lot_for_update(&mut self, id: LotId) -> Result<Option<InventoryLot>, StoreError>;

    /// Read an order and hold its row lock until the tx ends.
    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Lock every lot with stock, not yet expired or depleted, whose expiry
    /// date is before `as_of`.
    async fn expiring_lots_for_update(
        &mut self,
        as_of: NaiveDate,
    ) -> Result<Vec<InventoryLot>, StoreError>;

    /// Advance the lot-number counter and return the new value.
    async fn next_lot_sequence(&mut self) -> Result<u64, StoreError>;

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError>;

    async fn insert_lot(&mut self, lot: &InventoryLot) -> Result<(), StoreError>;

    /// Persist `quantity_current` and `status`.
    async fn update_lot(&mut self, lot: &InventoryLot) -> Result<(), StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Persist `status` and `shipped_at`.
    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError>;

    async fn insert_allocation(&mut self, allocation: &OrderAllocation) -> Result<(), StoreError>;

    async fn insert_pick(&mut self, pick: &OrderPick) -> Result<(), StoreError>;

    async fn delete_pick(&mut self, id: PickId) -> Result<(), StoreError>;

    async fn insert_run(&mut self, run: &ProductionRun) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

/// Entry point for ledger persistence.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;
    type Reader: LedgerRead;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn reader(&self) -> Result<Self::Reader, StoreError>;
}
