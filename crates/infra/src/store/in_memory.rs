//! In-memory ledger store for tests and local runs.
//!
//! Writers are serialized by one async mutex held for the life of a
//! transaction. A tx works on a private copy of the committed state and swaps
//! it in on commit, so an abandoned tx leaves nothing behind. Readers take the
//! last committed state and never wait for a writer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use lotledger_core::{
    AllocationId, LotId, OrderId, OrderItemId, PickId, ProductId, ProductionRunId,
};
use lotledger_inventory::{InventoryLot, LotStatus};
use lotledger_orders::{Order, OrderAllocation, OrderItem, OrderPick, committed_quantity};
use lotledger_production::ProductionRun;
use lotledger_products::Product;

use super::{LedgerRead, LedgerStore, LedgerTx, StoreError};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    products: HashMap<ProductId, Product>,
    lots: HashMap<LotId, InventoryLot>,
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderItemId, OrderItem>,
    allocations: HashMap<AllocationId, OrderAllocation>,
    picks: HashMap<PickId, OrderPick>,
    runs: HashMap<ProductionRunId, ProductionRun>,
    lot_sequence: u64,
}

impl LedgerState {
    fn product_by_sku(&self, sku: &str) -> Option<Product> {
        self.products.values().find(|p| p.sku == sku).cloned()
    }

    fn lots_for_product(&self, product_id: ProductId) -> Vec<InventoryLot> {
        let mut lots: Vec<InventoryLot> = self
            .lots
            .values()
            .filter(|l| l.product_id == product_id)
            .cloned()
            .collect();
        lots.sort_by(|a, b| (a.created_at, &a.lot_number).cmp(&(b.created_at, &b.lot_number)));
        lots
    }

    fn order_items(&self, order_id: OrderId) -> Vec<OrderItem> {
        let mut items: Vec<OrderItem> = self
            .items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.line_no);
        items
    }

    fn allocations_for_item(&self, item_id: OrderItemId) -> Vec<OrderAllocation> {
        let mut allocations: Vec<OrderAllocation> = self
            .allocations
            .values()
            .filter(|a| a.order_item_id == item_id)
            .cloned()
            .collect();
        allocations.sort_by_key(|a| (a.allocated_at, a.id));
        allocations
    }

    fn picks_for_order(&self, order_id: OrderId) -> Vec<OrderPick> {
        let mut picks: Vec<OrderPick> = self
            .picks
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        picks.sort_by_key(|p| (p.picked_at, p.id));
        picks
    }

    fn committed_quantity(&self, lot_id: LotId) -> i64 {
        committed_quantity(lot_id, self.picks.values(), |order_id| {
            self.orders.get(&order_id).map(Order::status)
        })
    }

    fn runs_for_lot(&self, lot_id: LotId) -> Vec<ProductionRun> {
        let mut runs: Vec<ProductionRun> = self
            .runs
            .values()
            .filter(|r| r.touches(lot_id))
            .cloned()
            .collect();
        runs.sort_by_key(|r| (r.created_at, r.id));
        runs
    }

    fn expiring_lots(&self, as_of: NaiveDate) -> Vec<InventoryLot> {
        let mut lots: Vec<InventoryLot> = self
            .lots
            .values()
            .filter(|l| {
                l.is_expired_on(as_of)
                    && l.quantity_current() > 0
                    && !matches!(l.status(), LotStatus::Expired | LotStatus::Depleted)
            })
            .cloned()
            .collect();
        lots.sort_by_key(|l| (l.expires_on, l.created_at));
        lots
    }
}

/// Implements `LedgerRead` for a type exposing `fn state(&self) -> &LedgerState`.
macro_rules! impl_memory_read {
    ($ty:ty) => {
        #[async_trait]
        impl LedgerRead for $ty {
            async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
                Ok(self.state().products.get(&id).cloned())
            }

            async fn product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError> {
                Ok(self.state().product_by_sku(sku))
            }

            async fn lot(&mut self, id: LotId) -> Result<Option<InventoryLot>, StoreError> {
                Ok(self.state().lots.get(&id).cloned())
            }

            async fn lots_for_product(
                &mut self,
                product_id: ProductId,
            ) -> Result<Vec<InventoryLot>, StoreError> {
                Ok(self.state().lots_for_product(product_id))
            }

            async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
                Ok(self.state().orders.get(&id).cloned())
            }

            async fn order_item(
                &mut self,
                id: OrderItemId,
            ) -> Result<Option<OrderItem>, StoreError> {
                Ok(self.state().items.get(&id).cloned())
            }

            async fn order_items(
                &mut self,
                order_id: OrderId,
            ) -> Result<Vec<OrderItem>, StoreError> {
                Ok(self.state().order_items(order_id))
            }

            async fn allocations_for_item(
                &mut self,
                item_id: OrderItemId,
            ) -> Result<Vec<OrderAllocation>, StoreError> {
                Ok(self.state().allocations_for_item(item_id))
            }

            async fn pick(&mut self, id: PickId) -> Result<Option<OrderPick>, StoreError> {
                Ok(self.state().picks.get(&id).cloned())
            }

            async fn picks_for_order(
                &mut self,
                order_id: OrderId,
            ) -> Result<Vec<OrderPick>, StoreError> {
                Ok(self.state().picks_for_order(order_id))
            }

            async fn committed_quantity(&mut self, lot_id: LotId) -> Result<i64, StoreError> {
                Ok(self.state().committed_quantity(lot_id))
            }

            async fn runs_for_lot(
                &mut self,
                lot_id: LotId,
            ) -> Result<Vec<ProductionRun>, StoreError> {
                Ok(self.state().runs_for_lot(lot_id))
            }
        }
    };
}

type Committed = Arc<RwLock<Arc<LedgerState>>>;

/// In-memory `LedgerStore`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    committed: Committed,
    writer: Arc<Mutex<()>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&self) -> Result<Arc<LedgerState>, StoreError> {
        let guard = self.committed.read().map_err(|_| StoreError::Poisoned)?;
        Ok(Arc::clone(&guard))
    }
}

/// Transaction over a private copy of the committed state.
#[derive(Debug)]
pub struct InMemoryTx {
    state: LedgerState,
    committed: Committed,
    _writer: OwnedMutexGuard<()>,
}

impl InMemoryTx {
    fn state(&self) -> &LedgerState {
        &self.state
    }
}

/// Point-in-time view of the last committed state.
#[derive(Debug, Clone)]
pub struct InMemoryReader {
    state: Arc<LedgerState>,
}

impl InMemoryReader {
    fn state(&self) -> &LedgerState {
        &self.state
    }
}

impl_memory_read!(InMemoryTx);
impl_memory_read!(InMemoryReader);

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn lot_for_update(&mut self, id: LotId) -> Result<Option<InventoryLot>, StoreError> {
        // The writer mutex already excludes every other tx.
        Ok(self.state.lots.get(&id).cloned())
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.orders.get(&id).cloned())
    }

    async fn expiring_lots_for_update(
        &mut self,
        as_of: NaiveDate,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        Ok(self.state.expiring_lots(as_of))
    }

    async fn next_lot_sequence(&mut self) -> Result<u64, StoreError> {
        self.state.lot_sequence += 1;
        Ok(self.state.lot_sequence)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        if self.state.product_by_sku(&product.sku).is_some() {
            return Err(StoreError::Conflict(format!(
                "sku {} already exists",
                product.sku
            )));
        }
        self.state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        match self.state.products.get_mut(&product.id) {
            Some(slot) => {
                *slot = product.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "update of missing product {}",
                product.id
            ))),
        }
    }

    async fn insert_lot(&mut self, lot: &InventoryLot) -> Result<(), StoreError> {
        if self
            .state
            .lots
            .values()
            .any(|l| l.lot_number == lot.lot_number)
        {
            return Err(StoreError::Conflict(format!(
                "lot number {} already exists",
                lot.lot_number
            )));
        }
        self.state.lots.insert(lot.id, lot.clone());
        Ok(())
    }

    async fn update_lot(&mut self, lot: &InventoryLot) -> Result<(), StoreError> {
        match self.state.lots.get_mut(&lot.id) {
            Some(slot) => {
                *slot = lot.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!("update of missing lot {}", lot.id))),
        }
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        match self.state.orders.get_mut(&order.id) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "update of missing order {}",
                order.id
            ))),
        }
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        self.state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn insert_allocation(&mut self, allocation: &OrderAllocation) -> Result<(), StoreError> {
        self.state
            .allocations
            .insert(allocation.id, allocation.clone());
        Ok(())
    }

    async fn insert_pick(&mut self, pick: &OrderPick) -> Result<(), StoreError> {
        self.state.picks.insert(pick.id, pick.clone());
        Ok(())
    }

    async fn delete_pick(&mut self, id: PickId) -> Result<(), StoreError> {
        self.state.picks.remove(&id);
        Ok(())
    }

    async fn insert_run(&mut self, run: &ProductionRun) -> Result<(), StoreError> {
        self.state.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut guard = self.committed.write().map_err(|_| StoreError::Poisoned)?;
        *guard = Arc::new(self.state);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryTx;
    type Reader = InMemoryReader;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        let state = LedgerState::clone(&*self.load()?);
        Ok(InMemoryTx {
            state,
            committed: Arc::clone(&self.committed),
            _writer: writer,
        })
    }

    async fn reader(&self) -> Result<InMemoryReader, StoreError> {
        Ok(InMemoryReader { state: self.load()? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lotledger_inventory::NewLot;

    fn lot(number: &str) -> InventoryLot {
        let day = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        InventoryLot::receive(NewLot {
            id: LotId::new(),
            lot_number: number.to_string(),
            product_id: ProductId::new(),
            parent_lot_id: None,
            quantity: 10,
            received_on: day,
            expires_on: day,
            origin_country: None,
            grower_id: None,
            created_at: Utc::now(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn dropped_tx_leaves_no_trace() {
        let store = InMemoryLedgerStore::new();
        let l = lot("L000001");
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_lot(&l).await.unwrap();
            assert_eq!(tx.next_lot_sequence().await.unwrap(), 1);
        }

        let mut reader = store.reader().await.unwrap();
        assert!(reader.lot(l.id).await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.next_lot_sequence().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn committed_tx_is_visible_to_new_readers_only() {
        let store = InMemoryLedgerStore::new();
        let before = store.reader().await.unwrap();
        let l = lot("L000001");

        let mut tx = store.begin().await.unwrap();
        tx.insert_lot(&l).await.unwrap();
        tx.commit().await.unwrap();

        let mut stale = before;
        assert!(stale.lot(l.id).await.unwrap().is_none());
        let mut fresh = store.reader().await.unwrap();
        assert_eq!(fresh.lot(l.id).await.unwrap(), Some(l));
    }

    #[tokio::test]
    async fn begin_copies_the_latest_commit() {
        let store = InMemoryLedgerStore::new();
        let l = lot("L000003");
        let mut tx = store.begin().await.unwrap();
        tx.insert_lot(&l).await.unwrap();
        tx.commit().await.unwrap();

        let mut next = store.begin().await.unwrap();
        assert_eq!(next.lot(l.id).await.unwrap(), Some(l.clone()));
        let err = next.insert_lot(&l).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_lot_number_conflicts() {
        let store = InMemoryLedgerStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_lot(&lot("L000007")).await.unwrap();
        let err = tx.insert_lot(&lot("L000007")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
