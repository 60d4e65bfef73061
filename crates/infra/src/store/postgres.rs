//! Postgres-backed ledger store.
//!
//! Row locks (`SELECT ... FOR UPDATE`) on `inventory_lots` and `orders`
//! serialize the check-then-decrement of concurrent picks and conversions on
//! the same lot. The lot-number counter is a single row in `lot_sequence`,
//! incremented inside the caller's transaction.
//!
//! ## Error mapping
//!
//! | SQLSTATE | StoreError |
//! |----------|------------|
//! | `23505` unique violation | `Conflict` |
//! | `40001` serialization failure | `Conflict` |
//! | `40P01` deadlock detected | `Conflict` |
//! | other | `Backend` |
//!
//! Rows that cannot be decoded into domain records map to `Corrupt`.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use lotledger_core::{
    AllocationId, CustomerId, LotId, OrderId, OrderItemId, PickId, ProductId, ProductionRunId,
    UserId,
};
use lotledger_inventory::{InventoryLot, LotStatus};
use lotledger_orders::{Order, OrderAllocation, OrderItem, OrderPick, OrderStatus};
use lotledger_production::ProductionRun;
use lotledger_products::{Gtin, Product, UnitType};

use super::{LedgerRead, LedgerStore, LedgerTx, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_lot_ledger.sql");

const PRODUCT_COLUMNS: &str = "id, sku, name, unit_type, case_weight, gtin, created_at";
const LOT_COLUMNS: &str = "id, lot_number, product_id, parent_lot_id, quantity_original, \
     quantity_received, quantity_current, received_on, expires_on, origin_country, grower_id, \
     status, created_at";
const ORDER_COLUMNS: &str =
    "id, customer_id, delivery_date, po_number, status, created_at, shipped_at";
const ITEM_COLUMNS: &str = "id, order_id, line_no, product_id, quantity_ordered";
const ALLOCATION_COLUMNS: &str = "id, order_item_id, lot_id, allocated_by, allocated_at";
const PICK_COLUMNS: &str =
    "id, order_id, order_item_id, lot_id, quantity, picked_by, picked_at, order_status_before";
const RUN_COLUMNS: &str = "id, source_lot_id, destination_lot_id, quantity_consumed, \
     quantity_produced, produced_by, notes, created_at";

/// Postgres `LedgerStore`.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the ledger tables if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Open Postgres transaction. Rolled back by sqlx when dropped uncommitted.
#[derive(Debug)]
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerTx {
    fn executor(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }
}

/// Pool-backed reader. Each query sees the latest committed data.
#[derive(Debug, Clone)]
pub struct PgLedgerReader {
    pool: PgPool,
}

impl PgLedgerReader {
    fn executor(&mut self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;
    type Reader = PgLedgerReader;

    async fn begin(&self) -> Result<PgLedgerTx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PgLedgerTx { tx })
    }

    async fn reader(&self) -> Result<PgLedgerReader, StoreError> {
        Ok(PgLedgerReader {
            pool: self.pool.clone(),
        })
    }
}

/// Implements `LedgerRead` for a type exposing `fn executor(&mut self)`.
macro_rules! impl_pg_read {
    ($ty:ty) => {
        #[async_trait]
        impl LedgerRead for $ty {
            async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
                fetch_product(self.executor(), id).await
            }

            async fn product_by_sku(&mut self, sku: &str) -> Result<Option<Product>, StoreError> {
                fetch_product_by_sku(self.executor(), sku).await
            }

            async fn lot(&mut self, id: LotId) -> Result<Option<InventoryLot>, StoreError> {
                fetch_lot(self.executor(), id, false).await
            }

            async fn lots_for_product(
                &mut self,
                product_id: ProductId,
            ) -> Result<Vec<InventoryLot>, StoreError> {
                fetch_lots_for_product(self.executor(), product_id).await
            }

            async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
                fetch_order(self.executor(), id, false).await
            }

            async fn order_item(
                &mut self,
                id: OrderItemId,
            ) -> Result<Option<OrderItem>, StoreError> {
                fetch_order_item(self.executor(), id).await
            }

            async fn order_items(
                &mut self,
                order_id: OrderId,
            ) -> Result<Vec<OrderItem>, StoreError> {
                fetch_order_items(self.executor(), order_id).await
            }

            async fn allocations_for_item(
                &mut self,
                item_id: OrderItemId,
            ) -> Result<Vec<OrderAllocation>, StoreError> {
                fetch_allocations(self.executor(), item_id).await
            }

            async fn pick(&mut self, id: PickId) -> Result<Option<OrderPick>, StoreError> {
                fetch_pick(self.executor(), id).await
            }

            async fn picks_for_order(
                &mut self,
                order_id: OrderId,
            ) -> Result<Vec<OrderPick>, StoreError> {
                fetch_picks_for_order(self.executor(), order_id).await
            }

            async fn committed_quantity(&mut self, lot_id: LotId) -> Result<i64, StoreError> {
                fetch_committed_quantity(self.executor(), lot_id).await
            }

            async fn runs_for_lot(
                &mut self,
                lot_id: LotId,
            ) -> Result<Vec<ProductionRun>, StoreError> {
                fetch_runs_for_lot(self.executor(), lot_id).await
            }
        }
    };
}

impl_pg_read!(PgLedgerTx);
impl_pg_read!(PgLedgerReader);

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lot_for_update(&mut self, id: LotId) -> Result<Option<InventoryLot>, StoreError> {
        fetch_lot(self.executor(), id, true).await
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        fetch_order(self.executor(), id, true).await
    }

    async fn expiring_lots_for_update(
        &mut self,
        as_of: NaiveDate,
    ) -> Result<Vec<InventoryLot>, StoreError> {
        let sql = format!(
            "SELECT {LOT_COLUMNS} FROM inventory_lots \
             WHERE expires_on < $1 AND quantity_current > 0 \
               AND status NOT IN ('EXPIRED', 'DEPLETED') \
             ORDER BY expires_on, created_at \
             FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(as_of)
            .fetch_all(self.executor())
            .await
            .map_err(|e| map_sqlx_error("expiring_lots_for_update", e))?;
        rows.iter().map(lot_from_row).collect()
    }

    async fn next_lot_sequence(&mut self) -> Result<u64, StoreError> {
        let row = sqlx::query("UPDATE lot_sequence SET value = value + 1 WHERE id = 1 RETURNING value")
            .fetch_one(self.executor())
            .await
            .map_err(|e| map_sqlx_error("next_lot_sequence", e))?;
        let value: i64 = column(&row, "value")?;
        u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("lot sequence {value}")))
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, unit_type, case_weight, gtin, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.unit_type.as_str())
        .bind(product.case_weight)
        .bind(product.gtin.as_ref().map(Gtin::as_str))
        .bind(product.created_at)
        .execute(self.executor())
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        sqlx::query("UPDATE products SET name = $2, case_weight = $3, gtin = $4 WHERE id = $1")
            .bind(product.id.as_uuid())
            .bind(&product.name)
            .bind(product.case_weight)
            .bind(product.gtin.as_ref().map(Gtin::as_str))
            .execute(self.executor())
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?;
        Ok(())
    }

    async fn insert_lot(&mut self, lot: &InventoryLot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_lots (
                id, lot_number, product_id, parent_lot_id,
                quantity_original, quantity_received, quantity_current,
                received_on, expires_on, origin_country, grower_id, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(lot.id.as_uuid())
        .bind(&lot.lot_number)
        .bind(lot.product_id.as_uuid())
        .bind(lot.parent_lot_id.map(|id| *id.as_uuid()))
        .bind(lot.quantity_original)
        .bind(lot.quantity_received)
        .bind(lot.quantity_current())
        .bind(lot.received_on)
        .bind(lot.expires_on)
        .bind(&lot.origin_country)
        .bind(&lot.grower_id)
        .bind(lot.status().as_str())
        .bind(lot.created_at)
        .execute(self.executor())
        .await
        .map_err(|e| map_sqlx_error("insert_lot", e))?;
        Ok(())
    }

    async fn update_lot(&mut self, lot: &InventoryLot) -> Result<(), StoreError> {
        sqlx::query("UPDATE inventory_lots SET quantity_current = $2, status = $3 WHERE id = $1")
            .bind(lot.id.as_uuid())
            .bind(lot.quantity_current())
            .bind(lot.status().as_str())
            .execute(self.executor())
            .await
            .map_err(|e| map_sqlx_error("update_lot", e))?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, delivery_date, po_number, status, created_at, shipped_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.delivery_date)
        .bind(&order.po_number)
        .bind(order.status().as_str())
        .bind(order.created_at)
        .bind(order.shipped_at)
        .execute(self.executor())
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET status = $2, shipped_at = $3 WHERE id = $1")
            .bind(order.id.as_uuid())
            .bind(order.status().as_str())
            .bind(order.shipped_at)
            .execute(self.executor())
            .await
            .map_err(|e| map_sqlx_error("update_order", e))?;
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        let line_no = i32::try_from(item.line_no)
            .map_err(|_| StoreError::Backend(format!("line number {} out of range", item.line_no)))?;
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, line_no, product_id, quantity_ordered)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.order_id.as_uuid())
        .bind(line_no)
        .bind(item.product_id.as_uuid())
        .bind(item.quantity_ordered)
        .execute(self.executor())
        .await
        .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        Ok(())
    }

    async fn insert_allocation(&mut self, allocation: &OrderAllocation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO order_allocations (id, order_item_id, lot_id, allocated_by, allocated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(allocation.id.as_uuid())
        .bind(allocation.order_item_id.as_uuid())
        .bind(allocation.lot_id.as_uuid())
        .bind(allocation.allocated_by.as_uuid())
        .bind(allocation.allocated_at)
        .execute(self.executor())
        .await
        .map_err(|e| map_sqlx_error("insert_allocation", e))?;
        Ok(())
    }

    async fn insert_pick(&mut self, pick: &OrderPick) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO order_picks (
                id, order_id, order_item_id, lot_id, quantity, picked_by, picked_at,
                order_status_before
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(pick.id.as_uuid())
        .bind(pick.order_id.as_uuid())
        .bind(pick.order_item_id.as_uuid())
        .bind(pick.lot_id.as_uuid())
        .bind(pick.quantity)
        .bind(pick.picked_by.as_uuid())
        .bind(pick.picked_at)
        .bind(pick.order_status_before.as_str())
        .execute(self.executor())
        .await
        .map_err(|e| map_sqlx_error("insert_pick", e))?;
        Ok(())
    }

    async fn delete_pick(&mut self, id: PickId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM order_picks WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.executor())
            .await
            .map_err(|e| map_sqlx_error("delete_pick", e))?;
        Ok(())
    }

    async fn insert_run(&mut self, run: &ProductionRun) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO production_runs (
                id, source_lot_id, destination_lot_id, quantity_consumed, quantity_produced,
                produced_by, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(run.id.as_uuid())
        .bind(run.source_lot_id.as_uuid())
        .bind(run.destination_lot_id.as_uuid())
        .bind(run.quantity_consumed)
        .bind(run.quantity_produced)
        .bind(run.produced_by.as_uuid())
        .bind(&run.notes)
        .bind(run.created_at)
        .execute(self.executor())
        .await
        .map_err(|e| map_sqlx_error("insert_run", e))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

async fn fetch_product<'e, E>(ex: E, id: ProductId) -> Result<Option<Product>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_product", e))?;
    row.as_ref().map(product_from_row).transpose()
}

async fn fetch_product_by_sku<'e, E>(ex: E, sku: &str) -> Result<Option<Product>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1");
    let row = sqlx::query(&sql)
        .bind(sku)
        .fetch_optional(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_product_by_sku", e))?;
    row.as_ref().map(product_from_row).transpose()
}

async fn fetch_lot<'e, E>(ex: E, id: LotId, lock: bool) -> Result<Option<InventoryLot>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {LOT_COLUMNS} FROM inventory_lots WHERE id = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_lot", e))?;
    row.as_ref().map(lot_from_row).transpose()
}

async fn fetch_lots_for_product<'e, E>(
    ex: E,
    product_id: ProductId,
) -> Result<Vec<InventoryLot>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {LOT_COLUMNS} FROM inventory_lots WHERE product_id = $1 \
         ORDER BY created_at, lot_number"
    );
    let rows = sqlx::query(&sql)
        .bind(product_id.as_uuid())
        .fetch_all(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_lots_for_product", e))?;
    rows.iter().map(lot_from_row).collect()
}

async fn fetch_order<'e, E>(ex: E, id: OrderId, lock: bool) -> Result<Option<Order>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_order", e))?;
    row.as_ref().map(order_from_row).transpose()
}

async fn fetch_order_item<'e, E>(ex: E, id: OrderItemId) -> Result<Option<OrderItem>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_order_item", e))?;
    row.as_ref().map(item_from_row).transpose()
}

async fn fetch_order_items<'e, E>(ex: E, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY line_no");
    let rows = sqlx::query(&sql)
        .bind(order_id.as_uuid())
        .fetch_all(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_order_items", e))?;
    rows.iter().map(item_from_row).collect()
}

async fn fetch_allocations<'e, E>(
    ex: E,
    item_id: OrderItemId,
) -> Result<Vec<OrderAllocation>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {ALLOCATION_COLUMNS} FROM order_allocations WHERE order_item_id = $1 \
         ORDER BY allocated_at, id"
    );
    let rows = sqlx::query(&sql)
        .bind(item_id.as_uuid())
        .fetch_all(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_allocations", e))?;
    rows.iter().map(allocation_from_row).collect()
}

async fn fetch_pick<'e, E>(ex: E, id: PickId) -> Result<Option<OrderPick>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT {PICK_COLUMNS} FROM order_picks WHERE id = $1");
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_pick", e))?;
    row.as_ref().map(pick_from_row).transpose()
}

async fn fetch_picks_for_order<'e, E>(ex: E, order_id: OrderId) -> Result<Vec<OrderPick>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {PICK_COLUMNS} FROM order_picks WHERE order_id = $1 ORDER BY picked_at, id"
    );
    let rows = sqlx::query(&sql)
        .bind(order_id.as_uuid())
        .fetch_all(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_picks_for_order", e))?;
    rows.iter().map(pick_from_row).collect()
}

async fn fetch_committed_quantity<'e, E>(ex: E, lot_id: LotId) -> Result<i64, StoreError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(p.quantity), 0)::BIGINT AS committed
        FROM order_picks p
        JOIN orders o ON o.id = p.order_id
        WHERE p.lot_id = $1 AND o.status <> 'SHIPPED'
        "#,
    )
    .bind(lot_id.as_uuid())
    .fetch_one(ex)
    .await
    .map_err(|e| map_sqlx_error("fetch_committed_quantity", e))?;
    column(&row, "committed")
}

async fn fetch_runs_for_lot<'e, E>(ex: E, lot_id: LotId) -> Result<Vec<ProductionRun>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM production_runs \
         WHERE source_lot_id = $1 OR destination_lot_id = $1 \
         ORDER BY created_at, id"
    );
    let rows = sqlx::query(&sql)
        .bind(lot_id.as_uuid())
        .fetch_all(ex)
        .await
        .map_err(|e| map_sqlx_error("fetch_runs_for_lot", e))?;
    rows.iter().map(run_from_row).collect()
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let unit: String = column(row, "unit_type")?;
    let unit_type = UnitType::parse(&unit)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown unit type {unit}")))?;
    let gtin = column::<Option<String>>(row, "gtin")?
        .map(|raw| Gtin::parse(&raw))
        .transpose()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(Product {
        id: ProductId::from_uuid(column(row, "id")?),
        sku: column(row, "sku")?,
        name: column(row, "name")?,
        unit_type,
        case_weight: column(row, "case_weight")?,
        gtin,
        created_at: column(row, "created_at")?,
    })
}

fn lot_from_row(row: &PgRow) -> Result<InventoryLot, StoreError> {
    let status: String = column(row, "status")?;
    let status = LotStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown lot status {status}")))?;
    let parent: Option<uuid::Uuid> = column(row, "parent_lot_id")?;

    Ok(InventoryLot::from_storage(
        LotId::from_uuid(column(row, "id")?),
        column(row, "lot_number")?,
        ProductId::from_uuid(column(row, "product_id")?),
        parent.map(LotId::from_uuid),
        column(row, "quantity_original")?,
        column(row, "quantity_received")?,
        column(row, "quantity_current")?,
        column(row, "received_on")?,
        column(row, "expires_on")?,
        column(row, "origin_country")?,
        column(row, "grower_id")?,
        status,
        column(row, "created_at")?,
    ))
}

fn order_status(raw: &str) -> Result<OrderStatus, StoreError> {
    OrderStatus::parse(raw).ok_or_else(|| StoreError::Corrupt(format!("unknown order status {raw}")))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let status: String = column(row, "status")?;
    Ok(Order::from_storage(
        OrderId::from_uuid(column(row, "id")?),
        CustomerId::from_uuid(column(row, "customer_id")?),
        column(row, "delivery_date")?,
        column(row, "po_number")?,
        order_status(&status)?,
        column(row, "created_at")?,
        column(row, "shipped_at")?,
    ))
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    let line_no: i32 = column(row, "line_no")?;
    Ok(OrderItem {
        id: OrderItemId::from_uuid(column(row, "id")?),
        order_id: OrderId::from_uuid(column(row, "order_id")?),
        line_no: u32::try_from(line_no)
            .map_err(|_| StoreError::Corrupt(format!("line number {line_no}")))?,
        product_id: ProductId::from_uuid(column(row, "product_id")?),
        quantity_ordered: column(row, "quantity_ordered")?,
    })
}

fn allocation_from_row(row: &PgRow) -> Result<OrderAllocation, StoreError> {
    Ok(OrderAllocation {
        id: AllocationId::from_uuid(column(row, "id")?),
        order_item_id: OrderItemId::from_uuid(column(row, "order_item_id")?),
        lot_id: LotId::from_uuid(column(row, "lot_id")?),
        allocated_by: UserId::from_uuid(column(row, "allocated_by")?),
        allocated_at: column(row, "allocated_at")?,
    })
}

fn pick_from_row(row: &PgRow) -> Result<OrderPick, StoreError> {
    let before: String = column(row, "order_status_before")?;
    Ok(OrderPick {
        id: PickId::from_uuid(column(row, "id")?),
        order_id: OrderId::from_uuid(column(row, "order_id")?),
        order_item_id: OrderItemId::from_uuid(column(row, "order_item_id")?),
        lot_id: LotId::from_uuid(column(row, "lot_id")?),
        quantity: column(row, "quantity")?,
        picked_by: UserId::from_uuid(column(row, "picked_by")?),
        picked_at: column(row, "picked_at")?,
        order_status_before: order_status(&before)?,
    })
}

fn run_from_row(row: &PgRow) -> Result<ProductionRun, StoreError> {
    Ok(ProductionRun {
        id: ProductionRunId::from_uuid(column(row, "id")?),
        source_lot_id: LotId::from_uuid(column(row, "source_lot_id")?),
        destination_lot_id: LotId::from_uuid(column(row, "destination_lot_id")?),
        quantity_consumed: column(row, "quantity_consumed")?,
        quantity_produced: column(row, "quantity_produced")?,
        produced_by: UserId::from_uuid(column(row, "produced_by")?),
        notes: column(row, "notes")?,
        created_at: column(row, "created_at")?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, Utc};
    use lotledger_core::{Actor, CustomerId};
    use lotledger_events::NoopAuditEmitter;
    use lotledger_orders::NewOrderLine;
    use uuid::Uuid;

    use crate::ledger::{LotLedger, LotReceipt};

    #[test]
    fn schema_creates_every_ledger_table() {
        for table in [
            "products",
            "inventory_lots",
            "orders",
            "order_items",
            "order_allocations",
            "order_picks",
            "production_runs",
            "lot_sequence",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing table {table}"
            );
        }
    }

    async fn connect() -> PgLedgerStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgLedgerStore::connect(&url, 4).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn pick_and_revert_round_trip_on_postgres() {
        let ledger = LotLedger::new(connect().await, NoopAuditEmitter);
        let actor = Actor::system();
        let today = Utc::now().date_naive();
        let sku = format!("PG-{}", Uuid::now_v7().simple());

        let product = ledger
            .register_product(&actor, &sku, "pg test", UnitType::Case, None, None)
            .await
            .unwrap();
        let lot = ledger
            .receive_lot(
                &actor,
                LotReceipt {
                    product_id: product.id,
                    quantity: 40,
                    received_on: today,
                    expires_on: today.checked_add_days(Days::new(7)).unwrap(),
                    origin_country: Some("CA".to_string()),
                    grower_id: None,
                },
            )
            .await
            .unwrap();
        let placed = ledger
            .place_order(
                &actor,
                CustomerId::new(),
                today,
                None,
                vec![NewOrderLine {
                    product_id: product.id,
                    quantity: 10,
                }],
            )
            .await
            .unwrap();
        ledger.confirm_order(&actor, placed.order.id).await.unwrap();

        let outcome = ledger
            .submit_pick(&actor, placed.items[0].id, lot.id, 10)
            .await
            .unwrap();
        assert_eq!(outcome.lot_quantity, 30);
        assert_eq!(outcome.order_status, OrderStatus::ReadyToShip);

        let undo = ledger.revert_pick(&actor, outcome.pick.id).await.unwrap();
        assert_eq!(undo.lot_quantity, 40);
        assert_eq!(undo.order_status, OrderStatus::Confirmed);

        let mut reader = ledger.store().reader().await.unwrap();
        let stored = reader.lot(lot.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity_current(), 40);
        assert_eq!(stored.status(), LotStatus::Received);
    }
}
