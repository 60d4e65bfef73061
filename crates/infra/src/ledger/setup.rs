//! Catalog, receiving and order-entry operations that feed the ledger.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use lotledger_core::{
    Actor, AllocationId, CustomerId, DomainError, EntityKind, LotId, OrderId, OrderItemId,
    ProductId,
};
use lotledger_events::AuditEmitter;
use lotledger_inventory::{InventoryLot, LotEvent, LotReceived, NewLot};
use lotledger_orders::{
    LotAllocated, NewOrderLine, Order, OrderAllocation, OrderConfirmed, OrderEvent, OrderItem,
    OrderPlaced, OrderStatus,
};
use lotledger_products::{Gtin, GtinAssigned, Product, ProductEvent, ProductRegistered, UnitType};

use super::{AuditTrail, LedgerResult, LotLedger, found};
use crate::store::{LedgerRead, LedgerStore, LedgerTx};

/// A received shipment of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotReceipt {
    pub product_id: ProductId,
    pub quantity: i64,
    pub received_on: NaiveDate,
    pub expires_on: NaiveDate,
    pub origin_country: Option<String>,
    pub grower_id: Option<String>,
}

/// An order with its items in line order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl<S, A> LotLedger<S, A>
where
    S: LedgerStore,
    A: AuditEmitter,
{
    #[instrument(skip(self, actor, name, case_weight, gtin), fields(user_id = %actor.user_id))]
    pub async fn register_product(
        &self,
        actor: &Actor,
        sku: &str,
        name: &str,
        unit_type: UnitType,
        case_weight: Option<Decimal>,
        gtin: Option<&str>,
    ) -> LedgerResult<Product> {
        let result = self
            .register_product_tx(actor, sku, name, unit_type, case_weight, gtin)
            .await;
        self.finish("register_product", result)
    }

    async fn register_product_tx(
        &self,
        actor: &Actor,
        sku: &str,
        name: &str,
        unit_type: UnitType,
        case_weight: Option<Decimal>,
        gtin: Option<&str>,
    ) -> LedgerResult<(Product, AuditTrail)> {
        let now = Utc::now();
        let gtin = gtin.map(Gtin::parse).transpose()?;
        let product = Product::new(
            ProductId::new(),
            sku,
            name,
            unit_type,
            case_weight,
            gtin,
            now,
        )?;

        let mut tx = self.store.begin().await?;
        if tx.product_by_sku(&product.sku).await?.is_some() {
            return Err(
                DomainError::validation(format!("sku {} is already registered", product.sku))
                    .into(),
            );
        }
        tx.insert_product(&product).await?;
        tx.commit().await?;
        info!(product_id = %product.id, sku = %product.sku, "product registered");

        let mut trail = AuditTrail::new(actor);
        trail.push(ProductEvent::ProductRegistered(ProductRegistered {
            product_id: product.id,
            sku: product.sku.clone(),
            unit_type: product.unit_type,
            gtin: product.gtin.clone(),
            occurred_at: now,
        }));
        Ok((product, trail))
    }

    /// Set or replace a product's GTIN.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn assign_gtin(
        &self,
        actor: &Actor,
        product_id: ProductId,
        gtin: &str,
    ) -> LedgerResult<Product> {
        let result = self.assign_gtin_tx(actor, product_id, gtin).await;
        self.finish("assign_gtin", result)
    }

    async fn assign_gtin_tx(
        &self,
        actor: &Actor,
        product_id: ProductId,
        gtin: &str,
    ) -> LedgerResult<(Product, AuditTrail)> {
        let now = Utc::now();
        let gtin = Gtin::parse(gtin)?;

        let mut tx = self.store.begin().await?;
        let mut product = found(
            tx.product(product_id).await?,
            EntityKind::Product,
            product_id,
        )?;
        let previous = product.gtin.replace(gtin.clone());
        tx.update_product(&product).await?;
        tx.commit().await?;
        info!(sku = %product.sku, gtin = %gtin, "gtin assigned");

        let mut trail = AuditTrail::new(actor);
        trail.push(ProductEvent::GtinAssigned(GtinAssigned {
            product_id: product.id,
            sku: product.sku.clone(),
            previous,
            gtin,
            occurred_at: now,
        }));
        Ok((product, trail))
    }

    /// Ledger entry point of the receiving workflow: a new `RECEIVED` lot with
    /// the next lot number.
    #[instrument(skip(self, actor, receipt), fields(user_id = %actor.user_id, product_id = %receipt.product_id))]
    pub async fn receive_lot(
        &self,
        actor: &Actor,
        receipt: LotReceipt,
    ) -> LedgerResult<InventoryLot> {
        let result = self.receive_lot_tx(actor, receipt).await;
        self.finish("receive_lot", result)
    }

    async fn receive_lot_tx(
        &self,
        actor: &Actor,
        receipt: LotReceipt,
    ) -> LedgerResult<(InventoryLot, AuditTrail)> {
        if receipt.quantity <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "received quantity must be positive (got {})",
                receipt.quantity
            ))
            .into());
        }
        if receipt.expires_on < receipt.received_on {
            return Err(DomainError::validation(format!(
                "expiry {} is before receipt {}",
                receipt.expires_on, receipt.received_on
            ))
            .into());
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        found(
            tx.product(receipt.product_id).await?,
            EntityKind::Product,
            receipt.product_id,
        )?;

        let sequence = tx.next_lot_sequence().await?;
        let lot = InventoryLot::receive(NewLot {
            id: LotId::new(),
            lot_number: self.lot_numbers.format(sequence),
            product_id: receipt.product_id,
            parent_lot_id: None,
            quantity: receipt.quantity,
            received_on: receipt.received_on,
            expires_on: receipt.expires_on,
            origin_country: receipt.origin_country,
            grower_id: receipt.grower_id,
            created_at: now,
        })?;
        tx.insert_lot(&lot).await?;
        tx.commit().await?;
        info!(lot_number = %lot.lot_number, quantity = lot.quantity_current(), "lot received");

        let mut trail = AuditTrail::new(actor);
        trail.push(LotEvent::LotReceived(LotReceived {
            lot_id: lot.id,
            lot_number: lot.lot_number.clone(),
            product_id: lot.product_id,
            parent_lot_id: None,
            quantity: lot.quantity_current(),
            expires_on: lot.expires_on,
            occurred_at: now,
        }));
        Ok((lot, trail))
    }

    /// Create a `DRAFT` order. Lines are numbered from 1 in the given order.
    #[instrument(skip(self, actor, po_number, lines), fields(user_id = %actor.user_id, lines = lines.len()))]
    pub async fn place_order(
        &self,
        actor: &Actor,
        customer_id: CustomerId,
        delivery_date: NaiveDate,
        po_number: Option<String>,
        lines: Vec<NewOrderLine>,
    ) -> LedgerResult<PlacedOrder> {
        let result = self
            .place_order_tx(actor, customer_id, delivery_date, po_number, lines)
            .await;
        self.finish("place_order", result)
    }

    async fn place_order_tx(
        &self,
        actor: &Actor,
        customer_id: CustomerId,
        delivery_date: NaiveDate,
        po_number: Option<String>,
        lines: Vec<NewOrderLine>,
    ) -> LedgerResult<(PlacedOrder, AuditTrail)> {
        if lines.is_empty() {
            return Err(DomainError::validation("an order needs at least one line").into());
        }

        let now = Utc::now();
        let order = Order::place(OrderId::new(), customer_id, delivery_date, po_number, now);
        let items = lines
            .iter()
            .zip(1u32..)
            .map(|(line, line_no)| OrderItem::new(OrderItemId::new(), order.id, line_no, line))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.store.begin().await?;
        for item in &items {
            found(
                tx.product(item.product_id).await?,
                EntityKind::Product,
                item.product_id,
            )?;
        }
        tx.insert_order(&order).await?;
        for item in &items {
            tx.insert_order_item(item).await?;
        }
        tx.commit().await?;
        info!(order_id = %order.id, lines = items.len(), "order placed");

        let mut trail = AuditTrail::new(actor);
        trail.push(OrderEvent::OrderPlaced(OrderPlaced {
            order_id: order.id,
            customer_id: order.customer_id,
            po_number: order.po_number.clone(),
            delivery_date: order.delivery_date,
            lines,
            occurred_at: now,
        }));
        Ok((PlacedOrder { order, items }, trail))
    }

    /// External `DRAFT -> CONFIRMED` step.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn confirm_order(&self, actor: &Actor, order_id: OrderId) -> LedgerResult<Order> {
        let result = self.confirm_order_tx(actor, order_id).await;
        self.finish("confirm_order", result)
    }

    async fn confirm_order_tx(
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
        order.confirm(items.len())?;
        tx.update_order(&order).await?;
        tx.commit().await?;
        info!(order_id = %order.id, "order confirmed");

        let mut trail = AuditTrail::new(actor);
        trail.push(OrderEvent::OrderConfirmed(OrderConfirmed {
            order_id: order.id,
            customer_id: order.customer_id,
            occurred_at: now,
        }));
        Ok((order, trail))
    }

    /// Earmark `lot_id` for an order line so it stays selectable for that
    /// line whatever its status. Allocating the same lot twice returns the
    /// existing allocation.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn allocate_lot(
        &self,
        actor: &Actor,
        item_id: OrderItemId,
        lot_id: LotId,
    ) -> LedgerResult<OrderAllocation> {
        let result = self.allocate_lot_tx(actor, item_id, lot_id).await;
        self.finish("allocate_lot", result)
    }

    async fn allocate_lot_tx(
        &self,
        actor: &Actor,
        item_id: OrderItemId,
        lot_id: LotId,
    ) -> LedgerResult<(OrderAllocation, AuditTrail)> {
        let now = Utc::now();
        let mut trail = AuditTrail::new(actor);
        let mut tx = self.store.begin().await?;

        let item = found(tx.order_item(item_id).await?, EntityKind::OrderItem, item_id)?;
        let order = found(
            tx.order_for_update(item.order_id).await?,
            EntityKind::Order,
            item.order_id,
        )?;
        if order.status() == OrderStatus::Shipped {
            return Err(DomainError::invalid_order_state(order.status(), "allocate against").into());
        }

        let lot = found(tx.lot(lot_id).await?, EntityKind::Lot, lot_id)?;
        if lot.product_id != item.product_id {
            return Err(DomainError::ProductMismatch {
                expected: item.product_id,
                lot_product: lot.product_id,
            }
            .into());
        }

        let existing = tx.allocations_for_item(item.id).await?;
        if let Some(allocation) = existing.into_iter().find(|a| a.lot_id == lot.id) {
            return Ok((allocation, trail));
        }

        let allocation = OrderAllocation {
            id: AllocationId::new(),
            order_item_id: item.id,
            lot_id: lot.id,
            allocated_by: actor.user_id,
            allocated_at: now,
        };
        tx.insert_allocation(&allocation).await?;
        tx.commit().await?;
        info!(order_id = %order.id, lot_number = %lot.lot_number, "lot allocated");

        trail.push(OrderEvent::LotAllocated(LotAllocated {
            allocation_id: allocation.id,
            order_id: order.id,
            order_item_id: item.id,
            lot_id: lot.id,
            lot_number: lot.lot_number.clone(),
            occurred_at: now,
        }));
        Ok((allocation, trail))
    }
}
