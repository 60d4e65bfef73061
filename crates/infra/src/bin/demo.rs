//! Walks one order through receiving, picking, shipping and a repack
//! conversion against the configured store.

use anyhow::{Context, Result};
use chrono::{Days, Utc};
use rust_decimal::Decimal;

use lotledger_core::{Actor, CustomerId, Role, UserId};
use lotledger_events::TracingAuditEmitter;
use lotledger_infra::{
    InMemoryLedgerStore, LedgerConfig, LedgerStore, LotLedger, LotReceipt, PgLedgerStore,
    StoreKind,
};
use lotledger_inventory::LotStatus;
use lotledger_orders::NewOrderLine;
use lotledger_products::UnitType;

#[tokio::main]
async fn main() -> Result<()> {
    lotledger_observability::init();

    let config = LedgerConfig::from_env().context("reading ledger configuration")?;
    match config.store {
        StoreKind::Memory => {
            let ledger = LotLedger::new(InMemoryLedgerStore::new(), TracingAuditEmitter)
                .with_lot_numbers(config.lot_numbers.clone());
            run(&ledger).await
        }
        StoreKind::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres store")?;
            let store = PgLedgerStore::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            let ledger = LotLedger::new(store, TracingAuditEmitter)
                .with_lot_numbers(config.lot_numbers.clone());
            run(&ledger).await
        }
    }
}

async fn run<S: LedgerStore>(ledger: &LotLedger<S, TracingAuditEmitter>) -> Result<()> {
    let admin = Actor::new(UserId::new(), Role::Admin);
    let picker = Actor::new(UserId::new(), Role::Picker);
    let today = Utc::now().date_naive();
    let expires_on = today
        .checked_add_days(Days::new(12))
        .context("expiry date out of range")?;

    let bulk = ledger
        .register_product(
            &admin,
            "TOM-ROMA-25",
            "Roma tomatoes 25 lb",
            UnitType::Case,
            Some(Decimal::from(25)),
            None,
        )
        .await?;
    let packed = ledger
        .register_product(
            &admin,
            "TOM-ROMA-PK",
            "Roma tomatoes 2 lb clamshell",
            UnitType::Each,
            None,
            Some("4006381333931"),
        )
        .await?;

    let lot = ledger
        .receive_lot(
            &admin,
            LotReceipt {
                product_id: bulk.id,
                quantity: 80,
                received_on: today,
                expires_on,
                origin_country: Some("MX".to_string()),
                grower_id: Some("G-204".to_string()),
            },
        )
        .await?;
    ledger.set_lot_status(&admin, lot.id, LotStatus::Available).await?;

    let placed = ledger
        .place_order(
            &admin,
            CustomerId::new(),
            today,
            Some("PO-7781".to_string()),
            vec![NewOrderLine {
                product_id: bulk.id,
                quantity: 24,
            }],
        )
        .await?;
    ledger.confirm_order(&admin, placed.order.id).await?;

    let item = placed.items.first().context("order has no lines")?;
    let plan = ledger.suggest_fill(item.id).await?;
    for pick in &plan.picks {
        ledger
            .submit_pick(&picker, item.id, pick.lot_id, pick.quantity)
            .await?;
    }
    let shipped = ledger.finalize_order(&picker, placed.order.id).await?;
    tracing::info!(order_id = %shipped.id, status = %shipped.status(), "order shipped");

    let outcome = ledger
        .convert_inventory(
            &admin,
            lot.id,
            Decimal::from(20),
            packed.id,
            Decimal::from(200),
            Some("clamshell repack".to_string()),
        )
        .await?;
    let lineage = ledger.lot_lineage(outcome.destination.id).await?;
    let chain: Vec<&str> = lineage.chain.iter().map(|l| l.lot_number.as_str()).collect();
    tracing::info!(chain = ?chain, "repacked lot lineage");

    Ok(())
}
