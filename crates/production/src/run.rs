use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lotledger_core::{Entity, EntityKind, LotId, ProductId, ProductionRunId, UserId};
use lotledger_events::Event;

/// Immutable record of one source lot feeding one destination lot.
///
/// Quantities are the requested values, unrounded. In a batch conversion
/// `quantity_produced` is this source's proportional share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRun {
    pub id: ProductionRunId,
    pub source_lot_id: LotId,
    pub destination_lot_id: LotId,
    pub quantity_consumed: Decimal,
    pub quantity_produced: Decimal,
    pub produced_by: UserId,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProductionRun {
    pub fn touches(&self, lot_id: LotId) -> bool {
        self.source_lot_id == lot_id || self.destination_lot_id == lot_id
    }
}

impl Entity for ProductionRun {
    type Id = ProductionRunId;
    const KIND: EntityKind = EntityKind::ProductionRun;

    fn id(&self) -> ProductionRunId {
        self.id
    }
}

/// Per-source detail carried by `InventoryConverted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDrawn {
    pub run_id: ProductionRunId,
    pub lot_id: LotId,
    pub lot_number: String,
    pub quantity_consumed: Decimal,
    pub quantity_produced: Decimal,
}

/// Event: InventoryConverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConverted {
    pub destination_lot_id: LotId,
    pub destination_lot_number: String,
    pub output_product_id: ProductId,
    pub destination_quantity: i64,
    pub quantity_produced: Decimal,
    pub sources: Vec<SourceDrawn>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductionEvent {
    InventoryConverted(InventoryConverted),
}

impl Event for ProductionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductionEvent::InventoryConverted(e) if e.sources.len() > 1 => {
                "production.inventory.batch_converted"
            }
            ProductionEvent::InventoryConverted(_) => "production.inventory.converted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductionEvent::InventoryConverted(e) => e.occurred_at,
        }
    }

    fn subject(&self) -> (EntityKind, String) {
        match self {
            ProductionEvent::InventoryConverted(e) => {
                (EntityKind::Lot, e.destination_lot_id.to_string())
            }
        }
    }
}
