//! Conversion (repack) module.
//!
//! Plans how one or more source lots turn into a single destination lot and
//! records the resulting production runs. Pure domain logic: the plan is
//! executed by the ledger service inside one transaction.

pub mod plan;
pub mod run;

pub use plan::{
    ConversionPlan, ConversionRequest, DestinationLot, LotDraw, PlannedRun, SHARE_SCALE,
    SourceRequest, plan_conversion, proportional_shares, round_quantity,
};
pub use run::{InventoryConverted, ProductionEvent, ProductionRun, SourceDrawn};
