//! Inventory lot module.
//!
//! Holds the lot record and the Lot Store primitives: the only code allowed to
//! change a lot's current quantity or status. Pure domain logic, no IO.

pub mod lineage;
pub mod lot;
pub mod status;

pub use lineage::trace_lineage;
pub use lot::{
    InventoryLot, LotEvent, LotExpired, LotReceived, LotStatusChanged, NewLot, QuantityAdjusted,
    QuantityChange, QuantityChanged,
};
pub use status::{LotStatus, derive_status};
