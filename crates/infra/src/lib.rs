//! Infrastructure layer: persistence, configuration and the ledger service.
//!
//! Domain crates decide; this crate runs those decisions inside store
//! transactions and reports them to the audit emitter.

pub mod config;
pub mod ledger;
pub mod store;

pub use config::{ConfigError, LedgerConfig, LotNumberFormat, StoreKind};
pub use ledger::{
    ConversionOutcome, ItemSummary, LedgerError, LedgerResult, LotLedger, LotLineage, LotReceipt,
    OrderSummary, PickOutcome, PlacedOrder, RevertOutcome,
};
pub use store::{
    InMemoryLedgerStore, LedgerRead, LedgerStore, LedgerTx, PgLedgerStore, StoreError,
};
