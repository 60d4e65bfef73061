//! Product catalog module.
//!
//! Products are synchronised from the accounting system; the ledger only needs
//! their identity, unit of measure and trace identifier (GTIN).

pub mod gtin;
pub mod product;

pub use gtin::Gtin;
pub use product::{GtinAssigned, Product, ProductEvent, ProductRegistered, UnitType};
