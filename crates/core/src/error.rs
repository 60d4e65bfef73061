//! Domain error model.
//!
//! One variant per business-rule rejection. These are deterministic: retrying
//! the same call against the same state fails the same way. Storage faults are
//! modelled separately by the infrastructure layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{LotId, ProductId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Kind of record referenced by a `NotFound` error or an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Lot,
    Order,
    OrderItem,
    Allocation,
    Pick,
    ProductionRun,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Lot => "lot",
            EntityKind::Order => "order",
            EntityKind::OrderItem => "order_item",
            EntityKind::Allocation => "allocation",
            EntityKind::Pick => "pick",
            EntityKind::ProductionRun => "production_run",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger domain error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Negative or zero quantity where a positive one is required.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A pick asked for more than the lot has left after committed picks.
    #[error("insufficient quantity in lot {lot_id}: requested {requested}, remaining {remaining}")]
    InsufficientLotQuantity {
        lot_id: LotId,
        requested: i64,
        remaining: i64,
    },

    /// A conversion asked to consume more than the source lot holds.
    #[error("insufficient quantity in lot {lot_id}: requested {requested}, on hand {on_hand}")]
    InsufficientQuantity {
        lot_id: LotId,
        requested: i64,
        on_hand: i64,
    },

    /// A pick exceeds what is still outstanding on the order line.
    #[error("over-pick: requested {requested}, outstanding {outstanding}")]
    OverPick { requested: i64, outstanding: i64 },

    /// The lot is outside the selectable set for this order line.
    #[error("lot {lot_id} is not available for picking (status {status})")]
    LotNotAvailable { lot_id: LotId, status: String },

    /// The lot holds a different product than the order line asks for.
    #[error("product mismatch: lot holds {lot_product}, line wants {expected}")]
    ProductMismatch {
        expected: ProductId,
        lot_product: ProductId,
    },

    /// The order's status forbids the attempted operation.
    #[error("cannot {operation} an order in status {status}")]
    InvalidOrderState { status: String, operation: String },

    /// A conversion output product has no GTIN assigned.
    #[error("product {0} has no GTIN assigned")]
    MissingGtin(ProductId),

    /// A referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// Malformed input that is not a quantity problem (empty SKU, bad GTIN, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(kind: EntityKind, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_order_state(
        status: impl core::fmt::Display,
        operation: impl Into<String>,
    ) -> Self {
        Self::InvalidOrderState {
            status: status.to_string(),
            operation: operation.into(),
        }
    }

    /// Stable machine-readable code for the calling layer.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::InvalidQuantity(_) => "INVALID_QUANTITY",
            DomainError::InsufficientLotQuantity { .. } => "INSUFFICIENT_LOT_QUANTITY",
            DomainError::InsufficientQuantity { .. } => "INSUFFICIENT_QUANTITY",
            DomainError::OverPick { .. } => "OVER_PICK",
            DomainError::LotNotAvailable { .. } => "LOT_NOT_AVAILABLE",
            DomainError::ProductMismatch { .. } => "PRODUCT_MISMATCH",
            DomainError::InvalidOrderState { .. } => "INVALID_ORDER_STATE",
            DomainError::MissingGtin(_) => "MISSING_GTIN",
            DomainError::NotFound { .. } => "NOT_FOUND",
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::InvalidId(_) => "INVALID_ID",
        }
    }
}
