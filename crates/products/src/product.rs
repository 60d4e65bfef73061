use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lotledger_core::{DomainError, Entity, EntityKind, ProductId};
use lotledger_events::Event;

use crate::gtin::Gtin;

/// Unit a product is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitType {
    Case,
    Lbs,
    Each,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Case => "CASE",
            UnitType::Lbs => "LBS",
            UnitType::Each => "EACH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CASE" => Some(UnitType::Case),
            "LBS" => Some(UnitType::Lbs),
            "EACH" => Some(UnitType::Each),
            _ => None,
        }
    }
}

impl core::fmt::Display for UnitType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog product. SKU is the immutable business identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub unit_type: UnitType,
    /// Standard case weight in pounds, for CASE products sold by weight.
    pub case_weight: Option<Decimal>,
    pub gtin: Option<Gtin>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
        unit_type: UnitType,
        case_weight: Option<Decimal>,
        gtin: Option<Gtin>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let sku = sku.into().trim().to_string();
        if sku.is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if let Some(weight) = case_weight {
            if weight <= Decimal::ZERO {
                return Err(DomainError::validation("case weight must be positive"));
            }
        }

        Ok(Self {
            id,
            sku,
            name,
            unit_type,
            case_weight,
            gtin,
            created_at,
        })
    }

    pub fn has_gtin(&self) -> bool {
        self.gtin.is_some()
    }

    /// Conversion outputs must carry a GTIN for physical traceability.
    pub fn ensure_traceable(&self) -> Result<&Gtin, DomainError> {
        self.gtin.as_ref().ok_or(DomainError::MissingGtin(self.id))
    }
}

impl Entity for Product {
    type Id = ProductId;
    const KIND: EntityKind = EntityKind::Product;

    fn id(&self) -> ProductId {
        self.id
    }
}

/// Event: ProductRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRegistered {
    pub product_id: ProductId,
    pub sku: String,
    pub unit_type: UnitType,
    pub gtin: Option<Gtin>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GtinAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GtinAssigned {
    pub product_id: ProductId,
    pub sku: String,
    pub previous: Option<Gtin>,
    pub gtin: Gtin,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductEvent {
    ProductRegistered(ProductRegistered),
    GtinAssigned(GtinAssigned),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "catalog.product.registered",
            ProductEvent::GtinAssigned(_) => "catalog.product.gtin_assigned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductRegistered(e) => e.occurred_at,
            ProductEvent::GtinAssigned(e) => e.occurred_at,
        }
    }

    fn subject(&self) -> (EntityKind, String) {
        let id = match self {
            ProductEvent::ProductRegistered(e) => e.product_id,
            ProductEvent::GtinAssigned(e) => e.product_id,
        };
        (EntityKind::Product, id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make(sku: &str, name: &str, weight: Option<Decimal>) -> Result<Product, DomainError> {
        Product::new(
            ProductId::new(),
            sku,
            name,
            UnitType::Case,
            weight,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn sku_is_trimmed() {
        let p = make("  STRAW-12  ", "Strawberries 12x1lb", Some(dec!(12))).unwrap();
        assert_eq!(p.sku, "STRAW-12");
    }

    #[test]
    fn rejects_empty_sku_and_name() {
        assert!(matches!(make("   ", "x", None), Err(DomainError::Validation(_))));
        assert!(matches!(make("SKU", " ", None), Err(DomainError::Validation(_))));
    }

    #[test]
    fn rejects_non_positive_case_weight() {
        assert!(make("SKU", "Thing", Some(dec!(0))).is_err());
        assert!(make("SKU", "Thing", Some(dec!(-1.5))).is_err());
    }

    #[test]
    fn product_without_gtin_is_not_traceable() {
        let p = make("SKU", "Thing", None).unwrap();
        assert_eq!(p.ensure_traceable(), Err(DomainError::MissingGtin(p.id)));
    }

    #[test]
    fn unit_type_round_trips_through_its_label() {
        for unit in [UnitType::Case, UnitType::Lbs, UnitType::Each] {
            assert_eq!(UnitType::parse(unit.as_str()), Some(unit));
        }
        assert_eq!(UnitType::parse("PALLET"), None);
    }
}
