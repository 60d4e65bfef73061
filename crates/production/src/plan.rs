//! Conversion planning.
//!
//! `plan_conversion` validates a request against the current source lots and
//! the output product, and computes every effect up front: the integer draw on
//! each source lot, the destination lot attributes and one production run per
//! requested source. Nothing is mutated here, so a rejected request leaves
//! every lot untouched.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use lotledger_core::{DomainError, EntityKind, LotId, ProductId};
use lotledger_inventory::InventoryLot;
use lotledger_products::Product;

/// Decimal places kept on each proportional share except the last.
pub const SHARE_SCALE: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRequest {
    pub lot_id: LotId,
    pub quantity_consumed: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub sources: Vec<SourceRequest>,
    pub output_product_id: ProductId,
    pub quantity_produced: Decimal,
    pub notes: Option<String>,
}

impl ConversionRequest {
    pub fn single(
        source_lot_id: LotId,
        quantity_consumed: Decimal,
        output_product_id: ProductId,
        quantity_produced: Decimal,
    ) -> Self {
        Self {
            sources: vec![SourceRequest {
                lot_id: source_lot_id,
                quantity_consumed,
            }],
            output_product_id,
            quantity_produced,
            notes: None,
        }
    }
}

/// Whole units taken from one source lot (summed when a lot is listed twice).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRun {
    pub source_lot_id: LotId,
    pub quantity_consumed: Decimal,
    pub quantity_produced: Decimal,
}

/// Attributes of the lot the conversion creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationLot {
    pub product_id: ProductId,
    pub quantity: i64,
    pub parent_lot_id: LotId,
    pub expires_on: NaiveDate,
    pub origin_country: Option<String>,
    pub grower_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionPlan {
    pub draws: Vec<LotDraw>,
    pub runs: Vec<PlannedRun>,
    pub destination: DestinationLot,
    pub notes: Option<String>,
}

/// Round to a whole unit, half away from zero.
pub fn round_quantity(quantity: Decimal) -> Result<i64, DomainError> {
    quantity
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| DomainError::invalid_quantity(format!("{quantity} is out of range")))
}

fn out_of_range(what: &str) -> DomainError {
    DomainError::invalid_quantity(format!("{what} is out of range"))
}

/// Split `produced` across sources in proportion to what each consumed.
///
/// Every share but the last is rounded to `SHARE_SCALE` places; the last is
/// the remainder, so the shares sum to `produced` exactly. Quantities whose
/// product or sum leaves the decimal range are rejected.
pub fn proportional_shares(
    consumed: &[Decimal],
    produced: Decimal,
) -> Result<Vec<Decimal>, DomainError> {
    let total = consumed
        .iter()
        .try_fold(Decimal::ZERO, |acc, part| acc.checked_add(*part))
        .ok_or_else(|| out_of_range("total consumed quantity"))?;
    if consumed.is_empty() || total.is_zero() {
        return Ok(Vec::new());
    }

    let mut shares = Vec::with_capacity(consumed.len());
    let mut allotted = Decimal::ZERO;
    for (i, part) in consumed.iter().enumerate() {
        let share = if i + 1 == consumed.len() {
            produced.checked_sub(allotted)
        } else {
            part.checked_mul(produced)
                .and_then(|scaled| scaled.checked_div(total))
                .map(|s| s.round_dp_with_strategy(SHARE_SCALE, RoundingStrategy::MidpointAwayFromZero))
        }
        .ok_or_else(|| out_of_range("proportional output share"))?;
        allotted = allotted
            .checked_add(share)
            .ok_or_else(|| out_of_range("allotted output"))?;
        shares.push(share);
    }
    Ok(shares)
}

/// Validate `request` and compute its effects.
///
/// `lookup` resolves the current state of a source lot. The first listed
/// source supplies the destination's parent, origin and grower; its expiry is
/// the earliest among all sources.
pub fn plan_conversion<'a, F>(
    request: &ConversionRequest,
    output: &Product,
    mut lookup: F,
) -> Result<ConversionPlan, DomainError>
where
    F: FnMut(LotId) -> Option<&'a InventoryLot>,
{
    if request.sources.is_empty() {
        return Err(DomainError::validation("conversion needs at least one source lot"));
    }
    if let Some(bad) = request
        .sources
        .iter()
        .find(|s| s.quantity_consumed <= Decimal::ZERO)
    {
        return Err(DomainError::invalid_quantity(format!(
            "consumed quantity for lot {} must be positive (got {})",
            bad.lot_id, bad.quantity_consumed
        )));
    }
    if request.quantity_produced <= Decimal::ZERO {
        return Err(DomainError::invalid_quantity(format!(
            "produced quantity must be positive (got {})",
            request.quantity_produced
        )));
    }
    let destination_quantity = round_quantity(request.quantity_produced)?;
    if destination_quantity == 0 {
        return Err(DomainError::invalid_quantity(format!(
            "produced quantity {} rounds to zero",
            request.quantity_produced
        )));
    }

    let mut sources: Vec<&'a InventoryLot> = Vec::with_capacity(request.sources.len());
    let mut draws: Vec<LotDraw> = Vec::new();
    for source in &request.sources {
        let lot = lookup(source.lot_id)
            .ok_or_else(|| DomainError::not_found(EntityKind::Lot, source.lot_id))?;
        let units = round_quantity(source.quantity_consumed)?;
        match draws.iter_mut().find(|d| d.lot_id == lot.id) {
            Some(draw) => {
                draw.quantity = draw
                    .quantity
                    .checked_add(units)
                    .ok_or_else(|| out_of_range("combined draw on one lot"))?;
            }
            None => draws.push(LotDraw {
                lot_id: lot.id,
                quantity: units,
            }),
        }
        sources.push(lot);
    }

    for draw in &draws {
        let on_hand = sources
            .iter()
            .find(|l| l.id == draw.lot_id)
            .map(|l| l.quantity_current())
            .unwrap_or(0);
        if draw.quantity > on_hand {
            return Err(DomainError::InsufficientQuantity {
                lot_id: draw.lot_id,
                requested: draw.quantity,
                on_hand,
            });
        }
    }

    output.ensure_traceable()?;

    let primary = sources[0];
    let expires_on = sources
        .iter()
        .map(|l| l.expires_on)
        .min()
        .unwrap_or(primary.expires_on);

    let consumed: Vec<Decimal> = request.sources.iter().map(|s| s.quantity_consumed).collect();
    let shares = proportional_shares(&consumed, request.quantity_produced)?;
    let runs = request
        .sources
        .iter()
        .zip(shares)
        .map(|(source, share)| PlannedRun {
            source_lot_id: source.lot_id,
            quantity_consumed: source.quantity_consumed,
            quantity_produced: share,
        })
        .collect();

    Ok(ConversionPlan {
        draws,
        runs,
        destination: DestinationLot {
            product_id: output.id,
            quantity: destination_quantity,
            parent_lot_id: primary.id,
            expires_on,
            origin_country: primary.origin_country.clone(),
            grower_id: primary.grower_id.clone(),
        },
        notes: request.notes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lotledger_inventory::NewLot;
    use lotledger_products::{Gtin, UnitType};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
    }

    fn source(qty: i64, expires: u32, origin: &str) -> InventoryLot {
        InventoryLot::receive(NewLot {
            id: LotId::new(),
            lot_number: format!("L{expires:06}"),
            product_id: ProductId::new(),
            parent_lot_id: None,
            quantity: qty,
            received_on: day(1),
            expires_on: day(expires),
            origin_country: Some(origin.to_string()),
            grower_id: Some(format!("G-{origin}")),
            created_at: Utc::now(),
        })
        .unwrap()
    }

    fn output(gtin: Option<&str>) -> Product {
        Product::new(
            ProductId::new(),
            "REPACK-1",
            "Repacked berries",
            UnitType::Case,
            None,
            gtin.map(|g| Gtin::parse(g).unwrap()),
            Utc::now(),
        )
        .unwrap()
    }

    fn index(lots: &[InventoryLot]) -> HashMap<LotId, &InventoryLot> {
        lots.iter().map(|l| (l.id, l)).collect()
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_quantity(dec!(2.5)).unwrap(), 3);
        assert_eq!(round_quantity(dec!(2.49)).unwrap(), 2);
        assert_eq!(round_quantity(dec!(7)).unwrap(), 7);
    }

    #[test]
    fn single_conversion_inherits_from_source() {
        let lots = vec![source(40, 20, "MX")];
        let by_id = index(&lots);
        let request =
            ConversionRequest::single(lots[0].id, dec!(12.5), ProductId::new(), dec!(9.4));
        let product = output(Some("4006381333931"));

        let plan = plan_conversion(&request, &product, |id| by_id.get(&id).copied()).unwrap();
        assert_eq!(plan.draws, vec![LotDraw { lot_id: lots[0].id, quantity: 13 }]);
        assert_eq!(plan.destination.quantity, 9);
        assert_eq!(plan.destination.parent_lot_id, lots[0].id);
        assert_eq!(plan.destination.expires_on, day(20));
        assert_eq!(plan.destination.origin_country.as_deref(), Some("MX"));
        assert_eq!(plan.destination.product_id, product.id);
        assert_eq!(plan.runs.len(), 1);
        assert_eq!(plan.runs[0].quantity_consumed, dec!(12.5));
        assert_eq!(plan.runs[0].quantity_produced, dec!(9.4));
    }

    #[test]
    fn consuming_more_than_on_hand_is_insufficient() {
        let lots = vec![source(10, 20, "MX")];
        let by_id = index(&lots);
        let request = ConversionRequest::single(lots[0].id, dec!(15), ProductId::new(), dec!(5));

        let err = plan_conversion(&request, &output(Some("4006381333931")), |id| {
            by_id.get(&id).copied()
        })
        .unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientQuantity {
                lot_id: lots[0].id,
                requested: 15,
                on_hand: 10
            }
        );
    }

    #[test]
    fn output_without_gtin_is_rejected() {
        let lots = vec![source(10, 20, "MX")];
        let by_id = index(&lots);
        let product = output(None);
        let request = ConversionRequest::single(lots[0].id, dec!(5), product.id, dec!(5));

        let err = plan_conversion(&request, &product, |id| by_id.get(&id).copied()).unwrap_err();
        assert_eq!(err, DomainError::MissingGtin(product.id));
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let lots = vec![source(10, 20, "MX")];
        let by_id = index(&lots);
        let product = output(Some("4006381333931"));
        for (consumed, produced) in [(dec!(0), dec!(5)), (dec!(5), dec!(0)), (dec!(5), dec!(0.4))] {
            let request = ConversionRequest::single(lots[0].id, consumed, product.id, produced);
            let err =
                plan_conversion(&request, &product, |id| by_id.get(&id).copied()).unwrap_err();
            assert!(matches!(err, DomainError::InvalidQuantity(_)));
        }
    }

    #[test]
    fn batch_split_is_proportional() {
        let lots = vec![source(30, 25, "MX"), source(70, 18, "US")];
        let by_id = index(&lots);
        let product = output(Some("4006381333931"));
        let request = ConversionRequest {
            sources: vec![
                SourceRequest { lot_id: lots[0].id, quantity_consumed: dec!(30) },
                SourceRequest { lot_id: lots[1].id, quantity_consumed: dec!(70) },
            ],
            output_product_id: product.id,
            quantity_produced: dec!(50),
            notes: Some("repack".to_string()),
        };

        let plan = plan_conversion(&request, &product, |id| by_id.get(&id).copied()).unwrap();
        let produced: Vec<Decimal> = plan.runs.iter().map(|r| r.quantity_produced).collect();
        assert_eq!(produced, vec![dec!(15), dec!(35)]);
        assert_eq!(plan.destination.quantity, 50);
        assert_eq!(plan.destination.expires_on, day(18));
        assert_eq!(plan.destination.origin_country.as_deref(), Some("MX"));
        assert_eq!(plan.destination.parent_lot_id, lots[0].id);
    }

    #[test]
    fn batch_checks_every_source_before_planning() {
        let lots = vec![source(30, 25, "MX"), source(5, 18, "US")];
        let by_id = index(&lots);
        let product = output(Some("4006381333931"));
        let request = ConversionRequest {
            sources: vec![
                SourceRequest { lot_id: lots[0].id, quantity_consumed: dec!(10) },
                SourceRequest { lot_id: lots[1].id, quantity_consumed: dec!(6) },
            ],
            output_product_id: product.id,
            quantity_produced: dec!(12),
            notes: None,
        };
        let err = plan_conversion(&request, &product, |id| by_id.get(&id).copied()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientQuantity { requested: 6, on_hand: 5, .. }));
    }

    #[test]
    fn repeated_source_is_checked_in_aggregate() {
        let lots = vec![source(10, 25, "MX")];
        let by_id = index(&lots);
        let product = output(Some("4006381333931"));
        let request = ConversionRequest {
            sources: vec![
                SourceRequest { lot_id: lots[0].id, quantity_consumed: dec!(6) },
                SourceRequest { lot_id: lots[0].id, quantity_consumed: dec!(6) },
            ],
            output_product_id: product.id,
            quantity_produced: dec!(10),
            notes: None,
        };
        let err = plan_conversion(&request, &product, |id| by_id.get(&id).copied()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientQuantity { requested: 12, .. }));
    }

    #[test]
    fn unknown_source_is_not_found() {
        let product = output(Some("4006381333931"));
        let request = ConversionRequest::single(LotId::new(), dec!(1), product.id, dec!(1));
        let err = plan_conversion(&request, &product, |_| None).unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: EntityKind::Lot, .. }));
    }

    #[test]
    fn oversized_batch_is_rejected_instead_of_overflowing() {
        let huge = 1_000_000_000_000_000_i64;
        let lots = vec![source(huge, 25, "MX"), source(huge, 18, "US")];
        let by_id = index(&lots);
        let product = output(Some("4006381333931"));
        let request = ConversionRequest {
            sources: lots
                .iter()
                .map(|l| SourceRequest { lot_id: l.id, quantity_consumed: Decimal::from(huge) })
                .collect(),
            output_product_id: product.id,
            quantity_produced: Decimal::from(huge / 10),
            notes: None,
        };
        let err = plan_conversion(&request, &product, |id| by_id.get(&id).copied()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn repeated_source_draw_beyond_i64_is_rejected() {
        let lots = vec![source(i64::MAX, 25, "MX")];
        let by_id = index(&lots);
        let product = output(Some("4006381333931"));
        let request = ConversionRequest {
            sources: vec![
                SourceRequest { lot_id: lots[0].id, quantity_consumed: Decimal::from(i64::MAX) },
                SourceRequest { lot_id: lots[0].id, quantity_consumed: Decimal::from(i64::MAX) },
            ],
            output_product_id: product.id,
            quantity_produced: dec!(10),
            notes: None,
        };
        let err = plan_conversion(&request, &product, |id| by_id.get(&id).copied()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn share_products_past_decimal_range_are_rejected() {
        let part = Decimal::from(1_000_000_000_000_000_i64);
        let err = proportional_shares(&[part, part], Decimal::from(100_000_000_000_000_i64))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidQuantity(_)));
    }

    #[test]
    fn thirds_still_sum_exactly() {
        let shares = proportional_shares(&[dec!(1), dec!(1), dec!(1)], dec!(10)).unwrap();
        assert_eq!(shares[0], dec!(3.333333));
        assert_eq!(shares[1], dec!(3.333333));
        assert_eq!(shares[2], dec!(3.333334));
        assert_eq!(shares.iter().copied().sum::<Decimal>(), dec!(10));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: shares always sum to the requested output exactly.
        #[test]
        fn shares_sum_to_produced(
            consumed in prop::collection::vec(1u32..10_000, 1..8),
            produced_cents in 1u32..1_000_000,
        ) {
            let consumed: Vec<Decimal> = consumed.into_iter().map(Decimal::from).collect();
            let produced = Decimal::new(i64::from(produced_cents), 2);
            let shares = proportional_shares(&consumed, produced).unwrap();
            prop_assert_eq!(shares.len(), consumed.len());
            prop_assert_eq!(shares.iter().copied().sum::<Decimal>(), produced);
        }
    }
}
