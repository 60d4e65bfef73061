use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

use lotledger_core::{Actor, DomainError, EntityKind, LotId, ProductId, ProductionRunId};
use lotledger_events::AuditEmitter;
use lotledger_inventory::{
    InventoryLot, LotEvent, LotReceived, NewLot, QuantityChange, QuantityChanged,
};
use lotledger_production::{
    ConversionRequest, InventoryConverted, ProductionEvent, ProductionRun, SourceDrawn,
    plan_conversion,
};

use super::{AuditTrail, LedgerResult, LotLedger, found};
use crate::store::{LedgerRead, LedgerStore, LedgerTx};

/// Result of a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionOutcome {
    pub destination: InventoryLot,
    /// One run per requested source, in request order.
    pub runs: Vec<ProductionRun>,
    /// One change per distinct source lot.
    pub draws: Vec<QuantityChange>,
}

impl<S, A> LotLedger<S, A>
where
    S: LedgerStore,
    A: AuditEmitter,
{
    /// Convert part of one source lot into a new lot of `output_product_id`.
    ///
    /// The destination inherits expiry, origin and grower from the source and
    /// records it as its parent.
    #[instrument(skip(self, actor, notes), fields(user_id = %actor.user_id))]
    pub async fn convert_inventory(
        &self,
        actor: &Actor,
        source_lot_id: LotId,
        quantity_consumed: Decimal,
        output_product_id: ProductId,
        quantity_produced: Decimal,
        notes: Option<String>,
    ) -> LedgerResult<ConversionOutcome> {
        let mut request = ConversionRequest::single(
            source_lot_id,
            quantity_consumed,
            output_product_id,
            quantity_produced,
        );
        request.notes = notes;
        let result = self.convert_tx(actor, &request).await;
        self.finish("convert_inventory", result)
    }

    /// Convert several source lots into one destination lot.
    ///
    /// Every source is checked before any is drawn down. The destination takes
    /// the earliest expiry among the sources and its parent, origin and grower
    /// from the first listed source. `quantity_produced` is split across the
    /// runs in proportion to what each source consumed.
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id, sources = request.sources.len()))]
    pub async fn batch_convert_inventory(
        &self,
        actor: &Actor,
        request: ConversionRequest,
    ) -> LedgerResult<ConversionOutcome> {
        let result = self.convert_tx(actor, &request).await;
        self.finish("batch_convert_inventory", result)
    }

    async fn convert_tx(
        &self,
        actor: &Actor,
        request: &ConversionRequest,
    ) -> LedgerResult<(ConversionOutcome, AuditTrail)> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let output = found(
            tx.product(request.output_product_id).await?,
            EntityKind::Product,
            request.output_product_id,
        )?;

        let mut lot_ids: Vec<LotId> = request.sources.iter().map(|s| s.lot_id).collect();
        lot_ids.sort();
        lot_ids.dedup();
        let mut sources: HashMap<LotId, InventoryLot> = HashMap::with_capacity(lot_ids.len());
        for id in lot_ids {
            if let Some(lot) = tx.lot_for_update(id).await? {
                sources.insert(id, lot);
            }
        }

        let plan = plan_conversion(request, &output, |id| sources.get(&id))?;

        let mut draws = Vec::with_capacity(plan.draws.len());
        for draw in &plan.draws {
            let lot = sources
                .get_mut(&draw.lot_id)
                .ok_or_else(|| DomainError::not_found(EntityKind::Lot, draw.lot_id))?;
            let change = lot.adjust_by(-draw.quantity)?;
            tx.update_lot(lot).await?;
            draws.push(change);
        }

        let sequence = tx.next_lot_sequence().await?;
        let destination = InventoryLot::receive(NewLot {
            id: LotId::new(),
            lot_number: self.lot_numbers.format(sequence),
            product_id: plan.destination.product_id,
            parent_lot_id: Some(plan.destination.parent_lot_id),
            quantity: plan.destination.quantity,
            received_on: now.date_naive(),
            expires_on: plan.destination.expires_on,
            origin_country: plan.destination.origin_country.clone(),
            grower_id: plan.destination.grower_id.clone(),
            created_at: now,
        })?;
        tx.insert_lot(&destination).await?;

        let mut runs = Vec::with_capacity(plan.runs.len());
        for planned in &plan.runs {
            let run = ProductionRun {
                id: ProductionRunId::new(),
                source_lot_id: planned.source_lot_id,
                destination_lot_id: destination.id,
                quantity_consumed: planned.quantity_consumed,
                quantity_produced: planned.quantity_produced,
                produced_by: actor.user_id,
                notes: plan.notes.clone(),
                created_at: now,
            };
            tx.insert_run(&run).await?;
            runs.push(run);
        }

        tx.commit().await?;
        info!(
            destination = %destination.lot_number,
            quantity = destination.quantity_current(),
            sources = runs.len(),
            "inventory converted"
        );

        let mut trail = AuditTrail::new(actor);
        for change in &draws {
            trail.push(LotEvent::QuantityChanged(QuantityChanged::from_change(
                change,
                "conversion",
                now,
            )));
        }
        trail.push(LotEvent::LotReceived(LotReceived {
            lot_id: destination.id,
            lot_number: destination.lot_number.clone(),
            product_id: destination.product_id,
            parent_lot_id: destination.parent_lot_id,
            quantity: destination.quantity_current(),
            expires_on: destination.expires_on,
            occurred_at: now,
        }));
        trail.push(ProductionEvent::InventoryConverted(InventoryConverted {
            destination_lot_id: destination.id,
            destination_lot_number: destination.lot_number.clone(),
            output_product_id: destination.product_id,
            destination_quantity: destination.quantity_current(),
            quantity_produced: request.quantity_produced,
            sources: runs
                .iter()
                .map(|run| SourceDrawn {
                    run_id: run.id,
                    lot_id: run.source_lot_id,
                    lot_number: sources
                        .get(&run.source_lot_id)
                        .map(|l| l.lot_number.clone())
                        .unwrap_or_default(),
                    quantity_consumed: run.quantity_consumed,
                    quantity_produced: run.quantity_produced,
                })
                .collect(),
            notes: plan.notes.clone(),
            occurred_at: now,
        }));

        let outcome = ConversionOutcome {
            destination,
            runs,
            draws,
        };
        Ok((outcome, trail))
    }
}
