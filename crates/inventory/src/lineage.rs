//! Conversion lineage: walk `parent_lot_id` links back to the received lot.

use std::collections::HashSet;

use lotledger_core::LotId;

use crate::lot::InventoryLot;

/// Collect `start` and its ancestors, nearest first.
///
/// `lookup` resolves a lot by id. Walking stops at a lot with no parent, at a
/// parent that cannot be resolved, or on a repeated id.
pub fn trace_lineage<'a, F>(start: &'a InventoryLot, mut lookup: F) -> Vec<&'a InventoryLot>
where
    F: FnMut(LotId) -> Option<&'a InventoryLot>,
{
    let mut chain = vec![start];
    let mut seen: HashSet<LotId> = HashSet::from([start.id]);
    let mut cursor = start.parent_lot_id;

    while let Some(parent_id) = cursor {
        if !seen.insert(parent_id) {
            break;
        }
        match lookup(parent_id) {
            Some(parent) => {
                chain.push(parent);
                cursor = parent.parent_lot_id;
            }
            None => break,
        }
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lot::NewLot;
    use chrono::{NaiveDate, Utc};
    use lotledger_core::ProductId;
    use std::collections::HashMap;

    fn child_of(parent: Option<LotId>, number: &str) -> InventoryLot {
        let day = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        InventoryLot::receive(NewLot {
            id: LotId::new(),
            lot_number: number.to_string(),
            product_id: ProductId::new(),
            parent_lot_id: parent,
            quantity: 5,
            received_on: day,
            expires_on: day,
            origin_country: None,
            grower_id: None,
            created_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn walks_back_to_the_root() {
        let root = child_of(None, "L1");
        let mid = child_of(Some(root.id), "L2");
        let leaf = child_of(Some(mid.id), "L3");
        let by_id: HashMap<LotId, &InventoryLot> =
            [(root.id, &root), (mid.id, &mid)].into_iter().collect();

        let chain = trace_lineage(&leaf, |id| by_id.get(&id).copied());
        let numbers: Vec<&str> = chain.iter().map(|l| l.lot_number.as_str()).collect();
        assert_eq!(numbers, vec!["L3", "L2", "L1"]);
    }

    #[test]
    fn stops_on_missing_parent() {
        let orphan = child_of(Some(LotId::new()), "L9");
        let chain = trace_lineage(&orphan, |_| None);
        assert_eq!(chain.len(), 1);
    }
}
