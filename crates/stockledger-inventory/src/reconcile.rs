//! Full replay of an item's ledger. Used as the correctness backstop after edits,
//! deletes, back-dated postings and partially applied writes.

use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;
use stockledger_core::{
    CostLayer, DocumentType, ItemProfile, LayerSeed, LedgerEntry, StockResult, WarehouseBalance,
    average_price, sort_chronologically,
};
use uuid::Uuid;

use crate::engine::{inbound_seeds, seeds_value};
use crate::layers::{Consumption, apply_to_book, plan_consumption};
use crate::valuation::{Movement, OutflowCost, Position, value_movement};

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub item_id: Uuid,
    pub entries_replayed: usize,
    pub entries_rewritten: usize,
    pub final_balance: Decimal,
    pub final_value: Decimal,
    pub warehouses: Vec<WarehouseBalance>,
}

#[derive(Debug, Clone, Default)]
pub struct WarehouseState {
    pub quantity: Decimal,
    pub value: Decimal,
    book: Vec<CostLayer>,
}

impl WarehouseState {
    fn average_cost(&self) -> Decimal {
        average_price(self.quantity, self.value, Decimal::ZERO)
    }
}

/// Result of replaying a history from zero.
#[derive(Debug, Clone)]
pub struct Replay {
    /// Entries in chronological order with recomputed derived fields.
    pub entries: Vec<LedgerEntry>,
    pub rewritten: HashSet<Uuid>,
    pub warehouses: BTreeMap<String, WarehouseState>,
    pub layers: Vec<CostLayer>,
    pub position: Position,
    /// Warehouses whose balance dropped below zero at some point.
    pub negative_warehouses: Vec<String>,
}

pub fn replay(
    item: &ItemProfile,
    mut entries: Vec<LedgerEntry>,
    cost_scale: u32,
) -> StockResult<Replay> {
    sort_chronologically(&mut entries);

    let method = item.valuation_method;
    let mut position = Position::ZERO;
    let mut warehouses: BTreeMap<String, WarehouseState> = BTreeMap::new();
    let mut transfer_slices: HashMap<String, Vec<LayerSeed>> = HashMap::new();
    let mut rewritten = HashSet::new();
    let mut negative_warehouses: Vec<String> = Vec::new();

    for entry in &mut entries {
        let original = entry.clone();
        let prior = position;
        let state = warehouses.entry(entry.warehouse.clone()).or_default();

        let consumption = if entry.quantity_out > Decimal::ZERO {
            let fallback = if state.quantity > Decimal::ZERO {
                state.average_cost().round_dp(cost_scale)
            } else if entry.unit_price > Decimal::ZERO {
                entry.unit_price
            } else {
                item.unit_price
            };
            if method.is_layered() {
                let consumption =
                    plan_consumption(&state.book, method, entry.quantity_out, true, fallback)?;
                apply_to_book(&mut state.book, &consumption);
                Some(consumption)
            } else if entry.document_type == DocumentType::TransferOut {
                Some(Consumption::synthetic(entry.quantity_out, fallback))
            } else {
                None
            }
        } else {
            None
        };

        if let (Some(consumption), DocumentType::TransferOut, Some(reference)) =
            (&consumption, entry.document_type, &entry.reference)
        {
            transfer_slices.insert(reference.clone(), consumption.as_seeds());
        }

        let mut seeds = Vec::new();
        if entry.quantity_in > Decimal::ZERO {
            let linked = match (entry.document_type, &entry.reference) {
                (DocumentType::TransferIn, Some(reference)) => transfer_slices
                    .get(reference)
                    .map(|slices| take_slices(slices, entry.quantity_in)),
                _ => None,
            };
            if let Some(linked) = linked {
                entry.unit_price = (seeds_value(&linked) / entry.quantity_in).round_dp(cost_scale);
                entry.inbound_layers = linked;
            }
            seeds = inbound_seeds(entry);
        }

        let mut movement = Movement::new(entry.quantity_in, entry.quantity_out, entry.unit_price);
        if !seeds.is_empty() {
            movement = movement.with_inflow_value(seeds_value(&seeds));
        }
        let outflow = match &consumption {
            Some(consumption) => {
                entry.unit_price = consumption.unit_cost(cost_scale);
                OutflowCost::Consumed(consumption.total_cost)
            }
            None if method.is_layered() || entry.document_type.is_transfer() => {
                OutflowCost::Consumed(Decimal::ZERO)
            }
            None => OutflowCost::Average,
        };
        position = value_movement(prior, &movement, outflow, cost_scale);

        if method.is_layered() {
            for seed in &seeds {
                let mut layer = CostLayer::new(item.id, entry.warehouse.as_str(), seed, entry.date)?;
                layer.source_entry_id = Some(entry.id);
                state.book.push(layer);
            }
        }

        state.quantity += entry.net_quantity();
        state.value += position.value - prior.value;
        if state.quantity < Decimal::ZERO && !negative_warehouses.contains(&entry.warehouse) {
            negative_warehouses.push(entry.warehouse.clone());
        }

        entry.running_balance = position.balance;
        entry.running_value = position.value;
        entry.average_price = position.average_price(entry.unit_price).round_dp(cost_scale);

        if *entry != original {
            rewritten.insert(entry.id);
        }
    }

    let layers = warehouses
        .values()
        .flat_map(|state| state.book.iter().cloned())
        .collect();

    Ok(Replay {
        entries,
        rewritten,
        warehouses,
        layers,
        position,
        negative_warehouses,
    })
}

/// Leading slices covering `quantity`; a shortfall is priced like the last slice.
pub(crate) fn take_slices(slices: &[LayerSeed], quantity: Decimal) -> Vec<LayerSeed> {
    let mut remaining = quantity;
    let mut taken = Vec::new();
    for slice in slices {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(slice.quantity);
        if take > Decimal::ZERO {
            taken.push(LayerSeed {
                quantity: take,
                ..slice.clone()
            });
            remaining -= take;
        }
    }
    if remaining > Decimal::ZERO {
        let unit_price = slices.last().map(|slice| slice.unit_price).unwrap_or_default();
        taken.push(LayerSeed::new(remaining, unit_price));
    }
    taken
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal_macros::dec;
    use stockledger_core::ValuationMethod;

    use super::*;

    fn item(method: ValuationMethod) -> ItemProfile {
        ItemProfile {
            id: Uuid::new_v4(),
            code: "SKU-1".to_string(),
            name: "Widget".to_string(),
            valuation_method: method,
            min_stock: dec!(0),
            max_stock: None,
            unit_price: dec!(1),
            allow_negative_stock: false,
        }
    }

    fn entry(
        item: &ItemProfile,
        document_type: DocumentType,
        quantity_in: Decimal,
        quantity_out: Decimal,
        unit_price: Decimal,
        date: DateTime<Utc>,
    ) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            sequence: 0,
            item_id: item.id,
            warehouse: "main".to_string(),
            document_type,
            document_number: format!("{}-1", document_type.prefix()),
            quantity_in,
            quantity_out,
            unit_price,
            running_balance: Decimal::ZERO,
            running_value: Decimal::ZERO,
            average_price: Decimal::ZERO,
            date,
            created_at: date,
            reference: None,
            notes: None,
            user_id: None,
            lot_number: None,
            expiration_date: None,
            inbound_layers: Vec::new(),
        }
    }

    #[test]
    fn replays_out_of_order_history_chronologically() {
        let item = item(ValuationMethod::Fifo);
        let start = Utc::now() - Duration::days(3);
        let history = vec![
            entry(&item, DocumentType::Issue, dec!(0), dec!(7), dec!(0), start + Duration::days(2)),
            entry(&item, DocumentType::Receipt, dec!(5), dec!(0), dec!(20), start + Duration::days(1)),
            entry(&item, DocumentType::Receipt, dec!(5), dec!(0), dec!(10), start),
        ];

        let replayed = replay(&item, history, 6).unwrap();
        let issue = &replayed.entries[2];
        assert_eq!(issue.running_balance, dec!(3));
        assert_eq!(issue.running_value, dec!(60));
        assert_eq!(issue.unit_price, dec!(12.857143));
        assert_eq!(replayed.position, Position::new(dec!(3), dec!(60)));
        assert!(replayed.negative_warehouses.is_empty());
    }

    #[test]
    fn second_replay_rewrites_nothing() {
        let item = item(ValuationMethod::WeightedAverage);
        let start = Utc::now() - Duration::days(3);
        let history = vec![
            entry(&item, DocumentType::Receipt, dec!(100), dec!(0), dec!(10), start),
            entry(&item, DocumentType::Receipt, dec!(50), dec!(0), dec!(14), start + Duration::hours(1)),
            entry(&item, DocumentType::Issue, dec!(0), dec!(60), dec!(0), start + Duration::hours(2)),
        ];

        let first = replay(&item, history, 6).unwrap();
        assert_eq!(first.rewritten.len(), 3);
        let second = replay(&item, first.entries.clone(), 6).unwrap();
        assert!(second.rewritten.is_empty());
        assert_eq!(second.position.balance, dec!(90));
        assert_eq!(second.position.value.round_dp(2), dec!(1020.00));
    }

    #[test]
    fn flags_warehouses_that_go_negative() {
        let item = item(ValuationMethod::WeightedAverage);
        let start = Utc::now();
        let history = vec![
            entry(&item, DocumentType::Issue, dec!(0), dec!(2), dec!(5), start),
            entry(&item, DocumentType::Receipt, dec!(5), dec!(0), dec!(5), start + Duration::hours(1)),
        ];
        let replayed = replay(&item, history, 6).unwrap();
        assert_eq!(replayed.negative_warehouses, vec!["main".to_string()]);
    }

    #[test]
    fn take_slices_truncates_and_extends() {
        let slices = vec![LayerSeed::new(dec!(3), dec!(10)), LayerSeed::new(dec!(4), dec!(20))];
        let partial = take_slices(&slices, dec!(5));
        assert_eq!(seeds_value(&partial), dec!(70));

        let extended = take_slices(&slices, dec!(9));
        assert_eq!(seeds_value(&extended), dec!(30) + dec!(80) + dec!(40));
    }
}
