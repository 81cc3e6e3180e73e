use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use stockledger_core::{
    ActorContext, AlertRepository, AuditRecord, AuditSink, BalanceRepository, CostLayer,
    DocumentType, ErrorKind, ItemMaster, ItemProfile, LayerRepository, LayerSeed, LedgerEntry,
    LedgerRepository, StockAlert, StockError, StockResult, Transfer, TransferRepository,
    ValuationMethod, WarehouseBalance, average_price,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::AlertEngine;
use crate::balances::{BalanceAggregator, ItemTotal};
use crate::config::EngineConfig;
use crate::layers::{Consumption, CostLayerStore};
use crate::ledger::{Costing, LedgerEntryPatch, LedgerStore, NewLedgerEntry};
use crate::locks::ItemLocks;
use crate::reconcile::{ReconcileReport, replay};
use crate::valuation::{Movement, OutflowCost, value_movement};

/// Storage collaborators injected into the engine.
#[derive(Clone)]
pub struct Repositories {
    pub ledger: Arc<dyn LedgerRepository>,
    pub layers: Arc<dyn LayerRepository>,
    pub balances: Arc<dyn BalanceRepository>,
    pub transfers: Arc<dyn TransferRepository>,
    pub alerts: Arc<dyn AlertRepository>,
    pub items: Arc<dyn ItemMaster>,
    pub audit: Arc<dyn AuditSink>,
}

/// Valuation snapshot of one item across every warehouse.
#[derive(Debug, Clone, Serialize)]
pub struct ItemValuation {
    pub item_id: Uuid,
    pub code: String,
    pub method: ValuationMethod,
    pub warehouses: Vec<WarehouseBalance>,
    pub quantity: Decimal,
    pub value: Decimal,
    pub average_cost: Decimal,
    pub open_layers: Vec<CostLayer>,
    pub active_alert: Option<StockAlert>,
}

pub struct InventoryEngine {
    pub(crate) ledger: LedgerStore,
    pub(crate) layers: CostLayerStore,
    pub(crate) balances: BalanceAggregator,
    pub(crate) alerts: AlertEngine,
    pub(crate) transfers: Arc<dyn TransferRepository>,
    items: Arc<dyn ItemMaster>,
    audit: Arc<dyn AuditSink>,
    pub(crate) locks: ItemLocks,
    pub(crate) config: EngineConfig,
}

impl InventoryEngine {
    pub fn new(repos: Repositories, config: EngineConfig) -> Self {
        Self {
            ledger: LedgerStore::new(repos.ledger),
            layers: CostLayerStore::new(repos.layers),
            balances: BalanceAggregator::new(repos.balances, repos.items.clone()),
            alerts: AlertEngine::new(repos.alerts),
            transfers: repos.transfers,
            items: repos.items,
            audit: repos.audit,
            locks: ItemLocks::default(),
            config,
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Posts one movement: values it against the item's latest position, persists the
    /// entry, then updates layers, the warehouse balance, the item aggregate and alerts.
    pub async fn append_ledger_entry(&self, input: NewLedgerEntry) -> StockResult<LedgerEntry> {
        input.validate()?;
        let actor = input
            .user_id
            .clone()
            .map(ActorContext::new)
            .unwrap_or_else(ActorContext::system);

        let _guard = self.locks.lock(input.item_id).await;
        let item = self.load_item(input.item_id).await?;
        let latest_date = self.ledger.latest(item.id).await?.map(|entry| entry.date);

        let back_dated = input
            .date
            .zip(latest_date)
            .is_some_and(|(date, latest)| date < latest);
        if back_dated && input.quantity_out > Decimal::ZERO {
            let mut history = self.ledger.history(item.id).await?;
            history.push(input.draft(item.id, Utc::now()));
            self.ensure_history_feasible(&item, history)?;
        }

        let entry = self.post_locked(&item, input, Costing::Standard).await?;
        let entry = if latest_date.is_some_and(|latest| entry.date < latest) {
            info!(
                "back-dated {} {} for item {}, reconciling",
                entry.document_type, entry.document_number, item.code
            );
            self.rebuild_locked(&item, Some(&entry.warehouse)).await?;
            self.ledger.get(entry.id).await?
        } else {
            self.refresh_item(&item, Some(&entry.warehouse)).await?;
            entry
        };

        self.record_audit(AuditRecord::new(
            "ledger_entry",
            entry.id,
            "ledger.append",
            &actor,
            None,
            serde_json::to_value(&entry).ok(),
        ))
        .await;

        Ok(entry)
    }

    /// Applies `patch` to a posted entry and rebuilds the item's history.
    pub async fn update_ledger_entry(
        &self,
        entry_id: Uuid,
        patch: LedgerEntryPatch,
        actor: &ActorContext,
    ) -> StockResult<LedgerEntry> {
        let item_id = self.ledger.get(entry_id).await?.item_id;
        let _guard = self.locks.lock(item_id).await;
        let item = self.load_item(item_id).await?;

        let before = self.ledger.get(entry_id).await?;
        let mut entry = before.clone();
        patch.apply_to(&mut entry)?;
        ensure_layered_shape(&item, entry.quantity_in, entry.quantity_out)?;

        let mut history = self.ledger.history(item.id).await?;
        if let Some(slot) = history.iter_mut().find(|existing| existing.id == entry_id) {
            *slot = entry.clone();
        }
        self.ensure_history_feasible(&item, history)?;

        self.ledger.update(&entry).await?;
        self.rebuild_locked(&item, Some(&entry.warehouse)).await?;
        let entry = self.ledger.get(entry_id).await?;

        self.record_audit(AuditRecord::new(
            "ledger_entry",
            entry.id,
            "ledger.update",
            actor,
            serde_json::to_value(&before).ok(),
            serde_json::to_value(&entry).ok(),
        ))
        .await;

        Ok(entry)
    }

    /// Removes a posted entry and rebuilds the item's history.
    pub async fn delete_ledger_entry(
        &self,
        entry_id: Uuid,
        actor: &ActorContext,
    ) -> StockResult<ReconcileReport> {
        let item_id = self.ledger.get(entry_id).await?.item_id;
        let _guard = self.locks.lock(item_id).await;
        let item = self.load_item(item_id).await?;

        let entry = self.ledger.get(entry_id).await?;
        let history: Vec<LedgerEntry> = self
            .ledger
            .history(item.id)
            .await?
            .into_iter()
            .filter(|existing| existing.id != entry_id)
            .collect();
        self.ensure_history_feasible(&item, history)?;

        let removed = self.ledger.delete(entry_id).await?;
        let report = self.rebuild_locked(&item, Some(&entry.warehouse)).await?;

        self.record_audit(AuditRecord::new(
            "ledger_entry",
            removed.id,
            "ledger.delete",
            actor,
            serde_json::to_value(&removed).ok(),
            None,
        ))
        .await;

        Ok(report)
    }

    pub async fn reconcile_item(&self, item_id: Uuid) -> StockResult<ReconcileReport> {
        let _guard = self.locks.lock(item_id).await;
        let item = self.load_item(item_id).await?;
        self.rebuild_locked(&item, None).await
    }

    /// Republishes the aggregate and brings the item's alert in line with it.
    pub async fn recheck_alerts_for_item(&self, item_id: Uuid) -> StockResult<Option<StockAlert>> {
        let _guard = self.locks.lock(item_id).await;
        let item = self.load_item(item_id).await?;
        let total = self.balances.recompute_item_total(&item).await?;
        self.alerts.recheck(&item, None, total.quantity).await
    }

    pub async fn item_valuation(&self, item_id: Uuid) -> StockResult<ItemValuation> {
        let item = self.load_item(item_id).await?;
        let warehouses = self.balances.list_for_item(item_id).await?;
        let quantity: Decimal = warehouses.iter().map(|row| row.quantity).sum();
        let value: Decimal = warehouses.iter().map(|row| row.total_value).sum();
        let open_layers = self
            .layers
            .list_for_item(item_id)
            .await?
            .into_iter()
            .filter(|layer| !layer.is_exhausted())
            .collect();

        Ok(ItemValuation {
            item_id,
            code: item.code.clone(),
            method: item.valuation_method,
            warehouses,
            quantity,
            value,
            average_cost: average_price(quantity, value, item.unit_price)
                .round_dp(self.config.cost_scale),
            open_layers,
            active_alert: self.alerts.active(item_id).await?,
        })
    }

    pub async fn ledger_history(&self, item_id: Uuid) -> StockResult<Vec<LedgerEntry>> {
        self.ledger.history(item_id).await
    }

    pub async fn active_alert(&self, item_id: Uuid) -> StockResult<Option<StockAlert>> {
        self.alerts.active(item_id).await
    }

    pub async fn alert_history(&self, item_id: Uuid) -> StockResult<Vec<StockAlert>> {
        self.alerts.history(item_id).await
    }

    pub async fn transfer(&self, transfer_id: Uuid) -> StockResult<Transfer> {
        self.transfers
            .get(transfer_id)
            .await?
            .ok_or_else(|| StockError::not_found("transfer", transfer_id))
    }

    pub(crate) async fn load_item(&self, item_id: Uuid) -> StockResult<ItemProfile> {
        self.items
            .get_item(item_id)
            .await?
            .ok_or_else(|| StockError::not_found("item", item_id))
    }

    /// Values and persists one entry plus its layer and balance effects.
    /// Caller holds the item lock and republishes the item afterwards.
    pub(crate) async fn post_locked(
        &self,
        item: &ItemProfile,
        input: NewLedgerEntry,
        costing: Costing,
    ) -> StockResult<LedgerEntry> {
        ensure_layered_shape(item, input.quantity_in, input.quantity_out)?;

        let warehouse = input.warehouse.trim().to_string();
        let method = item.valuation_method;
        let scale = self.config.cost_scale;

        let prior = self.ledger.latest_position(item.id).await?;
        let stock = self.balances.balance(item.id, &warehouse).await?;

        if input.quantity_out > Decimal::ZERO
            && !item.allow_negative_stock
            && input.quantity_out > stock.quantity + input.quantity_in
        {
            return Err(StockError::Consistency(format!(
                "{} needs {} in {} but only {} is on hand",
                item.code, input.quantity_out, warehouse, stock.quantity
            )));
        }

        let mut movement = Movement::new(input.quantity_in, input.quantity_out, input.unit_price);
        let mut unit_price = input.unit_price;
        let mut inbound_layers = Vec::new();

        let consumption = match costing {
            Costing::Outbound(consumption) => Some(consumption),
            Costing::Inbound(seeds) => {
                movement = movement.with_inflow_value(seeds_value(&seeds));
                inbound_layers = seeds;
                None
            }
            Costing::Standard if input.quantity_out > Decimal::ZERO => {
                let fallback = if stock.quantity > Decimal::ZERO {
                    stock.average_cost().round_dp(scale)
                } else if input.unit_price > Decimal::ZERO {
                    input.unit_price
                } else {
                    item.unit_price
                };
                if method.is_layered() {
                    Some(
                        self.layers
                            .plan(
                                item.id,
                                &warehouse,
                                method,
                                input.quantity_out,
                                item.allow_negative_stock,
                                fallback,
                            )
                            .await?,
                    )
                } else if input.document_type == DocumentType::TransferOut {
                    Some(Consumption::synthetic(input.quantity_out, fallback))
                } else {
                    None
                }
            }
            Costing::Standard => None,
        };

        let outflow = match &consumption {
            Some(consumption) => {
                unit_price = consumption.unit_cost(scale);
                OutflowCost::Consumed(consumption.total_cost)
            }
            None if method.is_layered() || input.document_type.is_transfer() => {
                OutflowCost::Consumed(Decimal::ZERO)
            }
            None => OutflowCost::Average,
        };
        let position = value_movement(prior, &movement, outflow, scale);

        let document_number = match input.document_number {
            Some(number) if !number.trim().is_empty() => number,
            _ => self.ledger.document_number(input.document_type).await?,
        };
        let now = Utc::now();
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            sequence: 0,
            item_id: item.id,
            warehouse: warehouse.clone(),
            document_type: input.document_type,
            document_number,
            quantity_in: input.quantity_in,
            quantity_out: input.quantity_out,
            unit_price,
            running_balance: position.balance,
            running_value: position.value,
            average_price: position.average_price(unit_price).round_dp(scale),
            date: input.date.unwrap_or(now),
            created_at: now,
            reference: input.reference,
            notes: input.notes,
            user_id: input.user_id,
            lot_number: input.lot_number,
            expiration_date: input.expiration_date,
            inbound_layers,
        };
        let entry = self.ledger.insert(entry).await?;

        if let Some(consumption) = &consumption {
            self.layers.apply(consumption).await?;
        }
        if method.is_layered() && entry.quantity_in > Decimal::ZERO {
            for seed in inbound_seeds(&entry) {
                self.layers
                    .add_layer(item.id, &warehouse, &seed, entry.date, Some(entry.id))
                    .await?;
            }
        }

        self.balances
            .apply_delta(
                item.id,
                &warehouse,
                entry.net_quantity(),
                position.value - prior.value,
            )
            .await?;

        debug!(
            item = %item.code,
            warehouse = %warehouse,
            document = %entry.document_number,
            balance = %entry.running_balance,
            value = %entry.running_value,
            "ledger entry posted"
        );

        Ok(entry)
    }

    /// Recomputes the item aggregate and rechecks its alert.
    pub(crate) async fn refresh_item(
        &self,
        item: &ItemProfile,
        warehouse: Option<&str>,
    ) -> StockResult<ItemTotal> {
        let total = self.balances.recompute_item_total(item).await?;
        self.alerts.recheck(item, warehouse, total.quantity).await?;
        Ok(total)
    }

    /// Replays the item's whole history and overwrites every derived record.
    /// Caller holds the item lock.
    pub(crate) async fn rebuild_locked(
        &self,
        item: &ItemProfile,
        warehouse: Option<&str>,
    ) -> StockResult<ReconcileReport> {
        let history = self.ledger.history(item.id).await?;
        let replayed = replay(item, history, self.config.cost_scale)?;

        for entry in replayed
            .entries
            .iter()
            .filter(|entry| replayed.rewritten.contains(&entry.id))
        {
            self.ledger.update(entry).await?;
        }

        let now = Utc::now();
        let balances: Vec<WarehouseBalance> = replayed
            .warehouses
            .iter()
            .map(|(name, state)| WarehouseBalance {
                item_id: item.id,
                warehouse: name.clone(),
                quantity: state.quantity,
                total_value: state.value,
                last_updated: now,
            })
            .collect();
        self.balances.replace_for_item(item.id, balances.clone()).await?;
        self.layers
            .replace_for_item(item.id, replayed.layers.clone())
            .await?;
        self.refresh_item(item, warehouse).await?;

        let report = ReconcileReport {
            item_id: item.id,
            entries_replayed: replayed.entries.len(),
            entries_rewritten: replayed.rewritten.len(),
            final_balance: replayed.position.balance,
            final_value: replayed.position.value,
            warehouses: balances,
        };
        info!(
            "reconciled item {}: {} entries replayed, {} rewritten, balance {} value {}",
            item.code,
            report.entries_replayed,
            report.entries_rewritten,
            report.final_balance,
            report.final_value
        );
        Ok(report)
    }

    /// Rejects a candidate history that would take a warehouse below zero.
    fn ensure_history_feasible(
        &self,
        item: &ItemProfile,
        history: Vec<LedgerEntry>,
    ) -> StockResult<()> {
        if item.allow_negative_stock {
            return Ok(());
        }
        let replayed = replay(item, history, self.config.cost_scale)?;
        match replayed.negative_warehouses.first() {
            Some(warehouse) => Err(StockError::Consistency(format!(
                "change would take {} negative in {}",
                item.code, warehouse
            ))),
            None => Ok(()),
        }
    }

    /// Best effort; a failing sink never fails the mutation.
    pub(crate) async fn record_audit(&self, record: AuditRecord) {
        let action = record.action.clone();
        let entity_id = record.entity_id;
        if let Err(err) = self.audit.record(record).await {
            warn!(
                kind = ErrorKind::SinkFailure.code(),
                entity_id = %entity_id,
                "failed to record audit event {}: {err:#}",
                action
            );
        }
    }
}

fn ensure_layered_shape(
    item: &ItemProfile,
    quantity_in: Decimal,
    quantity_out: Decimal,
) -> StockResult<()> {
    if item.valuation_method.is_layered() && !quantity_in.is_zero() && !quantity_out.is_zero() {
        return Err(StockError::validation(
            "quantity_in",
            format!(
                "{} items take either an inflow or an outflow per entry",
                item.valuation_method
            ),
        ));
    }
    Ok(())
}

pub(crate) fn seeds_value(seeds: &[LayerSeed]) -> Decimal {
    seeds.iter().map(|seed| seed.quantity * seed.unit_price).sum()
}

/// Layers an inflow entry creates: its recorded slices, or one layer for the whole quantity.
pub(crate) fn inbound_seeds(entry: &LedgerEntry) -> Vec<LayerSeed> {
    if entry.inbound_layers.is_empty() {
        vec![LayerSeed {
            quantity: entry.quantity_in,
            unit_price: entry.unit_price,
            lot_number: entry.lot_number.clone(),
            expiration_date: entry.expiration_date,
        }]
    } else {
        entry
            .inbound_layers
            .iter()
            .filter(|seed| seed.quantity > Decimal::ZERO)
            .cloned()
            .collect()
    }
}
