use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use stockledger_core::{
    ActorContext, AuditRecord, DocumentType, ItemProfile, LayerSeed, LedgerEntry, NewTransfer,
    StockError, StockResult, Transfer, TransferAction, TransferMode, TransferStatus,
};
use tracing::info;
use uuid::Uuid;

use crate::engine::InventoryEngine;
use crate::layers::Consumption;
use crate::ledger::{Costing, NewLedgerEntry};
use crate::reconcile::take_slices;

/// Source side of one approved line.
enum SourceLeg {
    /// Posted by an earlier attempt that did not finish.
    Posted(LedgerEntry),
    Planned(Consumption),
}

impl InventoryEngine {
    pub async fn create_transfer(
        &self,
        input: NewTransfer,
        actor: &ActorContext,
    ) -> StockResult<Transfer> {
        let count = self.transfers.count().await?;
        let transfer = Transfer::new(
            format!("TRF-{:06}", count + 1),
            input,
            Some(actor.actor_id.clone()),
            Utc::now(),
        )?;
        for item_id in transfer.item_ids() {
            self.load_item(item_id).await?;
        }

        let transfer = self.transfers.insert(transfer).await?;
        info!(
            "created transfer {} from {} to {} with {} lines",
            transfer.transfer_number,
            transfer.from_warehouse,
            transfer.to_warehouse,
            transfer.items.len()
        );

        self.record_audit(AuditRecord::new(
            "transfer",
            transfer.id,
            "transfer.create",
            actor,
            None,
            Some(snapshot(&transfer)),
        ))
        .await;

        Ok(transfer)
    }

    /// Runs approve, receive or cancel under the locks of every item on the transfer.
    pub async fn execute_transfer_action(
        &self,
        transfer_id: Uuid,
        action: TransferAction,
        actor: &ActorContext,
    ) -> StockResult<Transfer> {
        let item_ids = self.transfer(transfer_id).await?.item_ids();
        let _guard = self.locks.lock_many(&item_ids).await;

        let mut transfer = self.transfer(transfer_id).await?;
        transfer.ensure_action_allowed(action)?;

        let mut items = HashMap::with_capacity(item_ids.len());
        for item_id in &item_ids {
            items.insert(*item_id, self.load_item(*item_id).await?);
        }

        let before = snapshot(&transfer);
        let touched = match action {
            TransferAction::Approve => {
                self.approve_locked(&mut transfer, &items, actor).await?;
                match transfer.mode {
                    TransferMode::Simple => transfer.to_warehouse.clone(),
                    TransferMode::TwoStage => transfer.from_warehouse.clone(),
                }
            }
            TransferAction::Receive => {
                self.receive_locked(&mut transfer, &items, actor).await?;
                transfer.to_warehouse.clone()
            }
            TransferAction::Cancel => {
                self.cancel_locked(&mut transfer, &items, actor).await?;
                transfer.from_warehouse.clone()
            }
        };

        transfer.updated_at = Utc::now();
        self.transfers.update(&transfer).await?;

        for item_id in &item_ids {
            if let Some(item) = items.get(item_id) {
                self.refresh_item(item, Some(&touched)).await?;
            }
        }

        info!(
            "transfer {} {}: now {}",
            transfer.transfer_number, action, transfer.status
        );
        self.record_audit(AuditRecord::new(
            "transfer",
            transfer.id,
            &format!("transfer.{action}"),
            actor,
            Some(before),
            Some(snapshot(&transfer)),
        ))
        .await;

        Ok(transfer)
    }

    async fn approve_locked(
        &self,
        transfer: &mut Transfer,
        items: &HashMap<Uuid, ItemProfile>,
        actor: &ActorContext,
    ) -> StockResult<()> {
        let scale = self.config.cost_scale;

        // every line is checked before anything is written
        let mut legs = Vec::with_capacity(transfer.items.len());
        for line in &transfer.items {
            let item = line_item(items, line.item_id)?;
            let posted = self
                .ledger
                .find_by_reference(
                    item.id,
                    &transfer.from_warehouse,
                    DocumentType::TransferOut,
                    &transfer.transfer_ref,
                )
                .await?;
            if let Some(entry) = posted {
                legs.push(SourceLeg::Posted(entry));
                continue;
            }

            let stock = self.balances.balance(item.id, &transfer.from_warehouse).await?;
            if !item.allow_negative_stock && stock.quantity < line.quantity {
                return Err(StockError::Consistency(format!(
                    "transfer {} needs {} of {} in {} but only {} is on hand",
                    transfer.transfer_number,
                    line.quantity,
                    item.code,
                    transfer.from_warehouse,
                    stock.quantity
                )));
            }

            let fallback = if stock.quantity > Decimal::ZERO {
                stock.average_cost().round_dp(scale)
            } else if line.unit_price > Decimal::ZERO {
                line.unit_price
            } else {
                item.unit_price
            };
            let consumption = if item.valuation_method.is_layered() {
                self.layers
                    .plan(
                        item.id,
                        &transfer.from_warehouse,
                        item.valuation_method,
                        line.quantity,
                        item.allow_negative_stock,
                        fallback,
                    )
                    .await?
            } else {
                Consumption::synthetic(line.quantity, fallback)
            };
            legs.push(SourceLeg::Planned(consumption));
        }

        let header = transfer.clone();
        for (line, leg) in transfer.items.iter_mut().zip(legs) {
            let item = line_item(items, line.item_id)?;
            let slices = match leg {
                SourceLeg::Posted(entry) => {
                    line.unit_price = entry.unit_price;
                    line.total_value = entry.quantity_out * entry.unit_price;
                    if line.consumed_layers.is_empty() {
                        vec![LayerSeed::new(entry.quantity_out, entry.unit_price)]
                    } else {
                        line.consumed_layers.clone()
                    }
                }
                SourceLeg::Planned(consumption) => {
                    let leg = transfer_leg(
                        &header,
                        item.id,
                        &header.from_warehouse,
                        DocumentType::TransferOut,
                        line.quantity,
                        Decimal::ZERO,
                        actor,
                    );
                    let entry = self
                        .post_locked(item, leg, Costing::Outbound(consumption.clone()))
                        .await?;
                    line.unit_price = entry.unit_price;
                    line.total_value = consumption.total_cost;
                    consumption.as_seeds()
                }
            };
            line.consumed_layers = slices.clone();

            match header.mode {
                TransferMode::Simple => {
                    self.post_inbound(
                        &header,
                        item,
                        &header.to_warehouse,
                        line.quantity,
                        line.unit_price,
                        slices,
                        actor,
                    )
                    .await?;
                }
                TransferMode::TwoStage => {
                    transfer.in_transit.insert(line.item_id, line.quantity);
                }
            }
        }

        let now = Utc::now();
        transfer.approved_by = Some(actor.actor_id.clone());
        transfer.approved_at = Some(now);
        match transfer.mode {
            TransferMode::Simple => {
                transfer.status = TransferStatus::Completed;
                transfer.received_by = Some(actor.actor_id.clone());
                transfer.received_at = Some(now);
            }
            TransferMode::TwoStage => transfer.status = TransferStatus::InTransit,
        }
        Ok(())
    }

    async fn receive_locked(
        &self,
        transfer: &mut Transfer,
        items: &HashMap<Uuid, ItemProfile>,
        actor: &ActorContext,
    ) -> StockResult<()> {
        let header = transfer.clone();
        for line in &header.items {
            let item = line_item(items, line.item_id)?;
            let Some(quantity) = header.in_transit.get(&line.item_id).copied() else {
                continue;
            };
            self.post_inbound(
                &header,
                item,
                &header.to_warehouse,
                quantity,
                line.unit_price,
                recorded_slices(line.unit_price, &line.consumed_layers, quantity),
                actor,
            )
            .await?;
        }

        transfer.in_transit.clear();
        transfer.status = TransferStatus::Completed;
        transfer.received_by = Some(actor.actor_id.clone());
        transfer.received_at = Some(Utc::now());
        Ok(())
    }

    /// From draft or pending nothing has moved. From in transit the goods are booked
    /// back into the source warehouse at the cost they left with.
    async fn cancel_locked(
        &self,
        transfer: &mut Transfer,
        items: &HashMap<Uuid, ItemProfile>,
        actor: &ActorContext,
    ) -> StockResult<()> {
        if transfer.status == TransferStatus::InTransit {
            let header = transfer.clone();
            for line in &header.items {
                let item = line_item(items, line.item_id)?;
                let Some(quantity) = header.in_transit.get(&line.item_id).copied() else {
                    continue;
                };
                self.post_inbound(
                    &header,
                    item,
                    &header.from_warehouse,
                    quantity,
                    line.unit_price,
                    recorded_slices(line.unit_price, &line.consumed_layers, quantity),
                    actor,
                )
                .await?;
            }
            transfer.in_transit.clear();
        }

        transfer.status = TransferStatus::Cancelled;
        transfer.cancelled_by = Some(actor.actor_id.clone());
        transfer.cancelled_at = Some(Utc::now());
        Ok(())
    }

    /// Posts a TRANSFER_IN unless one with the transfer's reference already exists there.
    #[allow(clippy::too_many_arguments)]
    async fn post_inbound(
        &self,
        transfer: &Transfer,
        item: &ItemProfile,
        warehouse: &str,
        quantity: Decimal,
        unit_price: Decimal,
        slices: Vec<LayerSeed>,
        actor: &ActorContext,
    ) -> StockResult<()> {
        let posted = self
            .ledger
            .find_by_reference(
                item.id,
                warehouse,
                DocumentType::TransferIn,
                &transfer.transfer_ref,
            )
            .await?;
        if posted.is_some() {
            info!(
                "transfer {} already booked {} into {}",
                transfer.transfer_number, item.code, warehouse
            );
            return Ok(());
        }

        let leg = transfer_leg(
            transfer,
            item.id,
            warehouse,
            DocumentType::TransferIn,
            quantity,
            unit_price,
            actor,
        );
        self.post_locked(item, leg, Costing::Inbound(slices)).await?;
        Ok(())
    }
}

fn line_item(items: &HashMap<Uuid, ItemProfile>, item_id: Uuid) -> StockResult<&ItemProfile> {
    items
        .get(&item_id)
        .ok_or_else(|| StockError::not_found("item", item_id))
}

fn recorded_slices(unit_price: Decimal, consumed: &[LayerSeed], quantity: Decimal) -> Vec<LayerSeed> {
    if consumed.is_empty() {
        vec![LayerSeed::new(quantity, unit_price)]
    } else {
        take_slices(consumed, quantity)
    }
}

fn transfer_leg(
    transfer: &Transfer,
    item_id: Uuid,
    warehouse: &str,
    document_type: DocumentType,
    quantity: Decimal,
    unit_price: Decimal,
    actor: &ActorContext,
) -> NewLedgerEntry {
    let mut leg = NewLedgerEntry::new(item_id, warehouse, document_type)
        .with_reference(transfer.transfer_ref.clone());
    if document_type == DocumentType::TransferOut {
        leg.quantity_out = quantity;
    } else {
        leg.quantity_in = quantity;
    }
    leg.unit_price = unit_price;
    leg.notes = Some(format!(
        "{} {} -> {}",
        transfer.transfer_number, transfer.from_warehouse, transfer.to_warehouse
    ));
    leg.user_id = Some(actor.actor_id.clone());
    leg
}

fn snapshot(transfer: &Transfer) -> serde_json::Value {
    json!({
        "status": transfer.status,
        "items": transfer.items,
        "in_transit": transfer.in_transit,
    })
}
