use std::sync::Arc;

use stockledger_core::{ItemRegistry, StockResult};
use stockledger_inventory::InventoryEngine;
use stockledger_platform::{CommandEnvelope, CommandOutcome, InventoryCommand};
use tracing::warn;

/// Routes decoded commands to the engine.
pub struct Dispatcher {
    engine: InventoryEngine,
    registry: Arc<dyn ItemRegistry>,
}

impl Dispatcher {
    pub fn new(engine: InventoryEngine, registry: Arc<dyn ItemRegistry>) -> Self {
        Self { engine, registry }
    }

    pub async fn execute(&self, envelope: CommandEnvelope) -> CommandOutcome {
        match self.run(envelope.command.clone()).await {
            Ok(payload) => CommandOutcome::success(&envelope, payload),
            Err(err) => {
                warn!(
                    kind = err.kind().code(),
                    "command {} ({}) rejected: {}",
                    envelope.command_id,
                    envelope.command.name(),
                    err
                );
                CommandOutcome::failure(&envelope, &err)
            }
        }
    }

    async fn run(&self, command: InventoryCommand) -> StockResult<serde_json::Value> {
        let payload = match command {
            InventoryCommand::RegisterItem { item } => {
                self.registry.register_item(item.clone()).await?;
                serde_json::to_value(item)
            }
            InventoryCommand::AppendEntry { entry } => {
                serde_json::to_value(self.engine.append_ledger_entry(entry).await?)
            }
            InventoryCommand::UpdateEntry {
                entry_id,
                patch,
                actor,
            } => serde_json::to_value(
                self.engine
                    .update_ledger_entry(entry_id, patch, &actor)
                    .await?,
            ),
            InventoryCommand::DeleteEntry { entry_id, actor } => {
                serde_json::to_value(self.engine.delete_ledger_entry(entry_id, &actor).await?)
            }
            InventoryCommand::CreateTransfer { transfer, actor } => {
                serde_json::to_value(self.engine.create_transfer(transfer, &actor).await?)
            }
            InventoryCommand::TransferAction {
                transfer_id,
                action,
                actor,
            } => serde_json::to_value(
                self.engine
                    .execute_transfer_action(transfer_id, action, &actor)
                    .await?,
            ),
            InventoryCommand::ReconcileItem { item_id } => {
                serde_json::to_value(self.engine.reconcile_item(item_id).await?)
            }
            InventoryCommand::RecheckAlerts { item_id } => {
                serde_json::to_value(self.engine.recheck_alerts_for_item(item_id).await?)
            }
            InventoryCommand::ItemValuation { item_id } => {
                serde_json::to_value(self.engine.item_valuation(item_id).await?)
            }
        };

        Ok(payload.map_err(anyhow::Error::from)?)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use stockledger_core::{ItemProfile, ValuationMethod};
    use stockledger_inventory::{EngineConfig, NewLedgerEntry, Repositories};
    use stockledger_store::{
        InMemoryAlertRepository, InMemoryAuditSink, InMemoryBalanceRepository, InMemoryItemMaster,
        InMemoryLayerRepository, InMemoryLedgerRepository, InMemoryTransferRepository,
    };
    use uuid::Uuid;

    use super::*;

    fn dispatcher() -> Dispatcher {
        let items = Arc::new(InMemoryItemMaster::default());
        let repos = Repositories {
            ledger: Arc::new(InMemoryLedgerRepository::default()),
            layers: Arc::new(InMemoryLayerRepository::default()),
            balances: Arc::new(InMemoryBalanceRepository::default()),
            transfers: Arc::new(InMemoryTransferRepository::default()),
            alerts: Arc::new(InMemoryAlertRepository::default()),
            items: items.clone(),
            audit: Arc::new(InMemoryAuditSink::default()),
        };
        Dispatcher::new(InventoryEngine::new(repos, EngineConfig::default()), items)
    }

    fn envelope(command: InventoryCommand) -> CommandEnvelope {
        CommandEnvelope {
            command_id: Uuid::new_v4(),
            command,
        }
    }

    fn item() -> ItemProfile {
        ItemProfile {
            id: Uuid::new_v4(),
            code: "BOLT-M8".to_string(),
            name: "M8 bolt".to_string(),
            valuation_method: ValuationMethod::Fifo,
            min_stock: dec!(5),
            max_stock: Some(dec!(500)),
            unit_price: dec!(0.4),
            allow_negative_stock: false,
        }
    }

    #[tokio::test]
    async fn registers_item_then_posts_receipt() {
        let dispatcher = dispatcher();
        let item = item();

        let registered = dispatcher
            .execute(envelope(InventoryCommand::RegisterItem { item: item.clone() }))
            .await;
        assert!(registered.ok);

        let posted = dispatcher
            .execute(envelope(InventoryCommand::AppendEntry {
                entry: NewLedgerEntry::receipt(item.id, "main", dec!(40), dec!(0.35)),
            }))
            .await;
        assert!(posted.ok, "{:?}", posted.message);

        let valuation = dispatcher
            .execute(envelope(InventoryCommand::ItemValuation { item_id: item.id }))
            .await;
        let payload = valuation.payload.unwrap();
        let quantity: Decimal = serde_json::from_value(payload["quantity"].clone()).unwrap();
        assert_eq!(quantity, dec!(40));
    }

    #[tokio::test]
    async fn engine_errors_become_failed_outcomes() {
        let dispatcher = dispatcher();
        let outcome = dispatcher
            .execute(envelope(InventoryCommand::ReconcileItem {
                item_id: Uuid::new_v4(),
            }))
            .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.kind.as_deref(), Some("not_found"));
        assert!(outcome.payload.is_none());
    }
}
