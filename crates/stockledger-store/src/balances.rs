use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use stockledger_core::{BalanceRepository, WarehouseBalance};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryBalanceRepository {
    balances: RwLock<HashMap<(Uuid, String), WarehouseBalance>>,
}

#[async_trait]
impl BalanceRepository for InMemoryBalanceRepository {
    async fn get(&self, item_id: Uuid, warehouse: &str) -> anyhow::Result<Option<WarehouseBalance>> {
        let balances = self.balances.read().await;
        Ok(balances.get(&(item_id, warehouse.to_string())).cloned())
    }

    async fn upsert_delta(
        &self,
        item_id: Uuid,
        warehouse: &str,
        delta_quantity: Decimal,
        delta_value: Decimal,
        at: DateTime<Utc>,
    ) -> anyhow::Result<WarehouseBalance> {
        let mut balances = self.balances.write().await;
        let balance = balances
            .entry((item_id, warehouse.to_string()))
            .or_insert_with(|| WarehouseBalance::empty(item_id, warehouse, at));
        balance.quantity += delta_quantity;
        balance.total_value += delta_value;
        balance.last_updated = at;
        Ok(balance.clone())
    }

    async fn list_for_item(&self, item_id: Uuid) -> anyhow::Result<Vec<WarehouseBalance>> {
        let balances = self.balances.read().await;
        let mut rows: Vec<WarehouseBalance> = balances
            .values()
            .filter(|balance| balance.item_id == item_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.warehouse.cmp(&b.warehouse));
        Ok(rows)
    }

    async fn replace_for_item(
        &self,
        item_id: Uuid,
        replacement: Vec<WarehouseBalance>,
    ) -> anyhow::Result<()> {
        let mut balances = self.balances.write().await;
        balances.retain(|(owner, _), _| *owner != item_id);
        for balance in replacement {
            anyhow::ensure!(
                balance.item_id == item_id,
                "balance for {} belongs to item {}, not {item_id}",
                balance.warehouse,
                balance.item_id
            );
            balances.insert((item_id, balance.warehouse.clone()), balance);
        }
        Ok(())
    }
}
