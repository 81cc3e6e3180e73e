use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use stockledger_core::{
    BalanceRepository, ItemMaster, ItemProfile, StockResult, WarehouseBalance, average_price,
};
use tracing::debug;
use uuid::Uuid;

/// Item-wide sum over every warehouse balance row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemTotal {
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub value: Decimal,
    pub unit_price: Decimal,
    pub is_low_stock: bool,
}

pub struct BalanceAggregator {
    balances: Arc<dyn BalanceRepository>,
    items: Arc<dyn ItemMaster>,
}

impl BalanceAggregator {
    pub fn new(balances: Arc<dyn BalanceRepository>, items: Arc<dyn ItemMaster>) -> Self {
        Self { balances, items }
    }

    /// Current row, or an empty balance when the pair has never been touched.
    pub async fn balance(&self, item_id: Uuid, warehouse: &str) -> StockResult<WarehouseBalance> {
        Ok(self
            .balances
            .get(item_id, warehouse)
            .await?
            .unwrap_or_else(|| WarehouseBalance::empty(item_id, warehouse, Utc::now())))
    }

    pub async fn apply_delta(
        &self,
        item_id: Uuid,
        warehouse: &str,
        delta_quantity: Decimal,
        delta_value: Decimal,
    ) -> StockResult<WarehouseBalance> {
        let balance = self
            .balances
            .upsert_delta(item_id, warehouse, delta_quantity, delta_value, Utc::now())
            .await?;
        debug!(
            "balance {}@{} moved by {} / {} to {} / {}",
            item_id, warehouse, delta_quantity, delta_value, balance.quantity, balance.total_value
        );
        Ok(balance)
    }

    pub async fn list_for_item(&self, item_id: Uuid) -> StockResult<Vec<WarehouseBalance>> {
        Ok(self.balances.list_for_item(item_id).await?)
    }

    pub async fn replace_for_item(
        &self,
        item_id: Uuid,
        balances: Vec<WarehouseBalance>,
    ) -> StockResult<()> {
        Ok(self.balances.replace_for_item(item_id, balances).await?)
    }

    /// Sums every warehouse row and republishes the figure to the item master.
    pub async fn recompute_item_total(&self, item: &ItemProfile) -> StockResult<ItemTotal> {
        let rows = self.balances.list_for_item(item.id).await?;
        let quantity: Decimal = rows.iter().map(|row| row.quantity).sum();
        let value: Decimal = rows.iter().map(|row| row.total_value).sum();

        let total = ItemTotal {
            item_id: item.id,
            quantity,
            value,
            unit_price: average_price(quantity, value, item.unit_price),
            is_low_stock: quantity <= item.min_stock,
        };

        self.items
            .set_aggregate_stock(
                item.id,
                total.quantity,
                total.value,
                total.unit_price,
                total.is_low_stock,
            )
            .await?;

        Ok(total)
    }
}
