use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use stockledger_core::{ItemMaster, ItemProfile, ItemRegistry};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Last aggregate published for an item.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStock {
    pub quantity: Decimal,
    pub value: Decimal,
    pub unit_price: Decimal,
    pub is_low_stock: bool,
}

#[derive(Default)]
pub struct InMemoryItemMaster {
    items: RwLock<HashMap<Uuid, ItemProfile>>,
    aggregates: RwLock<HashMap<Uuid, AggregateStock>>,
}

impl InMemoryItemMaster {
    pub async fn upsert_item(&self, item: ItemProfile) {
        let mut items = self.items.write().await;
        items.insert(item.id, item);
    }

    pub async fn aggregate(&self, item_id: Uuid) -> Option<AggregateStock> {
        let aggregates = self.aggregates.read().await;
        aggregates.get(&item_id).cloned()
    }
}

#[async_trait]
impl ItemMaster for InMemoryItemMaster {
    async fn get_item(&self, item_id: Uuid) -> anyhow::Result<Option<ItemProfile>> {
        let items = self.items.read().await;
        Ok(items.get(&item_id).cloned())
    }

    async fn set_aggregate_stock(
        &self,
        item_id: Uuid,
        quantity: Decimal,
        value: Decimal,
        unit_price: Decimal,
        is_low_stock: bool,
    ) -> anyhow::Result<()> {
        let mut aggregates = self.aggregates.write().await;
        aggregates.insert(
            item_id,
            AggregateStock {
                quantity,
                value,
                unit_price,
                is_low_stock,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ItemRegistry for InMemoryItemMaster {
    async fn register_item(&self, item: ItemProfile) -> anyhow::Result<()> {
        self.upsert_item(item).await;
        Ok(())
    }
}
