use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use stockledger_core::{AlertRepository, StockAlert};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryAlertRepository {
    alerts: RwLock<HashMap<Uuid, StockAlert>>,
}

#[async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn active_for_item(&self, item_id: Uuid) -> anyhow::Result<Option<StockAlert>> {
        let alerts = self.alerts.read().await;
        Ok(alerts
            .values()
            .filter(|alert| alert.item_id == item_id && alert.is_active())
            .max_by_key(|alert| alert.created_at)
            .cloned())
    }

    async fn insert(&self, alert: StockAlert) -> anyhow::Result<StockAlert> {
        let mut alerts = self.alerts.write().await;
        anyhow::ensure!(
            !(alert.is_active()
                && alerts
                    .values()
                    .any(|existing| existing.item_id == alert.item_id && existing.is_active())),
            "item {} already has an active alert",
            alert.item_id
        );
        alerts.insert(alert.id, alert.clone());
        Ok(alert)
    }

    async fn update(&self, alert: &StockAlert) -> anyhow::Result<()> {
        let mut alerts = self.alerts.write().await;
        let slot = alerts
            .get_mut(&alert.id)
            .with_context(|| format!("stock alert {} does not exist", alert.id))?;
        *slot = alert.clone();
        Ok(())
    }

    async fn list_for_item(&self, item_id: Uuid) -> anyhow::Result<Vec<StockAlert>> {
        let alerts = self.alerts.read().await;
        let mut found: Vec<StockAlert> = alerts
            .values()
            .filter(|alert| alert.item_id == item_id)
            .cloned()
            .collect();
        found.sort_by_key(|alert| alert.created_at);
        Ok(found)
    }
}
