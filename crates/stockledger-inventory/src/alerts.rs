use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use stockledger_core::{
    AlertRepository, AlertSeverity, AlertStatus, AlertType, ItemProfile, StockAlert, StockResult,
};
use tracing::info;
use uuid::Uuid;

/// Alert type and severity for a balance at or below the minimum, `None` above it.
pub fn classify(balance: Decimal, min_stock: Decimal) -> Option<(AlertType, AlertSeverity)> {
    if balance > min_stock {
        None
    } else if balance <= Decimal::ZERO {
        Some((AlertType::OutOfStock, AlertSeverity::Critical))
    } else {
        Some((AlertType::LowStock, AlertSeverity::Medium))
    }
}

fn alert_message(item: &ItemProfile, alert_type: AlertType, balance: Decimal) -> String {
    match alert_type {
        AlertType::OutOfStock => format!("{} ({}) is out of stock", item.name, item.code),
        AlertType::LowStock => format!(
            "{} ({}) is low on stock: {} left, minimum {}",
            item.name, item.code, balance, item.min_stock
        ),
    }
}

pub struct AlertEngine {
    alerts: Arc<dyn AlertRepository>,
}

impl AlertEngine {
    pub fn new(alerts: Arc<dyn AlertRepository>) -> Self {
        Self { alerts }
    }

    pub async fn active(&self, item_id: Uuid) -> StockResult<Option<StockAlert>> {
        Ok(self.alerts.active_for_item(item_id).await?)
    }

    pub async fn history(&self, item_id: Uuid) -> StockResult<Vec<StockAlert>> {
        Ok(self.alerts.list_for_item(item_id).await?)
    }

    /// Creates, updates in place, or resolves the item's single active alert so it
    /// matches `balance`. Returns the alert that was written, if any.
    pub async fn recheck(
        &self,
        item: &ItemProfile,
        warehouse: Option<&str>,
        balance: Decimal,
    ) -> StockResult<Option<StockAlert>> {
        let now = Utc::now();
        let active = self.alerts.active_for_item(item.id).await?;

        match (classify(balance, item.min_stock), active) {
            (Some((alert_type, severity)), None) => {
                let alert = StockAlert {
                    id: Uuid::new_v4(),
                    item_id: item.id,
                    warehouse: warehouse.map(str::to_string),
                    alert_type,
                    severity,
                    current_stock: balance,
                    min_stock: item.min_stock,
                    message: alert_message(item, alert_type, balance),
                    status: AlertStatus::Active,
                    resolution: None,
                    created_at: now,
                    updated_at: now,
                    resolved_at: None,
                };
                let alert = self.alerts.insert(alert).await?;
                info!("raised {:?} alert for item {} at {}", alert_type, item.code, balance);
                Ok(Some(alert))
            }
            (Some((alert_type, severity)), Some(mut alert)) => {
                if alert.current_stock == balance
                    && alert.alert_type == alert_type
                    && alert.min_stock == item.min_stock
                {
                    return Ok(Some(alert));
                }
                alert.alert_type = alert_type;
                alert.severity = severity;
                alert.current_stock = balance;
                alert.min_stock = item.min_stock;
                alert.message = alert_message(item, alert_type, balance);
                if let Some(warehouse) = warehouse {
                    alert.warehouse = Some(warehouse.to_string());
                }
                alert.updated_at = now;
                self.alerts.update(&alert).await?;
                Ok(Some(alert))
            }
            (None, Some(mut alert)) => {
                alert.status = AlertStatus::Resolved;
                alert.current_stock = balance;
                alert.resolution = Some(format!(
                    "stock recovered to {} above minimum {}",
                    balance, item.min_stock
                ));
                alert.resolved_at = Some(now);
                alert.updated_at = now;
                self.alerts.update(&alert).await?;
                info!("resolved alert for item {} at {}", item.code, balance);
                Ok(Some(alert))
            }
            (None, None) => Ok(None),
        }
    }
}
