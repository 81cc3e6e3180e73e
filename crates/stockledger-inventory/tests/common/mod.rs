#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use stockledger_core::{ItemProfile, ValuationMethod};
use stockledger_inventory::{EngineConfig, InventoryEngine, NewLedgerEntry, Repositories};
use stockledger_store::{
    InMemoryAlertRepository, InMemoryAuditSink, InMemoryBalanceRepository, InMemoryItemMaster,
    InMemoryLayerRepository, InMemoryLedgerRepository, InMemoryTransferRepository,
};
use uuid::Uuid;

pub struct Harness {
    pub engine: InventoryEngine,
    pub items: Arc<InMemoryItemMaster>,
    pub audit: Arc<InMemoryAuditSink>,
}

impl Harness {
    pub fn new() -> Self {
        let items = Arc::new(InMemoryItemMaster::default());
        let audit = Arc::new(InMemoryAuditSink::default());
        let repos = Repositories {
            ledger: Arc::new(InMemoryLedgerRepository::default()),
            layers: Arc::new(InMemoryLayerRepository::default()),
            balances: Arc::new(InMemoryBalanceRepository::default()),
            transfers: Arc::new(InMemoryTransferRepository::default()),
            alerts: Arc::new(InMemoryAlertRepository::default()),
            items: items.clone(),
            audit: audit.clone(),
        };
        Self {
            engine: InventoryEngine::new(repos, EngineConfig::default()),
            items,
            audit,
        }
    }

    pub async fn item(&self, method: ValuationMethod, min_stock: Decimal) -> ItemProfile {
        let id = Uuid::new_v4();
        let item = ItemProfile {
            id,
            code: format!("SKU-{}", &id.simple().to_string()[..6]),
            name: "Test widget".to_string(),
            valuation_method: method,
            min_stock,
            max_stock: None,
            unit_price: Decimal::ONE,
            allow_negative_stock: false,
        };
        self.items.upsert_item(item.clone()).await;
        item
    }

    pub async fn receive(
        &self,
        item: &ItemProfile,
        warehouse: &str,
        quantity: Decimal,
        unit_price: Decimal,
    ) {
        self.engine
            .append_ledger_entry(NewLedgerEntry::receipt(item.id, warehouse, quantity, unit_price))
            .await
            .unwrap();
    }

    pub async fn issue(&self, item: &ItemProfile, warehouse: &str, quantity: Decimal) {
        self.engine
            .append_ledger_entry(NewLedgerEntry::issue(item.id, warehouse, quantity))
            .await
            .unwrap();
    }

    /// (quantity, value) of one warehouse.
    pub async fn stock(&self, item: &ItemProfile, warehouse: &str) -> (Decimal, Decimal) {
        let valuation = self.engine.item_valuation(item.id).await.unwrap();
        valuation
            .warehouses
            .iter()
            .find(|row| row.warehouse == warehouse)
            .map(|row| (row.quantity, row.total_value))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO))
    }
}

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}
