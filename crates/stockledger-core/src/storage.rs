use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::audit::AuditRecord;
use crate::models::{
    CostLayer, DocumentType, ItemProfile, LedgerEntry, StockAlert, Transfer, WarehouseBalance,
};

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Stores a new entry and returns it with its assigned sequence number.
    async fn insert(&self, entry: LedgerEntry) -> anyhow::Result<LedgerEntry>;
    async fn update(&self, entry: &LedgerEntry) -> anyhow::Result<()>;
    async fn delete(&self, entry_id: Uuid) -> anyhow::Result<Option<LedgerEntry>>;
    async fn get(&self, entry_id: Uuid) -> anyhow::Result<Option<LedgerEntry>>;
    /// Most recent entry by (date, created_at, sequence).
    async fn latest_for_item(&self, item_id: Uuid) -> anyhow::Result<Option<LedgerEntry>>;
    /// All entries of the item, oldest first.
    async fn list_for_item(&self, item_id: Uuid) -> anyhow::Result<Vec<LedgerEntry>>;
    async fn count_by_type(&self, document_type: DocumentType) -> anyhow::Result<u64>;
    async fn find_by_reference(
        &self,
        item_id: Uuid,
        warehouse: &str,
        document_type: DocumentType,
        reference: &str,
    ) -> anyhow::Result<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait LayerRepository: Send + Sync {
    async fn insert(&self, layer: CostLayer) -> anyhow::Result<CostLayer>;
    /// Layers of one item in one warehouse with stock left, in creation order.
    async fn open_layers(&self, item_id: Uuid, warehouse: &str) -> anyhow::Result<Vec<CostLayer>>;
    async fn set_remaining(&self, layer_id: Uuid, remaining: Decimal) -> anyhow::Result<()>;
    async fn list_for_item(&self, item_id: Uuid) -> anyhow::Result<Vec<CostLayer>>;
    async fn replace_for_item(&self, item_id: Uuid, layers: Vec<CostLayer>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait BalanceRepository: Send + Sync {
    async fn get(&self, item_id: Uuid, warehouse: &str) -> anyhow::Result<Option<WarehouseBalance>>;
    /// Adds the delta to the row, creating it from the delta when missing.
    async fn upsert_delta(
        &self,
        item_id: Uuid,
        warehouse: &str,
        delta_quantity: Decimal,
        delta_value: Decimal,
        at: DateTime<Utc>,
    ) -> anyhow::Result<WarehouseBalance>;
    async fn list_for_item(&self, item_id: Uuid) -> anyhow::Result<Vec<WarehouseBalance>>;
    async fn replace_for_item(
        &self,
        item_id: Uuid,
        balances: Vec<WarehouseBalance>,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TransferRepository: Send + Sync {
    async fn insert(&self, transfer: Transfer) -> anyhow::Result<Transfer>;
    async fn get(&self, transfer_id: Uuid) -> anyhow::Result<Option<Transfer>>;
    async fn update(&self, transfer: &Transfer) -> anyhow::Result<()>;
    async fn count(&self) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn active_for_item(&self, item_id: Uuid) -> anyhow::Result<Option<StockAlert>>;
    async fn insert(&self, alert: StockAlert) -> anyhow::Result<StockAlert>;
    async fn update(&self, alert: &StockAlert) -> anyhow::Result<()>;
    async fn list_for_item(&self, item_id: Uuid) -> anyhow::Result<Vec<StockAlert>>;
}

/// Item master collaborator owning item configuration and the aggregate stock figure.
#[async_trait]
pub trait ItemMaster: Send + Sync {
    async fn get_item(&self, item_id: Uuid) -> anyhow::Result<Option<ItemProfile>>;
    async fn set_aggregate_stock(
        &self,
        item_id: Uuid,
        quantity: Decimal,
        value: Decimal,
        unit_price: Decimal,
        is_low_stock: bool,
    ) -> anyhow::Result<()>;
}

/// Item master that also accepts item registrations.
#[async_trait]
pub trait ItemRegistry: Send + Sync {
    async fn register_item(&self, item: ItemProfile) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> anyhow::Result<()>;
}
