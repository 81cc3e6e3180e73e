//! Postgres implementations of the engine's storage traits.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow, types::Json};
use stockledger_core::{
    AlertRepository, AuditSink, BalanceRepository, CostLayer, DocumentType, ItemMaster,
    ItemProfile, ItemRegistry, LayerRepository, LayerSeed, LedgerEntry, LedgerRepository,
    StockAlert, Transfer, TransferRepository, ValuationMethod, WarehouseBalance,
};
use stockledger_inventory::Repositories;
use uuid::Uuid;

const LEDGER_COLUMNS: &str = "id, sequence, item_id, warehouse, document_type, document_number, \
    quantity_in, quantity_out, unit_price, running_balance, running_value, average_price, \
    entry_date, created_at, reference, notes, user_id, lot_number, expiration_date, inbound_layers";

const LAYER_COLUMNS: &str = "id, item_id, warehouse, quantity, remaining_quantity, unit_price, \
    lot_number, expiration_date, created_at, source_entry_id";

/// One pool shared by every Postgres repository.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn items(&self) -> Arc<PgItemMaster> {
        Arc::new(PgItemMaster {
            pool: self.pool.clone(),
        })
    }

    pub fn repositories(&self, audit: Arc<dyn AuditSink>) -> Repositories {
        Repositories {
            ledger: Arc::new(PgLedgerRepository {
                pool: self.pool.clone(),
            }),
            layers: Arc::new(PgLayerRepository {
                pool: self.pool.clone(),
            }),
            balances: Arc::new(PgBalanceRepository {
                pool: self.pool.clone(),
            }),
            transfers: Arc::new(PgTransferRepository {
                pool: self.pool.clone(),
            }),
            alerts: Arc::new(PgAlertRepository {
                pool: self.pool.clone(),
            }),
            items: self.items(),
            audit,
        }
    }
}

pub struct PgLedgerRepository {
    pool: PgPool,
}

fn ledger_entry_from_row(row: &PgRow) -> Result<LedgerEntry> {
    let document_type: String = row.try_get("document_type")?;
    let inbound_layers: Json<Vec<LayerSeed>> = row.try_get("inbound_layers")?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        sequence: row.try_get("sequence")?,
        item_id: row.try_get("item_id")?,
        warehouse: row.try_get("warehouse")?,
        document_type: document_type.parse::<DocumentType>()?,
        document_number: row.try_get("document_number")?,
        quantity_in: row.try_get("quantity_in")?,
        quantity_out: row.try_get("quantity_out")?,
        unit_price: row.try_get("unit_price")?,
        running_balance: row.try_get("running_balance")?,
        running_value: row.try_get("running_value")?,
        average_price: row.try_get("average_price")?,
        date: row.try_get("entry_date")?,
        created_at: row.try_get("created_at")?,
        reference: row.try_get("reference")?,
        notes: row.try_get("notes")?,
        user_id: row.try_get("user_id")?,
        lot_number: row.try_get("lot_number")?,
        expiration_date: row.try_get("expiration_date")?,
        inbound_layers: inbound_layers.0,
    })
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    async fn insert(&self, mut entry: LedgerEntry) -> Result<LedgerEntry> {
        let row = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, item_id, warehouse, document_type, document_number, quantity_in,
                quantity_out, unit_price, running_balance, running_value, average_price,
                entry_date, created_at, reference, notes, user_id, lot_number,
                expiration_date, inbound_layers
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING sequence
            "#,
        )
        .bind(entry.id)
        .bind(entry.item_id)
        .bind(&entry.warehouse)
        .bind(entry.document_type.as_str())
        .bind(&entry.document_number)
        .bind(entry.quantity_in)
        .bind(entry.quantity_out)
        .bind(entry.unit_price)
        .bind(entry.running_balance)
        .bind(entry.running_value)
        .bind(entry.average_price)
        .bind(entry.date)
        .bind(entry.created_at)
        .bind(&entry.reference)
        .bind(&entry.notes)
        .bind(&entry.user_id)
        .bind(&entry.lot_number)
        .bind(entry.expiration_date)
        .bind(Json(&entry.inbound_layers))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to insert ledger entry {}", entry.id))?;

        entry.sequence = row.try_get("sequence")?;
        Ok(entry)
    }

    async fn update(&self, entry: &LedgerEntry) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_entries SET
                warehouse = $2, document_type = $3, document_number = $4, quantity_in = $5,
                quantity_out = $6, unit_price = $7, running_balance = $8, running_value = $9,
                average_price = $10, entry_date = $11, reference = $12, notes = $13,
                user_id = $14, lot_number = $15, expiration_date = $16, inbound_layers = $17
            WHERE id = $1
            "#,
        )
        .bind(entry.id)
        .bind(&entry.warehouse)
        .bind(entry.document_type.as_str())
        .bind(&entry.document_number)
        .bind(entry.quantity_in)
        .bind(entry.quantity_out)
        .bind(entry.unit_price)
        .bind(entry.running_balance)
        .bind(entry.running_value)
        .bind(entry.average_price)
        .bind(entry.date)
        .bind(&entry.reference)
        .bind(&entry.notes)
        .bind(&entry.user_id)
        .bind(&entry.lot_number)
        .bind(entry.expiration_date)
        .bind(Json(&entry.inbound_layers))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update ledger entry {}", entry.id))?;

        anyhow::ensure!(
            result.rows_affected() == 1,
            "ledger entry {} does not exist",
            entry.id
        );
        Ok(())
    }

    async fn delete(&self, entry_id: Uuid) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(&format!(
            "DELETE FROM ledger_entries WHERE id = $1 RETURNING {LEDGER_COLUMNS}"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(ledger_entry_from_row).transpose()
    }

    async fn get(&self, entry_id: Uuid) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(ledger_entry_from_row).transpose()
    }

    async fn latest_for_item(&self, item_id: Uuid) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE item_id = $1 \
             ORDER BY entry_date DESC, created_at DESC, sequence DESC LIMIT 1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(ledger_entry_from_row).transpose()
    }

    async fn list_for_item(&self, item_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries WHERE item_id = $1 \
             ORDER BY entry_date, created_at, sequence"
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn count_by_type(&self, document_type: DocumentType) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ledger_entries WHERE document_type = $1",
        )
        .bind(document_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn find_by_reference(
        &self,
        item_id: Uuid,
        warehouse: &str,
        document_type: DocumentType,
        reference: &str,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {LEDGER_COLUMNS} FROM ledger_entries \
             WHERE item_id = $1 AND warehouse = $2 AND document_type = $3 AND reference = $4 \
             ORDER BY entry_date, created_at, sequence"
        ))
        .bind(item_id)
        .bind(warehouse)
        .bind(document_type.as_str())
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(ledger_entry_from_row).collect()
    }
}

/// Layers keep a serial column so ties on `created_at` resolve in insertion order.
pub struct PgLayerRepository {
    pool: PgPool,
}

fn cost_layer_from_row(row: &PgRow) -> Result<CostLayer> {
    Ok(CostLayer {
        id: row.try_get("id")?,
        item_id: row.try_get("item_id")?,
        warehouse: row.try_get("warehouse")?,
        quantity: row.try_get("quantity")?,
        remaining_quantity: row.try_get("remaining_quantity")?,
        unit_price: row.try_get("unit_price")?,
        lot_number: row.try_get("lot_number")?,
        expiration_date: row.try_get("expiration_date")?,
        created_at: row.try_get("created_at")?,
        source_entry_id: row.try_get("source_entry_id")?,
    })
}

async fn insert_layer(conn: &mut PgConnection, layer: &CostLayer) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cost_layers (
            id, item_id, warehouse, quantity, remaining_quantity, unit_price,
            lot_number, expiration_date, created_at, source_entry_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(layer.id)
    .bind(layer.item_id)
    .bind(&layer.warehouse)
    .bind(layer.quantity)
    .bind(layer.remaining_quantity)
    .bind(layer.unit_price)
    .bind(&layer.lot_number)
    .bind(layer.expiration_date)
    .bind(layer.created_at)
    .bind(layer.source_entry_id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("failed to insert cost layer {}", layer.id))?;

    Ok(())
}

#[async_trait]
impl LayerRepository for PgLayerRepository {
    async fn insert(&self, layer: CostLayer) -> Result<CostLayer> {
        let mut conn = self.pool.acquire().await?;
        insert_layer(&mut conn, &layer).await?;
        Ok(layer)
    }

    async fn open_layers(&self, item_id: Uuid, warehouse: &str) -> Result<Vec<CostLayer>> {
        let rows = sqlx::query(&format!(
            "SELECT {LAYER_COLUMNS} FROM cost_layers \
             WHERE item_id = $1 AND warehouse = $2 AND remaining_quantity > 0 \
             ORDER BY created_at, layer_seq"
        ))
        .bind(item_id)
        .bind(warehouse)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(cost_layer_from_row).collect()
    }

    async fn set_remaining(&self, layer_id: Uuid, remaining: Decimal) -> Result<()> {
        let result = sqlx::query(
            "UPDATE cost_layers SET remaining_quantity = $2 \
             WHERE id = $1 AND $2 >= 0 AND $2 <= quantity",
        )
        .bind(layer_id)
        .bind(remaining)
        .execute(&self.pool)
        .await?;

        anyhow::ensure!(
            result.rows_affected() == 1,
            "cost layer {layer_id} does not exist or {remaining} is out of range"
        );
        Ok(())
    }

    async fn list_for_item(&self, item_id: Uuid) -> Result<Vec<CostLayer>> {
        let rows = sqlx::query(&format!(
            "SELECT {LAYER_COLUMNS} FROM cost_layers WHERE item_id = $1 \
             ORDER BY warehouse, created_at, layer_seq"
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(cost_layer_from_row).collect()
    }

    async fn replace_for_item(&self, item_id: Uuid, layers: Vec<CostLayer>) -> Result<()> {
        for layer in &layers {
            anyhow::ensure!(
                layer.item_id == item_id,
                "layer {} belongs to item {}, not {item_id}",
                layer.id,
                layer.item_id
            );
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cost_layers WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        for layer in &layers {
            insert_layer(&mut tx, layer).await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

pub struct PgBalanceRepository {
    pool: PgPool,
}

fn balance_from_row(row: &PgRow) -> Result<WarehouseBalance> {
    Ok(WarehouseBalance {
        item_id: row.try_get("item_id")?,
        warehouse: row.try_get("warehouse")?,
        quantity: row.try_get("quantity")?,
        total_value: row.try_get("total_value")?,
        last_updated: row.try_get("last_updated")?,
    })
}

#[async_trait]
impl BalanceRepository for PgBalanceRepository {
    async fn get(&self, item_id: Uuid, warehouse: &str) -> Result<Option<WarehouseBalance>> {
        let row = sqlx::query(
            "SELECT item_id, warehouse, quantity, total_value, last_updated \
             FROM warehouse_balances WHERE item_id = $1 AND warehouse = $2",
        )
        .bind(item_id)
        .bind(warehouse)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(balance_from_row).transpose()
    }

    async fn upsert_delta(
        &self,
        item_id: Uuid,
        warehouse: &str,
        delta_quantity: Decimal,
        delta_value: Decimal,
        at: DateTime<Utc>,
    ) -> Result<WarehouseBalance> {
        let row = sqlx::query(
            r#"
            INSERT INTO warehouse_balances (item_id, warehouse, quantity, total_value, last_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (item_id, warehouse) DO UPDATE SET
                quantity = warehouse_balances.quantity + EXCLUDED.quantity,
                total_value = warehouse_balances.total_value + EXCLUDED.total_value,
                last_updated = EXCLUDED.last_updated
            RETURNING item_id, warehouse, quantity, total_value, last_updated
            "#,
        )
        .bind(item_id)
        .bind(warehouse)
        .bind(delta_quantity)
        .bind(delta_value)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to update balance of {item_id} in {warehouse}"))?;

        balance_from_row(&row)
    }

    async fn list_for_item(&self, item_id: Uuid) -> Result<Vec<WarehouseBalance>> {
        let rows = sqlx::query(
            "SELECT item_id, warehouse, quantity, total_value, last_updated \
             FROM warehouse_balances WHERE item_id = $1 ORDER BY warehouse",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(balance_from_row).collect()
    }

    async fn replace_for_item(&self, item_id: Uuid, balances: Vec<WarehouseBalance>) -> Result<()> {
        for balance in &balances {
            anyhow::ensure!(
                balance.item_id == item_id,
                "balance for {} belongs to item {}, not {item_id}",
                balance.warehouse,
                balance.item_id
            );
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM warehouse_balances WHERE item_id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        for balance in &balances {
            sqlx::query(
                "INSERT INTO warehouse_balances (item_id, warehouse, quantity, total_value, last_updated) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(balance.item_id)
            .bind(&balance.warehouse)
            .bind(balance.quantity)
            .bind(balance.total_value)
            .bind(balance.last_updated)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

/// Transfers are stored as JSON documents keyed by id.
pub struct PgTransferRepository {
    pool: PgPool,
}

fn transfer_from_row(row: &PgRow) -> Result<Transfer> {
    let body: Json<Transfer> = row.try_get("body")?;
    Ok(body.0)
}

#[async_trait]
impl TransferRepository for PgTransferRepository {
    async fn insert(&self, transfer: Transfer) -> Result<Transfer> {
        sqlx::query(
            "INSERT INTO stock_transfers (id, transfer_number, status, body, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(transfer.id)
        .bind(&transfer.transfer_number)
        .bind(transfer.status.as_str())
        .bind(Json(&transfer))
        .bind(transfer.updated_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert transfer {}", transfer.transfer_number))?;

        Ok(transfer)
    }

    async fn get(&self, transfer_id: Uuid) -> Result<Option<Transfer>> {
        let row = sqlx::query("SELECT body FROM stock_transfers WHERE id = $1")
            .bind(transfer_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(transfer_from_row).transpose()
    }

    async fn update(&self, transfer: &Transfer) -> Result<()> {
        let result = sqlx::query(
            "UPDATE stock_transfers SET status = $2, body = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(transfer.id)
        .bind(transfer.status.as_str())
        .bind(Json(transfer))
        .bind(transfer.updated_at)
        .execute(&self.pool)
        .await?;

        anyhow::ensure!(
            result.rows_affected() == 1,
            "transfer {} does not exist",
            transfer.id
        );
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stock_transfers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// Alerts are stored as JSON documents; a partial unique index allows one active alert per item.
pub struct PgAlertRepository {
    pool: PgPool,
}

fn alert_from_row(row: &PgRow) -> Result<StockAlert> {
    let body: Json<StockAlert> = row.try_get("body")?;
    Ok(body.0)
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn active_for_item(&self, item_id: Uuid) -> Result<Option<StockAlert>> {
        let row = sqlx::query(
            "SELECT body FROM stock_alerts WHERE item_id = $1 AND active \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(alert_from_row).transpose()
    }

    async fn insert(&self, alert: StockAlert) -> Result<StockAlert> {
        sqlx::query(
            "INSERT INTO stock_alerts (id, item_id, active, created_at, body) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(alert.id)
        .bind(alert.item_id)
        .bind(alert.is_active())
        .bind(alert.created_at)
        .bind(Json(&alert))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert stock alert for item {}", alert.item_id))?;

        Ok(alert)
    }

    async fn update(&self, alert: &StockAlert) -> Result<()> {
        let result = sqlx::query("UPDATE stock_alerts SET active = $2, body = $3 WHERE id = $1")
            .bind(alert.id)
            .bind(alert.is_active())
            .bind(Json(alert))
            .execute(&self.pool)
            .await?;

        anyhow::ensure!(
            result.rows_affected() == 1,
            "stock alert {} does not exist",
            alert.id
        );
        Ok(())
    }

    async fn list_for_item(&self, item_id: Uuid) -> Result<Vec<StockAlert>> {
        let rows = sqlx::query("SELECT body FROM stock_alerts WHERE item_id = $1 ORDER BY created_at")
            .bind(item_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(alert_from_row).collect()
    }
}

/// Item configuration plus the aggregate stock figures the engine publishes.
pub struct PgItemMaster {
    pool: PgPool,
}

#[async_trait]
impl ItemMaster for PgItemMaster {
    async fn get_item(&self, item_id: Uuid) -> Result<Option<ItemProfile>> {
        let Some(row) = sqlx::query(
            "SELECT id, code, name, valuation_method, min_stock, max_stock, unit_price, \
             allow_negative_stock FROM stock_items WHERE id = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let valuation_method: String = row.try_get("valuation_method")?;
        Ok(Some(ItemProfile {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            valuation_method: valuation_method.parse::<ValuationMethod>()?,
            min_stock: row.try_get("min_stock")?,
            max_stock: row.try_get("max_stock")?,
            unit_price: row.try_get("unit_price")?,
            allow_negative_stock: row.try_get("allow_negative_stock")?,
        }))
    }

    async fn set_aggregate_stock(
        &self,
        item_id: Uuid,
        quantity: Decimal,
        value: Decimal,
        unit_price: Decimal,
        is_low_stock: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE stock_items SET
                stock_quantity = $2, stock_value = $3, stock_unit_price = $4,
                is_low_stock = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .bind(quantity)
        .bind(value)
        .bind(unit_price)
        .bind(is_low_stock)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        anyhow::ensure!(result.rows_affected() == 1, "item {item_id} is not registered");
        Ok(())
    }
}

#[async_trait]
impl ItemRegistry for PgItemMaster {
    async fn register_item(&self, item: ItemProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_items (
                id, code, name, valuation_method, min_stock, max_stock, unit_price,
                allow_negative_stock
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                name = EXCLUDED.name,
                valuation_method = EXCLUDED.valuation_method,
                min_stock = EXCLUDED.min_stock,
                max_stock = EXCLUDED.max_stock,
                unit_price = EXCLUDED.unit_price,
                allow_negative_stock = EXCLUDED.allow_negative_stock,
                updated_at = NOW()
            "#,
        )
        .bind(item.id)
        .bind(&item.code)
        .bind(&item.name)
        .bind(item.valuation_method.as_str())
        .bind(item.min_stock)
        .bind(item.max_stock)
        .bind(item.unit_price)
        .bind(item.allow_negative_stock)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to register item {}", item.code))?;

        Ok(())
    }
}
