use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use stockledger_core::{AuditRecord, AuditSink};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stock_items (
        id UUID PRIMARY KEY,
        code TEXT NOT NULL,
        name TEXT NOT NULL,
        valuation_method TEXT NOT NULL,
        min_stock NUMERIC NOT NULL,
        max_stock NUMERIC,
        unit_price NUMERIC NOT NULL,
        allow_negative_stock BOOLEAN NOT NULL DEFAULT FALSE,
        stock_quantity NUMERIC NOT NULL DEFAULT 0,
        stock_value NUMERIC NOT NULL DEFAULT 0,
        stock_unit_price NUMERIC NOT NULL DEFAULT 0,
        is_low_stock BOOLEAN NOT NULL DEFAULT FALSE,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id UUID PRIMARY KEY,
        sequence BIGSERIAL NOT NULL,
        item_id UUID NOT NULL,
        warehouse TEXT NOT NULL,
        document_type TEXT NOT NULL,
        document_number TEXT NOT NULL,
        quantity_in NUMERIC NOT NULL,
        quantity_out NUMERIC NOT NULL,
        unit_price NUMERIC NOT NULL,
        running_balance NUMERIC NOT NULL,
        running_value NUMERIC NOT NULL,
        average_price NUMERIC NOT NULL,
        entry_date TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        reference TEXT,
        notes TEXT,
        user_id TEXT,
        lot_number TEXT,
        expiration_date DATE,
        inbound_layers JSONB NOT NULL DEFAULT '[]'::jsonb
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ledger_entries_item_order ON ledger_entries (item_id, entry_date, created_at, sequence)",
    "CREATE INDEX IF NOT EXISTS ledger_entries_reference ON ledger_entries (item_id, warehouse, document_type, reference)",
    r#"
    CREATE TABLE IF NOT EXISTS cost_layers (
        id UUID PRIMARY KEY,
        layer_seq BIGSERIAL NOT NULL,
        item_id UUID NOT NULL,
        warehouse TEXT NOT NULL,
        quantity NUMERIC NOT NULL,
        remaining_quantity NUMERIC NOT NULL,
        unit_price NUMERIC NOT NULL,
        lot_number TEXT,
        expiration_date DATE,
        created_at TIMESTAMPTZ NOT NULL,
        source_entry_id UUID
    )
    "#,
    "CREATE INDEX IF NOT EXISTS cost_layers_item ON cost_layers (item_id, warehouse, created_at, layer_seq)",
    r#"
    CREATE TABLE IF NOT EXISTS warehouse_balances (
        item_id UUID NOT NULL,
        warehouse TEXT NOT NULL,
        quantity NUMERIC NOT NULL,
        total_value NUMERIC NOT NULL,
        last_updated TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (item_id, warehouse)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_transfers (
        id UUID PRIMARY KEY,
        transfer_number TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL,
        body JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_alerts (
        id UUID PRIMARY KEY,
        item_id UUID NOT NULL,
        active BOOLEAN NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        body JSONB NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS stock_alerts_one_active ON stock_alerts (item_id) WHERE active",
    r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id UUID PRIMARY KEY,
        entity_id UUID NOT NULL,
        entity_type TEXT NOT NULL,
        action TEXT NOT NULL,
        before_state JSONB,
        after_state JSONB,
        actor_id TEXT NOT NULL,
        source_ip TEXT,
        user_agent TEXT,
        recorded_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

pub async fn connect_database(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to the stock database")?;

    Ok(pool)
}

/// Creates every table the Postgres repositories and the audit sink use.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(*statement)
            .execute(pool)
            .await
            .with_context(|| format!("failed to apply schema statement: {}", statement.trim()))?;
    }
    Ok(())
}

/// Appends audit records to the `audit_log` table.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, entity_id, entity_type, action, before_state, after_state,
                actor_id, source_ip, user_agent, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id)
        .bind(record.entity_id)
        .bind(&record.entity_type)
        .bind(&record.action)
        .bind(record.before)
        .bind(record.after)
        .bind(&record.actor.actor_id)
        .bind(&record.actor.source_ip)
        .bind(&record.actor.user_agent)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert audit record {}", record.id))?;

        Ok(())
    }
}
