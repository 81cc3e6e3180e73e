use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockledger_core::{
    DocumentType, LayerSeed, LedgerEntry, LedgerRepository, StockError, StockResult,
};
use uuid::Uuid;

use crate::layers::Consumption;
use crate::valuation::Position;

/// Request to post one stock movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub item_id: Uuid,
    pub warehouse: String,
    pub document_type: DocumentType,
    #[serde(default)]
    pub quantity_in: Decimal,
    #[serde(default)]
    pub quantity_out: Decimal,
    #[serde(default)]
    pub unit_price: Decimal,
    /// Business date of the movement; defaults to now.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

impl NewLedgerEntry {
    pub fn new(item_id: Uuid, warehouse: impl Into<String>, document_type: DocumentType) -> Self {
        Self {
            item_id,
            warehouse: warehouse.into(),
            document_type,
            quantity_in: Decimal::ZERO,
            quantity_out: Decimal::ZERO,
            unit_price: Decimal::ZERO,
            date: None,
            document_number: None,
            reference: None,
            notes: None,
            user_id: None,
            lot_number: None,
            expiration_date: None,
        }
    }

    pub fn receipt(
        item_id: Uuid,
        warehouse: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            quantity_in: quantity,
            unit_price,
            ..Self::new(item_id, warehouse, DocumentType::Receipt)
        }
    }

    pub fn issue(item_id: Uuid, warehouse: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            quantity_out: quantity,
            ..Self::new(item_id, warehouse, DocumentType::Issue)
        }
    }

    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn validate(&self) -> StockResult<()> {
        if self.warehouse.trim().is_empty() {
            return Err(StockError::validation("warehouse", "warehouse is required"));
        }
        validate_quantities(self.quantity_in, self.quantity_out, self.unit_price)
    }

    /// Unposted entry with empty derived fields, ordered after every stored entry
    /// sharing its date.
    pub fn draft(&self, item_id: Uuid, now: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            sequence: i64::MAX,
            item_id,
            warehouse: self.warehouse.trim().to_string(),
            document_type: self.document_type,
            document_number: self.document_number.clone().unwrap_or_default(),
            quantity_in: self.quantity_in,
            quantity_out: self.quantity_out,
            unit_price: self.unit_price,
            running_balance: Decimal::ZERO,
            running_value: Decimal::ZERO,
            average_price: Decimal::ZERO,
            date: self.date.unwrap_or(now),
            created_at: now,
            reference: self.reference.clone(),
            notes: self.notes.clone(),
            user_id: self.user_id.clone(),
            lot_number: self.lot_number.clone(),
            expiration_date: self.expiration_date,
            inbound_layers: Vec::new(),
        }
    }
}

fn validate_quantities(
    quantity_in: Decimal,
    quantity_out: Decimal,
    unit_price: Decimal,
) -> StockResult<()> {
    if quantity_in < Decimal::ZERO {
        return Err(StockError::validation("quantity_in", "quantity cannot be negative"));
    }
    if quantity_out < Decimal::ZERO {
        return Err(StockError::validation("quantity_out", "quantity cannot be negative"));
    }
    if unit_price < Decimal::ZERO {
        return Err(StockError::validation("unit_price", "unit price cannot be negative"));
    }
    if quantity_in.is_zero() && quantity_out.is_zero() {
        return Err(StockError::validation(
            "quantity_in",
            "either quantity in or quantity out must be set",
        ));
    }
    Ok(())
}

/// Editable fields of a posted entry. Unset fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerEntryPatch {
    #[serde(default)]
    pub quantity_in: Option<Decimal>,
    #[serde(default)]
    pub quantity_out: Option<Decimal>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl LedgerEntryPatch {
    pub fn apply_to(&self, entry: &mut LedgerEntry) -> StockResult<()> {
        let quantity_in = self.quantity_in.unwrap_or(entry.quantity_in);
        let quantity_out = self.quantity_out.unwrap_or(entry.quantity_out);
        let unit_price = self.unit_price.unwrap_or(entry.unit_price);
        validate_quantities(quantity_in, quantity_out, unit_price)?;

        if quantity_in != entry.quantity_in || unit_price != entry.unit_price {
            // the stored slice composition no longer describes the inflow
            entry.inbound_layers.clear();
        }
        entry.quantity_in = quantity_in;
        entry.quantity_out = quantity_out;
        entry.unit_price = unit_price;
        if let Some(date) = self.date {
            entry.date = date;
        }
        if let Some(reference) = &self.reference {
            entry.reference = Some(reference.clone());
        }
        if let Some(notes) = &self.notes {
            entry.notes = Some(notes.clone());
        }
        Ok(())
    }
}

/// How a movement is costed when it is posted.
#[derive(Debug, Clone)]
pub enum Costing {
    /// Method default: weighted average, or layer consumption for FIFO/LIFO outflows.
    Standard,
    /// Outflow already planned by the caller.
    Outbound(Consumption),
    /// Inflow arriving as the given cost slices.
    Inbound(Vec<LayerSeed>),
}

pub struct LedgerStore {
    repo: Arc<dyn LedgerRepository>,
}

impl LedgerStore {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    pub async fn latest(&self, item_id: Uuid) -> StockResult<Option<LedgerEntry>> {
        Ok(self.repo.latest_for_item(item_id).await?)
    }

    pub async fn latest_position(&self, item_id: Uuid) -> StockResult<Position> {
        Ok(self
            .latest(item_id)
            .await?
            .map(|entry| Position::after(&entry))
            .unwrap_or(Position::ZERO))
    }

    /// `{PREFIX}-{n}` with n one past the number of entries of that type.
    pub async fn document_number(&self, document_type: DocumentType) -> StockResult<String> {
        let count = self.repo.count_by_type(document_type).await?;
        Ok(format!("{}-{}", document_type.prefix(), count + 1))
    }

    pub async fn insert(&self, entry: LedgerEntry) -> StockResult<LedgerEntry> {
        Ok(self.repo.insert(entry).await?)
    }

    pub async fn update(&self, entry: &LedgerEntry) -> StockResult<()> {
        Ok(self.repo.update(entry).await?)
    }

    pub async fn delete(&self, entry_id: Uuid) -> StockResult<LedgerEntry> {
        self.repo
            .delete(entry_id)
            .await?
            .ok_or_else(|| StockError::not_found("ledger entry", entry_id))
    }

    pub async fn get(&self, entry_id: Uuid) -> StockResult<LedgerEntry> {
        self.repo
            .get(entry_id)
            .await?
            .ok_or_else(|| StockError::not_found("ledger entry", entry_id))
    }

    pub async fn history(&self, item_id: Uuid) -> StockResult<Vec<LedgerEntry>> {
        Ok(self.repo.list_for_item(item_id).await?)
    }

    pub async fn find_by_reference(
        &self,
        item_id: Uuid,
        warehouse: &str,
        document_type: DocumentType,
        reference: &str,
    ) -> StockResult<Option<LedgerEntry>> {
        let mut found = self
            .repo
            .find_by_reference(item_id, warehouse, document_type, reference)
            .await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }
}
