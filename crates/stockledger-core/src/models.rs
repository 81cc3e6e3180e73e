use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StockError, StockResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    Fifo,
    Lifo,
    WeightedAverage,
}

impl ValuationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationMethod::Fifo => "fifo",
            ValuationMethod::Lifo => "lifo",
            ValuationMethod::WeightedAverage => "weighted_average",
        }
    }

    /// FIFO and LIFO value outflows from discrete cost layers.
    pub fn is_layered(&self) -> bool {
        matches!(self, ValuationMethod::Fifo | ValuationMethod::Lifo)
    }
}

impl fmt::Display for ValuationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValuationMethod {
    type Err = StockError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(ValuationMethod::Fifo),
            "lifo" => Ok(ValuationMethod::Lifo),
            "weighted_average" | "avco" | "average" => Ok(ValuationMethod::WeightedAverage),
            other => Err(StockError::validation(
                "valuation_method",
                format!("unsupported valuation method: {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Receipt,
    Issue,
    TransferIn,
    TransferOut,
    Adjustment,
    Return,
    Count,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Receipt => "receipt",
            DocumentType::Issue => "issue",
            DocumentType::TransferIn => "transfer_in",
            DocumentType::TransferOut => "transfer_out",
            DocumentType::Adjustment => "adjustment",
            DocumentType::Return => "return",
            DocumentType::Count => "count",
        }
    }

    /// Prefix used when a document number has to be synthesized.
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentType::Receipt => "RCV",
            DocumentType::Issue => "ISS",
            DocumentType::TransferIn => "TRI",
            DocumentType::TransferOut => "TRO",
            DocumentType::Adjustment => "ADJ",
            DocumentType::Return => "RET",
            DocumentType::Count => "CNT",
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self, DocumentType::TransferIn | DocumentType::TransferOut)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = StockError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "receipt" => Ok(DocumentType::Receipt),
            "issue" => Ok(DocumentType::Issue),
            "transfer_in" => Ok(DocumentType::TransferIn),
            "transfer_out" => Ok(DocumentType::TransferOut),
            "adjustment" => Ok(DocumentType::Adjustment),
            "return" => Ok(DocumentType::Return),
            "count" => Ok(DocumentType::Count),
            other => Err(StockError::validation(
                "document_type",
                format!("unsupported document type: {other}"),
            )),
        }
    }
}

/// Item master record as seen by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemProfile {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub valuation_method: ValuationMethod,
    pub min_stock: Decimal,
    pub max_stock: Option<Decimal>,
    pub unit_price: Decimal,
    #[serde(default)]
    pub allow_negative_stock: bool,
}

/// `value / balance` while stock is positive, otherwise the supplied fallback price.
pub fn average_price(balance: Decimal, value: Decimal, fallback: Decimal) -> Decimal {
    if balance > Decimal::ZERO {
        value / balance
    } else {
        fallback
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub sequence: i64,
    pub item_id: Uuid,
    pub warehouse: String,
    pub document_type: DocumentType,
    pub document_number: String,
    pub quantity_in: Decimal,
    pub quantity_out: Decimal,
    pub unit_price: Decimal,
    pub running_balance: Decimal,
    pub running_value: Decimal,
    pub average_price: Decimal,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub user_id: Option<String>,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    /// Layer composition of an inflow that arrived as several cost slices.
    #[serde(default)]
    pub inbound_layers: Vec<LayerSeed>,
}

impl LedgerEntry {
    pub fn net_quantity(&self) -> Decimal {
        self.quantity_in - self.quantity_out
    }

    /// Chronological position of the entry within its item's history.
    pub fn ordering_key(&self) -> (DateTime<Utc>, DateTime<Utc>, i64) {
        (self.date, self.created_at, self.sequence)
    }
}

/// Sorts entries oldest first by (date, created_at, sequence).
pub fn sort_chronologically(entries: &mut [LedgerEntry]) {
    entries.sort_by_key(|entry| entry.ordering_key());
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostLayer {
    pub id: Uuid,
    pub item_id: Uuid,
    pub warehouse: String,
    pub quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub unit_price: Decimal,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub source_entry_id: Option<Uuid>,
}

impl CostLayer {
    pub fn new(
        item_id: Uuid,
        warehouse: impl Into<String>,
        seed: &LayerSeed,
        created_at: DateTime<Utc>,
    ) -> StockResult<Self> {
        if seed.quantity <= Decimal::ZERO {
            return Err(StockError::validation(
                "quantity",
                "cost layer quantity must be positive",
            ));
        }
        if seed.unit_price < Decimal::ZERO {
            return Err(StockError::validation(
                "unit_price",
                "cost layer unit price cannot be negative",
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            item_id,
            warehouse: warehouse.into(),
            quantity: seed.quantity,
            remaining_quantity: seed.quantity,
            unit_price: seed.unit_price,
            lot_number: seed.lot_number.clone(),
            expiration_date: seed.expiration_date,
            created_at,
            source_entry_id: None,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_quantity <= Decimal::ZERO
    }
}

/// Quantity and cost for a layer that is about to be created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerSeed {
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
}

impl LayerSeed {
    pub fn new(quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            quantity,
            unit_price,
            lot_number: None,
            expiration_date: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarehouseBalance {
    pub item_id: Uuid,
    pub warehouse: String,
    pub quantity: Decimal,
    pub total_value: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl WarehouseBalance {
    pub fn empty(item_id: Uuid, warehouse: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            item_id,
            warehouse: warehouse.into(),
            quantity: Decimal::ZERO,
            total_value: Decimal::ZERO,
            last_updated: at,
        }
    }

    pub fn average_cost(&self) -> Decimal {
        average_price(self.quantity, self.total_value, Decimal::ZERO)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    Simple,
    TwoStage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Draft,
    Pending,
    InTransit,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Draft => "draft",
            TransferStatus::Pending => "pending",
            TransferStatus::InTransit => "in_transit",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferAction {
    Approve,
    Receive,
    Cancel,
}

impl TransferAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferAction::Approve => "approve",
            TransferAction::Receive => "receive",
            TransferAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for TransferAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferLine {
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_value: Decimal,
    /// Source layers consumed when the line left its warehouse.
    #[serde(default)]
    pub consumed_layers: Vec<LayerSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransferLine {
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransfer {
    pub from_warehouse: String,
    pub to_warehouse: String,
    pub items: Vec<NewTransferLine>,
    pub mode: TransferMode,
    #[serde(default)]
    pub transfer_ref: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    pub id: Uuid,
    pub transfer_number: String,
    pub from_warehouse: String,
    pub to_warehouse: String,
    pub items: Vec<TransferLine>,
    pub mode: TransferMode,
    pub status: TransferStatus,
    pub in_transit: BTreeMap<Uuid, Decimal>,
    pub transfer_ref: String,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub approved_by: Option<String>,
    pub received_by: Option<String>,
    pub cancelled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Builds a transfer from validated input. Lines without a price default to zero
    /// until approval records the consumed source cost.
    pub fn new(
        transfer_number: String,
        input: NewTransfer,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> StockResult<Self> {
        let from_warehouse = input.from_warehouse.trim().to_string();
        let to_warehouse = input.to_warehouse.trim().to_string();

        if from_warehouse.is_empty() {
            return Err(StockError::validation("from_warehouse", "source warehouse is required"));
        }
        if to_warehouse.is_empty() {
            return Err(StockError::validation("to_warehouse", "destination warehouse is required"));
        }
        if from_warehouse == to_warehouse {
            return Err(StockError::validation(
                "to_warehouse",
                "source and destination warehouse must differ",
            ));
        }
        if input.items.is_empty() {
            return Err(StockError::validation("items", "transfer needs at least one line"));
        }

        let mut items = Vec::with_capacity(input.items.len());
        for line in input.items {
            if line.quantity <= Decimal::ZERO {
                return Err(StockError::validation("quantity", "transfer quantity must be positive"));
            }
            let unit_price = line.unit_price.unwrap_or(Decimal::ZERO);
            if unit_price < Decimal::ZERO {
                return Err(StockError::validation("unit_price", "unit price cannot be negative"));
            }
            if items.iter().any(|existing: &TransferLine| existing.item_id == line.item_id) {
                return Err(StockError::validation(
                    "items",
                    format!("item {} appears more than once", line.item_id),
                ));
            }
            items.push(TransferLine {
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price,
                total_value: line.quantity * unit_price,
                consumed_layers: Vec::new(),
            });
        }

        let id = Uuid::new_v4();
        let transfer_ref = input
            .transfer_ref
            .map(|reference| reference.trim().to_string())
            .filter(|reference| !reference.is_empty())
            .unwrap_or_else(|| format!("{transfer_number}/{id}"));

        Ok(Self {
            id,
            transfer_number,
            from_warehouse,
            to_warehouse,
            items,
            mode: input.mode,
            status: if input.draft {
                TransferStatus::Draft
            } else {
                TransferStatus::Pending
            },
            in_transit: BTreeMap::new(),
            transfer_ref,
            notes: input.notes,
            created_by,
            approved_by: None,
            received_by: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
            approved_at: None,
            received_at: None,
            cancelled_at: None,
        })
    }

    /// Rejects actions the current status does not allow.
    pub fn ensure_action_allowed(&self, action: TransferAction) -> StockResult<()> {
        let allowed = match action {
            TransferAction::Approve => {
                matches!(self.status, TransferStatus::Draft | TransferStatus::Pending)
            }
            TransferAction::Receive => {
                self.status == TransferStatus::InTransit && self.mode == TransferMode::TwoStage
            }
            TransferAction::Cancel => !matches!(
                self.status,
                TransferStatus::Completed | TransferStatus::Cancelled
            ),
        };

        if allowed {
            Ok(())
        } else {
            Err(StockError::State(format!(
                "cannot {} transfer {} in status {}",
                action, self.transfer_number, self.status
            )))
        }
    }

    /// Item ids in canonical lock order.
    pub fn item_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.items.iter().map(|line| line.item_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LowStock,
    OutOfStock,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Medium,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockAlert {
    pub id: Uuid,
    pub item_id: Uuid,
    pub warehouse: Option<String>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub current_stock: Decimal,
    pub min_stock: Decimal,
    pub message: String,
    pub status: AlertStatus,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl StockAlert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn transfer_input(mode: TransferMode) -> NewTransfer {
        NewTransfer {
            from_warehouse: "main".to_string(),
            to_warehouse: "branch".to_string(),
            items: vec![NewTransferLine {
                item_id: Uuid::new_v4(),
                quantity: dec!(5),
                unit_price: Some(dec!(12)),
            }],
            mode,
            transfer_ref: None,
            notes: None,
            draft: false,
        }
    }

    #[test]
    fn valuation_method_parses_aliases() {
        assert_eq!("FIFO".parse::<ValuationMethod>().unwrap(), ValuationMethod::Fifo);
        assert_eq!(
            "avco".parse::<ValuationMethod>().unwrap(),
            ValuationMethod::WeightedAverage
        );
        assert!("hifo".parse::<ValuationMethod>().is_err());
    }

    #[test]
    fn document_type_round_trips_through_its_name() {
        for document_type in [
            DocumentType::Receipt,
            DocumentType::Issue,
            DocumentType::TransferIn,
            DocumentType::TransferOut,
            DocumentType::Adjustment,
            DocumentType::Return,
            DocumentType::Count,
        ] {
            assert_eq!(document_type.as_str().parse::<DocumentType>().unwrap(), document_type);
        }
        assert!("shipment".parse::<DocumentType>().is_err());
    }

    #[test]
    fn transfer_rejects_same_warehouse() {
        let mut input = transfer_input(TransferMode::Simple);
        input.to_warehouse = "main".to_string();
        let err = Transfer::new("TRF-000001".to_string(), input, None, Utc::now()).unwrap_err();
        assert!(matches!(err, StockError::Validation { .. }));
    }

    #[test]
    fn transfer_rejects_duplicate_lines() {
        let mut input = transfer_input(TransferMode::Simple);
        let line = input.items[0].clone();
        input.items.push(line);
        assert!(Transfer::new("TRF-000001".to_string(), input, None, Utc::now()).is_err());
    }

    #[test]
    fn transfer_generates_reference_and_totals() {
        let transfer = Transfer::new(
            "TRF-000007".to_string(),
            transfer_input(TransferMode::Simple),
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(transfer.status, TransferStatus::Pending);
        assert!(transfer.transfer_ref.starts_with("TRF-000007/"));
        assert_eq!(transfer.items[0].total_value, dec!(60));
    }

    #[test]
    fn receive_requires_two_stage_in_transit() {
        let mut transfer = Transfer::new(
            "TRF-000001".to_string(),
            transfer_input(TransferMode::Simple),
            None,
            Utc::now(),
        )
        .unwrap();
        transfer.status = TransferStatus::InTransit;
        assert!(transfer.ensure_action_allowed(TransferAction::Receive).is_err());

        transfer.mode = TransferMode::TwoStage;
        assert!(transfer.ensure_action_allowed(TransferAction::Receive).is_ok());
    }

    #[test]
    fn completed_transfer_cannot_be_cancelled() {
        let mut transfer = Transfer::new(
            "TRF-000001".to_string(),
            transfer_input(TransferMode::TwoStage),
            None,
            Utc::now(),
        )
        .unwrap();
        for status in [
            TransferStatus::Draft,
            TransferStatus::Pending,
            TransferStatus::InTransit,
        ] {
            transfer.status = status;
            assert!(transfer.ensure_action_allowed(TransferAction::Cancel).is_ok());
        }
        transfer.status = TransferStatus::Completed;
        let err = transfer
            .ensure_action_allowed(TransferAction::Cancel)
            .unwrap_err();
        assert!(matches!(err, StockError::State(_)));
    }

    #[test]
    fn cost_layer_rejects_non_positive_quantity() {
        let seed = LayerSeed::new(dec!(0), dec!(10));
        assert!(CostLayer::new(Uuid::new_v4(), "main", &seed, Utc::now()).is_err());
    }

    #[test]
    fn average_price_falls_back_when_empty() {
        assert_eq!(average_price(dec!(0), dec!(0), dec!(7)), dec!(7));
        assert_eq!(average_price(dec!(4), dec!(10), dec!(7)), dec!(2.5));
    }
}
