use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockledger_core::{ActorContext, ItemProfile, NewTransfer, StockError, TransferAction};
use stockledger_inventory::{LedgerEntryPatch, NewLedgerEntry};
use uuid::Uuid;

/// One request on the command channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(default = "Uuid::new_v4")]
    pub command_id: Uuid,
    #[serde(flatten)]
    pub command: InventoryCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryCommand {
    RegisterItem {
        item: ItemProfile,
    },
    AppendEntry {
        entry: NewLedgerEntry,
    },
    UpdateEntry {
        entry_id: Uuid,
        patch: LedgerEntryPatch,
        #[serde(default = "ActorContext::system")]
        actor: ActorContext,
    },
    DeleteEntry {
        entry_id: Uuid,
        #[serde(default = "ActorContext::system")]
        actor: ActorContext,
    },
    CreateTransfer {
        transfer: NewTransfer,
        #[serde(default = "ActorContext::system")]
        actor: ActorContext,
    },
    TransferAction {
        transfer_id: Uuid,
        action: TransferAction,
        #[serde(default = "ActorContext::system")]
        actor: ActorContext,
    },
    ReconcileItem {
        item_id: Uuid,
    },
    RecheckAlerts {
        item_id: Uuid,
    },
    ItemValuation {
        item_id: Uuid,
    },
}

impl InventoryCommand {
    pub fn name(&self) -> &'static str {
        match self {
            InventoryCommand::RegisterItem { .. } => "register_item",
            InventoryCommand::AppendEntry { .. } => "append_entry",
            InventoryCommand::UpdateEntry { .. } => "update_entry",
            InventoryCommand::DeleteEntry { .. } => "delete_entry",
            InventoryCommand::CreateTransfer { .. } => "create_transfer",
            InventoryCommand::TransferAction { .. } => "transfer_action",
            InventoryCommand::ReconcileItem { .. } => "reconcile_item",
            InventoryCommand::RecheckAlerts { .. } => "recheck_alerts",
            InventoryCommand::ItemValuation { .. } => "item_valuation",
        }
    }
}

/// Published on the result channel for every command that could be decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command_id: Uuid,
    pub command: String,
    pub ok: bool,
    /// Stable error code when `ok` is false.
    pub kind: Option<String>,
    pub message: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub processed_at: DateTime<Utc>,
}

impl CommandOutcome {
    pub fn success(envelope: &CommandEnvelope, payload: serde_json::Value) -> Self {
        Self {
            command_id: envelope.command_id,
            command: envelope.command.name().to_string(),
            ok: true,
            kind: None,
            message: None,
            payload: Some(payload),
            processed_at: Utc::now(),
        }
    }

    pub fn failure(envelope: &CommandEnvelope, err: &StockError) -> Self {
        Self {
            command_id: envelope.command_id,
            command: envelope.command.name().to_string(),
            ok: false,
            kind: Some(err.kind().code().to_string()),
            message: Some(err.to_string()),
            payload: None,
            processed_at: Utc::now(),
        }
    }
}
