use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use stockledger_core::{Transfer, TransferRepository};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryTransferRepository {
    transfers: RwLock<HashMap<Uuid, Transfer>>,
}

#[async_trait]
impl TransferRepository for InMemoryTransferRepository {
    async fn insert(&self, transfer: Transfer) -> anyhow::Result<Transfer> {
        let mut transfers = self.transfers.write().await;
        anyhow::ensure!(
            !transfers.contains_key(&transfer.id),
            "transfer {} already exists",
            transfer.id
        );
        transfers.insert(transfer.id, transfer.clone());
        Ok(transfer)
    }

    async fn get(&self, transfer_id: Uuid) -> anyhow::Result<Option<Transfer>> {
        let transfers = self.transfers.read().await;
        Ok(transfers.get(&transfer_id).cloned())
    }

    async fn update(&self, transfer: &Transfer) -> anyhow::Result<()> {
        let mut transfers = self.transfers.write().await;
        let slot = transfers
            .get_mut(&transfer.id)
            .with_context(|| format!("transfer {} does not exist", transfer.id))?;
        *slot = transfer.clone();
        Ok(())
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let transfers = self.transfers.read().await;
        Ok(transfers.len() as u64)
    }
}
