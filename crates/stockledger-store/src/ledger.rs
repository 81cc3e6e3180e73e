use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use stockledger_core::{DocumentType, LedgerEntry, LedgerRepository, sort_chronologically};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryLedgerRepository {
    entries: RwLock<HashMap<Uuid, LedgerEntry>>,
    sequence: RwLock<i64>,
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn insert(&self, mut entry: LedgerEntry) -> anyhow::Result<LedgerEntry> {
        let mut sequence_guard = self.sequence.write().await;
        *sequence_guard += 1;
        entry.sequence = *sequence_guard;

        let mut entries = self.entries.write().await;
        entries.insert(entry.id, entry.clone());

        Ok(entry)
    }

    async fn update(&self, entry: &LedgerEntry) -> anyhow::Result<()> {
        let mut entries = self.entries.write().await;
        let slot = entries
            .get_mut(&entry.id)
            .with_context(|| format!("ledger entry {} does not exist", entry.id))?;
        *slot = entry.clone();
        Ok(())
    }

    async fn delete(&self, entry_id: Uuid) -> anyhow::Result<Option<LedgerEntry>> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(&entry_id))
    }

    async fn get(&self, entry_id: Uuid) -> anyhow::Result<Option<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&entry_id).cloned())
    }

    async fn latest_for_item(&self, item_id: Uuid) -> anyhow::Result<Option<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|entry| entry.item_id == item_id)
            .max_by_key(|entry| entry.ordering_key())
            .cloned())
    }

    async fn list_for_item(&self, item_id: Uuid) -> anyhow::Result<Vec<LedgerEntry>> {
        let entries = self.entries.read().await;
        let mut history: Vec<LedgerEntry> = entries
            .values()
            .filter(|entry| entry.item_id == item_id)
            .cloned()
            .collect();
        sort_chronologically(&mut history);
        Ok(history)
    }

    async fn count_by_type(&self, document_type: DocumentType) -> anyhow::Result<u64> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|entry| entry.document_type == document_type)
            .count() as u64)
    }

    async fn find_by_reference(
        &self,
        item_id: Uuid,
        warehouse: &str,
        document_type: DocumentType,
        reference: &str,
    ) -> anyhow::Result<Vec<LedgerEntry>> {
        let entries = self.entries.read().await;
        let mut found: Vec<LedgerEntry> = entries
            .values()
            .filter(|entry| {
                entry.item_id == item_id
                    && entry.warehouse == warehouse
                    && entry.document_type == document_type
                    && entry.reference.as_deref() == Some(reference)
            })
            .cloned()
            .collect();
        sort_chronologically(&mut found);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    fn entry(item_id: Uuid, document_type: DocumentType, days_ago: i64) -> LedgerEntry {
        let now = Utc::now();
        LedgerEntry {
            id: Uuid::new_v4(),
            sequence: 0,
            item_id,
            warehouse: "main".to_string(),
            document_type,
            document_number: String::new(),
            quantity_in: dec!(1),
            quantity_out: Decimal::ZERO,
            unit_price: dec!(1),
            running_balance: Decimal::ZERO,
            running_value: Decimal::ZERO,
            average_price: Decimal::ZERO,
            date: now - Duration::days(days_ago),
            created_at: now,
            reference: Some("REF-1".to_string()),
            notes: None,
            user_id: None,
            lot_number: None,
            expiration_date: None,
            inbound_layers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_sequence() {
        let repo = InMemoryLedgerRepository::default();
        let item = Uuid::new_v4();
        let first = repo.insert(entry(item, DocumentType::Receipt, 0)).await.unwrap();
        let second = repo.insert(entry(item, DocumentType::Issue, 0)).await.unwrap();
        assert!(second.sequence > first.sequence);
        assert_eq!(repo.count_by_type(DocumentType::Receipt).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn latest_follows_document_date_not_insertion() {
        let repo = InMemoryLedgerRepository::default();
        let item = Uuid::new_v4();
        let recent = repo.insert(entry(item, DocumentType::Receipt, 0)).await.unwrap();
        let backdated = repo.insert(entry(item, DocumentType::Receipt, 3)).await.unwrap();

        let latest = repo.latest_for_item(item).await.unwrap().unwrap();
        assert_eq!(latest.id, recent.id);

        let history = repo.list_for_item(item).await.unwrap();
        assert_eq!(history.first().map(|e| e.id), Some(backdated.id));
    }

    #[tokio::test]
    async fn find_by_reference_filters_side() {
        let repo = InMemoryLedgerRepository::default();
        let item = Uuid::new_v4();
        repo.insert(entry(item, DocumentType::TransferOut, 0)).await.unwrap();
        let found = repo
            .find_by_reference(item, "main", DocumentType::TransferOut, "REF-1")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        let other_side = repo
            .find_by_reference(item, "main", DocumentType::TransferIn, "REF-1")
            .await
            .unwrap();
        assert!(other_side.is_empty());
    }
}
