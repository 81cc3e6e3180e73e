use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use stockledger_core::{AuditRecord, AuditSink};
use tokio::sync::RwLock;

/// Keeps every record in memory. `set_failing(true)` makes every write fail.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
    failing: AtomicBool,
}

impl InMemoryAuditSink {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("audit sink unavailable");
        }
        self.records.write().await.push(record);
        Ok(())
    }
}
