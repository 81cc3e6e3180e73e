use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Per-item exclusive execution locks.
///
/// Every read-latest-then-write sequence on an item runs under that item's lock.
/// Multi-item callers go through [`ItemLocks::lock_many`], which always acquires in
/// ascending item id order.
#[derive(Clone, Default)]
pub struct ItemLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

/// Holds one or more item locks until dropped.
pub struct ItemGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ItemLocks {
    async fn slot(&self, item_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // a slot nobody holds or waits on is only referenced by the map
        locks.retain(|_, slot| Arc::strong_count(slot) > 1);
        locks.entry(item_id).or_default().clone()
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn lock(&self, item_id: Uuid) -> ItemGuard {
        let slot = self.slot(item_id).await;
        ItemGuard {
            _guards: vec![slot.lock_owned().await],
        }
    }

    pub async fn lock_many(&self, item_ids: &[Uuid]) -> ItemGuard {
        let mut ordered = item_ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for item_id in ordered {
            let slot = self.slot(item_id).await;
            guards.push(slot.lock_owned().await);
        }
        ItemGuard { _guards: guards }
    }
}
