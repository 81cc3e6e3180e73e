use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;
use stockledger_core::{CostLayer, LayerRepository};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Layers are kept in insertion order; ties on `created_at` resolve to that order.
#[derive(Default)]
pub struct InMemoryLayerRepository {
    layers: RwLock<Vec<CostLayer>>,
}

#[async_trait]
impl LayerRepository for InMemoryLayerRepository {
    async fn insert(&self, layer: CostLayer) -> anyhow::Result<CostLayer> {
        let mut layers = self.layers.write().await;
        anyhow::ensure!(
            layers.iter().all(|existing| existing.id != layer.id),
            "cost layer {} already exists",
            layer.id
        );
        layers.push(layer.clone());
        Ok(layer)
    }

    async fn open_layers(&self, item_id: Uuid, warehouse: &str) -> anyhow::Result<Vec<CostLayer>> {
        let layers = self.layers.read().await;
        let mut open: Vec<CostLayer> = layers
            .iter()
            .filter(|layer| {
                layer.item_id == item_id && layer.warehouse == warehouse && !layer.is_exhausted()
            })
            .cloned()
            .collect();
        open.sort_by_key(|layer| layer.created_at);
        Ok(open)
    }

    async fn set_remaining(&self, layer_id: Uuid, remaining: Decimal) -> anyhow::Result<()> {
        let mut layers = self.layers.write().await;
        let layer = layers
            .iter_mut()
            .find(|layer| layer.id == layer_id)
            .with_context(|| format!("cost layer {layer_id} does not exist"))?;
        anyhow::ensure!(
            remaining >= Decimal::ZERO && remaining <= layer.quantity,
            "remaining quantity {remaining} out of range for layer {layer_id}"
        );
        layer.remaining_quantity = remaining;
        Ok(())
    }

    async fn list_for_item(&self, item_id: Uuid) -> anyhow::Result<Vec<CostLayer>> {
        let layers = self.layers.read().await;
        let mut found: Vec<CostLayer> = layers
            .iter()
            .filter(|layer| layer.item_id == item_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            (a.warehouse.as_str(), a.created_at).cmp(&(b.warehouse.as_str(), b.created_at))
        });
        Ok(found)
    }

    async fn replace_for_item(&self, item_id: Uuid, replacement: Vec<CostLayer>) -> anyhow::Result<()> {
        for layer in &replacement {
            anyhow::ensure!(
                layer.item_id == item_id,
                "layer {} belongs to item {}, not {item_id}",
                layer.id,
                layer.item_id
            );
        }
        let mut layers = self.layers.write().await;
        layers.retain(|layer| layer.item_id != item_id);
        layers.extend(replacement);
        Ok(())
    }
}
