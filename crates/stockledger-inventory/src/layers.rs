use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use stockledger_core::{
    CostLayer, LayerRepository, LayerSeed, StockError, StockResult, ValuationMethod,
};
use tracing::debug;
use uuid::Uuid;

/// Part of a consumption drawn from one layer. `layer_id` is `None` for synthesized slices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumedSlice {
    pub layer_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub remaining_after: Decimal,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consumption {
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub slices: Vec<ConsumedSlice>,
}

impl Consumption {
    /// One synthesized slice covering the full quantity at `unit_price`.
    pub fn synthetic(quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            quantity,
            total_cost: quantity * unit_price,
            slices: vec![ConsumedSlice {
                layer_id: None,
                quantity,
                unit_price,
                remaining_after: Decimal::ZERO,
                lot_number: None,
                expiration_date: None,
            }],
        }
    }

    pub fn unit_cost(&self, cost_scale: u32) -> Decimal {
        if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            (self.total_cost / self.quantity).round_dp(cost_scale)
        }
    }

    /// Seeds that recreate the consumed cost structure elsewhere.
    pub fn as_seeds(&self) -> Vec<LayerSeed> {
        self.slices
            .iter()
            .map(|slice| LayerSeed {
                quantity: slice.quantity,
                unit_price: slice.unit_price,
                lot_number: slice.lot_number.clone(),
                expiration_date: slice.expiration_date,
            })
            .collect()
    }
}

/// Greedy consumption over `layers` in FIFO or LIFO order.
///
/// An empty layer set yields one synthetic slice at `fallback_price`. When the layers
/// cannot cover `quantity` the call fails unless `allow_shortfall` is set, in which case
/// the missing quantity is priced like the last layer drawn from.
pub fn plan_consumption(
    layers: &[CostLayer],
    method: ValuationMethod,
    quantity: Decimal,
    allow_shortfall: bool,
    fallback_price: Decimal,
) -> StockResult<Consumption> {
    if quantity <= Decimal::ZERO {
        return Ok(Consumption {
            quantity: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            slices: Vec::new(),
        });
    }

    let mut ordered: Vec<&CostLayer> = layers.iter().filter(|layer| !layer.is_exhausted()).collect();
    if ordered.is_empty() {
        return Ok(Consumption::synthetic(quantity, fallback_price));
    }
    ordered.sort_by_key(|layer| layer.created_at);
    if method == ValuationMethod::Lifo {
        ordered.reverse();
    }

    let mut remaining = quantity;
    let mut total_cost = Decimal::ZERO;
    let mut slices = Vec::new();

    for layer in ordered {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(layer.remaining_quantity);
        total_cost += take * layer.unit_price;
        remaining -= take;
        slices.push(ConsumedSlice {
            layer_id: Some(layer.id),
            quantity: take,
            unit_price: layer.unit_price,
            remaining_after: layer.remaining_quantity - take,
            lot_number: layer.lot_number.clone(),
            expiration_date: layer.expiration_date,
        });
    }

    if !remaining.is_zero() {
        if !allow_shortfall {
            return Err(StockError::Consistency(format!(
                "requested {quantity} but cost layers only hold {}",
                quantity - remaining
            )));
        }
        let price = slices
            .last()
            .map(|slice| slice.unit_price)
            .unwrap_or(fallback_price);
        total_cost += remaining * price;
        slices.push(ConsumedSlice {
            layer_id: None,
            quantity: remaining,
            unit_price: price,
            remaining_after: Decimal::ZERO,
            lot_number: None,
            expiration_date: None,
        });
    }

    Ok(Consumption {
        quantity,
        total_cost,
        slices,
    })
}

/// Applies a planned consumption to an in-memory layer set.
pub fn apply_to_book(book: &mut [CostLayer], consumption: &Consumption) {
    for slice in &consumption.slices {
        let Some(layer_id) = slice.layer_id else {
            continue;
        };
        if let Some(layer) = book.iter_mut().find(|layer| layer.id == layer_id) {
            layer.remaining_quantity = slice.remaining_after;
        }
    }
}

pub struct CostLayerStore {
    repo: Arc<dyn LayerRepository>,
}

impl CostLayerStore {
    pub fn new(repo: Arc<dyn LayerRepository>) -> Self {
        Self { repo }
    }

    pub async fn add_layer(
        &self,
        item_id: Uuid,
        warehouse: &str,
        seed: &LayerSeed,
        created_at: DateTime<Utc>,
        source_entry_id: Option<Uuid>,
    ) -> StockResult<CostLayer> {
        let mut layer = CostLayer::new(item_id, warehouse, seed, created_at)?;
        layer.source_entry_id = source_entry_id;
        let layer = self.repo.insert(layer).await?;
        debug!(
            "layer {} added for item {} in {}: {} @ {}",
            layer.id, item_id, warehouse, layer.quantity, layer.unit_price
        );
        Ok(layer)
    }

    pub async fn list_for_item(&self, item_id: Uuid) -> StockResult<Vec<CostLayer>> {
        Ok(self.repo.list_for_item(item_id).await?)
    }

    /// Read-only: computes what consuming `quantity` would take from the stored layers.
    pub async fn plan(
        &self,
        item_id: Uuid,
        warehouse: &str,
        method: ValuationMethod,
        quantity: Decimal,
        allow_shortfall: bool,
        fallback_price: Decimal,
    ) -> StockResult<Consumption> {
        let layers = self.repo.open_layers(item_id, warehouse).await?;
        plan_consumption(&layers, method, quantity, allow_shortfall, fallback_price)
    }

    pub async fn apply(&self, consumption: &Consumption) -> StockResult<()> {
        for slice in &consumption.slices {
            if let Some(layer_id) = slice.layer_id {
                self.repo.set_remaining(layer_id, slice.remaining_after).await?;
            }
        }
        Ok(())
    }

    pub async fn replace_for_item(&self, item_id: Uuid, layers: Vec<CostLayer>) -> StockResult<()> {
        Ok(self.repo.replace_for_item(item_id, layers).await?)
    }
}
