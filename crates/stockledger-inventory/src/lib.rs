pub mod alerts;
pub mod balances;
pub mod config;
pub mod engine;
pub mod layers;
pub mod ledger;
pub mod locks;
pub mod reconcile;
pub mod transfers;
pub mod valuation;

pub use alerts::{AlertEngine, classify};
pub use balances::{BalanceAggregator, ItemTotal};
pub use config::EngineConfig;
pub use engine::{InventoryEngine, ItemValuation, Repositories};
pub use layers::{ConsumedSlice, Consumption, CostLayerStore, plan_consumption};
pub use ledger::{Costing, LedgerEntryPatch, LedgerStore, NewLedgerEntry};
pub use locks::{ItemGuard, ItemLocks};
pub use reconcile::{ReconcileReport, Replay, replay};
pub use valuation::{Movement, OutflowCost, Position, value_movement};
