mod alerts;
mod audit;
mod balances;
mod items;
mod layers;
mod ledger;
mod transfers;

pub use alerts::InMemoryAlertRepository;
pub use audit::InMemoryAuditSink;
pub use balances::InMemoryBalanceRepository;
pub use items::{AggregateStock, InMemoryItemMaster};
pub use layers::InMemoryLayerRepository;
pub use ledger::InMemoryLedgerRepository;
pub use transfers::InMemoryTransferRepository;
