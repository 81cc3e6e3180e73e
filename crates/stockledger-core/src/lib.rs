pub mod audit;
pub mod error;
pub mod models;
pub mod storage;

pub use audit::{ActorContext, AuditRecord};
pub use error::{ErrorKind, StockError, StockResult};
pub use models::{
    AlertSeverity, AlertStatus, AlertType, CostLayer, DocumentType, ItemProfile, LayerSeed,
    LedgerEntry, NewTransfer, NewTransferLine, StockAlert, Transfer, TransferAction, TransferLine,
    TransferMode, TransferStatus, ValuationMethod, WarehouseBalance, average_price,
    sort_chronologically,
};
pub use storage::{
    AlertRepository, AuditSink, BalanceRepository, ItemMaster, ItemRegistry, LayerRepository,
    LedgerRepository, TransferRepository,
};
