pub mod config;
pub mod contracts;
pub mod db;
pub mod pg_store;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{CommandEnvelope, CommandOutcome, InventoryCommand};
pub use db::{PgAuditSink, connect_database, ensure_schema};
pub use pg_store::{
    PgAlertRepository, PgBalanceRepository, PgItemMaster, PgLayerRepository, PgLedgerRepository,
    PgStore, PgTransferRepository,
};
pub use redis_bus::{RedisBus, decode_json};
