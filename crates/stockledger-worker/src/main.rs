mod dispatch;

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use redis::Msg;
use stockledger_inventory::{EngineConfig, InventoryEngine};
use stockledger_platform::{
    CommandEnvelope, PgAuditSink, PgStore, RedisBus, ServiceConfig, connect_database, decode_json,
    ensure_schema,
};
use tracing::{error, info};

use crate::dispatch::Dispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "stockledger_worker=info,stockledger_inventory=info".to_string()
        }))
        .init();

    let config = ServiceConfig::from_env()?;
    let pool = connect_database(&config.database_url).await?;
    ensure_schema(&pool).await?;

    let store = PgStore::new(pool.clone());
    let repos = store.repositories(Arc::new(PgAuditSink::new(pool)));
    let engine = InventoryEngine::new(
        repos,
        EngineConfig {
            cost_scale: config.cost_scale,
        },
    );
    let dispatcher = Dispatcher::new(engine, store.items());
    let redis = RedisBus::connect(&config.redis_url)?;

    let mut pubsub = redis.subscribe(&config.command_channel).await?;
    let mut messages = pubsub.on_message();

    info!(
        "stockledger worker subscribed to {}, publishing to {}",
        config.command_channel, config.result_channel
    );

    loop {
        let msg = messages
            .next()
            .await
            .with_context(|| format!("{} stream ended unexpectedly", config.command_channel))?;
        if let Err(err) = handle_message(&dispatcher, &redis, &config.result_channel, msg).await {
            error!("failed to process message: {err:#}");
        }
    }
}

async fn handle_message(
    dispatcher: &Dispatcher,
    redis: &RedisBus,
    result_channel: &str,
    msg: Msg,
) -> Result<()> {
    let envelope: CommandEnvelope = decode_json(&msg)?;
    let outcome = dispatcher.execute(envelope).await;
    redis.publish_json(result_channel, &outcome).await?;
    if outcome.ok {
        info!("command {} ({}) done", outcome.command_id, outcome.command);
    }
    Ok(())
}
