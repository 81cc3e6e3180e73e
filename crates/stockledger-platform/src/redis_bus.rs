use anyhow::{Context, Result};
use redis::aio::PubSub;
use redis::{AsyncCommands, Client, Msg};
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("invalid REDIS_URL")?;
        Ok(Self { client })
    }

    pub async fn subscribe(&self, channel: &str) -> Result<PubSub> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(channel)
            .await
            .with_context(|| format!("failed to subscribe to {channel}"))?;
        Ok(pubsub)
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }
}

/// Decodes a JSON message payload.
pub fn decode_json<T: DeserializeOwned>(msg: &Msg) -> Result<T> {
    let payload: String = msg.get_payload()?;
    serde_json::from_str(&payload)
        .with_context(|| format!("malformed message on {}", msg.get_channel_name()))
}
