use anyhow::{Context, Result};

pub const DEFAULT_COMMAND_CHANNEL: &str = "inventory.commands";
pub const DEFAULT_RESULT_CHANNEL: &str = "inventory.results";
pub const DEFAULT_COST_SCALE: u32 = 6;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub redis_url: String,
    pub database_url: String,
    pub command_channel: String,
    pub result_channel: String,
    pub cost_scale: u32,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let redis_url = lookup("REDIS_URL").context("REDIS_URL is required")?;
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .context("DATABASE_URL is required")?;
        let command_channel = lookup("STOCKLEDGER_COMMAND_CHANNEL")
            .unwrap_or_else(|| DEFAULT_COMMAND_CHANNEL.to_string());
        let result_channel = lookup("STOCKLEDGER_RESULT_CHANNEL")
            .unwrap_or_else(|| DEFAULT_RESULT_CHANNEL.to_string());

        let cost_scale = match lookup("STOCKLEDGER_COST_SCALE") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("STOCKLEDGER_COST_SCALE must be an integer, got {raw}"))?,
            None => DEFAULT_COST_SCALE,
        };
        anyhow::ensure!(
            cost_scale <= 28,
            "STOCKLEDGER_COST_SCALE must be at most 28, got {cost_scale}"
        );

        Ok(Self {
            redis_url,
            database_url,
            command_channel,
            result_channel,
            cost_scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<ServiceConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_connections_are_set() {
        let config = config(&[
            ("REDIS_URL", "redis://localhost"),
            ("DATABASE_URL", "postgres://localhost/stock"),
        ])
        .unwrap();
        assert_eq!(config.command_channel, DEFAULT_COMMAND_CHANNEL);
        assert_eq!(config.result_channel, DEFAULT_RESULT_CHANNEL);
        assert_eq!(config.cost_scale, 6);
        assert_eq!(config.database_url, "postgres://localhost/stock");
    }

    #[test]
    fn connection_urls_are_required() {
        let err = config(&[("DATABASE_URL", "postgres://x")]).unwrap_err();
        assert!(err.to_string().contains("REDIS_URL"));

        let err = config(&[("REDIS_URL", "redis://x"), ("DATABASE_URL", " ")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn cost_scale_is_validated() {
        let with_scale = |scale: &'static str| {
            config(&[
                ("REDIS_URL", "redis://x"),
                ("DATABASE_URL", "postgres://x"),
                ("STOCKLEDGER_COST_SCALE", scale),
            ])
        };
        assert!(with_scale("four").is_err());
        assert!(with_scale("40").is_err());
        let config = with_scale("4").unwrap();
        assert_eq!(config.cost_scale, 4);
    }
}
