//! Storefront API configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//! A payment provider is only registered when its secret is present, and at
//! least one provider must be configured.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use storefront_core::InventoryPolicy;
use storefront_db::DbConfig;

/// Storefront API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Maximum pooled connections
    pub db_max_connections: u32,

    /// When stock leaves the ledger for an order
    pub inventory_policy: InventoryPolicy,

    /// Storefront base URL (card redirects return here)
    pub frontend_url: String,

    /// Card gateway, if configured
    pub card: Option<CardConfig>,

    /// Mobile-money operator, if configured
    pub mobile_money: Option<MobileMoneyConfig>,

    /// Seconds between timeout sweeps / outbox drains
    pub sweep_interval_secs: u64,

    /// Endpoint receiving payment confirmations (log only when unset)
    pub notification_webhook_url: Option<String>,
}

/// Card gateway credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardConfig {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    /// A card payment still processing after this long is failed by the sweeper
    pub payment_timeout_secs: u64,
}

/// Mobile-money operator credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileMoneyConfig {
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
    pub webhook_secret: String,
    pub payment_timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let card = match lookup("CARD_SECRET_KEY") {
            Some(secret_key) => Some(CardConfig {
                api_base: lookup("CARD_API_BASE")
                    .unwrap_or_else(|| "https://api.stripe.com/v1".to_string()),
                secret_key,
                webhook_secret: required(&lookup, "CARD_WEBHOOK_SECRET")?,
                payment_timeout_secs: parse_or(&lookup, "CARD_PAYMENT_TIMEOUT_SECS", 1800)?, // 30 minutes
            }),
            None => None,
        };

        let mobile_money = match lookup("MOBILE_MONEY_CLIENT_SECRET") {
            Some(client_secret) => Some(MobileMoneyConfig {
                api_base: lookup("MOBILE_MONEY_API_BASE")
                    .unwrap_or_else(|| "https://payments.paypack.rw/api".to_string()),
                client_id: required(&lookup, "MOBILE_MONEY_CLIENT_ID")?,
                client_secret,
                webhook_secret: required(&lookup, "MOBILE_MONEY_WEBHOOK_SECRET")?,
                payment_timeout_secs: parse_or(&lookup, "MOBILE_MONEY_PAYMENT_TIMEOUT_SECS", 600)?, // 10 minutes
            }),
            None => None,
        };

        let config = AppConfig {
            database_path: lookup("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./storefront.db")),

            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,

            inventory_policy: parse_or(&lookup, "INVENTORY_POLICY", InventoryPolicy::OnPayment)?,

            frontend_url: lookup("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),

            card,
            mobile_money,

            sweep_interval_secs: parse_or(&lookup, "SWEEP_INTERVAL_SECS", 60)?,

            notification_webhook_url: lookup("NOTIFICATION_WEBHOOK_URL"),
        };

        if config.card.is_none() && config.mobile_money.is_none() {
            return Err(ConfigError::MissingRequired(
                "CARD_SECRET_KEY or MOBILE_MONEY_CLIENT_SECRET".to_string(),
            ));
        }
        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }
        if config.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("SWEEP_INTERVAL_SECS".to_string()));
        }

        Ok(config)
    }

    /// Database pool settings derived from this configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone()).max_connections(self.db_max_connections)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or_else(|| ConfigError::MissingRequired(key.to_string()))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
