//! # Storefront API
//!
//! Order, payment and reconciliation services for the storefront.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Storefront Services                             │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  OrderService  │  │ PaymentService │  │  WebhookHandler            ││
//! │  │                │  │                │  │                            ││
//! │  │ • create       │  │ • initiate     │  │ • verify signature         ││
//! │  │ • lookups      │  │ • status (poll)│  │ • reconcile report         ││
//! │  │ • fulfillment  │  │ • methods      │  │ • ack unknown/ignored      ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! │           │                  │                        │                 │
//! │           └──────────────────┼────────────────────────┘                 │
//! │                              ▼                                          │
//! │               ┌──────────────────────────────┐                          │
//! │               │   ReconciliationService      │                          │
//! │               │   status guard → settle/fail │                          │
//! │               └──────────────┬───────────────┘                          │
//! │                              ▼                                          │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Infrastructure                               │  │
//! │  │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────────────┐│  │
//! │  │  │  SQLite      │  │ ProviderRegistry │  │  PaymentSweeper      ││  │
//! │  │  │ (storefront- │  │ card, mobile     │  │  timeouts + outbox   ││  │
//! │  │  │  db)         │  │ money            │  │                      ││  │
//! │  │  └──────────────┘  └──────────────────┘  └──────────────────────┘│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! HTTP routing is left to the embedding server; every entry point takes and
//! returns plain serde types and reports failures as [`ServiceError`] with a
//! `status_code()`.
//!
//! ## Configuration
//! Environment variables (see [`AppConfig`]):
//! - `DATABASE_PATH` - SQLite file (default: ./storefront.db)
//! - `INVENTORY_POLICY` - `on_payment` (default) or `at_checkout`
//! - `CARD_SECRET_KEY` / `CARD_WEBHOOK_SECRET` - card gateway
//! - `MOBILE_MONEY_CLIENT_ID` / `MOBILE_MONEY_CLIENT_SECRET` / `MOBILE_MONEY_WEBHOOK_SECRET`
//! - `SWEEP_INTERVAL_SECS` - timeout sweep period (default: 60)
//! - `NOTIFICATION_WEBHOOK_URL` - confirmation endpoint (default: log only)

pub mod config;
pub mod error;
pub mod providers;
pub mod services;

use std::sync::Arc;

use storefront_db::Database;

// Re-exports
pub use config::{AppConfig, ConfigError};
pub use error::{ServiceError, ServiceResult};
pub use providers::{PaymentProvider, ProviderError, ProviderRegistry};
pub use services::notification::Notifier;

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub providers: ProviderRegistry,
    pub notifier: Arc<dyn Notifier>,
    pub config: AppConfig,
}

impl AppState {
    /// Builds providers and the notifier from configuration.
    pub fn from_config(db: Database, config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let providers = ProviderRegistry::from_config(&config)?;
        let notifier = services::notification::notifier_from_config(&config)?;
        Ok(AppState {
            db,
            providers,
            notifier,
            config,
        })
    }
}
