//! # Payment Provider Adapters
//!
//! Every external processor is reached through [`PaymentProvider`]. The
//! services never know which vendor sits behind a method; adapters are built
//! once at startup and injected through the [`ProviderRegistry`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PaymentService ──► registry.get(method) ──► dyn PaymentProvider       │
//! │                                                │                        │
//! │                        ┌───────────────────────┴──────────────┐         │
//! │                        ▼                                      ▼         │
//! │                 CardProvider                        MobileMoneyProvider │
//! │          payment intents, hex HMAC            cash-in, base64 HMAC      │
//! │          over "{t}.{body}"                    over the raw body         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod card;
pub mod mobile_money;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use storefront_core::payment::{PaymentPayload, ProviderResult, StatusReport};
use storefront_core::{Money, PaymentMethod};

use crate::config::AppConfig;

pub use card::CardProvider;
pub use mobile_money::MobileMoneyProvider;

/// Upper bound for a single provider HTTP call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Requests / Responses
// =============================================================================

/// One charge against a provider.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Our payment id; doubles as the provider idempotency key.
    pub payment_id: String,
    pub order_id: String,
    pub order_number: String,
    pub amount: Money,
    pub currency: String,
    pub payload: PaymentPayload,
}

/// What `charge` hands back to the payment service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeResponse {
    pub result: ProviderResult,
    /// Continuation data for the client (card client secret).
    pub client_secret: Option<String>,
}

/// A verified webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// The event reports a status for a provider reference.
    Report(StatusReport),
    /// Authentic, but not about a payment status.
    Ignored { event_type: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Unsupported request: {0}")]
    Unsupported(String),
}

// =============================================================================
// Provider Trait
// =============================================================================

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// The method this adapter serves.
    fn method(&self) -> PaymentMethod;

    /// How long a payment may stay `processing` before the sweeper fails it.
    fn timeout(&self) -> Duration;

    /// Creates a charge. Must not be retried automatically.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, ProviderError>;

    /// Current provider view of an existing charge.
    async fn retrieve_status(&self, provider_ref: &str) -> Result<ProviderResult, ProviderError>;

    /// Authenticates and decodes a webhook body.
    fn parse_webhook(&self, signature: &str, body: &[u8]) -> Result<WebhookEvent, ProviderError>;
}

// =============================================================================
// Registry
// =============================================================================

/// Configured providers keyed by method.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<PaymentMethod, Arc<dyn PaymentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every provider whose credentials are configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let mut registry = ProviderRegistry::new();
        if let Some(card) = &config.card {
            registry.register(Arc::new(CardProvider::new(card, &config.frontend_url)?));
        }
        if let Some(mobile_money) = &config.mobile_money {
            registry.register(Arc::new(MobileMoneyProvider::new(mobile_money)?));
        }
        Ok(registry)
    }

    /// Adds (or replaces) the adapter for its method.
    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers.insert(provider.method(), provider);
    }

    pub fn get(&self, method: PaymentMethod) -> Option<Arc<dyn PaymentProvider>> {
        self.providers.get(&method).cloned()
    }

    /// Configured methods in a stable order.
    pub fn methods(&self) -> Vec<PaymentMethod> {
        let mut methods: Vec<PaymentMethod> = self.providers.keys().copied().collect();
        methods.sort_by_key(|m| m.as_str());
        methods
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PaymentProvider>> {
        self.providers.values()
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    #[test]
    fn test_registry_from_config() {
        let vars: Map<&str, &str> = [
            ("CARD_SECRET_KEY", "sk_test"),
            ("CARD_WEBHOOK_SECRET", "whsec"),
            ("MOBILE_MONEY_CLIENT_ID", "id"),
            ("MOBILE_MONEY_CLIENT_SECRET", "secret"),
            ("MOBILE_MONEY_WEBHOOK_SECRET", "hook"),
        ]
        .into_iter()
        .collect();
        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(
            registry.methods(),
            vec![PaymentMethod::Card, PaymentMethod::MobileMoney]
        );
        let card = registry.get(PaymentMethod::Card).unwrap();
        assert_eq!(card.timeout(), Duration::from_secs(1800));
    }

    #[test]
    fn test_empty_registry() {
        let registry = ProviderRegistry::new();
        assert!(registry.get(PaymentMethod::Card).is_none());
        assert!(registry.methods().is_empty());
    }
}
