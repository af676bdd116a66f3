//! Mobile-money adapter (agent cash-in API).
//!
//! ## Flow
//! ```text
//! charge ──► POST /auth/agents/authorize   (token cached until expiry)
//!        ──► POST /transactions/cashin     { amount, number }
//!             └─► { ref, status: "pending" }     customer approves on phone
//!
//! webhook ◄── transaction:processed { ref, status: successful | failed }
//!             signed: base64(HMAC-SHA256(secret, raw body))
//!
//! poll   ──► GET /events/transactions?ref=...
//! ```
//!
//! The operator only moves whole currency units; amounts with a fractional
//! part are refused before any request is sent.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::Mutex;
use tracing::{debug, info};

use storefront_core::payment::{PaymentPayload, ProviderResult, StatusReport};
use storefront_core::{PaymentMethod, PaymentStatus};

use super::{
    http_client, ChargeRequest, ChargeResponse, PaymentProvider, ProviderError, WebhookEvent,
};
use crate::config::MobileMoneyConfig;

/// Refresh the access token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 30;

/// Event kind carrying a final transaction status.
const PROCESSED_EVENT: &str = "transaction:processed";

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access: String,
    /// Unix seconds.
    expires: Option<i64>,
}

pub struct MobileMoneyProvider {
    client: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    webhook_secret: String,
    timeout: Duration,
    token: Mutex<Option<AccessToken>>,
}

impl MobileMoneyProvider {
    pub fn new(config: &MobileMoneyConfig) -> Result<Self, ProviderError> {
        Ok(MobileMoneyProvider {
            client: http_client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
            timeout: Duration::from_secs(config.payment_timeout_secs),
            token: Mutex::new(None),
        })
    }

    /// Returns a valid access token, authorizing again when needed.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now {
                return Ok(token.value.clone());
            }
        }

        debug!("Authorizing mobile-money agent");
        let resp = self
            .client
            .post(format!("{}/auth/agents/authorize", self.api_base))
            .json(&json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
            }))
            .send()
            .await?;
        let auth: AuthResponse = read_json(resp).await.and_then(|body| {
            serde_json::from_value(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
        })?;

        let expires_at = auth
            .expires
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| now + chrono::Duration::minutes(10));
        *cached = Some(AccessToken {
            value: auth.access.clone(),
            expires_at,
        });

        Ok(auth.access)
    }
}

#[async_trait]
impl PaymentProvider for MobileMoneyProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::MobileMoney
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, ProviderError> {
        let PaymentPayload::MobileMoney { mobile_number, .. } = &request.payload else {
            return Err(ProviderError::Unsupported(
                "mobile-money provider needs a mobile-money payload".to_string(),
            ));
        };
        let amount = whole_units(request.amount.cents())?;

        let token = self.access_token().await?;
        let resp = self
            .client
            .post(format!("{}/transactions/cashin", self.api_base))
            .bearer_auth(token)
            .header("Idempotency-Key", request.payment_id.as_str())
            .json(&json!({ "amount": amount, "number": mobile_number }))
            .send()
            .await?;
        let body = read_json(resp).await?;

        let provider_ref = body["ref"]
            .as_str()
            .ok_or_else(|| ProviderError::InvalidResponse(format!("cash-in without ref: {body}")))?;

        info!(
            payment_id = %request.payment_id,
            provider_ref = %provider_ref,
            amount,
            "Mobile-money cash-in requested"
        );

        Ok(ChargeResponse {
            result: transaction_result(provider_ref, body["status"].as_str().unwrap_or("pending")),
            client_secret: None,
        })
    }

    async fn retrieve_status(&self, provider_ref: &str) -> Result<ProviderResult, ProviderError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(format!("{}/events/transactions", self.api_base))
            .bearer_auth(token)
            .query(&[("ref", provider_ref)])
            .send()
            .await?;
        let body = read_json(resp).await?;

        let status = body["transactions"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|event| event["data"]["ref"].as_str() == Some(provider_ref))
            .find(|event| event["event_kind"].as_str() == Some(PROCESSED_EVENT))
            .and_then(|event| event["data"]["status"].as_str())
            .unwrap_or("pending");

        Ok(transaction_result(provider_ref, status))
    }

    fn parse_webhook(&self, signature: &str, body: &[u8]) -> Result<WebhookEvent, ProviderError> {
        verify_signature(body, signature, &self.webhook_secret)
            .map_err(|e| ProviderError::InvalidSignature(e.to_string()))?;

        let event: Value = serde_json::from_slice(body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let event_kind = event["event_kind"].as_str().unwrap_or_default();
        if event_kind != PROCESSED_EVENT {
            return Ok(WebhookEvent::Ignored {
                event_type: event_kind.to_string(),
            });
        }

        let data = &event["data"];
        let provider_ref = data["ref"].as_str().ok_or_else(|| {
            ProviderError::InvalidResponse("processed event without ref".to_string())
        })?;
        let (status, reason) = match data["status"].as_str().unwrap_or_default() {
            "successful" => (PaymentStatus::Completed, None),
            "failed" => (
                PaymentStatus::Failed,
                Some("mobile-money transaction failed".to_string()),
            ),
            _ => (PaymentStatus::Processing, None),
        };

        Ok(WebhookEvent::Report(StatusReport {
            provider_ref: provider_ref.to_string(),
            status,
            reason,
        }))
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, ProviderError> {
    let status = resp.status();
    let body: Value = resp.json().await?;
    if status.is_success() {
        return Ok(body);
    }
    Err(ProviderError::Rejected {
        status: status.as_u16(),
        message: body["message"].as_str().unwrap_or("unknown error").to_string(),
    })
}

/// Cents to whole currency units.
fn whole_units(cents: i64) -> Result<i64, ProviderError> {
    if cents % 100 != 0 {
        return Err(ProviderError::Unsupported(format!(
            "mobile-money amounts must be whole units, got {cents} cents"
        )));
    }
    Ok(cents / 100)
}

fn transaction_result(provider_ref: &str, status: &str) -> ProviderResult {
    match status {
        "successful" => ProviderResult::Completed {
            provider_ref: provider_ref.to_string(),
        },
        "failed" => ProviderResult::Failed {
            reason: "mobile-money transaction failed".to_string(),
        },
        _ => ProviderResult::Pending {
            provider_ref: provider_ref.to_string(),
        },
    }
}

/// Verify a base64 HMAC-SHA256 signature over the raw body.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> Result<(), &'static str> {
    if signature.trim().is_empty() {
        return Err("Missing signature");
    }
    let sig_bytes = BASE64
        .decode(signature.trim())
        .map_err(|_| "Invalid signature encoding")?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(payload);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Webhook signature mismatch")
}
