//! Card gateway adapter (payment-intents REST API, no SDK dependency).
//!
//! A charge creates and confirms a payment intent in one call. `succeeded`
//! means the money is captured; anything still in flight is reported as
//! pending and confirmed later by webhook or status poll.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, warn};

use storefront_core::payment::{PaymentPayload, ProviderResult, StatusReport};
use storefront_core::{PaymentMethod, PaymentStatus};

use super::{
    http_client, ChargeRequest, ChargeResponse, PaymentProvider, ProviderError, WebhookEvent,
};
use crate::config::CardConfig;

/// Events older than this are rejected as replays.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub struct CardProvider {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
    return_url: String,
    timeout: Duration,
}

impl CardProvider {
    pub fn new(config: &CardConfig, frontend_url: &str) -> Result<Self, ProviderError> {
        Ok(CardProvider {
            client: http_client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            return_url: format!("{}/payment/success", frontend_url.trim_end_matches('/')),
            timeout: Duration::from_secs(config.payment_timeout_secs),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let resp = request
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;

        if status.is_success() {
            return Ok(body);
        }
        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message: body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string(),
        })
    }
}

#[async_trait]
impl PaymentProvider for CardProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResponse, ProviderError> {
        let PaymentPayload::Card {
            payment_method_id,
            save_card,
            ..
        } = &request.payload
        else {
            return Err(ProviderError::Unsupported(
                "card provider needs a card payload".to_string(),
            ));
        };

        let amount = request.amount.cents().to_string();
        let currency = request.currency.to_ascii_lowercase();
        let mut form: Vec<(&str, &str)> = vec![
            ("amount", amount.as_str()),
            ("currency", currency.as_str()),
            ("payment_method", payment_method_id.as_str()),
            ("confirm", "true"),
            ("return_url", self.return_url.as_str()),
            ("metadata[order_id]", request.order_id.as_str()),
            ("metadata[order_number]", request.order_number.as_str()),
            ("metadata[payment_id]", request.payment_id.as_str()),
        ];
        if *save_card {
            form.push(("setup_future_usage", "off_session"));
        }

        debug!(payment_id = %request.payment_id, amount = %request.amount, "Creating payment intent");

        let sent = self
            .send(
                self.client
                    .post(format!("{}/payment_intents", self.api_base))
                    .header("Idempotency-Key", request.payment_id.as_str())
                    .form(&form),
            )
            .await;

        let intent = match sent {
            Ok(intent) => intent,
            // 402: the card was declined. A definitive answer, not a transport failure.
            Err(ProviderError::Rejected { status: 402, message }) => {
                return Ok(ChargeResponse {
                    result: ProviderResult::Failed { reason: message },
                    client_secret: None,
                });
            }
            Err(e) => return Err(e),
        };

        Ok(ChargeResponse {
            result: intent_result(&intent)?,
            client_secret: intent["client_secret"].as_str().map(String::from),
        })
    }

    async fn retrieve_status(&self, provider_ref: &str) -> Result<ProviderResult, ProviderError> {
        let intent = self
            .send(
                self.client
                    .get(format!("{}/payment_intents/{}", self.api_base, provider_ref)),
            )
            .await?;
        intent_result(&intent)
    }

    fn parse_webhook(&self, signature: &str, body: &[u8]) -> Result<WebhookEvent, ProviderError> {
        verify_signature(body, signature, &self.webhook_secret, Utc::now().timestamp())
            .map_err(|e| ProviderError::InvalidSignature(e.to_string()))?;

        let event: Value = serde_json::from_slice(body)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let event_type = event["type"].as_str().unwrap_or_default().to_string();
        let object = &event["data"]["object"];

        let (status, reason) = match event_type.as_str() {
            "payment_intent.succeeded" => (PaymentStatus::Completed, None),
            "payment_intent.payment_failed" => (
                PaymentStatus::Failed,
                Some(
                    object["last_payment_error"]["message"]
                        .as_str()
                        .unwrap_or("payment failed")
                        .to_string(),
                ),
            ),
            "payment_intent.canceled" => (PaymentStatus::Failed, Some("canceled".to_string())),
            _ => return Ok(WebhookEvent::Ignored { event_type }),
        };

        let provider_ref = object["id"].as_str().ok_or_else(|| {
            ProviderError::InvalidResponse(format!("{event_type} event without intent id"))
        })?;

        Ok(WebhookEvent::Report(StatusReport {
            provider_ref: provider_ref.to_string(),
            status,
            reason,
        }))
    }
}

/// Maps a payment intent to a provider result.
fn intent_result(intent: &Value) -> Result<ProviderResult, ProviderError> {
    let provider_ref = intent["id"]
        .as_str()
        .ok_or_else(|| ProviderError::InvalidResponse(format!("payment intent without id: {intent}")))?
        .to_string();

    let result = match intent["status"].as_str().unwrap_or_default() {
        "succeeded" => ProviderResult::Completed { provider_ref },
        "canceled" => ProviderResult::Failed {
            reason: intent["cancellation_reason"]
                .as_str()
                .unwrap_or("canceled")
                .to_string(),
        },
        "requires_payment_method" if !intent["last_payment_error"].is_null() => {
            ProviderResult::Failed {
                reason: intent["last_payment_error"]["message"]
                    .as_str()
                    .unwrap_or("payment method declined")
                    .to_string(),
            }
        }
        other => {
            if other.is_empty() {
                warn!(provider_ref = %provider_ref, "Payment intent without status");
            }
            ProviderResult::Pending { provider_ref }
        }
    };
    Ok(result)
}

/// Verify a webhook signature header (`t=<unix>,v1=<hex hmac>[,v1=...]`).
///
/// The MAC covers `"{t}." + body`; `now` is unix seconds. While the endpoint
/// secret is being rolled the header carries one `v1` per active secret, and
/// any one of them matching is enough.
pub fn verify_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.trim().strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err("Invalid signature header");
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|signature| {
        hex::decode(signature)
            .map(|sig_bytes| mac.clone().verify_slice(&sig_bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err("Webhook signature mismatch");
    }

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err("Webhook timestamp too old");
    }

    Ok(())
}
