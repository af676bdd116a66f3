//! # Webhook Handler
//!
//! Entry point for provider callbacks.
//!
//! ```text
//! POST /webhooks/{method}   (raw body + signature header)
//!      │
//!      ▼
//! registry.get(method) ───────── none ──► 404
//!      │
//!      ▼
//! provider.parse_webhook ──── bad signature ──► 401, nothing written
//!      │                 └── unreadable body ──► Unprocessable (200)
//!      ▼
//! Report ──► reconcile ──► Processed (200)
//!      │              └── unknown reference ──► UnknownPayment (200)
//!      ▼
//! Ignored event type ──► Ignored (200)
//! ```
//!
//! Anything authentic is acknowledged so the provider stops redelivering.
//! Reports for references we have not attached yet are picked up later by
//! the status poll or the sweeper.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use storefront_core::PaymentMethod;

use super::reconciliation::{ReconcileOutcome, ReconciliationService};
use crate::error::{ServiceError, ServiceResult};
use crate::providers::{ProviderError, WebhookEvent};
use crate::AppState;

/// How a webhook was acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookAck {
    Processed { outcome: ReconcileOutcome },
    UnknownPayment { provider_ref: String },
    Ignored { event_type: String },
    Unprocessable { reason: String },
}

pub struct WebhookHandler {
    state: Arc<AppState>,
    reconciler: ReconciliationService,
}

impl WebhookHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        let reconciler = ReconciliationService::new(state.db.clone());
        WebhookHandler { state, reconciler }
    }

    pub async fn handle(
        &self,
        method: PaymentMethod,
        signature: &str,
        body: &[u8],
    ) -> ServiceResult<WebhookAck> {
        let provider = self
            .state
            .providers
            .get(method)
            .ok_or_else(|| ServiceError::NotFound(format!("webhook endpoint for {method}")))?;

        let event = match provider.parse_webhook(signature, body) {
            Ok(event) => event,
            Err(ProviderError::InvalidSignature(reason)) => {
                warn!(method = %method, reason = %reason, "Rejected webhook with invalid signature");
                return Err(ServiceError::InvalidSignature(reason));
            }
            Err(e) => {
                warn!(method = %method, error = %e, "Unreadable webhook body");
                return Ok(WebhookAck::Unprocessable {
                    reason: e.to_string(),
                });
            }
        };

        let report = match event {
            WebhookEvent::Report(report) => report,
            WebhookEvent::Ignored { event_type } => {
                debug!(method = %method, event_type = %event_type, "Ignoring webhook event");
                return Ok(WebhookAck::Ignored { event_type });
            }
        };

        match self.reconciler.reconcile(method, &report).await {
            Ok(outcome) => {
                info!(
                    method = %method,
                    provider_ref = %report.provider_ref,
                    status = %report.status,
                    "Webhook processed"
                );
                Ok(WebhookAck::Processed { outcome })
            }
            Err(ServiceError::UnknownPayment(provider_ref)) => {
                warn!(method = %method, provider_ref = %provider_ref, "Webhook for unknown payment");
                Ok(WebhookAck::UnknownPayment { provider_ref })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payment_service::PaymentService;
    use crate::services::testing::{card_request, order_for, test_state, ChargeScript};
    use storefront_core::reconciliation::SettlementOutcome;
    use storefront_core::{OrderPaymentStatus, PaymentStatus};

    fn body(provider_ref: &str, status: &str) -> Vec<u8> {
        serde_json::json!({ "provider_ref": provider_ref, "status": status })
            .to_string()
            .into_bytes()
    }

    #[tokio::test]
    async fn test_replayed_webhook_settles_once() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let (order, product_id) = order_for(&state, 5, 2).await;
        let payment = PaymentService::new(state.clone())
            .initiate(&card_request(&order.id))
            .await
            .unwrap()
            .payment;
        let provider_ref = payment.provider_ref.clone().unwrap();
        let handler = WebhookHandler::new(state.clone());

        let first = handler
            .handle(PaymentMethod::Card, "valid", &body(&provider_ref, "completed"))
            .await
            .unwrap();
        let second = handler
            .handle(PaymentMethod::Card, "valid", &body(&provider_ref, "completed"))
            .await
            .unwrap();

        assert!(matches!(
            first,
            WebhookAck::Processed {
                outcome: ReconcileOutcome::Settlement(SettlementOutcome::Settled { .. })
            }
        ));
        assert_eq!(
            second,
            WebhookAck::Processed {
                outcome: ReconcileOutcome::Unchanged
            }
        );

        let product = state.db.products().get_by_id(&product_id).await.unwrap().unwrap();
        assert_eq!(product.stock, 3);
        assert_eq!(state.db.notifications().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_changes_nothing() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let (order, _) = order_for(&state, 5, 1).await;
        let payment = PaymentService::new(state.clone())
            .initiate(&card_request(&order.id))
            .await
            .unwrap()
            .payment;
        let handler = WebhookHandler::new(state.clone());

        let err = handler
            .handle(
                PaymentMethod::Card,
                "forged",
                &body(payment.provider_ref.as_deref().unwrap(), "completed"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);

        let stored = state.db.payments().get_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Processing);
        let order = state.db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, OrderPaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_acknowledged_without_state_change() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let handler = WebhookHandler::new(state.clone());

        let ack = handler
            .handle(PaymentMethod::Card, "valid", &body("pi_unknown", "completed"))
            .await
            .unwrap();
        assert_eq!(
            ack,
            WebhookAck::UnknownPayment {
                provider_ref: "pi_unknown".to_string()
            }
        );

        let ack = handler
            .handle(PaymentMethod::Card, "valid", br#"{"type":"charge.dispute.created"}"#)
            .await
            .unwrap();
        assert_eq!(
            ack,
            WebhookAck::Ignored {
                event_type: "charge.dispute.created".to_string()
            }
        );

        let ack = handler
            .handle(PaymentMethod::Card, "valid", b"not json")
            .await
            .unwrap();
        assert!(matches!(ack, WebhookAck::Unprocessable { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_method_is_not_found() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let handler = WebhookHandler::new(state);

        let err = handler
            .handle(PaymentMethod::MobileMoney, "valid", &body("tx_1", "completed"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
