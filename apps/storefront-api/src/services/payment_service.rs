//! # Payment Service
//!
//! Starts payment attempts and answers status queries.
//!
//! ## initiate
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate payload, match it to the method      ─► Validation        │
//! │  2. load order; paid?                              ─► AlreadyPaid       │
//! │  3. INSERT payment (processing, no provider ref)                       │
//! │  4. provider.charge(payment_id as idempotency key)                     │
//! │        transport error ─► payment failed, ProviderError to caller      │
//! │        Failed          ─► payment failed                               │
//! │        Pending         ─► attach provider ref                          │
//! │        Completed       ─► attach provider ref, reconcile → settle      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every attempt leaves a payment row behind, including failed ones. The
//! charge itself is never retried.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use storefront_core::payment::{PaymentPayload, ProviderResult};
use storefront_core::reconciliation::{ensure_accepts_payment, SettlementOutcome};
use storefront_core::{Payment, PaymentMethod, PaymentStats, PaymentStatus};
use storefront_db::repository::generate_id;

use super::reconciliation::{ReconcileOutcome, ReconciliationService};
use crate::error::{ServiceError, ServiceResult};
use crate::providers::ChargeRequest;
use crate::AppState;

/// Input of `POST /payments/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPaymentRequest {
    pub order_id: String,
    pub method: PaymentMethod,
    pub payload: PaymentPayload,
    /// When set, the order must belong to this customer.
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Result of starting a payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub payment: Payment,
    /// Provider continuation data (card client secret).
    pub client_secret: Option<String>,
    /// Present when the provider completed the charge synchronously.
    pub settlement: Option<SettlementOutcome>,
}

pub struct PaymentService {
    state: Arc<AppState>,
    reconciler: ReconciliationService,
}

impl PaymentService {
    pub fn new(state: Arc<AppState>) -> Self {
        let reconciler = ReconciliationService::new(state.db.clone());
        PaymentService { state, reconciler }
    }

    /// Starts a payment attempt for an order.
    pub async fn initiate(&self, request: &ProcessPaymentRequest) -> ServiceResult<PaymentResponse> {
        request.payload.validate()?;
        request.payload.expect_method(request.method)?;

        let db = &self.state.db;
        let order = db
            .orders()
            .get_by_id(&request.order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {}", request.order_id)))?;

        if let Some(customer_id) = &request.customer_id {
            if *customer_id != order.customer_id {
                return Err(ServiceError::Forbidden(format!(
                    "order {} belongs to another customer",
                    order.id
                )));
            }
        }

        ensure_accepts_payment(&order.id, order.payment_status)?;

        let provider = self.state.providers.get(request.method).ok_or_else(|| {
            ServiceError::Validation(format!("payment method {} is not available", request.method))
        })?;

        let now = chrono::Utc::now();
        let payment = Payment {
            id: generate_id(),
            order_id: order.id.clone(),
            method: request.method,
            provider_ref: None,
            status: PaymentStatus::Processing,
            amount_cents: order.total_cents,
            currency: order.currency.clone(),
            card_holder: request.payload.card_holder().map(String::from),
            mobile_number: request.payload.mobile_number().map(String::from),
            network: request.payload.network(),
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        db.payments().insert(&payment).await?;

        info!(
            payment_id = %payment.id,
            order_id = %order.id,
            method = %request.method,
            amount = %payment.amount(),
            "Payment initiated"
        );

        let charge = ChargeRequest {
            payment_id: payment.id.clone(),
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            amount: order.total(),
            currency: order.currency.clone(),
            payload: request.payload.clone(),
        };

        let response = match provider.charge(&charge).await {
            Ok(response) => response,
            Err(e) => {
                warn!(payment_id = %payment.id, error = %e, "Charge failed");
                if let Err(db_err) = db.settlement().fail(&payment.id, &e.to_string()).await {
                    error!(payment_id = %payment.id, error = %db_err, "Could not record failed charge");
                }
                return Err(e.into());
            }
        };

        let mut settlement = None;
        match &response.result {
            ProviderResult::Failed { reason } => {
                db.settlement().fail(&payment.id, reason).await?;
            }
            ProviderResult::Pending { provider_ref } => {
                db.payments().attach_provider_ref(&payment.id, provider_ref).await?;
            }
            ProviderResult::Completed { provider_ref } => {
                db.payments().attach_provider_ref(&payment.id, provider_ref).await?;
                if let ReconcileOutcome::Settlement(outcome) = self
                    .reconciler
                    .apply(&payment, PaymentStatus::Completed, None)
                    .await?
                {
                    settlement = Some(outcome);
                }
            }
        }

        Ok(PaymentResponse {
            payment: self.load(&payment.id).await?,
            client_secret: response.client_secret,
            settlement,
        })
    }

    /// Current status of a payment, polling the provider while it is processing.
    ///
    /// A failed poll is logged and the stored status returned.
    pub async fn status(&self, payment_id: &str) -> ServiceResult<Payment> {
        let payment = self.load(payment_id).await?;
        if payment.status != PaymentStatus::Processing {
            return Ok(payment);
        }

        let (Some(provider_ref), Some(provider)) = (
            payment.provider_ref.as_deref(),
            self.state.providers.get(payment.method),
        ) else {
            return Ok(payment);
        };

        match provider.retrieve_status(provider_ref).await {
            Ok(result) => {
                if let Err(e) = self.reconciler.apply_result(&payment, &result).await {
                    warn!(payment_id = %payment_id, error = %e, "Could not apply polled status");
                }
            }
            Err(e) => {
                warn!(payment_id = %payment_id, error = %e, "Provider status poll failed");
                return Ok(payment);
            }
        }

        self.load(payment_id).await
    }

    /// Methods with a configured provider.
    pub fn available_methods(&self) -> Vec<PaymentMethod> {
        self.state.providers.methods()
    }

    pub async fn list_for_order(&self, order_id: &str) -> ServiceResult<Vec<Payment>> {
        Ok(self.state.db.payments().list_for_order(order_id).await?)
    }

    pub async fn stats(&self) -> ServiceResult<PaymentStats> {
        Ok(self.state.db.payments().stats().await?)
    }

    async fn load(&self, payment_id: &str) -> ServiceResult<Payment> {
        self.state
            .db
            .payments()
            .get_by_id(payment_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {payment_id}")))
    }
}
