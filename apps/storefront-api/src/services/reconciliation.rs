//! # Reconciliation Service
//!
//! Aligns stored payments with what a provider reports, from any source:
//! the synchronous charge response, a webhook, a status poll or the sweeper.
//!
//! ## Flow
//! ```text
//! report(provider_ref, status)
//!      │
//!      ▼
//! find payment by (method, provider_ref) ── none ──► UnknownPayment
//!      │
//!      ▼
//! decide_transition(stored, reported)
//!      ├── Unchanged ──► replay, nothing to do
//!      ├── Rejected  ──► would regress a completed payment, logged
//!      └── Apply
//!            ├── completed ──► settlement().settle(payment_id)
//!            └── failed    ──► settlement().fail(payment_id, reason)
//! ```
//!
//! Both writes are guarded by conditional updates in the database, so two
//! sources racing past the in-memory check still settle the order once.

use serde::Serialize;
use tracing::{debug, info, warn};

use storefront_core::payment::{decide_transition, ProviderResult, StatusReport, TransitionDecision};
use storefront_core::reconciliation::SettlementOutcome;
use storefront_core::{Payment, PaymentMethod, PaymentStatus};
use storefront_db::Database;

use super::retry_on_conflict;
use crate::error::{ServiceError, ServiceResult};

/// Reason recorded on payments failed by the timeout sweep.
pub const TIMED_OUT: &str = "timed out";

/// What reconciling a report did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The payment completed; settlement ran (possibly as a replay).
    Settlement(SettlementOutcome),
    /// The payment moved to `failed`.
    MarkedFailed,
    /// The report matches the stored status, or lost a race. No change.
    Unchanged,
    /// The report would regress a terminal status. Ignored.
    Rejected {
        current: PaymentStatus,
        reported: PaymentStatus,
    },
}

#[derive(Clone)]
pub struct ReconciliationService {
    db: Database,
}

impl ReconciliationService {
    pub fn new(db: Database) -> Self {
        ReconciliationService { db }
    }

    /// Applies a provider report addressed by provider reference.
    ///
    /// ## Returns
    /// * `Err(UnknownPayment)` - no payment of `method` carries this reference
    pub async fn reconcile(
        &self,
        method: PaymentMethod,
        report: &StatusReport,
    ) -> ServiceResult<ReconcileOutcome> {
        let payment = self
            .db
            .payments()
            .find_by_provider_ref(method, &report.provider_ref)
            .await?
            .ok_or_else(|| ServiceError::UnknownPayment(report.provider_ref.clone()))?;

        self.apply(&payment, report.status, report.reason.as_deref()).await
    }

    /// Applies a provider result obtained by polling.
    pub async fn apply_result(
        &self,
        payment: &Payment,
        result: &ProviderResult,
    ) -> ServiceResult<ReconcileOutcome> {
        let reason = match result {
            ProviderResult::Failed { reason } => Some(reason.as_str()),
            _ => None,
        };
        self.apply(payment, result.status(), reason).await
    }

    /// Applies `reported` to a payment already loaded by the caller.
    pub async fn apply(
        &self,
        payment: &Payment,
        reported: PaymentStatus,
        reason: Option<&str>,
    ) -> ServiceResult<ReconcileOutcome> {
        match decide_transition(payment.status, reported) {
            TransitionDecision::Unchanged => {
                debug!(payment_id = %payment.id, status = %reported, "Status report is a replay");
                Ok(ReconcileOutcome::Unchanged)
            }
            TransitionDecision::Rejected => {
                warn!(
                    payment_id = %payment.id,
                    current = %payment.status,
                    reported = %reported,
                    "Ignoring status report that would regress payment"
                );
                Ok(ReconcileOutcome::Rejected {
                    current: payment.status,
                    reported,
                })
            }
            TransitionDecision::Apply => match reported {
                PaymentStatus::Completed => {
                    let settlement = self.db.settlement();
                    let outcome =
                        retry_on_conflict("settle", || settlement.settle(&payment.id)).await?;
                    info!(payment_id = %payment.id, outcome = ?outcome, "Payment reconciled");
                    Ok(ReconcileOutcome::Settlement(outcome))
                }
                PaymentStatus::Failed => {
                    let reason = reason.unwrap_or("provider reported failure");
                    let settlement = self.db.settlement();
                    let failed =
                        retry_on_conflict("fail", || settlement.fail(&payment.id, reason)).await?;
                    Ok(if failed {
                        ReconcileOutcome::MarkedFailed
                    } else {
                        ReconcileOutcome::Unchanged
                    })
                }
                PaymentStatus::Processing => Ok(ReconcileOutcome::Unchanged),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payment_service::PaymentService;
    use crate::services::testing::{
        card_request, file_state, order_for, report, test_state, ChargeScript,
    };
    use storefront_core::{ExceptionKind, OrderPaymentStatus};

    #[tokio::test]
    async fn test_unknown_reference() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let service = ReconciliationService::new(state.db.clone());

        let err = service
            .reconcile(PaymentMethod::Card, &report("pi_nobody", PaymentStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownPayment(ref r) if r == "pi_nobody"));
    }

    #[tokio::test]
    async fn test_completed_never_regresses() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let (order, _) = order_for(&state, 5, 1).await;
        let payments = PaymentService::new(state.clone());
        let service = ReconciliationService::new(state.db.clone());

        let resp = payments.initiate(&card_request(&order.id)).await.unwrap();
        let provider_ref = resp.payment.provider_ref.clone().unwrap();

        service
            .reconcile(PaymentMethod::Card, &report(&provider_ref, PaymentStatus::Completed))
            .await
            .unwrap();
        let outcome = service
            .reconcile(PaymentMethod::Card, &report(&provider_ref, PaymentStatus::Failed))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Rejected {
                current: PaymentStatus::Completed,
                reported: PaymentStatus::Failed,
            }
        );

        let stored = state.db.payments().get_by_id(&resp.payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        let order = state.db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_payments_racing_settle_once() {
        let (state, _, _dir) = file_state(ChargeScript::Pending).await;
        let (order, product_id) = order_for(&state, 5, 2).await;
        let payments = PaymentService::new(state.clone());
        let service = ReconciliationService::new(state.db.clone());

        let first = payments.initiate(&card_request(&order.id)).await.unwrap().payment;
        let second = payments.initiate(&card_request(&order.id)).await.unwrap().payment;

        let mut handles = Vec::new();
        for payment in [&first, &second] {
            let service = service.clone();
            let completed = report(payment.provider_ref.as_deref().unwrap(), PaymentStatus::Completed);
            handles.push(tokio::spawn(async move {
                service.reconcile(PaymentMethod::Card, &completed).await
            }));
        }
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        let settled = outcomes
            .iter()
            .filter(|o| matches!(o, ReconcileOutcome::Settlement(s) if s.is_first_settlement()))
            .count();
        let duplicates = outcomes
            .iter()
            .filter(|o| {
                matches!(o, ReconcileOutcome::Settlement(SettlementOutcome::DuplicatePayment { .. }))
            })
            .count();
        assert_eq!(settled, 1);
        assert_eq!(duplicates, 1);

        let product = state.db.products().get_by_id(&product_id).await.unwrap().unwrap();
        assert_eq!(product.stock, 3);

        let exceptions = state.db.exceptions().list_for_order(&order.id).await.unwrap();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].kind, ExceptionKind::DuplicatePayment);
    }

    #[tokio::test]
    async fn test_late_success_after_failure() {
        let (state, _) = test_state(ChargeScript::Pending).await;
        let (order, _) = order_for(&state, 5, 1).await;
        let payments = PaymentService::new(state.clone());
        let service = ReconciliationService::new(state.db.clone());

        let payment = payments.initiate(&card_request(&order.id)).await.unwrap().payment;
        let provider_ref = payment.provider_ref.clone().unwrap();

        let outcome = service
            .reconcile(PaymentMethod::Card, &report(&provider_ref, PaymentStatus::Failed))
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::MarkedFailed);
        let stored = state.db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, OrderPaymentStatus::Failed);

        let outcome = service
            .reconcile(PaymentMethod::Card, &report(&provider_ref, PaymentStatus::Completed))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Settlement(ref s) if s.is_first_settlement()));
        let stored = state.db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, OrderPaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_poll_result_maps_to_status() {
        let (state, provider) = test_state(ChargeScript::Pending).await;
        let (order, _) = order_for(&state, 5, 1).await;
        let payments = PaymentService::new(state.clone());
        let service = ReconciliationService::new(state.db.clone());

        let payment = payments.initiate(&card_request(&order.id)).await.unwrap().payment;
        let still_pending = ProviderResult::Pending {
            provider_ref: payment.provider_ref.clone().unwrap(),
        };
        assert_eq!(
            service.apply_result(&payment, &still_pending).await.unwrap(),
            ReconcileOutcome::Unchanged
        );

        let declined = ProviderResult::Failed {
            reason: "insufficient funds".to_string(),
        };
        assert_eq!(
            service.apply_result(&payment, &declined).await.unwrap(),
            ReconcileOutcome::MarkedFailed
        );
        let stored = state.db.payments().get_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.failure_reason.as_deref(), Some("insufficient funds"));
        assert_eq!(provider.charges(), 1);
    }
}
