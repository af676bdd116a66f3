//! # Reconciliation State Machine
//!
//! Pure rules for settling an order once a provider reports success.
//!
//! ## Settlement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Per Order + Payment pair                                │
//! │                                                                         │
//! │   AwaitingPayment ──(payment completed)──► Paid          (terminal)    │
//! │         │                                                               │
//! │         └──(payment failed)──► PaymentFailed                            │
//! │                                    │                                    │
//! │                                    └──(new attempt completes)──► Paid  │
//! │                                                                         │
//! │   AwaitingPayment → Paid performs, in ONE transaction:                 │
//! │     1. payment.status  = completed   (guard: status != completed)      │
//! │     2. order.payment   = paid        (guard: pending | failed)         │
//! │     3. sell every line item          (unless stock already committed)  │
//! │     4. enqueue payment_confirmation  (unique per payment)              │
//! │                                                                         │
//! │   Re-running it for the same payment is a no-op (guard 1 fails).       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Order, OrderPaymentStatus, Payment};

/// Outbox kind for the payment confirmation sent after settlement.
pub const PAYMENT_CONFIRMATION: &str = "payment_confirmation";

// =============================================================================
// Settlement State
// =============================================================================

/// Where an order stands in the settlement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SettlementState {
    AwaitingPayment,
    Paid,
    PaymentFailed,
    Refunded,
}

impl From<OrderPaymentStatus> for SettlementState {
    fn from(status: OrderPaymentStatus) -> Self {
        match status {
            OrderPaymentStatus::Pending => SettlementState::AwaitingPayment,
            OrderPaymentStatus::Paid => SettlementState::Paid,
            OrderPaymentStatus::Failed => SettlementState::PaymentFailed,
            OrderPaymentStatus::Refunded => SettlementState::Refunded,
        }
    }
}

impl SettlementState {
    /// A new payment attempt may be started in this state.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, SettlementState::AwaitingPayment | SettlementState::PaymentFailed)
    }
}

/// Refuses a new payment attempt for an order that cannot take one.
///
/// ## Returns
/// * `Err(AlreadyPaid)` - the order is paid
/// * `Err(InvalidTransition)` - any other closed state (refunded)
pub fn ensure_accepts_payment(order_id: &str, status: OrderPaymentStatus) -> CoreResult<()> {
    if SettlementState::from(status).accepts_payment() {
        return Ok(());
    }

    Err(match status {
        OrderPaymentStatus::Paid => CoreError::AlreadyPaid {
            order_id: order_id.to_string(),
        },
        other => CoreError::InvalidTransition {
            entity: format!("Order {order_id}"),
            from: other.to_string(),
            to: "a new payment".to_string(),
        },
    })
}

/// Whether settlement must still take stock out of the ledger.
#[inline]
pub fn settlement_decrements_stock(order: &Order) -> bool {
    !order.stock_committed
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of applying a completed payment to its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// First completion: order paid, stock decremented, confirmation queued.
    Settled {
        order_id: String,
        stock_decremented: bool,
    },
    /// The payment was already completed. Nothing changed.
    AlreadySettled { order_id: String },
    /// Another payment had already paid the order. Flagged for refund.
    DuplicatePayment { order_id: String },
    /// Stock ran out before settlement. Payment recorded, order flagged.
    StockException { order_id: String, product_id: String },
}

impl SettlementOutcome {
    pub fn order_id(&self) -> &str {
        match self {
            SettlementOutcome::Settled { order_id, .. }
            | SettlementOutcome::AlreadySettled { order_id }
            | SettlementOutcome::DuplicatePayment { order_id }
            | SettlementOutcome::StockException { order_id, .. } => order_id,
        }
    }

    /// True only for the run that actually settled the order.
    pub fn is_first_settlement(&self) -> bool {
        matches!(self, SettlementOutcome::Settled { .. })
    }
}

// =============================================================================
// Confirmation Payload
// =============================================================================

/// Body of a `payment_confirmation` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentConfirmation {
    pub order_id: String,
    pub order_number: String,
    pub customer_id: String,
    pub payment_id: String,
    pub amount: Money,
    pub currency: String,
}

impl PaymentConfirmation {
    pub fn new(order: &Order, payment: &Payment) -> Self {
        PaymentConfirmation {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            customer_id: order.customer_id.clone(),
            payment_id: payment.id.clone(),
            amount: payment.amount(),
            currency: payment.currency.clone(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_state_from_payment_status() {
        assert_eq!(SettlementState::from(OrderPaymentStatus::Pending), SettlementState::AwaitingPayment);
        assert_eq!(SettlementState::from(OrderPaymentStatus::Failed), SettlementState::PaymentFailed);
        assert!(SettlementState::PaymentFailed.accepts_payment());
        assert!(SettlementState::AwaitingPayment.accepts_payment());
        assert!(!SettlementState::Paid.accepts_payment());
        assert!(!SettlementState::Refunded.accepts_payment());
    }

    #[test]
    fn test_ensure_accepts_payment() {
        assert!(ensure_accepts_payment("o-1", OrderPaymentStatus::Pending).is_ok());
        assert!(ensure_accepts_payment("o-1", OrderPaymentStatus::Failed).is_ok());
        assert!(matches!(
            ensure_accepts_payment("o-1", OrderPaymentStatus::Paid),
            Err(CoreError::AlreadyPaid { ref order_id }) if order_id == "o-1"
        ));
        assert!(matches!(
            ensure_accepts_payment("o-1", OrderPaymentStatus::Refunded),
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_outcome_helpers() {
        let settled = SettlementOutcome::Settled {
            order_id: "o-1".to_string(),
            stock_decremented: true,
        };
        assert!(settled.is_first_settlement());
        assert_eq!(settled.order_id(), "o-1");

        let replay = SettlementOutcome::AlreadySettled {
            order_id: "o-1".to_string(),
        };
        assert!(!replay.is_first_settlement());
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let outcome = SettlementOutcome::DuplicatePayment {
            order_id: "o-9".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "duplicate_payment");
        assert_eq!(json["order_id"], "o-9");
    }
}
