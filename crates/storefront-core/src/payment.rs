//! # Payment Rules
//!
//! Provider payloads, provider results and the payment status guard.
//!
//! ## Payment Status Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   initiate ──► processing ──────────► completed  (terminal)            │
//! │       │            │                      ▲                             │
//! │       │            ▼                      │ late provider success       │
//! │       └──────► failed ────────────────────┘                             │
//! │                                                                         │
//! │   completed never regresses: a replayed or out-of-order "failed"       │
//! │   report for a completed payment is ignored.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{MobileNetwork, PaymentMethod, PaymentStatus};
use crate::validation::{validate_mobile_number, validate_required};

// =============================================================================
// Payloads
// =============================================================================

/// Method-specific payment input, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentPayload {
    Card {
        /// Tokenized card reference from the card gateway's client library.
        payment_method_id: String,
        card_holder: Option<String>,
        #[serde(default)]
        save_card: bool,
    },
    MobileMoney {
        mobile_number: String,
        network: MobileNetwork,
    },
}

impl PaymentPayload {
    /// The provider family this payload is routed to.
    pub fn method(&self) -> PaymentMethod {
        match self {
            PaymentPayload::Card { .. } => PaymentMethod::Card,
            PaymentPayload::MobileMoney { .. } => PaymentMethod::MobileMoney,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        match self {
            PaymentPayload::Card {
                payment_method_id, ..
            } => validate_required("payment_method_id", payment_method_id)?,
            PaymentPayload::MobileMoney { mobile_number, .. } => {
                validate_mobile_number(mobile_number)?
            }
        }
        Ok(())
    }

    /// Ensures the payload was meant for `method`.
    pub fn expect_method(&self, method: PaymentMethod) -> CoreResult<()> {
        if self.method() != method {
            return Err(CoreError::PayloadMismatch {
                method: method.to_string(),
            });
        }
        Ok(())
    }

    pub fn card_holder(&self) -> Option<&str> {
        match self {
            PaymentPayload::Card { card_holder, .. } => card_holder.as_deref(),
            PaymentPayload::MobileMoney { .. } => None,
        }
    }

    pub fn mobile_number(&self) -> Option<&str> {
        match self {
            PaymentPayload::MobileMoney { mobile_number, .. } => Some(mobile_number),
            PaymentPayload::Card { .. } => None,
        }
    }

    pub fn network(&self) -> Option<MobileNetwork> {
        match self {
            PaymentPayload::MobileMoney { network, .. } => Some(*network),
            PaymentPayload::Card { .. } => None,
        }
    }
}

// =============================================================================
// Provider Results
// =============================================================================

/// What a provider said about a charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderResult {
    /// Money captured.
    Completed { provider_ref: String },
    /// Accepted, confirmation arrives later (webhook or poll).
    Pending { provider_ref: String },
    /// Declined or errored.
    Failed { reason: String },
}

impl ProviderResult {
    /// The payment status to persist for this result.
    pub fn status(&self) -> PaymentStatus {
        match self {
            ProviderResult::Completed { .. } => PaymentStatus::Completed,
            ProviderResult::Pending { .. } => PaymentStatus::Processing,
            ProviderResult::Failed { .. } => PaymentStatus::Failed,
        }
    }

    pub fn provider_ref(&self) -> Option<&str> {
        match self {
            ProviderResult::Completed { provider_ref } | ProviderResult::Pending { provider_ref } => {
                Some(provider_ref)
            }
            ProviderResult::Failed { .. } => None,
        }
    }
}

/// A status reported for an existing payment (webhook event or poll).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatusReport {
    pub provider_ref: String,
    pub status: PaymentStatus,
    pub reason: Option<String>,
}

// =============================================================================
// Transition Guard
// =============================================================================

/// What to do with a reported status given the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Apply the change (and its side effects).
    Apply,
    /// Same status again: a replay. Nothing to do.
    Unchanged,
    /// The change would regress a terminal state. Log and ignore.
    Rejected,
}

/// Decides whether `current → reported` is a real transition.
///
/// The database repeats this guard as a conditional UPDATE; this function
/// lets callers decide what to log before touching storage.
pub fn decide_transition(current: PaymentStatus, reported: PaymentStatus) -> TransitionDecision {
    use PaymentStatus::*;
    match (current, reported) {
        (a, b) if a == b => TransitionDecision::Unchanged,
        (Processing, Completed) | (Processing, Failed) | (Failed, Completed) => {
            TransitionDecision::Apply
        }
        _ => TransitionDecision::Rejected,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
