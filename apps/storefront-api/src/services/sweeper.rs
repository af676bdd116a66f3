//! # Payment Sweeper
//!
//! Background task that resolves payments stuck in `processing` and drains
//! the notification outbox.
//!
//! ## Sweep
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  every SWEEP_INTERVAL_SECS                                              │
//! │                                                                         │
//! │  for each configured provider:                                          │
//! │    cutoff = now - provider.timeout()                                    │
//! │    payments WHERE status = 'processing' AND method = ? AND              │
//! │                   created_at < cutoff   (oldest first, 100 per pass)   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │    last poll: provider.retrieve_status(provider_ref)                    │
//! │        ├── completed ──► settle (late success)                         │
//! │        ├── failed    ──► fail with provider reason                      │
//! │        └── pending / error / no ref ──► fail "timed out"               │
//! │                                                                         │
//! │  then: NotificationDispatcher::dispatch_pending()                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A payment failed here can still complete later: a late webhook moves it
//! `failed → completed` and settles the order if nothing else paid it.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use storefront_core::payment::ProviderResult;
use storefront_core::{Payment, PaymentStatus};

use super::notification::{DispatchReport, NotificationDispatcher};
use super::reconciliation::{ReconcileOutcome, ReconciliationService, TIMED_OUT};
use crate::error::ServiceResult;
use crate::providers::PaymentProvider;
use crate::AppState;

/// Stale payments handled per provider per pass.
const SWEEP_BATCH_SIZE: u32 = 100;

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Failed for exceeding the provider timeout.
    pub expired: usize,
    /// Found completed on the last poll.
    pub completed: usize,
    /// Found failed on the last poll.
    pub failed: usize,
    pub notifications: DispatchReport,
}

pub struct PaymentSweeper {
    state: Arc<AppState>,
    reconciler: ReconciliationService,
    dispatcher: NotificationDispatcher,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping the sweeper.
#[derive(Clone)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Sweeper already stopped");
        }
    }
}

impl PaymentSweeper {
    pub fn new(state: Arc<AppState>) -> (Self, SweeperHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let sweeper = PaymentSweeper {
            reconciler: ReconciliationService::new(state.db.clone()),
            dispatcher: NotificationDispatcher::new(state.db.clone(), state.notifier.clone()),
            state,
            shutdown_rx,
        };

        (sweeper, SweeperHandle { shutdown_tx })
    }

    /// Runs the sweep loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.state.config.sweep_interval_secs,
            "Payment sweeper starting"
        );

        let mut interval = tokio::time::interval(self.state.config.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report != SweepReport::default() => {
                            info!(?report, "Sweep finished");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Sweep failed"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Payment sweeper shutting down");
                    break;
                }
            }
        }

        info!("Payment sweeper stopped");
    }

    /// One pass over every provider plus the notification outbox.
    pub async fn sweep_once(&self) -> ServiceResult<SweepReport> {
        let mut report = SweepReport::default();

        for provider in self.state.providers.iter() {
            self.sweep_provider(provider.as_ref(), &mut report).await?;
        }

        report.notifications = self.dispatcher.dispatch_pending().await?;
        Ok(report)
    }

    async fn sweep_provider(
        &self,
        provider: &dyn PaymentProvider,
        report: &mut SweepReport,
    ) -> ServiceResult<()> {
        let method = provider.method();
        let Ok(timeout) = chrono::Duration::from_std(provider.timeout()) else {
            warn!(method = %method, "Provider timeout out of range, skipping sweep");
            return Ok(());
        };
        let cutoff = Utc::now() - timeout;

        let stale = self
            .state
            .db
            .payments()
            .list_processing_older_than(method, cutoff, SWEEP_BATCH_SIZE)
            .await?;

        if stale.is_empty() {
            return Ok(());
        }
        debug!(method = %method, count = stale.len(), "Sweeping stale payments");

        for payment in stale {
            let last_poll = self.last_poll(provider, &payment).await;
            let (status, reason) = match &last_poll {
                Some(ProviderResult::Completed { .. }) => (PaymentStatus::Completed, None),
                Some(ProviderResult::Failed { reason }) => (PaymentStatus::Failed, Some(reason.as_str())),
                _ => (PaymentStatus::Failed, Some(TIMED_OUT)),
            };

            match self.reconciler.apply(&payment, status, reason).await {
                Ok(ReconcileOutcome::Settlement(outcome)) => {
                    info!(payment_id = %payment.id, outcome = ?outcome, "Sweep found late success");
                    report.completed += 1;
                }
                Ok(ReconcileOutcome::MarkedFailed) if reason == Some(TIMED_OUT) => {
                    warn!(payment_id = %payment.id, method = %method, "Payment timed out");
                    report.expired += 1;
                }
                Ok(ReconcileOutcome::MarkedFailed) => report.failed += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(payment_id = %payment.id, error = %e, "Could not resolve stale payment");
                }
            }
        }

        Ok(())
    }

    async fn last_poll(&self, provider: &dyn PaymentProvider, payment: &Payment) -> Option<ProviderResult> {
        let provider_ref = payment.provider_ref.as_deref()?;
        match provider.retrieve_status(provider_ref).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(payment_id = %payment.id, error = %e, "Final status poll failed");
                None
            }
        }
    }
}
