//! Service implementations.
//!
//! Each service holds the shared [`AppState`](crate::AppState) and exposes
//! framework-agnostic entry points.

pub mod inventory_service;
pub mod notification;
pub mod order_service;
pub mod payment_service;
pub mod reconciliation;
pub mod sweeper;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use storefront_db::DbResult;
use tracing::warn;

use crate::error::{ServiceError, ServiceResult};

/// Runs a write, retrying once with a fresh attempt if it hit a lock conflict.
///
/// A second conflict surfaces as [`ServiceError::ConcurrencyConflict`].
pub(crate) async fn retry_on_conflict<T, F, Fut>(operation: &str, mut write: F) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    match write().await {
        Err(e) if e.is_conflict() => {
            warn!(operation, error = %e, "Write conflict, retrying once");
            write().await.map_err(|e| {
                if e.is_conflict() {
                    ServiceError::ConcurrencyConflict(format!("{operation}: {e}"))
                } else {
                    e.into()
                }
            })
        }
        other => other.map_err(Into::into),
    }
}
