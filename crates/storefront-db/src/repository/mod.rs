//! # Repository Module
//!
//! Database repository implementations for the storefront.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service                                                               │
//! │       │  db.products().sell(id, 3, &token)                             │
//! │       ▼                                                                 │
//! │  ProductRepository                                                     │
//! │  ├── sell / restock           (own transaction)                        │
//! │  └── sell_in_tx               (joins a caller's transaction)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories that take part in larger transactions expose `pub(crate)`
//! functions over `&mut SqliteConnection`, so the settlement and order
//! transactions can compose them without acquiring a second connection.
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog and inventory ledger
//! - [`OrderRepository`](order::OrderRepository) - Order creation and lookup
//! - [`PaymentRepository`](payment::PaymentRepository) - Payment attempts
//! - [`SequenceRepository`](sequence::SequenceRepository) - Per-day counters
//! - [`NotificationOutboxRepository`](outbox::NotificationOutboxRepository) - Notification queue
//! - [`ExceptionRepository`](exception::ExceptionRepository) - Manual intervention queue
//! - [`SettlementRepository`](settlement::SettlementRepository) - Payment settlement

pub mod exception;
pub mod order;
pub mod outbox;
pub mod payment;
pub mod product;
pub mod sequence;
pub mod settlement;

use uuid::Uuid;

/// Generates a new row ID.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
