//! # storefront-db: Database Layer for Storefront
//!
//! This crate provides database access for the storefront services.
//! It uses SQLite with sqlx for async operations, and owns every
//! transaction that has to keep orders, payments and inventory consistent.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Storefront Data Flow                             │
//! │                                                                         │
//! │  OrderService / PaymentService / WebhookHandler (storefront-api)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   storefront-db (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ ProductRepo    │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo      │   │ 001_init.sql │  │   │
//! │  │   │ WAL + busy    │    │ PaymentRepo    │   │              │  │   │
//! │  │   │ timeout       │    │ SettlementRepo │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (DATABASE_PATH)                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Tools
//!
//! | Problem | Mechanism |
//! |---------|-----------|
//! | Concurrent sells | `UPDATE ... WHERE stock >= ?` (compare-and-swap) |
//! | Replayed ledger mutations | UNIQUE `inventory_movements.token` |
//! | Order number collisions | `order_sequences` upsert with `RETURNING` |
//! | Double settlement | `UPDATE payments ... WHERE status != 'completed'` |
//! | Two payments, one order | `UPDATE orders ... WHERE payment_status IN ('pending','failed')` |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storefront_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("storefront.db")).await?;
//! let product = db.products().get_by_sku("TSHIRT-M").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::exception::ExceptionRepository;
pub use repository::order::OrderRepository;
pub use repository::outbox::NotificationOutboxRepository;
pub use repository::payment::PaymentRepository;
pub use repository::product::ProductRepository;
pub use repository::sequence::SequenceRepository;
pub use repository::settlement::SettlementRepository;
