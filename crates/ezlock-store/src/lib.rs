//! # EZLock Store
//!
//! Storage abstraction for EZLock. Provides a trait-based interface for
//! locks, grants, cards, operation logs and the principal directory, with
//! SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting a uniquely keyed entity
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ezlock_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("ezlock.db").unwrap();
//!     let lock = store.get_lock_by_mac("AA:BB:CC:DD:EE:FF").await.unwrap();
//!     println!("{:?}", lock.map(|l| l.id));
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Conditional writes**: redemption and invalidation only succeed when
//!   the row is still in the expected state, so concurrent callers race
//!   safely.
//! - **Idempotent log ingestion**: records are upserted by raw line.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store, UpsertResult};
