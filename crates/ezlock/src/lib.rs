//! # EZLock
//!
//! The unified API for EZLock: delegated, time-scoped access to physical
//! locks, command tokens the locks can verify, and ingestion of what the
//! locks report back.
//!
//! ## Overview
//!
//! - **Entitlements**: a principal may use the locks it owns plus the locks
//!   on which it holds a redeemed, currently valid grant
//! - **Grants**: issued by an owner (or a delegate allowed to share),
//!   redeemed once by token, revoked by the issuer
//! - **Command tokens**: `base64(IV || AES-CBC(<opcode>_<time>_<principal>))`
//!   under the lock's secret
//! - **Inbound payloads**: card numbers and operation-log batches sealed the
//!   same way, relayed by the client from the lock
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ezlock::{Ezlock, EzlockConfig, OperationKind};
//! use ezlock::core::PrincipalId;
//! use ezlock::store::SqliteStore;
//!
//! async fn example(caller: PrincipalId) {
//!     let config = EzlockConfig::default();
//!     let store = SqliteStore::open(&config.database_path).unwrap();
//!     let service = Ezlock::new(store, config);
//!
//!     let token = service
//!         .derive_command_key(&caller, "AA:BB:CC:DD:EE:FF", &OperationKind::Open, &[0u8; 16])
//!         .await
//!         .unwrap();
//!     println!("{}", token);
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `ezlock::core` - Identifiers, entities, schedules, cipher
//! - `ezlock::store` - Storage abstraction and SQLite
//! - `ezlock::perms` - Entitlement resolution and grant lifecycle

pub mod command;
pub mod config;
pub mod error;
pub mod ingest;
pub mod service;

// Re-export component crates
pub use ezlock_core as core;
pub use ezlock_perms as perms;
pub use ezlock_store as store;

pub use command::OperationKind;
pub use config::{EzlockConfig, OpcodeConfig};
pub use error::{EzlockError, Result};
pub use ingest::{DecodeOutcome, IngestReport, PayloadKind, SkippedEntry};
pub use service::{DefaultLock, Ezlock, GrantView, LockRegistration, LogView};

// Re-export commonly used types
pub use ezlock_core::{
    Capabilities, Card, CardId, Grant, GrantId, LockId, LockView, PrincipalId, Schedule,
};
pub use ezlock_perms::{Entitlements, GrantRequest};
