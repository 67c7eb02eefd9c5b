//! # EZLock Permissions
//!
//! Entitlement resolution and the delegated grant lifecycle.
//!
//! ## Overview
//!
//! A principal may operate a lock it owns, or a lock on which it holds a
//! redeemed grant whose schedule currently holds. Grants carry extra
//! capabilities (view log, add card, share) that some operations require.
//!
//! ## Key Types
//!
//! - [`Resolver`] - Computes [`Entitlements`] and heals stale grant flags
//! - [`GrantManager`] - Creates, redeems and revokes grants
//! - [`ResolutionPlan`] - Output of the pure planning step
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ezlock_core::{Capabilities, PrincipalId, SystemClock};
//! use ezlock_perms::Resolver;
//! use ezlock_store::MemoryStore;
//!
//! async fn example(principal: PrincipalId) {
//!     let resolver = Resolver::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock));
//!     let usable = resolver.resolve(&principal, true, Capabilities::NONE).await.unwrap();
//!     for (lock, is_owner) in usable.iter() {
//!         println!("{} owner={}", lock, is_owner);
//!     }
//! }
//! ```

pub mod error;
pub mod grant;
pub mod resolver;

pub use error::{PermsError, Result};
pub use grant::{GrantManager, GrantRequest};
pub use resolver::{plan, Candidate, Entitlements, ResolutionPlan, Resolver};
