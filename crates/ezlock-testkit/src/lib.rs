//! # EZLock Testkit
//!
//! Testing utilities for EZLock.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known cipher outputs pinning the wire format shared
//!   with lock firmware
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Helper structs for setting up test scenarios
//!
//! ## Golden Vectors
//!
//! ```rust
//! use ezlock_testkit::vectors::verify_all_vectors;
//!
//! assert!(verify_all_vectors().is_empty());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use ezlock_testkit::generators::{instant, schedule};
//!
//! proptest! {
//!     #[test]
//!     fn evaluation_is_deterministic(s in schedule(), now in instant()) {
//!         prop_assert_eq!(s.is_valid_at(now), s.is_valid_at(now));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use ezlock_testkit::fixtures::owner_and_friend;
//!
//! let (fixture, owner, friend, lock) = owner_and_friend().await;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{at, owner_and_friend, test_secret, TestFixture};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
