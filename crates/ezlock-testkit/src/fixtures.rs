//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a shared in-memory store, a
//! manual clock and helpers to seed principals and locks.

use std::sync::Arc;

use chrono::NaiveDateTime;

use ezlock_core::{parse_minute, Clock, Lock, LockId, LockSecret, ManualClock, Principal, PrincipalId};
use ezlock_store::{MemoryStore, Store};

/// The instant every fixture clock starts at.
pub const FIXTURE_START: &str = "2024-06-01 12:00";

/// Parse a `YYYY-MM-DD HH:MM` literal. Panics on bad input; tests only.
pub fn at(s: &str) -> NaiveDateTime {
    parse_minute(s).unwrap_or_else(|| panic!("bad fixture timestamp {:?}", s))
}

/// A test fixture with a memory store and a manual clock.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl TestFixture {
    /// Create a new fixture at [`FIXTURE_START`].
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::new(at(FIXTURE_START))),
        }
    }

    /// The clock as a trait object, ready to hand to a service.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Register a principal in the directory.
    pub async fn principal(&self, display_name: &str) -> PrincipalId {
        let principal = Principal {
            id: PrincipalId::generate(),
            display_name: display_name.to_string(),
        };
        self.store
            .upsert_principal(&principal)
            .await
            .unwrap_or_else(|e| panic!("seeding principal failed: {}", e));
        principal.id
    }

    /// Insert a valid lock owned by `owner` with a 16-byte secret.
    pub async fn lock(&self, owner: PrincipalId, mac: &str) -> Lock {
        let now = self.clock.now();
        let lock = Lock {
            id: LockId::generate(),
            mac: mac.to_string(),
            secret: LockSecret::from_bytes(test_secret(mac)),
            owner,
            valid: true,
            name: format!("lock {}", mac),
            description: String::new(),
            model: "EZ-1".to_string(),
            version: "1.0".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert_lock(&lock)
            .await
            .unwrap_or_else(|e| panic!("seeding lock failed: {}", e));
        lock
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A deterministic 16-byte secret derived from a MAC.
pub fn test_secret(mac: &str) -> Vec<u8> {
    let mut key = [0x5au8; 16];
    for (i, b) in mac.bytes().enumerate() {
        key[i % 16] ^= b;
    }
    key.to_vec()
}

/// A shared store seeded with an owner, a second principal and one lock.
pub async fn owner_and_friend() -> (TestFixture, PrincipalId, PrincipalId, Lock) {
    let fixture = TestFixture::new();
    let owner = fixture.principal("Owner").await;
    let friend = fixture.principal("Friend").await;
    let lock = fixture.lock(owner, "AA:BB:CC:DD:EE:FF").await;
    (fixture, owner, friend, lock)
}
