//! Store trait: the abstract interface for EZLock persistence.
//!
//! This trait allows the permission and service layers to be
//! storage-agnostic. Implementations include SQLite (primary) and in-memory
//! (for tests).

use async_trait::async_trait;
use chrono::NaiveDateTime;
use ezlock_core::{
    Capabilities, Card, CardId, Grant, GrantId, Lock, LockId, LogRecord, Principal, PrincipalId,
};

use crate::error::Result;

/// Result of inserting an entity with a natural unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// The entity was new and has been stored.
    Inserted,
    /// An entity with the same unique key already exists. Nothing was written.
    AlreadyExists,
}

/// Result of upserting a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    Inserted,
    Updated,
    /// The raw line is already recorded against another lock and was left
    /// untouched.
    Conflict,
}

/// The Store trait: async interface for EZLock persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the
/// runtime.
///
/// # Design Notes
///
/// - **Lookups return `Option`**: absence is not an error at this layer.
/// - **Unconditional updates** (`update_*`, `invalidate_lock`) return
///   `StoreError::NotFound` when the target row does not exist.
/// - **Conditional updates** (`redeem_grant`, `invalidate_grant`,
///   `invalidate_card`) return `true` only if this call changed the row.
///   They are atomic with respect to concurrent callers.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Lock Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a lock. `AlreadyExists` if another lock has the same MAC.
    async fn insert_lock(&self, lock: &Lock) -> Result<InsertResult>;

    /// Get a lock by id, in any validity state.
    async fn get_lock(&self, id: &LockId) -> Result<Option<Lock>>;

    /// Get a lock by MAC address, in any validity state.
    async fn get_lock_by_mac(&self, mac: &str) -> Result<Option<Lock>>;

    /// Locks owned by `owner`, oldest first.
    async fn locks_owned_by(&self, owner: &PrincipalId, valid_only: bool) -> Result<Vec<Lock>>;

    /// Overwrite the descriptive fields that are `Some`.
    async fn update_lock_details(
        &self,
        id: &LockId,
        name: Option<&str>,
        description: Option<&str>,
        at: NaiveDateTime,
    ) -> Result<()>;

    /// Logically delete a lock.
    async fn invalidate_lock(&self, id: &LockId, at: NaiveDateTime) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grant Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a freshly issued grant.
    async fn insert_grant(&self, grant: &Grant) -> Result<()>;

    /// Get a grant by id, in any state.
    async fn get_grant(&self, id: &GrantId) -> Result<Option<Grant>>;

    /// Grants redeemed by `recipient` whose capabilities contain `required`.
    ///
    /// With `valid_only`, only grants whose persisted flag is still true.
    async fn grants_for_recipient(
        &self,
        recipient: &PrincipalId,
        valid_only: bool,
        required: Capabilities,
    ) -> Result<Vec<Grant>>;

    /// All grants referencing `lock`, oldest first.
    async fn grants_for_lock(&self, lock: &LockId) -> Result<Vec<Grant>>;

    /// Set the recipient if and only if it is currently unset.
    async fn redeem_grant(
        &self,
        id: &GrantId,
        recipient: &PrincipalId,
        at: NaiveDateTime,
    ) -> Result<bool>;

    /// Flip the validity flag to false if it is currently true.
    async fn invalidate_grant(&self, id: &GrantId, at: NaiveDateTime) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Card Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a card. `AlreadyExists` if the lock already has a card with
    /// the same number, valid or not. Numbers compare case-sensitively.
    async fn insert_card(&self, card: &Card) -> Result<InsertResult>;

    /// Get a card by id.
    async fn get_card(&self, id: &CardId) -> Result<Option<Card>>;

    /// Cards bound to `lock`, oldest first.
    async fn cards_for_lock(&self, lock: &LockId, valid_only: bool) -> Result<Vec<Card>>;

    /// Number of cards ever bound to `lock`, valid or not.
    async fn count_cards(&self, lock: &LockId) -> Result<u64>;

    /// Flip validity to false for the card with `number` on `lock`.
    async fn invalidate_card(&self, lock: &LockId, number: &str, at: NaiveDateTime)
        -> Result<bool>;

    /// Overwrite the descriptive fields that are `Some`.
    async fn update_card_details(
        &self,
        id: &CardId,
        name: Option<&str>,
        description: Option<&str>,
        at: NaiveDateTime,
    ) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Log Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace the record keyed by its raw line. A line already
    /// held by a different lock is never reassigned.
    async fn upsert_log(&self, record: &LogRecord) -> Result<UpsertResult>;

    /// Records reported by `lock`, oldest event first.
    async fn logs_for_lock(&self, lock: &LockId) -> Result<Vec<LogRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Principal Directory
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a principal.
    async fn upsert_principal(&self, principal: &Principal) -> Result<()>;

    /// Remember `lock` as the principal's default lock.
    async fn set_default_lock(
        &self,
        principal: &PrincipalId,
        lock: &LockId,
        at: NaiveDateTime,
    ) -> Result<()>;

    /// The principal's default lock, if one was ever set.
    async fn get_default_lock(&self, principal: &PrincipalId) -> Result<Option<LockId>>;

    /// Look up a principal.
    async fn get_principal(&self, id: &PrincipalId) -> Result<Option<Principal>>;
}
