//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use ezlock_core::{
    Capabilities, Card, CardId, Grant, GrantId, Lock, LockId, LogRecord, Principal, PrincipalId,
};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store, UpsertResult};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; every
/// conditional update runs under a single write guard.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    locks: HashMap<LockId, Lock>,

    /// MAC index: mac -> lock id.
    macs: HashMap<String, LockId>,

    grants: HashMap<GrantId, Grant>,

    cards: HashMap<CardId, Card>,

    /// Logs keyed by raw line.
    logs: HashMap<String, LogRecord>,

    principals: HashMap<PrincipalId, Principal>,

    default_locks: HashMap<PrincipalId, LockId>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// Oldest first, ties broken by id, matching the SQLite ordering.
fn sorted<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_lock(&self, lock: &Lock) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if inner.macs.contains_key(&lock.mac) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.macs.insert(lock.mac.clone(), lock.id);
        inner.locks.insert(lock.id, lock.clone());

        Ok(InsertResult::Inserted)
    }

    async fn get_lock(&self, id: &LockId) -> Result<Option<Lock>> {
        Ok(self.read()?.locks.get(id).cloned())
    }

    async fn get_lock_by_mac(&self, mac: &str) -> Result<Option<Lock>> {
        let inner = self.read()?;
        Ok(inner
            .macs
            .get(mac)
            .and_then(|id| inner.locks.get(id))
            .cloned())
    }

    async fn locks_owned_by(&self, owner: &PrincipalId, valid_only: bool) -> Result<Vec<Lock>> {
        let inner = self.read()?;
        let locks = inner
            .locks
            .values()
            .filter(|l| l.owner == *owner && (!valid_only || l.valid))
            .cloned()
            .collect();
        Ok(sorted(locks, |l| (l.created_at, l.id)))
    }

    async fn update_lock_details(
        &self,
        id: &LockId,
        name: Option<&str>,
        description: Option<&str>,
        at: NaiveDateTime,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let lock = inner
            .locks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("lock {}", id)))?;

        if let Some(name) = name {
            lock.name = name.to_string();
        }
        if let Some(description) = description {
            lock.description = description.to_string();
        }
        lock.updated_at = at;
        Ok(())
    }

    async fn invalidate_lock(&self, id: &LockId, at: NaiveDateTime) -> Result<()> {
        let mut inner = self.write()?;
        let lock = inner
            .locks
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("lock {}", id)))?;

        lock.valid = false;
        lock.updated_at = at;
        Ok(())
    }

    async fn insert_grant(&self, grant: &Grant) -> Result<()> {
        self.write()?.grants.insert(grant.id, grant.clone());
        Ok(())
    }

    async fn get_grant(&self, id: &GrantId) -> Result<Option<Grant>> {
        Ok(self.read()?.grants.get(id).cloned())
    }

    async fn grants_for_recipient(
        &self,
        recipient: &PrincipalId,
        valid_only: bool,
        required: Capabilities,
    ) -> Result<Vec<Grant>> {
        let inner = self.read()?;
        let grants = inner
            .grants
            .values()
            .filter(|g| g.recipient.as_ref() == Some(recipient))
            .filter(|g| !valid_only || g.valid)
            .filter(|g| g.capabilities.contains(required))
            .cloned()
            .collect();
        Ok(sorted(grants, |g| (g.created_at, g.id)))
    }

    async fn grants_for_lock(&self, lock: &LockId) -> Result<Vec<Grant>> {
        let inner = self.read()?;
        let grants = inner
            .grants
            .values()
            .filter(|g| g.lock_id == *lock)
            .cloned()
            .collect();
        Ok(sorted(grants, |g| (g.created_at, g.id)))
    }

    async fn redeem_grant(
        &self,
        id: &GrantId,
        recipient: &PrincipalId,
        at: NaiveDateTime,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.grants.get_mut(id) {
            Some(grant) if grant.recipient.is_none() => {
                grant.recipient = Some(*recipient);
                grant.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn invalidate_grant(&self, id: &GrantId, at: NaiveDateTime) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.grants.get_mut(id) {
            Some(grant) if grant.valid => {
                grant.valid = false;
                grant.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_card(&self, card: &Card) -> Result<InsertResult> {
        let mut inner = self.write()?;

        let duplicate = inner
            .cards
            .values()
            .any(|c| c.lock_id == card.lock_id && c.number == card.number);
        if duplicate {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.cards.insert(card.id, card.clone());

        Ok(InsertResult::Inserted)
    }

    async fn get_card(&self, id: &CardId) -> Result<Option<Card>> {
        Ok(self.read()?.cards.get(id).cloned())
    }

    async fn cards_for_lock(&self, lock: &LockId, valid_only: bool) -> Result<Vec<Card>> {
        let inner = self.read()?;
        let cards = inner
            .cards
            .values()
            .filter(|c| c.lock_id == *lock && (!valid_only || c.valid))
            .cloned()
            .collect();
        Ok(sorted(cards, |c| (c.created_at, c.id)))
    }

    async fn count_cards(&self, lock: &LockId) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.cards.values().filter(|c| c.lock_id == *lock).count() as u64)
    }

    async fn invalidate_card(
        &self,
        lock: &LockId,
        number: &str,
        at: NaiveDateTime,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        let mut changed = false;
        for card in inner.cards.values_mut() {
            if card.lock_id == *lock && card.number == number && card.valid {
                card.valid = false;
                card.updated_at = at;
                changed = true;
            }
        }
        Ok(changed)
    }

    async fn update_card_details(
        &self,
        id: &CardId,
        name: Option<&str>,
        description: Option<&str>,
        at: NaiveDateTime,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let card = inner
            .cards
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("card {}", id)))?;

        if let Some(name) = name {
            card.name = name.to_string();
        }
        if let Some(description) = description {
            card.description = description.to_string();
        }
        card.updated_at = at;
        Ok(())
    }

    async fn upsert_log(&self, record: &LogRecord) -> Result<UpsertResult> {
        let mut inner = self.write()?;
        match inner.logs.get_mut(&record.raw) {
            Some(existing) if existing.lock_id != record.lock_id => Ok(UpsertResult::Conflict),
            Some(existing) => {
                *existing = record.clone();
                Ok(UpsertResult::Updated)
            }
            None => {
                inner.logs.insert(record.raw.clone(), record.clone());
                Ok(UpsertResult::Inserted)
            }
        }
    }

    async fn logs_for_lock(&self, lock: &LockId) -> Result<Vec<LogRecord>> {
        let inner = self.read()?;
        let logs = inner
            .logs
            .values()
            .filter(|r| r.lock_id == *lock)
            .cloned()
            .collect();
        Ok(sorted(logs, |r| (r.occurred_at, r.raw.clone())))
    }

    async fn upsert_principal(&self, principal: &Principal) -> Result<()> {
        self.write()?
            .principals
            .insert(principal.id, principal.clone());
        Ok(())
    }

    async fn get_principal(&self, id: &PrincipalId) -> Result<Option<Principal>> {
        Ok(self.read()?.principals.get(id).cloned())
    }

    async fn set_default_lock(
        &self,
        principal: &PrincipalId,
        lock: &LockId,
        _at: NaiveDateTime,
    ) -> Result<()> {
        self.write()?.default_locks.insert(*principal, *lock);
        Ok(())
    }

    async fn get_default_lock(&self, principal: &PrincipalId) -> Result<Option<LockId>> {
        Ok(self.read()?.default_locks.get(principal).copied())
    }
}
