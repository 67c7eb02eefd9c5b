//! Entitlement resolution.
//!
//! A principal is entitled to a lock if it owns the lock or holds a redeemed,
//! currently effective grant on it. Resolution happens in two steps:
//!
//! 1. [`plan`] is pure. Given the candidate locks and grants it computes the
//!    entitlement map and lists the grants whose cached validity flag has
//!    gone stale.
//! 2. [`Resolver::reconcile`] writes those flags back. It is best-effort: a
//!    failed write is logged and left for the next resolution to retry.
//!
//! Owner entries always win over delegated entries for the same lock.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use ezlock_core::{Capabilities, Clock, Grant, GrantId, Lock, LockId, PrincipalId};
use ezlock_store::Store;

use crate::error::Result;

/// Derived mapping from lock id to "caller is the owner".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Entitlements {
    locks: BTreeMap<LockId, bool>,
}

impl Entitlements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ownership. Overrides any delegated entry.
    pub fn insert_owned(&mut self, lock: LockId) {
        self.locks.insert(lock, true);
    }

    /// Record a delegated entitlement. Never downgrades an owner entry.
    pub fn insert_delegated(&mut self, lock: LockId) {
        self.locks.entry(lock).or_insert(false);
    }

    /// `Some(is_owner)` if the lock is in the mapping.
    pub fn get(&self, lock: &LockId) -> Option<bool> {
        self.locks.get(lock).copied()
    }

    pub fn contains(&self, lock: &LockId) -> bool {
        self.locks.contains_key(lock)
    }

    pub fn is_owner(&self, lock: &LockId) -> bool {
        self.get(lock).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Iterate `(lock, is_owner)` in lock id order.
    pub fn iter(&self) -> impl Iterator<Item = (&LockId, bool)> {
        self.locks.iter().map(|(id, owner)| (id, *owner))
    }
}

impl IntoIterator for Entitlements {
    type Item = (LockId, bool);
    type IntoIter = btree_map::IntoIter<LockId, bool>;

    fn into_iter(self) -> Self::IntoIter {
        self.locks.into_iter()
    }
}

/// A redeemed grant together with the lock it references, if that lock
/// still exists.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub grant: Grant,
    pub lock: Option<Lock>,
}

impl Candidate {
    /// Whether the grant confers entitlement at `now`.
    ///
    /// The schedule must hold and the referenced lock must still be valid.
    pub fn is_effective(&self, now: NaiveDateTime) -> bool {
        self.grant.evaluate(now) && self.lock.as_ref().is_some_and(|l| l.valid)
    }
}

/// Output of the pure planning step.
#[derive(Debug, Clone, Default)]
pub struct ResolutionPlan {
    pub entitlements: Entitlements,
    /// Grants persisted as valid that no longer evaluate as effective.
    pub stale_grants: Vec<GrantId>,
}

/// Compute entitlements from candidates. Pure.
///
/// `owned` must already be filtered by lock validity when `valid_only`.
/// Stale grants are excluded when `valid_only`, included otherwise.
pub fn plan(
    owned: &[Lock],
    delegated: &[Candidate],
    valid_only: bool,
    now: NaiveDateTime,
) -> ResolutionPlan {
    let mut plan = ResolutionPlan::default();

    for lock in owned {
        plan.entitlements.insert_owned(lock.id);
    }

    for candidate in delegated {
        let effective = candidate.is_effective(now);
        if candidate.grant.valid && !effective {
            plan.stale_grants.push(candidate.grant.id);
        }
        if valid_only && !effective {
            continue;
        }
        plan.entitlements.insert_delegated(candidate.grant.lock_id);
    }

    plan
}

/// Resolves entitlements against a store.
pub struct Resolver<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> Clone for Resolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: Store> Resolver<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Locks owned by `principal`.
    pub async fn owned_locks(&self, principal: &PrincipalId, valid_only: bool) -> Result<Vec<Lock>> {
        Ok(self.store.locks_owned_by(principal, valid_only).await?)
    }

    /// Redeemed grants held by `principal` with at least `required`, each
    /// paired with its lock.
    pub async fn candidates(
        &self,
        principal: &PrincipalId,
        valid_only: bool,
        required: Capabilities,
    ) -> Result<Vec<Candidate>> {
        let grants = self
            .store
            .grants_for_recipient(principal, valid_only, required)
            .await?;

        let mut locks: HashMap<LockId, Option<Lock>> = HashMap::new();
        let mut candidates = Vec::with_capacity(grants.len());
        for grant in grants {
            let lock = match locks.get(&grant.lock_id) {
                Some(lock) => lock.clone(),
                None => {
                    let lock = self.store.get_lock(&grant.lock_id).await?;
                    locks.insert(grant.lock_id, lock.clone());
                    lock
                }
            };
            candidates.push(Candidate { grant, lock });
        }

        Ok(candidates)
    }

    /// Locks `principal` may use through delegation alone.
    pub async fn delegated_locks(
        &self,
        principal: &PrincipalId,
        valid_only: bool,
        required: Capabilities,
    ) -> Result<Vec<LockId>> {
        let candidates = self.candidates(principal, valid_only, required).await?;
        let plan = plan(&[], &candidates, valid_only, self.clock.now());
        self.reconcile(&plan.stale_grants).await;
        Ok(plan.entitlements.into_iter().map(|(id, _)| id).collect())
    }

    /// Plan resolution for `principal` without writing anything.
    pub async fn plan(
        &self,
        principal: &PrincipalId,
        valid_only: bool,
        required: Capabilities,
    ) -> Result<ResolutionPlan> {
        let owned = self.owned_locks(principal, valid_only).await?;
        let candidates = self.candidates(principal, valid_only, required).await?;
        Ok(plan(&owned, &candidates, valid_only, self.clock.now()))
    }

    /// Persist `valid = false` for stale grants. Returns how many rows
    /// changed; failures are logged, never returned.
    pub async fn reconcile(&self, stale: &[GrantId]) -> usize {
        let now = self.clock.now();
        let mut changed = 0;
        for id in stale {
            match self.store.invalidate_grant(id, now).await {
                Ok(true) => {
                    changed += 1;
                    tracing::debug!(grant = %id, "invalidated lapsed grant");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(grant = %id, error = %e, "failed to invalidate lapsed grant");
                }
            }
        }
        changed
    }

    /// Resolve the entitlement mapping for `principal` and self-heal stale
    /// grant flags.
    pub async fn resolve(
        &self,
        principal: &PrincipalId,
        valid_only: bool,
        required: Capabilities,
    ) -> Result<Entitlements> {
        let plan = self.plan(principal, valid_only, required).await?;
        self.reconcile(&plan.stale_grants).await;
        Ok(plan.entitlements)
    }
}
