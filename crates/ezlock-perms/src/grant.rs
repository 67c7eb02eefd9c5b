//! Delegated grant lifecycle: create, redeem, revoke.
//!
//! A grant is issued unredeemed. Its redemption token (the grant id in hex)
//! is handed to the intended recipient out of band; the first principal to
//! redeem it becomes the recipient for good.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ezlock_core::{Capabilities, Clock, Grant, GrantId, PrincipalId, Schedule};
use ezlock_store::Store;

use crate::error::{PermsError, Result};
use crate::resolver::Resolver;

/// What an issuer asks for when creating a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    /// MAC address of the lock to delegate.
    pub lock_mac: String,
    pub capabilities: Capabilities,
    pub schedule: Schedule,
}

/// Creates, redeems and revokes grants.
pub struct GrantManager<S: Store> {
    store: Arc<S>,
    resolver: Resolver<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> GrantManager<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        let resolver = Resolver::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            store,
            resolver,
            clock,
        }
    }

    /// Issue a new unredeemed grant.
    ///
    /// The issuer must own the lock or hold a valid grant on it with
    /// `share_auth`. Only owners may pass `share_auth` on.
    pub async fn create_grant(&self, issuer: &PrincipalId, request: &GrantRequest) -> Result<Grant> {
        let lock = self
            .store
            .get_lock_by_mac(&request.lock_mac)
            .await?
            .filter(|l| l.valid)
            .ok_or_else(|| PermsError::NotFound(format!("lock {}", request.lock_mac)))?;

        let is_owner = lock.owner == *issuer;
        if !is_owner {
            let sharable = self
                .resolver
                .resolve(issuer, true, Capabilities::SHARE_AUTH)
                .await?;
            if !sharable.contains(&lock.id) {
                return Err(PermsError::Unauthorized(format!(
                    "{} may not share lock {}",
                    issuer, request.lock_mac
                )));
            }
            if request.capabilities.share_auth {
                return Err(PermsError::Unauthorized(
                    "only the owner may grant share_auth".into(),
                ));
            }
        }

        let now = self.clock.now();
        if !request.schedule.is_satisfiable_from(now) {
            return Err(PermsError::InvalidTimeRange(format!(
                "{:?} can never be valid",
                request.schedule
            )));
        }

        let grant = Grant {
            id: GrantId::generate(),
            issuer: *issuer,
            recipient: None,
            lock_id: lock.id,
            schedule: request.schedule.clone(),
            capabilities: request.capabilities,
            valid: true,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_grant(&grant).await?;

        tracing::info!(
            grant = %grant.id,
            lock = %lock.id,
            issuer = %issuer,
            delegate = !is_owner,
            "issued grant"
        );
        Ok(grant)
    }

    /// Redeem a grant by token, making `principal` its recipient.
    pub async fn redeem_grant(&self, token: &str, principal: &PrincipalId) -> Result<Grant> {
        let id = GrantId::from_hex(token.trim())
            .map_err(|_| PermsError::NotFound(format!("grant token {:?}", token)))?;

        let mut grant = self
            .store
            .get_grant(&id)
            .await?
            .ok_or_else(|| PermsError::NotFound(format!("grant {}", id)))?;

        if grant.is_redeemed() {
            return Err(PermsError::AlreadyUsed(id.to_hex()));
        }
        if grant.issuer == *principal {
            return Err(PermsError::SelfRedemptionDenied);
        }

        let now = self.clock.now();
        if !self.store.redeem_grant(&id, principal, now).await? {
            // Lost the race to another redeemer.
            return Err(PermsError::AlreadyUsed(id.to_hex()));
        }

        grant.recipient = Some(*principal);
        grant.updated_at = now;
        tracing::info!(grant = %id, recipient = %principal, "redeemed grant");
        Ok(grant)
    }

    /// Revoke a grant. Only its issuer may do so; revoking twice is a no-op.
    pub async fn revoke_grant(&self, id: &GrantId, issuer: &PrincipalId) -> Result<()> {
        let grant = self
            .store
            .get_grant(id)
            .await?
            .ok_or_else(|| PermsError::NotFound(format!("grant {}", id)))?;

        if grant.issuer != *issuer {
            return Err(PermsError::Unauthorized(format!(
                "{} did not issue grant {}",
                issuer, id
            )));
        }

        if self.store.invalidate_grant(id, self.clock.now()).await? {
            tracing::info!(grant = %id, "revoked grant");
        }
        Ok(())
    }

    pub fn resolver(&self) -> &Resolver<S> {
        &self.resolver
    }
}
