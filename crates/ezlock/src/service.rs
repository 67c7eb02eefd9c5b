//! The EZLock service: one facade over entitlements, grants, command tokens
//! and inbound hardware payloads.
//!
//! Every operation is an independent async unit of work against the shared
//! store. The caller's principal id is assumed already authenticated.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ezlock_core::{
    crypto, Capabilities, Card, CardId, Clock, Grant, GrantId, Lock, LockId, LockSecret, LockView,
    LogRecord, PrincipalId, Schedule, SystemClock,
};
use ezlock_perms::{Entitlements, GrantManager, GrantRequest, Resolver};
use ezlock_store::{InsertResult, Store};

use crate::command::{check_code_buffer, seal_command, OperationKind};
use crate::config::EzlockConfig;
use crate::error::{EzlockError, Result};
use crate::ingest::{ingest_log_batch, open_payload, DecodeOutcome, PayloadKind};

/// What an owner supplies when provisioning a lock.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LockRegistration {
    pub mac: String,
    pub secret: Vec<u8>,
    pub name: String,
    pub description: String,
    pub model: String,
    pub version: String,
}

/// A grant as shown to its issuer or recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantView {
    pub id: GrantId,
    pub issuer: PrincipalId,
    pub issuer_name: Option<String>,
    pub recipient: Option<PrincipalId>,
    pub recipient_name: Option<String>,
    pub schedule: Schedule,
    pub capabilities: Capabilities,
    pub valid: bool,
}

/// A log record with the attributed principal's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogView {
    #[serde(flatten)]
    pub record: LogRecord,
    pub principal_name: Option<String>,
}

/// A principal's default lock and whether it is usable right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultLock {
    pub name: String,
    pub mac: String,
    /// False once the entitlement that made it usable has lapsed.
    pub valid: bool,
}

/// The main EZLock struct.
///
/// Provides a unified API for:
/// - Resolving entitlements
/// - Issuing, redeeming and revoking grants
/// - Deriving command tokens for locks
/// - Decoding payloads forwarded from locks
/// - Managing locks and cards
pub struct Ezlock<S: Store> {
    /// The storage backend.
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EzlockConfig,
    resolver: Resolver<S>,
    grants: GrantManager<S>,
}

impl<S: Store> Ezlock<S> {
    /// Create a service on the system clock.
    pub fn new(store: S, config: EzlockConfig) -> Self {
        Self::with_clock(Arc::new(store), Arc::new(SystemClock), config)
    }

    /// Create a service sharing an existing store handle and clock.
    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>, config: EzlockConfig) -> Self {
        let resolver = Resolver::new(Arc::clone(&store), Arc::clone(&clock));
        let grants = GrantManager::new(Arc::clone(&store), Arc::clone(&clock));
        Self {
            store,
            clock,
            config,
            resolver,
            grants,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EzlockConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entitlements & Grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Map of locks `principal` may use to whether it owns them.
    pub async fn resolve_entitlements(
        &self,
        principal: &PrincipalId,
        valid_only: bool,
        required: Capabilities,
    ) -> Result<Entitlements> {
        Ok(self.resolver.resolve(principal, valid_only, required).await?)
    }

    /// Issue a grant and return its redemption token.
    pub async fn create_grant(&self, issuer: &PrincipalId, request: &GrantRequest) -> Result<String> {
        let grant = self.grants.create_grant(issuer, request).await?;
        Ok(grant.token())
    }

    /// Redeem a grant token for `principal`.
    pub async fn redeem_grant(&self, token: &str, principal: &PrincipalId) -> Result<Grant> {
        Ok(self.grants.redeem_grant(token, principal).await?)
    }

    /// Revoke a grant issued by `issuer`.
    pub async fn revoke_grant(&self, grant: &GrantId, issuer: &PrincipalId) -> Result<()> {
        Ok(self.grants.revoke_grant(grant, issuer).await?)
    }

    /// Grants on the lock that `principal` issued or received.
    pub async fn list_lock_grants(&self, principal: &PrincipalId, mac: &str) -> Result<Vec<GrantView>> {
        let lock = self.lock_by_mac(mac).await?;
        let grants = self.store.grants_for_lock(&lock.id).await?;

        let mut names = NameCache::default();
        let mut views = Vec::new();
        for grant in grants {
            if grant.issuer != *principal && grant.recipient != Some(*principal) {
                continue;
            }
            let issuer_name = names.get(self.store.as_ref(), &grant.issuer).await?;
            let recipient_name = match &grant.recipient {
                Some(r) => names.get(self.store.as_ref(), r).await?,
                None => None,
            };
            views.push(GrantView {
                id: grant.id,
                issuer: grant.issuer,
                issuer_name,
                recipient: grant.recipient,
                recipient_name,
                schedule: grant.schedule,
                capabilities: grant.capabilities,
                valid: grant.valid,
            });
        }
        Ok(views)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Command Tokens
    // ─────────────────────────────────────────────────────────────────────────

    /// Derive a sealed command token for `operation` on the lock at `mac`.
    ///
    /// `code_buffer` must be one block long; its content is replaced by a
    /// fresh random IV.
    pub async fn derive_command_key(
        &self,
        principal: &PrincipalId,
        mac: &str,
        operation: &OperationKind,
        code_buffer: &[u8],
    ) -> Result<String> {
        check_code_buffer(code_buffer)?;
        let lock = self.valid_lock_by_mac(mac).await?;

        let entitled = self
            .resolver
            .resolve(principal, true, operation.required_capabilities())
            .await?;
        if !entitled.contains(&lock.id) {
            tracing::debug!(lock = %lock.id, principal = %principal, ?operation, "command denied");
            return Err(EzlockError::Unauthorized(format!(
                "{} may not {:?} lock {}",
                principal, operation, mac
            )));
        }

        let opcode = operation.opcode(&self.config.opcodes);
        let token = seal_command(&lock.secret, &opcode, self.clock.now(), principal)?;
        tracing::info!(lock = %lock.id, principal = %principal, opcode = %opcode, "derived command key");
        Ok(token)
    }

    /// Derive a card-removal token. Allowed for the lock owner and for the
    /// principal who enrolled the card while still entitled to the lock.
    pub async fn derive_card_delete_key(
        &self,
        principal: &PrincipalId,
        card: &CardId,
        code_buffer: &[u8],
    ) -> Result<String> {
        check_code_buffer(code_buffer)?;
        let card = self
            .store
            .get_card(card)
            .await?
            .filter(|c| c.valid)
            .ok_or_else(|| EzlockError::NotFound(format!("card {}", card)))?;
        let lock = self
            .store
            .get_lock(&card.lock_id)
            .await?
            .filter(|l| l.valid)
            .ok_or_else(|| EzlockError::NotFound(format!("lock {}", card.lock_id)))?;

        let allowed = if lock.owner == *principal {
            true
        } else if card.added_by == *principal {
            self.resolver
                .resolve(principal, true, Capabilities::NONE)
                .await?
                .contains(&lock.id)
        } else {
            false
        };
        if !allowed {
            return Err(EzlockError::Unauthorized(format!(
                "{} may not remove card {}",
                principal, card.id
            )));
        }

        let operation = OperationKind::DelCard {
            card_number: card.number.clone(),
        };
        let opcode = operation.opcode(&self.config.opcodes);
        let token = seal_command(&lock.secret, &opcode, self.clock.now(), principal)?;
        tracing::info!(lock = %lock.id, card = %card.id, "derived card delete key");
        Ok(token)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound Payloads
    // ─────────────────────────────────────────────────────────────────────────

    /// Decrypt a payload forwarded from the lock at `mac` and apply it.
    pub async fn decode_payload(
        &self,
        principal: &PrincipalId,
        mac: &str,
        payload: &str,
        kind: PayloadKind,
    ) -> Result<DecodeOutcome> {
        let lock = self.lock_by_mac(mac).await?;

        let entitled = self
            .resolver
            .resolve(principal, false, Capabilities::NONE)
            .await?;
        if !entitled.contains(&lock.id) {
            return Err(EzlockError::Unauthorized(format!(
                "{} has no entitlement on lock {}",
                principal, mac
            )));
        }

        let plaintext = open_payload(&lock.secret, payload)?;

        match kind {
            PayloadKind::CardAdd => {
                let card = self.enrol_card(principal, &lock, plaintext.trim()).await?;
                Ok(DecodeOutcome::CardAdded(card))
            }
            PayloadKind::CardDelete => {
                let number = plaintext.trim().to_string();
                let removed = self
                    .store
                    .invalidate_card(&lock.id, &number, self.clock.now())
                    .await?;
                if removed {
                    tracing::info!(lock = %lock.id, "removed card");
                } else {
                    tracing::debug!(lock = %lock.id, "card delete for unknown number ignored");
                }
                Ok(DecodeOutcome::CardDeleted { number, removed })
            }
            PayloadKind::LogBatch => {
                let report = ingest_log_batch(self.store.as_ref(), &lock, &plaintext).await?;
                Ok(DecodeOutcome::LogsIngested(report))
            }
        }
    }

    async fn enrol_card(&self, principal: &PrincipalId, lock: &Lock, number: &str) -> Result<Card> {
        if number.is_empty() {
            return Err(EzlockError::MalformedRecord {
                line: number.to_string(),
                reason: "empty card number".into(),
            });
        }

        let who = self
            .store
            .get_principal(principal)
            .await?
            .ok_or_else(|| EzlockError::NotFound(format!("principal {}", principal)))?;
        let existing = self.store.count_cards(&lock.id).await?;
        let now = self.clock.now();

        let card = Card {
            id: CardId::generate(),
            lock_id: lock.id,
            number: number.to_string(),
            added_by: *principal,
            valid: true,
            name: self.config.card_name(&who.display_name, existing),
            description: String::new(),
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_card(&card).await? {
            InsertResult::Inserted => {
                tracing::info!(lock = %lock.id, card = %card.id, "enrolled card");
                Ok(card)
            }
            InsertResult::AlreadyExists => Err(EzlockError::AlreadyExists(format!(
                "card {} on lock {}",
                number, lock.mac
            ))),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Locks
    // ─────────────────────────────────────────────────────────────────────────

    /// Provision a lock owned by `owner`.
    pub async fn register_lock(
        &self,
        owner: &PrincipalId,
        registration: LockRegistration,
    ) -> Result<LockView> {
        let secret = LockSecret::from_bytes(registration.secret);
        crypto::validate_secret(&secret)?;

        let now = self.clock.now();
        let lock = Lock {
            id: LockId::generate(),
            mac: registration.mac,
            secret,
            owner: *owner,
            valid: true,
            name: registration.name,
            description: registration.description,
            model: registration.model,
            version: registration.version,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_lock(&lock).await? {
            InsertResult::Inserted => {
                tracing::info!(lock = %lock.id, mac = %lock.mac, owner = %owner, "registered lock");
                Ok(lock.view(true))
            }
            InsertResult::AlreadyExists => {
                Err(EzlockError::AlreadyExists(format!("lock {}", lock.mac)))
            }
        }
    }

    /// Rename or re-describe a lock. Owner only.
    pub async fn update_lock(
        &self,
        owner: &PrincipalId,
        mac: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        let lock = self.owned_lock(owner, mac).await?;
        self.store
            .update_lock_details(&lock.id, name, description, self.clock.now())
            .await?;
        Ok(())
    }

    /// Logically delete a lock. Owner only.
    pub async fn delete_lock(&self, owner: &PrincipalId, mac: &str) -> Result<()> {
        let lock = self.owned_lock(owner, mac).await?;
        self.store.invalidate_lock(&lock.id, self.clock.now()).await?;
        tracing::info!(lock = %lock.id, "deleted lock");
        Ok(())
    }

    /// Locks `principal` may use, without secrets or owner ids.
    pub async fn list_locks(&self, principal: &PrincipalId, valid_only: bool) -> Result<Vec<LockView>> {
        let entitled = self
            .resolver
            .resolve(principal, valid_only, Capabilities::NONE)
            .await?;

        let mut views = Vec::with_capacity(entitled.len());
        for (id, is_owner) in entitled {
            if let Some(lock) = self.store.get_lock(&id).await? {
                views.push(lock.view(is_owner));
            }
        }
        Ok(views)
    }

    /// Make the lock at `mac` the principal's default.
    ///
    /// Any entitlement counts, valid or not, so a time-window grant outside
    /// its hours can still be chosen.
    pub async fn set_default_lock(&self, principal: &PrincipalId, mac: &str) -> Result<()> {
        let lock = self.lock_by_mac(mac).await?;
        let entitled = self
            .resolver
            .resolve(principal, false, Capabilities::NONE)
            .await?;
        if !entitled.contains(&lock.id) {
            return Err(EzlockError::NotFound(format!("lock {}", mac)));
        }

        self.store
            .set_default_lock(principal, &lock.id, self.clock.now())
            .await?;
        tracing::debug!(principal = %principal, lock = %lock.id, "set default lock");
        Ok(())
    }

    /// The principal's default lock, flagged with whether it is currently
    /// usable.
    pub async fn get_default_lock(&self, principal: &PrincipalId) -> Result<DefaultLock> {
        let id = self
            .store
            .get_default_lock(principal)
            .await?
            .ok_or_else(|| EzlockError::NotFound(format!("default lock of {}", principal)))?;
        let lock = self
            .store
            .get_lock(&id)
            .await?
            .ok_or_else(|| EzlockError::NotFound(format!("lock {}", id)))?;

        let valid = self
            .resolver
            .resolve(principal, true, Capabilities::NONE)
            .await?
            .contains(&lock.id);
        Ok(DefaultLock {
            name: lock.name,
            mac: lock.mac,
            valid,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cards & Logs
    // ─────────────────────────────────────────────────────────────────────────

    /// Valid cards on the lock. Owners see every card; delegates see the
    /// cards they enrolled.
    pub async fn list_cards(&self, principal: &PrincipalId, mac: &str) -> Result<Vec<Card>> {
        let lock = self.lock_by_mac(mac).await?;
        let entitled = self
            .resolver
            .resolve(principal, true, Capabilities::NONE)
            .await?;

        match entitled.get(&lock.id) {
            Some(true) => Ok(self.store.cards_for_lock(&lock.id, true).await?),
            Some(false) => Ok(self
                .store
                .cards_for_lock(&lock.id, true)
                .await?
                .into_iter()
                .filter(|c| c.added_by == *principal)
                .collect()),
            None => Err(EzlockError::Unauthorized(format!(
                "{} has no entitlement on lock {}",
                principal, mac
            ))),
        }
    }

    /// Rename or re-describe a valid card. Card enroller or lock owner only.
    pub async fn rename_card(
        &self,
        principal: &PrincipalId,
        card: &CardId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        let found = self.store.get_card(card).await?.filter(|c| c.valid);
        let lock = match &found {
            Some(c) => self.store.get_lock(&c.lock_id).await?,
            None => None,
        };

        let permitted = match (&found, &lock) {
            (Some(c), Some(l)) => c.added_by == *principal || l.owner == *principal,
            _ => false,
        };
        if !permitted {
            return Err(EzlockError::NotFound(format!("card {}", card)));
        }

        self.store
            .update_card_details(card, name, description, self.clock.now())
            .await?;
        Ok(())
    }

    /// Operation log of the lock. Requires ownership or `view_log`.
    pub async fn list_logs(&self, principal: &PrincipalId, mac: &str) -> Result<Vec<LogView>> {
        let lock = self.lock_by_mac(mac).await?;
        let entitled = self
            .resolver
            .resolve(principal, false, Capabilities::VIEW_LOG)
            .await?;
        if !entitled.contains(&lock.id) {
            return Err(EzlockError::Unauthorized(format!(
                "{} may not view the log of lock {}",
                principal, mac
            )));
        }

        let mut names = NameCache::default();
        let mut views = Vec::new();
        for record in self.store.logs_for_lock(&lock.id).await? {
            let principal_name = match &record.principal {
                Some(p) => names.get(self.store.as_ref(), p).await?,
                None => None,
            };
            views.push(LogView {
                record,
                principal_name,
            });
        }
        Ok(views)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn lock_by_mac(&self, mac: &str) -> Result<Lock> {
        self.store
            .get_lock_by_mac(mac)
            .await?
            .ok_or_else(|| EzlockError::NotFound(format!("lock {}", mac)))
    }

    async fn valid_lock_by_mac(&self, mac: &str) -> Result<Lock> {
        let lock = self.lock_by_mac(mac).await?;
        if !lock.valid {
            return Err(EzlockError::NotFound(format!("lock {}", mac)));
        }
        Ok(lock)
    }

    async fn owned_lock(&self, owner: &PrincipalId, mac: &str) -> Result<Lock> {
        let lock = self.valid_lock_by_mac(mac).await?;
        if lock.owner != *owner {
            return Err(EzlockError::NotFound(format!("lock {}", mac)));
        }
        Ok(lock)
    }
}

/// Per-call display name lookups.
#[derive(Default)]
struct NameCache {
    names: HashMap<PrincipalId, Option<String>>,
}

impl NameCache {
    async fn get<S: Store + ?Sized>(&mut self, store: &S, id: &PrincipalId) -> Result<Option<String>> {
        if let Some(name) = self.names.get(id) {
            return Ok(name.clone());
        }
        let name = store.get_principal(id).await?.map(|p| p.display_name);
        self.names.insert(*id, name.clone());
        Ok(name)
    }
}
