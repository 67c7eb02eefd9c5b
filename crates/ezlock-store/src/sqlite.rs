//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for EZLock. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use ezlock_core::{
    Capabilities, Card, CardId, Grant, GrantId, Lock, LockId, LockSecret, LogRecord, Principal,
    PrincipalId, Schedule, ScheduleFields, ID_LEN,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, Store, UpsertResult};

const LOCK_COLUMNS: &str = "id, mac, secret, owner, valid, name, description, model, version,
     created_at, updated_at";

const GRANT_COLUMNS: &str = "id, issuer, recipient, lock_id, kind, deadline, start_date, end_date,
     start_time, end_time, view_log, add_card, share_auth, valid, created_at, updated_at";

const CARD_COLUMNS: &str =
    "id, lock_id, number, added_by, valid, name, description, created_at, updated_at";

const LOG_COLUMNS: &str = "lock_id, principal, method, success, raw, occurred_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file (and missing parent directories) and runs
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// Helper to read a 12-byte id column.
fn id_col<T: From<[u8; ID_LEN]>>(row: &Row<'_>, name: &str) -> rusqlite::Result<T> {
    let bytes: Vec<u8> = row.get(name)?;
    to_id(name, bytes)
}

fn opt_id_col<T: From<[u8; ID_LEN]>>(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<T>> {
    let bytes: Option<Vec<u8>> = row.get(name)?;
    bytes.map(|b| to_id(name, b)).transpose()
}

fn to_id<T: From<[u8; ID_LEN]>>(name: &str, bytes: Vec<u8>) -> rusqlite::Result<T> {
    let arr: [u8; ID_LEN] = bytes.as_slice().try_into().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Blob,
            format!("column {} holds {} bytes, expected {}", name, bytes.len(), ID_LEN).into(),
        )
    })?;
    Ok(T::from(arr))
}

fn row_to_lock(row: &Row<'_>) -> rusqlite::Result<Lock> {
    Ok(Lock {
        id: id_col(row, "id")?,
        mac: row.get("mac")?,
        secret: LockSecret::from_bytes(row.get::<_, Vec<u8>>("secret")?),
        owner: id_col(row, "owner")?,
        valid: row.get("valid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        model: row.get("model")?,
        version: row.get("version")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_grant(row: &Row<'_>) -> rusqlite::Result<Grant> {
    let code: String = row.get("kind")?;
    let fields = ScheduleFields {
        deadline: row.get("deadline")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
    };

    Ok(Grant {
        id: id_col(row, "id")?,
        issuer: id_col(row, "issuer")?,
        recipient: opt_id_col(row, "recipient")?,
        lock_id: id_col(row, "lock_id")?,
        schedule: Schedule::from_parts(&code, fields),
        capabilities: Capabilities::new(
            row.get("view_log")?,
            row.get("add_card")?,
            row.get("share_auth")?,
        ),
        valid: row.get("valid")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_card(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: id_col(row, "id")?,
        lock_id: id_col(row, "lock_id")?,
        number: row.get("number")?,
        added_by: id_col(row, "added_by")?,
        valid: row.get("valid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<LogRecord> {
    Ok(LogRecord {
        lock_id: id_col(row, "lock_id")?,
        principal: opt_id_col(row, "principal")?,
        method: row.get("method")?,
        success: row.get("success")?,
        raw: row.get("raw")?,
        occurred_at: row.get("occurred_at")?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_lock(&self, lock: &Lock) -> Result<InsertResult> {
        let lock = lock.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row("SELECT 1 FROM locks WHERE mac = ?1", params![lock.mac], |row| {
                    row.get(0)
                })
                .optional()?;
            if existing.is_some() {
                return Ok(InsertResult::AlreadyExists);
            }

            tx.execute(
                "INSERT INTO locks (
                    id, mac, secret, owner, valid, name, description, model, version,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    lock.id.as_bytes().as_slice(),
                    lock.mac,
                    lock.secret.as_bytes(),
                    lock.owner.as_bytes().as_slice(),
                    lock.valid,
                    lock.name,
                    lock.description,
                    lock.model,
                    lock.version,
                    lock.created_at,
                    lock.updated_at,
                ],
            )?;
            tx.commit()?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_lock(&self, id: &LockId) -> Result<Option<Lock>> {
        let id = *id;

        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM locks WHERE id = ?1", LOCK_COLUMNS),
                params![id.as_bytes().as_slice()],
                row_to_lock,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_lock_by_mac(&self, mac: &str) -> Result<Option<Lock>> {
        let mac = mac.to_string();

        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM locks WHERE mac = ?1", LOCK_COLUMNS),
                params![mac],
                row_to_lock,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn locks_owned_by(&self, owner: &PrincipalId, valid_only: bool) -> Result<Vec<Lock>> {
        let owner = *owner;

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM locks
                 WHERE owner = ?1 AND (?2 = 0 OR valid = 1)
                 ORDER BY created_at, id",
                LOCK_COLUMNS
            ))?;

            let locks = stmt
                .query_map(params![owner.as_bytes().as_slice(), valid_only], row_to_lock)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(locks)
        })
        .await
    }

    async fn update_lock_details(
        &self,
        id: &LockId,
        name: Option<&str>,
        description: Option<&str>,
        at: NaiveDateTime,
    ) -> Result<()> {
        let id = *id;
        let name = name.map(str::to_string);
        let description = description.map(str::to_string);

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE locks
                 SET name = COALESCE(?2, name),
                     description = COALESCE(?3, description),
                     updated_at = ?4
                 WHERE id = ?1",
                params![id.as_bytes().as_slice(), name, description, at],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("lock {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn invalidate_lock(&self, id: &LockId, at: NaiveDateTime) -> Result<()> {
        let id = *id;

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE locks SET valid = 0, updated_at = ?2 WHERE id = ?1",
                params![id.as_bytes().as_slice(), at],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("lock {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn insert_grant(&self, grant: &Grant) -> Result<()> {
        let grant = grant.clone();

        self.run(move |conn| {
            let (code, fields) = grant.schedule.to_parts();
            conn.execute(
                "INSERT INTO grants (
                    id, issuer, recipient, lock_id, kind, deadline, start_date, end_date,
                    start_time, end_time, view_log, add_card, share_auth, valid,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    grant.id.as_bytes().as_slice(),
                    grant.issuer.as_bytes().as_slice(),
                    grant.recipient.as_ref().map(|r| r.as_bytes().as_slice()),
                    grant.lock_id.as_bytes().as_slice(),
                    code,
                    fields.deadline,
                    fields.start_date,
                    fields.end_date,
                    fields.start_time,
                    fields.end_time,
                    grant.capabilities.view_log,
                    grant.capabilities.add_card,
                    grant.capabilities.share_auth,
                    grant.valid,
                    grant.created_at,
                    grant.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_grant(&self, id: &GrantId) -> Result<Option<Grant>> {
        let id = *id;

        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM grants WHERE id = ?1", GRANT_COLUMNS),
                params![id.as_bytes().as_slice()],
                row_to_grant,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn grants_for_recipient(
        &self,
        recipient: &PrincipalId,
        valid_only: bool,
        required: Capabilities,
    ) -> Result<Vec<Grant>> {
        let recipient = *recipient;

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM grants
                 WHERE recipient = ?1
                   AND (?2 = 0 OR valid = 1)
                   AND (?3 = 0 OR view_log = 1)
                   AND (?4 = 0 OR add_card = 1)
                   AND (?5 = 0 OR share_auth = 1)
                 ORDER BY created_at, id",
                GRANT_COLUMNS
            ))?;

            let grants = stmt
                .query_map(
                    params![
                        recipient.as_bytes().as_slice(),
                        valid_only,
                        required.view_log,
                        required.add_card,
                        required.share_auth,
                    ],
                    row_to_grant,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(grants)
        })
        .await
    }

    async fn grants_for_lock(&self, lock: &LockId) -> Result<Vec<Grant>> {
        let lock = *lock;

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM grants WHERE lock_id = ?1 ORDER BY created_at, id",
                GRANT_COLUMNS
            ))?;

            let grants = stmt
                .query_map(params![lock.as_bytes().as_slice()], row_to_grant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(grants)
        })
        .await
    }

    async fn redeem_grant(
        &self,
        id: &GrantId,
        recipient: &PrincipalId,
        at: NaiveDateTime,
    ) -> Result<bool> {
        let id = *id;
        let recipient = *recipient;

        self.run(move |conn| {
            // Conditional on the recipient still being unset.
            let changed = conn.execute(
                "UPDATE grants SET recipient = ?2, updated_at = ?3
                 WHERE id = ?1 AND recipient IS NULL",
                params![id.as_bytes().as_slice(), recipient.as_bytes().as_slice(), at],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn invalidate_grant(&self, id: &GrantId, at: NaiveDateTime) -> Result<bool> {
        let id = *id;

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE grants SET valid = 0, updated_at = ?2 WHERE id = ?1 AND valid = 1",
                params![id.as_bytes().as_slice(), at],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn insert_card(&self, card: &Card) -> Result<InsertResult> {
        let card = card.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM cards WHERE lock_id = ?1 AND number = ?2",
                    params![card.lock_id.as_bytes().as_slice(), card.number],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(InsertResult::AlreadyExists);
            }

            tx.execute(
                "INSERT INTO cards (
                    id, lock_id, number, added_by, valid, name, description,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    card.id.as_bytes().as_slice(),
                    card.lock_id.as_bytes().as_slice(),
                    card.number,
                    card.added_by.as_bytes().as_slice(),
                    card.valid,
                    card.name,
                    card.description,
                    card.created_at,
                    card.updated_at,
                ],
            )?;
            tx.commit()?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_card(&self, id: &CardId) -> Result<Option<Card>> {
        let id = *id;

        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS),
                params![id.as_bytes().as_slice()],
                row_to_card,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn cards_for_lock(&self, lock: &LockId, valid_only: bool) -> Result<Vec<Card>> {
        let lock = *lock;

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM cards
                 WHERE lock_id = ?1 AND (?2 = 0 OR valid = 1)
                 ORDER BY created_at, id",
                CARD_COLUMNS
            ))?;

            let cards = stmt
                .query_map(params![lock.as_bytes().as_slice(), valid_only], row_to_card)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(cards)
        })
        .await
    }

    async fn count_cards(&self, lock: &LockId) -> Result<u64> {
        let lock = *lock;

        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cards WHERE lock_id = ?1",
                params![lock.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            u64::try_from(count).map_err(|_| StoreError::InvalidData(format!("card count {}", count)))
        })
        .await
    }

    async fn invalidate_card(
        &self,
        lock: &LockId,
        number: &str,
        at: NaiveDateTime,
    ) -> Result<bool> {
        let lock = *lock;
        let number = number.to_string();

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE cards SET valid = 0, updated_at = ?3
                 WHERE lock_id = ?1 AND number = ?2 AND valid = 1",
                params![lock.as_bytes().as_slice(), number, at],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn update_card_details(
        &self,
        id: &CardId,
        name: Option<&str>,
        description: Option<&str>,
        at: NaiveDateTime,
    ) -> Result<()> {
        let id = *id;
        let name = name.map(str::to_string);
        let description = description.map(str::to_string);

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE cards
                 SET name = COALESCE(?2, name),
                     description = COALESCE(?3, description),
                     updated_at = ?4
                 WHERE id = ?1",
                params![id.as_bytes().as_slice(), name, description, at],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("card {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn upsert_log(&self, record: &LogRecord) -> Result<UpsertResult> {
        let record = record.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT lock_id FROM logs WHERE raw = ?1",
                    params![record.raw],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(owner) = &existing {
                if owner.as_slice() != record.lock_id.as_bytes().as_slice() {
                    return Ok(UpsertResult::Conflict);
                }
            }

            tx.execute(
                "INSERT INTO logs (raw, lock_id, principal, method, success, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(raw) DO UPDATE SET
                    principal = excluded.principal,
                    method = excluded.method,
                    success = excluded.success,
                    occurred_at = excluded.occurred_at
                 WHERE logs.lock_id = excluded.lock_id",
                params![
                    record.raw,
                    record.lock_id.as_bytes().as_slice(),
                    record.principal.as_ref().map(|p| p.as_bytes().as_slice()),
                    record.method,
                    record.success,
                    record.occurred_at,
                ],
            )?;
            tx.commit()?;

            Ok(if existing.is_some() {
                UpsertResult::Updated
            } else {
                UpsertResult::Inserted
            })
        })
        .await
    }

    async fn logs_for_lock(&self, lock: &LockId) -> Result<Vec<LogRecord>> {
        let lock = *lock;

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM logs WHERE lock_id = ?1 ORDER BY occurred_at, raw",
                LOG_COLUMNS
            ))?;

            let logs = stmt
                .query_map(params![lock.as_bytes().as_slice()], row_to_log)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(logs)
        })
        .await
    }

    async fn upsert_principal(&self, principal: &Principal) -> Result<()> {
        let principal = principal.clone();

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO principals (id, display_name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
                params![principal.id.as_bytes().as_slice(), principal.display_name],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_principal(&self, id: &PrincipalId) -> Result<Option<Principal>> {
        let id = *id;

        self.run(move |conn| {
            conn.query_row(
                "SELECT id, display_name FROM principals WHERE id = ?1",
                params![id.as_bytes().as_slice()],
                |row| {
                    Ok(Principal {
                        id: id_col(row, "id")?,
                        display_name: row.get("display_name")?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn set_default_lock(
        &self,
        principal: &PrincipalId,
        lock: &LockId,
        at: NaiveDateTime,
    ) -> Result<()> {
        let principal = *principal;
        let lock = *lock;

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO default_locks (principal, lock_id, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(principal) DO UPDATE SET
                    lock_id = excluded.lock_id,
                    updated_at = excluded.updated_at",
                params![
                    principal.as_bytes().as_slice(),
                    lock.as_bytes().as_slice(),
                    at
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_default_lock(&self, principal: &PrincipalId) -> Result<Option<LockId>> {
        let principal = *principal;

        self.run(move |conn| {
            conn.query_row(
                "SELECT lock_id FROM default_locks WHERE principal = ?1",
                params![principal.as_bytes().as_slice()],
                |row| id_col(row, "lock_id"),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezlock_core::parse_minute;

    fn at(s: &str) -> NaiveDateTime {
        parse_minute(s).unwrap()
    }

    fn make_lock(mac: &str, owner: PrincipalId) -> Lock {
        let t = at("2024-01-01 08:00");
        Lock {
            id: LockId::generate(),
            mac: mac.to_string(),
            secret: LockSecret::from_bytes(b"0123456789abcdef".to_vec()),
            owner,
            valid: true,
            name: "front door".into(),
            description: String::new(),
            model: "EZ-1".into(),
            version: "1.0".into(),
            created_at: t,
            updated_at: t,
        }
    }

    fn make_grant(lock: &Lock, schedule: Schedule, caps: Capabilities) -> Grant {
        let t = at("2024-01-01 09:00");
        Grant {
            id: GrantId::generate(),
            issuer: lock.owner,
            recipient: None,
            lock_id: lock.id,
            schedule,
            capabilities: caps,
            valid: true,
            created_at: t,
            updated_at: t,
        }
    }

    fn make_card(lock: &Lock, number: &str) -> Card {
        let t = at("2024-01-01 10:00");
        Card {
            id: CardId::generate(),
            lock_id: lock.id,
            number: number.to_string(),
            added_by: lock.owner,
            valid: true,
            name: "card".into(),
            description: String::new(),
            created_at: t,
            updated_at: t,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_lock() {
        let store = SqliteStore::open_memory().unwrap();
        let lock = make_lock("AA:BB", PrincipalId::generate());

        assert_eq!(store.insert_lock(&lock).await.unwrap(), InsertResult::Inserted);

        let by_id = store.get_lock(&lock.id).await.unwrap().unwrap();
        assert_eq!(by_id.mac, "AA:BB");
        assert_eq!(by_id.secret, lock.secret);
        assert_eq!(by_id.created_at, lock.created_at);

        let by_mac = store.get_lock_by_mac("AA:BB").await.unwrap().unwrap();
        assert_eq!(by_mac.id, lock.id);
        assert!(store.get_lock_by_mac("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_mac_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        let owner = PrincipalId::generate();

        store.insert_lock(&make_lock("AA:BB", owner)).await.unwrap();
        let again = store.insert_lock(&make_lock("AA:BB", owner)).await.unwrap();
        assert_eq!(again, InsertResult::AlreadyExists);
    }

    #[tokio::test]
    async fn test_owned_locks_filter_validity() {
        let store = SqliteStore::open_memory().unwrap();
        let owner = PrincipalId::generate();
        let a = make_lock("A", owner);
        let b = make_lock("B", owner);
        store.insert_lock(&a).await.unwrap();
        store.insert_lock(&b).await.unwrap();
        store.invalidate_lock(&b.id, at("2024-02-01 00:00")).await.unwrap();

        assert_eq!(store.locks_owned_by(&owner, true).await.unwrap().len(), 1);
        assert_eq!(store.locks_owned_by(&owner, false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_lock_is_not_found() {
        let store = SqliteStore::open_memory().unwrap();
        let err = store
            .update_lock_details(&LockId::generate(), Some("x"), None, at("2024-01-01 00:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_lock_keeps_unset_fields() {
        let store = SqliteStore::open_memory().unwrap();
        let mut lock = make_lock("A", PrincipalId::generate());
        lock.description = "old".into();
        store.insert_lock(&lock).await.unwrap();

        store
            .update_lock_details(&lock.id, Some("back door"), None, at("2024-03-01 00:00"))
            .await
            .unwrap();

        let updated = store.get_lock(&lock.id).await.unwrap().unwrap();
        assert_eq!(updated.name, "back door");
        assert_eq!(updated.description, "old");
        assert_eq!(updated.updated_at, at("2024-03-01 00:00"));
    }

    #[tokio::test]
    async fn test_grant_roundtrip_preserves_schedule() {
        let store = SqliteStore::open_memory().unwrap();
        let lock = make_lock("A", PrincipalId::generate());
        let schedule = Schedule::TimeWindow {
            start_date: "2024-01-01".into(),
            end_date: "2024-12-31".into(),
            start_time: "09:00".into(),
            end_time: "18:00".into(),
        };
        let grant = make_grant(&lock, schedule, Capabilities::VIEW_LOG);
        store.insert_grant(&grant).await.unwrap();

        let loaded = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(loaded, grant);
    }

    #[tokio::test]
    async fn test_redeem_is_conditional() {
        let store = SqliteStore::open_memory().unwrap();
        let lock = make_lock("A", PrincipalId::generate());
        let grant = make_grant(&lock, Schedule::Permanent, Capabilities::NONE);
        store.insert_grant(&grant).await.unwrap();

        let first = PrincipalId::generate();
        let second = PrincipalId::generate();
        let t = at("2024-01-02 00:00");

        assert!(store.redeem_grant(&grant.id, &first, t).await.unwrap());
        assert!(!store.redeem_grant(&grant.id, &second, t).await.unwrap());

        let loaded = store.get_grant(&grant.id).await.unwrap().unwrap();
        assert_eq!(loaded.recipient, Some(first));
    }

    #[tokio::test]
    async fn test_grants_for_recipient_filters() {
        let store = SqliteStore::open_memory().unwrap();
        let lock = make_lock("A", PrincipalId::generate());
        let recipient = PrincipalId::generate();
        let t = at("2024-01-02 00:00");

        let plain = make_grant(&lock, Schedule::Permanent, Capabilities::NONE);
        let logs = make_grant(&lock, Schedule::Permanent, Capabilities::VIEW_LOG);
        let revoked = make_grant(&lock, Schedule::Permanent, Capabilities::VIEW_LOG);
        for g in [&plain, &logs, &revoked] {
            store.insert_grant(g).await.unwrap();
            store.redeem_grant(&g.id, &recipient, t).await.unwrap();
        }
        assert!(store.invalidate_grant(&revoked.id, t).await.unwrap());

        let all = store
            .grants_for_recipient(&recipient, false, Capabilities::NONE)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);

        let valid_logs = store
            .grants_for_recipient(&recipient, true, Capabilities::VIEW_LOG)
            .await
            .unwrap();
        assert_eq!(valid_logs.len(), 1);
        assert_eq!(valid_logs[0].id, logs.id);
    }

    #[tokio::test]
    async fn test_invalidate_grant_only_once() {
        let store = SqliteStore::open_memory().unwrap();
        let lock = make_lock("A", PrincipalId::generate());
        let grant = make_grant(&lock, Schedule::Permanent, Capabilities::NONE);
        store.insert_grant(&grant).await.unwrap();

        let t = at("2024-01-02 00:00");
        assert!(store.invalidate_grant(&grant.id, t).await.unwrap());
        assert!(!store.invalidate_grant(&grant.id, t).await.unwrap());
        assert!(!store.get_grant(&grant.id).await.unwrap().unwrap().valid);
    }

    #[tokio::test]
    async fn test_card_numbers_unique_per_lock_case_sensitive() {
        let store = SqliteStore::open_memory().unwrap();
        let lock = make_lock("A", PrincipalId::generate());
        let t = at("2024-01-02 00:00");

        assert_eq!(
            store.insert_card(&make_card(&lock, "abc")).await.unwrap(),
            InsertResult::Inserted
        );
        assert_eq!(
            store.insert_card(&make_card(&lock, "ABC")).await.unwrap(),
            InsertResult::Inserted
        );

        // A deleted card still blocks its number.
        assert!(store.invalidate_card(&lock.id, "abc", t).await.unwrap());
        assert_eq!(
            store.insert_card(&make_card(&lock, "abc")).await.unwrap(),
            InsertResult::AlreadyExists
        );

        assert_eq!(store.count_cards(&lock.id).await.unwrap(), 2);
        assert_eq!(store.cards_for_lock(&lock.id, true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_missing_card_is_noop() {
        let store = SqliteStore::open_memory().unwrap();
        let changed = store
            .invalidate_card(&LockId::generate(), "nope", at("2024-01-01 00:00"))
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_upsert_log_by_raw_line() {
        let store = SqliteStore::open_memory().unwrap();
        let lock = make_lock("A", PrincipalId::generate());
        let record = LogRecord {
            lock_id: lock.id,
            principal: None,
            method: "0".into(),
            success: true,
            raw: "0_2020-01-01 10:00_0_card123_1".into(),
            occurred_at: at("2020-01-01 10:00"),
        };

        assert_eq!(store.upsert_log(&record).await.unwrap(), UpsertResult::Inserted);
        assert_eq!(store.upsert_log(&record).await.unwrap(), UpsertResult::Updated);

        let logs = store.logs_for_lock(&lock.id).await.unwrap();
        assert_eq!(logs, vec![record]);
    }

    #[tokio::test]
    async fn test_upsert_log_never_moves_a_line_between_locks() {
        let store = SqliteStore::open_memory().unwrap();
        let a = make_lock("A", PrincipalId::generate());
        let b = make_lock("B", PrincipalId::generate());
        let original = LogRecord {
            lock_id: a.id,
            principal: None,
            method: "0".into(),
            success: true,
            raw: "0_2024-06-01 10:00_0_card1_1".into(),
            occurred_at: at("2024-06-01 10:00"),
        };
        let replayed = LogRecord {
            lock_id: b.id,
            ..original.clone()
        };

        store.upsert_log(&original).await.unwrap();
        assert_eq!(store.upsert_log(&replayed).await.unwrap(), UpsertResult::Conflict);

        assert_eq!(store.logs_for_lock(&a.id).await.unwrap(), vec![original]);
        assert!(store.logs_for_lock(&b.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_lock_is_replaced() {
        let store = SqliteStore::open_memory().unwrap();
        let who = PrincipalId::generate();
        let (first, second) = (LockId::generate(), LockId::generate());

        assert_eq!(store.get_default_lock(&who).await.unwrap(), None);
        store
            .set_default_lock(&who, &first, at("2024-01-01 08:00"))
            .await
            .unwrap();
        store
            .set_default_lock(&who, &second, at("2024-01-01 09:00"))
            .await
            .unwrap();
        assert_eq!(store.get_default_lock(&who).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_principal_directory() {
        let store = SqliteStore::open_memory().unwrap();
        let id = PrincipalId::generate();

        store
            .upsert_principal(&Principal {
                id,
                display_name: "Ann".into(),
            })
            .await
            .unwrap();
        store
            .upsert_principal(&Principal {
                id,
                display_name: "Ann B.".into(),
            })
            .await
            .unwrap();

        let p = store.get_principal(&id).await.unwrap().unwrap();
        assert_eq!(p.display_name, "Ann B.");
        assert!(store
            .get_principal(&PrincipalId::generate())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_on_disk_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ezlock.db");
        let lock = make_lock("A", PrincipalId::generate());

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_lock(&lock).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let loaded = reopened.get_lock(&lock.id).await.unwrap().unwrap();
        assert_eq!(loaded.mac, "A");
    }
}
