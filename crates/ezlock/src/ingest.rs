//! Inbound hardware payloads: card enrolment, card removal, log batches.
//!
//! Payloads arrive sealed under the lock's secret. Card payloads carry a
//! bare card number. Log batches follow the grammar in
//! [`ezlock_core::logline`]; a malformed entry is skipped and reported, never
//! fatal to the rest of the batch.

use serde::{Deserialize, Serialize};

use ezlock_core::logline::{parse_entry, split_batch};
use ezlock_core::{crypto, Card, CoreError, Lock, LockSecret, LogRecord, PrincipalId};
use ezlock_store::{Store, UpsertResult};

use crate::error::{EzlockError, Result};

/// What an inbound payload contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadKind {
    CardAdd,
    CardDelete,
    LogBatch,
}

/// Result of decoding and applying a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    CardAdded(Card),
    /// `removed` is false when no valid card had the number.
    CardDeleted { number: String, removed: bool },
    LogsIngested(IngestReport),
}

/// A log entry that was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub raw: String,
    pub reason: String,
}

/// Summary of a log batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedEntry>,
}

impl IngestReport {
    /// Entries written, new or refreshed.
    pub fn stored(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Decrypt a payload and require UTF-8 plaintext.
pub fn open_payload(secret: &LockSecret, payload: &str) -> Result<String> {
    let plain = crypto::open(secret, payload)?;
    String::from_utf8(plain)
        .map_err(|_| EzlockError::CryptoFailure("plaintext is not valid UTF-8".into()))
}

/// Parse and upsert every entry of a decrypted log batch for `lock`.
pub async fn ingest_log_batch<S: Store + ?Sized>(
    store: &S,
    lock: &Lock,
    plaintext: &str,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for raw in split_batch(plaintext) {
        let entry = match parse_entry(raw) {
            Ok(entry) => entry,
            Err(CoreError::MalformedRecord { line, reason }) => {
                tracing::warn!(lock = %lock.id, line = %line, reason = %reason, "skipping malformed log entry");
                report.skipped.push(SkippedEntry { raw: line, reason });
                continue;
            }
            Err(other) => return Err(other.into()),
        };

        let principal = if entry.requires_principal() {
            match resolve_principal(store, &entry.info).await? {
                Some(id) => Some(id),
                None => {
                    tracing::warn!(lock = %lock.id, line = %entry.raw, "skipping log entry for unknown principal");
                    report.skipped.push(SkippedEntry {
                        raw: entry.raw,
                        reason: format!("unknown principal {:?}", entry.info),
                    });
                    continue;
                }
            }
        } else {
            None
        };

        let record = LogRecord {
            lock_id: lock.id,
            principal,
            method: entry.method,
            success: entry.success,
            raw: entry.raw,
            occurred_at: entry.occurred_at,
        };
        match store.upsert_log(&record).await? {
            UpsertResult::Inserted => report.inserted += 1,
            UpsertResult::Updated => report.updated += 1,
            UpsertResult::Conflict => {
                tracing::warn!(lock = %lock.id, line = %record.raw, "skipping log entry recorded by another lock");
                report.skipped.push(SkippedEntry {
                    raw: record.raw,
                    reason: "already recorded by another lock".into(),
                });
            }
        }
    }

    tracing::info!(
        lock = %lock.id,
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped.len(),
        "ingested log batch"
    );
    Ok(report)
}

async fn resolve_principal<S: Store + ?Sized>(store: &S, info: &str) -> Result<Option<PrincipalId>> {
    let Ok(id) = PrincipalId::from_hex(info) else {
        return Ok(None);
    };
    Ok(store.get_principal(&id).await?.map(|p| p.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use ezlock_core::{parse_minute, LockId, Principal};
    use ezlock_store::MemoryStore;

    fn at(s: &str) -> NaiveDateTime {
        parse_minute(s).unwrap()
    }

    fn lock() -> Lock {
        let t = at("2024-01-01 00:00");
        Lock {
            id: LockId::generate(),
            mac: "AA".into(),
            secret: LockSecret::from_bytes(vec![9u8; 16]),
            owner: PrincipalId::generate(),
            valid: true,
            name: String::new(),
            description: String::new(),
            model: String::new(),
            version: String::new(),
            created_at: t,
            updated_at: t,
        }
    }

    #[tokio::test]
    async fn test_mixed_batch() {
        let store = MemoryStore::new();
        let lock = lock();
        let batch = "open_2020-13-40 99:99_1_u1_1,0_2020-01-01 10:00_0_card123_1";

        let report = ingest_log_batch(&store, &lock, batch).await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].raw, "open_2020-13-40 99:99_1_u1_1");

        let logs = store.logs_for_lock(&lock.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].method, "0");
        assert!(logs[0].success);
        assert_eq!(logs[0].principal, None);
        assert_eq!(logs[0].occurred_at, at("2020-01-01 10:00"));
    }

    #[tokio::test]
    async fn test_authenticated_entries_need_known_principal() {
        let store = MemoryStore::new();
        let lock = lock();
        let known = Principal {
            id: PrincipalId::generate(),
            display_name: "Ann".into(),
        };
        store.upsert_principal(&known).await.unwrap();

        let batch = format!(
            "open_2024-01-01 10:00_1_{}_1, open_2024-01-01 10:01_1_{}_1",
            known.id,
            PrincipalId::generate()
        );
        let report = ingest_log_batch(&store, &lock, &batch).await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped.len(), 1);

        let logs = store.logs_for_lock(&lock.id).await.unwrap();
        assert_eq!(logs[0].principal, Some(known.id));
    }

    #[tokio::test]
    async fn test_resubmitted_batch_is_idempotent() {
        let store = MemoryStore::new();
        let lock = lock();
        let batch = "0_2020-01-01 10:00_0_c1_1,0_2020-01-01 10:05_0_c2_0";

        let first = ingest_log_batch(&store, &lock, batch).await.unwrap();
        let second = ingest_log_batch(&store, &lock, batch).await.unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(store.logs_for_lock(&lock.id).await.unwrap().len(), 2);
    }

    #[test]
    fn test_open_payload_rejects_non_utf8() {
        let secret = LockSecret::from_bytes(vec![9u8; 16]);
        let token = crypto::seal(&secret, &[0xff, 0xfe, 0xfd]).unwrap();
        assert!(matches!(
            open_payload(&secret, &token),
            Err(EzlockError::CryptoFailure(_))
        ));

        let token = crypto::seal(&secret, "card-001".as_bytes()).unwrap();
        assert_eq!(open_payload(&secret, &token).unwrap(), "card-001");
    }
}
