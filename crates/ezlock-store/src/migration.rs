//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Local::now().naive_local()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Physical locks. Never deleted, only invalidated.
        CREATE TABLE locks (
            id BLOB PRIMARY KEY,              -- 12 bytes
            mac TEXT NOT NULL UNIQUE,
            secret BLOB NOT NULL,             -- AES key, 16/24/32 bytes
            owner BLOB NOT NULL,
            valid INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            model TEXT NOT NULL,
            version TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Delegated grants. Schedule fields are kept verbatim.
        CREATE TABLE grants (
            id BLOB PRIMARY KEY,
            issuer BLOB NOT NULL,
            recipient BLOB,                   -- NULL until redeemed
            lock_id BLOB NOT NULL,
            kind TEXT NOT NULL,               -- "1" permanent, "2" deadline, "3" window
            deadline TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            view_log INTEGER NOT NULL,
            add_card INTEGER NOT NULL,
            share_auth INTEGER NOT NULL,
            valid INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Access cards enrolled on a lock.
        CREATE TABLE cards (
            id BLOB PRIMARY KEY,
            lock_id BLOB NOT NULL,
            number TEXT NOT NULL,
            added_by BLOB NOT NULL,
            valid INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,

            UNIQUE(lock_id, number)
        );

        -- Operation logs reported by locks, keyed by the raw line.
        CREATE TABLE logs (
            raw TEXT PRIMARY KEY,
            lock_id BLOB NOT NULL,
            principal BLOB,
            method TEXT NOT NULL,
            success INTEGER NOT NULL,
            occurred_at TEXT NOT NULL
        );

        -- Principal directory.
        CREATE TABLE principals (
            id BLOB PRIMARY KEY,
            display_name TEXT NOT NULL
        );

        CREATE INDEX idx_locks_owner ON locks(owner);
        CREATE INDEX idx_grants_recipient ON grants(recipient);
        CREATE INDEX idx_grants_lock ON grants(lock_id);
        CREATE INDEX idx_logs_lock ON logs(lock_id, occurred_at);
        "#,
    )?;

    Ok(())
}

/// Migration v2: Per-principal default lock.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- The lock a principal's client opens on by default. The lock may
        -- since have become unusable; readers re-check entitlement.
        CREATE TABLE default_locks (
            principal BLOB PRIMARY KEY,
            lock_id BLOB NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "locks",
            "grants",
            "cards",
            "logs",
            "principals",
            "default_locks",
            "schema_migrations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 'later')",
            [],
        )
        .unwrap();

        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }

    #[test]
    fn test_upgrade_from_v1_keeps_data() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL)",
            [],
        )
        .unwrap();
        apply_v1(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (1, 'earlier')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO principals (id, display_name) VALUES (x'00', 'Ann')",
            [],
        )
        .unwrap();

        migrate(&mut conn).unwrap();

        let name: String = conn
            .query_row("SELECT display_name FROM principals", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Ann");
        let defaults: i64 = conn
            .query_row("SELECT COUNT(*) FROM default_locks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(defaults, 0);
    }
}
