//! SQLite-backed [`SettingsStore`].
//!
//! One database file holds every user's rows; `(user_id, name)` and
//! `(user_id, key)` are unique, so writes are plain upserts.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use cg_domain::error::{Error, Result};
use cg_domain::trace::TraceEvent;

use crate::store::{check_bounds, SettingsStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS features (
    user_id     TEXT NOT NULL,
    name        VARCHAR(50) NOT NULL,
    is_enabled  INTEGER NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(user_id, name)
);
CREATE TABLE IF NOT EXISTS settings (
    user_id     TEXT NOT NULL,
    key         VARCHAR(50) NOT NULL,
    value       VARCHAR(2500) NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(user_id, key)
);
";

/// How long a writer waits on another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn from_sqlite(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
}

impl SqliteSettingsStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(from_sqlite)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(from_sqlite)?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(from_sqlite)?;

        tracing::info!(path = %path.display(), journal_mode = %mode, "settings store opened");
        Self::with_connection(conn)
    }

    /// A private in-memory database (tests, ephemeral runs).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(from_sqlite)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        // IF NOT EXISTS makes this safe to run on every open, from any
        // number of processes.
        conn.execute_batch(SCHEMA).map_err(from_sqlite)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn is_enabled(&self, user_id: &str, kind: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let enabled: Option<i64> = conn
            .query_row(
                "SELECT is_enabled FROM features WHERE user_id = ?1 AND name = ?2",
                params![user_id, kind],
                |row| row.get(0),
            )
            .optional()
            .map_err(from_sqlite)?;
        Ok(enabled == Some(1))
    }

    fn set_enabled(&self, user_id: &str, kind: &str, enabled: bool) -> Result<()> {
        check_bounds(kind, None)?;
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO features (user_id, name, is_enabled, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, name) DO UPDATE SET
                    is_enabled = excluded.is_enabled,
                    updated_at = excluded.updated_at",
                params![user_id, kind, enabled as i64, now],
            )
            .map_err(from_sqlite)?;
        }

        TraceEvent::FeatureToggled {
            user_id: user_id.to_owned(),
            kind: kind.to_owned(),
            enabled,
        }
        .emit();
        Ok(())
    }

    fn get_parameter(&self, user_id: &str, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM settings WHERE user_id = ?1 AND key = ?2",
            params![user_id, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(from_sqlite)
    }

    fn set_parameter(&self, user_id: &str, key: &str, value: &str) -> Result<()> {
        check_bounds(key, Some(value))?;
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO settings (user_id, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![user_id, key, value, now],
            )
            .map_err(from_sqlite)?;
        }

        // Values are often secrets; only the key is traced.
        TraceEvent::SettingWritten {
            user_id: user_id.to_owned(),
            key: key.to_owned(),
        }
        .emit();
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MAX_KEY_LEN, MAX_VALUE_LEN};
    use std::sync::Arc;

    #[test]
    fn unknown_rows_read_as_absent() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        assert!(!store.is_enabled("u1", "duckduckgo").unwrap());
        assert_eq!(store.get_parameter("u1", "url").unwrap(), None);
    }

    #[test]
    fn set_parameter_twice_keeps_latest() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.set_parameter("u1", "url", "http://first").unwrap();
        store.set_parameter("u1", "url", "http://second").unwrap();
        assert_eq!(
            store.get_parameter("u1", "url").unwrap().as_deref(),
            Some("http://second")
        );
    }

    #[test]
    fn disable_keeps_row_with_false() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.set_enabled("u1", "home_assistant", true).unwrap();
        assert!(store.is_enabled("u1", "home_assistant").unwrap());

        store.set_enabled("u1", "home_assistant", false).unwrap();
        assert!(!store.is_enabled("u1", "home_assistant").unwrap());

        let rows: i64 = store
            .conn
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM features WHERE user_id = 'u1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn rows_are_private_per_user() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.set_enabled("alice", "movies", true).unwrap();
        store.set_parameter("alice", "webhook_url", "http://alice").unwrap();

        assert!(!store.is_enabled("bob", "movies").unwrap());
        assert_eq!(store.get_parameter("bob", "webhook_url").unwrap(), None);

        store.set_parameter("bob", "webhook_url", "http://bob").unwrap();
        assert_eq!(
            store.get_parameter("alice", "webhook_url").unwrap().as_deref(),
            Some("http://alice")
        );
    }

    #[test]
    fn oversized_values_are_rejected() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        let long_key = "k".repeat(MAX_KEY_LEN + 1);
        let long_value = "v".repeat(MAX_VALUE_LEN + 1);

        assert!(matches!(
            store.set_parameter("u1", &long_key, "x"),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            store.set_parameter("u1", "token", &long_value),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(store
            .set_parameter("u1", "token", &"v".repeat(MAX_VALUE_LEN))
            .is_ok());
    }

    #[test]
    fn reopening_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.sqlite3");

        {
            let store = SqliteSettingsStore::open(&path).unwrap();
            store.set_enabled("u1", "googlesearch", true).unwrap();
            store.set_parameter("u1", "google_cse_id", "cse").unwrap();
        }

        // Schema creation runs again on open and must not clobber data.
        let store = SqliteSettingsStore::open(&path).unwrap();
        assert!(store.is_enabled("u1", "googlesearch").unwrap());
        assert_eq!(
            store.get_parameter("u1", "google_cse_id").unwrap().as_deref(),
            Some("cse")
        );
    }

    #[test]
    fn concurrent_opens_and_writes_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("settings.sqlite3"));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = SqliteSettingsStore::open(&path).unwrap();
                    store
                        .set_parameter(&format!("user{i}"), "url", &format!("http://{i}"))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let store = SqliteSettingsStore::open(&path).unwrap();
        for i in 0..4 {
            assert_eq!(
                store.get_parameter(&format!("user{i}"), "url").unwrap(),
                Some(format!("http://{i}"))
            );
        }
    }
}
