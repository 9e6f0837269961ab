//! SQLite-backed user profile facts with last-write-wins semantics.

use crate::error::MemoryError;
use crate::model::UserProfileFact;
use chrono::Utc;
use log::debug;
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::collections::BTreeMap;
use std::path::Path;

/// Durable key/value facts about the user, applied as context preamble on
/// every agent loop invocation.
pub struct ProfileStore {
    conn: Mutex<Connection>,
}

impl ProfileStore {
    /// Open (or create) a profile database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MemoryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_profile (
                user_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, key)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Upsert one fact. A later write for the same key replaces the value.
    pub fn set_fact(&self, user_id: &str, key: &str, value: &str) -> Result<(), MemoryError> {
        let now = Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO user_profile (user_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![user_id, key, value, now],
        )?;
        debug!("profile fact set (user_id={}, key={})", user_id, key);
        Ok(())
    }

    /// All facts for a user, ordered by key for stable prompt assembly.
    pub fn get_profile(&self, user_id: &str) -> Result<BTreeMap<String, String>, MemoryError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT key, value FROM user_profile WHERE user_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut profile = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            profile.insert(key, value);
        }
        Ok(profile)
    }

    /// One fact with its update timestamp, if present.
    pub fn get_fact(&self, user_id: &str, key: &str) -> Result<Option<UserProfileFact>, MemoryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, value, updated_at FROM user_profile WHERE user_id = ?1 AND key = ?2",
        )?;
        let mut rows = stmt.query_map(params![user_id, key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        match rows.next() {
            Some(row) => {
                let (key, value, updated_at) = row?;
                let updated_at = updated_at.parse().map_err(|err| {
                    MemoryError::Corrupt(format!(
                        "bad updated_at for profile fact (user_id={user_id}, key={key}): {err}"
                    ))
                })?;
                Ok(Some(UserProfileFact {
                    key,
                    value,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn last_write_wins_per_key() {
        let store = ProfileStore::open_in_memory().expect("store");
        store.set_fact("u1", "city", "Lisbon").expect("set");
        store.set_fact("u1", "city", "Porto").expect("overwrite");

        let profile = store.get_profile("u1").expect("profile");
        assert_eq!(profile.get("city"), Some(&"Porto".to_string()));
        assert_eq!(profile.len(), 1);
    }

    #[test]
    fn profiles_are_isolated_per_user() {
        let store = ProfileStore::open_in_memory().expect("store");
        store.set_fact("u1", "lang", "pt").expect("set");
        store.set_fact("u2", "lang", "en").expect("set");

        assert_eq!(
            store.get_profile("u1").expect("u1").get("lang"),
            Some(&"pt".to_string())
        );
        assert_eq!(
            store.get_profile("u2").expect("u2").get("lang"),
            Some(&"en".to_string())
        );
    }

    #[test]
    fn facts_are_ordered_by_key() {
        let store = ProfileStore::open_in_memory().expect("store");
        store.set_fact("u1", "b", "2").expect("set");
        store.set_fact("u1", "a", "1").expect("set");

        let keys: Vec<String> = store.get_profile("u1").expect("profile").into_keys().collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_fact_is_none() {
        let store = ProfileStore::open_in_memory().expect("store");
        assert!(store.get_fact("u1", "nope").expect("get").is_none());
    }

    #[test]
    fn fact_carries_its_update_timestamp() {
        let store = ProfileStore::open_in_memory().expect("store");
        store.set_fact("u1", "city", "Lisbon").expect("set");
        let fact = store.get_fact("u1", "city").expect("get").expect("fact");
        assert_eq!(fact.value, "Lisbon");
        assert!(fact.updated_at <= Utc::now());
    }

    #[test]
    fn malformed_timestamp_surfaces_an_error() {
        let store = ProfileStore::open_in_memory().expect("store");
        store.set_fact("u1", "city", "Lisbon").expect("set");
        store
            .conn
            .lock()
            .execute(
                "UPDATE user_profile SET updated_at = 'not-a-timestamp' WHERE user_id = 'u1'",
                [],
            )
            .expect("corrupt the row");

        let err = store.get_fact("u1", "city").expect_err("corrupt timestamp");
        assert!(matches!(err, MemoryError::Corrupt(_)));
    }
}
