//! Client-side persistent storage, the local-storage analog for a headless
//! simulator. A single KV table holds the handful of fixed keys the demo
//! needs across runs.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub const KEY_ATTRIBUTION: &str = "marketing_attribution";
pub const KEY_LAST_PATIENT_ID: &str = "last_patient_id";
pub const KEY_PROFILE_PANEL_OPEN: &str = "profile_panel_open";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let mut s = Store::open_in_memory().expect("in-memory store");
        s.init().expect("init");
        s
    }

    #[test]
    fn test_get_missing_key_is_none() {
        let s = store();
        assert!(s.get(KEY_ATTRIBUTION).unwrap().is_none());
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let mut s = store();
        s.set(KEY_LAST_PATIENT_ID, "patient-007").unwrap();
        assert_eq!(
            s.get(KEY_LAST_PATIENT_ID).unwrap().as_deref(),
            Some("patient-007")
        );
    }

    #[test]
    fn test_set_overwrites_prior_value() {
        let mut s = store();
        s.set(KEY_PROFILE_PANEL_OPEN, "true").unwrap();
        s.set(KEY_PROFILE_PANEL_OPEN, "false").unwrap();
        assert_eq!(
            s.get(KEY_PROFILE_PANEL_OPEN).unwrap().as_deref(),
            Some("false")
        );
    }

    #[test]
    fn test_delete_removes_key() {
        let mut s = store();
        s.set(KEY_LAST_PATIENT_ID, "patient-007").unwrap();
        s.delete(KEY_LAST_PATIENT_ID).unwrap();
        assert!(s.get(KEY_LAST_PATIENT_ID).unwrap().is_none());
    }

    #[test]
    fn test_init_is_idempotent() {
        let mut s = store();
        s.set(KEY_ATTRIBUTION, "{}").unwrap();
        s.init().unwrap();
        assert_eq!(s.get(KEY_ATTRIBUTION).unwrap().as_deref(), Some("{}"));
    }
}
