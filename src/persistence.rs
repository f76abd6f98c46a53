//! # SQLite Home Backend
//!
//! Durable storage for the home location.
//!
//! The value lives in a small key/value table, encoded with MessagePack so
//! the row survives field additions to [`HomeLocation`] as long as new
//! fields have defaults.

use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::home::{HomeBackend, HomeLocation};
use crate::Result;

/// Key under which the home location is stored.
pub const HOME_LOCATION_KEY: &str = "home_location";

/// [`HomeBackend`] stored in a SQLite database file.
pub struct SqliteHomeBackend {
    db: Connection,
}

impl SqliteHomeBackend {
    /// Open (or create) the database at `db_path`.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        info!("[SqliteHomeBackend] Opened {}", db_path);
        Ok(Self { db })
    }

    /// Database that disappears with the process. Used in tests.
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Single-row settings, values are MessagePack blobs
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );
        "#,
        )?;
        Ok(())
    }
}

impl HomeBackend for SqliteHomeBackend {
    fn load(&mut self) -> Result<Option<HomeLocation>> {
        let blob: Option<Vec<u8>> = self
            .db
            .query_row(
                "SELECT value FROM kv WHERE key = ?",
                params![HOME_LOCATION_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match blob {
            Some(bytes) => {
                let home: HomeLocation = rmp_serde::from_slice(&bytes)?;
                debug!("[SqliteHomeBackend] Loaded {}", home.postcode);
                Ok(Some(home))
            }
            None => Ok(None),
        }
    }

    fn save(&mut self, home: &HomeLocation) -> Result<()> {
        let blob = rmp_serde::to_vec(home)?;
        self.db.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at)
             VALUES (?, ?, strftime('%s', 'now'))",
            params![HOME_LOCATION_KEY, blob],
        )?;
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        self.db
            .execute("DELETE FROM kv WHERE key = ?", params![HOME_LOCATION_KEY])?;
        Ok(())
    }
}

#[cfg(all(test, feature = "persistence"))]
mod tests {
    use super::*;
    use crate::HomeLocationStore;

    fn sw1() -> HomeLocation {
        HomeLocation::new("SW1A 1AA", 51.501, -0.1416)
    }

    #[test]
    fn test_empty_database() {
        let mut backend = SqliteHomeBackend::in_memory().unwrap();
        assert_eq!(backend.load().unwrap(), None);
    }

    #[test]
    fn test_save_load_remove() {
        let mut backend = SqliteHomeBackend::in_memory().unwrap();
        backend.save(&sw1()).unwrap();
        assert_eq!(backend.load().unwrap(), Some(sw1()));

        let e1 = HomeLocation::new("E1 6AN", 51.5203, -0.0726);
        backend.save(&e1).unwrap();
        assert_eq!(backend.load().unwrap(), Some(e1));

        backend.remove().unwrap();
        assert_eq!(backend.load().unwrap(), None);

        // Removing twice is fine
        backend.remove().unwrap();
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("home.db");
        let path = path.to_str().unwrap();

        {
            let store = HomeLocationStore::open(SqliteHomeBackend::new(path).unwrap()).unwrap();
            store.set(sw1()).unwrap();
        }

        let store = HomeLocationStore::open(SqliteHomeBackend::new(path).unwrap()).unwrap();
        assert_eq!(store.get(), Some(sw1()));

        store.clear().unwrap();
        drop(store);

        let store = HomeLocationStore::open(SqliteHomeBackend::new(path).unwrap()).unwrap();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_corrupt_blob_is_persistence_error() {
        let mut backend = SqliteHomeBackend::in_memory().unwrap();
        backend
            .db
            .execute(
                "INSERT INTO kv (key, value) VALUES (?, ?)",
                params![HOME_LOCATION_KEY, vec![0xc1u8, 0x00]],
            )
            .unwrap();

        assert!(matches!(
            backend.load(),
            Err(crate::SchoolMapError::Persistence { .. })
        ));
    }
}
