//! Durable inventory storage.
//!
//! Everything the indexer knows about files on disk lives in one SQLite
//! database: scan roots, inventory entries, extracted metadata, and
//! category assignments. The pipeline, the directory monitor, and any
//! embedding host all go through the same [`Database`] handle; SQLite
//! serializes writers anyway, so a single mutex-guarded connection keeps
//! the concurrency story simple while WAL mode keeps readers cheap.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod category_repo;
pub mod error;
pub mod file_repo;
pub mod metadata_repo;
pub mod migrations;
pub mod root_repo;

pub use error::DatabaseError;

/// Shared handle to the inventory database. Clones are cheap and point
/// at the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the inventory at `path`, creating the file, its parent
    /// directories, and any missing schema on the way.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        log::info!("Inventory database ready at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory inventory with the full schema, for tests.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// Where the inventory lives when the host doesn't say otherwise:
/// `~/.photodex/data/photodex.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".photodex").join("data").join("photodex.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{file_repo, root_repo};

    #[test]
    fn test_schema_present_after_open() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            for table in ["scan_roots", "files", "file_metadata", "file_categories"] {
                let found: u32 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |r| r.get(0),
                )?;
                assert_eq!(found, 1, "missing table {}", table);
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data").join("inventory.db");

        let db = Database::open(&path).unwrap();
        root_repo::insert_if_absent(&db, "/pics").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_clones_share_one_inventory() {
        let db = Database::open_in_memory().unwrap();
        let observer = db.clone();

        root_repo::insert_if_absent(&db, "/pics").unwrap();

        // A write through one handle is visible through the other.
        assert!(root_repo::find_by_path(&observer, "/pics").unwrap().is_some());
        assert_eq!(file_repo::count_live(&observer).unwrap(), 0);
    }

    #[test]
    fn test_default_database_path_is_under_home() {
        let path = default_database_path().unwrap();
        assert!(path.ends_with(Path::new(".photodex/data/photodex.db")));
    }
}
