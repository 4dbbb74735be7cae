//! Scan root repository.
//!
//! Roots are created from configuration and read-only to the pipeline;
//! removing one cascades to its file entries at the SQL level.

use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct RootRow {
    pub id: String,
    pub root_path: String,
    pub created_at: String,
}

impl RootRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            root_path: row.get("root_path")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Registers a root path if it is not known yet and returns its id.
pub fn insert_if_absent(db: &Database, root_path: &str) -> Result<String, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO scan_roots (id, root_path, created_at) VALUES (?1, ?2, ?3)",
            params![
                Uuid::new_v4().to_string(),
                root_path,
                Utc::now().to_rfc3339()
            ],
        )?;
        let id: String = conn.query_row(
            "SELECT id FROM scan_roots WHERE root_path = ?1",
            params![root_path],
            |r| r.get(0),
        )?;
        Ok(id)
    })
}

/// Finds a root by its configured path.
pub fn find_by_path(db: &Database, root_path: &str) -> Result<Option<RootRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM scan_roots WHERE root_path = ?1")?;
        let mut rows = stmt.query_map(params![root_path], RootRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all registered roots.
pub fn list(db: &Database) -> Result<Vec<RootRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM scan_roots ORDER BY root_path")?;
        let rows = stmt
            .query_map([], RootRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let id1 = insert_if_absent(&db, "/pics").unwrap();
        let id2 = insert_if_absent(&db, "/pics").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(list(&db).unwrap().len(), 1);
    }

    #[test]
    fn test_find_by_path() {
        let db = Database::open_in_memory().unwrap();
        insert_if_absent(&db, "/pics").unwrap();

        assert!(find_by_path(&db, "/pics").unwrap().is_some());
        assert!(find_by_path(&db, "/other").unwrap().is_none());
    }

    #[test]
    fn test_list_is_sorted() {
        let db = Database::open_in_memory().unwrap();
        insert_if_absent(&db, "/z").unwrap();
        insert_if_absent(&db, "/a").unwrap();

        let roots = list(&db).unwrap();
        assert_eq!(roots[0].root_path, "/a");
        assert_eq!(roots[1].root_path, "/z");
    }
}
