//! File repository — CRUD operations for the `files` inventory table.

use std::collections::HashSet;

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw inventory row from the database.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: String,
    pub root_id: String,
    pub relative_path: String,
    pub file_name: String,
    pub extension: String,
    pub size_bytes: u64,
    pub created_at: String,
    pub modified_at: String,
    pub hash: Option<String>,
    pub file_exists: bool,
    pub deleted: bool,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            root_id: row.get("root_id")?,
            relative_path: row.get("relative_path")?,
            file_name: row.get("file_name")?,
            extension: row.get("extension")?,
            size_bytes: row.get("size_bytes")?,
            created_at: row.get("created_at")?,
            modified_at: row.get("modified_at")?,
            hash: row.get("hash")?,
            file_exists: row.get("file_exists")?,
            deleted: row.get("deleted")?,
        })
    }
}

/// Inserts a batch of new rows inside one transaction.
///
/// Uses `INSERT OR IGNORE` so a concurrent writer (discovery racing the
/// directory monitor) that already created the same (root, path) entry
/// wins silently. Returns the number of rows actually inserted.
pub fn insert_batch(db: &Database, rows: &[FileRow]) -> Result<usize, DatabaseError> {
    if rows.is_empty() {
        return Ok(0);
    }
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO files (id, root_id, relative_path, file_name, extension,
                 size_bytes, created_at, modified_at, hash, file_exists, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for row in rows {
                inserted += stmt.execute(params![
                    row.id,
                    row.root_id,
                    row.relative_path,
                    row.file_name,
                    row.extension,
                    row.size_bytes,
                    row.created_at,
                    row.modified_at,
                    row.hash,
                    row.file_exists,
                    row.deleted,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    })
}

/// Finds a file by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM files WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], FileRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds the live (non-deleted) entry for a (root, relative path) pair.
pub fn find_live_by_path(
    db: &Database,
    root_id: &str,
    relative_path: &str,
) -> Result<Option<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM files WHERE root_id = ?1 AND relative_path = ?2 AND deleted = 0",
        )?;
        let mut rows = stmt.query_map(params![root_id, relative_path], FileRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns the relative paths of all live entries under a root, for the
/// discovery walker's in-memory diff.
pub fn live_paths(db: &Database, root_id: &str) -> Result<HashSet<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT relative_path FROM files WHERE root_id = ?1 AND deleted = 0")?;
        let paths = stmt
            .query_map(params![root_id], |r| r.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(paths)
    })
}

/// Counts live entries across all roots.
pub fn count_live(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM files WHERE deleted = 0", [], |r| {
                r.get(0)
            })?;
        Ok(count)
    })
}

/// Entries that still need a content fingerprint.
pub fn find_missing_hash(db: &Database) -> Result<Vec<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM files
             WHERE hash IS NULL AND file_exists = 1 AND deleted = 0
             ORDER BY relative_path",
        )?;
        let rows = stmt
            .query_map([], FileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Entries with no metadata record yet.
pub fn find_missing_metadata(db: &Database) -> Result<Vec<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT f.* FROM files f
             LEFT JOIN file_metadata m ON m.file_id = f.id
             WHERE m.file_id IS NULL AND f.file_exists = 1 AND f.deleted = 0
             ORDER BY f.relative_path",
        )?;
        let rows = stmt
            .query_map([], FileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Persists computed fingerprints in one transaction.
pub fn update_hashes(db: &Database, updates: &[(String, String)]) -> Result<(), DatabaseError> {
    if updates.is_empty() {
        return Ok(());
    }
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached("UPDATE files SET hash = ?2 WHERE id = ?1")?;
            for (id, hash) in updates {
                stmt.execute(params![id, hash])?;
            }
        }
        tx.commit()?;
        Ok(())
    })
}

/// Refreshes size/modified-time and clears the fingerprint so the entry is
/// re-hashed. Used when the monitor sees a modification to a known file.
pub fn mark_modified(
    db: &Database,
    id: &str,
    size_bytes: u64,
    modified_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE files SET size_bytes = ?2, modified_at = ?3, hash = NULL, file_exists = 1
             WHERE id = ?1",
            params![id, size_bytes, modified_at],
        )?;
        Ok(())
    })
}

/// Updates path and name of an entry in place (rename handling).
pub fn rename(
    db: &Database,
    id: &str,
    relative_path: &str,
    file_name: &str,
    extension: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE files SET relative_path = ?2, file_name = ?3, extension = ?4 WHERE id = ?1",
            params![id, relative_path, file_name, extension],
        )?;
        Ok(())
    })
}

/// Soft-deletes the live entry for a (root, relative path) pair.
/// Returns true when a row was affected.
pub fn soft_delete_by_path(
    db: &Database,
    root_id: &str,
    relative_path: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files SET deleted = 1, file_exists = 0
             WHERE root_id = ?1 AND relative_path = ?2 AND deleted = 0",
            params![root_id, relative_path],
        )?;
        Ok(changed > 0)
    })
}

/// Soft-deletes a batch of paths under one root inside one transaction.
pub fn soft_delete_paths(
    db: &Database,
    root_id: &str,
    relative_paths: &[String],
) -> Result<usize, DatabaseError> {
    if relative_paths.is_empty() {
        return Ok(0);
    }
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE files SET deleted = 1, file_exists = 0
                 WHERE root_id = ?1 AND relative_path = ?2 AND deleted = 0",
            )?;
            for path in relative_paths {
                removed += stmt.execute(params![root_id, path])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    })
}

/// Soft-deletes every live entry at or under a relative path. Used for
/// directory removals, where the watcher reports only the directory.
/// Returns the number of entries affected.
pub fn soft_delete_by_prefix(
    db: &Database,
    root_id: &str,
    prefix: &str,
) -> Result<usize, DatabaseError> {
    // `%` and `_` are LIKE wildcards; escape them so "my_dir" cannot
    // match "myxdir".
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let pattern = format!("{}/%", escaped);
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE files SET deleted = 1, file_exists = 0
             WHERE root_id = ?1 AND deleted = 0
               AND (relative_path = ?2 OR relative_path LIKE ?3 ESCAPE '\\')",
            params![root_id, prefix, pattern],
        )?;
        Ok(changed)
    })
}

/// Fingerprints shared by more than one live entry.
pub fn duplicate_hashes(db: &Database) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT hash FROM files
             WHERE hash IS NOT NULL AND hash != '' AND file_exists = 1 AND deleted = 0
             GROUP BY hash HAVING COUNT(*) > 1",
        )?;
        let hashes = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(hashes)
    })
}

/// Live entries sharing the given fingerprint.
pub fn find_live_by_hash(db: &Database, hash: &str) -> Result<Vec<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM files
             WHERE hash = ?1 AND file_exists = 1 AND deleted = 0",
        )?;
        let rows = stmt
            .query_map(params![hash], FileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
