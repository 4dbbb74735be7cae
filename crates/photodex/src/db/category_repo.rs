//! Category repository — zero-or-one classification per inventory entry.
//!
//! Rows are only written when a heuristic positively matches; an entry
//! with no row is implicitly "unknown". The categorizer's bulk rules run
//! through [`execute_rule_sql`] so stickiness is enforced in SQL.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct CategoryRow {
    pub file_id: String,
    pub category: String,
    pub reason: String,
    pub confidence: f64,
    pub method: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl CategoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            file_id: row.get("file_id")?,
            category: row.get("category")?,
            reason: row.get("reason")?,
            confidence: row.get("confidence")?,
            method: row.get("method")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Executes one set-based rule statement and returns the number of
/// category rows it inserted. The statement is expected to carry its own
/// `NOT EXISTS` guard so already-categorized entries are never touched.
pub fn execute_rule_sql(db: &Database, sql: &str) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(sql, [])?;
        Ok(inserted)
    })
}

/// Finds the category for a file, if one was assigned.
pub fn find_by_file_id(db: &Database, file_id: &str) -> Result<Option<CategoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM file_categories WHERE file_id = ?1")?;
        let mut rows = stmt.query_map(params![file_id], CategoryRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Counts assigned categories, optionally restricted to one category value.
pub fn count(db: &Database, category: Option<&str>) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = match category {
            Some(cat) => conn.query_row(
                "SELECT COUNT(*) FROM file_categories WHERE category = ?1",
                params![cat],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM file_categories", [], |r| r.get(0))?,
        };
        Ok(count)
    })
}
