//! Metadata repository — one optional record per inventory entry.
//!
//! Absence of a row means "not yet processed", not "known empty".

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, Default)]
pub struct MetadataRow {
    pub file_id: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub date_taken: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub iso: Option<u32>,
    pub exposure_time: Option<String>,
    pub f_number: Option<f64>,
    pub created_at: String,
}

impl MetadataRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            file_id: row.get("file_id")?,
            width: row.get("width")?,
            height: row.get("height")?,
            date_taken: row.get("date_taken")?,
            camera_make: row.get("camera_make")?,
            camera_model: row.get("camera_model")?,
            lens_model: row.get("lens_model")?,
            gps_latitude: row.get("gps_latitude")?,
            gps_longitude: row.get("gps_longitude")?,
            iso: row.get("iso")?,
            exposure_time: row.get("exposure_time")?,
            f_number: row.get("f_number")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a batch of metadata records in one transaction.
///
/// `INSERT OR IGNORE` keeps the at-most-one-record invariant when two
/// writers extract the same file concurrently.
pub fn insert_batch(db: &Database, rows: &[MetadataRow]) -> Result<usize, DatabaseError> {
    if rows.is_empty() {
        return Ok(0);
    }
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO file_metadata (file_id, width, height, date_taken,
                 camera_make, camera_model, lens_model, gps_latitude, gps_longitude,
                 iso, exposure_time, f_number, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for row in rows {
                inserted += stmt.execute(params![
                    row.file_id,
                    row.width,
                    row.height,
                    row.date_taken,
                    row.camera_make,
                    row.camera_model,
                    row.lens_model,
                    row.gps_latitude,
                    row.gps_longitude,
                    row.iso,
                    row.exposure_time,
                    row.f_number,
                    row.created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    })
}

/// Finds the metadata record for a file, if extracted.
pub fn find_by_file_id(db: &Database, file_id: &str) -> Result<Option<MetadataRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM file_metadata WHERE file_id = ?1")?;
        let mut rows = stmt.query_map(params![file_id], MetadataRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
