//! Fast metadata-driven categorization.
//!
//! A fixed, ordered list of heuristic rules runs as bulk SQL over the
//! live inventory. The first rule to claim an entry wins; re-running the
//! categorizer never reclassifies anything, so results are stable across
//! incremental runs.

pub mod rules;

use crate::db::{category_repo, Database};

/// Per-rule insert counts from one categorizer pass.
#[derive(Debug, Clone, Default)]
pub struct CategorizerReport {
    pub rule_counts: Vec<(&'static str, usize)>,
    pub failed_rules: usize,
}

impl CategorizerReport {
    pub fn total_inserted(&self) -> usize {
        self.rule_counts.iter().map(|(_, n)| n).sum()
    }
}

/// Runs every rule in order against the current inventory.
///
/// A rule that fails is logged and skipped; later rules still run so one
/// bad statement cannot stall the whole phase.
pub fn run_all(db: &Database) -> CategorizerReport {
    let rule_set: [(&'static str, String); 3] = [
        ("filename_keyword", rules::filename_keyword_rule()),
        ("screen_resolution", rules::screen_resolution_rule()),
        ("camera_metadata", rules::camera_metadata_rule()),
    ];

    let mut report = CategorizerReport::default();
    for (name, sql) in rule_set {
        match category_repo::execute_rule_sql(db, &sql) {
            Ok(inserted) => {
                if inserted > 0 {
                    log::debug!("Categorizer rule '{}' classified {} entries", name, inserted);
                }
                report.rule_counts.push((name, inserted));
            }
            Err(e) => {
                log::error!("Categorizer rule '{}' failed: {}", name, e);
                report.failed_rules += 1;
                report.rule_counts.push((name, 0));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::metadata_repo::{self, MetadataRow};
    use crate::db::{category_repo, file_repo, root_repo};

    fn seed_file(db: &Database, rid: &str, id: &str, name: &str) {
        file_repo::insert_batch(
            db,
            &[file_repo::FileRow {
                id: id.to_string(),
                root_id: rid.to_string(),
                relative_path: name.to_string(),
                file_name: name.to_string(),
                extension: name.rsplit('.').next().unwrap_or("").to_string(),
                size_bytes: 10,
                created_at: "2026-01-01T00:00:00Z".to_string(),
                modified_at: "2026-01-01T00:00:00Z".to_string(),
                hash: None,
                file_exists: true,
                deleted: false,
            }],
        )
        .unwrap();
    }

    fn seed_metadata(db: &Database, row: MetadataRow) {
        metadata_repo::insert_batch(db, &[row]).unwrap();
    }

    fn meta(file_id: &str) -> MetadataRow {
        MetadataRow {
            file_id: file_id.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_keyword_rule_matches_filename() {
        let db = Database::open_in_memory().unwrap();
        let rid = root_repo::insert_if_absent(&db, "/pics").unwrap();
        seed_file(&db, &rid, "f1", "Screenshot 2026-01-05.png");
        seed_file(&db, &rid, "f2", "beach.jpg");

        let report = run_all(&db);
        assert_eq!(report.total_inserted(), 1);
        assert_eq!(report.failed_rules, 0);

        let cat = category_repo::find_by_file_id(&db, "f1").unwrap().unwrap();
        assert_eq!(cat.category, "screenshot");
        assert_eq!(cat.reason, "filename_keyword");
        assert!((cat.confidence - 0.9).abs() < f64::EPSILON);
        assert!(category_repo::find_by_file_id(&db, "f2").unwrap().is_none());
    }

    #[test]
    fn test_resolution_rule_matches_both_orientations() {
        let db = Database::open_in_memory().unwrap();
        let rid = root_repo::insert_if_absent(&db, "/pics").unwrap();
        seed_file(&db, &rid, "f1", "a.png");
        seed_file(&db, &rid, "f2", "b.png");

        let mut landscape = meta("f1");
        landscape.width = Some(1920);
        landscape.height = Some(1080);
        seed_metadata(&db, landscape);

        // Portrait phone screenshot stored rotated.
        let mut rotated = meta("f2");
        rotated.width = Some(844);
        rotated.height = Some(390);
        seed_metadata(&db, rotated);

        run_all(&db);

        for id in ["f1", "f2"] {
            let cat = category_repo::find_by_file_id(&db, id).unwrap().unwrap();
            assert_eq!(cat.reason, "screen_resolution");
            assert!((cat.confidence - 0.75).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_camera_metadata_overrides_resolution_match() {
        let db = Database::open_in_memory().unwrap();
        let rid = root_repo::insert_if_absent(&db, "/pics").unwrap();
        seed_file(&db, &rid, "f1", "a.jpg");

        // Screen-sized dimensions, but real camera metadata present.
        let mut row = meta("f1");
        row.width = Some(1920);
        row.height = Some(1080);
        row.camera_make = Some("Canon".to_string());
        row.camera_model = Some("EOS R5".to_string());
        seed_metadata(&db, row);

        run_all(&db);

        let cat = category_repo::find_by_file_id(&db, "f1").unwrap().unwrap();
        assert_eq!(cat.category, "photo");
        assert_eq!(cat.reason, "camera_metadata");
        assert!((cat.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gps_boosts_photo_confidence() {
        let db = Database::open_in_memory().unwrap();
        let rid = root_repo::insert_if_absent(&db, "/pics").unwrap();
        seed_file(&db, &rid, "f1", "a.jpg");

        let mut row = meta("f1");
        row.camera_make = Some("Apple".to_string());
        row.camera_model = Some("iPhone 15".to_string());
        row.gps_latitude = Some(47.37);
        row.gps_longitude = Some(8.54);
        seed_metadata(&db, row);

        run_all(&db);

        let cat = category_repo::find_by_file_id(&db, "f1").unwrap().unwrap();
        assert!((cat.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_keyword_beats_camera_metadata() {
        let db = Database::open_in_memory().unwrap();
        let rid = root_repo::insert_if_absent(&db, "/pics").unwrap();
        seed_file(&db, &rid, "f1", "screenshot_edited.jpg");

        let mut row = meta("f1");
        row.camera_make = Some("Apple".to_string());
        row.camera_model = Some("iPhone 15".to_string());
        seed_metadata(&db, row);

        run_all(&db);

        let cat = category_repo::find_by_file_id(&db, "f1").unwrap().unwrap();
        assert_eq!(cat.category, "screenshot");
        assert_eq!(cat.reason, "filename_keyword");
    }

    #[test]
    fn test_rerun_is_a_noop() {
        let db = Database::open_in_memory().unwrap();
        let rid = root_repo::insert_if_absent(&db, "/pics").unwrap();
        seed_file(&db, &rid, "f1", "screenshot.png");

        assert_eq!(run_all(&db).total_inserted(), 1);
        assert_eq!(run_all(&db).total_inserted(), 0);
    }

    #[test]
    fn test_entries_without_metadata_stay_unclassified() {
        let db = Database::open_in_memory().unwrap();
        let rid = root_repo::insert_if_absent(&db, "/pics").unwrap();
        seed_file(&db, &rid, "f1", "holiday.jpg");

        let report = run_all(&db);
        assert_eq!(report.total_inserted(), 0);
        assert!(category_repo::find_by_file_id(&db, "f1").unwrap().is_none());
    }
}
