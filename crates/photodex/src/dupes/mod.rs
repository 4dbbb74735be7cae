//! Duplicate grouping.
//!
//! Groups are derived on demand from stored content hashes rather than
//! persisted. Within a group, entries are ordered by an originality
//! policy over their file names, then by insertion time, so the first
//! entry is the presumed original.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::file_repo::{self, FileRow};
use crate::db::Database;
use crate::error::Result;

/// Name-based originality class of a file within a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameClass {
    /// No copy markers in the name.
    Clean,
    /// Stem ends in a parenthesized number, e.g. `IMG_0001(1).jpg`.
    NumberedCopy,
    /// Name contains the word "copy" in any casing.
    CopyNamed,
}

fn numbered_copy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\d+\)\s*$").unwrap())
}

fn copy_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "copy" at the start or after a separator; `_` is a word character,
    // so a plain \b would miss names like IMG_0001_copy.
    RE.get_or_init(|| Regex::new(r"(?i)(^|[\s_\-(])copy\b").unwrap())
}

/// Classifies a file name by its copy markers.
pub fn classify_name(file_name: &str) -> NameClass {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => file_name,
    };

    if copy_word_re().is_match(stem) {
        NameClass::CopyNamed
    } else if numbered_copy_re().is_match(stem) {
        NameClass::NumberedCopy
    } else {
        NameClass::Clean
    }
}

/// Ranking of name classes: lower rank sorts first within a group.
pub struct OriginalityPolicy {
    order: Vec<NameClass>,
}

impl OriginalityPolicy {
    pub fn new(prefer: &[NameClass]) -> Self {
        Self {
            order: prefer.to_vec(),
        }
    }

    fn rank(&self, class: NameClass) -> usize {
        self.order
            .iter()
            .position(|c| *c == class)
            .unwrap_or(self.order.len())
    }
}

impl Default for OriginalityPolicy {
    fn default() -> Self {
        Self::new(&[NameClass::Clean, NameClass::NumberedCopy, NameClass::CopyNamed])
    }
}

/// A set of files sharing one content hash.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub hash: String,
    /// Ordered with the presumed original first.
    pub entries: Vec<FileRow>,
    pub total_size: u64,
    /// Bytes reclaimable by keeping only the first entry.
    pub potential_savings: u64,
}

/// Derives duplicate groups from the live inventory.
///
/// Returns groups sorted by potential savings, largest first.
pub fn find_duplicates(db: &Database, policy: &OriginalityPolicy) -> Result<Vec<DuplicateGroup>> {
    let hashes = file_repo::duplicate_hashes(db)?;
    let mut groups = Vec::with_capacity(hashes.len());

    for hash in hashes {
        let mut entries = file_repo::find_live_by_hash(db, &hash)?;
        if entries.len() < 2 {
            // A member was deleted between the two queries.
            continue;
        }

        entries.sort_by(|a, b| {
            let rank_a = policy.rank(classify_name(&a.file_name));
            let rank_b = policy.rank(classify_name(&b.file_name));
            rank_a
                .cmp(&rank_b)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        let total_size: u64 = entries.iter().map(|e| e.size_bytes).sum();
        let potential_savings = total_size - entries[0].size_bytes;

        groups.push(DuplicateGroup {
            hash,
            entries,
            total_size,
            potential_savings,
        });
    }

    groups.sort_by(|a, b| b.potential_savings.cmp(&a.potential_savings));

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{file_repo, root_repo};

    #[test]
    fn test_classify_clean_name() {
        assert_eq!(classify_name("IMG_0001.jpg"), NameClass::Clean);
        assert_eq!(classify_name("vacation-2024.png"), NameClass::Clean);
    }

    #[test]
    fn test_classify_numbered_copy() {
        assert_eq!(classify_name("IMG_0001(1).jpg"), NameClass::NumberedCopy);
        assert_eq!(classify_name("photo(12).png"), NameClass::NumberedCopy);
    }

    #[test]
    fn test_classify_copy_named() {
        assert_eq!(classify_name("IMG_0001 copy.jpg"), NameClass::CopyNamed);
        assert_eq!(classify_name("Copy of photo.png"), NameClass::CopyNamed);
        assert_eq!(classify_name("photo COPY(2).jpg"), NameClass::CopyNamed);
    }

    #[test]
    fn test_classify_separator_copy_variants() {
        assert_eq!(classify_name("IMG_0001_copy.jpg"), NameClass::CopyNamed);
        assert_eq!(classify_name("IMG_0001 - copy.jpg"), NameClass::CopyNamed);
        assert_eq!(classify_name("photo-copy.jpg"), NameClass::CopyNamed);
        assert_eq!(classify_name("photo(copy).jpg"), NameClass::CopyNamed);
        // Embedded in a word is not a marker.
        assert_eq!(classify_name("photocopy.jpg"), NameClass::Clean);
    }

    #[test]
    fn test_parenthesized_number_inside_name_is_clean() {
        // Only a trailing "(n)" marks a numbered copy.
        assert_eq!(classify_name("party(2)photos.jpg"), NameClass::Clean);
    }

    #[test]
    fn test_copyright_is_not_a_copy_marker() {
        assert_eq!(classify_name("copyright-notice.png"), NameClass::Clean);
    }

    fn seed_file(db: &Database, root_id: &str, name: &str, size: u64, hash: &str) {
        let id = format!("id-{}", name);
        let row = FileRow {
            id: id.clone(),
            root_id: root_id.to_string(),
            relative_path: name.to_string(),
            file_name: name.to_string(),
            extension: "jpg".to_string(),
            size_bytes: size,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            modified_at: "2026-01-01T00:00:00Z".to_string(),
            hash: None,
            file_exists: true,
            deleted: false,
        };
        assert_eq!(file_repo::insert_batch(db, &[row]).unwrap(), 1);
        file_repo::update_hashes(db, &[(id, hash.to_string())]).unwrap();
    }

    #[test]
    fn test_find_duplicates_orders_original_first() {
        let db = Database::open_in_memory().unwrap();
        let root_id = root_repo::insert_if_absent(&db, "/pics").unwrap();

        seed_file(&db, &root_id, "IMG_0001 copy.jpg", 100, "aaa");
        seed_file(&db, &root_id, "IMG_0001(1).jpg", 100, "aaa");
        seed_file(&db, &root_id, "IMG_0001.jpg", 100, "aaa");

        let groups = find_duplicates(&db, &OriginalityPolicy::default()).unwrap();
        assert_eq!(groups.len(), 1);

        let group = &groups[0];
        assert_eq!(group.entries[0].file_name, "IMG_0001.jpg");
        assert_eq!(group.entries[1].file_name, "IMG_0001(1).jpg");
        assert_eq!(group.entries[2].file_name, "IMG_0001 copy.jpg");
        assert_eq!(group.total_size, 300);
        assert_eq!(group.potential_savings, 200);
    }

    #[test]
    fn test_unique_hashes_form_no_group() {
        let db = Database::open_in_memory().unwrap();
        let root_id = root_repo::insert_if_absent(&db, "/pics").unwrap();

        seed_file(&db, &root_id, "a.jpg", 100, "aaa");
        seed_file(&db, &root_id, "b.jpg", 100, "bbb");

        let groups = find_duplicates(&db, &OriginalityPolicy::default()).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_deleted_entries_leave_their_groups() {
        let db = Database::open_in_memory().unwrap();
        let root_id = root_repo::insert_if_absent(&db, "/pics").unwrap();

        seed_file(&db, &root_id, "a.jpg", 100, "aaa");
        seed_file(&db, &root_id, "a(1).jpg", 100, "aaa");
        file_repo::soft_delete_by_path(&db, &root_id, "a(1).jpg").unwrap();

        let groups = find_duplicates(&db, &OriginalityPolicy::default()).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_groups_sorted_by_savings() {
        let db = Database::open_in_memory().unwrap();
        let root_id = root_repo::insert_if_absent(&db, "/pics").unwrap();

        seed_file(&db, &root_id, "small.jpg", 10, "aaa");
        seed_file(&db, &root_id, "small(1).jpg", 10, "aaa");
        seed_file(&db, &root_id, "big.jpg", 5000, "bbb");
        seed_file(&db, &root_id, "big(1).jpg", 5000, "bbb");

        let groups = find_duplicates(&db, &OriginalityPolicy::default()).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].hash, "bbb");
        assert_eq!(groups[1].hash, "aaa");
    }

    #[test]
    fn test_custom_policy_reverses_ordering() {
        let db = Database::open_in_memory().unwrap();
        let root_id = root_repo::insert_if_absent(&db, "/pics").unwrap();

        seed_file(&db, &root_id, "IMG_0001.jpg", 100, "aaa");
        seed_file(&db, &root_id, "IMG_0001 copy.jpg", 100, "aaa");

        let policy = OriginalityPolicy::new(&[
            NameClass::CopyNamed,
            NameClass::NumberedCopy,
            NameClass::Clean,
        ]);
        let groups = find_duplicates(&db, &policy).unwrap();
        assert_eq!(groups[0].entries[0].file_name, "IMG_0001 copy.jpg");
    }
}
