//! Rule definitions for the fast categorizer.
//!
//! Each rule is one set-based SQL statement over the live inventory. The
//! shared `NOT EXISTS` guard makes earlier rules win and re-runs no-ops.

/// Filename fragments that mark screen captures, matched case-insensitively.
pub const SCREENSHOT_KEYWORDS: &[&str] = &[
    "screenshot",
    "screen shot",
    "capture",
    "snip",
    "clipboardimage",
    "grab",
    "printscreen",
    "print screen",
    "prtsc",
    "screenclip",
];

/// Common desktop display resolutions (width, height).
pub const DESKTOP_RESOLUTIONS: &[(u32, u32)] = &[
    (1920, 1080),
    (1366, 768),
    (1536, 864),
    (2560, 1440),
    (3840, 2160),
    (1440, 900),
    (1680, 1050),
    (1280, 720),
    (1280, 800),
    (1024, 768),
    (1600, 900),
    (2048, 1152),
    (2880, 1620),
    (5120, 2880),
];

/// Common phone/tablet screenshot resolutions (width, height), portrait.
pub const MOBILE_RESOLUTIONS: &[(u32, u32)] = &[
    (390, 844),
    (393, 852),
    (430, 932),
    (414, 896),
    (375, 812),
    (375, 667),
    (360, 800),
    (412, 915),
    (411, 891),
    (384, 854),
    (768, 1024),
    (834, 1194),
    (1024, 1366),
];

const NOT_ALREADY_CATEGORIZED: &str =
    "NOT EXISTS (SELECT 1 FROM file_categories c WHERE c.file_id = f.id)";

fn insert_clause(category: &str, reason: &str, confidence_expr: &str) -> String {
    format!(
        "INSERT INTO file_categories \
         (file_id, category, reason, confidence, method, description, created_at) \
         SELECT f.id, '{}', '{}', {}, 'heuristic', NULL, datetime('now') ",
        category, reason, confidence_expr
    )
}

/// Rule 1: screenshot keyword in the file name.
pub fn filename_keyword_rule() -> String {
    let likes = SCREENSHOT_KEYWORDS
        .iter()
        .map(|kw| format!("f.file_name LIKE '%{}%'", kw))
        .collect::<Vec<_>>()
        .join(" OR ");

    format!(
        "{insert} FROM files f \
         WHERE f.file_exists = 1 AND f.deleted = 0 \
           AND ({likes}) \
           AND {guard}",
        insert = insert_clause("screenshot", "filename_keyword", "0.9"),
        likes = likes,
        guard = NOT_ALREADY_CATEGORIZED,
    )
}

fn resolution_values() -> String {
    DESKTOP_RESOLUTIONS
        .iter()
        .chain(MOBILE_RESOLUTIONS.iter())
        .map(|(w, h)| format!("({}, {})", w, h))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Rule 2: exact display-resolution match in either orientation, and no
/// camera metadata to contradict it.
pub fn screen_resolution_rule() -> String {
    let values = resolution_values();
    format!(
        "{insert} FROM files f \
         JOIN file_metadata m ON m.file_id = f.id \
         WHERE f.file_exists = 1 AND f.deleted = 0 \
           AND m.width IS NOT NULL AND m.height IS NOT NULL \
           AND ((m.width, m.height) IN (VALUES {values}) \
             OR (m.height, m.width) IN (VALUES {values})) \
           AND m.camera_make IS NULL AND m.camera_model IS NULL \
           AND {guard}",
        insert = insert_clause("screenshot", "screen_resolution", "0.75"),
        values = values,
        guard = NOT_ALREADY_CATEGORIZED,
    )
}

/// Rule 3: camera make and model present. GPS coordinates boost confidence.
pub fn camera_metadata_rule() -> String {
    let confidence = "CASE WHEN m.gps_latitude IS NOT NULL \
         AND m.gps_longitude IS NOT NULL THEN 0.95 ELSE 0.9 END";
    format!(
        "{insert} FROM files f \
         JOIN file_metadata m ON m.file_id = f.id \
         WHERE f.file_exists = 1 AND f.deleted = 0 \
           AND m.camera_make IS NOT NULL AND m.camera_model IS NOT NULL \
           AND {guard}",
        insert = insert_clause("photo", "camera_metadata", confidence),
        guard = NOT_ALREADY_CATEGORIZED,
    )
}
