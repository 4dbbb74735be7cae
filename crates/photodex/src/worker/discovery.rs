//! Discovery walker.
//!
//! Walks each scan root, diffs what it finds against the stored live
//! inventory, inserts new entries in batches, and soft-deletes entries
//! whose files are gone. Entry identity is (root, relative path); file
//! content is never read here.

use std::collections::HashSet;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::Config;
use crate::db::file_repo::{self, FileRow};
use crate::db::{root_repo, Database};
use crate::error::{ConfigError, Result};
use crate::pipeline::cancel::CancelToken;

/// Formats a filesystem timestamp the way inventory rows store it.
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Tally of one discovery pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryOutcome {
    /// Matching files encountered on disk.
    pub scanned: u64,
    /// New inventory entries created.
    pub added: u64,
    /// Entries soft-deleted because their files are gone.
    pub removed: u64,
    /// Unreadable directory entries, skipped.
    pub errors: u64,
    /// Configured roots that were not reachable this pass. Their stored
    /// inventory is left untouched; this is not an error.
    pub skipped_roots: u64,
    pub cancelled: bool,
}

impl DiscoveryOutcome {
    fn absorb(&mut self, other: DiscoveryOutcome) {
        self.scanned += other.scanned;
        self.added += other.added;
        self.removed += other.removed;
        self.errors += other.errors;
        self.skipped_roots += other.skipped_roots;
        self.cancelled |= other.cancelled;
    }
}

pub struct DiscoveryWalker {
    extensions: Vec<String>,
    exclude_patterns: Vec<glob::Pattern>,
    batch_size: usize,
}

impl DiscoveryWalker {
    pub fn new(config: &Config) -> Result<Self> {
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| ConfigError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            extensions: config.normalized_extensions(),
            exclude_patterns,
            batch_size: config.discovery_batch_size,
        })
    }

    /// Scans every configured root, continuing past roots that fail.
    pub fn scan_all<F>(
        &self,
        db: &Database,
        roots: &[String],
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<DiscoveryOutcome>
    where
        F: FnMut(u64),
    {
        let mut total = DiscoveryOutcome::default();

        for root in roots {
            if cancel.is_cancelled() {
                total.cancelled = true;
                break;
            }
            let base = total.scanned;
            let outcome = self.scan_root(db, Path::new(root), cancel, |n| on_progress(base + n))?;
            total.absorb(outcome);
        }

        Ok(total)
    }

    /// Scans one root: registers it, walks it, diffs against the stored
    /// inventory. The removal pass only runs for a complete walk; a
    /// cancelled walk must never mistake unvisited files for deletions.
    pub fn scan_root<F>(
        &self,
        db: &Database,
        root: &Path,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<DiscoveryOutcome>
    where
        F: FnMut(u64),
    {
        // A root that is not reachable right now must not look like a
        // directory whose files were all deleted.
        if !root.is_dir() {
            warn!("Scan root {} is not accessible, skipping", root.display());
            return Ok(DiscoveryOutcome {
                skipped_roots: 1,
                ..DiscoveryOutcome::default()
            });
        }

        let root_id = root_repo::insert_if_absent(db, &root.to_string_lossy())?;
        let known = file_repo::live_paths(db, &root_id)?;

        let mut outcome = DiscoveryOutcome::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(known.len());
        let mut batch: Vec<FileRow> = Vec::with_capacity(self.batch_size);

        for entry in WalkDir::new(root).follow_links(false) {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    outcome.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative_path) = self.relative_image_path(root, entry.path()) else {
                continue;
            };

            outcome.scanned += 1;
            if outcome.scanned % 100 == 0 {
                on_progress(outcome.scanned);
            }

            if !known.contains(&relative_path) {
                match entry.metadata() {
                    Ok(meta) => {
                        batch.push(new_file_row(&root_id, &relative_path, &meta));
                        if batch.len() >= self.batch_size {
                            outcome.added += file_repo::insert_batch(db, &batch)? as u64;
                            batch.clear();
                        }
                    }
                    Err(e) => {
                        warn!("Cannot stat {}: {}", entry.path().display(), e);
                        outcome.errors += 1;
                        continue;
                    }
                }
            }
            seen.insert(relative_path);
        }

        outcome.added += file_repo::insert_batch(db, &batch)? as u64;

        if !outcome.cancelled {
            let missing: Vec<String> = known.difference(&seen).cloned().collect();
            if !missing.is_empty() {
                debug!(
                    "{} entries under {} no longer on disk",
                    missing.len(),
                    root.display()
                );
                outcome.removed = file_repo::soft_delete_paths(db, &root_id, &missing)? as u64;
            }
        }

        on_progress(outcome.scanned);
        info!(
            "Discovery of {}: {} scanned, {} added, {} removed, {} errors{}",
            root.display(),
            outcome.scanned,
            outcome.added,
            outcome.removed,
            outcome.errors,
            if outcome.cancelled { " (cancelled)" } else { "" },
        );

        Ok(outcome)
    }

    /// Returns the root-relative path when the file is an image the
    /// configuration includes, `None` otherwise. Also used by the
    /// directory monitor to filter watch events.
    pub(crate) fn relative_image_path(&self, root: &Path, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if !self.extensions.iter().any(|e| *e == ext) {
            return None;
        }

        let relative = path.strip_prefix(root).ok()?;
        let relative = relative.to_string_lossy().into_owned();

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches(&relative))
        {
            return None;
        }

        Some(relative)
    }
}

/// Builds a fresh inventory row for a file found on disk.
pub fn new_file_row(root_id: &str, relative_path: &str, meta: &std::fs::Metadata) -> FileRow {
    let file_name = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_string();
    let extension = file_name
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let modified_at = meta
        .modified()
        .map(format_timestamp)
        .unwrap_or_else(|_| format_timestamp(SystemTime::now()));

    FileRow {
        id: Uuid::new_v4().to_string(),
        root_id: root_id.to_string(),
        relative_path: relative_path.to_string(),
        file_name,
        extension,
        size_bytes: meta.len(),
        created_at: format_timestamp(SystemTime::now()),
        modified_at,
        hash: None,
        file_exists: true,
        deleted: false,
    }
}
