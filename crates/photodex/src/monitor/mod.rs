//! Live directory monitoring.
//!
//! Watches every scan root with `notify` and keeps the inventory current
//! between pipeline runs. Create/modify events are coalesced by path and
//! drained on a timer; deletions and renames act immediately. Every
//! "new vs. existing" decision is revalidated at write time, so the
//! monitor can run concurrently with a full pipeline pass.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecursiveMode, Watcher};

use crate::categorizer;
use crate::config::Config;
use crate::db::metadata_repo;
use crate::db::{file_repo, root_repo, Database};
use crate::error::{Result, WorkerError};
use crate::hasher;
use crate::metadata::{ImageProbe, MetadataExtractor};
use crate::status::StatusAggregator;
use crate::worker::discovery::{format_timestamp, new_file_row};
use crate::worker::DiscoveryWalker;

const REWATCH_DELAY: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct DirectoryMonitor {
    db: Database,
    config: Arc<Config>,
    extractor: Arc<dyn MetadataExtractor>,
    status: Option<Arc<StatusAggregator>>,
}

/// Handle to a running monitor thread.
pub struct MonitorHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signals shutdown and joins the monitor thread.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl DirectoryMonitor {
    pub fn new(db: Database, config: Arc<Config>) -> Self {
        Self::with_extractor(db, config, Arc::new(ImageProbe), None)
    }

    pub fn with_extractor(
        db: Database,
        config: Arc<Config>,
        extractor: Arc<dyn MetadataExtractor>,
        status: Option<Arc<StatusAggregator>>,
    ) -> Self {
        Self {
            db,
            config,
            extractor,
            status,
        }
    }

    /// Spawns the monitor thread.
    pub fn start(self) -> Result<MonitorHandle> {
        let filter = DiscoveryWalker::new(&self.config)?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        let thread = thread::Builder::new()
            .name("dir-monitor".to_string())
            .spawn(move || self.run(filter, thread_shutdown))
            .map_err(|e| WorkerError::WatchError(e.to_string()))?;

        Ok(MonitorHandle {
            shutdown,
            thread: Some(thread),
        })
    }

    fn run(self, filter: DiscoveryWalker, shutdown: Arc<AtomicBool>) {
        if let Some(status) = &self.status {
            status.set_monitor_active(true);
        }

        // Outer loop recreates the watcher after channel failure.
        while !shutdown.load(Ordering::Relaxed) {
            match self.watch_once(&filter, &shutdown) {
                Ok(()) => break,
                Err(e) => {
                    warn!("Watcher failed, re-watching shortly: {}", e);
                    let deadline = Instant::now() + REWATCH_DELAY;
                    while Instant::now() < deadline && !shutdown.load(Ordering::Relaxed) {
                        thread::sleep(POLL_INTERVAL);
                    }
                }
            }
        }

        if let Some(status) = &self.status {
            status.set_monitor_active(false);
        }
        info!("Directory monitor stopped");
    }

    /// Watches until shutdown (Ok) or a watcher failure (Err).
    fn watch_once(&self, filter: &DiscoveryWalker, shutdown: &AtomicBool) -> Result<()> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher =
            recommended_watcher(tx).map_err(|e| WorkerError::WatchError(e.to_string()))?;

        let mut roots: Vec<(PathBuf, String)> = Vec::new();
        for root in &self.config.scan_roots {
            let path = PathBuf::from(root);
            if !path.is_dir() {
                warn!("Scan root {} not accessible, not watching it", root);
                continue;
            }
            watcher
                .watch(&path, RecursiveMode::Recursive)
                .map_err(|e| WorkerError::WatchError(e.to_string()))?;
            let root_id = root_repo::insert_if_absent(&self.db, root)?;
            roots.push((path, root_id));
        }
        info!("Watching {} scan roots", roots.len());

        let drain_interval = Duration::from_millis(self.config.monitor_interval_ms);
        let mut pending: HashSet<PathBuf> = HashSet::new();
        let mut last_drain = Instant::now();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) => self.handle_event(filter, &roots, event, &mut pending),
                Ok(Err(e)) => {
                    return Err(WorkerError::WatchError(e.to_string()).into());
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(WorkerError::WatchError("event channel closed".into()).into());
                }
            }

            if !pending.is_empty() && last_drain.elapsed() >= drain_interval {
                self.drain_pending(filter, &roots, &mut pending);
                last_drain = Instant::now();
            }
        }
    }

    fn handle_event(
        &self,
        filter: &DiscoveryWalker,
        roots: &[(PathBuf, String)],
        event: Event,
        pending: &mut HashSet<PathBuf>,
    ) {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in event.paths {
                    if resolve(filter, roots, &path).is_some() {
                        pending.insert(path);
                    }
                }
            }
            // Deletions bypass coalescing so stale entries never linger a
            // full drain interval.
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.remove_path(filter, roots, path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [old, new] = event.paths.as_slice() {
                    self.rename_path(filter, roots, old, new, pending);
                }
            }
            EventKind::Modify(_) => {
                for path in event.paths {
                    if resolve(filter, roots, &path).is_some() {
                        pending.insert(path);
                    }
                }
            }
            _ => {}
        }
    }

    fn remove_path(&self, filter: &DiscoveryWalker, roots: &[(PathBuf, String)], path: &Path) {
        if let Some((_, root_id, rel)) = resolve(filter, roots, path) {
            match file_repo::soft_delete_by_path(&self.db, root_id, &rel) {
                Ok(true) => debug!("Soft-deleted {}", rel),
                Ok(false) => {}
                Err(e) => error!("Failed to soft-delete {}: {}", rel, e),
            }
            return;
        }

        // A removed directory arrives as a bare path with no extension;
        // the watcher never reports the files that vanished with it, so
        // drop everything stored underneath.
        if path.extension().is_some() {
            return;
        }
        let Some((root, root_id)) = owning_root(roots, path) else {
            return;
        };
        let Ok(rel) = path.strip_prefix(root) else {
            return;
        };
        let rel = rel.to_string_lossy();
        if rel.is_empty() {
            // The root itself went away; the next full scan decides.
            return;
        }
        match file_repo::soft_delete_by_prefix(&self.db, root_id, &rel) {
            Ok(0) => {}
            Ok(n) => debug!("Soft-deleted {} entries under {}", n, rel),
            Err(e) => error!("Failed to soft-delete directory {}: {}", rel, e),
        }
    }

    fn rename_path(
        &self,
        filter: &DiscoveryWalker,
        roots: &[(PathBuf, String)],
        old: &Path,
        new: &Path,
        pending: &mut HashSet<PathBuf>,
    ) {
        let new_entry = resolve(filter, roots, new);
        let old_entry = resolve(filter, roots, old);

        match (old_entry, new_entry) {
            (Some((_, root_id, old_rel)), Some((_, _, new_rel))) => {
                match file_repo::find_live_by_path(&self.db, root_id, &old_rel) {
                    Ok(Some(row)) => {
                        let name = new_rel.rsplit('/').next().unwrap_or(&new_rel).to_string();
                        let ext = name
                            .rsplit('.')
                            .next()
                            .map(|e| e.to_ascii_lowercase())
                            .unwrap_or_default();
                        if let Err(e) = file_repo::rename(&self.db, &row.id, &new_rel, &name, &ext)
                        {
                            error!("Failed to record rename of {}: {}", old_rel, e);
                        } else {
                            debug!("Renamed {} -> {}", old_rel, new_rel);
                        }
                    }
                    // Old path unknown; treat the target as a new file.
                    Ok(None) => {
                        pending.insert(new.to_path_buf());
                    }
                    Err(e) => error!("Rename lookup failed for {}: {}", old_rel, e),
                }
            }
            // Renamed out of the indexed set (extension change, excluded dir).
            (Some(_), None) => self.remove_path(filter, roots, old),
            (None, Some(_)) => {
                pending.insert(new.to_path_buf());
            }
            (None, None) => {}
        }
    }

    fn drain_pending(
        &self,
        filter: &DiscoveryWalker,
        roots: &[(PathBuf, String)],
        pending: &mut HashSet<PathBuf>,
    ) {
        debug!("Draining {} coalesced events", pending.len());
        let mut touched = false;

        for path in pending.drain() {
            let Some((root, root_id, rel)) = resolve(filter, roots, &path) else {
                continue;
            };
            match self.recheck(root, root_id, &rel) {
                Ok(changed) => touched |= changed,
                Err(e) => error!("Recheck of {} failed: {}", rel, e),
            }
        }

        if touched {
            let report = categorizer::run_all(&self.db);
            if report.total_inserted() > 0 {
                debug!("Monitor categorized {} entries", report.total_inserted());
            }
        }
    }

    /// Brings one path up to date: upsert the entry, then fill whatever is
    /// missing (hash, metadata). Files gone by drain time are soft-deleted.
    fn recheck(&self, root: &Path, root_id: &str, rel: &str) -> Result<bool> {
        let abs = root.join(rel);
        let meta = match std::fs::metadata(&abs) {
            Ok(meta) => meta,
            Err(_) => {
                file_repo::soft_delete_by_path(&self.db, root_id, rel)?;
                return Ok(true);
            }
        };

        match file_repo::find_live_by_path(&self.db, root_id, rel)? {
            Some(row) => {
                let modified_at = meta
                    .modified()
                    .map(format_timestamp)
                    .unwrap_or_else(|_| row.modified_at.clone());
                // Same size and mtime: nothing to redo.
                if row.size_bytes != meta.len() || row.modified_at != modified_at {
                    file_repo::mark_modified(&self.db, &row.id, meta.len(), &modified_at)?;
                }
            }
            None => {
                file_repo::insert_batch(&self.db, &[new_file_row(root_id, rel, &meta)])?;
            }
        }

        let Some(row) = file_repo::find_live_by_path(&self.db, root_id, rel)? else {
            return Ok(false);
        };

        if row.hash.is_none() {
            match hasher::hash_file(&abs) {
                Ok(hash) => file_repo::update_hashes(&self.db, &[(row.id.clone(), hash)])?,
                Err(e) => warn!("Hashing failed for {}: {}", abs.display(), e),
            }
        }

        if metadata_repo::find_by_file_id(&self.db, &row.id)?.is_none() {
            match self.extractor.extract(&abs) {
                Ok(extracted) => {
                    let created_at = format_timestamp(std::time::SystemTime::now());
                    let row = metadata_row_from(&row.id, &extracted, &created_at);
                    metadata_repo::insert_batch(&self.db, &[row])?;
                }
                Err(e) => warn!("Metadata extraction failed for {}: {}", abs.display(), e),
            }
        }

        Ok(true)
    }
}

fn metadata_row_from(
    file_id: &str,
    meta: &crate::metadata::ExtractedMetadata,
    created_at: &str,
) -> metadata_repo::MetadataRow {
    metadata_repo::MetadataRow {
        file_id: file_id.to_string(),
        width: meta.width,
        height: meta.height,
        date_taken: meta
            .date_taken
            .map(|d| d.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        camera_make: meta.camera_make.clone(),
        camera_model: meta.camera_model.clone(),
        lens_model: meta.lens_model.clone(),
        gps_latitude: meta.gps_latitude,
        gps_longitude: meta.gps_longitude,
        iso: meta.iso,
        exposure_time: meta.exposure_time.clone(),
        f_number: meta.f_number,
        created_at: created_at.to_string(),
    }
}

/// Finds the deepest watched root containing a path.
fn owning_root<'a>(roots: &'a [(PathBuf, String)], path: &Path) -> Option<(&'a Path, &'a str)> {
    roots
        .iter()
        .filter(|(root, _)| path.starts_with(root))
        .max_by_key(|(root, _)| root.as_os_str().len())
        .map(|(root, root_id)| (root.as_path(), root_id.as_str()))
}

/// Maps an absolute event path to its (root, root_id, relative path)
/// when it belongs to a watched root and passes the image filter.
fn resolve<'a>(
    filter: &DiscoveryWalker,
    roots: &'a [(PathBuf, String)],
    path: &Path,
) -> Option<(&'a Path, &'a str, String)> {
    let (root, root_id) = owning_root(roots, path)?;
    filter
        .relative_image_path(root, path)
        .map(|rel| (root, root_id, rel))
}
