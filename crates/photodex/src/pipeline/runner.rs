use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, info_span, warn};

use crate::categorizer;
use crate::config::Config;
use crate::db::metadata_repo::MetadataRow;
use crate::db::{file_repo, root_repo, Database};
use crate::error::Result;
use crate::hasher;
use crate::metadata::{ExtractedMetadata, ImageProbe, MetadataExtractor};
use crate::status::{IndexPhase, PhaseProgress, RunState, RunSummary};
use crate::worker::{DiscoveryWalker, WorkerPool};

use super::cancel::CancelToken;
use super::progress::ProgressSink;

/// Drives one full indexing run: Discovery, Metadata, Categorization,
/// Hashing. Constructed once and shared; `run` is single-flight.
pub struct IndexPipeline {
    db: Database,
    config: Arc<Config>,
    extractor: Arc<dyn MetadataExtractor>,
    progress: Arc<dyn ProgressSink>,
    running: AtomicBool,
}

/// Clears the running flag on every exit path, including errors.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl IndexPipeline {
    pub fn new(db: Database, config: Arc<Config>, progress: Arc<dyn ProgressSink>) -> Self {
        Self::with_extractor(db, config, Arc::new(ImageProbe), progress)
    }

    /// Constructor with an injected metadata collaborator.
    pub fn with_extractor(
        db: Database,
        config: Arc<Config>,
        extractor: Arc<dyn MetadataExtractor>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            db,
            config,
            extractor,
            progress,
            running: AtomicBool::new(false),
        }
    }

    /// Runs the full pipeline once.
    ///
    /// Returns `Ok(None)` when a run is already in flight. A cancelled run
    /// still returns its partial summary; everything written before the
    /// cancellation point stands.
    pub fn run(&self, cancel: &CancelToken) -> Result<Option<RunSummary>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Indexing run already in progress, ignoring request");
            return Ok(None);
        }
        let _guard = RunGuard(&self.running);

        let _run_span = info_span!("index_run").entered();
        self.progress.run_started();
        let mut summary = RunSummary::default();

        match self.execute(cancel, &mut summary) {
            Ok(()) => {
                summary.state = Some(self.final_state(cancel));
                summary.finished_at = Some(Utc::now());
                info!(
                    "Indexing run finished: {} scanned, {} added, {} removed, {} hashed, {} failures",
                    summary.files_scanned,
                    summary.files_added,
                    summary.files_removed,
                    summary.hashed,
                    summary.failures,
                );
                self.progress.run_finished(&summary);
                Ok(Some(summary))
            }
            Err(e) => {
                summary.state = Some(RunState::Failed);
                summary.finished_at = Some(Utc::now());
                self.progress.run_finished(&summary);
                Err(e)
            }
        }
    }

    /// The phase sequence. A returned error marks the run failed and
    /// stops everything after the failing phase.
    fn execute(&self, cancel: &CancelToken, summary: &mut RunSummary) -> Result<()> {
        let outcome = {
            let _step = info_span!("discovery").entered();
            self.run_discovery(cancel)?
        };
        summary.files_scanned = outcome.scanned;
        summary.files_added = outcome.added;
        summary.files_removed = outcome.removed;
        summary.failures += outcome.errors;

        if file_repo::count_live(&self.db)? == 0 {
            info!("Inventory is empty, skipping remaining phases");
            return Ok(());
        }

        if !cancel.is_cancelled() {
            let _step = info_span!("metadata").entered();
            let (extracted, failed) = self.run_metadata(cancel)?;
            summary.metadata_extracted = extracted;
            summary.failures += failed;
        }

        if !cancel.is_cancelled() {
            let _step = info_span!("categorization").entered();
            self.progress
                .update(PhaseProgress::new(IndexPhase::Categorization, 0, None, 0));
            let report = categorizer::run_all(&self.db);
            summary.categorized = report.total_inserted() as u64;
            summary.failures += report.failed_rules as u64;
            self.progress.finish_phase(PhaseProgress::new(
                IndexPhase::Categorization,
                summary.categorized,
                None,
                report.failed_rules as u64,
            ));
        }

        if !cancel.is_cancelled() {
            let _step = info_span!("hashing").entered();
            let (hashed, failed) = self.run_hashing(cancel)?;
            summary.hashed = hashed;
            summary.failures += failed;
        }

        Ok(())
    }

    fn final_state(&self, cancel: &CancelToken) -> RunState {
        if cancel.is_cancelled() {
            RunState::Cancelled
        } else {
            RunState::Completed
        }
    }

    fn run_discovery(&self, cancel: &CancelToken) -> Result<crate::worker::DiscoveryOutcome> {
        let walker = DiscoveryWalker::new(&self.config)?;
        self.progress
            .update(PhaseProgress::new(IndexPhase::Discovery, 0, None, 0));

        let outcome = walker.scan_all(&self.db, &self.config.scan_roots, cancel, |scanned| {
            self.progress
                .update(PhaseProgress::new(IndexPhase::Discovery, scanned, None, 0));
        })?;

        self.progress.finish_phase(PhaseProgress::new(
            IndexPhase::Discovery,
            outcome.scanned,
            None,
            outcome.errors,
        ));
        Ok(outcome)
    }

    /// Resolves an inventory entry back to its absolute path on disk.
    fn absolute_paths(&self, rows: &[file_repo::FileRow]) -> Result<Vec<(String, PathBuf)>> {
        let roots: HashMap<String, String> = root_repo::list(&self.db)?
            .into_iter()
            .map(|r| (r.id, r.root_path))
            .collect();

        Ok(rows
            .iter()
            .filter_map(|row| {
                roots.get(&row.root_id).map(|root| {
                    (
                        row.id.clone(),
                        PathBuf::from(root).join(&row.relative_path),
                    )
                })
            })
            .collect())
    }

    fn run_metadata(&self, cancel: &CancelToken) -> Result<(u64, u64)> {
        let pending = file_repo::find_missing_metadata(&self.db)?;
        let total = pending.len() as u64;
        self.progress
            .update(PhaseProgress::new(IndexPhase::Metadata, 0, Some(total), 0));

        let jobs = self.absolute_paths(&pending)?;
        let extractor = Arc::clone(&self.extractor);
        let handler_cancel = cancel.clone();
        let pool: WorkerPool<(String, PathBuf), MetadataJobResult> = WorkerPool::new(
            self.config.worker_count,
            self.config.worker_count * 2,
            move |(file_id, path): (String, PathBuf)| {
                if handler_cancel.is_cancelled() {
                    return MetadataJobResult::Skipped;
                }
                match extractor.extract(&path) {
                    Ok(meta) => MetadataJobResult::Extracted(file_id, Box::new(meta)),
                    Err(e) => {
                        warn!("Metadata extraction failed for {}: {}", path.display(), e);
                        MetadataJobResult::Failed
                    }
                }
            },
        );

        let mut extracted = 0u64;
        let mut failed = 0u64;
        let chunk_size = pool.queue_capacity();

        for chunk in jobs.chunks(chunk_size) {
            if cancel.is_cancelled() {
                break;
            }
            let results = pool.process_batch(chunk.to_vec())?;

            let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
            let mut rows = Vec::with_capacity(results.len());
            for result in results {
                match result {
                    MetadataJobResult::Extracted(file_id, meta) => {
                        rows.push(to_metadata_row(&file_id, &meta, &now));
                    }
                    MetadataJobResult::Failed => failed += 1,
                    MetadataJobResult::Skipped => {}
                }
            }
            extracted += crate::db::metadata_repo::insert_batch(&self.db, &rows)? as u64;

            let current = chunk.last().map(|(_, path)| path.display().to_string());
            self.progress.update(
                PhaseProgress::new(IndexPhase::Metadata, extracted + failed, Some(total), failed)
                    .with_item(current),
            );
        }

        pool.wait();
        self.progress.finish_phase(PhaseProgress::new(
            IndexPhase::Metadata,
            extracted + failed,
            Some(total),
            failed,
        ));
        Ok((extracted, failed))
    }

    fn run_hashing(&self, cancel: &CancelToken) -> Result<(u64, u64)> {
        let pending = file_repo::find_missing_hash(&self.db)?;
        let total = pending.len() as u64;
        self.progress
            .update(PhaseProgress::new(IndexPhase::Hashing, 0, Some(total), 0));

        let jobs = self.absolute_paths(&pending)?;
        let handler_cancel = cancel.clone();
        let pool: WorkerPool<(String, PathBuf), (String, Option<String>)> = WorkerPool::new(
            self.config.worker_count,
            self.config.worker_count * 2,
            move |(file_id, path): (String, PathBuf)| {
                if handler_cancel.is_cancelled() {
                    return (file_id, None);
                }
                match hasher::hash_file(&path) {
                    Ok(hash) => (file_id, Some(hash)),
                    Err(e) => {
                        warn!("Hashing failed for {}: {}", path.display(), e);
                        (file_id, None)
                    }
                }
            },
        );

        let mut hashed = 0u64;
        let mut failed = 0u64;

        // Persist in hash_batch_size chunks so a long phase makes steady,
        // durable progress.
        for chunk in jobs.chunks(self.config.hash_batch_size) {
            if cancel.is_cancelled() {
                break;
            }
            let results = pool.process_batch(chunk.to_vec())?;

            let updates: Vec<(String, String)> = results
                .into_iter()
                .filter_map(|(id, hash)| hash.map(|h| (id, h)))
                .collect();
            if !cancel.is_cancelled() {
                failed += (chunk.len() - updates.len()) as u64;
            }
            hashed += updates.len() as u64;
            file_repo::update_hashes(&self.db, &updates)?;

            let current = chunk.last().map(|(_, path)| path.display().to_string());
            self.progress.update(
                PhaseProgress::new(IndexPhase::Hashing, hashed + failed, Some(total), failed)
                    .with_item(current),
            );
        }

        pool.wait();
        self.progress.finish_phase(PhaseProgress::new(
            IndexPhase::Hashing,
            hashed + failed,
            Some(total),
            failed,
        ));
        Ok((hashed, failed))
    }
}

enum MetadataJobResult {
    Extracted(String, Box<ExtractedMetadata>),
    Failed,
    Skipped,
}

fn to_metadata_row(file_id: &str, meta: &ExtractedMetadata, created_at: &str) -> MetadataRow {
    MetadataRow {
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
