use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use common::{stable_id, TrackRecord};
use metadata::TagReader;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::events::{NullListener, ScanEvent, ScanListener, ScanPhase};
use crate::filler::TrackFiller;
use crate::fs::{file_extension, FileSystem};
use crate::mime::is_supported_audio;
use crate::store::TrackRepository;
use crate::LibraryError;

pub const DEFAULT_SCAN_WORKERS: usize = 4;

/// Cooperative cancellation shared between a scan and whoever started it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Libraries with a scan in flight.
#[derive(Debug, Clone, Default)]
pub struct ScanLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl ScanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, library_id: &str) -> Result<ScanGuard, LibraryError> {
        let mut active = self.active.lock();
        if !active.insert(library_id.to_string()) {
            return Err(LibraryError::ConcurrentScanRejected(library_id.to_string()));
        }
        Ok(ScanGuard {
            active: Arc::clone(&self.active),
            library_id: library_id.to_string(),
        })
    }

    pub fn is_running(&self, library_id: &str) -> bool {
        self.active.lock().contains(library_id)
    }
}

/// Releases the library's scan slot on drop.
#[derive(Debug)]
pub struct ScanGuard {
    active: Arc<Mutex<HashSet<String>>>,
    library_id: String,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.library_id);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub library_id: String,
    pub discovered: usize,
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Attempted files whose record ended up flagged as failed.
    pub failed: usize,
    /// New or changed files left unprocessed because the scan was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

struct ScanPlan {
    pending: Vec<TrackRecord>,
    new: usize,
    changed: usize,
    unchanged: usize,
    deleted: Vec<String>,
}

/// Identity of a library: the sorted set of its music folders.
pub fn library_id(folders: &[PathBuf]) -> String {
    let mut names: Vec<String> = folders
        .iter()
        .map(|folder| folder.to_string_lossy().to_string())
        .collect();
    names.sort();
    names.dedup();
    stable_id(&names.join("\n"))
}

pub struct Scanner {
    folders: Vec<PathBuf>,
    library_id: String,
    store: Arc<dyn TrackRepository>,
    fs: Arc<dyn FileSystem>,
    filler: TrackFiller,
    locks: ScanLocks,
    workers: usize,
    listener: Arc<dyn ScanListener>,
    phase: Mutex<ScanPhase>,
}

impl Scanner {
    pub fn new(
        folders: Vec<PathBuf>,
        store: Arc<dyn TrackRepository>,
        tags: Arc<dyn TagReader>,
        fs: Arc<dyn FileSystem>,
        locks: ScanLocks,
    ) -> Self {
        Self {
            library_id: library_id(&folders),
            folders,
            store,
            filler: TrackFiller::new(tags, Arc::clone(&fs)),
            fs,
            locks,
            workers: DEFAULT_SCAN_WORKERS,
            listener: Arc::new(NullListener),
            phase: Mutex::new(ScanPhase::Idle),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ScanListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn library_id(&self) -> &str {
        &self.library_id
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    pub fn phase(&self) -> ScanPhase {
        *self.phase.lock()
    }

    /// Runs one reconciliation pass. Rejected immediately when another scan
    /// of the same library is in flight.
    pub fn scan(&self, cancel: &CancelFlag) -> Result<ScanReport, LibraryError> {
        let _guard = self.locks.try_acquire(&self.library_id)?;
        let started = Instant::now();

        match self.run(cancel) {
            Ok(mut report) => {
                report.elapsed_ms = started.elapsed().as_millis() as u64;
                self.set_phase(ScanPhase::Idle);
                info!(
                    "Scan finished: {} new, {} changed, {} deleted, {} failed, {} unchanged in {} ms{}",
                    report.new,
                    report.changed,
                    report.deleted,
                    report.failed,
                    report.unchanged,
                    report.elapsed_ms,
                    if report.cancelled { " (cancelled)" } else { "" }
                );
                self.listener.on_event(&ScanEvent::Finished(report.clone()));
                Ok(report)
            }
            Err(err) => {
                warn!("Scan failed: {}", err);
                self.set_phase(ScanPhase::Failed);
                self.listener.on_event(&ScanEvent::Failed {
                    library_id: self.library_id.clone(),
                    reason: err.to_string(),
                });
                self.set_phase(ScanPhase::Idle);
                Err(err)
            }
        }
    }

    fn run(&self, cancel: &CancelFlag) -> Result<ScanReport, LibraryError> {
        self.set_phase(ScanPhase::Discovering);
        let discovered = self.discover()?;
        info!("Discovered {} audio files", discovered.len());

        self.set_phase(ScanPhase::Diffing);
        let plan = self.diff(&discovered)?;

        self.set_phase(ScanPhase::Filling);
        let filled = self.fill(&plan.pending, cancel);
        let failed = filled.iter().filter(|track| !track.indexing_success).count();

        self.set_phase(ScanPhase::Committing);
        self.store.commit_scan(&filled, &plan.deleted)?;

        Ok(ScanReport {
            library_id: self.library_id.clone(),
            discovered: discovered.len(),
            new: plan.new,
            changed: plan.changed,
            unchanged: plan.unchanged,
            deleted: plan.deleted.len(),
            failed,
            skipped: plan.pending.len() - filled.len(),
            cancelled: cancel.is_cancelled(),
            elapsed_ms: 0,
        })
    }

    fn discover(&self) -> Result<Vec<String>, LibraryError> {
        let mut found = BTreeSet::new();
        for folder in &self.folders {
            fs::read_dir(folder).map_err(|source| LibraryError::FolderAccess {
                path: folder.clone(),
                source,
            })?;
            for entry in WalkDir::new(folder).follow_links(true) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("Skipping unreadable entry under {:?}: {}", folder, err);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                if is_supported_audio(&file_extension(entry.path())) {
                    found.insert(entry.path().to_string_lossy().to_string());
                }
            }
        }
        Ok(found.into_iter().collect())
    }

    fn diff(&self, discovered: &[String]) -> Result<ScanPlan, LibraryError> {
        let mut existing: HashMap<String, TrackRecord> = self
            .store
            .get_all_tracks()?
            .into_iter()
            .map(|track| (track.path.clone(), track))
            .collect();

        let mut plan = ScanPlan {
            pending: Vec::new(),
            new: 0,
            changed: 0,
            unchanged: 0,
            deleted: Vec::new(),
        };

        for path in discovered {
            match existing.remove(path) {
                None => {
                    plan.new += 1;
                    plan.pending.push(TrackRecord::new(path.as_str()));
                }
                Some(track) => {
                    if self.is_changed(&track) {
                        plan.changed += 1;
                        plan.pending.push(track);
                    } else {
                        plan.unchanged += 1;
                    }
                }
            }
        }

        for path in existing.into_keys() {
            if self.is_gone(&path) {
                plan.deleted.push(path);
            } else {
                plan.unchanged += 1;
            }
        }
        plan.deleted.sort();
        Ok(plan)
    }

    /// A stored track missing from discovery is only deleted when it lies
    /// outside the library or the filesystem confirms it no longer exists.
    /// Anything the walk could not reach is kept as is.
    fn is_gone(&self, path: &str) -> bool {
        let path = Path::new(path);
        if !self.folders.iter().any(|folder| path.starts_with(folder)) {
            return true;
        }
        match self.fs.exists(path) {
            Ok(false) => true,
            Ok(true) => {
                warn!("Keeping {:?}: present on disk but not reached by the walk", path);
                false
            }
            Err(err) => {
                warn!("Keeping {:?}: existence check failed: {}", path, err);
                false
            }
        }
    }

    fn is_changed(&self, track: &TrackRecord) -> bool {
        if track.needs_indexing {
            return true;
        }
        match self.fs.date_modified(Path::new(&track.path)) {
            Ok(modified) => modified != track.date_file_modified,
            Err(_) => true,
        }
    }

    /// Fills pending tracks on a bounded worker pool. Workers stop picking up
    /// files once cancelled; in-flight files finish.
    fn fill(&self, pending: &[TrackRecord], cancel: &CancelFlag) -> Vec<TrackRecord> {
        let total = pending.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.workers.min(total).max(1);
        let cursor = AtomicUsize::new(0);
        let processed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let (cursor, processed, failed) = (&cursor, &processed, &failed);

        let mut results: Vec<(usize, TrackRecord)> = Vec::with_capacity(total);
        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(move |_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            if cancel.is_cancelled() {
                                break;
                            }
                            let idx = cursor.fetch_add(1, Ordering::SeqCst);
                            if idx >= total {
                                break;
                            }
                            let track = self.filler.add_metadata_to_track(pending[idx].clone());
                            if !track.indexing_success {
                                failed.fetch_add(1, Ordering::SeqCst);
                            }
                            let count = processed.fetch_add(1, Ordering::SeqCst) + 1;
                            self.listener.on_event(&ScanEvent::Progress {
                                library_id: self.library_id.clone(),
                                processed: count,
                                total,
                                failed: failed.load(Ordering::SeqCst),
                            });
                            done.push((idx, track));
                        }
                        done
                    })
                })
                .collect();
            for handle in handles {
                match handle.join() {
                    Ok(done) => results.extend(done),
                    Err(_) => warn!("Scan worker panicked"),
                }
            }
        });

        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, track)| track).collect()
    }

    fn set_phase(&self, phase: ScanPhase) {
        *self.phase.lock() = phase;
        self.listener.on_event(&ScanEvent::Phase {
            library_id: self.library_id.clone(),
            phase,
        });
    }
}
