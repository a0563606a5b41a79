use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use library::{ArtworkCache, CancelFlag, ScanLocks, ScanPhase, ScanReport, TrackStore};
use metadata::TagReader;
use notify::RecommendedWatcher;
use parking_lot::RwLock;

use crate::activity_store::ActivityStore;
use crate::config::IndexerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config_path: PathBuf,
    pub config: Arc<RwLock<IndexerConfig>>,
    pub folders: Vec<PathBuf>,
    pub store: Arc<TrackStore>,
    pub tags: Arc<dyn TagReader>,
    pub artwork: ArtworkCache,
    pub locks: ScanLocks,
    pub activity: ActivityStore,
    pub status: Arc<RwLock<IndexStatus>>,
    pub cancel: Arc<RwLock<Option<CancelFlag>>>,
    pub watcher: Arc<RwLock<Option<RecommendedWatcher>>>,
}

#[derive(Clone, Debug)]
pub enum IndexStatus {
    Unconfigured,
    Scanning {
        started: SystemTime,
        phase: ScanPhase,
    },
    Ready(ScanReport),
    Error(String),
}

impl IndexStatus {
    pub fn is_scanning(&self) -> bool {
        matches!(self, IndexStatus::Scanning { .. })
    }
}
