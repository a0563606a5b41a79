use std::sync::Arc;
use std::time::SystemTime;

use library::{
    ArtworkIndexer, ArtworkReport, CancelFlag, LibraryError, LocalFileSystem, ScanEvent,
    ScanListener, ScanPhase, ScanReport, Scanner,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::state::{AppState, IndexStatus};

/// Mirrors scan events into the daemon's status.
struct StatusListener {
    status: Arc<RwLock<IndexStatus>>,
}

impl ScanListener for StatusListener {
    fn on_event(&self, event: &ScanEvent) {
        match event {
            ScanEvent::Phase { phase, .. } => {
                let mut status = self.status.write();
                if let IndexStatus::Scanning { phase: current, .. } = &mut *status {
                    *current = *phase;
                }
            }
            ScanEvent::Progress {
                processed,
                total,
                failed,
                ..
            } => {
                if *processed == *total || *processed % 100 == 0 {
                    info!("Indexed {}/{} files ({} failed)", processed, total, failed);
                }
            }
            ScanEvent::ArtworkReady {
                album_key,
                artwork_path,
            } => debug!("Artwork for {}: {:?}", album_key, artwork_path),
            ScanEvent::Finished(_) | ScanEvent::Failed { .. } => {}
        }
    }
}

pub fn start_scan(state: AppState) {
    tokio::spawn(async move {
        run_scan(state).await;
    });
}

/// One scan followed by an artwork pass, on the blocking pool.
pub async fn run_scan(state: AppState) {
    if state.folders.is_empty() {
        *state.status.write() = IndexStatus::Unconfigured;
        return;
    }

    let cancel = CancelFlag::new();
    {
        let mut slot = state.cancel.write();
        if slot.is_some() {
            info!("Scan already running; request dropped");
            return;
        }
        *slot = Some(cancel.clone());
    }
    let previous = state.status.read().clone();
    {
        let mut status = state.status.write();
        if !status.is_scanning() {
            *status = IndexStatus::Scanning {
                started: SystemTime::now(),
                phase: ScanPhase::Idle,
            };
        }
    }

    let worker_state = state.clone();
    let result =
        tokio::task::spawn_blocking(move || scan_blocking(&worker_state, &cancel)).await;
    *state.cancel.write() = None;

    match result {
        Ok(Ok((report, artwork))) => {
            if let Err(err) = state.activity.record_scan(&report, artwork.as_ref()) {
                warn!("Failed to record scan activity: {}", err);
            }
            *state.status.write() = IndexStatus::Ready(report);
        }
        Ok(Err(LibraryError::ConcurrentScanRejected(library))) => {
            info!("Scan already running for library {}; request dropped", library);
            *state.status.write() = previous;
        }
        Ok(Err(err)) => {
            let message = err.to_string();
            warn!("Library scan failed: {}", message);
            record_failure(&state, &message);
            *state.status.write() = IndexStatus::Error(message);
        }
        Err(err) => {
            let message = err.to_string();
            warn!("Library scan join error: {}", message);
            record_failure(&state, &message);
            *state.status.write() = IndexStatus::Error(message);
        }
    }
}

fn record_failure(state: &AppState, message: &str) {
    if let Err(err) = state
        .activity
        .add_event("index", format!("Library scan failed: {}", message))
    {
        warn!("Failed to record scan failure: {}", err);
    }
}

fn scan_blocking(
    state: &AppState,
    cancel: &CancelFlag,
) -> Result<(ScanReport, Option<ArtworkReport>), LibraryError> {
    let workers = state.config.read().workers();
    let listener: Arc<dyn ScanListener> = Arc::new(StatusListener {
        status: Arc::clone(&state.status),
    });
    let scanner = Scanner::new(
        state.folders.clone(),
        state.store.clone(),
        Arc::clone(&state.tags),
        Arc::new(LocalFileSystem),
        state.locks.clone(),
    )
    .with_workers(workers)
    .with_listener(Arc::clone(&listener));

    let report = scanner.scan(cancel)?;
    if report.cancelled {
        info!("Artwork pass skipped (scan cancelled)");
        return Ok((report, None));
    }

    let indexer = ArtworkIndexer::new(
        state.store.clone(),
        Arc::clone(&state.tags),
        state.artwork.clone(),
    )
    .with_listener(listener);
    let artwork = match indexer.index() {
        Ok(artwork) => Some(artwork),
        Err(err) => {
            warn!("Artwork pass failed: {}", err);
            None
        }
    };
    Ok((report, artwork))
}

/// Asks the in-flight scan to stop picking up new files.
pub fn cancel_scan(state: &AppState) -> bool {
    match state.cancel.read().as_ref() {
        Some(cancel) => {
            cancel.cancel();
            true
        }
        None => false,
    }
}
