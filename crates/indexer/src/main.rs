mod activity_store;
mod config;
mod scan;
mod state;
mod watch;

use std::sync::Arc;
use std::time::Duration;

use activity_store::ActivityStore;
use config::{config_path_from_env, load_or_create_config, resolve_music_folders, resolve_path};
use library::{library_id, ArtworkCache, ScanLocks, TrackStore};
use metadata::LoftyTagReader;
use parking_lot::RwLock;
use scan::{cancel_scan, start_scan};
use state::{AppState, IndexStatus};
use tracing::{info, warn};
use watch::configure_watcher;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let index_path = resolve_path(&config_path, &config.index_path);
    let store = Arc::new(TrackStore::open(&index_path)?);
    info!("Opened track index at {:?}", index_path);
    let activity = ActivityStore::new(store.db());
    if let Err(err) = activity.init_tables() {
        warn!("Failed to create activity table: {}", err);
    }

    let folders = resolve_music_folders(&config_path, &config);
    for folder in &folders {
        if !folder.exists() {
            warn!("Music folder {:?} does not exist", folder);
        }
    }

    let state = AppState {
        config_path: config_path.clone(),
        artwork: ArtworkCache::new(resolve_path(&config_path, &config.artwork_path)),
        config: Arc::new(RwLock::new(config.clone())),
        folders,
        store,
        tags: Arc::new(LoftyTagReader),
        locks: ScanLocks::new(),
        activity,
        status: Arc::new(RwLock::new(IndexStatus::Unconfigured)),
        cancel: Arc::new(RwLock::new(None)),
        watcher: Arc::new(RwLock::new(None)),
    };

    if state.folders.is_empty() {
        info!(
            "No music folders configured yet; add them to {:?} and restart.",
            state.config_path
        );
    } else {
        if config.scan_on_start {
            start_scan(state.clone());
        }
        configure_watcher(&state);
    }

    shutdown_signal().await;

    *state.watcher.write() = None;
    if cancel_scan(&state) {
        info!("Cancelling in-flight scan");
        let id = library_id(&state.folders);
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while state.locks.is_running(&id) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if state.locks.is_running(&id) {
            warn!("Scan did not stop within {}s", SHUTDOWN_GRACE.as_secs());
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
