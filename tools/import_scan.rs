use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use library::{
    ArtworkCache, ArtworkIndexer, ArtworkReport, CancelFlag, LocalFileSystem, ScanLocks,
    ScanReport, Scanner, TrackRepository, TrackStore,
};
use metadata::LoftyTagReader;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct ImportSummary<'a> {
    scan: &'a ScanReport,
    artwork: &'a ArtworkReport,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1).peekable();
    let json = args.peek().map(|arg| arg == "--json").unwrap_or(false);
    if json {
        args.next();
    }
    let music_root = args
        .next()
        .or_else(|| env::var("MUSIC_ROOT").ok())
        .ok_or("MUSIC_ROOT not set and no path argument")?;
    let index_path = args
        .next()
        .or_else(|| env::var("INDEX_PATH").ok())
        .unwrap_or_else(|| "data/library.redb".to_string());
    let artwork_path = args
        .next()
        .or_else(|| env::var("ARTWORK_PATH").ok())
        .unwrap_or_else(|| "data/artwork".to_string());

    let store = Arc::new(TrackStore::open(&PathBuf::from(&index_path))?);
    let tags = Arc::new(LoftyTagReader);
    let scanner = Scanner::new(
        vec![PathBuf::from(&music_root)],
        store.clone(),
        tags.clone(),
        Arc::new(LocalFileSystem),
        ScanLocks::new(),
    );
    let report = scanner.scan(&CancelFlag::new())?;
    let artwork = ArtworkIndexer::new(store.clone(), tags, ArtworkCache::new(&artwork_path)).index()?;

    if json {
        let summary = ImportSummary {
            scan: &report,
            artwork: &artwork,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let tracks = store.get_all_tracks()?;
    let failed = tracks.iter().filter(|track| !track.indexing_success).count();
    let albums = store.get_albums()?;
    println!(
        "Scanned: {} new, {} changed, {} deleted, {} unchanged",
        report.new, report.changed, report.deleted, report.unchanged
    );
    println!(
        "Indexed: {} albums, {} tracks ({} failed)",
        albums.len(),
        tracks.len(),
        failed
    );
    println!(
        "Artwork: {} albums refreshed, {} with art, {} failed, {} orphans removed",
        artwork.albums, artwork.with_artwork, artwork.failed, artwork.orphans_removed
    );

    Ok(())
}
