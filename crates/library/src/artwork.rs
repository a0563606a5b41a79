use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use common::AlbumRecord;
use metadata::{CoverArt, MetadataReadError, TagReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::events::{NullListener, ScanEvent, ScanListener};
use crate::store::TrackRepository;
use crate::{AlbumArtworkError, LibraryError};

const COVER_FILE_NAMES: &[&str] = &[
    "cover.jpg",
    "cover.jpeg",
    "cover.png",
    "folder.jpg",
    "folder.jpeg",
    "folder.png",
    "front.jpg",
    "front.jpeg",
    "front.png",
    "album.jpg",
    "album.png",
];

/// Directory of cached album covers, one `album-<key>.<ext>` file per album.
#[derive(Debug, Clone)]
pub struct ArtworkCache {
    dir: PathBuf,
}

impl ArtworkCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, album_key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("album-{}.{}", album_key, ext))
    }

    /// Removes every cached file for the album. A missing cache is a no-op.
    pub fn remove(&self, album_key: &str) -> io::Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err),
        };
        let prefix = format!("album-{}.", album_key);
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(&prefix) {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Removes cached files whose album key is not in `live` and returns the
    /// keys that were dropped.
    pub fn remove_orphans(&self, live: &HashSet<String>) -> io::Result<HashSet<String>> {
        let mut removed = HashSet::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(removed),
            Err(err) => return Err(err),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(key) = cached_album_key(&name) else {
                continue;
            };
            if !live.contains(key) {
                fs::remove_file(entry.path())?;
                removed.insert(key.to_string());
            }
        }
        Ok(removed)
    }

    pub fn write(&self, album_key: &str, ext: &str, data: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(album_key, ext);
        fs::write(&path, data)?;
        Ok(path)
    }
}

fn cached_album_key(file_name: &str) -> Option<&str> {
    let (key, _ext) = file_name.strip_prefix("album-")?.rsplit_once('.')?;
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkReport {
    pub albums: usize,
    pub with_artwork: usize,
    pub without_artwork: usize,
    pub failed: usize,
    /// Albums whose cached artwork was dropped because they have no tracks left.
    pub orphans_removed: usize,
    pub elapsed_ms: u64,
}

/// Refreshes cached artwork for albums whose tracks were (re)indexed.
pub struct ArtworkIndexer {
    store: Arc<dyn TrackRepository>,
    tags: Arc<dyn TagReader>,
    cache: ArtworkCache,
    listener: Arc<dyn ScanListener>,
}

impl ArtworkIndexer {
    pub fn new(store: Arc<dyn TrackRepository>, tags: Arc<dyn TagReader>, cache: ArtworkCache) -> Self {
        Self {
            store,
            tags,
            cache,
            listener: Arc::new(NullListener),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ScanListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn index(&self) -> Result<ArtworkReport, LibraryError> {
        let started = Instant::now();
        let albums = self.store.get_albums_needing_artwork_indexing()?;
        let mut report = ArtworkReport {
            albums: albums.len(),
            ..ArtworkReport::default()
        };

        for album in &albums {
            let artwork_path = match self.refresh_album(album) {
                Ok(Some(path)) => {
                    report.with_artwork += 1;
                    Some(path)
                }
                Ok(None) => {
                    report.without_artwork += 1;
                    None
                }
                Err(err) => {
                    report.failed += 1;
                    warn!("Artwork failed for album {:?}: {}", album.display_title(), err);
                    if let Err(err) = self.store.set_artwork_path(&album.album_key, None) {
                        warn!("Failed to clear artwork for {}: {}", album.album_key, err);
                    }
                    None
                }
            };
            if let Err(err) = self.store.clear_artwork_flags(&album.track_paths) {
                warn!("Failed to clear artwork flag for {}: {}", album.album_key, err);
            }
            self.listener.on_event(&ScanEvent::ArtworkReady {
                album_key: album.album_key.clone(),
                artwork_path,
            });
        }

        report.orphans_removed = self.remove_orphans();
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Artwork pass: {} albums ({} with art, {} without, {} failed, {} orphans removed) in {} ms",
            report.albums,
            report.with_artwork,
            report.without_artwork,
            report.failed,
            report.orphans_removed,
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Drops cached files and artwork rows of albums that have no tracks left.
    fn remove_orphans(&self) -> usize {
        let mut removed: HashSet<String> = HashSet::new();
        match self.store.remove_orphaned_artwork() {
            Ok(keys) => removed.extend(keys),
            Err(err) => warn!("Failed to remove orphaned artwork rows: {}", err),
        }
        let live = match self.store.get_album_keys() {
            Ok(live) => live,
            Err(err) => {
                warn!("Failed to list album keys: {}", err);
                return removed.len();
            }
        };
        match self.cache.remove_orphans(&live) {
            Ok(keys) => removed.extend(keys),
            Err(err) => warn!("Failed to sweep artwork cache {:?}: {}", self.cache.dir(), err),
        }
        if !removed.is_empty() {
            debug!("Removed artwork for {} deleted album(s)", removed.len());
        }
        removed.len()
    }

    fn refresh_album(&self, album: &AlbumRecord) -> Result<Option<String>, AlbumArtworkError> {
        self.cache
            .remove(&album.album_key)
            .map_err(AlbumArtworkError::Remove)?;

        let track_path = Path::new(&album.first_track_path);
        let cover = match self.tags.read_cover(track_path) {
            Ok(Some(cover)) => Some(cover),
            Ok(None) => folder_cover(track_path).map_err(AlbumArtworkError::Read)?,
            Err(err) => match folder_cover(track_path) {
                Ok(Some(cover)) => Some(cover),
                _ => return Err(AlbumArtworkError::Read(err)),
            },
        };

        let Some(cover) = cover else {
            self.store.set_artwork_path(&album.album_key, None)?;
            debug!("No artwork for album {}", album.album_key);
            return Ok(None);
        };

        let ext = image_extension(cover.mime.as_deref());
        let path = self
            .cache
            .write(&album.album_key, ext, &cover.data)
            .map_err(AlbumArtworkError::Write)?;
        let path = path.to_string_lossy().to_string();
        self.store.set_artwork_path(&album.album_key, Some(&path))?;
        Ok(Some(path))
    }
}

fn folder_cover(track_path: &Path) -> Result<Option<CoverArt>, MetadataReadError> {
    let Some(dir) = track_path.parent() else {
        return Ok(None);
    };
    let Some(path) = find_folder_cover(dir) else {
        return Ok(None);
    };
    let data = fs::read(&path)?;
    let mime = mime_guess::from_path(&path).first().map(|mime| mime.to_string());
    Ok(Some(CoverArt { data, mime }))
}

/// Cover image next to the track, matched case-insensitively, in name priority order.
fn find_folder_cover(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut files: HashMap<String, PathBuf> = HashMap::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name() {
            files.insert(name.to_string_lossy().to_ascii_lowercase(), path);
        }
    }
    COVER_FILE_NAMES
        .iter()
        .find_map(|name| files.get(*name).cloned())
}

fn image_extension(mime: Option<&str>) -> &'static str {
    match mime {
        Some("image/png") => "png",
        Some("image/jpeg") | Some("image/jpg") | None => "jpg",
        Some(other) => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("jpg"),
    }
}
